/// Transcript pane rendering — user bubbles, agent replies through the
/// formatter, spinner, wrapping utilities.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem},
};

use super::{AppState, Mode};
use crate::format::{self, Block as DocBlock, Inline};
use crate::session::{Message, Role, SessionStatus};
use crate::ui::fmt_time;

// ── Spinner ───────────────────────────────────────────────────────────────────

pub const SPINNER_GLYPHS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const SPINNER_MSGS: &[(&str, Color)] = &[
    ("waiting for the agent…", Color::Cyan),
    ("still working…", Color::Rgb(0, 200, 255)),
    ("almost there…", Color::Rgb(100, 200, 255)),
];

const CONNECT_MSGS: &[(&str, Color)] = &[
    ("connecting…", Color::Cyan),
    ("signing in…", Color::Rgb(0, 200, 255)),
    ("opening a conversation…", Color::Rgb(0, 220, 180)),
];

fn spinner_frame(tick: u32, connecting: bool) -> (&'static str, &'static str, Color) {
    let glyph = SPINNER_GLYPHS[(tick as usize) % SPINNER_GLYPHS.len()];
    let msgs = if connecting { CONNECT_MSGS } else { SPINNER_MSGS };
    // Message cycles more slowly — changes every ~2 seconds (120ms × 16 ticks)
    let (msg, color) = msgs[(tick as usize / 16) % msgs.len()];
    (glyph, msg, color)
}

// ── Colours ───────────────────────────────────────────────────────────────────

const AGENT_LABEL_FG: Color = Color::Rgb(0, 210, 210);
const AGENT_TEXT_FG: Color = Color::Rgb(210, 230, 255);
const HEADING_FG: Color = Color::Rgb(140, 220, 255);
const RULE_FG: Color = Color::Rgb(60, 60, 85);
const BULLET_FG: Color = Color::Rgb(120, 110, 180);

// ── History items builder ─────────────────────────────────────────────────────

pub fn build_items(state: &AppState, term_width: u16) -> Vec<ListItem<'static>> {
    let mut items: Vec<ListItem<'static>> = Vec::new();

    if state.messages.is_empty() {
        let hint = if state.status == SessionStatus::Connected {
            "Start a conversation by typing a message below"
        } else {
            "Connect to an agent to start chatting"
        };
        items.push(ListItem::new(Line::raw("")));
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(hint.to_string(), Style::default().fg(Color::DarkGray)),
        ])));
    }

    for message in &state.messages {
        match message.role {
            Role::User => push_user_bubble(&mut items, message, term_width),
            Role::Assistant => push_agent_message(&mut items, message, term_width),
        }
        if state.show_timestamps {
            items.push(ListItem::new(Line::from(vec![
                Span::raw("  "),
                Span::styled(
                    fmt_time(message.timestamp),
                    Style::default().fg(Color::Rgb(50, 50, 70)),
                ),
            ])));
        }
        items.push(ListItem::new(Line::raw("")));
    }

    if matches!(state.mode, Mode::Connecting | Mode::Sending) {
        let (glyph, msg, color) = spinner_frame(state.spinner_tick, state.mode == Mode::Connecting);
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(
                format!("{glyph} "),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(msg.to_string(), Style::default().fg(color)),
        ])));
        if state.mode == Mode::Connecting {
            if let Some(sign_in) = &state.sign_in {
                items.push(ListItem::new(Line::from(vec![
                    Span::raw("  "),
                    Span::styled("⚿ ", Style::default().fg(Color::Yellow)),
                    Span::styled(
                        sign_in.clone(),
                        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                    ),
                ])));
            }
        }
    }

    items
}

// ── User bubble ───────────────────────────────────────────────────────────────

fn push_user_bubble(items: &mut Vec<ListItem<'static>>, message: &Message, term_width: u16) {
    let bg = Color::Rgb(28, 26, 52);
    let border = Color::Rgb(110, 90, 200);
    let label_fg = Color::Rgb(160, 140, 255);
    let text_fg = Color::Rgb(235, 232, 255);
    let body_style = Style::default().fg(text_fg).bg(bg);
    let edge_style = Style::default().fg(border).bg(bg);

    // Dynamic widths — 2 chars left margin, 1 right margin
    let inner_w = (term_width as usize).saturating_sub(3).max(10);
    let dash_total = inner_w.saturating_sub(4 + 5); // "╭─ " + "you" + " " + "╮"
    let top_dashes = "─".repeat(dash_total);
    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled("╭─ ".to_string(), edge_style),
        Span::styled(
            "you",
            Style::default().fg(label_fg).bg(bg).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {top_dashes}╮"), edge_style),
    ])));

    let wrap_width = inner_w.saturating_sub(2).max(10);
    let raw_lines: Vec<&str> = if message.content.is_empty() {
        vec![""]
    } else {
        message.content.lines().collect()
    };
    for line in raw_lines.iter().flat_map(|line| wrap_text(line, wrap_width)) {
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled("│ ".to_string(), edge_style),
            Span::styled(line, body_style),
        ])));
    }

    let bot_dashes = "─".repeat(inner_w.saturating_sub(2));
    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled(format!("╰{bot_dashes}╯"), edge_style),
    ])));
}

// ── Agent message ─────────────────────────────────────────────────────────────

/// Render an agent reply through the formatter: each source line becomes one
/// typed block, blocks become styled spans, and text is only ever plain span
/// content — never re-parsed markup.
fn push_agent_message(items: &mut Vec<ListItem<'static>>, message: &Message, term_width: u16) {
    // "  agent  " prefix = 9 columns; continuations align under the text.
    let wrap_width = (term_width as usize).saturating_sub(9).max(20);
    let mut first = true;

    for block in format::parse(&message.content) {
        let block_lines = block_lines(&block, wrap_width);
        for spans in block_lines {
            let mut line_spans: Vec<Span<'static>> = Vec::with_capacity(spans.len() + 2);
            if first {
                first = false;
                line_spans.push(Span::raw("  "));
                line_spans.push(Span::styled(
                    "agent",
                    Style::default().fg(AGENT_LABEL_FG).add_modifier(Modifier::BOLD),
                ));
                line_spans.push(Span::raw("  "));
            } else {
                line_spans.push(Span::raw("         "));
            }
            line_spans.extend(spans);
            items.push(ListItem::new(Line::from(line_spans)));
        }
    }
}

/// The display lines for one block, without the message indent.
fn block_lines(block: &DocBlock, wrap_width: usize) -> Vec<Vec<Span<'static>>> {
    match block {
        DocBlock::Spacer => vec![vec![Span::raw("")]],
        DocBlock::Rule => vec![vec![Span::styled(
            "─".repeat(wrap_width.min(36)),
            Style::default().fg(RULE_FG),
        )]],
        DocBlock::Heading(inlines) => wrap_inlines(inlines, wrap_width)
            .into_iter()
            .map(|runs| {
                runs.into_iter()
                    .map(|(text, _)| {
                        Span::styled(
                            text,
                            Style::default().fg(HEADING_FG).add_modifier(Modifier::BOLD),
                        )
                    })
                    .collect()
            })
            .collect(),
        DocBlock::ListItem(inlines) => {
            // "• " marker with a hanging indent on wrapped lines.
            let mut out = Vec::new();
            for (i, runs) in wrap_inlines(inlines, wrap_width.saturating_sub(2))
                .into_iter()
                .enumerate()
            {
                let mut spans = vec![if i == 0 {
                    Span::styled("• ", Style::default().fg(BULLET_FG).add_modifier(Modifier::BOLD))
                } else {
                    Span::raw("  ")
                }];
                spans.extend(runs.into_iter().map(styled_run));
                out.push(spans);
            }
            out
        }
        DocBlock::Paragraph(inlines) => wrap_inlines(inlines, wrap_width)
            .into_iter()
            .map(|runs| runs.into_iter().map(styled_run).collect())
            .collect(),
    }
}

fn styled_run((text, bold): (String, bool)) -> Span<'static> {
    if bold {
        Span::styled(
            text,
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )
    } else {
        Span::styled(text, Style::default().fg(AGENT_TEXT_FG))
    }
}

// ── Draw ──────────────────────────────────────────────────────────────────────

pub fn draw_history(f: &mut Frame, state: &AppState, area: Rect) {
    let all_items = build_items(state, area.width);
    let total = all_items.len();
    let visible = area.height as usize;

    let skip = if total > visible {
        (total - visible).saturating_sub(state.scroll)
    } else {
        0
    };

    let sliced: Vec<ListItem<'static>> = all_items.into_iter().skip(skip).collect();
    let list =
        List::new(sliced).block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, area);
}

// ── Wrapping utilities ────────────────────────────────────────────────────────

/// Word-wrap a single plain line to `max_width` columns. Splits on
/// whitespace; never truncates mid-word unless the word alone exceeds the
/// width.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = word.chars().count();
        if current_width == 0 {
            current.push_str(word);
            current_width = word_width;
        } else if current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = word_width;
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Word-wrap styled inline content. Each output line is a list of
/// (text, bold) runs; a style change mid-word stays glued to the word.
pub fn wrap_inlines(inlines: &[Inline], max_width: usize) -> Vec<Vec<(String, bool)>> {
    // Flatten to styled chars, then split into words on whitespace.
    let mut words: Vec<Vec<(char, bool)>> = Vec::new();
    let mut word: Vec<(char, bool)> = Vec::new();
    for inline in inlines {
        let (text, bold) = match inline {
            Inline::Text(s) => (s.as_str(), false),
            Inline::Bold(s) => (s.as_str(), true),
        };
        for c in text.chars() {
            if c.is_whitespace() {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            } else {
                word.push((c, bold));
            }
        }
    }
    if !word.is_empty() {
        words.push(word);
    }

    let mut lines: Vec<Vec<(String, bool)>> = Vec::new();
    let mut line: Vec<(String, bool)> = Vec::new();
    let mut width = 0usize;
    for word in words {
        let word_width = word.len();
        if width > 0 && width + 1 + word_width > max_width {
            lines.push(std::mem::take(&mut line));
            width = 0;
        }
        if width > 0 {
            let space_bold = line.last().map(|run| run.1).unwrap_or(false);
            append_run(&mut line, ' ', space_bold);
            width += 1;
        }
        for (c, bold) in word {
            append_run(&mut line, c, bold);
        }
        width += word_width;
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

fn append_run(line: &mut Vec<(String, bool)>, c: char, bold: bool) {
    match line.last_mut() {
        Some((text, b)) if *b == bold => text.push(c),
        _ => line.push((c.to_string(), bold)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Inline {
        Inline::Text(s.to_string())
    }

    fn bold(s: &str) -> Inline {
        Inline::Bold(s.to_string())
    }

    #[test]
    fn wrap_text_splits_on_word_boundaries() {
        assert_eq!(wrap_text("a bb ccc", 5), vec!["a bb", "ccc"]);
        assert_eq!(wrap_text("", 5), vec![""]);
    }

    #[test]
    fn wrap_inlines_keeps_style_runs() {
        let lines = wrap_inlines(&[bold("key"), text(": value")], 40);
        assert_eq!(
            lines,
            vec![vec![
                ("key".to_string(), true),
                (": value".to_string(), false),
            ]]
        );
    }

    #[test]
    fn wrap_inlines_wraps_at_width() {
        let lines = wrap_inlines(&[text("one two three")], 7);
        assert_eq!(
            lines,
            vec![
                vec![("one two".to_string(), false)],
                vec![("three".to_string(), false)],
            ]
        );
    }
}
