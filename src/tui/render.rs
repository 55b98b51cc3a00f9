/// Ratatui draw entry-point for copichat.
/// Thin dispatcher — transcript rendering lives in chat.rs, the config panel
/// in config_view.rs, the help overlay in overlays.rs.
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::{AppState, Mode, NoticeKind, Tab};
use super::chat::SPINNER_GLYPHS;
use crate::session::SessionStatus;
use crate::ui::mask_value;

// ── Splash screen ─────────────────────────────────────────────────────────────

const LOGO: &str = r#"
   ██████╗ ██████╗ ██████╗ ██╗  ██████╗██╗  ██╗  █████╗  ████████╗
  ██╔════╝██╔═══██╗██╔══██╗██║ ██╔════╝██║  ██║ ██╔══██╗ ╚══██╔══╝
  ██║     ██║   ██║██████╔╝██║ ██║     ███████║ ███████║    ██║
  ██║     ██║   ██║██╔═══╝ ██║ ██║     ██╔══██║ ██╔══██║    ██║
  ╚██████╗╚██████╔╝██║     ██║ ╚██████╗██║  ██║ ██║  ██║    ██║
   ╚═════╝ ╚═════╝ ╚═╝     ╚═╝  ╚═════╝╚═╝  ╚═╝ ╚═╝  ╚═╝    ╚═╝
"#;

pub fn draw_splash(f: &mut Frame) {
    let area = f.area();
    f.render_widget(
        Block::default().style(Style::default().bg(Color::Black)),
        area,
    );

    let logo_lines: Vec<Line> = LOGO
        .lines()
        .enumerate()
        .map(|(i, line)| {
            let color = match i % 6 {
                0 => Color::DarkGray,
                1 | 5 => Color::Cyan,
                2 | 4 => Color::Rgb(0, 220, 220),
                _ => Color::White,
            };
            Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
        })
        .collect();

    let logo_height = logo_lines.len() as u16;
    let y = area.height.saturating_sub(logo_height + 4) / 2;

    let logo_area = Rect {
        x: area.x,
        y: area.y + y,
        width: area.width,
        height: logo_height,
    };
    let subtitle_area = Rect {
        x: area.x,
        y: logo_area.y + logo_height + 1,
        width: area.width,
        height: 1,
    };

    f.render_widget(
        Paragraph::new(logo_lines).alignment(Alignment::Center),
        logo_area,
    );
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                "chat with Copilot Studio agents",
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
            Span::styled("Entra ID sign-in", Style::default().fg(Color::DarkGray)),
        ]))
        .alignment(Alignment::Center),
        subtitle_area,
    );
}

// ── Main draw entry point ─────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, state: &AppState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // tab bar
            Constraint::Length(1), // notice banner
            Constraint::Min(0),    // content area
            Constraint::Length(1), // status bar
            Constraint::Length(3), // composer
        ])
        .split(area);

    draw_tab_bar(f, state, chunks[0]);
    draw_notice(f, state, chunks[1]);

    match state.active_tab {
        Tab::Chat => super::chat::draw_history(f, state, chunks[2]),
        Tab::Config => super::config_view::draw(f, state, chunks[2]),
    }

    draw_status_bar(f, state, chunks[3]);
    draw_composer(f, state, chunks[4]);

    if state.help_visible {
        super::overlays::draw_help(f, state, area);
    }
}

// ── Tab bar ───────────────────────────────────────────────────────────────────

fn draw_tab_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let tabs: &[(&str, Tab)] = &[("[1] Chat  ", Tab::Chat), ("[2] Config", Tab::Config)];

    let mut spans = vec![Span::raw(" ")];
    for (label, tab) in tabs {
        let active = state.active_tab == *tab;
        let style = if active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Rgb(60, 55, 90))
        };
        spans.push(Span::styled(label.to_string(), style));
        spans.push(Span::styled("  ", Style::default()));
    }
    spans.push(Span::styled(
        "                ? help",
        Style::default().fg(Color::Rgb(45, 45, 70)),
    ));

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(6, 6, 12))),
        area,
    );
}

// ── Notice banner ─────────────────────────────────────────────────────────────

fn draw_notice(f: &mut Frame, state: &AppState, area: Rect) {
    let line = match &state.notice {
        Some(notice) => {
            let (glyph, color) = match notice.kind {
                NoticeKind::Info => ("·", Color::Cyan),
                NoticeKind::Success => ("✓", Color::Rgb(0, 220, 120)),
                NoticeKind::Error => ("✗", Color::Rgb(230, 80, 80)),
            };
            Line::from(vec![
                Span::raw(" "),
                Span::styled(
                    format!("{glyph} "),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::styled(notice.text.clone(), Style::default().fg(color)),
            ])
        }
        None => Line::raw(""),
    };
    f.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::Rgb(8, 8, 14))),
        area,
    );
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let (status_glyph, status_label, status_color) = match state.status {
        SessionStatus::Connected => ("●", "connected", Color::Rgb(0, 220, 120)),
        SessionStatus::Connecting => {
            let g = SPINNER_GLYPHS[(state.spinner_tick as usize) % SPINNER_GLYPHS.len()];
            (g, "connecting", Color::Cyan)
        }
        SessionStatus::Disconnected => ("○", "disconnected", Color::DarkGray),
    };

    let environment = if state.config.environment_id.is_empty() {
        "no environment".to_string()
    } else {
        mask_value(&state.config.environment_id, false)
    };

    // Short conversation handle, visible only while connected.
    let conversation = match (&state.conversation, state.status) {
        (Some(id), SessionStatus::Connected) => {
            let short: String = id.chars().take(8).collect();
            format!("  conv {short}…")
        }
        _ => String::new(),
    };

    let stats = &state.stats;
    let mut traffic = String::new();
    if stats.connects_attempted > 0 {
        traffic.push_str(&format!(
            "  ⇅ {}/{}",
            stats.connects_succeeded, stats.connects_attempted
        ));
        if stats.auth_failures > 0 {
            traffic.push_str(&format!(" auth✗{}", stats.auth_failures));
        }
    }
    if stats.messages_sent > 0 {
        traffic.push_str(&format!(
            "  ↑{} ↓{}",
            stats.messages_sent, stats.replies_received
        ));
        if stats.send_failures > 0 {
            traffic.push_str(&format!(" ✗{}", stats.send_failures));
        }
    }

    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled(
            "▲ copichat",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ", Style::default()),
        Span::styled(
            format!("{status_glyph} {status_label}"),
            Style::default().fg(status_color).add_modifier(Modifier::BOLD),
        ),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(environment, Style::default().fg(Color::Rgb(100, 180, 220))),
        Span::styled(conversation, Style::default().fg(Color::Rgb(80, 90, 140))),
        Span::styled(
            format!("  ◈ {}", state.messages.len()),
            Style::default().fg(if state.messages.is_empty() {
                Color::DarkGray
            } else {
                Color::Rgb(140, 120, 220)
            }),
        ),
        Span::styled(traffic, Style::default().fg(Color::Rgb(80, 80, 120))),
        Span::styled(
            "  Tab config  ? help  Ctrl+C quit",
            Style::default().fg(Color::Rgb(55, 50, 90)),
        ),
    ]);

    let bar_style = if matches!(state.mode, Mode::Connecting | Mode::Sending) {
        Style::default().bg(Color::Rgb(15, 15, 25))
    } else {
        Style::default().bg(Color::Rgb(10, 10, 18))
    };

    f.render_widget(Paragraph::new(line).style(bar_style), area);
}

// ── Composer ──────────────────────────────────────────────────────────────────

fn draw_composer(f: &mut Frame, state: &AppState, area: Rect) {
    let (border_color, prompt_color, prompt_char) = match state.mode {
        Mode::Connecting => (Color::Rgb(40, 40, 60), Color::Cyan, "◌"),
        Mode::Sending => (Color::Rgb(40, 40, 60), Color::DarkGray, "·"),
        Mode::FieldEdit => (Color::Rgb(200, 160, 0), Color::Rgb(220, 160, 0), "✎"),
        Mode::Normal => (Color::Rgb(60, 60, 80), Color::Cyan, "❯"),
    };

    let prompt_span = Span::styled(
        format!("  {prompt_char} "),
        Style::default().fg(prompt_color).add_modifier(Modifier::BOLD),
    );

    let content_span = if matches!(state.mode, Mode::Connecting | Mode::Sending) {
        let hint = if state.mode == Mode::Connecting {
            "connecting…"
        } else {
            "waiting for the agent…"
        };
        Span::styled(hint, Style::default().fg(Color::Rgb(60, 60, 80)))
    } else if state.mode == Mode::FieldEdit {
        Span::styled(
            "editing field  ·  Enter save  ·  Esc cancel",
            Style::default().fg(Color::Rgb(100, 80, 30)),
        )
    } else if state.active_tab == Tab::Config {
        Span::styled(
            "↑↓ field · Enter edit · v reveal · a reveal all · c connect · x disconnect",
            Style::default().fg(Color::Rgb(70, 70, 90)),
        )
    } else if state.input.is_empty() {
        let placeholder = if state.status == SessionStatus::Connected {
            "Type your message…  ·  /help for commands"
        } else {
            "Connect to an agent first  ·  press 2 for config"
        };
        Span::styled(placeholder, Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(state.input.clone(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    let paragraph = Paragraph::new(Line::from(vec![prompt_span, content_span]))
        .block(block)
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, area);

    // Position the cursor at the edit point while composing on the Chat tab.
    if state.mode == Mode::Normal && state.active_tab == Tab::Chat {
        use unicode_width::UnicodeWidthStr;
        // prompt is "  ❯ " — 4 visible columns
        let prompt_width: u16 = 4;
        let text_before_cursor = &state.input[..state.cursor.min(state.input.len())];
        let cursor_x = area.x + prompt_width + text_before_cursor.width() as u16;
        let cursor_y = area.y + 1; // +1 for top border
        if cursor_x < area.x + area.width {
            f.set_cursor_position((cursor_x, cursor_y));
        }
    }
}
