/// Config tab — the four agent configuration fields, masked by default.
///
/// Shortcuts:
///   ↑↓ / j k — move field focus
///   Enter    — edit the focused field (only while disconnected)
///   v        — reveal/hide the focused value
///   a        — reveal/hide all values
///   c / x    — connect / disconnect
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem, Paragraph},
};

use super::{AppState, ConfigField, Mode};
use crate::session::SessionStatus;
use crate::ui::mask_value;

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(2)])
        .split(area);

    let content_area = chunks[0];
    let footer_area = chunks[1];

    let mut items: Vec<ListItem<'static>> = Vec::new();
    let blank = || ListItem::new(Line::raw(""));

    items.push(blank());
    items.push(ListItem::new(Line::from(vec![
        Span::raw("  "),
        Span::styled(
            "Agent Configuration",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
    ])));
    items.push(blank());

    for (i, field) in ConfigField::ALL.iter().enumerate() {
        let focused = i == state.config_focus;
        items.push(field_line(state, *field, focused));
    }
    items.push(blank());

    // Connection state + validation summary
    let locked = state.status != SessionStatus::Disconnected;
    if locked {
        items.push(dim_line(
            "fields are locked while connected — press x to disconnect",
        ));
    } else {
        let missing = state.config.missing_fields();
        if missing.is_empty() {
            items.push(dim_line("all fields set — press c to connect"));
        } else {
            items.push(dim_line(&format!("still needed: {}", missing.join(", "))));
        }
    }
    items.push(blank());
    items.push(dim_line(
        "values load from COPICHAT_* environment variables and the config file",
    ));

    let list = List::new(items)
        .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, content_area);

    // ── Footer — key hints (always visible) ───────────────────────────────────
    let key = |k: &str| {
        Span::styled(
            k.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )
    };
    let label = |t: &str| Span::styled(t.to_string(), Style::default().fg(Color::Rgb(100, 95, 140)));
    let footer_line = Line::from(vec![
        Span::raw("  "),
        key("Enter"),
        label(" edit   "),
        key("v"),
        label(" reveal   "),
        key("a"),
        label(" reveal all   "),
        key("c"),
        label(" connect   "),
        key("x"),
        label(" disconnect   "),
        key("Tab"),
        label(" chat"),
    ]);
    let footer = Paragraph::new(footer_line).style(Style::default().bg(Color::Rgb(12, 12, 20)));
    f.render_widget(footer, footer_area);
}

fn field_line(state: &AppState, field: ConfigField, focused: bool) -> ListItem<'static> {
    let editing = matches!(
        (&state.field_edit, state.mode),
        (Some(edit), Mode::FieldEdit) if edit.field == field
    );

    let marker = if focused { "▸ " } else { "  " };
    let label_style = if focused {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Rgb(100, 95, 140))
    };

    let mut spans = vec![
        Span::raw("  "),
        Span::styled(
            marker.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("{:<20}", field.label()), label_style),
    ];

    if editing {
        // Inline edit buffer with a block cursor.
        if let Some(edit) = &state.field_edit {
            let (before, after) = edit.buffer.split_at(edit.cursor.min(edit.buffer.len()));
            spans.push(Span::styled(
                before.to_string(),
                Style::default().fg(Color::White),
            ));
            spans.push(Span::styled(
                "█",
                Style::default().fg(Color::Rgb(200, 160, 0)),
            ));
            spans.push(Span::styled(
                after.to_string(),
                Style::default().fg(Color::White),
            ));
        }
    } else {
        let value = field.get(&state.config);
        let reveal = state.show_values.get(field);
        if value.is_empty() {
            spans.push(Span::styled(
                format!("Enter {}", field.label()),
                Style::default().fg(Color::Rgb(55, 50, 80)),
            ));
        } else {
            spans.push(Span::styled(
                mask_value(value, reveal),
                Style::default().fg(Color::White),
            ));
            if reveal {
                spans.push(Span::styled(
                    "  (shown)",
                    Style::default().fg(Color::Rgb(160, 120, 40)),
                ));
            }
        }
    }

    ListItem::new(Line::from(spans))
}

fn dim_line(text: &str) -> ListItem<'static> {
    ListItem::new(Line::from(vec![
        Span::raw("    "),
        Span::styled(text.to_string(), Style::default().fg(Color::Rgb(65, 60, 95))),
    ]))
}
