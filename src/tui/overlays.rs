/// Overlay draw functions — the troubleshooting/help popup.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use super::AppState;

// ── Help / troubleshooting overlay ────────────────────────────────────────────

/// Static setup guide. Auto-opened after authentication failures; not
/// interactive beyond scrolling.
const SECTIONS: &[(&str, &[&str])] = &[
    (
        "1. Entra app registration setup",
        &[
            "Create an App Registration in the Azure Portal",
            "Enable \"Allow public client flows\" (Mobile and desktop)",
            "Enable \"Access tokens\" and \"ID tokens\" under Authentication",
        ],
    ),
    (
        "2. Required API permissions",
        &[
            "Microsoft Graph: User.Read (delegated)",
            "Power Platform API: use the \".default\" scope for broader access",
            "Alternative: specific scopes — Chatbots.Inquire and Chatbots.Read",
            "Grant admin consent for your organization",
        ],
    ),
    (
        "3. Common issues",
        &[
            "Enter the sign-in code before it expires",
            "Check that the Client ID matches your App Registration",
            "Verify the Tenant ID is correct",
            "Confirm the Environment ID and Agent Schema Name are valid",
            "Failure details are logged to the telemetry file",
        ],
    ),
    (
        "4. Environment & agent configuration",
        &[
            "Environment ID: found in the Power Platform admin center",
            "Agent Schema Name: in Copilot Studio agent settings (not the display name)",
            "Ensure the agent is published and accessible",
        ],
    ),
];

pub fn draw_help(f: &mut Frame, state: &AppState, area: Rect) {
    let width = 72u16.min(area.width.saturating_sub(4));
    let height = 24u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let popup_area = Rect { x, y, width, height };

    f.render_widget(Clear, popup_area);

    let block = Block::default()
        .title(Span::styled(
            " Authentication Troubleshooting ",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));

    let inner = block.inner(popup_area);
    f.render_widget(block, popup_area);

    let mut items: Vec<ListItem<'static>> = Vec::new();
    for (title, steps) in SECTIONS {
        items.push(ListItem::new(Line::raw("")));
        items.push(ListItem::new(Line::from(vec![
            Span::raw("  "),
            Span::styled(
                title.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
        ])));
        for step in *steps {
            items.push(ListItem::new(Line::from(vec![
                Span::raw("    "),
                Span::styled("• ", Style::default().fg(Color::DarkGray)),
                Span::styled(step.to_string(), Style::default().fg(Color::Rgb(180, 180, 200))),
            ])));
        }
    }

    let content_area = Rect {
        height: inner.height.saturating_sub(1),
        ..inner
    };
    let footer_area = Rect {
        y: inner.y + inner.height.saturating_sub(1),
        height: 1,
        ..inner
    };

    // Clamp scroll so the last page stays full.
    let total = items.len();
    let visible = content_area.height as usize;
    let max_scroll = total.saturating_sub(visible);
    let skip = state.help_scroll.min(max_scroll);

    let visible_items: Vec<ListItem<'static>> =
        items.into_iter().skip(skip).take(visible).collect();
    f.render_widget(List::new(visible_items), content_area);

    let footer = Line::from(vec![Span::styled(
        "  j/k scroll   Esc close",
        Style::default().fg(Color::DarkGray),
    )]);
    f.render_widget(Paragraph::new(footer), footer_area);
}
