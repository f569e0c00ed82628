//! Top header with fleet summary and push channel state.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders},
};

use crate::push::ConnectionState;
use crate::types::{Server, ServerStatus};
use crate::ui::theme::push_color;

pub fn draw_header(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    roster: &[Server],
    push: ConnectionState,
    unread: usize,
) {
    let online = roster
        .iter()
        .filter(|s| s.status != ServerStatus::Disconnected)
        .count();
    let push_label = match push {
        ConnectionState::Connected => "live",
        ConnectionState::Connecting => "connecting...",
        ConnectionState::Disconnected => "offline",
    };
    let title = Line::from(vec![
        Span::raw(format!(
            "fleetwatch | {online}/{} online | push: ",
            roster.len()
        )),
        Span::styled(push_label, Style::default().fg(push_color(push))),
        Span::raw(format!(
            " | {unread} unread  (q quit, r refresh, a/n mark read)"
        )),
    ]);
    f.render_widget(Block::default().title(title).borders(Borders::BOTTOM), area);
}
