//! Notification list, newest first, unread entries highlighted.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::types::Notification;
use crate::ui::theme::{READ_FG, UNREAD_FG};
use crate::ui::util::fmt_clock;

pub fn draw_notifications(
    f: &mut ratatui::Frame<'_>,
    area: Rect,
    list: &[Notification],
    is_new: bool,
) {
    let unread = list.iter().filter(|n| !n.is_read).count();
    let mut title = vec![Span::raw(format!("Notifications ({unread} unread)"))];
    if is_new {
        title.push(Span::styled(
            " new",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }

    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = list
        .iter()
        .take(visible)
        .map(|n| {
            let (marker, style) = if n.is_read {
                ("  ", Style::default().fg(READ_FG))
            } else {
                ("● ", Style::default().fg(UNREAD_FG).add_modifier(Modifier::BOLD))
            };
            let who = if n.server_name.is_empty() {
                &n.server_code
            } else {
                &n.server_name
            };
            Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Cyan)),
                Span::styled(format!("{} ", fmt_clock(n.timestamp)), Style::default().fg(READ_FG)),
                Span::styled(format!("{who}: {}", n.message), style),
            ])
        })
        .collect();

    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(Line::from(title)))
        .wrap(Wrap { trim: true });
    f.render_widget(p, area);
}
