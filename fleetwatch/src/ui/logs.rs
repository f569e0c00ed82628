//! Live server log pane.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::logs::LogStore;
use crate::ui::theme::{severity_color, READ_FG};
use crate::ui::util::{fmt_clock, truncate_middle};

pub fn draw_logs(f: &mut ratatui::Frame<'_>, area: Rect, logs: &LogStore, server: Option<&str>) {
    let visible = area.height.saturating_sub(2) as usize;
    let width = area.width.saturating_sub(2) as usize;
    let lines: Vec<Line> = logs
        .recent(server)
        .take(visible)
        .map(|e| {
            let prefix = format!("{} {:<8}", fmt_clock(e.timestamp), e.server_code);
            let room = width.saturating_sub(prefix.chars().count() + 9);
            Line::from(vec![
                Span::styled(prefix, Style::default().fg(READ_FG)),
                Span::styled(
                    format!(" {:<7} ", e.severity.as_str()),
                    Style::default().fg(severity_color(e.severity)),
                ),
                Span::raw(truncate_middle(&e.message, room)),
            ])
        })
        .collect();

    let title = match server {
        Some(code) => format!("Logs: {code}"),
        None => "Logs".to_string(),
    };
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}
