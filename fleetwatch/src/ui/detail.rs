//! Selected server: metric history sparklines and the process list.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Sparkline, Table},
};

use crate::history::spark_points;
use crate::types::{Metric, Server};
use crate::ui::theme::{process_color, status_color, usage_color, HEADER_FG};
use crate::ui::util::{fmt_duration, fmt_pct};

pub fn draw_detail(f: &mut ratatui::Frame<'_>, area: Rect, server: Option<&Server>) {
    let Some(s) = server else {
        f.render_widget(
            Paragraph::new("no server selected")
                .block(Block::default().borders(Borders::ALL).title("Detail")),
            area,
        );
        return;
    };

    let title = format!(
        "{} ({}) {}:{} | {} | up {} | down {}",
        s.name,
        s.code,
        s.ip,
        s.port,
        s.status.label(),
        fmt_duration(s.uptime.saturating_mul(60)),
        fmt_duration(s.downtime.saturating_mul(60)),
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(status_color(s.status)));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(inner);

    draw_sparks(f, cols[0], s);
    draw_processes(f, cols[1], s);
}

fn draw_sparks(f: &mut ratatui::Frame<'_>, area: Rect, s: &Server) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 5); 5])
        .split(area);

    for (metric, row) in Metric::ALL.into_iter().zip(rows.iter()) {
        let value = s.metric(metric);
        let max_points = row.width.saturating_sub(2) as usize;
        let data = spark_points(s.history.series(metric), max_points);
        let color = if metric == Metric::Network {
            Color::Blue
        } else {
            usage_color(value)
        };
        let spark = Sparkline::default()
            .block(
                Block::default()
                    .borders(Borders::LEFT)
                    .title(format!("{} {}", metric.label(), fmt_pct(value))),
            )
            .data(&data)
            .max(100)
            .style(Style::default().fg(color));
        f.render_widget(spark, *row);
    }
}

fn draw_processes(f: &mut ratatui::Frame<'_>, area: Rect, s: &Server) {
    let rows = s.processes.iter().map(|p| {
        Row::new(vec![
            Cell::from(p.name.clone()),
            Cell::from(p.version.clone().unwrap_or_default()),
            Cell::from(format!("{:?}", p.status).to_lowercase())
                .style(Style::default().fg(process_color(p.status))),
            Cell::from(p.running_time.clone().unwrap_or_default()),
        ])
    });
    let header = Row::new(vec!["Process", "Version", "Status", "Running"])
        .style(Style::default().fg(HEADER_FG).add_modifier(Modifier::BOLD));
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Length(10),
            Constraint::Length(8),
            Constraint::Min(8),
        ],
    )
    .header(header)
    .column_spacing(1)
    .block(
        Block::default()
            .borders(Borders::LEFT)
            .title(format!("Processes ({} running)", s.running_processes())),
    );
    f.render_widget(table, area);
}
