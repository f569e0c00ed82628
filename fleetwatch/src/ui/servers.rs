//! Server table with per-cell usage coloring and a selected row.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table, TableState},
};

use crate::types::Server;
use crate::ui::theme::{status_color, usage_color, HEADER_FG, SELECTED_BG};
use crate::ui::util::fmt_pct;

const COLS: [Constraint; 9] = [
    Constraint::Length(10),     // Code
    Constraint::Percentage(25), // Name
    Constraint::Length(13),     // Status
    Constraint::Length(7),      // CPU
    Constraint::Length(7),      // RAM
    Constraint::Length(7),      // Disk
    Constraint::Length(7),      // GPU
    Constraint::Length(9),      // Net
    Constraint::Length(7),      // Procs
];

pub fn draw_servers(f: &mut ratatui::Frame<'_>, area: Rect, roster: &[Server], selected: usize) {
    let rows = roster.iter().map(|s| {
        let pct = |v: f64| Cell::from(fmt_pct(v)).style(Style::default().fg(usage_color(v)));
        let status = if s.no_agent {
            format!("{} (no agent)", s.status.label())
        } else {
            s.status.label().to_string()
        };
        Row::new(vec![
            Cell::from(s.code.clone()),
            Cell::from(s.name.clone()),
            Cell::from(status).style(Style::default().fg(status_color(s.status))),
            pct(s.cpu),
            pct(s.ram),
            pct(s.disk),
            pct(s.gpu),
            Cell::from(format!("{:>7.1}", s.network)),
            Cell::from(format!("{}/{}", s.running_processes(), s.processes.len())),
        ])
    });

    let header = Row::new(vec![
        "Code", "Name", "Status", "CPU", "RAM", "Disk", "GPU", "Net", "Procs",
    ])
    .style(Style::default().fg(HEADER_FG).add_modifier(Modifier::BOLD));

    let table = Table::new(rows, COLS.to_vec())
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Servers ({})", roster.len())),
        )
        .highlight_style(
            Style::default()
                .bg(SELECTED_BG)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = TableState::default();
    if !roster.is_empty() {
        state.select(Some(selected.min(roster.len() - 1)));
    }
    f.render_stateful_widget(table, area, &mut state);
}
