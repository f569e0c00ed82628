//! Shared UI theme constants.

use ratatui::style::Color;

use crate::push::ConnectionState;
use crate::types::{LogSeverity, ProcessStatus, ServerStatus};

pub const HEADER_FG: Color = Color::Cyan;
pub const SELECTED_BG: Color = Color::Rgb(40, 44, 52);
pub const UNREAD_FG: Color = Color::Rgb(230, 230, 240);
pub const READ_FG: Color = Color::DarkGray;

pub fn status_color(s: ServerStatus) -> Color {
    match s {
        ServerStatus::Connected => Color::Green,
        ServerStatus::Warning => Color::Yellow,
        ServerStatus::Disconnected => Color::Red,
    }
}

pub fn process_color(s: ProcessStatus) -> Color {
    match s {
        ProcessStatus::Running => Color::Green,
        ProcessStatus::Stopped => Color::DarkGray,
    }
}

// Same bands as the process table colors; 60 is the alert threshold
pub fn usage_color(v: f64) -> Color {
    match v {
        x if x < 25.0 => Color::Green,
        x if x < 60.0 => Color::Yellow,
        _ => Color::Red,
    }
}

pub fn severity_color(s: LogSeverity) -> Color {
    match s {
        LogSeverity::Error => Color::Red,
        LogSeverity::Warning => Color::Yellow,
        LogSeverity::Info => Color::Blue,
    }
}

pub fn push_color(s: ConnectionState) -> Color {
    match s {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Disconnected => Color::Red,
    }
}
