//! One-line transient status message.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
};

use crate::dashboard::{Toast, ToastLevel};

pub fn draw_toast(f: &mut ratatui::Frame<'_>, area: Rect, toast: Option<&Toast>) {
    let Some(t) = toast else { return };
    let fg = match t.level {
        ToastLevel::Info => Color::Green,
        ToastLevel::Error => Color::Red,
    };
    f.render_widget(Paragraph::new(t.text.as_str()).style(Style::default().fg(fg)), area);
}
