//! UI module root: exposes drawing functions for individual panels.

pub mod detail;
pub mod header;
pub mod logs;
pub mod notifications;
pub mod servers;
pub mod theme;
pub mod toast;
pub mod util;
