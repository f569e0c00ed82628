//! fleetwatch: client-side state for a fleet monitoring dashboard.
//!
//! The roster of servers comes from a REST snapshot and is kept current by
//! push broadcasts merged through [`reconcile::reconcile`]. Everything the
//! terminal UI shows is read from the stores owned by [`dashboard::Dashboard`].

pub mod api;
pub mod commands;
pub mod config;
pub mod contamination;
pub mod dashboard;
pub mod download;
pub mod history;
pub mod logging;
pub mod logs;
pub mod notifications;
pub mod profiles;
pub mod push;
pub mod reconcile;
pub mod roster;
pub mod threshold;
pub mod types;
pub mod ui;
pub mod validate;
