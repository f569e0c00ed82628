//! Server roster store: owns the authoritative server list and publishes
//! immutable snapshots to any number of readers.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::reconcile::{self, ReconcileError};
use crate::types::{Server, ServerForm, ServerStatus, ServerUpdate};

pub type Roster = Arc<Vec<Server>>;

/// Issued when a full refresh request starts. A refresh that finishes after a
/// push was applied is stale: only its identity fields are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    pushes_at_issue: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No push landed in between; the snapshot replaced the roster.
    Replaced,
    /// A push landed in between; see `reconcile::adopt_identity`.
    Merged,
}

pub struct RosterStore {
    tx: watch::Sender<Roster>,
    pushes_applied: u64,
}

impl Default for RosterStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

// Decide whether a push produced a new sample for this server
fn advanced(prev: Option<&Server>, next: &Server) -> bool {
    if next.status == ServerStatus::Disconnected {
        return false;
    }
    let Some(prev) = prev else { return true };
    match next.last_update {
        Some(ts) => prev.last_update != Some(ts),
        None => [next.cpu, next.ram, next.disk, next.gpu, next.network]
            != [prev.cpu, prev.ram, prev.disk, prev.gpu, prev.network],
    }
}

impl RosterStore {
    pub fn new(initial: Vec<Server>) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self {
            tx,
            pushes_applied: 0,
        }
    }

    pub fn snapshot(&self) -> Roster {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Roster> {
        self.tx.subscribe()
    }

    pub fn get(&self, code: &str) -> Option<Server> {
        self.tx.borrow().iter().find(|s| s.code == code).cloned()
    }

    fn publish(&self, next: Vec<Server>) {
        self.tx.send_replace(Arc::new(next));
    }

    /// Replace the roster with a backend snapshot. Histories and the
    /// `no_agent` flag of codes already known are carried over.
    pub fn hydrate(&mut self, updates: &[ServerUpdate]) {
        let prev = self.snapshot();
        let by_code: HashMap<&str, &Server> = prev.iter().map(|s| (s.code.as_str(), s)).collect();
        let next: Vec<Server> = reconcile::hydrate(updates)
            .into_iter()
            .map(|mut s| {
                if let Some(old) = by_code.get(s.code.as_str()) {
                    if s.history.is_empty() {
                        s.history = old.history.clone();
                    }
                    s.no_agent = old.no_agent;
                }
                s
            })
            .collect();
        debug!(servers = next.len(), "roster hydrated");
        self.publish(next);
    }

    pub fn begin_refresh(&self) -> RefreshTicket {
        RefreshTicket {
            pushes_at_issue: self.pushes_applied,
        }
    }

    /// Apply a refresh started with `ticket`.
    pub fn finish_refresh(
        &mut self,
        ticket: RefreshTicket,
        updates: &[ServerUpdate],
    ) -> RefreshOutcome {
        if ticket.pushes_at_issue != self.pushes_applied {
            debug!(
                issued_at = ticket.pushes_at_issue,
                now = self.pushes_applied,
                "stale roster refresh, keeping identity fields only"
            );
            let next = reconcile::adopt_identity(&self.snapshot(), updates);
            self.publish(next);
            return RefreshOutcome::Merged;
        }
        self.hydrate(updates);
        RefreshOutcome::Replaced
    }

    /// Merge a push broadcast. On a malformed payload the roster is kept as is.
    pub fn apply_push(&mut self, payload: &Value) -> Result<Roster, ReconcileError> {
        let prev = self.snapshot();
        let mut next = match reconcile::reconcile(&prev, payload) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "ignoring roster update");
                return Err(e);
            }
        };

        let by_code: HashMap<&str, &Server> = prev.iter().map(|s| (s.code.as_str(), s)).collect();
        for s in next.iter_mut() {
            if advanced(by_code.get(s.code.as_str()).copied(), s) {
                s.record_sample();
            }
        }

        self.pushes_applied += 1;
        self.publish(next);
        Ok(self.snapshot())
    }

    /// Optimistic append after a create call. Refuses a duplicate code.
    pub fn add_local(&mut self, server: Server) -> bool {
        let prev = self.snapshot();
        if prev.iter().any(|s| s.code == server.code) {
            return false;
        }
        let mut next = prev.as_ref().clone();
        next.push(server);
        self.publish(next);
        true
    }

    /// Optimistic edit of a saved server. Refuses an unsaved row (id 0) and a
    /// code already held by another server.
    pub fn update_local(&mut self, id: i64, form: &ServerForm) -> bool {
        if id == 0 {
            return false;
        }
        let prev = self.snapshot();
        let Some(pos) = prev.iter().position(|s| s.id == id) else {
            return false;
        };
        let code = form.code.trim();
        if prev.iter().any(|s| s.code == code && s.id != id) {
            return false;
        }
        let mut next = prev.as_ref().clone();
        let s = &mut next[pos];
        s.code = code.to_string();
        s.name = form.name.trim().to_string();
        s.ip = form.ip.trim().to_string();
        if let Ok(port) = form.port.trim().parse() {
            s.port = port;
        }
        self.publish(next);
        true
    }

    pub fn remove_local(&mut self, id: i64) -> Option<Server> {
        if id == 0 {
            return None;
        }
        let prev = self.snapshot();
        let pos = prev.iter().position(|s| s.id == id)?;
        let mut next = prev.as_ref().clone();
        let removed = next.remove(pos);
        self.publish(next);
        Some(removed)
    }

    pub fn remove_process_local(&mut self, code: &str, process: &str) -> bool {
        let prev = self.snapshot();
        let Some(pos) = prev.iter().position(|s| s.code == code) else {
            return false;
        };
        if !prev[pos].processes.iter().any(|p| p.name == process) {
            return false;
        }
        let mut next = prev.as_ref().clone();
        next[pos].processes.retain(|p| p.name != process);
        self.publish(next);
        true
    }
}
