//! Notification store: backend notifications plus client-derived threshold
//! alerts, with a one-way unread -> read state per entry.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;

use crate::threshold::{Crossing, ThresholdEvent};
use crate::types::{Notification, NotificationId, NotificationKind};

/// Client-derived alerts kept; the oldest are dropped first. Backend entries
/// are bounded by the backend.
pub const LOCAL_ALERT_CAP: usize = 200;

// Keep the newest `cap` local alerts; locals are stored newest first
fn cap_local(list: &mut Vec<Notification>, cap: usize) {
    let mut seen = 0;
    list.retain(|n| {
        if !matches!(n.id, NotificationId::Local(_)) {
            return true;
        }
        seen += 1;
        seen <= cap
    });
}

pub struct NotificationStore {
    tx: watch::Sender<Arc<Vec<Notification>>>,
    /// Raised by the `notifications` push trigger, lowered once nothing is unread.
    is_new: bool,
    next_local: u64,
    local_cap: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::with_local_cap(LOCAL_ALERT_CAP)
    }
}

impl NotificationStore {
    pub fn with_local_cap(local_cap: usize) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self {
            tx,
            is_new: false,
            next_local: 1,
            local_cap,
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<Notification>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Notification>>> {
        self.tx.subscribe()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn has_unread(&self) -> bool {
        self.tx.borrow().iter().any(|n| !n.is_read)
    }

    pub fn unread_count(&self) -> usize {
        self.tx.borrow().iter().filter(|n| !n.is_read).count()
    }

    fn publish(&mut self, next: Vec<Notification>) {
        let unread = next.iter().any(|n| !n.is_read);
        self.tx.send_replace(Arc::new(next));
        if !unread {
            self.is_new = false;
        }
    }

    /// Replace with a fresh backend list. Local alerts are kept in front.
    pub fn replace_all(&mut self, remote: Vec<Notification>) {
        let mut next: Vec<Notification> = self
            .snapshot()
            .iter()
            .filter(|n| matches!(n.id, NotificationId::Local(_)))
            .cloned()
            .collect();
        cap_local(&mut next, self.local_cap);
        next.extend(remote);
        self.is_new = next.iter().any(|n| !n.is_read);
        self.publish(next);
    }

    /// The backend signalled that something changed; a re-fetch follows.
    pub fn signal_new(&mut self) {
        self.is_new = true;
    }

    /// Add a client-derived alert at the top, unread.
    pub fn push_local(&mut self, event: &ThresholdEvent, threshold: f64) -> NotificationId {
        let id = NotificationId::Local(self.next_local);
        self.next_local += 1;
        let kind = match event.crossing {
            Crossing::High => NotificationKind::high_usage(event.metric)
                .unwrap_or_else(|| NotificationKind::Message("high-usage".into())),
            Crossing::Recovered => NotificationKind::Recovered,
        };
        let n = Notification {
            id: id.clone(),
            server_code: event.server_code.clone(),
            server_name: event.server_name.clone(),
            kind,
            message: event.message(threshold),
            timestamp: Utc::now(),
            is_read: false,
        };
        let mut next = self.snapshot().as_ref().clone();
        next.insert(0, n);
        cap_local(&mut next, self.local_cap);
        self.is_new = true;
        self.publish(next);
        id
    }

    /// Mark one entry read. Idempotent; returns false only for an unknown id.
    pub fn mark_read(&mut self, id: &NotificationId) -> bool {
        let prev = self.snapshot();
        let Some(pos) = prev.iter().position(|n| &n.id == id) else {
            return false;
        };
        if prev[pos].is_read {
            return true;
        }
        let mut next = prev.as_ref().clone();
        next[pos].is_read = true;
        self.publish(next);
        true
    }

    pub fn mark_all_read(&mut self) {
        let next: Vec<Notification> = self
            .snapshot()
            .iter()
            .cloned()
            .map(|mut n| {
                n.is_read = true;
                n
            })
            .collect();
        self.publish(next);
    }

    pub fn remove(&mut self, id: &NotificationId) -> Option<Notification> {
        let prev = self.snapshot();
        let pos = prev.iter().position(|n| &n.id == id)?;
        let mut next = prev.as_ref().clone();
        let removed = next.remove(pos);
        self.publish(next);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.publish(Vec::new());
    }

    pub fn newest_unread(&self) -> Option<NotificationId> {
        self.tx
            .borrow()
            .iter()
            .find(|n| !n.is_read)
            .map(|n| n.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metric;

    fn remote(id: i64, read: bool) -> Notification {
        Notification {
            id: NotificationId::Remote(id),
            server_code: "A".into(),
            server_name: "alpha".into(),
            kind: NotificationKind::Disconnected,
            message: String::new(),
            timestamp: Utc::now(),
            is_read: read,
        }
    }

    fn high_cpu() -> ThresholdEvent {
        ThresholdEvent {
            server_code: "A".into(),
            server_name: "alpha".into(),
            metric: Metric::Cpu,
            value: 72.0,
            crossing: Crossing::High,
        }
    }

    #[test]
    fn read_is_one_way_and_idempotent() {
        let mut store = NotificationStore::default();
        let id = store.push_local(&high_cpu(), 60.0);
        let n = store.snapshot()[0].clone();
        assert!(!n.is_read);
        assert_eq!(n.kind, NotificationKind::HighCpu);

        assert!(store.mark_read(&id));
        assert!(store.snapshot()[0].is_read);
        assert!(store.mark_read(&id));
        assert!(store.snapshot()[0].is_read);
        assert!(!store.mark_read(&NotificationId::Remote(404)));
    }

    #[test]
    fn new_flag_follows_unread_state() {
        let mut store = NotificationStore::default();
        store.replace_all(vec![remote(1, true), remote(2, false)]);
        assert!(store.is_new());
        assert_eq!(store.unread_count(), 1);

        store.mark_read(&NotificationId::Remote(2));
        assert!(!store.is_new());

        store.signal_new();
        assert!(store.is_new());
        store.mark_all_read();
        assert!(!store.is_new());
        assert!(!store.has_unread());
    }

    #[test]
    fn refetch_keeps_local_alerts_on_top() {
        let mut store = NotificationStore::default();
        store.replace_all(vec![remote(1, false)]);
        let local = store.push_local(&high_cpu(), 60.0);
        store.replace_all(vec![remote(1, true), remote(3, false)]);
        let ids: Vec<NotificationId> = store.snapshot().iter().map(|n| n.id.clone()).collect();
        assert_eq!(
            ids,
            vec![local, NotificationId::Remote(1), NotificationId::Remote(3)]
        );
        assert_eq!(store.newest_unread(), Some(NotificationId::Local(1)));
    }

    #[test]
    fn local_alerts_are_capped_newest_kept() {
        let mut store = NotificationStore::with_local_cap(3);
        store.replace_all(vec![remote(1, false)]);
        let ids: Vec<NotificationId> = (0..5).map(|_| store.push_local(&high_cpu(), 60.0)).collect();
        let snap = store.snapshot();
        assert_eq!(snap.len(), 4);
        let kept: Vec<NotificationId> = snap.iter().map(|n| n.id.clone()).collect();
        assert_eq!(
            kept,
            vec![
                ids[4].clone(),
                ids[3].clone(),
                ids[2].clone(),
                NotificationId::Remote(1)
            ]
        );

        // a re-fetch neither drops remote entries nor revives evicted locals
        store.replace_all((10..20).map(|i| remote(i, true)).collect());
        let snap = store.snapshot();
        assert_eq!(snap.len(), 13);
        assert!(!snap.iter().any(|n| n.id == ids[0]));
    }

    #[test]
    fn remove_and_clear() {
        let mut store = NotificationStore::default();
        store.replace_all(vec![remote(1, false), remote(2, false)]);
        assert!(store.remove(&NotificationId::Remote(1)).is_some());
        assert!(store.remove(&NotificationId::Remote(1)).is_none());
        assert_eq!(store.snapshot().len(), 1);
        store.clear();
        assert!(store.snapshot().is_empty());
        assert!(!store.is_new());
    }
}
