//! Dashboard state: owns every store and funnels push events and finished REST
//! calls through one queue so they are applied in arrival order.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{cancellable, ApiClient, ApiError};
use crate::commands::CommandConsole;
use crate::contamination::ContaminationStore;
use crate::logs::LogStore;
use crate::notifications::NotificationStore;
use crate::push::{events, ConnectionState, PushClient};
use crate::roster::{RefreshOutcome, RefreshTicket, Roster, RosterStore};
use crate::threshold::{ThresholdTracker, DEFAULT_THRESHOLD};
use crate::types::{
    CommandResult, ContaminationAlert, LogEntry, Notification, NotificationId, Server,
    ServerForm, ServerUpdate,
};
use crate::validate::{self, FieldError};

pub const TOAST_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub text: String,
    pub level: ToastLevel,
    shown_at: Instant,
}

impl Toast {
    fn new(text: impl Into<String>, level: ToastLevel) -> Self {
        Self {
            text: text.into(),
            level,
            shown_at: Instant::now(),
        }
    }

    pub fn expired(&self) -> bool {
        self.shown_at.elapsed() >= TOAST_TTL
    }
}

/// Something the dashboard task has to apply.
#[derive(Debug)]
pub enum Inbound {
    RosterUpdate(Value),
    NotificationsChanged,
    ServerLog(Value),
    CommandShow(Value),
    Contamination(Value),
    RosterFetched(RefreshTicket, Result<Vec<ServerUpdate>, ApiError>),
    NotificationsFetched(Result<Vec<Notification>, ApiError>),
    ActionDone {
        what: &'static str,
        result: Result<(), ApiError>,
        refresh: bool,
    },
}

pub struct Dashboard {
    api: ApiClient,
    push: Arc<PushClient>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Inbound>,
    rx: mpsc::UnboundedReceiver<Inbound>,

    roster: RosterStore,
    notifications: NotificationStore,
    thresholds: ThresholdTracker,
    logs: LogStore,
    commands: CommandConsole,
    contamination: ContaminationStore,
    toast: Option<Toast>,
}

fn forward(tx: &mpsc::UnboundedSender<Inbound>, wrap: fn(Value) -> Inbound) -> impl Fn(Value) + Send + Sync + 'static {
    let tx = tx.clone();
    move |data| {
        // receiver gone means the dashboard is shutting down
        let _ = tx.send(wrap(data));
    }
}

impl Dashboard {
    /// Build the stores and bind the push handlers. Binding replaces any
    /// handlers previously registered on `push`.
    pub fn new(api: ApiClient, push: Arc<PushClient>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let me = Self {
            api,
            push,
            cancel,
            tx,
            rx,
            roster: RosterStore::default(),
            notifications: NotificationStore::default(),
            thresholds: ThresholdTracker::new(DEFAULT_THRESHOLD),
            logs: LogStore::default(),
            commands: CommandConsole::default(),
            contamination: ContaminationStore::default(),
            toast: None,
        };
        me.bind_push();
        me
    }

    fn bind_push(&self) {
        self.push.on(events::UPDATE, forward(&self.tx, Inbound::RosterUpdate));
        self.push
            .on(events::NOTIFICATIONS, forward(&self.tx, |_| Inbound::NotificationsChanged));
        self.push.on(events::SERVER_LOG, forward(&self.tx, Inbound::ServerLog));
        self.push.on(events::COMMAND_SHOW, forward(&self.tx, Inbound::CommandShow));
        self.push
            .on(events::CONTAMINATION_IMAGES, forward(&self.tx, Inbound::Contamination));
    }

    /// Handle for injecting events, e.g. from another transport.
    pub fn sender(&self) -> mpsc::UnboundedSender<Inbound> {
        self.tx.clone()
    }

    // ---- read side ----

    pub fn roster(&self) -> Roster {
        self.roster.snapshot()
    }

    pub fn roster_store(&self) -> &RosterStore {
        &self.roster
    }

    pub fn notifications(&self) -> &NotificationStore {
        &self.notifications
    }

    pub fn logs(&self) -> &LogStore {
        &self.logs
    }

    pub fn commands(&self) -> &CommandConsole {
        &self.commands
    }

    pub fn contamination(&self) -> &ContaminationStore {
        &self.contamination
    }

    pub fn push_state(&self) -> ConnectionState {
        self.push.state()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn toast(&self) -> Option<&Toast> {
        self.toast.as_ref().filter(|t| !t.expired())
    }

    pub fn show_toast(&mut self, text: impl Into<String>, level: ToastLevel) {
        self.toast = Some(Toast::new(text, level));
    }

    // ---- REST plumbing ----

    fn spawn_call<T, Fut, W>(&self, fut: Fut, wrap: W)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
        W: FnOnce(Result<T, ApiError>) -> Inbound + Send + 'static,
    {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let res = cancellable(&cancel, fut).await;
            let _ = tx.send(wrap(res));
        });
    }

    /// Initial load: roster snapshot and notifications.
    pub fn start(&self) {
        self.refresh();
        self.fetch_notifications();
    }

    /// Request a full roster snapshot. Dropped on arrival if a push was applied
    /// in the meantime.
    pub fn refresh(&self) {
        let ticket = self.roster.begin_refresh();
        let api = self.api.clone();
        self.spawn_call(async move { api.servers().await }, move |r| {
            Inbound::RosterFetched(ticket, r)
        });
    }

    pub fn fetch_notifications(&self) {
        let api = self.api.clone();
        self.spawn_call(
            async move { api.notifications().await },
            Inbound::NotificationsFetched,
        );
    }

    fn spawn_action<Fut>(&self, what: &'static str, refresh: bool, fut: Fut)
    where
        Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        self.spawn_call(fut, move |result| Inbound::ActionDone {
            what,
            result,
            refresh,
        });
    }

    // ---- event loop ----

    pub async fn next(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }

    /// Apply everything queued so far without waiting. Returns how many
    /// events were applied.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
            n += 1;
        }
        n
    }

    pub fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::RosterUpdate(payload) => self.on_roster_update(&payload),
            Inbound::NotificationsChanged => {
                self.notifications.signal_new();
                self.fetch_notifications();
            }
            Inbound::ServerLog(v) => match serde_json::from_value::<LogEntry>(v) {
                Ok(entry) => self.logs.push(entry),
                Err(e) => warn!(error = %e, "ignoring malformed server-log"),
            },
            Inbound::CommandShow(v) => match serde_json::from_value::<CommandResult>(v) {
                Ok(result) => {
                    let roster = self.roster.snapshot();
                    if !self.commands.on_result(&roster, result) {
                        debug!("command result for unknown server");
                    }
                }
                Err(e) => warn!(error = %e, "ignoring malformed command_show"),
            },
            Inbound::Contamination(v) => self.on_contamination(v),
            Inbound::RosterFetched(ticket, Ok(updates)) => {
                if self.roster.finish_refresh(ticket, &updates) == RefreshOutcome::Merged {
                    // status and metrics came from a newer push; already observed
                    return;
                }
                let roster = self.roster.snapshot();
                // a refresh is a sample too; the tracker only fires on edges
                for e in self.thresholds.observe_roster(&roster) {
                    self.notifications.push_local(&e, self.thresholds.threshold());
                }
                self.thresholds.retain_codes(&roster);
            }
            Inbound::RosterFetched(_, Err(e)) => self.report("loading servers", e),
            Inbound::NotificationsFetched(Ok(list)) => self.notifications.replace_all(list),
            Inbound::NotificationsFetched(Err(e)) => self.report("loading notifications", e),
            Inbound::ActionDone {
                what,
                result: Ok(()),
                refresh,
            } => {
                info!(what, "action completed");
                self.show_toast(format!("{what}: done"), ToastLevel::Info);
                if refresh {
                    self.refresh();
                }
            }
            Inbound::ActionDone {
                what,
                result: Err(e),
                ..
            } => self.report(what, e),
        }
    }

    fn report(&mut self, what: &str, e: ApiError) {
        if matches!(e, ApiError::Cancelled) {
            return;
        }
        warn!(error = %e, "{what} failed");
        self.show_toast(format!("{what} failed: {e}"), ToastLevel::Error);
    }

    fn on_roster_update(&mut self, payload: &Value) {
        let Ok(roster) = self.roster.apply_push(payload) else {
            // already logged by the store; roster unchanged
            return;
        };
        let threshold = self.thresholds.threshold();
        for e in self.thresholds.observe_roster(&roster) {
            debug!(server = %e.server_code, metric = e.metric.label(), value = e.value, "threshold crossed");
            self.notifications.push_local(&e, threshold);
        }
        self.thresholds.retain_codes(&roster);
    }

    fn on_contamination(&mut self, v: Value) {
        // a single record is accepted as a one-element batch
        let batch = match v {
            Value::Array(_) => serde_json::from_value::<Vec<ContaminationAlert>>(v),
            other => serde_json::from_value::<ContaminationAlert>(other).map(|a| vec![a]),
        };
        match batch {
            Ok(alerts) => {
                let added = self.contamination.upsert(alerts);
                if added > 0 {
                    self.show_toast(
                        format!("{added} new contamination alert(s)"),
                        ToastLevel::Error,
                    );
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed contamination-images"),
        }
    }

    // ---- user actions ----

    pub fn mark_read(&mut self, id: &NotificationId) {
        if !self.notifications.mark_read(id) {
            return;
        }
        if let NotificationId::Remote(remote) = *id {
            let api = self.api.clone();
            self.spawn_action("mark read", false, async move {
                api.mark_notification_read(remote).await
            });
        }
    }

    pub fn mark_newest_read(&mut self) {
        if let Some(id) = self.notifications.newest_unread() {
            self.mark_read(&id);
        }
    }

    pub fn mark_all_read(&mut self) {
        if !self.notifications.has_unread() {
            return;
        }
        self.notifications.mark_all_read();
        let api = self.api.clone();
        self.spawn_action("mark all read", false, async move {
            api.mark_all_notifications_read().await
        });
    }

    pub fn delete_notification(&mut self, id: &NotificationId) {
        if self.notifications.remove(id).is_none() {
            return;
        }
        if let NotificationId::Remote(remote) = *id {
            let api = self.api.clone();
            self.spawn_action("delete notification", false, async move {
                api.delete_notification(remote).await
            });
        }
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
        let api = self.api.clone();
        self.spawn_action("clear notifications", false, async move {
            api.delete_all_notifications().await
        });
    }

    /// Validate and send a remote command on the push channel.
    pub fn send_command(&mut self, server_code: &str, command: &str) -> Result<(), FieldError> {
        let roster = self.roster.snapshot();
        let req = self.commands.submit(&roster, server_code, command)?;
        let data = serde_json::to_value(&req)
            .map_err(|e| FieldError::new("command", e.to_string()))?;
        self.push
            .emit(events::COMMAND, data)
            .map_err(|e| FieldError::new("command", e.to_string()))
    }

    pub fn create_server(&mut self, form: ServerForm) -> Result<(), Vec<FieldError>> {
        let errs = validate::server_form(&form);
        if !errs.is_empty() {
            return Err(errs);
        }
        let code = form.code.trim();
        if self.roster.get(code).is_some() {
            return Err(vec![FieldError::new("code", "server code already exists")]);
        }
        // placeholder until the agent reports; the follow-up refresh fills in the id
        self.roster.add_local(Server {
            code: code.to_string(),
            name: form.name.trim().to_string(),
            ip: form.ip.trim().to_string(),
            port: form.port.trim().parse().unwrap_or_default(),
            no_agent: true,
            ..Default::default()
        });
        let api = self.api.clone();
        self.spawn_action("create server", true, async move {
            api.create_server(&form).await.map(|_| ())
        });
        Ok(())
    }

    pub fn update_server(&mut self, id: i64, form: ServerForm) -> Result<(), Vec<FieldError>> {
        let errs = validate::server_form(&form);
        if !errs.is_empty() {
            return Err(errs);
        }
        let code = form.code.trim();
        if self.roster.snapshot().iter().any(|s| s.code == code && s.id != id) {
            return Err(vec![FieldError::new("code", "server code already exists")]);
        }
        if !self.roster.update_local(id, &form) {
            return Err(vec![FieldError::new("server", "unknown server")]);
        }
        let api = self.api.clone();
        self.spawn_action("update server", true, async move {
            api.update_server(id, &form).await
        });
        Ok(())
    }

    pub fn delete_server(&mut self, id: i64) -> bool {
        let Some(removed) = self.roster.remove_local(id) else {
            return false;
        };
        self.thresholds.retain_codes(&self.roster.snapshot());
        debug!(server = %removed.code, "server removed locally");
        let api = self.api.clone();
        self.spawn_action("delete server", false, async move { api.delete_server(id).await });
        true
    }

    pub fn delete_process(&mut self, server_code: &str, process: &str) -> bool {
        if !self.roster.remove_process_local(server_code, process) {
            return false;
        }
        let api = self.api.clone();
        let (code, name) = (server_code.to_string(), process.to_string());
        self.spawn_action("delete process", false, async move {
            api.delete_process(&code, &name).await
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationKind, ServerStatus};
    use serde_json::json;

    fn dashboard() -> Dashboard {
        // nothing listens on port 9; REST calls fail fast and are never awaited here
        let api = ApiClient::new("http://127.0.0.1:9", None).unwrap();
        let push = Arc::new(PushClient::new("ws://127.0.0.1:9/ws", None).unwrap());
        Dashboard::new(api, push, CancellationToken::new())
    }

    #[tokio::test]
    async fn push_handlers_are_bound_once() {
        let d = dashboard();
        assert_eq!(d.push.handlers().len(), 5);
        d.bind_push();
        assert_eq!(d.push.handlers().len(), 5);
    }

    #[tokio::test]
    async fn roster_push_raises_threshold_alerts_once() {
        let mut d = dashboard();
        let payload = |cpu: f64| json!([{ "code": "A", "name": "alpha", "status": "connected", "cpu": cpu }]);

        d.handle(Inbound::RosterUpdate(payload(50.0)));
        assert_eq!(d.notifications().snapshot().len(), 0);

        d.handle(Inbound::RosterUpdate(payload(72.0)));
        d.handle(Inbound::RosterUpdate(payload(75.0)));
        let list = d.notifications().snapshot();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].kind, NotificationKind::HighCpu);
        assert!(!list[0].is_read);

        d.handle(Inbound::RosterUpdate(payload(40.0)));
        assert_eq!(d.notifications().snapshot()[0].kind, NotificationKind::Recovered);
        assert_eq!(d.notifications().unread_count(), 2);
    }

    #[tokio::test]
    async fn malformed_push_keeps_roster() {
        let mut d = dashboard();
        d.handle(Inbound::RosterUpdate(json!([{ "code": "A" }])));
        d.handle(Inbound::RosterUpdate(json!({ "code": "A" })));
        assert_eq!(d.roster().len(), 1);

        d.handle(Inbound::RosterUpdate(json!([])));
        assert_eq!(d.roster()[0].status, ServerStatus::Disconnected);
    }

    #[tokio::test]
    async fn refresh_that_loses_to_a_push_still_fills_identity() {
        let mut d = dashboard();
        let ticket = d.roster_store().begin_refresh();
        d.handle(Inbound::RosterUpdate(json!([{ "code": "P", "status": "connected", "cpu": 10.0 }])));
        let stale: Vec<ServerUpdate> = serde_json::from_value(json!([
            { "id": 7, "code": "P", "ip": "10.0.0.5", "port": 8001, "status": "disconnected" },
            { "id": 8, "code": "OLD" }
        ]))
        .unwrap();
        d.handle(Inbound::RosterFetched(ticket, Ok(stale)));
        let roster = d.roster();
        let codes: Vec<&str> = roster.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["P", "OLD"]);
        assert_eq!((roster[0].id, roster[0].port), (7, 8001));
        assert_eq!(roster[0].status, ServerStatus::Connected);

        // the id is now known, so the row can be deleted
        assert!(d.delete_server(7));
    }

    #[tokio::test]
    async fn side_channels_feed_their_stores() {
        let mut d = dashboard();
        d.handle(Inbound::RosterUpdate(json!([{ "code": "A", "name": "alpha" }])));
        d.handle(Inbound::ServerLog(json!({
            "serverCode": "A", "type": "error", "message": "disk full", "timestamp": 1_700_000_000_000i64
        })));
        d.handle(Inbound::ServerLog(json!({ "nonsense": true })));
        assert_eq!(d.logs().len(), 1);

        d.handle(Inbound::CommandShow(json!({ "serverCode": "A", "result": "up 3 days", "command": "uptime" })));
        assert_eq!(d.commands().history()[0].server_name, "alpha");

        d.handle(Inbound::Contamination(json!({ "serverCode": "A", "date": "20240501", "status": "warning" })));
        assert_eq!(d.contamination().all().len(), 1);
        assert_eq!(d.toast().map(|t| t.level), Some(ToastLevel::Error));
    }

    #[tokio::test]
    async fn command_validation_happens_before_emit() {
        let mut d = dashboard();
        assert_eq!(d.send_command("A", "ls").unwrap_err().field, "server");
        d.handle(Inbound::RosterUpdate(json!([{ "code": "A" }])));
        assert!(d.send_command("A", "ls").is_ok());
        assert!(d.commands().is_executing());
    }

    #[tokio::test]
    async fn failed_action_surfaces_a_toast_but_cancel_does_not() {
        let mut d = dashboard();
        d.handle(Inbound::ActionDone {
            what: "delete server",
            result: Err(ApiError::Cancelled),
            refresh: false,
        });
        assert!(d.toast().is_none());
        d.handle(Inbound::ActionDone {
            what: "delete server",
            result: Err(ApiError::Status {
                url: "http://x/api/server/1".into(),
                status: 500,
            }),
            refresh: false,
        });
        assert_eq!(d.toast().map(|t| t.level), Some(ToastLevel::Error));
    }

    fn form(code: &str) -> ServerForm {
        ServerForm {
            code: code.into(),
            name: "gamma".into(),
            ip: "10.0.0.3".into(),
            port: "8003".into(),
        }
    }

    #[tokio::test]
    async fn created_server_is_a_placeholder_until_the_agent_reports() {
        let mut d = dashboard();
        assert!(d.create_server(form(" C ")).is_ok());
        let c = d.roster_store().get("C").unwrap();
        assert!(c.no_agent);
        assert_eq!((c.id, c.port, c.name.as_str()), (0, 8003, "gamma"));
        assert_eq!(d.create_server(form("C")).unwrap_err()[0].field, "code");

        let ticket = d.roster_store().begin_refresh();
        let snapshot: Vec<ServerUpdate> =
            serde_json::from_value(json!([{ "id": 3, "code": "C", "name": "gamma" }])).unwrap();
        d.handle(Inbound::RosterFetched(ticket, Ok(snapshot)));
        let c = d.roster_store().get("C").unwrap();
        assert_eq!(c.id, 3);
        assert!(c.no_agent);

        d.handle(Inbound::RosterUpdate(json!([{ "code": "C", "status": "connected" }])));
        assert!(d.roster_store().get("C").unwrap().no_agent);
    }

    #[tokio::test]
    async fn editing_a_server_onto_a_taken_code_is_rejected() {
        let mut d = dashboard();
        let ticket = d.roster_store().begin_refresh();
        let snapshot: Vec<ServerUpdate> =
            serde_json::from_value(json!([{ "id": 1, "code": "A" }, { "id": 2, "code": "B" }])).unwrap();
        d.handle(Inbound::RosterFetched(ticket, Ok(snapshot)));

        let errs = d.update_server(2, form("A")).unwrap_err();
        assert_eq!(errs[0].field, "code");
        d.handle(Inbound::RosterUpdate(json!([{ "code": "A", "cpu": 1.0 }, { "code": "B", "cpu": 2.0 }])));
        let codes: Vec<String> = d.roster().iter().map(|s| s.code.clone()).collect();
        assert_eq!(codes, vec!["A", "B"]);

        assert!(d.update_server(2, form("B2")).is_ok());
        assert!(d.roster_store().get("B2").is_some());
    }

    #[tokio::test]
    async fn invalid_server_form_is_rejected_locally() {
        let mut d = dashboard();
        let errs = d
            .create_server(ServerForm {
                code: "".into(),
                name: "x".into(),
                ip: "10.0.0.1".into(),
                port: "80".into(),
            })
            .unwrap_err();
        assert_eq!(errs[0].field, "code");
    }
}
