//! Types that mirror the monitoring backend's JSON schema, plus the fully
//! populated roster entity the stores work with.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::history::History;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Connected,
    #[default]
    Disconnected,
    Warning,
}

impl ServerStatus {
    pub fn label(self) -> &'static str {
        match self {
            ServerStatus::Connected => "connected",
            ServerStatus::Disconnected => "disconnected",
            ServerStatus::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    #[default]
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub status: ProcessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_time: Option<String>,
}

/// Resource metrics tracked per server, each with its own history series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Cpu,
    Ram,
    Disk,
    Gpu,
    Network,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Cpu,
        Metric::Ram,
        Metric::Disk,
        Metric::Gpu,
        Metric::Network,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Metric::Cpu => "CPU",
            Metric::Ram => "RAM",
            Metric::Disk => "Disk",
            Metric::Gpu => "GPU",
            Metric::Network => "Net",
        }
    }
}

/// One monitored agent as held in the roster. Every field is populated:
/// optionality from the wire is resolved by `reconcile::hydrate`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub status: ServerStatus,
    pub cpu: f64,
    pub ram: f64,
    pub disk: f64,
    pub gpu: f64,
    pub network: f64,
    pub history: History,
    pub processes: Vec<Process>,
    /// Placeholder row for a server whose agent is not installed yet. Never sent by the backend.
    pub no_agent: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub last_restart: Option<DateTime<Utc>>,
    /// Minutes.
    pub uptime: u64,
    /// Minutes.
    pub downtime: u64,
}

impl Server {
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu,
            Metric::Ram => self.ram,
            Metric::Disk => self.disk,
            Metric::Gpu => self.gpu,
            Metric::Network => self.network,
        }
    }

    // Append current metrics to every history series
    pub fn record_sample(&mut self) {
        for m in Metric::ALL {
            let v = self.metric(m);
            self.history.record(m, v);
        }
    }

    pub fn running_processes(&self) -> usize {
        self.processes
            .iter()
            .filter(|p| p.status == ProcessStatus::Running)
            .count()
    }
}

/// Wire form of a server as carried by `GET /api/server` and the `update` push.
/// Anything may be missing except the join key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUpdate {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, alias = "memory", skip_serializing_if = "Option::is_none")]
    pub ram: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_history: Option<Vec<f64>>,
    #[serde(default, alias = "memoryHistory", skip_serializing_if = "Option::is_none")]
    pub ram_history: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_history: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_history: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_history: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processes: Option<Vec<Process>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime: Option<u64>,
}

impl ServerUpdate {
    /// Copy of `base` with every field this update carries written over it.
    /// Histories and local-only flags are left as they are on `base`.
    pub fn overlay(&self, base: &Server) -> Server {
        let mut s = base.clone();
        s.code = self.code.clone();
        if let Some(v) = self.id {
            s.id = v;
        }
        if let Some(v) = &self.name {
            s.name = v.clone();
        }
        if let Some(v) = &self.ip {
            s.ip = v.clone();
        }
        if let Some(v) = self.port {
            s.port = v;
        }
        if let Some(v) = self.status {
            s.status = v;
        }
        if let Some(v) = self.cpu {
            s.cpu = v;
        }
        if let Some(v) = self.ram {
            s.ram = v;
        }
        if let Some(v) = self.disk {
            s.disk = v;
        }
        if let Some(v) = self.gpu {
            s.gpu = v;
        }
        if let Some(v) = self.network {
            s.network = v;
        }
        if let Some(v) = &self.processes {
            s.processes = v.clone();
        }
        if self.last_update.is_some() {
            s.last_update = self.last_update;
        }
        if self.start_time.is_some() {
            s.start_time = self.start_time;
        }
        if self.last_restart.is_some() {
            s.last_restart = self.last_restart;
        }
        if let Some(v) = self.uptime {
            s.uptime = v;
        }
        if let Some(v) = self.downtime {
            s.downtime = v;
        }
        s
    }
}

/// Body for `POST /api/server/create` and `PUT /api/server/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerForm {
    pub code: String,
    pub name: String,
    pub ip: String,
    pub port: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationId {
    /// Assigned by the backend.
    Remote(i64),
    /// Assigned client-side for threshold alerts; never sent to the backend.
    Local(u64),
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationId::Remote(id) => write!(f, "{id}"),
            NotificationId::Local(id) => write!(f, "local-{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Connected,
    Disconnected,
    HighCpu,
    HighRam,
    HighDisk,
    HighGpu,
    Recovered,
    /// Free-form message type from older backends.
    Message(String),
}

impl From<String> for NotificationKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "connected" => NotificationKind::Connected,
            "disconnected" => NotificationKind::Disconnected,
            "high-cpu" | "cpu" => NotificationKind::HighCpu,
            "high-ram" | "high-memory" | "memory" => NotificationKind::HighRam,
            "high-disk" => NotificationKind::HighDisk,
            "high-gpu" => NotificationKind::HighGpu,
            "recovered" => NotificationKind::Recovered,
            _ => NotificationKind::Message(s),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(k: NotificationKind) -> Self {
        match k {
            NotificationKind::Connected => "connected".into(),
            NotificationKind::Disconnected => "disconnected".into(),
            NotificationKind::HighCpu => "high-cpu".into(),
            NotificationKind::HighRam => "high-ram".into(),
            NotificationKind::HighDisk => "high-disk".into(),
            NotificationKind::HighGpu => "high-gpu".into(),
            NotificationKind::Recovered => "recovered".into(),
            NotificationKind::Message(s) => s,
        }
    }
}

impl NotificationKind {
    pub fn high_usage(metric: Metric) -> Option<Self> {
        match metric {
            Metric::Cpu => Some(NotificationKind::HighCpu),
            Metric::Ram => Some(NotificationKind::HighRam),
            Metric::Disk => Some(NotificationKind::HighDisk),
            Metric::Gpu => Some(NotificationKind::HighGpu),
            Metric::Network => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default, alias = "serverId")]
    pub server_code: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub message: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "read")]
    pub is_read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Error,
    Warning,
    Info,
}

impl LogSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            LogSeverity::Error => "error",
            LogSeverity::Warning => "warning",
            LogSeverity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub server_code: String,
    #[serde(default)]
    pub server_name: String,
    #[serde(rename = "type")]
    pub severity: LogSeverity,
    pub message: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Alert mail recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mail {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Outbound `command` push frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub server_code: String,
    pub command: String,
    pub timestamp: DateTime<Utc>,
}

/// Inbound `command_show` push frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub server_code: String,
    pub result: String,
    pub command: String,
}

/// Image-based contamination alert, one per (server, bucket, date, status).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContaminationAlert {
    pub server_code: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// `YYYYMMDD`
    pub date: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub detail: String,
    /// Per-sid stall counts and image names, passed through untouched.
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

fn default_bucket() -> String {
    "alert".into()
}

/// Accepts epoch milliseconds or an RFC 3339 string; both shapes appear in backend payloads.
pub fn de_timestamp<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_accepts_both_timestamp_shapes_and_read_alias() {
        let a: Notification = serde_json::from_str(
            r#"{"id":7,"serverCode":"A","type":"high-cpu","message":"m","timestamp":1700000000000,"read":true}"#,
        )
        .unwrap();
        assert_eq!(a.id, NotificationId::Remote(7));
        assert_eq!(a.kind, NotificationKind::HighCpu);
        assert!(a.is_read);
        assert_eq!(a.timestamp.timestamp_millis(), 1_700_000_000_000);

        let b: Notification = serde_json::from_str(
            r#"{"id":8,"serverId":"B","type":"disk full","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(b.server_code, "B");
        assert_eq!(b.kind, NotificationKind::Message("disk full".into()));
        assert!(!b.is_read);
    }

    #[test]
    fn server_update_requires_code_and_accepts_memory_alias() {
        let u: ServerUpdate = serde_json::from_str(r#"{"code":"A","memory":12.5}"#).unwrap();
        assert_eq!(u.ram, Some(12.5));
        assert!(u.processes.is_none());
        assert!(serde_json::from_str::<ServerUpdate>(r#"{"cpu":1}"#).is_err());
    }

    #[test]
    fn overlay_keeps_base_fields_the_update_omits() {
        let base = Server {
            code: "A".into(),
            name: "alpha".into(),
            ram: 30.0,
            status: ServerStatus::Connected,
            ..Default::default()
        };
        let u = ServerUpdate {
            code: "A".into(),
            cpu: Some(42.0),
            ..Default::default()
        };
        let s = u.overlay(&base);
        assert_eq!(s.cpu, 42.0);
        assert_eq!(s.ram, 30.0);
        assert_eq!(s.name, "alpha");
        assert_eq!(s.status, ServerStatus::Connected);
    }
}
