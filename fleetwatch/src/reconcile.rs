//! Roster reconciliation: merges full snapshots and push broadcasts into the
//! locally held server list.
//!
//! Everything here is pure and synchronous. Callers hand in the current
//! roster by reference and get a new `Vec` back; the input is never touched,
//! so anyone still holding the previous snapshot keeps seeing it unchanged.
//!
//! Rules applied per server code:
//! - present on both sides: incoming fields overwrite, but the local
//!   histories and the `no_agent` flag are carried over from the current entry;
//! - only local: status forced to `Disconnected`, every process to `Stopped`;
//! - only incoming: appended after the existing entries, defaults filled.
//!
//! An incoming `processes` field that is absent keeps the local list; a
//! present but empty list is taken as "this server now runs nothing".

use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::history::History;
use crate::types::{ProcessStatus, Server, ServerStatus, ServerUpdate};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("malformed server payload: {0}")]
    Malformed(String),
}

fn shape(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a raw payload into server updates. Either every element decodes or
/// the whole payload is rejected.
pub fn decode_updates(payload: &Value) -> Result<Vec<ServerUpdate>, ReconcileError> {
    let Value::Array(items) = payload else {
        return Err(ReconcileError::Malformed(format!(
            "expected a list, got {}",
            shape(payload)
        )));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let u = ServerUpdate::deserialize(item)
                .map_err(|e| ReconcileError::Malformed(format!("element {i}: {e}")))?;
            if u.code.trim().is_empty() {
                return Err(ReconcileError::Malformed(format!("element {i}: empty code")));
            }
            Ok(u)
        })
        .collect()
}

/// Fully populated entity from a wire record: unset status becomes
/// `Disconnected`, missing histories and processes become empty, numbers zero.
pub fn hydrate_one(u: &ServerUpdate) -> Server {
    let base = Server {
        history: History::from_series(
            u.cpu_history.clone(),
            u.ram_history.clone(),
            u.disk_history.clone(),
            u.gpu_history.clone(),
            u.network_history.clone(),
        ),
        ..Default::default()
    };
    u.overlay(&base)
}

/// Full-refresh path. A code listed twice keeps its first position and its last value.
pub fn hydrate(updates: &[ServerUpdate]) -> Vec<Server> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<Server> = Vec::with_capacity(updates.len());
    for u in updates {
        match index.get(u.code.as_str()) {
            Some(&i) => out[i] = hydrate_one(u),
            None => {
                index.insert(u.code.as_str(), out.len());
                out.push(hydrate_one(u));
            }
        }
    }
    out
}

fn merge_matched(cur: &Server, u: &ServerUpdate) -> Server {
    let mut merged = u.overlay(cur);
    merged.history = cur.history.clone();
    merged.no_agent = cur.no_agent;
    merged
}

/// Synthesized state for a server the latest broadcast no longer lists.
pub fn mark_disconnected(cur: &Server) -> Server {
    let mut s = cur.clone();
    s.status = ServerStatus::Disconnected;
    for p in s.processes.iter_mut() {
        p.status = ProcessStatus::Stopped;
    }
    s
}

/// Merge already-decoded updates into `current`.
pub fn merge(current: &[Server], updates: &[ServerUpdate]) -> Vec<Server> {
    let lookup: HashMap<&str, &ServerUpdate> =
        updates.iter().map(|u| (u.code.as_str(), u)).collect();

    let mut out: Vec<Server> = Vec::with_capacity(current.len() + updates.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(current.len());
    for cur in current {
        seen.insert(cur.code.as_str());
        match lookup.get(cur.code.as_str()) {
            Some(u) => out.push(merge_matched(cur, u)),
            None => out.push(mark_disconnected(cur)),
        }
    }

    // Newly discovered codes, in incoming order, latest value per code
    for u in updates {
        if seen.insert(u.code.as_str()) {
            let latest = lookup.get(u.code.as_str()).copied().unwrap_or(u);
            out.push(hydrate_one(latest));
        }
    }
    out
}

/// Fold a snapshot that lost a race with a push into `current`. Only the
/// fields the push never carries are taken from it: id, name, ip and port for
/// known codes, plus codes the roster does not hold yet. Status, metrics and
/// processes stay as the newer push left them.
pub fn adopt_identity(current: &[Server], snapshot: &[ServerUpdate]) -> Vec<Server> {
    let mut out: Vec<Server> = current.to_vec();
    let mut index: HashMap<String, usize> = out
        .iter()
        .enumerate()
        .map(|(i, s)| (s.code.clone(), i))
        .collect();
    for u in snapshot {
        match index.get(u.code.as_str()) {
            Some(&i) => {
                let s = &mut out[i];
                if let Some(id) = u.id {
                    s.id = id;
                }
                if let Some(name) = &u.name {
                    s.name = name.clone();
                }
                if let Some(ip) = &u.ip {
                    s.ip = ip.clone();
                }
                if let Some(port) = u.port {
                    s.port = port;
                }
            }
            None => {
                index.insert(u.code.clone(), out.len());
                out.push(hydrate_one(u));
            }
        }
    }
    out
}

/// Merge a raw broadcast into `current`. A malformed payload is rejected as a
/// whole; the caller keeps `current`.
pub fn reconcile(current: &[Server], incoming: &Value) -> Result<Vec<Server>, ReconcileError> {
    let updates = decode_updates(incoming)?;
    Ok(merge(current, &updates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Process;
    use serde_json::json;

    fn proc_running(name: &str) -> Process {
        Process {
            name: name.into(),
            version: None,
            status: ProcessStatus::Running,
            start_time: None,
            running_time: None,
        }
    }

    fn roster() -> Vec<Server> {
        let a = hydrate_one(
            &serde_json::from_value(json!({
                "code": "A",
                "status": "connected",
                "cpu": 10.0,
                "cpuHistory": [1.0, 2.0, 3.0],
                "processes": [{"name": "X", "status": "running"}]
            }))
            .unwrap(),
        );
        let mut b = hydrate_one(
            &serde_json::from_value(json!({
                "code": "B",
                "status": "connected",
                "ramHistory": [40.0, 41.0],
                "processes": [{"name": "Y", "status": "running"}, {"name": "Z", "status": "stopped"}]
            }))
            .unwrap(),
        );
        b.no_agent = true;
        vec![a, b]
    }

    #[test]
    fn partial_update_preserves_history_and_processes() {
        let s = roster();
        let u = json!([{"code": "A", "status": "connected", "cpu": 42.0}]);
        let out = reconcile(&s, &u).unwrap();
        let a = &out[0];
        assert_eq!(a.cpu, 42.0);
        assert_eq!(a.status, ServerStatus::Connected);
        assert_eq!(a.history.cpu, std::collections::VecDeque::from(vec![1.0, 2.0, 3.0]));
        assert_eq!(a.processes, vec![proc_running("X")]);
    }

    #[test]
    fn empty_process_list_is_authoritative() {
        let s = roster();
        let u = json!([{"code": "A", "processes": []}, {"code": "B"}]);
        let out = reconcile(&s, &u).unwrap();
        assert!(out[0].processes.is_empty());
        assert_eq!(out[1].processes.len(), 2);
    }

    #[test]
    fn history_in_update_never_replaces_local_history() {
        let s = roster();
        let u = json!([
            {"code": "A", "cpuHistory": []},
            {"code": "B", "ramHistory": [99.0, 99.0, 99.0]}
        ]);
        let out = reconcile(&s, &u).unwrap();
        assert_eq!(out[0].history, s[0].history);
        assert_eq!(out[1].history, s[1].history);
    }

    #[test]
    fn missing_server_is_disconnected_with_stopped_processes() {
        let s = vec![roster().remove(0)];
        let out = reconcile(&s, &json!([])).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, ServerStatus::Disconnected);
        assert_eq!(out[0].processes[0].status, ProcessStatus::Stopped);

        // Everything else is untouched
        let mut expected = s[0].clone();
        expected.status = ServerStatus::Disconnected;
        expected.processes[0].status = ProcessStatus::Stopped;
        assert_eq!(out[0], expected);
    }

    #[test]
    fn new_servers_are_appended_with_defaults_in_incoming_order() {
        let s = roster();
        let u = json!([{"code": "D", "cpu": 5.0}, {"code": "A"}, {"code": "C"}, {"code": "B"}]);
        let out = reconcile(&s, &u).unwrap();
        let codes: Vec<&str> = out.iter().map(|x| x.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "D", "C"]);

        let d = &out[2];
        assert_eq!(d.status, ServerStatus::Disconnected);
        assert_eq!(d.cpu, 5.0);
        assert_eq!(d.ram, 0.0);
        assert!(d.history.is_empty());
        assert!(d.processes.is_empty());
        assert!(!d.no_agent);
    }

    #[test]
    fn local_only_flag_survives_merge() {
        let s = roster();
        let out = reconcile(&s, &json!([{"code": "B", "status": "warning"}])).unwrap();
        assert!(out[1].no_agent);
        assert_eq!(out[1].status, ServerStatus::Warning);

        // and disappearance
        let out = reconcile(&s, &json!([])).unwrap();
        assert!(out[1].no_agent);
    }

    #[test]
    fn reconcile_is_idempotent() {
        let s = roster();
        let payloads = [
            json!([]),
            json!([{"code": "A", "cpu": 42.0}]),
            json!([{"code": "A", "processes": []}, {"code": "N", "cpuHistory": [7.0]}]),
            json!([{"code": "N"}, {"code": "N", "gpu": 3.0}]),
        ];
        for u in payloads {
            let once = reconcile(&s, &u).unwrap();
            let twice = reconcile(&once, &u).unwrap();
            assert_eq!(once, twice, "payload {u}");
        }
    }

    #[test]
    fn malformed_payload_is_rejected_whole() {
        let s = roster();
        for bad in [
            json!({"code": "A"}),
            json!("A"),
            json!(null),
            json!([{"code": "A", "cpu": 1.0}, {"cpu": 2.0}]),
            json!([{"code": "A", "cpu": "lots"}]),
            json!([{"code": ""}]),
        ] {
            assert!(reconcile(&s, &bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn current_is_left_untouched() {
        let s = roster();
        let before = s.clone();
        let _ = reconcile(&s, &json!([{"code": "A", "cpu": 99.0, "processes": []}])).unwrap();
        assert_eq!(s, before);
    }

    #[test]
    fn adopt_identity_keeps_push_state_and_admits_rest_only_codes() {
        let pushed = merge(
            &[],
            &serde_json::from_value::<Vec<ServerUpdate>>(json!([
                {"code": "A", "status": "connected", "cpu": 10.0}
            ]))
            .unwrap(),
        );
        let snapshot: Vec<ServerUpdate> = serde_json::from_value(json!([
            {"id": 7, "code": "A", "name": "alpha", "ip": "10.0.0.5", "port": 8001,
             "status": "disconnected", "cpu": 0.0},
            {"id": 8, "code": "B", "name": "beta", "status": "disconnected"}
        ]))
        .unwrap();
        let out = adopt_identity(&pushed, &snapshot);
        assert_eq!(out.len(), 2);
        let a = &out[0];
        assert_eq!((a.id, a.name.as_str(), a.ip.as_str(), a.port), (7, "alpha", "10.0.0.5", 8001));
        assert_eq!(a.status, ServerStatus::Connected);
        assert_eq!(a.cpu, 10.0);
        assert_eq!((out[1].id, out[1].code.as_str()), (8, "B"));
        assert_eq!(pushed[0].id, 0);
    }

    #[test]
    fn hydrate_fills_defaults_and_dedups_codes() {
        let updates: Vec<ServerUpdate> = serde_json::from_value(json!([
            {"code": "A", "name": "first"},
            {"code": "B", "status": "connected", "uptime": 12},
            {"code": "A", "name": "second"}
        ]))
        .unwrap();
        let out = hydrate(&updates);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "second");
        assert_eq!(out[0].status, ServerStatus::Disconnected);
        assert_eq!(out[0].uptime, 0);
        assert_eq!(out[0].downtime, 0);
        assert_eq!(out[1].status, ServerStatus::Connected);
        assert_eq!(out[1].uptime, 12);
    }
}
