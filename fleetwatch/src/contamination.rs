//! Image-based contamination alerts, upserted incrementally from the
//! `contamination-images` push.

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::types::ContaminationAlert;

/// Records kept; the oldest inserted are evicted first.
pub const CONTAMINATION_CAP: usize = 1000;

// (server code, bucket, date, status)
type AlertKey = (String, String, String, String);

fn key(a: &ContaminationAlert) -> AlertKey {
    (
        a.server_code.clone(),
        a.bucket.clone(),
        a.date.clone(),
        a.status.clone(),
    )
}

#[derive(Debug)]
pub struct ContaminationStore {
    alerts: VecDeque<ContaminationAlert>,
    /// Insertion sequence number per key; position is `seq - front_seq`.
    index: HashMap<AlertKey, u64>,
    front_seq: u64,
    cap: usize,
}

impl Default for ContaminationStore {
    fn default() -> Self {
        Self::with_cap(CONTAMINATION_CAP)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecentServers {
    pub today: BTreeSet<String>,
    /// Alerts in the 7 days before today, excluding today.
    pub this_week: BTreeSet<String>,
}

impl ContaminationStore {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            alerts: VecDeque::new(),
            index: HashMap::new(),
            front_seq: 0,
            cap: cap.max(1),
        }
    }

    /// Insert or replace by (server code, bucket, date, status). A replaced
    /// record keeps its position. Returns how many records were new.
    pub fn upsert(&mut self, incoming: Vec<ContaminationAlert>) -> usize {
        let mut added = 0;
        for alert in incoming {
            let k = key(&alert);
            match self.index.get(&k) {
                Some(&seq) => {
                    let pos = (seq - self.front_seq) as usize;
                    self.alerts[pos] = alert;
                }
                None => {
                    let seq = self.front_seq + self.alerts.len() as u64;
                    self.index.insert(k, seq);
                    self.alerts.push_back(alert);
                    added += 1;
                }
            }
        }
        while self.alerts.len() > self.cap {
            if let Some(old) = self.alerts.pop_front() {
                self.index.remove(&key(&old));
                self.front_seq += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Oldest first.
    pub fn all(&self) -> &VecDeque<ContaminationAlert> {
        &self.alerts
    }

    pub fn for_server<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a ContaminationAlert> + 'a {
        self.alerts.iter().filter(move |a| a.server_code == code)
    }

    pub fn recent_servers(&self, today: NaiveDate) -> RecentServers {
        let today_s = today.format("%Y%m%d").to_string();
        let week_ago = (today - Duration::days(7)).format("%Y%m%d").to_string();
        let mut out = RecentServers::default();
        for a in &self.alerts {
            if a.date == today_s {
                out.today.insert(a.server_code.clone());
            } else if a.date >= week_ago && a.date < today_s {
                out.this_week.insert(a.server_code.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(code: &str, date: &str, status: &str, detail: &str) -> ContaminationAlert {
        serde_json::from_value(json!({
            "serverCode": code, "date": date, "status": status, "detail": detail,
            "warning": {"sidList": ["s1"]}
        }))
        .unwrap()
    }

    #[test]
    fn upsert_replaces_same_key() {
        let mut store = ContaminationStore::default();
        assert_eq!(
            store.upsert(vec![
                alert("A", "20240501", "warning", "first"),
                alert("A", "20240501", "critical", "c"),
            ]),
            2
        );
        assert_eq!(store.upsert(vec![alert("A", "20240501", "warning", "second")]), 0);
        assert_eq!(store.all().len(), 2);
        assert_eq!(store.all()[0].detail, "second");
        assert_eq!(store.all()[0].bucket, "alert");
        assert!(store.all()[0].payload.contains_key("warning"));
        assert_eq!(store.for_server("A").count(), 2);
    }

    #[test]
    fn recent_servers_split_today_and_week() {
        let mut store = ContaminationStore::default();
        store.upsert(vec![
            alert("A", "20240510", "warning", ""),
            alert("B", "20240505", "warning", ""),
            alert("C", "20240501", "warning", ""),
            alert("D", "20240503", "warning", ""),
        ]);
        let r = store.recent_servers(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(r.today.iter().collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(r.this_week.iter().collect::<Vec<_>>(), vec!["B", "D"]);
    }

    #[test]
    fn oldest_records_are_evicted_past_the_cap() {
        let mut store = ContaminationStore::with_cap(3);
        let batch = (1..=5)
            .map(|d| alert("A", &format!("202405{d:02}"), "warning", ""))
            .collect();
        assert_eq!(store.upsert(batch), 5);
        assert_eq!(store.len(), 3);
        let dates: Vec<&str> = store.all().iter().map(|a| a.date.as_str()).collect();
        assert_eq!(dates, vec!["20240503", "20240504", "20240505"]);

        // evicted key comes back as new, surviving keys still replace in place
        assert_eq!(store.upsert(vec![alert("A", "20240501", "warning", "again")]), 1);
        assert_eq!(store.upsert(vec![alert("A", "20240505", "warning", "upd")]), 0);
        assert_eq!(store.len(), 3);
        let last: Vec<(&str, &str)> = store
            .all()
            .iter()
            .map(|a| (a.date.as_str(), a.detail.as_str()))
            .collect();
        assert_eq!(
            last,
            vec![("20240504", ""), ("20240505", "upd"), ("20240501", "again")]
        );
    }
}
