//! Edge-triggered resource alerts derived from roster samples.
//!
//! The tracker remembers the last value seen per (server code, metric) on its
//! own, so crossings are still detected when the roster itself is replaced by
//! a full refresh.

use std::collections::HashMap;

use crate::types::{Metric, Server, ServerStatus};

pub const DEFAULT_THRESHOLD: f64 = 60.0;

const WATCHED: [Metric; 4] = [Metric::Cpu, Metric::Ram, Metric::Disk, Metric::Gpu];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// Went from below the threshold to at/above it.
    High,
    /// Went from at/above the threshold back below it.
    Recovered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdEvent {
    pub server_code: String,
    pub server_name: String,
    pub metric: Metric,
    pub value: f64,
    pub crossing: Crossing,
}

impl ThresholdEvent {
    pub fn message(&self, threshold: f64) -> String {
        match self.crossing {
            Crossing::High => format!(
                "{} usage on {} is {:.1}% (threshold {:.0}%)",
                self.metric.label(),
                self.display_name(),
                self.value,
                threshold
            ),
            Crossing::Recovered => format!(
                "{} usage on {} recovered to {:.1}%",
                self.metric.label(),
                self.display_name(),
                self.value
            ),
        }
    }

    fn display_name(&self) -> &str {
        if self.server_name.is_empty() {
            &self.server_code
        } else {
            &self.server_name
        }
    }
}

#[derive(Debug)]
pub struct ThresholdTracker {
    threshold: f64,
    last: HashMap<(String, Metric), f64>,
}

impl Default for ThresholdTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ThresholdTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last: HashMap::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record one sample. The first sample for a key counts as coming from
    /// below the threshold.
    pub fn observe(&mut self, code: &str, metric: Metric, value: f64) -> Option<Crossing> {
        let prev = self.last.insert((code.to_string(), metric), value);
        let was_high = prev.is_some_and(|p| p >= self.threshold);
        let is_high = value >= self.threshold;
        match (was_high, is_high) {
            (false, true) => Some(Crossing::High),
            (true, false) => Some(Crossing::Recovered),
            _ => None,
        }
    }

    /// Check every watched metric of every connected server in a roster snapshot.
    pub fn observe_roster(&mut self, roster: &[Server]) -> Vec<ThresholdEvent> {
        let mut events = Vec::new();
        for s in roster
            .iter()
            .filter(|s| s.status != ServerStatus::Disconnected)
        {
            for metric in WATCHED {
                let value = s.metric(metric);
                if let Some(crossing) = self.observe(&s.code, metric, value) {
                    events.push(ThresholdEvent {
                        server_code: s.code.clone(),
                        server_name: s.name.clone(),
                        metric,
                        value,
                        crossing,
                    });
                }
            }
        }
        events
    }

    /// Drop state for servers no longer in the roster.
    pub fn retain_codes(&mut self, roster: &[Server]) {
        self.last
            .retain(|(code, _), _| roster.iter().any(|s| &s.code == code));
    }
}
