//! Small utilities to manage bounded history buffers for charts.

use serde::Serialize;
use std::collections::VecDeque;

use crate::types::Metric;

/// Rolling window length per metric series.
pub const HISTORY_WINDOW: usize = 24;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while dq.len() >= cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

// Keeps the newest `cap` values of a backend-provided series
fn capped_from(values: Option<Vec<f64>>, cap: usize) -> VecDeque<f64> {
    let values = values.unwrap_or_default();
    let start = values.len().saturating_sub(cap);
    values.into_iter().skip(start).collect()
}

/// One bounded series per metric. Owned by the client: the push channel does
/// not carry it reliably, so merges preserve it and only `record` appends.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct History {
    pub cpu: VecDeque<f64>,
    pub ram: VecDeque<f64>,
    pub disk: VecDeque<f64>,
    pub gpu: VecDeque<f64>,
    pub network: VecDeque<f64>,
}

impl History {
    pub fn from_series(
        cpu: Option<Vec<f64>>,
        ram: Option<Vec<f64>>,
        disk: Option<Vec<f64>>,
        gpu: Option<Vec<f64>>,
        network: Option<Vec<f64>>,
    ) -> Self {
        Self {
            cpu: capped_from(cpu, HISTORY_WINDOW),
            ram: capped_from(ram, HISTORY_WINDOW),
            disk: capped_from(disk, HISTORY_WINDOW),
            gpu: capped_from(gpu, HISTORY_WINDOW),
            network: capped_from(network, HISTORY_WINDOW),
        }
    }

    pub fn series(&self, metric: Metric) -> &VecDeque<f64> {
        match metric {
            Metric::Cpu => &self.cpu,
            Metric::Ram => &self.ram,
            Metric::Disk => &self.disk,
            Metric::Gpu => &self.gpu,
            Metric::Network => &self.network,
        }
    }

    fn series_mut(&mut self, metric: Metric) -> &mut VecDeque<f64> {
        match metric {
            Metric::Cpu => &mut self.cpu,
            Metric::Ram => &mut self.ram,
            Metric::Disk => &mut self.disk,
            Metric::Gpu => &mut self.gpu,
            Metric::Network => &mut self.network,
        }
    }

    pub fn record(&mut self, metric: Metric, value: f64) {
        push_capped(self.series_mut(metric), value, HISTORY_WINDOW);
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|m| self.series(*m).is_empty())
    }
}

/// Sparkline-friendly copy of a series (0..=100, rounded).
pub fn spark_points(dq: &VecDeque<f64>, max_points: usize) -> Vec<u64> {
    let start = dq.len().saturating_sub(max_points);
    dq.iter()
        .skip(start)
        .map(|v| v.clamp(0.0, 100.0).round() as u64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_capped_trims_front() {
        let mut dq: VecDeque<u32> = (0..3).collect();
        push_capped(&mut dq, 3, 3);
        assert_eq!(dq, VecDeque::from(vec![1, 2, 3]));
    }

    #[test]
    fn from_series_keeps_newest_window() {
        let long: Vec<f64> = (0..30).map(f64::from).collect();
        let h = History::from_series(Some(long), None, None, None, None);
        assert_eq!(h.cpu.len(), HISTORY_WINDOW);
        assert_eq!(h.cpu.front(), Some(&6.0));
        assert_eq!(h.cpu.back(), Some(&29.0));
        assert!(h.ram.is_empty());
    }

    #[test]
    fn record_sample_never_exceeds_window() {
        let mut s = crate::types::Server {
            cpu: 10.0,
            ram: 20.0,
            ..Default::default()
        };
        for _ in 0..(HISTORY_WINDOW + 5) {
            s.record_sample();
        }
        assert_eq!(s.history.cpu.len(), HISTORY_WINDOW);
        assert_eq!(s.history.ram.back(), Some(&20.0));
        assert_eq!(s.history.gpu.back(), Some(&0.0));
    }

    #[test]
    fn spark_points_clamps_and_limits() {
        let dq = VecDeque::from(vec![-5.0, 50.4, 150.0]);
        assert_eq!(spark_points(&dq, 2), vec![50, 100]);
    }
}
