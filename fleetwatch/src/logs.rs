//! Server logs: the live `server-log` feed and the filter set for paged
//! queries against `/api/logs`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::VecDeque;

use crate::history::push_capped;
use crate::types::{LogEntry, LogSeverity};

pub const LIVE_LOG_CAP: usize = 500;

/// Newest-first buffer of pushed log lines.
#[derive(Debug)]
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    cap: usize,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(LIVE_LOG_CAP)
    }
}

impl LogStore {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        // stored oldest -> newest so push_capped evicts the oldest
        push_capped(&mut self.entries, entry, self.cap);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first, optionally restricted to one server code.
    pub fn recent<'a>(&'a self, code: Option<&'a str>) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries
            .iter()
            .rev()
            .filter(move |e| code.map_or(true, |c| e.server_code == c))
    }
}

/// Filters for `GET /api/logs`. Unset fields are not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub server_code: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub severity: Option<LogSeverity>,
    pub search: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            server_code: None,
            page: 1,
            page_size: 20,
            start_date: None,
            end_date: None,
            severity: None,
            search: None,
        }
    }
}

impl LogQuery {
    pub fn server(mut self, code: impl Into<String>) -> Self {
        self.server_code = Some(code.into());
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page.max(1);
        self.page_size = page_size.max(1);
        self
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn severity(mut self, severity: LogSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.search = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Query-string pairs in the backend's parameter names.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("page", self.page.to_string()),
            ("pageSize", self.page_size.to_string()),
        ];
        if let Some(c) = &self.server_code {
            out.push(("serverCode", c.clone()));
        }
        if let Some(d) = self.start_date {
            out.push(("startDate", d.format("%Y-%m-%d").to_string()));
        }
        if let Some(d) = self.end_date {
            out.push(("endDate", d.format("%Y-%m-%d").to_string()));
        }
        if let Some(s) = self.severity {
            out.push(("type", s.as_str().to_string()));
        }
        if let Some(s) = &self.search {
            out.push(("search", s.clone()));
        }
        out
    }
}

/// One page of `/api/logs`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub total: u64,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

fn first_page() -> u32 {
    1
}

impl LogPage {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 1;
        }
        self.total.div_ceil(u64::from(self.page_size)).max(1)
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

pub fn newest(entries: &[LogEntry]) -> Option<DateTime<Utc>> {
    entries.iter().map(|e| e.timestamp).max()
}
