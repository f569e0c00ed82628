//! Runtime configuration: backend endpoints from flags, profiles or the
//! environment.

use std::path::PathBuf;
use url::Url;

use crate::profiles::ProfileEntry;

pub const ENV_API_URL: &str = "FLEETWATCH_API_URL";
pub const ENV_PUSH_URL: &str = "FLEETWATCH_PUSH_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {what} url '{url}': {reason}")]
    InvalidUrl {
        what: &'static str,
        url: String,
        reason: String,
    },
    #[error("TLS CA file not found: {0}")]
    MissingCa(PathBuf),
    #[error("cannot prepare log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_url: Url,
    pub push_url: Url,
    pub tls_ca: Option<PathBuf>,
}

fn parse(what: &'static str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let bad = |reason: String| ConfigError::InvalidUrl {
        what,
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| bad(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(bad(format!("expected {}", schemes.join(" or "))));
    }
    if url.host_str().is_none() {
        return Err(bad("missing host".into()));
    }
    Ok(url)
}

/// `http(s)://host:port/...` -> `ws(s)://host:port/ws`
pub fn derive_push_url(api: &Url) -> Result<Url, ConfigError> {
    let scheme = if api.scheme() == "https" { "wss" } else { "ws" };
    let host = api.host_str().ok_or_else(|| ConfigError::InvalidUrl {
        what: "api",
        url: api.to_string(),
        reason: "missing host".into(),
    })?;
    let raw = match api.port() {
        Some(p) => format!("{scheme}://{host}:{p}/ws"),
        None => format!("{scheme}://{host}/ws"),
    };
    parse("push", &raw, &["ws", "wss"])
}

impl Config {
    pub fn from_entry(entry: &ProfileEntry) -> Result<Self, ConfigError> {
        let api_url = parse("api", &entry.api_url, &["http", "https"])?;
        let push_url = match entry.push_url.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(raw) => parse("push", raw, &["ws", "wss"])?,
            None => derive_push_url(&api_url)?,
        };
        let tls_ca = entry.tls_ca.as_ref().map(PathBuf::from);
        if let Some(ca) = &tls_ca {
            if !ca.exists() {
                return Err(ConfigError::MissingCa(ca.clone()));
            }
        }
        Ok(Self {
            api_url,
            push_url,
            tls_ca,
        })
    }
}

/// Endpoints from `FLEETWATCH_API_URL` / `FLEETWATCH_PUSH_URL`, defaulting the
/// API to localhost.
pub fn env_entry() -> ProfileEntry {
    let non_empty = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
    ProfileEntry {
        api_url: non_empty(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        push_url: non_empty(ENV_PUSH_URL),
        tls_ca: None,
    }
}

/// $XDG_STATE_HOME/fleetwatch, falling back to the platform data dir.
pub fn log_dir() -> PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
        PathBuf::from(state).join("fleetwatch")
    } else {
        dirs_next::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fleetwatch")
    }
}
