//! File downloads served directly by a server's agent.

use url::Url;

use crate::types::Server;
use crate::validate::FieldError;

/// `http://{ip}:{port}/download?path=..[&filename=..]` for `server`.
pub fn download_url(server: &Server, path: &str, filename: Option<&str>) -> Result<Url, FieldError> {
    let path = path.trim();
    if path.is_empty() {
        return Err(FieldError::new("path", "file path is required"));
    }
    if server.ip.is_empty() || server.port == 0 {
        return Err(FieldError::new(
            "server",
            format!("server '{}' has no reachable address", server.code),
        ));
    }
    let host = if server.ip.contains(':') && !server.ip.starts_with('[') {
        format!("[{}]", server.ip)
    } else {
        server.ip.clone()
    };
    let mut url = Url::parse(&format!("http://{host}:{}/download", server.port))
        .map_err(|e| FieldError::new("server", e.to_string()))?;
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("path", path);
        if let Some(name) = filename.map(str::trim).filter(|n| !n.is_empty()) {
            q.append_pair("filename", name);
        }
    }
    Ok(url)
}
