//! REST client for the monitoring backend. Every response is wrapped as
//! `{ statusCode, message, data }`; this module unwraps it and turns HTTP
//! failures and bad envelopes into `ApiError`.

use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::logs::{LogPage, LogQuery};
use crate::types::{Mail, Notification, ServerForm, ServerUpdate};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("invalid base url: {0}")]
    BaseUrl(String),
    #[error("invalid TLS CA bundle: {0}")]
    Tls(String),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Backend response wrapper.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

#[derive(Serialize)]
struct NewMail<'a> {
    email: &'a str,
}

/// Race a request against a cancellation token, for callers that may go away
/// before the response arrives.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ApiError::Cancelled),
        res = fut => res,
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: &str, tls_ca: Option<&str>) -> Result<Self, ApiError> {
        let mut base = Url::parse(base).map_err(|e| ApiError::BaseUrl(format!("{base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::BaseUrl(base.to_string()));
        }
        if !base.path().ends_with('/') {
            let p = format!("{}/", base.path());
            base.set_path(&p);
        }

        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(path) = tls_ca {
            let pem = std::fs::read(path)?;
            let cert =
                reqwest::Certificate::from_pem(&pem).map_err(|e| ApiError::Tls(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Tls(e.to_string()))?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    // base + percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::BaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<Option<T>, ApiError> {
        debug!(%url, "calling backend");
        let resp = req.send().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        let env: Envelope<T> =
            serde_json::from_slice(&body).map_err(|e| ApiError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !(200..300).contains(&env.status_code) {
            return Err(ApiError::Malformed {
                url: url.to_string(),
                reason: format!("statusCode {}: {}", env.status_code, env.message),
            });
        }
        Ok(env.data)
    }

    async fn send_data<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<T, ApiError> {
        self.send(req, url).await?.ok_or_else(|| ApiError::Malformed {
            url: url.to_string(),
            reason: "missing data".into(),
        })
    }

    async fn send_unit(&self, req: reqwest::RequestBuilder, url: &Url) -> Result<(), ApiError> {
        self.send::<serde_json::Value>(req, url).await.map(|_| ())
    }

    // ---- servers ----

    /// Full roster snapshot.
    pub async fn servers(&self) -> Result<Vec<ServerUpdate>, ApiError> {
        let url = self.endpoint(&["api", "server"])?;
        self.send_data(self.http.get(url.clone()), &url).await
    }

    /// Returns the created record when the backend echoes it back.
    pub async fn create_server(&self, form: &ServerForm) -> Result<Option<ServerUpdate>, ApiError> {
        let url = self.endpoint(&["api", "server", "create"])?;
        let data: Option<serde_json::Value> = self.send(self.http.post(url.clone()).json(form), &url).await?;
        Ok(data.and_then(|v| serde_json::from_value(v).ok()))
    }

    pub async fn update_server(&self, id: i64, form: &ServerForm) -> Result<(), ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["api", "server", &id])?;
        self.send_unit(self.http.put(url.clone()).json(form), &url).await
    }

    pub async fn delete_server(&self, id: i64) -> Result<(), ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["api", "server", &id])?;
        self.send_unit(self.http.delete(url.clone()), &url).await
    }

    pub async fn delete_process(&self, server_code: &str, process: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "server", server_code, "process", process])?;
        self.send_unit(self.http.delete(url.clone()), &url).await
    }

    // ---- notifications ----

    pub async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let url = self.endpoint(&["api", "notifications"])?;
        self.send_data(self.http.get(url.clone()), &url).await
    }

    pub async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["api", "notifications", &id, "read"])?;
        self.send_unit(self.http.put(url.clone()), &url).await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "notifications", "read-all"])?;
        self.send_unit(self.http.put(url.clone()), &url).await
    }

    pub async fn delete_notification(&self, id: i64) -> Result<(), ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["api", "notifications", &id])?;
        self.send_unit(self.http.delete(url.clone()), &url).await
    }

    pub async fn delete_all_notifications(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "notifications"])?;
        self.send_unit(self.http.delete(url.clone()), &url).await
    }

    // ---- mail recipients ----

    pub async fn mails(&self) -> Result<Vec<Mail>, ApiError> {
        let url = self.endpoint(&["api", "mail"])?;
        self.send_data(self.http.get(url.clone()), &url).await
    }

    pub async fn add_mail(&self, email: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "mail", "create"])?;
        self.send_unit(self.http.post(url.clone()).json(&NewMail { email }), &url)
            .await
    }

    pub async fn delete_mail(&self, id: i64) -> Result<(), ApiError> {
        let id = id.to_string();
        let url = self.endpoint(&["api", "mail", &id])?;
        self.send_unit(self.http.delete(url.clone()), &url).await
    }

    // ---- logs ----

    pub async fn logs(&self, query: &LogQuery) -> Result<LogPage, ApiError> {
        let url = self.endpoint(&["api", "logs"])?;
        self.send_data(self.http.get(url.clone()).query(&query.to_pairs()), &url)
            .await
    }

    // ---- files ----

    /// Stream a file served by an agent (see `download::download_url`) to `dest`.
    /// The body goes to `<dest>.part` first and is renamed once complete, so a
    /// failed transfer never leaves a truncated `dest`. Returns the number of
    /// bytes written.
    pub async fn download(&self, url: &Url, dest: &Path) -> Result<u64, ApiError> {
        debug!(%url, dest = %dest.display(), "downloading");
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let part = part_path(dest);
        match write_body(resp, url, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest).await?;
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_body(resp: reqwest::Response, url: &Url, path: &Path) -> Result<u64, ApiError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
