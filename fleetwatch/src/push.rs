//! WebSocket push channel to the monitoring backend.
//!
//! Frames are JSON text messages `{"event": <name>, "data": <payload>}`. The
//! client owns a handler registry keyed by event name; registering a handler
//! for a name replaces the previous one, so re-subscribing never stacks
//! duplicate handlers. `run` keeps the connection alive with exponential
//! backoff until its cancellation token fires.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event names used on the push channel.
pub mod events {
    pub const UPDATE: &str = "update";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const SERVER_LOG: &str = "server-log";
    pub const COMMAND: &str = "command";
    pub const COMMAND_SHOW: &str = "command_show";
    pub const CONTAMINATION_IMAGES: &str = "contamination-images";
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push url must be ws:// or wss://, got {0}")]
    Scheme(String),
    #[error("invalid push url: {0}")]
    Url(#[from] url::ParseError),
    #[error("websocket: {0}")]
    Ws(#[from] tungstenite::Error),
    #[error("connection closed by server")]
    Closed,
    #[error("TLS setup: {0}")]
    Tls(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("bad frame: {0}")]
    Frame(#[from] serde_json::Error),
    #[error("push client is shut down")]
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// One message on the push channel, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn parse(text: &str) -> Result<Self, PushError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, PushError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Backoff parameters for reconnecting the push channel.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Next delay after `current`, clamped to `max_delay`.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Event name -> handler. At most one handler per name.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    inner: Arc<Mutex<HashMap<String, Handler>>>,
}

impl HandlerRegistry {
    /// Returns true when a previous handler was replaced.
    pub fn on<F>(&self, event: &str, handler: F) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(event.to_string(), Arc::new(handler)).is_some()
    }

    pub fn off(&self, event: &str) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.remove(event).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the handler for `frame.event`. Returns false when none is
    /// registered.
    pub fn dispatch(&self, frame: Frame) -> bool {
        // clone out so a handler may call on/off without deadlocking
        let handler = {
            let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            map.get(&frame.event).cloned()
        };
        match handler {
            Some(h) => {
                h(frame.data);
                true
            }
            None => false,
        }
    }
}

// Root store from a PEM bundle, for backends behind a private CA
fn load_tls_config(ca_path: &Path) -> Result<Arc<rustls::ClientConfig>, PushError> {
    let pem = std::fs::read(ca_path)?;
    let mut roots = rustls::RootCertStore::empty();
    let mut reader = std::io::Cursor::new(pem);
    for cert in rustls_pemfile::certs(&mut reader) {
        roots
            .add(cert?)
            .map_err(|e| PushError::Tls(e.to_string()))?;
    }
    if roots.is_empty() {
        return Err(PushError::Tls(format!(
            "no certificates in {}",
            ca_path.display()
        )));
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let cfg = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| PushError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(cfg))
}

/// Connection manager for the push channel. One per dashboard instance.
pub struct PushClient {
    url: Url,
    tls: Option<Arc<rustls::ClientConfig>>,
    reconnect: ReconnectConfig,
    handlers: HandlerRegistry,
    outbound_tx: mpsc::UnboundedSender<Frame>,
    outbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    state: watch::Sender<ConnectionState>,
}

impl PushClient {
    pub fn new(url: &str, tls_ca: Option<&Path>) -> Result<Self, PushError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(PushError::Scheme(url.to_string()));
        }
        let tls = tls_ca.map(load_tls_config).transpose()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            url,
            tls,
            reconnect: ReconnectConfig::default(),
            handlers: HandlerRegistry::default(),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(outbound_rx),
            state,
        })
    }

    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Register `handler` for `event`, replacing any existing one.
    pub fn on<F>(&self, event: &str, handler: F) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers.on(event, handler)
    }

    pub fn off(&self, event: &str) -> bool {
        self.handlers.off(event)
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Queue an outbound frame. Frames queued while disconnected are sent
    /// after the next successful connect.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), PushError> {
        self.outbound_tx
            .send(Frame::new(event, data))
            .map_err(|_| PushError::Shutdown)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    async fn connect(&self) -> Result<WsStream, PushError> {
        let (ws, _) = match &self.tls {
            Some(cfg) => {
                connect_async_tls_with_config(
                    self.url.as_str(),
                    None,
                    false,
                    Some(Connector::Rustls(cfg.clone())),
                )
                .await?
            }
            None => connect_async(self.url.as_str()).await?,
        };
        Ok(ws)
    }

    /// Keep the channel connected until `cancel` fires. Only one `run` may be
    /// active per client; a second call waits for the first to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut outbound = self.outbound_rx.lock().await;
        // frame taken off the queue but not yet written
        let mut unsent: Option<Frame> = None;
        let mut delay = self.reconnect.initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting);
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.connect() => res,
            };

            match connected {
                Ok(ws) => {
                    info!(url = %self.url, attempt, "push channel connected");
                    self.state.send_replace(ConnectionState::Connected);
                    delay = self.reconnect.initial_delay;
                    attempt = 0;
                    match self.session(ws, &mut outbound, &mut unsent, &cancel).await {
                        Ok(()) => break,
                        Err(e) => warn!(error = %e, "push channel dropped"),
                    }
                }
                Err(e) => {
                    warn!(
                        url = %self.url,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "push connect attempt {attempt} failed",
                    );
                }
            }

            self.state.send_replace(ConnectionState::Disconnected);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = next_delay(delay, &self.reconnect);
        }

        self.state.send_replace(ConnectionState::Disconnected);
        info!(url = %self.url, "push channel stopped");
    }

    // Ok(()) means cancelled; any Err means reconnect.
    async fn session(
        &self,
        ws: WsStream,
        outbound: &mut mpsc::UnboundedReceiver<Frame>,
        unsent: &mut Option<Frame>,
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        let (mut sink, mut stream) = ws.split();
        if let Some(frame) = unsent.as_ref() {
            sink.send(Message::Text(frame.encode()?)).await?;
            *unsent = None;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(frame) = outbound.recv() => {
                    debug!(event = %frame.event, "push send");
                    let text = frame.encode()?;
                    *unsent = Some(frame);
                    sink.send(Message::Text(text)).await?;
                    *unsent = None;
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.on_text(&text),
                    Some(Ok(Message::Close(_))) | None => return Err(PushError::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                },
            }
        }
    }

    fn on_text(&self, text: &str) {
        match Frame::parse(text) {
            Ok(frame) => {
                let event = frame.event.clone();
                if !self.handlers.dispatch(frame) {
                    debug!(%event, "no handler for push event");
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed push frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backoff_sequence_caps_at_thirty_seconds() {
        let config = ReconnectConfig::default();
        let mut delay = config.initial_delay;
        for expected in [1, 2, 4, 8, 16, 30, 30] {
            assert_eq!(delay.as_secs(), expected);
            delay = next_delay(delay, &config);
        }
    }

    #[test]
    fn resubscribing_replaces_the_handler() {
        let reg = HandlerRegistry::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        assert!(!reg.on(events::UPDATE, move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        let s = second.clone();
        assert!(reg.on(events::UPDATE, move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(reg.len(), 1);

        assert!(reg.dispatch(Frame::new(events::UPDATE, json!([]))));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        assert!(reg.off(events::UPDATE));
        assert!(!reg.dispatch(Frame::new(events::UPDATE, json!([]))));
        assert!(reg.is_empty());
    }

    #[test]
    fn handler_may_touch_registry_during_dispatch() {
        let reg = HandlerRegistry::default();
        let inner = reg.clone();
        reg.on("once", move |_| {
            inner.off("once");
        });
        assert!(reg.dispatch(Frame::new("once", Value::Null)));
        assert!(reg.is_empty());
    }

    #[test]
    fn frames_parse_with_missing_data() {
        let f = Frame::parse(r#"{"event":"notifications"}"#).unwrap();
        assert_eq!(f.event, events::NOTIFICATIONS);
        assert_eq!(f.data, Value::Null);
        assert!(Frame::parse("not json").is_err());
        let text = Frame::new(events::COMMAND, json!({"serverCode": "A"}))
            .encode()
            .unwrap();
        assert!(text.contains(r#""event":"command""#));
    }

    #[test]
    fn rejects_non_websocket_urls() {
        assert!(matches!(
            PushClient::new("http://localhost:8000/ws", None),
            Err(PushError::Scheme(_))
        ));
        let client = PushClient::new("ws://localhost:8000/ws", None).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn emit_queues_until_connected_and_run_stops_on_cancel() {
        let client = PushClient::new("ws://127.0.0.1:9/ws", None)
            .unwrap()
            .with_reconnect(ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                multiplier: 2.0,
            });
        client.emit(events::COMMAND, json!({})).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        client.run(cancel).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
