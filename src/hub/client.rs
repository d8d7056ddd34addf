use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::protocol::{
    decode_frame, encode_invocation, encode_ping, handshake_request, parse_handshake_response,
    split_frames, HubEvent, HubFrame, Invocation,
};
use crate::error::HubError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Configuration for one hub connection
#[derive(Debug, Clone)]
pub struct HubClientConfig {
    /// Hub endpoint as configured (http, https, ws or wss)
    pub hub_url: String,
    /// Session credential passed as `access_token`
    pub access_token: String,
    /// Bound on TCP/TLS connect plus the protocol handshake
    pub connect_timeout: Duration,
    /// Interval between client pings
    pub keepalive_interval: Duration,
    /// Silence from the server after which the connection is considered lost
    pub server_timeout: Duration,
    /// Bound on waiting for the loop to finish after a close request
    pub close_timeout: Duration,
}

impl HubClientConfig {
    pub fn new(hub_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            access_token: access_token.into(),
            connect_timeout: Duration::from_secs(100),
            keepalive_interval: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Build the websocket URL for a hub endpoint, appending the credential.
pub fn websocket_url(hub_url: &str, access_token: &str) -> Result<String, HubError> {
    const SCHEMES: [(&str, &str); 4] = [
        ("https://", "wss://"),
        ("http://", "ws://"),
        ("wss://", "wss://"),
        ("ws://", "ws://"),
    ];

    let trimmed = hub_url.trim();
    let (scheme, rest) = SCHEMES
        .iter()
        .find_map(|(from, to)| trimmed.strip_prefix(from).map(|rest| (*to, rest)))
        .ok_or_else(|| HubError::InvalidUrl(format!("unsupported scheme in '{}'", hub_url)))?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(HubError::InvalidUrl(format!("missing host in '{}'", hub_url)));
    }

    let separator = if rest.contains('?') { '&' } else { '?' };
    Ok(format!(
        "{}{}{}access_token={}",
        scheme,
        rest,
        separator,
        urlencoding::encode(access_token)
    ))
}

/// Map a websocket connect failure onto the hub taxonomy.
fn classify_connect_error(err: WsError) -> HubError {
    match err {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                HubError::Unauthorized { status }
            } else {
                HubError::ConnectionFailed(format!("upgrade refused with HTTP {}", status))
            }
        }
        WsError::Url(e) => HubError::InvalidUrl(e.to_string()),
        other => HubError::ConnectionFailed(other.to_string()),
    }
}

/// One open hub connection.
///
/// The socket is owned by a background task; this handle only queues
/// outgoing invocations and requests shutdown.
pub struct HubClient {
    outgoing_tx: mpsc::Sender<Invocation>,
    shutdown_tx: watch::Sender<bool>,
    open: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl HubClient {
    /// Connect and complete the protocol handshake.
    ///
    /// Returns the client and the receiver for server events.
    pub async fn connect(
        config: HubClientConfig,
    ) -> Result<(Self, mpsc::Receiver<HubEvent>), HubError> {
        let url = websocket_url(&config.hub_url, &config.access_token)?;
        let secs = config.connect_timeout.as_secs();

        let (ws_stream, _) = timeout(config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| HubError::Timeout { secs })?
            .map_err(classify_connect_error)?;

        let (mut ws_sink, mut ws_source) = ws_stream.split();

        ws_sink
            .send(Message::Text(handshake_request()))
            .await
            .map_err(|e| HubError::ConnectionFailed(e.to_string()))?;

        let pending = timeout(config.connect_timeout, read_handshake(&mut ws_source))
            .await
            .map_err(|_| HubError::Timeout { secs })??;

        info!("Connected to hub at {}", config.hub_url);

        let (events_tx, events_rx) = mpsc::channel::<HubEvent>(100);
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Invocation>(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let open = Arc::new(AtomicBool::new(true));

        let settings = LoopSettings {
            keepalive_interval: config.keepalive_interval,
            server_timeout: config.server_timeout,
        };
        let open_flag = open.clone();
        let task = tokio::spawn(async move {
            run_connection_loop(
                ws_sink,
                ws_source,
                pending,
                events_tx,
                outgoing_rx,
                shutdown_rx,
                settings,
            )
            .await;
            open_flag.store(false, Ordering::SeqCst);
        });

        Ok((
            Self {
                outgoing_tx,
                shutdown_tx,
                open,
                task: Mutex::new(Some(task)),
                close_timeout: config.close_timeout,
            },
            events_rx,
        ))
    }

    /// Check if the connection loop is still running
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Queue an invocation for the server
    pub async fn send(&self, invocation: Invocation) -> Result<(), HubError> {
        if !self.is_open() {
            return Err(HubError::Disconnected);
        }
        self.outgoing_tx
            .send(invocation)
            .await
            .map_err(|_| HubError::Disconnected)
    }

    /// Close the connection and wait for the loop to exit
    pub async fn close(&self) -> Result<(), HubError> {
        let _ = self.shutdown_tx.send(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let secs = self.close_timeout.as_secs();
            timeout(self.close_timeout, handle)
                .await
                .map_err(|_| HubError::Timeout { secs })?
                .map_err(|e| HubError::ConnectionFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Wait for the handshake reply and return any frames that came with it.
async fn read_handshake(source: &mut WsSource) -> Result<Vec<String>, HubError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                let mut frames = split_frames(&text);
                let reply = frames
                    .next()
                    .ok_or_else(|| HubError::Protocol("empty handshake response".to_string()))?;
                parse_handshake_response(reply)?;
                return Ok(frames.map(str::to_string).collect());
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "no reason".to_string());
                return Err(HubError::ConnectionFailed(format!(
                    "closed during handshake: {}",
                    reason
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(HubError::ConnectionFailed(e.to_string())),
            None => {
                return Err(HubError::ConnectionFailed(
                    "closed during handshake".to_string(),
                ))
            }
        }
    }
}

struct LoopSettings {
    keepalive_interval: Duration,
    server_timeout: Duration,
}

enum Flow {
    Continue,
    /// The server side went away; the consumer must be told.
    Lost(Option<String>),
    /// Closed on request, or nobody is listening any more.
    Stop,
}

async fn forward_frames(text: &str, events_tx: &mpsc::Sender<HubEvent>) -> Flow {
    for raw in split_frames(text) {
        match decode_frame(raw) {
            Ok(HubFrame::Invocation(invocation)) => {
                debug!("Received invocation {}", invocation.target);
                if events_tx.send(HubEvent::Invocation(invocation)).await.is_err() {
                    warn!("Hub event receiver dropped, shutting down");
                    return Flow::Stop;
                }
            }
            Ok(HubFrame::Ping) => {}
            Ok(HubFrame::Close { error, .. }) => return Flow::Lost(error),
            Ok(HubFrame::Other(kind)) => debug!("Ignoring hub frame type {}", kind),
            Err(e) => warn!("Skipping undecodable hub frame: {}", e),
        }
    }
    Flow::Continue
}

async fn run_connection_loop(
    mut ws_sink: WsSink,
    mut ws_source: WsSource,
    pending: Vec<String>,
    events_tx: mpsc::Sender<HubEvent>,
    mut outgoing_rx: mpsc::Receiver<Invocation>,
    mut shutdown_rx: watch::Receiver<bool>,
    settings: LoopSettings,
) {
    let mut keepalive = tokio::time::interval(settings.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await;
    let mut last_seen = Instant::now();

    let mut flow = Flow::Continue;
    for text in &pending {
        flow = forward_frames(text, &events_tx).await;
        if !matches!(flow, Flow::Continue) {
            break;
        }
    }

    while matches!(flow, Flow::Continue) {
        flow = tokio::select! {
            _ = shutdown_rx.changed() => {
                debug!("Shutdown requested, closing hub connection");
                let _ = ws_sink.send(Message::Close(None)).await;
                let _ = ws_sink.close().await;
                Flow::Stop
            }
            msg = ws_source.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        forward_frames(&text, &events_tx).await
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_seen = Instant::now();
                        let _ = ws_sink.send(Message::Pong(data)).await;
                        Flow::Continue
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Received close frame from hub");
                        Flow::Lost(frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty()))
                    }
                    Some(Ok(_)) => {
                        last_seen = Instant::now();
                        Flow::Continue
                    }
                    Some(Err(e)) => {
                        error!("Hub connection error: {}", e);
                        Flow::Lost(Some(e.to_string()))
                    }
                    None => Flow::Lost(None),
                }
            }
            _ = keepalive.tick() => {
                if last_seen.elapsed() > settings.server_timeout {
                    Flow::Lost(Some(format!(
                        "no message from server in {}s",
                        settings.server_timeout.as_secs()
                    )))
                } else if let Err(e) = ws_sink.send(Message::Text(encode_ping())).await {
                    Flow::Lost(Some(e.to_string()))
                } else {
                    Flow::Continue
                }
            }
            outgoing = outgoing_rx.recv() => {
                match outgoing {
                    Some(invocation) => match encode_invocation(&invocation) {
                        Ok(frame) => match ws_sink.send(Message::Text(frame)).await {
                            Ok(()) => {
                                debug!("Sent invocation {}", invocation.target);
                                Flow::Continue
                            }
                            Err(e) => Flow::Lost(Some(e.to_string())),
                        },
                        Err(e) => {
                            error!("Failed to encode invocation {}: {}", invocation.target, e);
                            Flow::Continue
                        }
                    },
                    None => Flow::Stop,
                }
            }
        };
    }

    if let Flow::Lost(error) = flow {
        warn!(
            "Hub connection lost: {}",
            error.as_deref().unwrap_or("closed by server")
        );
        let _ = events_tx.send(HubEvent::Closed { error }).await;
    }

    info!("Hub connection loop ended");
}
