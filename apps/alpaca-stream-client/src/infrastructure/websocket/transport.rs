//! WebSocket Transport
//!
//! [`Transport`] backed by `tokio-tungstenite`. Each `open` spawns a socket
//! task that reports back through a [`TransportSink`], tagging every event
//! with the generation of the socket that produced it. `open` and `close`
//! advance the generation, so the owner can drop events from superseded
//! sockets by comparing against [`WebSocketTransport::generation`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::tungstenite::{self, Message};

use super::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use crate::application::ports::{Frame, OpenOptions, Transport, TransportEvent};

/// Time a retired socket task gets to send its close frame before it is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Receives `(generation, event)` pairs from socket tasks.
pub type TransportSink = Arc<dyn Fn(u64, TransportEvent) + Send + Sync>;

/// Errors raised while opening a socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Handshake or I/O failure.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// Heartbeat timed out.
    #[error("no traffic from server for {0:?}")]
    HeartbeatTimeout(Duration),
}

/// WebSocket transport. Must be used inside a tokio runtime.
pub struct WebSocketTransport {
    heartbeat: HeartbeatConfig,
    sink: TransportSink,
    generation: Arc<AtomicU64>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a transport that reports to `sink`.
    #[must_use]
    pub fn new(heartbeat: HeartbeatConfig, sink: TransportSink) -> Self {
        install_crypto_provider();
        Self {
            heartbeat,
            sink,
            generation: Arc::new(AtomicU64::new(0)),
            outbound: None,
            task: None,
        }
    }

    /// Shared counter holding the generation of the current socket.
    #[must_use]
    pub fn generation(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    fn retire(&mut self) -> u64 {
        // Dropping the sender lets a live socket send its close frame and exit.
        // A task still stuck in the handshake never sees that, so it is aborted
        // once the grace period runs out.
        self.outbound = None;
        if let Some(task) = self.task.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        tokio::time::sleep(CLOSE_GRACE).await;
                        task.abort();
                    });
                }
                Err(_) => task.abort(),
            }
        }
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("generation", &self.generation.load(Ordering::Acquire))
            .field("open", &self.outbound.is_some())
            .finish_non_exhaustive()
    }
}

impl Transport for WebSocketTransport {
    fn open(&mut self, url: &str, options: OpenOptions) {
        let generation = self.retire();
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        self.task = Some(tokio::spawn(run_socket(
            url.to_string(),
            options,
            generation,
            Arc::clone(&self.sink),
            rx,
            self.heartbeat,
        )));
    }

    fn send(&mut self, frame: Frame) {
        let Some(outbound) = &self.outbound else {
            tracing::debug!("send on closed transport ignored");
            return;
        };
        if outbound.send(frame).is_err() {
            tracing::debug!("socket task gone, frame dropped");
        }
    }

    fn close(&mut self) {
        self.retire();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Install the ring crypto provider for rustls. Later calls are no-ops.
fn install_crypto_provider() {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

async fn run_socket(
    url: String,
    options: OpenOptions,
    generation: u64,
    sink: TransportSink,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    heartbeat: HeartbeatConfig,
) {
    let emit = |event: TransportEvent| sink(generation, event);

    if let Err(e) = drive_socket(&url, options, &emit, &mut outbound, heartbeat).await {
        tracing::warn!(url = %url, generation, error = %e, "socket failed");
        emit(TransportEvent::Error(e.to_string()));
    }
    emit(TransportEvent::Closed);
}

async fn drive_socket(
    url: &str,
    options: OpenOptions,
    emit: &impl Fn(TransportEvent),
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    heartbeat: HeartbeatConfig,
) -> Result<(), TransportError> {
    let mut request = url.into_client_request()?;
    if options.msgpack {
        request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/msgpack"),
        );
    }

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
    let (mut write, mut read) = ws_stream.split();
    emit(TransportEvent::Opened);

    let mut monitor = HeartbeatMonitor::new(&heartbeat, Instant::now());
    let mut ping = heartbeat.is_enabled().then(|| {
        let start = tokio::time::Instant::now() + heartbeat.ping_interval;
        let mut ping = tokio::time::interval_at(start, heartbeat.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ping
    });

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    tracing::debug!("transport closed locally");
                    // Best effort; the socket is abandoned either way.
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                };
                write.send(into_message(frame)).await?;
            }
            () = tick(ping.as_mut()) => {
                let now = Instant::now();
                if monitor.is_expired(now) {
                    return Err(TransportError::HeartbeatTimeout(monitor.silence(now)));
                }
                write.send(Message::Ping(Vec::new().into())).await?;
            }
            message = read.next() => {
                let Some(message) = message else {
                    tracing::info!("WebSocket stream ended");
                    return Ok(());
                };
                let message = message?;
                monitor.record_activity(Instant::now());
                match message {
                    Message::Text(text) => {
                        emit(TransportEvent::Message(Frame::Text(text.as_str().to_owned())));
                    }
                    Message::Binary(bytes) => {
                        emit(TransportEvent::Message(Frame::Binary(bytes.to_vec())));
                    }
                    Message::Ping(data) => write.send(Message::Pong(data)).await?,
                    Message::Close(frame) => {
                        tracing::info!(frame = ?frame, "server sent close frame");
                        return Ok(());
                    }
                    Message::Pong(_) | Message::Frame(_) => {}
                }
            }
        }
    }
}

/// Next ping tick, or never when the heartbeat is disabled.
async fn tick(ping: Option<&mut Interval>) {
    match ping {
        Some(ping) => {
            ping.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn into_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

#[cfg(test)]
mod tests {

    use tokio::net::TcpListener;

    use super::*;

    type Events = Arc<parking_lot::Mutex<Vec<(u64, TransportEvent)>>>;

    fn recording_sink() -> (TransportSink, Events, Arc<tokio::sync::Notify>) {
        let events: Events = Arc::default();
        let notify = Arc::new(tokio::sync::Notify::new());
        let (e, n) = (Arc::clone(&events), Arc::clone(&notify));
        let sink: TransportSink = Arc::new(move |generation, event| {
            e.lock().push((generation, event));
            n.notify_one();
        });
        (sink, events, notify)
    }

    async fn wait_for(
        events: &Events,
        notify: &tokio::sync::Notify,
        pred: impl Fn(&[(u64, TransportEvent)]) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !pred(&events.lock()) {
                notify.notified().await;
            }
        })
        .await
        .expect("timed out waiting for transport events");
    }

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(message)) = ws.next().await {
                        if message.is_text() || message.is_binary() {
                            ws.send(message).await.unwrap();
                        }
                    }
                });
            }
        });
        format!("ws://{addr}")
    }

    #[test]
    fn frames_map_to_messages() {
        assert_eq!(into_message(Frame::Text("hi".into())), Message::Text("hi".into()));
        assert_eq!(
            into_message(Frame::Binary(vec![1, 2])),
            Message::Binary(vec![1, 2].into())
        );
    }

    #[tokio::test]
    async fn open_send_receive_close() {
        let url = echo_server().await;
        let (sink, events, notify) = recording_sink();
        let mut transport = WebSocketTransport::new(HeartbeatConfig::default(), sink);

        transport.open(&url, OpenOptions::default());
        wait_for(&events, &notify, |e| e.iter().any(|(_, ev)| *ev == TransportEvent::Opened)).await;
        transport.send(Frame::Text("hello".into()));
        wait_for(&events, &notify, |e| e.len() >= 2).await;

        let received = events.lock().clone();
        assert_eq!(
            received,
            vec![
                (1, TransportEvent::Opened),
                (1, TransportEvent::Message(Frame::Text("hello".into()))),
            ]
        );

        let generation = transport.generation();
        transport.close();
        assert_eq!(generation.load(Ordering::Acquire), 2);
        wait_for(&events, &notify, |e| e.iter().any(|(_, ev)| *ev == TransportEvent::Closed)).await;
    }

    #[tokio::test]
    async fn unreachable_host_reports_error_then_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let (sink, events, notify) = recording_sink();
        let mut transport = WebSocketTransport::new(HeartbeatConfig::default(), sink);

        transport.open(&format!("ws://{addr}"), OpenOptions::default());
        wait_for(&events, &notify, |e| e.iter().any(|(_, ev)| *ev == TransportEvent::Closed)).await;

        let received = events.lock().clone();
        assert!(matches!(received[0], (1, TransportEvent::Error(_))));
        assert_eq!(received[1], (1, TransportEvent::Closed));
    }

    #[tokio::test]
    async fn reopen_advances_generation() {
        let url = echo_server().await;
        let (sink, events, notify) = recording_sink();
        let mut transport = WebSocketTransport::new(HeartbeatConfig::default(), sink);

        transport.open(&url, OpenOptions::default());
        transport.open(&url, OpenOptions { msgpack: true });
        wait_for(&events, &notify, |e| {
            e.iter().any(|(g, ev)| *g == 2 && *ev == TransportEvent::Opened)
        })
        .await;

        assert_eq!(transport.generation().load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn zero_heartbeat_interval_disables_pings() {
        let url = echo_server().await;
        let (sink, events, notify) = recording_sink();
        let heartbeat = HeartbeatConfig::new(Duration::ZERO, Duration::from_secs(40));
        let mut transport = WebSocketTransport::new(heartbeat, sink);

        transport.open(&url, OpenOptions::default());
        transport.send(Frame::Text("still alive".into()));
        wait_for(&events, &notify, |e| e.len() >= 2).await;

        assert_eq!(
            events.lock().clone(),
            vec![
                (1, TransportEvent::Opened),
                (1, TransportEvent::Message(Frame::Text("still alive".into()))),
            ]
        );

        transport.close();
        wait_for(&events, &notify, |e| e.iter().any(|(_, ev)| *ev == TransportEvent::Closed)).await;
        assert!(!events.lock().iter().any(|(_, ev)| matches!(ev, TransportEvent::Error(_))));
    }

    #[tokio::test]
    async fn close_aborts_a_stalled_handshake() {
        use tokio::io::AsyncReadExt;

        // Accepts TCP but never answers the upgrade request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (sink, _events, _notify) = recording_sink();
        let mut transport = WebSocketTransport::new(HeartbeatConfig::default(), sink);

        transport.open(&url, OpenOptions::default());
        let (mut socket, _) = listener.accept().await.unwrap();
        transport.close();

        // The aborted task drops its end, so the server side reaches EOF.
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            let mut buf = [0u8; 1024];
            while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
        })
        .await;
        assert!(drained.is_ok(), "socket task outlived close");
    }
}
