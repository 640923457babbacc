// Copyright (c) 2026, the vadstream authors
// SPDX-License-Identifier: BSD-2-Clause

//! WebSocket front-end: accept loop, session registry, and per-session
//! worker tasks.
//!
//! Each connection gets exactly one [`Session`]. The connection's read loop
//! decodes inbound messages and enqueues them on a bounded per-session
//! mailbox; a dedicated worker task owns the session and the socket's write
//! half, so `process_chunk` is never entered concurrently for a session and
//! events leave in input order. Sessions run independently of each other.
//!
//! A full mailbox drops the chunk and counts it — backpressure is surfaced
//! in the logs and in the session's teardown stats, never applied silently.
//! Shutdown is cooperative through a [`CancellationToken`]: the accept loop,
//! every read loop, and every worker select on it, so no task is ever parked
//! on a queue that can no longer be woken.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DetectorKind};
use crate::error::ServerError;
use crate::protocol::{self, DecodeError, InboundMessage};
use crate::session::{Session, VadEvent};
use crate::vad::detector::VadDetector;
use crate::vad::energy::EnergyVad;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Registry entry for an open connection.
struct SessionHandle {
    /// Sender half of the session's bounded mailbox.
    mailbox: mpsc::Sender<InboundMessage>,
    /// Chunks dropped because the mailbox was full.
    dropped: Arc<AtomicU64>,
}

type Registry = Arc<Mutex<HashMap<u64, SessionHandle>>>;

/// The VAD WebSocket server.
pub struct VadServer {
    config: Arc<Config>,
    registry: Registry,
    shutdown: CancellationToken,
    next_conn_id: AtomicU64,
}

impl VadServer {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            next_conn_id: AtomicU64::new(0),
        }
    }

    /// Token that stops the accept loop and all session tasks when
    /// cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of currently registered sessions.
    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Bind the listener and accept connections until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, detector = ?self.config.detector, "server listening");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    tracing::info!("server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
                        tokio::spawn(handle_connection(
                            Arc::clone(&self.config),
                            Arc::clone(&self.registry),
                            self.shutdown.clone(),
                            conn_id,
                            stream,
                            peer,
                        ));
                    }
                    Err(e) => {
                        tracing::error!("accept error: {}", e);
                    }
                },
            }
        }
        Ok(())
    }
}

/// Construct the configured detector backend.
///
/// Also used at startup to fail fast when the model cannot be loaded.
pub async fn build_detector(config: &Config) -> Result<VadDetector, ServerError> {
    match config.detector {
        #[cfg(feature = "silero-vad")]
        DetectorKind::Silero => {
            use crate::vad::silero::SileroVad;
            let vad = match &config.model_path {
                Some(path) => SileroVad::from_path(
                    std::path::Path::new(path),
                    config.frame_samples(),
                    config.sample_rate_hz,
                )?,
                None => {
                    SileroVad::download(config.frame_samples(), config.sample_rate_hz).await?
                }
            };
            Ok(VadDetector::Silero(vad))
        }
        #[cfg(not(feature = "silero-vad"))]
        DetectorKind::Silero => Err(ServerError::SileroDisabled),
        DetectorKind::Energy => Ok(VadDetector::Energy(EnergyVad::new())),
    }
}

/// Drive one client connection from handshake to teardown.
async fn handle_connection(
    config: Arc<Config>,
    registry: Registry,
    shutdown: CancellationToken,
    conn_id: u64,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, "websocket handshake failed: {}", e);
            return;
        }
    };

    let detector = match build_detector(&config).await {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(%peer, "failed to construct detector: {}", e);
            return;
        }
    };

    let uid = format!("user_{}", conn_id);
    let session = Session::new(
        uid,
        detector,
        config.vad_params(),
        config.frame_samples(),
        config.preroll_capacity_bytes as usize,
    );

    let (sink, ws_read) = ws_stream.split();
    let (mailbox_tx, mailbox_rx) = mpsc::channel(config.queue_capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    // The registry holds the only sender: erasing the entry closes the
    // worker's mailbox.
    registry.lock().await.insert(
        conn_id,
        SessionHandle {
            mailbox: mailbox_tx,
            dropped: Arc::clone(&dropped),
        },
    );
    tracing::info!(%peer, conn_id, "client connected");

    let worker = tokio::spawn(session_task(
        session,
        mailbox_rx,
        sink,
        shutdown.clone(),
        dropped,
    ));

    read_loop(ws_read, &registry, conn_id, &shutdown, peer).await;

    registry.lock().await.remove(&conn_id);

    if let Err(e) = worker.await {
        tracing::error!(%peer, "session task panicked: {}", e);
    }
    tracing::info!(%peer, conn_id, "client disconnected");
}

/// Read inbound WebSocket messages and enqueue decoded chunks.
async fn read_loop(
    mut ws_read: WsStream,
    registry: &Registry,
    conn_id: u64,
    shutdown: &CancellationToken,
    peer: SocketAddr,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = ws_read.next() => msg,
        };

        match msg {
            Some(Ok(Message::Binary(data))) => {
                if !dispatch(registry, conn_id, protocol::decode_binary(&data), peer).await {
                    break;
                }
            }
            Some(Ok(Message::Text(text))) => {
                if !dispatch(registry, conn_id, protocol::decode_text(&text), peer).await {
                    break;
                }
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                // Tungstenite answers pings automatically.
            }
            Some(Ok(Message::Close(_))) => {
                tracing::debug!(%peer, "received close frame");
                break;
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::warn!(%peer, "receive error: {}", e);
                break;
            }
            None => break,
        }
    }
}

/// Look up the session and enqueue a decoded chunk on its mailbox.
///
/// Decode failures drop the chunk and keep the connection open. A full
/// mailbox drops the chunk and counts it. A registry miss means the session
/// is gone; returns `false` so reading stops.
async fn dispatch(
    registry: &Registry,
    conn_id: u64,
    decoded: Result<InboundMessage, DecodeError>,
    peer: SocketAddr,
) -> bool {
    let msg = match decoded {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(%peer, "dropping undecodable chunk: {}", e);
            return true;
        }
    };

    // Clone the handle out so the registry lock is not held across the
    // queue push.
    let (mailbox, dropped) = {
        let reg = registry.lock().await;
        match reg.get(&conn_id) {
            Some(handle) => (handle.mailbox.clone(), Arc::clone(&handle.dropped)),
            None => return false,
        }
    };

    match mailbox.try_send(msg) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(%peer, dropped = total, "session mailbox full, dropping chunk");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Own the session and the write half; process chunks in arrival order.
async fn session_task(
    mut session: Session,
    mut mailbox: mpsc::Receiver<InboundMessage>,
    mut sink: WsSink,
    shutdown: CancellationToken,
    dropped: Arc<AtomicU64>,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = mailbox.recv() => msg,
        };

        let Some(msg) = msg else {
            // Peer is gone. Flush an in-progress segment best-effort; the
            // send usually fails on a hard disconnect and that is fine.
            if let Some(event) = session.force_end() {
                send_event(&mut sink, &session, &event).await;
            }
            break;
        };

        session.apply_identity(&msg);

        match session.process_chunk(&msg.audio) {
            Ok(Some(event)) => {
                if !send_event(&mut sink, &session, &event).await {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                // Inference failure is fatal to this session only.
                tracing::error!(uid = %session.uid(), "closing session: {}", e);
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let _ = sink.close().await;

    session.stats_mut().dropped_chunks = dropped.load(Ordering::Relaxed);
    let stats = session.stats();
    tracing::info!(
        uid = %session.uid(),
        chunks = stats.chunks,
        frames = stats.frames,
        events = stats.events,
        dropped = stats.dropped_chunks,
        "session closed"
    );
}

/// Serialize and send one event. Returns `false` when the connection is
/// known to be closed; transient send errors are logged and tolerated.
async fn send_event(sink: &mut WsSink, session: &Session, event: &VadEvent) -> bool {
    let Some(json) = protocol::encode_event(
        session.uid(),
        session.connect_session(),
        session.current_session(),
        event,
    ) else {
        return true;
    };

    match sink.send(Message::Text(json)).await {
        Ok(()) => true,
        Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {
            tracing::debug!(uid = %session.uid(), "send on closed connection");
            false
        }
        Err(e) => {
            tracing::warn!(uid = %session.uid(), "send failed: {}", e);
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::Stream;
    use tokio_tungstenite::connect_async;

    use crate::audio::utils::samples_to_bytes;

    /// Config tuned for fast tests: energy backend, short debounce windows.
    fn test_config(port: u16) -> Config {
        let mut config = Config::default();
        config.listen_host = "127.0.0.1".to_string();
        config.listen_port = port;
        config.detector = DetectorKind::Energy;
        config.energy_threshold = 0.1;
        config.voice_begin_ms = 100.0;
        config.voice_stop_ms = 200.0;
        config
    }

    async fn start_server(port: u16) -> (Arc<VadServer>, tokio::task::JoinHandle<()>) {
        let server = Arc::new(VadServer::new(test_config(port)));
        let srv = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            srv.run().await.expect("server run failed");
        });
        // Give the listener a moment to bind.
        tokio::time::sleep(Duration::from_millis(50)).await;
        (server, handle)
    }

    fn loud_chunk() -> Vec<u8> {
        samples_to_bytes(&vec![8000i16; 320])
    }

    fn quiet_chunk() -> Vec<u8> {
        samples_to_bytes(&vec![0i16; 320])
    }

    async fn recv_event(
        read: &mut (impl Stream<Item = Result<Message, WsError>> + Unpin),
    ) -> Option<serde_json::Value> {
        loop {
            let msg = tokio::time::timeout(Duration::from_millis(500), read.next())
                .await
                .ok()??
                .ok()?;
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).ok();
            }
        }
    }

    #[tokio::test]
    async fn test_binary_audio_produces_ordered_events() {
        let (server, handle) = start_server(19811).await;

        let (ws, _) = connect_async("ws://127.0.0.1:19811")
            .await
            .expect("client connect");
        let (mut write, mut read) = ws.split();

        // Enough voiced audio to cross the 100 ms onset, then enough
        // silence to cross the 200 ms offset.
        for _ in 0..20 {
            write.send(Message::Binary(loud_chunk())).await.unwrap();
        }
        for _ in 0..30 {
            write.send(Message::Binary(quiet_chunk())).await.unwrap();
        }

        let mut states = Vec::new();
        while let Some(event) = recv_event(&mut read).await {
            states.push(event["data"]["vad_state"].as_str().unwrap().to_string());
            if states.last().map(String::as_str) == Some("VAD_END") {
                break;
            }
        }

        assert_eq!(states.first().map(String::as_str), Some("VAD_BEGIN"));
        assert_eq!(states.last().map(String::as_str), Some("VAD_END"));
        assert!(states[1..states.len() - 1]
            .iter()
            .all(|s| s == "SPEAKING"));

        write.close().await.ok();
        server.shutdown_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_text_message_updates_identity() {
        let (server, handle) = start_server(19812).await;

        let (ws, _) = connect_async("ws://127.0.0.1:19812")
            .await
            .expect("client connect");
        let (mut write, mut read) = ws.split();

        let audio = protocol::encode_base64(&loud_chunk());
        for _ in 0..20 {
            let msg = format!(
                r#"{{"uid":"device-42","connect_session":"c-9","data":{{"audio":"{}"}}}}"#,
                audio
            );
            write.send(Message::Text(msg)).await.unwrap();
        }

        let event = recv_event(&mut read).await.expect("an event");
        assert_eq!(event["uid"], "device-42");
        assert_eq!(event["connect_session"], "c-9");
        assert_eq!(event["data"]["vad_state"], "VAD_BEGIN");
        assert!(event["new_session"].is_string());

        write.close().await.ok();
        server.shutdown_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_chunk_keeps_connection_open() {
        let (server, handle) = start_server(19813).await;

        let (ws, _) = connect_async("ws://127.0.0.1:19813")
            .await
            .expect("client connect");
        let (mut write, mut read) = ws.split();

        // Undecodable inputs are dropped without closing the connection.
        write
            .send(Message::Text("not json".to_string()))
            .await
            .unwrap();
        write
            .send(Message::Binary(vec![1, 2, 3])) // odd-length PCM
            .await
            .unwrap();

        for _ in 0..20 {
            write.send(Message::Binary(loud_chunk())).await.unwrap();
        }

        let event = recv_event(&mut read).await.expect("an event");
        assert_eq!(event["data"]["vad_state"], "VAD_BEGIN");

        write.close().await.ok();
        server.shutdown_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_tracks_sessions() {
        let (server, handle) = start_server(19814).await;
        assert_eq!(server.session_count().await, 0);

        let (ws, _) = connect_async("ws://127.0.0.1:19814")
            .await
            .expect("client connect");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.session_count().await, 1);

        drop(ws);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(server.session_count().await, 0);

        server.shutdown_token().cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_idle_server() {
        let (server, handle) = start_server(19815).await;
        server.shutdown_token().cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("shutdown should not hang")
            .unwrap();
    }
}
