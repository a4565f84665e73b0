use futures_util::future::BoxFuture;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

/// Frame handler installed before `connect`. Runs on the read pump; frames
/// from one connection are dispatched strictly in arrival order.
pub type FrameHandler = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("websocket is not connected")]
    NotConnected,

    #[error("websocket dial failed: {0}")]
    Dial(String),

    #[error("websocket write failed: {0}")]
    Write(String),

    #[error("websocket write deadline exceeded")]
    WriteTimeout,

    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Interval between outgoing pings.
    pub ping_interval: Duration,
    /// Read deadline; reset by incoming traffic.
    pub pong_wait: Duration,
    /// Deadline for any single write.
    pub write_wait: Duration,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(20),
            pong_wait: Duration::from_secs(30),
            write_wait: Duration::from_secs(10),
        }
    }
}

/// A single logical exchange WebSocket connection with read and ping pumps.
/// Reconnecting is the caller's responsibility: once the connection drops,
/// `wait` resolves and the client stays dead until rebuilt.
pub struct WsClient {
    config: WsConfig,
    sink: Arc<Mutex<Option<WsSink>>>,
    handler: Arc<std::sync::RwLock<Option<FrameHandler>>>,
    connected: Arc<AtomicBool>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsClient {
    pub fn new(config: WsConfig) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            config,
            sink: Arc::new(Mutex::new(None)),
            handler: Arc::new(std::sync::RwLock::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            done_tx,
            done_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Installs the frame handler. Must be called before `connect`; frames
    /// arriving with no handler installed are dropped with a warning.
    pub fn set_message_handler(&self, handler: FrameHandler) {
        *self.handler.write().expect("handler lock poisoned") = Some(handler);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn connect(&self) -> Result<(), WsError> {
        let (stream, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| WsError::Dial(e.to_string()))?;
        info!(url = %self.config.url, "websocket connected");

        let (sink, read) = stream.split();
        *self.sink.lock().await = Some(sink);
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.done_tx.send(false);

        let read_task = tokio::spawn(Self::read_pump(
            read,
            self.config.pong_wait,
            self.handler.clone(),
            self.sink.clone(),
            self.connected.clone(),
            self.done_tx.clone(),
        ));
        let ping_task = tokio::spawn(Self::ping_pump(
            self.config.ping_interval,
            self.config.write_wait,
            self.sink.clone(),
            self.connected.clone(),
        ));

        let mut tasks = self.tasks.lock().await;
        tasks.push(read_task);
        tasks.push(ping_task);
        Ok(())
    }

    async fn read_pump(
        mut read: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        pong_wait: Duration,
        handler: Arc<std::sync::RwLock<Option<FrameHandler>>>,
        sink: Arc<Mutex<Option<WsSink>>>,
        connected: Arc<AtomicBool>,
        done_tx: watch::Sender<bool>,
    ) {
        loop {
            let frame = match timeout(pong_wait, read.next()).await {
                Err(_) => {
                    warn!("websocket read deadline exceeded, closing");
                    break;
                }
                Ok(None) => {
                    info!("websocket stream ended");
                    break;
                }
                Ok(Some(Err(e))) => {
                    error!(error = %e, "websocket read error");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(text) => {
                    let installed = handler.read().expect("handler lock poisoned").clone();
                    match installed {
                        Some(h) => h(text.as_str().to_string()).await,
                        None => warn!("frame received with no handler installed"),
                    }
                }
                Message::Ping(payload) => {
                    let mut guard = sink.lock().await;
                    if let Some(s) = guard.as_mut()
                        && let Err(e) = s.send(Message::Pong(payload)).await
                    {
                        error!(error = %e, "pong write failed");
                        break;
                    }
                }
                Message::Pong(_) => {
                    // Deadline resets on the next read iteration.
                    debug!("pong received");
                }
                Message::Close(frame) => {
                    info!(?frame, "websocket closed by peer");
                    break;
                }
                _ => {}
            }
        }

        connected.store(false, Ordering::SeqCst);
        *sink.lock().await = None;
        let _ = done_tx.send(true);
    }

    async fn ping_pump(
        ping_interval: Duration,
        write_wait: Duration,
        sink: Arc<Mutex<Option<WsSink>>>,
        connected: Arc<AtomicBool>,
    ) {
        let mut interval = tokio::time::interval(ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so pings start one
        // interval after connect.
        interval.tick().await;

        loop {
            interval.tick().await;
            if !connected.load(Ordering::SeqCst) {
                break;
            }
            let mut guard = sink.lock().await;
            let Some(s) = guard.as_mut() else { break };
            match timeout(write_wait, s.send(Message::Ping(Vec::new().into()))).await {
                Ok(Ok(())) => debug!("ping sent"),
                Ok(Err(e)) => {
                    // The read pump observes the broken connection and
                    // finishes the teardown.
                    warn!(error = %e, "ping write failed, stopping ping pump");
                    break;
                }
                Err(_) => {
                    warn!("ping write deadline exceeded, stopping ping pump");
                    break;
                }
            }
        }
    }

    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), WsError> {
        let payload = serde_json::to_string(value)?;
        self.send_message(Message::Text(payload.into())).await
    }

    pub async fn send_message(&self, message: Message) -> Result<(), WsError> {
        if !self.is_connected() {
            return Err(WsError::NotConnected);
        }
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(WsError::NotConnected)?;
        match timeout(self.config.write_wait, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WsError::Write(e.to_string())),
            Err(_) => Err(WsError::WriteTimeout),
        }
    }

    /// Closes the connection and stops both pumps. Idempotent.
    pub async fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let mut guard = self.sink.lock().await;
            if let Some(sink) = guard.as_mut() {
                let _ = timeout(self.config.write_wait, sink.send(Message::Close(None))).await;
            }
            *guard = None;
        }
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        let _ = self.done_tx.send(true);
    }

    /// Resolves once the connection has terminated, from either side.
    pub async fn wait(&self) {
        let mut rx = self.done_rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
