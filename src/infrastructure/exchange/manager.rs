use crate::domain::ports::{CandleHandler, TickerHandler};
use crate::infrastructure::exchange::client::{FrameHandler, WsClient, WsConfig, WsError};
use crate::infrastructure::exchange::frames::{
    CANDLE_CHANNEL_PREFIX, ChannelArg, Envelope, SubscribeRequest, TICKERS_CHANNEL,
    parse_candle_row, parse_tickers,
};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Owns one WebSocket connection to a single upstream endpoint and fans
/// parsed events out to registered handlers. The ingest service runs one
/// manager for the public endpoint (tickers) and one for the business
/// endpoint (candles).
pub struct MarketDataManager {
    client: Arc<WsClient>,
    ticker_handlers: Arc<RwLock<Vec<Arc<dyn TickerHandler>>>>,
    candle_handlers: Arc<RwLock<Vec<Arc<dyn CandleHandler>>>>,
    /// Subscribed instruments, kept so a rebuilding caller can replay them.
    subscribed_tickers: Mutex<HashSet<String>>,
    /// Subscribed (instrument, bar) pairs.
    subscribed_candles: Mutex<HashSet<(String, String)>>,
}

impl MarketDataManager {
    pub fn new(config: WsConfig) -> Self {
        Self {
            client: Arc::new(WsClient::new(config)),
            ticker_handlers: Arc::new(RwLock::new(Vec::new())),
            candle_handlers: Arc::new(RwLock::new(Vec::new())),
            subscribed_tickers: Mutex::new(HashSet::new()),
            subscribed_candles: Mutex::new(HashSet::new()),
        }
    }

    pub fn add_ticker_handler(&self, handler: Arc<dyn TickerHandler>) {
        self.ticker_handlers
            .write()
            .expect("handler lock poisoned")
            .push(handler);
    }

    pub fn add_candle_handler(&self, handler: Arc<dyn CandleHandler>) {
        self.candle_handlers
            .write()
            .expect("handler lock poisoned")
            .push(handler);
    }

    pub async fn connect(&self) -> Result<(), WsError> {
        let ticker_handlers = self.ticker_handlers.clone();
        let candle_handlers = self.candle_handlers.clone();
        let handler: FrameHandler = Arc::new(move |frame: String| {
            let ticker_handlers = ticker_handlers.clone();
            let candle_handlers = candle_handlers.clone();
            Box::pin(async move {
                Self::dispatch_frame(&frame, &ticker_handlers, &candle_handlers).await;
            })
        });
        self.client.set_message_handler(handler);
        self.client.connect().await
    }

    /// Interprets one upstream frame. Protocol failures are logged and the
    /// pump moves on; handler failures are logged and siblings still run.
    async fn dispatch_frame(
        frame: &str,
        ticker_handlers: &RwLock<Vec<Arc<dyn TickerHandler>>>,
        candle_handlers: &RwLock<Vec<Arc<dyn CandleHandler>>>,
    ) {
        let envelope: Envelope = match serde_json::from_str(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "malformed frame");
                return;
            }
        };

        if let Some(event) = envelope.event.as_deref() {
            match event {
                "error" => error!(
                    code = envelope.code.as_deref().unwrap_or(""),
                    msg = envelope.msg.as_deref().unwrap_or(""),
                    "upstream error event"
                ),
                "subscribe" | "unsubscribe" => {
                    if envelope.ack_ok() {
                        debug!(?envelope.arg, event, "subscription ack");
                    } else {
                        warn!(
                            ?envelope.arg,
                            event,
                            code = envelope.code.as_deref().unwrap_or(""),
                            msg = envelope.msg.as_deref().unwrap_or(""),
                            "subscription rejected"
                        );
                    }
                }
                other => debug!(event = other, "ignoring event frame"),
            }
            return;
        }

        let Some(arg) = envelope.arg else {
            debug!("frame without arg, ignoring");
            return;
        };
        let Some(data) = envelope.data else {
            debug!(channel = %arg.channel, "frame without data, ignoring");
            return;
        };

        if arg.channel == TICKERS_CHANNEL {
            let tickers = match parse_tickers(data) {
                Ok(tickers) => tickers,
                Err(e) => {
                    error!(error = %e, "malformed ticker data");
                    return;
                }
            };
            let handlers = ticker_handlers
                .read()
                .expect("handler lock poisoned")
                .clone();
            for ticker in &tickers {
                for handler in &handlers {
                    if let Err(e) = handler.handle(ticker).await {
                        warn!(inst_id = %ticker.inst_id, error = %e, "ticker handler failed");
                    }
                }
            }
        } else if let Some(bar) = arg.channel.strip_prefix(CANDLE_CHANNEL_PREFIX) {
            let Some(rows) = data.as_array() else {
                error!(channel = %arg.channel, "candle data is not an array");
                return;
            };
            let handlers = candle_handlers
                .read()
                .expect("handler lock poisoned")
                .clone();
            for row in rows {
                let event = match parse_candle_row(row, &arg.inst_id, bar) {
                    Ok(event) => event,
                    Err(e) => {
                        error!(channel = %arg.channel, error = %e, "malformed candle row");
                        continue;
                    }
                };
                for handler in &handlers {
                    if let Err(e) = handler.handle(&event).await {
                        warn!(
                            inst_id = %event.inst_id,
                            bar = %event.bar,
                            error = %e,
                            "candle handler failed"
                        );
                    }
                }
            }
        } else {
            warn!(channel = %arg.channel, "unknown channel");
        }
    }

    pub async fn subscribe_ticker(&self, inst_id: &str) -> Result<(), WsError> {
        self.client
            .send_json(&SubscribeRequest::subscribe(ChannelArg::tickers(inst_id)))
            .await?;
        self.subscribed_tickers
            .lock()
            .await
            .insert(inst_id.to_string());
        Ok(())
    }

    pub async fn unsubscribe_ticker(&self, inst_id: &str) -> Result<(), WsError> {
        self.client
            .send_json(&SubscribeRequest::unsubscribe(ChannelArg::tickers(inst_id)))
            .await?;
        self.subscribed_tickers.lock().await.remove(inst_id);
        Ok(())
    }

    pub async fn subscribe_candle(&self, inst_id: &str, bar: &str) -> Result<(), WsError> {
        self.client
            .send_json(&SubscribeRequest::subscribe(ChannelArg::candles(
                inst_id, bar,
            )))
            .await?;
        self.subscribed_candles
            .lock()
            .await
            .insert((inst_id.to_string(), bar.to_string()));
        Ok(())
    }

    pub async fn unsubscribe_candle(&self, inst_id: &str, bar: &str) -> Result<(), WsError> {
        self.client
            .send_json(&SubscribeRequest::unsubscribe(ChannelArg::candles(
                inst_id, bar,
            )))
            .await?;
        self.subscribed_candles
            .lock()
            .await
            .remove(&(inst_id.to_string(), bar.to_string()));
        Ok(())
    }

    /// Current ticker subscriptions, for replay after a rebuild.
    pub async fn ticker_subscriptions(&self) -> Vec<String> {
        self.subscribed_tickers.lock().await.iter().cloned().collect()
    }

    /// Current candle subscriptions, for replay after a rebuild.
    pub async fn candle_subscriptions(&self) -> Vec<(String, String)> {
        self.subscribed_candles.lock().await.iter().cloned().collect()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub async fn close(&self) {
        self.client.close().await;
    }

    pub async fn wait(&self) {
        self.client.wait().await;
    }
}
