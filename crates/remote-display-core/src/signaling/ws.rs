//! Signaling over a WebSocket relay.
//!
//! Frames are the JSON form of `SignalingMessage`. The relay forwards every
//! frame verbatim to the other connected client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use remote_display_common::{Error, MessageKind, Result, SignalingMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::{Dispatcher, SignalHandler, SignalingChannel};
use crate::subscription::SubscriptionId;

pub struct WsSignalingChannel {
    url: String,
    outbound: mpsc::UnboundedSender<WsMessage>,
    open: Arc<AtomicBool>,
    dispatcher: Arc<Dispatcher>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsSignalingChannel {
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(url).await.map_err(Error::transport)?;
        info!("connected to signaling relay: {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let open = Arc::new(AtomicBool::new(true));
        let dispatcher = Arc::new(Dispatcher::default());

        let writer = {
            let open = Arc::clone(&open);
            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    if let Err(e) = write.send(frame).await {
                        error!("failed to send signaling frame: {}", e);
                        break;
                    }
                }
                open.store(false, Ordering::SeqCst);
                let _ = write.close().await;
            })
        };

        let reader = {
            let open = Arc::clone(&open);
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                while let Some(frame) = read.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => match SignalingMessage::from_json(&text) {
                            Ok(message) => {
                                let kind = message.kind;
                                if dispatcher.dispatch(message) == 0 {
                                    debug!(%kind, "no handler for relayed message");
                                }
                            }
                            Err(e) => warn!("dropping signaling frame: {}", e),
                        },
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            error!("signaling WebSocket error: {}", e);
                            break;
                        }
                    }
                }
                open.store(false, Ordering::SeqCst);
                info!("signaling relay connection closed");
            })
        };

        Ok(Self {
            url: url.to_string(),
            outbound,
            open,
            dispatcher,
            reader,
            writer,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Stop reading and close the socket after queued frames are flushed.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.reader.abort();
        let _ = self.outbound.send(WsMessage::Close(None));
    }
}

impl SignalingChannel for WsSignalingChannel {
    fn send(&self, kind: MessageKind, payload: Option<String>) -> Result<()> {
        if !self.is_open() {
            return Err(Error::SignalingUnavailable);
        }
        let text = SignalingMessage::new(kind, payload).to_json()?;
        self.outbound
            .send(WsMessage::Text(text.into()))
            .map_err(|_| Error::SignalingUnavailable)
    }

    fn subscribe(&self, kind: MessageKind, handler: SignalHandler) -> SubscriptionId {
        self.dispatcher.subscribe(kind, handler)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }
}

impl Drop for WsSignalingChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
