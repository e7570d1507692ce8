//! Websocket bridge between the daemon and the avatar renderer.

mod messages;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc},
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{Message, handshake::server::Request},
};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;

pub use messages::{ClientMessage, DaemonMessage, SpeechSource};

const INCOMING_BUFFER: usize = 256;
const BROADCAST_BUFFER: usize = 256;
const CAPABILITIES: [&str; 4] = ["chat", "self_talk", "emotion", "debug"];

pub struct Bridge {
    incoming_rx: mpsc::Receiver<ClientMessage>,
    outgoing_tx: broadcast::Sender<DaemonMessage>,
    local_addr: SocketAddr,
}

impl Bridge {
    pub async fn bind(config: &BridgeConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .with_context(|| format!("failed to bind bridge on {}", config.listen_addr))?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "Bridge listening");

        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_BUFFER);
        let (outgoing_tx, _) = broadcast::channel(BROADCAST_BUFFER);

        let acceptor = BridgeAcceptor {
            listener,
            incoming_tx,
            outgoing_tx: outgoing_tx.clone(),
            max_clients: config.max_clients,
        };

        tokio::spawn(async move {
            if let Err(err) = acceptor.run().await {
                error!(?err, "Bridge acceptor exited");
            }
        });

        Ok(Self {
            incoming_rx,
            outgoing_tx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn next_message(&mut self) -> Option<ClientMessage> {
        self.incoming_rx.recv().await
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            outgoing_tx: self.outgoing_tx.clone(),
        }
    }
}

/// Cloneable sender side of the bridge, safe to move into brain callbacks.
#[derive(Clone)]
pub struct BridgeHandle {
    outgoing_tx: broadcast::Sender<DaemonMessage>,
}

impl BridgeHandle {
    pub fn broadcast(&self, message: DaemonMessage) {
        // A send error only means no renderer is connected
        let _ = self.outgoing_tx.send(message);
    }

    pub fn log(&self, level: &str, message: impl Into<String>) {
        self.broadcast(DaemonMessage::Log {
            level: level.to_string(),
            message: message.into(),
            timestamp: Utc::now().timestamp(),
        });
    }
}

struct BridgeAcceptor {
    listener: TcpListener,
    incoming_tx: mpsc::Sender<ClientMessage>,
    outgoing_tx: broadcast::Sender<DaemonMessage>,
    max_clients: usize,
}

impl BridgeAcceptor {
    async fn run(self) -> Result<()> {
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let current = active.load(Ordering::SeqCst);
            if current >= self.max_clients {
                warn!(%addr, current, "Rejecting renderer, max clients reached");
                continue;
            }

            let incoming_tx = self.incoming_tx.clone();
            let outgoing_tx = self.outgoing_tx.clone();
            let active_count = active.clone();
            active_count.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                if let Err(err) =
                    handle_connection(stream, addr, incoming_tx, outgoing_tx, active_count).await
                {
                    warn!(?err, "Bridge client error");
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    incoming_tx: mpsc::Sender<ClientMessage>,
    outgoing_tx: broadcast::Sender<DaemonMessage>,
    active: Arc<AtomicUsize>,
) -> Result<()> {
    let callback =
        |req: &Request, response: tokio_tungstenite::tungstenite::handshake::server::Response| {
            debug!(%addr, uri = %req.uri(), "Bridge handshake");
            Ok(response)
        };
    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => ws_stream,
        Err(err) => {
            active.fetch_sub(1, Ordering::SeqCst);
            return Err(err.into());
        }
    };
    let (mut writer, mut reader) = ws_stream.split();
    let mut outgoing_rx = outgoing_tx.subscribe();

    let _ = outgoing_tx.send(DaemonMessage::Hello {
        version: env!("CARGO_PKG_VERSION").into(),
        capabilities: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
    });

    let writer_task = tokio::spawn(async move {
        loop {
            match outgoing_rx.recv().await {
                Ok(msg) => {
                    let payload = serde_json::to_string(&msg)?;
                    writer.send(Message::Text(payload)).await?;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Renderer lagging, dropped daemon messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    });

    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(parsed) => {
                    if let Err(err) = incoming_tx.send(parsed).await {
                        warn!(?err, "Dropping client message");
                    }
                }
                Err(err) => warn!(?err, payload = %text, "Invalid client payload"),
            },
            Ok(Message::Binary(_)) => {
                warn!("Binary payloads are not supported");
            }
            Ok(Message::Close(frame)) => {
                info!(%addr, ?frame, "Renderer closed connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(?err, "Bridge read error");
                break;
            }
        }
    }

    writer_task.abort();
    let _ = writer_task.await;
    active.fetch_sub(1, Ordering::SeqCst);
    info!(%addr, "Renderer disconnected");
    Ok(())
}
