//! WebSocket transport for the signal feed.
//!
//! Each accepted connection becomes one feed subscriber and receives the
//! JSON signal messages as text frames. Inbound frames are ignored apart
//! from close.

use super::SubscriberFeed;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

pub async fn bind_feed(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind feed server on {}", addr))
}

/// Accept connections until `shutdown` flips to `true`.
pub async fn run_feed_server(
    listener: TcpListener,
    feed: SubscriberFeed,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("📡 Signal feed listening on ws://{}", addr);
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, feed.clone()));
                }
                Err(e) => warn!("Feed accept failed: {}", e),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Signal feed stopped");
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, feed: SubscriberFeed) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, "WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (id, mut rx) = feed.subscribe();
    info!(%peer, subscriber = id, "Feed client connected");

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        debug!(subscriber = id, "Failed to send, client disconnected");
                        break;
                    }
                }
                // Dropped by the registry for falling behind.
                None => break,
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    feed.unsubscribe(id);
    let _ = write.close().await;
    info!(%peer, subscriber = id, "Feed client disconnected");
}
