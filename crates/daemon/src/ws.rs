// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport for the monitor stream.
//!
//! One task per connection: frames from the subscriber queue go out as
//! text/ping; `{"op":"setFilters", ...}` messages come back in. A peer
//! that stops answering pings is disconnected on the next heartbeat.

use crate::env::heartbeat_interval;
use crate::stream::{Filters, Frame, MonitorStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;

/// Inbound client operations.
#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
enum ClientOp {
    #[serde(rename = "setFilters")]
    SetFilters {
        #[serde(default)]
        agents: Option<std::collections::HashSet<String>>,
        #[serde(default)]
        types: Option<std::collections::HashSet<String>>,
    },
}

/// Accept observer connections until shutdown.
pub async fn run_ws_listener(
    listener: TcpListener,
    stream: MonitorStream,
    shutdown: std::sync::Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, "observer connecting");
                    let stream = stream.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, stream).await {
                            tracing::debug!(%peer, error = %e, "observer connection ended");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "ws accept error"),
            },
        }
    }
}

async fn handle_connection(
    socket: TcpStream,
    stream: MonitorStream,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(socket).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(MonitorStream::queue_depth());
    let client_id = stream.add_subscriber(frame_tx);
    let mut last_pong = Instant::now();
    let pong_deadline = heartbeat_interval() * 2;

    let result = loop {
        tokio::select! {
            frame = frame_rx.recv() => match frame {
                Some(Frame::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        break Err(e);
                    }
                }
                Some(Frame::Ping) => {
                    if last_pong.elapsed() > pong_deadline {
                        tracing::debug!(client_id = %client_id, "missed pong, disconnecting");
                        break Ok(());
                    }
                    if let Err(e) = ws_tx.send(Message::Ping(Vec::new().into())).await {
                        break Err(e);
                    }
                }
                Some(Frame::Close) => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break Ok(());
                }
                // Subscriber was dropped by the stream (lagged).
                None => break Ok(()),
            },

            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientOp>(&text) {
                        Ok(ClientOp::SetFilters { agents, types }) => {
                            stream.set_filters(&client_id, Filters { agents, types });
                        }
                        Err(e) => {
                            tracing::debug!(client_id = %client_id, error = %e, "bad client op");
                        }
                    }
                }
                Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws_tx.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Err(e)) => break Err(e),
                Some(Ok(_)) => {}
            },
        }
    };

    stream.remove_subscriber(&client_id);
    result
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
