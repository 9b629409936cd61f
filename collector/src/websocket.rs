//! Live report feed over WebSocket.
//!
//! Every accepted report is pushed to subscribers, optionally filtered to one
//! broker. A ping goes out every 30 seconds.

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::{types::StreamMessage, AppState};

pub async fn handle_report_stream(socket: WebSocket, broker: Option<String>, state: AppState) {
    let label = broker.as_deref().unwrap_or("*").to_string();
    info!(broker = %label, "report stream opened");

    let (mut sender, mut receiver) = socket.split();
    let mut reports = state.report_tx.subscribe();
    let mut ping_interval = interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(StreamMessage::Ping { timestamp }) = serde_json::from_str(&text) {
                            let pong = StreamMessage::Pong { timestamp };
                            if let Ok(pong) = serde_json::to_string(&pong) {
                                let _ = sender.send(Message::Text(pong)).await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Binary(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        error!(broker = %label, error = %e, "report stream error");
                        break;
                    }
                }
            }

            received = reports.recv() => {
                let msg = match received {
                    Ok(stored) => {
                        if broker.as_deref().is_some_and(|b| b != stored.report.broker) {
                            continue;
                        }
                        StreamMessage::Report(stored)
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(broker = %label, skipped, "subscriber lagging");
                        StreamMessage::Error { message: format!("{} reports skipped", skipped) }
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Ok(json) = serde_json::to_string(&msg) {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                let ping = StreamMessage::Ping { timestamp: Utc::now().timestamp_millis() };
                if let Ok(json) = serde_json::to_string(&ping) {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!(broker = %label, "report stream closed");
}
