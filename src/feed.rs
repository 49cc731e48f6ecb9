//! Websocket feed client (C7): subscribe handshake plus the decoded
//! frame stream the dispatcher consumes.
//!
//! Connects, sends a `subscribe` frame, requires an echoing
//! `subscriptions` reply, then forwards every subsequent frame to the
//! dispatcher until the socket closes or errors, reconnecting with
//! capped exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{error, info, warn};

use crate::dispatcher::EventDispatcher;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket connection failed: {0}")]
    Connection(String),
    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),
    #[error("reconnect backoff exhausted: {0}")]
    ReconnectExhausted(String),
}

/// Builds the `{"type":"subscribe","channels":[{"name":"full",...}]}`
/// frame for the full channel on the given products.
pub fn subscribe_message(product_ids: &[String]) -> Value {
    json!({
        "type": "subscribe",
        "channels": [
            { "name": "full", "product_ids": product_ids }
        ]
    })
}

/// Validates a subscription reply against the frame that was sent.
/// `type == error` is always a rejection; anything other than
/// `type == subscriptions` echoing the same `channels` is also a
/// rejection.
pub fn validate_subscription_reply(sent: &Value, reply: &Value) -> Result<(), FeedError> {
    if reply.get("type").and_then(Value::as_str) == Some("error") {
        return Err(FeedError::SubscriptionRejected(reply.to_string()));
    }
    let confirmed = reply.get("type").and_then(Value::as_str) == Some("subscriptions")
        && reply.get("channels") == sent.get("channels");
    if !confirmed {
        return Err(FeedError::SubscriptionRejected(reply.to_string()));
    }
    Ok(())
}

/// Connects once, performs the subscribe handshake, and drives decoded
/// frames into the dispatcher until the socket closes or errors.
/// Individual frame decode failures are logged and dropped; only a
/// transport-level close/error or a rejected handshake returns `Err`.
async fn run_once(
    ws_endpoint: &str,
    product_ids: &[String],
    dispatcher: &EventDispatcher,
    backoff: &mut ExponentialBackoff,
) -> Result<(), FeedError> {
    let (mut socket, _) = connect_async(ws_endpoint)
        .await
        .map_err(|e| FeedError::Connection(e.to_string()))?;
    info!(ws_endpoint, "connected to feed");

    let sub_msg = subscribe_message(product_ids);
    socket
        .send(Message::Text(sub_msg.to_string()))
        .await
        .map_err(|e| FeedError::Connection(e.to_string()))?;

    let reply = socket
        .next()
        .await
        .ok_or_else(|| FeedError::Connection("socket closed before subscription reply".into()))?
        .map_err(|e| FeedError::Connection(e.to_string()))?;
    let reply_text = match reply {
        Message::Text(text) => text,
        other => return Err(FeedError::SubscriptionRejected(format!("{other:?}"))),
    };
    let reply_value: Value = serde_json::from_str(&reply_text)
        .map_err(|e| FeedError::SubscriptionRejected(e.to_string()))?;
    validate_subscription_reply(&sub_msg, &reply_value)?;
    info!(?product_ids, "subscribed to full channel");

    // A confirmed handshake is a successful reconnect: reset the backoff's
    // elapsed-time clock here so the deadline covers only a run of
    // consecutive failures, not this connection's eventual lifetime.
    backoff.reset();

    while let Some(message) = socket.next().await {
        let message = message.map_err(|e| FeedError::Connection(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => return Err(FeedError::Connection("socket closed".into())),
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(event) => dispatcher.dispatch(event).await,
            Err(err) => warn!(%err, "dropping frame that failed to decode"),
        }
    }
    Err(FeedError::Connection("socket stream ended".into()))
}

/// Runs the feed task for the lifetime of the process: connects,
/// subscribes, forwards frames, and reconnects with capped exponential
/// backoff on any transport failure. Returns only when the backoff
/// deadline is exhausted, which is fatal to the feed task.
pub async fn run(
    ws_endpoint: String,
    product_ids: Vec<String>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_deadline: Duration,
) -> Result<(), FeedError> {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_interval: Duration::from_secs(30),
        max_elapsed_time: Some(reconnect_deadline),
        ..ExponentialBackoff::default()
    };

    loop {
        match run_once(&ws_endpoint, &product_ids, &dispatcher, &mut backoff).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                error!(%err, "feed connection lost");
                match backoff.next_backoff() {
                    Some(wait) => {
                        warn!(?wait, "reconnecting to feed");
                        tokio::time::sleep(wait).await;
                    }
                    None => {
                        return Err(FeedError::ReconnectExhausted(err.to_string()));
                    }
                }
            }
        }
    }
}
