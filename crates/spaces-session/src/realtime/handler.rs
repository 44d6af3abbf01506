//! Incoming Phoenix message handler and presence parsing.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::PendingReplies;
use super::types::{PhoenixMessage, RealtimeError, RealtimeEvent};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix("realtime:").unwrap_or(topic)
}

/// Parse a Phoenix presence map into `HashMap<key, Vec<meta>>`.
///
/// The server sends presence as `{ "key": { "metas": [{ ... }] } }`.
pub(crate) fn parse_presence_map(
    value: &serde_json::Value,
) -> HashMap<String, Vec<serde_json::Value>> {
    let mut result = HashMap::new();
    if let Some(obj) = value.as_object() {
        for (key, val) in obj {
            if let Some(metas) = val.get("metas").and_then(|m| m.as_array()) {
                result.insert(key.clone(), metas.clone());
            }
        }
    }
    result
}

fn reply_reason(payload: &serde_json::Value) -> String {
    payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .and_then(|r| r.as_str())
        .unwrap_or("unknown error")
        .to_string()
}

// ---------------------------------------------------------------------------
// Message Handler
// ---------------------------------------------------------------------------

pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    pending: &PendingReplies,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let topic = strip_topic_prefix(&msg.topic);

    match msg.event.as_str() {
        "phx_reply" => {
            let waiting = match &msg.msg_ref {
                Some(r) => pending.lock().await.remove(r),
                None => None,
            };
            let Some(waiting) = waiting else {
                debug!(topic = %topic, "Reply without waiter");
                return;
            };
            let ok = msg.payload.get("status").and_then(|s| s.as_str()) == Some("ok");
            let result = if ok {
                Ok(())
            } else {
                Err(RealtimeError::Rejected(reply_reason(&msg.payload)))
            };

            if waiting.is_join {
                let event = match &result {
                    Ok(()) => {
                        debug!(topic = %waiting.topic, "Channel joined");
                        RealtimeEvent::ChannelJoined {
                            topic: waiting.topic.clone(),
                        }
                    }
                    Err(e) => {
                        warn!(topic = %waiting.topic, error = %e, "Channel join rejected");
                        RealtimeEvent::ChannelError {
                            topic: waiting.topic.clone(),
                            message: e.to_string(),
                        }
                    }
                };
                let _ = event_tx.send(event).await;
            }
            if let Some(reply) = waiting.reply {
                let _ = reply.send(result);
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel error".to_string(),
                })
                .await;
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            let _ = event_tx
                .send(RealtimeEvent::ChannelError {
                    topic: topic.to_string(),
                    message: "Channel closed".to_string(),
                })
                .await;
        }
        "broadcast" => {
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %inner_event, "Broadcast received");
            let _ = event_tx
                .send(RealtimeEvent::Broadcast {
                    topic: topic.to_string(),
                    event: inner_event,
                    payload: inner_payload,
                })
                .await;
        }
        "presence_state" => {
            let state = parse_presence_map(&msg.payload);
            debug!(topic = %topic, members = state.len(), "Presence state received");
            let _ = event_tx
                .send(RealtimeEvent::PresenceState {
                    topic: topic.to_string(),
                    state,
                })
                .await;
        }
        "presence_diff" => {
            let joins = msg
                .payload
                .get("joins")
                .map(parse_presence_map)
                .unwrap_or_default();
            let leaves = msg
                .payload
                .get("leaves")
                .map(parse_presence_map)
                .unwrap_or_default();
            debug!(
                topic = %topic,
                joins = joins.len(),
                leaves = leaves.len(),
                "Presence diff received"
            );
            let _ = event_tx
                .send(RealtimeEvent::PresenceDiff {
                    topic: topic.to_string(),
                    joins,
                    leaves,
                })
                .await;
        }
        _ => {
            debug!(topic = %topic, event = %msg.event, "Unhandled Phoenix event");
        }
    }
}
