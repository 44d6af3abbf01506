//! Background WebSocket connection loop with auto-reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::types::{
    ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeError, RealtimeEvent,
    ReplySender,
};

// ---------------------------------------------------------------------------
// Refs & Bookkeeping
// ---------------------------------------------------------------------------

static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// A request waiting for its `phx_reply`.
pub(crate) struct PendingReply {
    pub(crate) topic: String,
    pub(crate) is_join: bool,
    pub(crate) reply: Option<ReplySender>,
}

pub(crate) type PendingReplies = Arc<Mutex<HashMap<String, PendingReply>>>;

/// A channel to rejoin (and re-track presence on) after a reconnect.
#[derive(Clone)]
pub(crate) struct JoinedChannel {
    pub(crate) config: ChannelConfig,
    pub(crate) presence_payload: Option<serde_json::Value>,
}

type JoinedChannels = Arc<RwLock<HashMap<String, JoinedChannel>>>;

fn frame(topic: &str, event: &str, payload: serde_json::Value, msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: format!("realtime:{topic}"),
        event: event.to_string(),
        payload,
        msg_ref: Some(msg_ref.to_string()),
    }
}

fn track_payload(payload: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "presence",
        "event": "track",
        "payload": payload
    })
}

async fn send_frame<S>(writer: &Mutex<S>, msg: &PhoenixMessage) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => writer.lock().await.send(WsMessage::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode Phoenix frame");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let joined_channels: JoinedChannels = Arc::new(RwLock::new(HashMap::new()));
    let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut reconnect_delay = config.reconnect_delay_secs;

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to realtime");

        match tokio::time::timeout(
            Duration::from_secs(15),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let (ws_write, ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                rejoin_channels(&ws_write, &joined_channels, &pending).await;

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));

                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&joined_channels),
                    Arc::clone(&pending),
                    Arc::clone(&shutdown),
                ));

                let mut read_stream = ws_read;
                while let Some(msg_result) = read_stream.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<PhoenixMessage>(&text) {
                                Ok(phoenix_msg) => {
                                    handle_phoenix_message(&phoenix_msg, &pending, &event_tx).await
                                }
                                Err(_) => debug!(text = %text, "Unrecognized realtime frame"),
                            }
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Realtime server closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                heartbeat_handle.abort();
                cmd_handle.abort();
                fail_pending(&pending).await;
                *connected.write().await = false;
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to realtime");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!("WebSocket connection timed out after 15s");
                let _ = event_tx
                    .send(RealtimeEvent::Error(
                        "Connection timed out after 15s".to_string(),
                    ))
                    .await;
            }
        }

        if shutdown.load(Ordering::SeqCst) {
            info!("Realtime client shut down");
            return;
        }

        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = next_backoff(reconnect_delay, config.max_reconnect_delay_secs);
    }
}

pub(crate) fn next_backoff(current: u64, max: u64) -> u64 {
    (current.max(1) * 2).min(max)
}

async fn rejoin_channels<S>(
    ws_write: &Mutex<S>,
    joined_channels: &JoinedChannels,
    pending: &PendingReplies,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let channels = joined_channels.read().await.clone();
    for (topic, channel) in channels {
        let join_ref = next_ref();
        pending.lock().await.insert(
            join_ref.clone(),
            PendingReply {
                topic: topic.clone(),
                is_join: true,
                reply: None,
            },
        );
        send_frame(
            ws_write,
            &frame(&topic, "phx_join", channel.config.to_join_payload(), &join_ref),
        )
        .await;
        if let Some(payload) = &channel.presence_payload {
            debug!(topic = %topic, "Re-tracking presence after reconnect");
            send_frame(
                ws_write,
                &frame(&topic, "presence", track_payload(payload), &next_ref()),
            )
            .await;
        }
    }
}

async fn fail_pending(pending: &PendingReplies) {
    for (_, waiting) in pending.lock().await.drain() {
        if let Some(reply) = waiting.reply {
            let _ = reply.send(Err(RealtimeError::Disconnected));
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        let msg = PhoenixMessage {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        };
        if !send_frame(&ws_write, &msg).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    joined_channels: JoinedChannels,
    pending: PendingReplies,
    shutdown: Arc<AtomicBool>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        let (topic, msg, reply, is_join) = match cmd {
            RealtimeCommand::JoinChannel {
                topic,
                config,
                reply,
            } => {
                let msg = frame(&topic, "phx_join", config.to_join_payload(), &next_ref());
                joined_channels.write().await.insert(
                    topic.clone(),
                    JoinedChannel {
                        config,
                        presence_payload: None,
                    },
                );
                (topic, msg, reply, true)
            }
            RealtimeCommand::LeaveChannel { topic, reply } => {
                let msg = frame(&topic, "phx_leave", serde_json::json!({}), &next_ref());
                joined_channels.write().await.remove(&topic);
                (topic, msg, reply, false)
            }
            RealtimeCommand::Broadcast {
                topic,
                event,
                payload,
                reply,
            } => {
                let body = serde_json::json!({
                    "type": "broadcast",
                    "event": event,
                    "payload": payload
                });
                let msg = frame(&topic, "broadcast", body, &next_ref());
                (topic, msg, reply, false)
            }
            RealtimeCommand::PresenceTrack {
                topic,
                payload,
                reply,
            } => {
                let msg = frame(&topic, "presence", track_payload(&payload), &next_ref());
                if let Some(ch) = joined_channels.write().await.get_mut(&topic) {
                    ch.presence_payload = Some(payload);
                }
                (topic, msg, reply, false)
            }
            RealtimeCommand::PresenceUntrack { topic, reply } => {
                let body = serde_json::json!({
                    "type": "presence",
                    "event": "untrack"
                });
                let msg = frame(&topic, "presence", body, &next_ref());
                if let Some(ch) = joined_channels.write().await.get_mut(&topic) {
                    ch.presence_payload = None;
                }
                (topic, msg, reply, false)
            }
            RealtimeCommand::Disconnect => {
                shutdown.store(true, Ordering::SeqCst);
                let topics: Vec<String> = joined_channels.read().await.keys().cloned().collect();
                for topic in topics {
                    send_frame(
                        &cmd_write,
                        &frame(&topic, "phx_leave", serde_json::json!({}), &next_ref()),
                    )
                    .await;
                }
                let _ = cmd_write.lock().await.send(WsMessage::Close(None)).await;
                return;
            }
        };

        let msg_ref = msg.msg_ref.clone().unwrap_or_default();
        pending.lock().await.insert(
            msg_ref.clone(),
            PendingReply {
                topic: topic.clone(),
                is_join,
                reply: Some(reply),
            },
        );
        if !send_frame(&cmd_write, &msg).await {
            warn!(topic = %topic, event = %msg.event, "Failed to send realtime frame");
            if let Some(waiting) = pending.lock().await.remove(&msg_ref) {
                if let Some(reply) = waiting.reply {
                    let _ = reply.send(Err(RealtimeError::Disconnected));
                }
            }
        }
    }
}
