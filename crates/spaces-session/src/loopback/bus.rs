use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::presence::{BusError, BusMessage, PresenceBus, PresenceMember};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOp {
    Attach,
    Detach,
    Enter,
    Leave,
    Members,
    Publish,
    Subscribe,
}

struct HubChannel {
    tx: broadcast::Sender<BusMessage>,
    attached: HashSet<String>,
    members: BTreeMap<String, serde_json::Value>,
}

impl HubChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            attached: HashSet::new(),
            members: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
struct BusHub {
    channels: HashMap<String, HubChannel>,
    failures: HashMap<BusOp, u32>,
    stalled: HashSet<BusOp>,
}

/// Shared in-memory presence bus. Hand each simulated user its own
/// [`LoopbackBusClient`].
#[derive(Clone, Default)]
pub struct LoopbackBus {
    hub: Arc<Mutex<BusHub>>,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(&self, client_id: &str) -> LoopbackBusClient {
        LoopbackBusClient {
            hub: Arc::clone(&self.hub),
            client_id: client_id.to_string(),
        }
    }

    /// Make the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: BusOp, times: u32) {
        *self.hub.lock().failures.entry(op).or_default() += times;
    }

    /// Make every call of `op` hang until [`resume`](Self::resume).
    pub fn stall(&self, op: BusOp) {
        self.hub.lock().stalled.insert(op);
    }

    pub fn resume(&self, op: BusOp) {
        self.hub.lock().stalled.remove(&op);
    }

    /// Put a member into a channel's presence set directly.
    pub fn seed_member(&self, channel: &str, client_id: &str, data: serde_json::Value) {
        self.hub
            .lock()
            .channels
            .entry(channel.to_string())
            .or_insert_with(HubChannel::new)
            .members
            .insert(client_id.to_string(), data);
    }

    pub fn members_of(&self, channel: &str) -> Vec<PresenceMember> {
        self.hub
            .lock()
            .channels
            .get(channel)
            .map(|c| {
                c.members
                    .iter()
                    .map(|(id, data)| PresenceMember {
                        client_id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn attached_clients(&self, channel: &str) -> Vec<String> {
        let mut clients: Vec<String> = self
            .hub
            .lock()
            .channels
            .get(channel)
            .map(|c| c.attached.iter().cloned().collect())
            .unwrap_or_default();
        clients.sort();
        clients
    }
}

pub struct LoopbackBusClient {
    hub: Arc<Mutex<BusHub>>,
    client_id: String,
}

impl LoopbackBusClient {
    async fn check(&self, op: BusOp, channel: &str) -> Result<(), BusError> {
        let stalled = {
            let mut hub = self.hub.lock();
            if let Some(left) = hub.failures.get_mut(&op).filter(|n| **n > 0) {
                *left -= 1;
                return Err(BusError::Rejected {
                    channel: channel.to_string(),
                    reason: format!("injected {op:?} failure"),
                });
            }
            hub.stalled.contains(&op)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    fn with_attached<R>(
        &self,
        channel: &str,
        f: impl FnOnce(&mut HubChannel) -> R,
    ) -> Result<R, BusError> {
        let mut hub = self.hub.lock();
        match hub.channels.get_mut(channel) {
            Some(ch) if ch.attached.contains(&self.client_id) => Ok(f(ch)),
            _ => Err(BusError::NotAttached(channel.to_string())),
        }
    }
}

#[async_trait]
impl PresenceBus for LoopbackBusClient {
    async fn attach(&self, channel: &str) -> Result<(), BusError> {
        self.check(BusOp::Attach, channel).await?;
        self.hub
            .lock()
            .channels
            .entry(channel.to_string())
            .or_insert_with(HubChannel::new)
            .attached
            .insert(self.client_id.clone());
        Ok(())
    }

    async fn detach(&self, channel: &str) -> Result<(), BusError> {
        self.check(BusOp::Detach, channel).await?;
        if let Some(ch) = self.hub.lock().channels.get_mut(channel) {
            ch.attached.remove(&self.client_id);
            ch.members.remove(&self.client_id);
        }
        Ok(())
    }

    async fn enter(&self, channel: &str, data: serde_json::Value) -> Result<(), BusError> {
        self.check(BusOp::Enter, channel).await?;
        self.with_attached(channel, |ch| {
            ch.members.insert(self.client_id.clone(), data);
        })
    }

    async fn leave(&self, channel: &str, _data: serde_json::Value) -> Result<(), BusError> {
        self.check(BusOp::Leave, channel).await?;
        self.with_attached(channel, |ch| {
            ch.members.remove(&self.client_id);
        })
    }

    async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>, BusError> {
        self.check(BusOp::Members, channel).await?;
        self.with_attached(channel, |ch| {
            ch.members
                .iter()
                .map(|(id, data)| PresenceMember {
                    client_id: id.clone(),
                    data: data.clone(),
                })
                .collect()
        })
    }

    async fn publish(
        &self,
        channel: &str,
        event: &str,
        data: serde_json::Value,
    ) -> Result<(), BusError> {
        self.check(BusOp::Publish, channel).await?;
        self.with_attached(channel, |ch| {
            let _ = ch.tx.send(BusMessage {
                channel: channel.to_string(),
                event: event.to_string(),
                data,
            });
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<BusMessage>, BusError> {
        self.check(BusOp::Subscribe, channel).await?;
        self.with_attached(channel, |ch| ch.tx.subscribe())
    }
}
