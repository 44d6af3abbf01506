use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use spaces_config::PresenceConfig;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{BusError, BusMessage, PresenceBus, PresenceMember};
use crate::protocol::{PresenceData, PresenceRole};

#[derive(Debug, Default)]
struct GatewayState {
    attached: HashSet<String>,
    entered: HashMap<String, serde_json::Value>,
}

/// Presence bus access scoped to one channel per host.
///
/// Every operation attaches before use and skips the attach when the
/// channel is already attached. Each bus call is bounded by the configured
/// request timeout.
pub struct PresenceGateway {
    bus: Arc<dyn PresenceBus>,
    prefix: String,
    local_user_id: String,
    timeout: Duration,
    state: Mutex<GatewayState>,
}

impl PresenceGateway {
    pub fn new(bus: Arc<dyn PresenceBus>, config: &PresenceConfig, local_user_id: &str) -> Self {
        Self {
            bus,
            prefix: config.channel_prefix.clone(),
            local_user_id: local_user_id.to_string(),
            timeout: Duration::from_millis(u64::from(config.request_timeout_ms)),
            state: Mutex::new(GatewayState::default()),
        }
    }

    pub fn channel_for(&self, host_user_id: &str) -> String {
        format!("{}{}", self.prefix, host_user_id)
    }

    pub fn home_channel(&self) -> String {
        self.channel_for(&self.local_user_id)
    }

    pub fn is_attached(&self, channel: &str) -> bool {
        self.state.lock().attached.contains(channel)
    }

    pub fn is_entered(&self, channel: &str) -> bool {
        self.state.lock().entered.contains_key(channel)
    }

    /// Attached channels other than the local user's own.
    pub fn foreign_channels(&self) -> Vec<String> {
        let home = self.home_channel();
        let mut channels: Vec<String> = self
            .state
            .lock()
            .attached
            .iter()
            .filter(|c| **c != home)
            .cloned()
            .collect();
        channels.sort();
        channels
    }

    async fn bounded<T, F>(&self, channel: &str, operation: &str, fut: F) -> Result<T, BusError>
    where
        F: Future<Output = Result<T, BusError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BusError::Timeout {
                channel: channel.to_string(),
                operation: operation.to_string(),
            })?
    }

    pub async fn attach(&self, channel: &str) -> Result<(), BusError> {
        if self.is_attached(channel) {
            debug!(channel = %channel, "Already attached, skipping");
            return Ok(());
        }
        self.bounded(channel, "attach", self.bus.attach(channel)).await?;
        self.state.lock().attached.insert(channel.to_string());
        debug!(channel = %channel, "Attached");
        Ok(())
    }

    /// Leave presence if entered, then detach. No-op for unattached channels.
    pub async fn detach(&self, channel: &str) -> Result<(), BusError> {
        if self.is_entered(channel) {
            if let Err(e) = self.leave(channel).await {
                warn!(channel = %channel, error = %e, "Presence leave before detach failed");
            }
        }
        if !self.is_attached(channel) {
            return Ok(());
        }
        let result = self.bounded(channel, "detach", self.bus.detach(channel)).await;
        self.state.lock().attached.remove(channel);
        debug!(channel = %channel, "Detached");
        result
    }

    pub async fn enter(&self, channel: &str, data: &PresenceData) -> Result<(), BusError> {
        self.attach(channel).await?;
        let value = to_value(data)?;
        self.bounded(channel, "enter", self.bus.enter(channel, value.clone()))
            .await?;
        self.state.lock().entered.insert(channel.to_string(), value);
        debug!(channel = %channel, role = ?data.role, "Entered presence");
        Ok(())
    }

    pub async fn leave(&self, channel: &str) -> Result<(), BusError> {
        let Some(data) = self.state.lock().entered.remove(channel) else {
            return Ok(());
        };
        self.bounded(channel, "leave", self.bus.leave(channel, data)).await
    }

    pub async fn members(&self, channel: &str) -> Result<Vec<PresenceMember>, BusError> {
        self.attach(channel).await?;
        self.bounded(channel, "members", self.bus.members(channel)).await
    }

    /// Read a channel's members without staying attached to it when it was
    /// not attached before.
    pub async fn peek_members(&self, channel: &str) -> Result<Vec<PresenceMember>, BusError> {
        let was_attached = self.is_attached(channel);
        let result = self.members(channel).await;
        if !was_attached {
            if let Err(e) = self.detach(channel).await {
                warn!(channel = %channel, error = %e, "Detach after peek failed");
            }
        }
        result
    }

    /// Count members entered with `role`, ignoring the local user and
    /// entries whose data cannot be decoded.
    pub fn count_role(&self, members: &[PresenceMember], role: PresenceRole) -> usize {
        members
            .iter()
            .filter(|m| m.client_id != self.local_user_id)
            .filter_map(|m| PresenceData::from_value(&m.data))
            .filter(|d| d.role == role && d.profile.user_id != self.local_user_id)
            .count()
    }

    pub async fn publish<T: Serialize>(
        &self,
        channel: &str,
        event: &str,
        payload: &T,
    ) -> Result<(), BusError> {
        self.attach(channel).await?;
        let value = to_value(payload)?;
        self.bounded(channel, "publish", self.bus.publish(channel, event, value))
            .await?;
        debug!(channel = %channel, event = %event, "Published");
        Ok(())
    }

    pub async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<BusMessage>, BusError> {
        self.attach(channel).await?;
        self.bounded(channel, "subscribe", self.bus.subscribe(channel))
            .await
    }

    /// Detach every foreign channel, then attach and enter the home channel.
    pub async fn go_home(&self, data: &PresenceData) -> Result<(), BusError> {
        for channel in self.foreign_channels() {
            if let Err(e) = self.detach(&channel).await {
                warn!(channel = %channel, error = %e, "Failed to detach foreign channel");
            }
        }
        let home = self.home_channel();
        self.enter(&home, data).await
    }

    pub async fn leave_home(&self) -> Result<(), BusError> {
        let home = self.home_channel();
        self.detach(&home).await
    }

    /// Detach from everything. Errors are logged; the local bookkeeping is
    /// cleared regardless.
    pub async fn detach_all(&self) {
        let channels: Vec<String> = self.state.lock().attached.iter().cloned().collect();
        for channel in channels {
            if let Err(e) = self.detach(&channel).await {
                warn!(channel = %channel, error = %e, "Detach failed");
            }
        }
        let mut state = self.state.lock();
        state.attached.clear();
        state.entered.clear();
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, BusError> {
    serde_json::to_value(value).map_err(|e| BusError::Other(format!("encode failed: {e}")))
}
