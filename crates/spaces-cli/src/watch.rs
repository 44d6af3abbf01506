//! `spaces watch`: print who is in a host's channel and what they say.

use std::sync::Arc;
use std::time::Duration;

use spaces_common::{ConfigError, SpacesError};
use spaces_config::SpacesConfig;
use spaces_session::{PresenceGateway, PresenceRole, RealtimeBus, RealtimeConfig};
use tokio::sync::broadcast::error::RecvError;

pub async fn run(config: SpacesConfig, host_id: &str, user_id: &str) -> Result<(), SpacesError> {
    if config.presence.realtime.project_ref.is_empty() {
        return Err(ConfigError::ValidationError(
            "presence.realtime.project_ref must be set to watch a channel".into(),
        )
        .into());
    }
    let access_token = std::env::var("SPACES_ACCESS_TOKEN").ok();
    let realtime = RealtimeConfig::from_settings(&config.presence.realtime, access_token);
    let bus = Arc::new(RealtimeBus::connect(realtime, user_id));
    let gateway = PresenceGateway::new(bus.clone(), &config.presence, user_id);

    let channel = gateway.channel_for(host_id);
    let mut messages = gateway
        .subscribe(&channel)
        .await
        .map_err(|e| SpacesError::Network(e.to_string()))?;
    tracing::info!(channel = %channel, "Watching");

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => match gateway.members(&channel).await {
                Ok(members) => println!(
                    "{channel}: {} member(s), {} visitor(s)",
                    members.len(),
                    gateway.count_role(&members, PresenceRole::Participant)
                ),
                Err(e) => tracing::warn!("Presence read failed: {e}"),
            },
            msg = messages.recv() => match msg {
                Ok(msg) => println!("{} {}", msg.event, msg.data),
                Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {n} messages"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    gateway.detach_all().await;
    bus.shutdown().await;
    Ok(())
}
