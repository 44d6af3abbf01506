//! `spaces simulate`: a host and a visitor talking through the in-process
//! bus, media hub and backend.

use std::sync::Arc;
use std::time::Duration;

use spaces_common::{Event, EventBus, SpacesError};
use spaces_config::SpacesConfig;
use spaces_session::loopback::{LoopbackBus, LoopbackServices, LoopbackSfu};
use spaces_session::{Clock, EngineBuilder, Identity, Services, SpaceEngine, SystemClock};
use tokio::sync::broadcast::error::RecvError;

const SPACE_ID: &str = "demo-space";

struct Backends {
    bus: LoopbackBus,
    sfu: LoopbackSfu,
    services: LoopbackServices,
    clock: Arc<dyn Clock>,
}

impl Backends {
    fn new() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            bus: LoopbackBus::new(),
            sfu: LoopbackSfu::new(),
            services: LoopbackServices::new(Arc::clone(&clock)),
            clock,
        }
    }

    fn engine(&self, config: &SpacesConfig, user_id: &str, name: &str) -> Result<SpaceEngine, SpacesError> {
        let engine = EngineBuilder::new(config.clone(), Identity::new(user_id, name, user_id))
            .bus(Arc::new(self.bus.client(user_id)))
            .transport(Arc::new(self.sfu.transport()))
            .services(Services::from_shared(Arc::new(self.services.clone())))
            .clock(Arc::clone(&self.clock))
            .events(EventBus::default())
            .build()?;
        log_events(user_id, &engine);
        Ok(engine)
    }
}

fn log_events(user_id: &str, engine: &SpaceEngine) {
    let user = user_id.to_string();
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(Event::RecordingTimeRemaining(secs)) if secs % 10 != 0 => {}
                Ok(event) => tracing::info!(user = %user, event = ?event, "Session event"),
                Err(RecvError::Lagged(n)) => tracing::warn!(user = %user, "Skipped {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

pub async fn run(
    config: SpacesConfig,
    topic: Option<String>,
    record: bool,
    seconds: u64,
) -> Result<(), SpacesError> {
    let backends = Backends::new();
    let host = backends.engine(&config, "host", "Hosting Hana")?;
    let visitor = backends.engine(&config, "visitor", "Visiting Vik")?;

    host.go_online().await?;
    visitor.go_online().await?;

    let room = host.start_room(SPACE_ID, topic).await?;
    visitor.upsert_room(room);
    visitor.join_room(SPACE_ID).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    if record {
        match host.recording_gate(SPACE_ID) {
            Some(gate) if gate.can_start => {
                let session = host.start_recording(SPACE_ID).await?;
                tracing::info!(session_id = %session, "Recording");
            }
            Some(gate) => tracing::warn!(reason = ?gate.reason, "Recording unavailable"),
            None => tracing::warn!("Space vanished before recording"),
        }
    }

    tokio::time::sleep(Duration::from_secs(seconds)).await;
    println!("{}", serde_json::to_string_pretty(&host.view())?);

    if host.recording().is_recording() {
        host.stop_recording(SPACE_ID).await?;
    }
    visitor.leave_room(SPACE_ID).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    host.end_room(SPACE_ID).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    for (level, message) in visitor.toasts() {
        println!("visitor toast [{level:?}]: {message}");
    }
    let records = backends.services.records();
    if !records.is_empty() {
        println!("{} capture record(s) written", records.len());
    }
    Ok(())
}
