//! Two-sided fixtures: every engine built from one [`World`] shares the
//! presence bus, the media hub and the backend.

use std::sync::Arc;
use std::time::Duration;

use spaces_common::EventBus;
use spaces_config::SpacesConfig;

use super::{EngineBuilder, SpaceEngine};
use crate::clock::ManualClock;
use crate::identity::Identity;
use crate::loopback::{LoopbackBus, LoopbackServices, LoopbackSfu, LoopbackTransport};
use crate::protocol::Profile;
use crate::services::Services;

pub(crate) struct World {
    pub bus: LoopbackBus,
    pub sfu: LoopbackSfu,
    pub services: LoopbackServices,
    pub clock: Arc<ManualClock>,
}

impl World {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        Self {
            bus: LoopbackBus::new(),
            sfu: LoopbackSfu::new(),
            services: LoopbackServices::new(clock.clone()),
            clock,
        }
    }

    pub fn engine(&self, user_id: &str) -> SpaceEngine {
        self.engine_on(user_id, self.sfu.transport())
    }

    /// An engine whose media goes through `transport` instead of the
    /// shared hub.
    pub fn engine_on(&self, user_id: &str, transport: LoopbackTransport) -> SpaceEngine {
        EngineBuilder::new(SpacesConfig::default(), Identity::new(user_id, user_id, user_id))
            .bus(Arc::new(self.bus.client(user_id)))
            .transport(Arc::new(transport))
            .services(Services::from_shared(Arc::new(self.services.clone())))
            .clock(self.clock.clone())
            .events(EventBus::new(256))
            .build()
            .unwrap()
    }
}

pub(crate) fn profile(id: &str) -> Profile {
    Profile {
        user_id: id.into(),
        display_name: id.into(),
        username: id.into(),
        avatar_url: None,
    }
}

/// Let spawned listeners and pumps drain. Tests using this run on paused
/// time, so the sleep returns as soon as everything else is idle.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
