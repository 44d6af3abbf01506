use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use spaces_config::SpacesConfig;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::identity::Identity;
use crate::media::{MediaRoomAdapter, MediaTransport};
use crate::presence::{BusError, PresenceGateway};
use crate::protocol::PresenceData;
use crate::recording::RecordingManager;
use crate::services::Services;
use crate::store::StoreHandle;

/// What the local user currently is in a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LocalRole {
    Idle,
    Host {
        space_id: String,
    },
    Participant {
        space_id: String,
        host_id: String,
        channel: String,
    },
}

/// Background tasks owned by the session.
#[derive(Default)]
pub(crate) struct SessionTasks {
    pub(crate) media_pump: Option<JoinHandle<()>>,
    pub(crate) host_listener: Option<JoinHandle<()>>,
    pub(crate) visitor_listener: Option<JoinHandle<()>>,
    pub(crate) admission: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TaskSlot {
    MediaPump,
    HostListener,
    VisitorListener,
    /// The host letting one visitor in.
    Admission,
}

impl TaskSlot {
    pub(crate) const ALL: [TaskSlot; 4] = [
        TaskSlot::MediaPump,
        TaskSlot::HostListener,
        TaskSlot::VisitorListener,
        TaskSlot::Admission,
    ];
}

impl SessionTasks {
    fn slot(&mut self, slot: TaskSlot) -> &mut Option<JoinHandle<()>> {
        match slot {
            TaskSlot::MediaPump => &mut self.media_pump,
            TaskSlot::HostListener => &mut self.host_listener,
            TaskSlot::VisitorListener => &mut self.visitor_listener,
            TaskSlot::Admission => &mut self.admission,
        }
    }
}

/// Everything one signed-in user's session is made of.
///
/// Locks here guard short synchronous sections only. When both are needed
/// the store lock is taken before the adapter lock.
pub(crate) struct SessionContext {
    pub(crate) config: SpacesConfig,
    pub(crate) identity: Identity,
    pub(crate) store: StoreHandle,
    pub(crate) gateway: PresenceGateway,
    pub(crate) transport: Arc<dyn MediaTransport>,
    pub(crate) services: Services,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) adapter: Mutex<MediaRoomAdapter>,
    pub(crate) recording: RecordingManager,
    pub(crate) admitting: AtomicBool,
    role: Mutex<LocalRole>,
    tasks: Mutex<SessionTasks>,
}

impl SessionContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SpacesConfig,
        identity: Identity,
        store: StoreHandle,
        gateway: PresenceGateway,
        transport: Arc<dyn MediaTransport>,
        services: Services,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let adapter = MediaRoomAdapter::new(
            identity.user_id.clone(),
            &config.speaker,
            config.recording.min_peers,
        );
        let recording = RecordingManager::new(
            config.recording.clone(),
            store.clone(),
            services.clone(),
            Arc::clone(&clock),
        );
        Self {
            config,
            identity,
            store,
            gateway,
            transport,
            services,
            clock,
            adapter: Mutex::new(adapter),
            recording,
            admitting: AtomicBool::new(false),
            role: Mutex::new(LocalRole::Idle),
            tasks: Mutex::new(SessionTasks::default()),
        }
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub(crate) fn role(&self) -> LocalRole {
        self.role.lock().clone()
    }

    pub(crate) fn set_role(&self, role: LocalRole) {
        debug!(role = ?role, "Local role changed");
        *self.role.lock() = role;
    }

    /// Atomically drop out of `space_id` as a visitor, returning the host
    /// channel. `None` when the local user is not a visitor of that space.
    pub(crate) fn take_participant(&self, space_id: &str) -> Option<String> {
        let mut role = self.role.lock();
        match &*role {
            LocalRole::Participant {
                space_id: joined,
                channel,
                ..
            } if joined == space_id => {
                let channel = channel.clone();
                *role = LocalRole::Idle;
                Some(channel)
            }
            _ => None,
        }
    }

    pub(crate) fn is_host_of(&self, space_id: &str) -> bool {
        matches!(self.role(), LocalRole::Host { space_id: ref s } if s == space_id)
    }

    /// Store `handle` in `slot`, aborting whatever ran there before.
    pub(crate) fn replace_task(&self, slot: TaskSlot, handle: JoinHandle<()>) {
        let previous = self.tasks.lock().slot(slot).replace(handle);
        if let Some(old) = previous {
            old.abort();
        }
    }

    pub(crate) fn abort_task(&self, slot: TaskSlot) {
        let handle = self.tasks.lock().slot(slot).take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Abort an in-flight admission and free the admission guard.
    pub(crate) fn cancel_admission(&self) {
        self.abort_task(TaskSlot::Admission);
        self.admitting.store(false, Ordering::SeqCst);
    }

    pub(crate) fn has_task(&self, slot: TaskSlot) -> bool {
        self.tasks
            .lock()
            .slot(slot)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Presence entered on the local user's own channel.
    pub(crate) fn home_presence(&self) -> PresenceData {
        let space_id = match self.role() {
            LocalRole::Host { space_id } => Some(space_id),
            _ => None,
        };
        PresenceData::host(
            self.identity.profile(),
            self.identity.location.clone(),
            space_id,
        )
    }

    /// Detach from every foreign channel and re-enter the home channel.
    pub(crate) async fn go_home(&self) -> Result<(), BusError> {
        let presence = self.home_presence();
        self.gateway.go_home(&presence).await
    }

    pub(crate) async fn go_home_logged(&self) {
        if let Err(e) = self.go_home().await {
            warn!(user_id = %self.user_id(), error = %e, "Could not return to home channel");
        }
    }

    /// Publish on `channel`, logging instead of failing.
    pub(crate) async fn announce<T: Serialize + Sync>(&self, channel: &str, event: &str, payload: &T) {
        if let Err(e) = self.gateway.publish(channel, event, payload).await {
            warn!(channel = %channel, event = %event, error = %e, "Announcement failed");
        }
    }
}
