use std::sync::Arc;

use parking_lot::RwLock;
use spaces_common::{Event, EventBus, Toast, ToastLevel};
use tokio::sync::broadcast;

use super::{LocalStore, StoreView};

/// Shared handle to the [`LocalStore`].
///
/// The lock is held only for the duration of the closure passed to
/// [`read`](Self::read) or [`update`](Self::update); callers must not await
/// inside it.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<LocalStore>>,
    events: EventBus,
}

impl StoreHandle {
    pub fn new(recording_ceiling: u32, events: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LocalStore::new(recording_ceiling))),
            events,
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&LocalStore) -> R) -> R {
        f(&self.inner.read())
    }

    /// Mutate the store, then publish the events the mutation produced.
    pub fn update<R>(&self, f: impl FnOnce(&mut LocalStore) -> R) -> R {
        let (result, events) = {
            let mut store = self.inner.write();
            let result = f(&mut store);
            (result, store.take_events())
        };
        for event in events {
            self.events.publish(event);
        }
        result
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn view(&self) -> StoreView {
        self.read(|s| s.view())
    }

    pub fn toast(&self, toast: Toast) {
        self.update(|s| s.push_toast(toast));
    }

    /// Visible toasts, oldest first.
    pub fn toasts(&self) -> Vec<(ToastLevel, String)> {
        self.update(|s| {
            s.toasts_mut()
                .visible()
                .into_iter()
                .map(|t| (t.level, t.message.clone()))
                .collect()
        })
    }

    /// Claim the join lock for `space_id`. The returned guard releases it,
    /// and clears `is_joining` when no other join remains, on drop.
    pub fn try_begin_join(&self, space_id: &str) -> Option<JoinGuard> {
        self.update(|s| s.begin_join(space_id)).then(|| JoinGuard {
            store: self.clone(),
            space_id: space_id.to_string(),
        })
    }
}

#[must_use = "dropping the guard ends the join immediately"]
pub struct JoinGuard {
    store: StoreHandle,
    space_id: String,
}

impl JoinGuard {
    pub fn space_id(&self) -> &str {
        &self.space_id
    }
}

impl Drop for JoinGuard {
    fn drop(&mut self) {
        let space_id = std::mem::take(&mut self.space_id);
        self.store.update(|s| s.finish_join(&space_id));
    }
}
