use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::notifications::ToastLevel;

/// Observable changes of the local session state, published for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    RoomsChanged,
    SelectedSpaceChanged(Option<String>),
    CurrentViewingSpaceChanged(Option<String>),
    InSpaceChanged(bool),
    JoiningChanged(bool),
    RecordingChanged(bool),
    RecordingTimeRemaining(u32),
    ActiveSpeakerChanged(Option<String>),
    Toast { level: ToastLevel, message: String },
    Shutdown,
    #[serde(other)]
    Unknown,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::RoomsChanged);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::RoomsChanged));
    }

    #[tokio::test]
    async fn multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(Event::JoiningChanged(true));

        assert!(matches!(rx1.recv().await.unwrap(), Event::JoiningChanged(true)));
        assert!(matches!(rx2.recv().await.unwrap(), Event::JoiningChanged(true)));
    }

    #[tokio::test]
    async fn session_view_events_keep_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(Event::CurrentViewingSpaceChanged(Some("space-1".into())));
        bus.publish(Event::InSpaceChanged(true));
        bus.publish(Event::Toast {
            level: ToastLevel::Error,
            message: "host busy".into(),
        });

        let e1 = rx.recv().await.unwrap();
        assert!(matches!(e1, Event::CurrentViewingSpaceChanged(Some(ref id)) if id == "space-1"));
        let e2 = rx.recv().await.unwrap();
        assert!(matches!(e2, Event::InSpaceChanged(true)));
        let e3 = rx.recv().await.unwrap();
        assert!(
            matches!(e3, Event::Toast { level: ToastLevel::Error, ref message } if message == "host busy")
        );
    }

    #[test]
    fn publish_returns_zero_with_no_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(Event::Shutdown), 0);
    }

    #[test]
    fn unknown_event_deserializes() {
        let json = r#"{"type":"SomethingNewer","data":null}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert!(matches!(event, Event::Unknown));
    }
}
