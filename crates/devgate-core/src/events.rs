//! Device event system for connection, state and record notifications.
//!
//! Every session owns an [`EventDispatcher`]. Records produced by the
//! notification router are republished here, together with connection
//! changes and errors that have no caller to return to.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use devgate_types::{ConnectionState, RecordObject};

use crate::config::DEFAULT_EVENT_CAPACITY;

/// Events emitted by a device session.
///
/// Events serialize as internally tagged JSON (`{"type": "record", ...}`) so
/// a gateway can forward them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// The session reached `Connected`.
    Connected { device: String },
    /// The session reached `Disconnected`.
    Disconnected { device: String },
    /// The connection state changed.
    StateChanged {
        device: String,
        state: ConnectionState,
    },
    /// A new record was decoded from a notification.
    Record { record: RecordObject },
    /// Subscriptions were replayed after a connect.
    Resubscribed {
        device: String,
        components: Vec<String>,
    },
    /// An error occurred outside of a caller's operation.
    Error { device: String, error: String },
}

impl DeviceEvent {
    /// Logical id of the device the event belongs to.
    pub fn device(&self) -> &str {
        match self {
            DeviceEvent::Connected { device }
            | DeviceEvent::Disconnected { device }
            | DeviceEvent::StateChanged { device, .. }
            | DeviceEvent::Resubscribed { device, .. }
            | DeviceEvent::Error { device, .. } => device,
            DeviceEvent::Record { record } => &record.device_id,
        }
    }
}

/// Sending half of a session's event channel.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiving half handed out by [`EventDispatcher::subscribe`].
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Fan-out of [`DeviceEvent`]s to every listener of one session.
///
/// Slow listeners lag and lose the oldest events; senders never block.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Dispatcher buffering up to `capacity` events per listener.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// New listener, seeing only events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Publish `event`; dropped when nobody listens.
    pub fn send(&self, event: DeviceEvent) {
        let _ = self.sender.send(event);
    }

    /// Listeners currently attached.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devgate_types::Value;

    #[tokio::test]
    async fn test_dispatch_to_multiple_receivers() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(DeviceEvent::Connected {
            device: "dummyd1".to_string(),
        });

        assert_eq!(a.recv().await.unwrap().device(), "dummyd1");
        assert_eq!(b.recv().await.unwrap().device(), "dummyd1");
    }

    #[test]
    fn test_send_without_receivers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(DeviceEvent::Disconnected {
            device: "x".to_string(),
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = DeviceEvent::StateChanged {
            device: "dummysw1".to_string(),
            state: ConnectionState::On,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["state"], "ON");

        let record = RecordObject::new("loranode7", "LoraData", Value::Integer(7), "lora");
        let event = DeviceEvent::Record { record };
        assert_eq!(event.device(), "loranode7");
        let json = serde_json::to_string(&event).unwrap();
        let back: DeviceEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
