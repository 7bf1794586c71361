//! Notification routing.
//!
//! The [`NotificationRouter`] is the one listener a session attaches to its
//! backend's notification stream. For every notification addressed to the
//! session's device it resolves the selector to catalog components, decodes
//! each, drops exact-zero readings for device types that ask for it, caches
//! the record as the last known value and republishes it as a
//! [`DeviceEvent::Record`].
//!
//! Routing runs in its own task and never takes the session lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use devgate_types::{DecodeError, RecordObject};

use crate::backend::{Notification, SharedBackend};
use crate::devices::DeviceProfile;
use crate::events::{DeviceEvent, EventDispatcher};

/// Last known record per component.
pub(crate) type RecordCache = Arc<RwLock<HashMap<String, RecordObject>>>;

/// Outcome of routing one notification to one component.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// A decoded record to cache and republish.
    Record(RecordObject),
    /// An exact-zero reading dropped by the zero filter.
    Filtered {
        /// Component whose reading was dropped.
        component: String,
    },
    /// The component's decoder rejected the payload.
    Failed {
        /// Component whose decoder failed.
        component: String,
        /// The decode failure.
        error: DecodeError,
    },
}

/// Route a notification through a profile's catalog.
///
/// Returns one entry per component whose subscribe selector matches the
/// notification selector, in catalog order. Components sharing a selector
/// are decoded independently.
pub fn route(profile: &DeviceProfile, device_id: &str, notification: &Notification) -> Vec<Routed> {
    profile
        .catalog()
        .resolve(&notification.selector)
        .into_iter()
        .map(|descriptor| match descriptor.decode(&notification.payload) {
            Ok(value) if profile.filter_zero_readings() && value.is_zero() => Routed::Filtered {
                component: descriptor.name().to_string(),
            },
            Ok(value) => Routed::Record(RecordObject::new(
                device_id,
                descriptor.name(),
                value,
                descriptor.unit(),
            )),
            Err(error) => Routed::Failed {
                component: descriptor.name().to_string(),
                error,
            },
        })
        .collect()
}

/// Everything the routing task needs, cloned out of the session.
#[derive(Clone)]
pub(crate) struct RouterContext {
    pub device_id: String,
    pub address: String,
    pub profile: Arc<DeviceProfile>,
    pub backend: SharedBackend,
    pub events: EventDispatcher,
    pub cache: RecordCache,
}

impl RouterContext {
    async fn deliver(&self, notification: &Notification) {
        for routed in route(&self.profile, &self.device_id, notification) {
            match routed {
                Routed::Record(record) => {
                    trace!(component = %record.component, value = %record.value, "Routed record");
                    self.cache
                        .write()
                        .await
                        .insert(record.component.clone(), record.clone());
                    self.events.send(DeviceEvent::Record { record });
                }
                Routed::Filtered { component } => {
                    debug!(%component, "Dropped zero reading");
                }
                Routed::Failed { component, error } => {
                    warn!(%component, error = %error, "Failed to decode notification, dropping");
                    self.events.send(DeviceEvent::Error {
                        device: self.device_id.clone(),
                        error: format!("decode {}: {}", component, error),
                    });
                }
            }
        }
    }
}

struct RouterHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// The single notification listener of a device session.
///
/// Attach and detach are idempotent; dropping the router detaches it.
#[derive(Default)]
pub struct NotificationRouter {
    handle: Option<RouterHandle>,
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl NotificationRouter {
    /// Create a detached router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the routing task is attached.
    pub fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    /// Attach to the backend's notification stream.
    ///
    /// The receiver is taken before this returns, so notifications sent by a
    /// backend subscribe issued afterwards are not missed. Returns `false` if
    /// the router was already attached.
    pub(crate) fn attach(&mut self, ctx: &RouterContext) -> bool {
        if self.handle.is_some() {
            return false;
        }

        let mut notifications = ctx.backend.notifications();
        let cancel = CancellationToken::new();
        let task_token = cancel.clone();
        let ctx = ctx.clone();

        let task = tokio::spawn(async move {
            debug!(device = %ctx.device_id, "Notification router attached");
            loop {
                let received = tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    received = notifications.recv() => received,
                };

                match received {
                    Ok(notification) if notification.address.eq_ignore_ascii_case(&ctx.address) => {
                        ctx.deliver(&notification).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(device = %ctx.device_id, skipped, "Notification router lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(device = %ctx.device_id, "Backend notification stream closed");
                        break;
                    }
                }
            }
            debug!(device = %ctx.device_id, "Notification router stopped");
        });

        self.handle = Some(RouterHandle { cancel, task });
        true
    }

    /// Detach from the backend. Returns `false` if the router was not attached.
    pub(crate) fn detach(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.cancel.cancel();
                drop(handle.task);
                true
            }
            None => false,
        }
    }
}

impl Drop for NotificationRouter {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{dummy, humitemp, lora};
    use crate::mock::MockBackend;
    use devgate_types::{ProtocolKind, Selector, Value};
    use std::time::Duration;

    #[test]
    fn test_route_shared_selector() {
        let profile = humitemp::profile().unwrap();
        let notification =
            Notification::new("aa", humitemp::data_selector(), vec![0, 21, 5, 0, 45, 3]);

        let routed = route(&profile, "bleaa", &notification);
        assert_eq!(routed.len(), 2);
        let Routed::Record(temperature) = &routed[0] else {
            panic!("expected record, got {:?}", routed[0]);
        };
        assert_eq!(temperature.component, "Temperature");
        assert_eq!(temperature.value, Value::Number(21.5));
        assert_eq!(temperature.unit, humitemp::TEMPERATURE_UNIT);
        let Routed::Record(humidity) = &routed[1] else {
            panic!("expected record, got {:?}", routed[1]);
        };
        assert_eq!(humidity.component, "Humidity");
        assert_eq!(humidity.value, Value::Number(45.3));
    }

    #[test]
    fn test_route_filters_zero() {
        let profile = humitemp::profile().unwrap();
        let notification =
            Notification::new("aa", humitemp::data_selector(), vec![0, 0, 0, 0, 50, 0]);

        let routed = route(&profile, "bleaa", &notification);
        assert_eq!(
            routed[0],
            Routed::Filtered {
                component: "Temperature".to_string()
            }
        );
        assert!(matches!(&routed[1], Routed::Record(r) if r.value == Value::Number(50.0)));

        // LoRa keeps zero readings.
        let profile = lora::profile().unwrap();
        let routed = route(&profile, "lora1", &Notification::new("1", Selector::new(), vec![0]));
        assert!(matches!(&routed[0], Routed::Record(r) if r.value == Value::Integer(0)));
    }

    #[test]
    fn test_route_decode_failure_and_unmatched() {
        let profile = humitemp::profile().unwrap();
        let short = Notification::new("aa", humitemp::data_selector(), vec![0, 21]);
        let routed = route(&profile, "bleaa", &short);
        assert!(routed.iter().all(|r| matches!(r, Routed::Failed { .. })));

        let other = Notification::new("aa", Selector::from([("characteristic", "ffff")]), vec![1]);
        assert!(route(&profile, "bleaa", &other).is_empty());
    }

    #[tokio::test]
    async fn test_attach_detach_idempotent() {
        let backend = Arc::new(MockBackend::new(ProtocolKind::Dummy));
        let ctx = RouterContext {
            device_id: "dummyd1".to_string(),
            address: "d1".to_string(),
            profile: Arc::new(dummy::profile().unwrap()),
            backend,
            events: EventDispatcher::new(16),
            cache: RecordCache::default(),
        };

        let mut router = NotificationRouter::new();
        assert!(!router.detach());
        assert!(router.attach(&ctx));
        assert!(!router.attach(&ctx));
        assert!(router.is_attached());
        assert!(router.detach());
        assert!(!router.is_attached());
        assert!(!router.detach());
    }

    #[tokio::test]
    async fn test_router_delivers_for_own_address_only() {
        let backend = Arc::new(MockBackend::new(ProtocolKind::Dummy));
        let events = EventDispatcher::new(16);
        let mut rx = events.subscribe();
        let ctx = RouterContext {
            device_id: "dummyd1".to_string(),
            address: "d1".to_string(),
            profile: Arc::new(dummy::profile().unwrap()),
            backend: backend.clone(),
            events,
            cache: RecordCache::default(),
        };

        let mut router = NotificationRouter::new();
        router.attach(&ctx);

        backend.notify(Notification::new("d2", Selector::new(), b"other".to_vec()));
        backend.notify(Notification::new("d1", Selector::new(), b"mine".to_vec()));

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let DeviceEvent::Record { record } = event else {
            panic!("expected record event, got {:?}", event);
        };
        assert_eq!(record.value, Value::from("mine"));
        assert_eq!(
            ctx.cache.read().await.get(dummy::COMPONENT).map(|r| &r.value),
            Some(&Value::from("mine"))
        );
    }
}
