//! Device sessions.
//!
//! A [`DeviceSession`] is the uniform control surface over one physical
//! device: connect, disconnect, status, read, write, subscribe, unsubscribe,
//! execute and commands. It owns the connection state, the subscription
//! ledger and the notification router, and gates every backend call on them.
//!
//! Connect, disconnect, subscribe, unsubscribe and power changes serialize on
//! one per-session lock. Reads and passthrough writes observe the connection
//! state through an atomic; a primed read takes the lock only to enable and
//! to disable its sensor.
//!
//! # Backend failures
//!
//! A failed backend call during subscribe or unsubscribe aborts the operation
//! and leaves the ledger exactly as it was; the caller gets the error and may
//! retry. Partial work (a sensor enabled before a failing subscribe) is rolled
//! back on a best-effort basis.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use devgate_types::{
    ConnectionState, DeviceComponent, DeviceIdentity, ProtocolKind, RecordObject,
};

use crate::backend::{self, SharedBackend};
use crate::catalog::ComponentDescriptor;
use crate::config::SessionConfig;
use crate::devices::{CommandAction, DeviceProfile, WriteMode};
use crate::error::{Error, Result};
use crate::events::{DeviceEvent, EventDispatcher, EventReceiver};
use crate::ledger::SubscriptionLedger;
use crate::priming::{PrimedReads, sensor_still_needed};
use crate::retry::with_retry;
use crate::router::{NotificationRouter, RecordCache, RouterContext};
use crate::streaming::{RecordStream, StreamOptions};

/// State guarded by the session lock.
#[derive(Debug, Default)]
struct SessionState {
    ledger: SubscriptionLedger,
    router: NotificationRouter,
    primed: PrimedReads,
}

/// A session with one device.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use devgate_core::mock::MockBackend;
/// use devgate_core::{ConnectionState, DeviceRegistry, DeviceOverview, ProtocolKind, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), devgate_core::Error> {
///     let registry = DeviceRegistry::with_defaults()?;
///     let backend = Arc::new(MockBackend::new(ProtocolKind::Dummy));
///     let overview = DeviceOverview::new("d1", "Dummy Device", ProtocolKind::Dummy);
///     let session = registry.create_session(&overview, backend, SessionConfig::default())?;
///
///     session.connect().await?;
///     assert_eq!(session.status(), ConnectionState::Connected);
///     session.subscribe("DummyData").await?;
///     assert_eq!(session.subscription_count("DummyData").await, 1);
///     Ok(())
/// }
/// ```
pub struct DeviceSession {
    identity: DeviceIdentity,
    profile: Arc<DeviceProfile>,
    backend: SharedBackend,
    config: SessionConfig,
    status: AtomicU8,
    state: Mutex<SessionState>,
    events: EventDispatcher,
    cache: RecordCache,
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("identity", &self.identity)
            .field("device_type", &self.profile.type_name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Create a session.
    ///
    /// Fails with [`Error::UnsupportedProtocol`] when the backend or the
    /// identity speaks a different protocol than the device type, and with
    /// [`Error::InvalidConfig`] when `config` is invalid.
    pub fn new(
        identity: DeviceIdentity,
        profile: Arc<DeviceProfile>,
        backend: SharedBackend,
        config: SessionConfig,
    ) -> Result<Self> {
        check_protocol(profile.protocol(), backend.protocol())?;
        check_protocol(profile.protocol(), identity.protocol)?;
        config.validate()?;

        debug!(
            device = %identity.id,
            device_type = %profile.type_name(),
            "Created device session"
        );

        Ok(Self {
            events: EventDispatcher::new(config.event_capacity),
            identity,
            profile,
            backend,
            config,
            status: AtomicU8::new(ConnectionState::Disconnected as u8),
            state: Mutex::new(SessionState::default()),
            cache: RecordCache::default(),
        })
    }

    // --- Identity and introspection ---

    /// Device identity.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Device type profile.
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Device type name.
    pub fn device_type(&self) -> &str {
        self.profile.type_name()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Components the device type exposes.
    pub fn components(&self) -> Vec<DeviceComponent> {
        self.profile.catalog().device_components()
    }

    /// Names of the device type's macro commands.
    pub fn commands(&self) -> Vec<String> {
        self.profile
            .commands()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Current connection state. Never blocks and never fails.
    pub fn status(&self) -> ConnectionState {
        ConnectionState::from(self.status.load(Ordering::SeqCst))
    }

    /// Number of active subscriptions for `component`.
    pub async fn subscription_count(&self, component: &str) -> u32 {
        self.state.lock().await.ledger.count(component)
    }

    /// Components with at least one active subscription, in activation order.
    pub async fn active_components(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .ledger
            .active()
            .map(str::to_string)
            .collect()
    }

    /// Whether the notification router is attached.
    pub async fn is_router_attached(&self) -> bool {
        self.state.lock().await.router.is_attached()
    }

    /// Last record produced for `component` by a read or a notification.
    pub async fn last_value(&self, component: &str) -> Option<RecordObject> {
        self.cache.read().await.get(component).cloned()
    }

    /// Last record of every component that produced one, sorted by component.
    pub async fn last_values(&self) -> Vec<RecordObject> {
        let mut records: Vec<_> = self.cache.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.component.cmp(&b.component));
        records
    }

    // --- Events ---

    /// Subscribe to the session's events.
    pub fn events(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Stream every record produced by the notification router.
    pub fn records(&self) -> RecordStream {
        RecordStream::new(self.events.subscribe(), StreamOptions::default())
    }

    /// Stream records with custom options.
    pub fn records_with_options(&self, options: StreamOptions) -> Result<RecordStream> {
        options.validate()?;
        Ok(RecordStream::new(self.events.subscribe(), options))
    }

    // --- Connection ---

    /// Connect to the device.
    ///
    /// Establishes the backend link (retried per `connect_retry`), re-attaches
    /// the router if subscriptions are active and, for device types that ask
    /// for it, replays enable and subscribe for every active component in
    /// activation order. Calling it while connected is a no-op. On failure
    /// the session stays `Disconnected`.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity.id))]
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.status().is_linked() {
            debug!("Already connected");
            return Ok(());
        }

        let client = &self.backend;
        let address = self.identity.address.as_str();
        let limit = self.config.connect_timeout;
        with_retry(&self.config.connect_retry, "connect", move || {
            backend::call("connect", limit, client.connect(address))
        })
        .await?;

        let active: Vec<String> = state.ledger.active().map(str::to_string).collect();
        if !active.is_empty() {
            state.router.attach(&self.router_context());
        }

        let mut resubscribed = Vec::new();
        if self.profile.resubscribe_on_connect() && !active.is_empty() {
            if let Err(e) = self.replay_subscriptions(&state, &active).await {
                warn!(error = %e, "Failed to restore subscriptions, dropping link");
                state.router.detach();
                if let Err(de) = self.backend_disconnect().await {
                    warn!(error = %de, "Failed to release backend link");
                }
                return Err(e);
            }
            resubscribed = active;
        }

        self.set_status(ConnectionState::Connected);
        info!("Connected");
        self.events.send(DeviceEvent::Connected {
            device: self.identity.id.clone(),
        });
        if !resubscribed.is_empty() {
            info!(components = ?resubscribed, "Restored subscriptions");
            self.events.send(DeviceEvent::Resubscribed {
                device: self.identity.id.clone(),
                components: resubscribed,
            });
        }
        drop(state);
        Ok(())
    }

    /// Disconnect from the device.
    ///
    /// Always ends `Disconnected`. Active subscriptions stay in the ledger so
    /// a later connect can restore them; the router is detached. A failure to
    /// release the backend link is reported after the transition.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity.id))]
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.status() == ConnectionState::Disconnected {
            debug!("Already disconnected");
            return Ok(());
        }

        state.router.detach();
        self.set_status(ConnectionState::Disconnected);
        info!("Disconnected");
        self.events.send(DeviceEvent::Disconnected {
            device: self.identity.id.clone(),
        });

        if let Err(e) = self.backend_disconnect().await {
            warn!(error = %e, "Failed to release backend link");
            self.emit_error(&e);
            return Err(e);
        }
        Ok(())
    }

    // --- Data ---

    /// Read one component.
    ///
    /// Device types with a priming policy enable the sensor, wait for it to
    /// settle, read, and disable it again unless an active subscription or
    /// another read still needs it. A disconnect during the wait fails the
    /// read with [`Error::NotConnected`].
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity.id))]
    pub async fn read(&self, component: &str) -> Result<RecordObject> {
        self.ensure_connected()?;
        let descriptor = self.descriptor(component)?;
        let raw = match self.profile.priming().settle() {
            Some(settle) => self.primed_read(descriptor, settle).await?,
            None => self.read_raw(descriptor).await?,
        };

        let value = descriptor
            .decode(&raw)
            .map_err(|e| Error::decode(descriptor.name(), e))?;
        let record = RecordObject::new(
            self.identity.id.as_str(),
            descriptor.name(),
            value,
            descriptor.unit(),
        );
        self.cache
            .write()
            .await
            .insert(record.component.clone(), record.clone());
        debug!(value = %record.value, "Read component");
        Ok(record)
    }

    /// Write to a component.
    ///
    /// Passthrough device types write the payload as-is. Power-controlled
    /// types accept `"on"`/`"off"` on their power component and change the
    /// connection state to `On`/`Off` without a backend call.
    #[tracing::instrument(level = "debug", skip(self, payload), fields(device = %self.identity.id, len = payload.len()))]
    pub async fn write(&self, component: &str, payload: &[u8]) -> Result<()> {
        match self.profile.write_mode() {
            WriteMode::Passthrough { selector } => {
                self.ensure_connected()?;
                self.descriptor(component)?;
                backend::call(
                    "write",
                    self.config.write_timeout,
                    self.backend.write(&self.identity.address, selector, payload),
                )
                .await
            }
            WriteMode::PowerToggle { component: power } => {
                self.ensure_linked()?;
                if !component.eq_ignore_ascii_case(power) {
                    return Err(Error::unsupported_component(
                        self.profile.type_name(),
                        component,
                    ));
                }
                self.set_power(parse_power(payload)?).await
            }
            WriteMode::Unsupported => {
                self.ensure_connected()?;
                Err(Error::unsupported_operation(
                    self.profile.type_name(),
                    "write",
                ))
            }
        }
    }

    /// Execute a named macro command. Names are matched ignoring ASCII case.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity.id))]
    pub async fn execute(&self, command: &str) -> Result<()> {
        self.ensure_linked()?;
        let action = &self
            .profile
            .command(command)
            .ok_or_else(|| Error::unsupported_command(self.profile.type_name(), command))?
            .action;

        match action {
            CommandAction::PowerOn => self.set_power(true).await,
            CommandAction::PowerOff => self.set_power(false).await,
            CommandAction::Write(payload) => {
                self.ensure_connected()?;
                backend::call(
                    "execute",
                    self.config.write_timeout,
                    self.backend.write(
                        &self.identity.address,
                        self.profile.command_selector(),
                        payload,
                    ),
                )
                .await
            }
        }
    }

    // --- Subscriptions ---

    /// Subscribe to live updates of a component.
    ///
    /// The first subscription overall attaches the router. The first
    /// subscription of a component enables its sensor and issues the backend
    /// subscribe, unless another active component already did.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity.id))]
    pub async fn subscribe(&self, component: &str) -> Result<()> {
        self.ensure_connected()?;
        let descriptor = self.descriptor(component)?;

        let mut state = self.state.lock().await;
        self.ensure_connected()?;

        if !state.ledger.has_active(component) {
            let attached = state.router.attach(&self.router_context());
            if let Err(e) = self.activate(&state, descriptor).await {
                if attached {
                    state.router.detach();
                }
                return Err(e);
            }
        }

        let count = state.ledger.increment(component);
        debug!(count, "Subscribed");
        Ok(())
    }

    /// Drop one subscription to a component.
    ///
    /// The last subscription of a component issues the backend unsubscribe
    /// and disables its sensor, unless another active component still needs
    /// them. The router is detached once nothing is active. Unsubscribing a
    /// component without subscriptions is logged and ignored.
    #[tracing::instrument(level = "debug", skip(self), fields(device = %self.identity.id))]
    pub async fn unsubscribe(&self, component: &str) -> Result<()> {
        self.ensure_connected()?;
        let descriptor = self.descriptor(component)?;

        let mut state = self.state.lock().await;
        self.ensure_connected()?;

        match state.ledger.count(component) {
            0 => {
                warn!("Unsubscribe without an active subscription, ignoring");
                return Ok(());
            }
            1 => self.deactivate(&state, descriptor).await?,
            _ => {}
        }

        let remaining = state.ledger.decrement(component);
        if !state.ledger.has_any_active() {
            state.router.detach();
        }
        debug!(count = ?remaining, "Unsubscribed");
        Ok(())
    }

    // --- Internals ---

    fn router_context(&self) -> RouterContext {
        RouterContext {
            device_id: self.identity.id.clone(),
            address: self.identity.address.clone(),
            profile: Arc::clone(&self.profile),
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
            cache: Arc::clone(&self.cache),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.status().is_connected() {
            Ok(())
        } else {
            Err(Error::not_connected(self.identity.id.as_str()))
        }
    }

    fn ensure_linked(&self) -> Result<()> {
        if self.status().is_linked() {
            Ok(())
        } else {
            Err(Error::not_connected(self.identity.id.as_str()))
        }
    }

    fn descriptor(&self, component: &str) -> Result<&ComponentDescriptor> {
        self.profile
            .catalog()
            .get(component)
            .ok_or_else(|| Error::unsupported_component(self.profile.type_name(), component))
    }

    fn set_status(&self, state: ConnectionState) {
        let previous = ConnectionState::from(self.status.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
            self.events.send(DeviceEvent::StateChanged {
                device: self.identity.id.clone(),
                state,
            });
        }
    }

    fn emit_error(&self, error: &Error) {
        self.events.send(DeviceEvent::Error {
            device: self.identity.id.clone(),
            error: error.to_string(),
        });
    }

    async fn set_power(&self, on: bool) -> Result<()> {
        let _state = self.state.lock().await;
        self.ensure_linked()?;
        let target = if on {
            ConnectionState::On
        } else {
            ConnectionState::Off
        };
        self.set_status(target);
        info!(state = %target, "Power switched");
        Ok(())
    }

    async fn backend_disconnect(&self) -> Result<()> {
        backend::call(
            "disconnect",
            self.config.connect_timeout,
            self.backend.disconnect(&self.identity.address),
        )
        .await
    }

    async fn enable_sensor(&self, descriptor: &ComponentDescriptor) -> Result<()> {
        let address = self.identity.address.as_str();
        if let Some(enable) = descriptor.enable_write() {
            backend::call(
                "enable",
                self.config.write_timeout,
                self.backend.write(address, &enable.selector, &enable.payload),
            )
            .await?;
        }
        if let Some(frequency) = descriptor.frequency_write() {
            backend::call(
                "frequency",
                self.config.write_timeout,
                self.backend
                    .write(address, &frequency.selector, &frequency.payload),
            )
            .await?;
        }
        Ok(())
    }

    /// Write the disable payload. Returns `false` if the component has none.
    async fn disable_sensor(&self, descriptor: &ComponentDescriptor) -> Result<bool> {
        let Some(disable) = descriptor.disable_write() else {
            return Ok(false);
        };
        backend::call(
            "disable",
            self.config.write_timeout,
            self.backend
                .write(&self.identity.address, &disable.selector, &disable.payload),
        )
        .await?;
        Ok(true)
    }

    async fn read_raw(&self, descriptor: &ComponentDescriptor) -> Result<Bytes> {
        backend::call(
            "read",
            self.config.read_timeout,
            self.backend
                .read(&self.identity.address, descriptor.read_selector()),
        )
        .await
    }

    /// Enable, settle, read, then disable unless the sensor is still needed.
    ///
    /// The enable and disable steps run under the session lock; the read is
    /// registered in `SessionState::primed` in between so an unsubscribe
    /// during the wait leaves the sensor on.
    async fn primed_read(&self, descriptor: &ComponentDescriptor, settle: Duration) -> Result<Bytes> {
        let Some(enable) = descriptor.enable_write() else {
            return self.read_raw(descriptor).await;
        };

        {
            let mut state = self.state.lock().await;
            self.ensure_connected()?;
            backend::call(
                "enable",
                self.config.write_timeout,
                self.backend
                    .write(&self.identity.address, &enable.selector, &enable.payload),
            )
            .await?;
            state.primed.begin(&enable.selector);
        }

        debug!(component = %descriptor.name(), ?settle, "Sensor enabled, waiting to settle");
        sleep(settle).await;

        let result = match self.ensure_connected() {
            Ok(()) => self.read_raw(descriptor).await,
            Err(e) => {
                debug!(component = %descriptor.name(), "Disconnected while settling");
                Err(e)
            }
        };

        let mut state = self.state.lock().await;
        state.primed.finish(&enable.selector);
        if !self.status().is_linked() {
            debug!(component = %descriptor.name(), "Link released, skipping sensor disable");
        } else if state.primed.holds(descriptor)
            || sensor_still_needed(&state.ledger, self.profile.catalog(), descriptor)
        {
            debug!(component = %descriptor.name(), "Sensor left on, still in use");
        } else {
            match self.disable_sensor(descriptor).await {
                Ok(_) => debug!(component = %descriptor.name(), "Sensor disabled after read"),
                Err(e) => {
                    warn!(component = %descriptor.name(), error = %e, "Failed to disable sensor after read")
                }
            }
        }
        drop(state);

        result
    }

    /// Enable and subscribe a component that has no active subscription.
    async fn activate(&self, state: &SessionState, descriptor: &ComponentDescriptor) -> Result<()> {
        let catalog = self.profile.catalog();
        let active: Vec<&ComponentDescriptor> = state
            .ledger
            .active()
            .filter_map(|name| catalog.get(name))
            .collect();
        let sensor_on = active.iter().any(|d| d.shares_enable_with(descriptor));
        let subscribed = active.iter().any(|d| d.shares_subscription_with(descriptor));

        if !sensor_on && let Err(e) = self.enable_sensor(descriptor).await {
            self.rollback_enable(state, descriptor).await;
            return Err(e);
        }

        if !subscribed
            && let Err(e) = backend::call(
                "subscribe",
                self.config.subscribe_timeout,
                self.backend
                    .subscribe(&self.identity.address, descriptor.subscribe_selector()),
            )
            .await
        {
            if !sensor_on {
                self.rollback_enable(state, descriptor).await;
            }
            return Err(e);
        }

        Ok(())
    }

    /// Best-effort disable after a failed activation. A sensor held on by a
    /// primed read is left alone.
    async fn rollback_enable(&self, state: &SessionState, descriptor: &ComponentDescriptor) {
        if state.primed.holds(descriptor) {
            return;
        }
        if let Err(e) = self.disable_sensor(descriptor).await {
            warn!(component = %descriptor.name(), error = %e, "Failed to roll back sensor enable");
        }
    }

    /// Unsubscribe and disable the last subscription of a component.
    ///
    /// A primed read in progress keeps the sensor on; the read disables it
    /// when it finishes.
    async fn deactivate(&self, state: &SessionState, descriptor: &ComponentDescriptor) -> Result<()> {
        let catalog = self.profile.catalog();
        let others: Vec<&ComponentDescriptor> = state
            .ledger
            .active()
            .filter(|name| *name != descriptor.name())
            .filter_map(|name| catalog.get(name))
            .collect();

        if !others.iter().any(|d| d.shares_subscription_with(descriptor)) {
            backend::call(
                "unsubscribe",
                self.config.subscribe_timeout,
                self.backend
                    .unsubscribe(&self.identity.address, descriptor.subscribe_selector()),
            )
            .await?;
        }

        if state.primed.holds(descriptor) {
            debug!(component = %descriptor.name(), "Primed read in progress, leaving sensor on");
        } else if !others.iter().any(|d| d.shares_enable_with(descriptor))
            && let Err(e) = self.disable_sensor(descriptor).await
        {
            warn!(component = %descriptor.name(), error = %e, "Failed to disable sensor");
            self.emit_error(&e);
        }

        Ok(())
    }

    /// Replay enable and subscribe for `active`, once per shared sensor and selector.
    ///
    /// On failure every sensor enabled by the replay is disabled again.
    async fn replay_subscriptions(&self, state: &SessionState, active: &[String]) -> Result<()> {
        let catalog = self.profile.catalog();
        let mut enabled: Vec<&ComponentDescriptor> = Vec::new();
        let mut subscribed: Vec<&ComponentDescriptor> = Vec::new();

        let replayed: Result<()> = async {
            for name in active {
                let Some(descriptor) = catalog.get(name) else {
                    continue;
                };
                if !enabled.iter().any(|d| d.shares_enable_with(descriptor)) {
                    enabled.push(descriptor);
                    self.enable_sensor(descriptor).await?;
                }
                if !subscribed
                    .iter()
                    .any(|d| d.shares_subscription_with(descriptor))
                {
                    backend::call(
                        "subscribe",
                        self.config.subscribe_timeout,
                        self.backend
                            .subscribe(&self.identity.address, descriptor.subscribe_selector()),
                    )
                    .await?;
                    subscribed.push(descriptor);
                }
            }
            Ok::<(), Error>(())
        }
        .await;

        if replayed.is_err() {
            for descriptor in enabled {
                self.rollback_enable(state, descriptor).await;
            }
        }
        replayed
    }
}

fn check_protocol(expected: ProtocolKind, actual: ProtocolKind) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::UnsupportedProtocol { expected, actual })
    }
}

fn parse_power(payload: &[u8]) -> Result<bool> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::InvalidPayload("power payload is not UTF-8".to_string()))?;
    match text.trim() {
        s if s.eq_ignore_ascii_case("on") => Ok(true),
        s if s.eq_ignore_ascii_case("off") => Ok(false),
        other => Err(Error::InvalidPayload(format!(
            "expected \"on\" or \"off\", got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{dummy, lora, sensortag, switch};
    use crate::mock::{BackendOp, MockBackend};
    use devgate_types::{DeviceOverview, Selector, Value};

    fn session_for(
        profile: DeviceProfile,
        address: &str,
        name: &str,
    ) -> (DeviceSession, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new(profile.protocol()));
        let overview = DeviceOverview::new(address, name, profile.protocol());
        let identity = DeviceIdentity::from_overview(&overview, profile.type_name());
        let session = DeviceSession::new(
            identity,
            Arc::new(profile),
            backend.clone(),
            SessionConfig::default(),
        )
        .unwrap();
        (session, backend)
    }

    #[test]
    fn test_parse_power() {
        assert!(parse_power(b"on").unwrap());
        assert!(parse_power(b" OFF ").map(|on| !on).unwrap());
        assert!(matches!(parse_power(b"toggle"), Err(Error::InvalidPayload(_))));
        assert!(matches!(parse_power(&[0xff]), Err(Error::InvalidPayload(_))));
    }

    #[test]
    fn test_new_rejects_protocol_mismatch() {
        let profile = Arc::new(lora::profile().unwrap());
        let backend = Arc::new(MockBackend::new(ProtocolKind::Ble));
        let overview = DeviceOverview::new("n1", "LoRa node", ProtocolKind::Lora);
        let identity = DeviceIdentity::from_overview(&overview, "LoRa");

        let err = DeviceSession::new(identity, profile, backend, SessionConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedProtocol {
                expected: ProtocolKind::Lora,
                actual: ProtocolKind::Ble
            }
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let backend = Arc::new(MockBackend::new(ProtocolKind::Dummy));
        let overview = DeviceOverview::new("d1", "Dummy", ProtocolKind::Dummy);
        let identity = DeviceIdentity::from_overview(&overview, "Dummy");
        let result = DeviceSession::new(
            identity,
            Arc::new(dummy::profile().unwrap()),
            backend,
            SessionConfig::default().event_capacity(0),
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (session, _) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        assert_eq!(session.status(), ConnectionState::Disconnected);
        assert_eq!(session.device_type(), "Dummy");
        assert_eq!(session.commands(), ["Dummy Command 1", "Dummy Command 2"]);
        assert_eq!(session.components().len(), 1);
        assert!(!session.is_router_attached().await);
        assert!(session.last_values().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        let mut events = session.events();

        session.connect().await.unwrap();
        session.connect().await.unwrap();
        assert_eq!(session.status(), ConnectionState::Connected);
        assert_eq!(backend.count(BackendOp::Connect).await, 1);

        assert!(matches!(
            events.recv().await.unwrap(),
            DeviceEvent::StateChanged {
                state: ConnectionState::Connected,
                ..
            }
        ));
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Connected { .. }));
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        backend.set_should_fail(true, Some("no route")).await;

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, Error::Backend { ref operation, .. } if operation == "connect"));
        assert_eq!(session.status(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_transient_failures() {
        let backend = Arc::new(MockBackend::new(ProtocolKind::Dummy));
        backend.set_transient_failures(2);
        let overview = DeviceOverview::new("d1", "Dummy Device", ProtocolKind::Dummy);
        let session = DeviceSession::new(
            DeviceIdentity::from_overview(&overview, "Dummy"),
            Arc::new(dummy::profile().unwrap()),
            backend.clone(),
            SessionConfig::default().connect_retry(crate::retry::RetryConfig::quick()),
        )
        .unwrap();

        session.connect().await.unwrap();
        assert_eq!(backend.count(BackendOp::Connect).await, 3);
        assert_eq!(session.status(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_keeps_ledger() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        session.disconnect().await.unwrap();
        assert_eq!(backend.count(BackendOp::Disconnect).await, 0);

        session.connect().await.unwrap();
        session.subscribe(dummy::COMPONENT).await.unwrap();
        session.disconnect().await.unwrap();

        assert_eq!(session.status(), ConnectionState::Disconnected);
        assert_eq!(session.subscription_count(dummy::COMPONENT).await, 1);
        assert!(!session.is_router_attached().await);
        assert_eq!(backend.count(BackendOp::Disconnect).await, 1);

        // Reconnecting re-attaches the router for the kept subscription.
        session.connect().await.unwrap();
        assert!(session.is_router_attached().await);
    }

    #[tokio::test]
    async fn test_disconnect_failure_still_transitions() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        session.connect().await.unwrap();
        backend.set_should_fail(true, None).await;

        assert!(session.disconnect().await.is_err());
        assert_eq!(session.status(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_read_decodes_and_caches() {
        let (session, backend) = session_for(lora::profile().unwrap(), "node7", "LoRa node 7");
        backend.set_default_read(vec![42u8]).await;
        session.connect().await.unwrap();

        let record = session.read(lora::COMPONENT).await.unwrap();
        assert_eq!(record.value, Value::Integer(42));
        assert_eq!(record.unit, "lora");
        assert_eq!(record.device_id, "loranode7");
        assert_eq!(
            session.last_value(lora::COMPONENT).await.map(|r| r.value),
            Some(Value::Integer(42))
        );
    }

    #[tokio::test]
    async fn test_read_decode_failure() {
        let (session, _) = session_for(lora::profile().unwrap(), "node7", "LoRa node 7");
        session.connect().await.unwrap();

        let err = session.read(lora::COMPONENT).await.unwrap_err();
        assert!(matches!(err, Error::Decode { ref component, .. } if component == "LoraData"));
    }

    #[tokio::test]
    async fn test_gating_order() {
        let (session, _) = session_for(lora::profile().unwrap(), "node7", "LoRa node 7");
        assert!(matches!(
            session.read("Nope").await,
            Err(Error::NotConnected { .. })
        ));
        session.connect().await.unwrap();
        assert!(matches!(
            session.read("Nope").await,
            Err(Error::UnsupportedComponent { .. })
        ));
        assert!(matches!(
            session.write(lora::COMPONENT, b"x").await,
            Err(Error::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            session.execute("Reboot").await,
            Err(Error::UnsupportedCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_dummy_write_and_commands() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        session.connect().await.unwrap();

        session.write(dummy::COMPONENT, b"ping").await.unwrap();
        session.execute("dummy command 2").await.unwrap();

        let writes = backend.calls_of(BackendOp::Write).await;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].selector, Some(dummy::write_selector()));
        assert_eq!(writes[0].payload.as_deref(), Some(&b"ping"[..]));
        assert_eq!(writes[1].payload.as_deref(), Some(&[0x02u8][..]));
    }

    #[tokio::test]
    async fn test_switch_power() {
        let (session, backend) = session_for(switch::profile().unwrap(), "sw1", "Smart Switch");
        assert!(matches!(
            session.execute("On").await,
            Err(Error::NotConnected { .. })
        ));

        session.connect().await.unwrap();
        session.write(switch::POWER, b"on").await.unwrap();
        assert_eq!(session.status(), ConnectionState::On);

        session.execute("off").await.unwrap();
        assert_eq!(session.status(), ConnectionState::Off);

        // Off is still linked: power can come back on, data operations are gated.
        session.execute("ON").await.unwrap();
        assert_eq!(session.status(), ConnectionState::On);
        session.execute("Off").await.unwrap();
        assert!(matches!(
            session.subscribe("Power").await,
            Err(Error::NotConnected { .. })
        ));

        assert!(matches!(
            session.write("Brightness", b"on").await,
            Err(Error::UnsupportedComponent { .. })
        ));
        assert!(matches!(
            session.write("power", b"dim").await,
            Err(Error::InvalidPayload(_))
        ));

        session.disconnect().await.unwrap();
        assert_eq!(session.status(), ConnectionState::Disconnected);
        // No data calls reached the backend.
        assert_eq!(backend.count(BackendOp::Write).await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_attaches_router_once() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        session.connect().await.unwrap();

        session.subscribe(dummy::COMPONENT).await.unwrap();
        session.subscribe(dummy::COMPONENT).await.unwrap();
        assert_eq!(session.subscription_count(dummy::COMPONENT).await, 2);
        assert_eq!(backend.count(BackendOp::Subscribe).await, 1);
        assert_eq!(backend.listener_count(), 1);
        assert_eq!(session.active_components().await, [dummy::COMPONENT]);
    }

    #[tokio::test]
    async fn test_subscribe_failure_leaves_ledger() {
        let (session, backend) = session_for(dummy::profile().unwrap(), "d1", "Dummy Device");
        session.connect().await.unwrap();
        backend.set_fail_on(Some(BackendOp::Subscribe)).await;
        backend.set_should_fail(true, None).await;

        assert!(session.subscribe(dummy::COMPONENT).await.is_err());
        assert_eq!(session.subscription_count(dummy::COMPONENT).await, 0);
        assert!(!session.is_router_attached().await);
    }

    #[tokio::test]
    async fn test_sensortag_subscribe_enables_sensor() {
        let (session, backend) =
            session_for(sensortag::profile().unwrap(), "B0:B4", "CC2650 SensorTag");
        session.connect().await.unwrap();

        session.subscribe(sensortag::TEMPERATURE).await.unwrap();
        session.subscribe(sensortag::HUMIDITY).await.unwrap();

        let ops: Vec<_> = backend.calls().await.iter().map(|c| c.op).collect();
        // Humidity shares the sensor and data characteristic with temperature.
        assert_eq!(
            ops,
            [
                BackendOp::Connect,
                BackendOp::Write,
                BackendOp::Write,
                BackendOp::Subscribe
            ]
        );

        session.unsubscribe(sensortag::TEMPERATURE).await.unwrap();
        assert_eq!(backend.count(BackendOp::Unsubscribe).await, 0);

        session.unsubscribe(sensortag::HUMIDITY).await.unwrap();
        assert_eq!(backend.count(BackendOp::Unsubscribe).await, 1);
        let last = backend.calls().await.pop().unwrap();
        assert_eq!(last.op, BackendOp::Write);
        assert_eq!(last.payload.as_deref(), Some(&[sensortag::SENSOR_OFF][..]));
        assert!(!session.is_router_attached().await);
    }

    #[tokio::test]
    async fn test_unsubscribe_disable_failure_is_not_fatal() {
        let (session, backend) =
            session_for(sensortag::profile().unwrap(), "B0:B4", "CC2650 SensorTag");
        session.connect().await.unwrap();
        session.subscribe(sensortag::PRESSURE).await.unwrap();

        backend.set_fail_on(Some(BackendOp::Write)).await;
        backend.set_should_fail(true, None).await;
        let mut events = session.events();

        session.unsubscribe(sensortag::PRESSURE).await.unwrap();
        assert_eq!(session.subscription_count(sensortag::PRESSURE).await, 0);
        assert!(matches!(events.recv().await.unwrap(), DeviceEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_resubscribe_on_connect() {
        let (session, backend) =
            session_for(sensortag::profile().unwrap(), "B0:B4", "CC2650 SensorTag");
        session.connect().await.unwrap();
        session.subscribe(sensortag::PRESSURE).await.unwrap();
        session.subscribe(sensortag::TEMPERATURE).await.unwrap();
        session.subscribe(sensortag::HUMIDITY).await.unwrap();
        session.disconnect().await.unwrap();
        backend.clear_calls().await;

        let mut events = session.events();
        session.connect().await.unwrap();

        let calls = backend.calls().await;
        let replay: Vec<_> = calls
            .iter()
            .map(|c| (c.op, c.selector.clone()))
            .collect();
        let baro = |c| Selector::gatt(devgate_types::uuids::SENSORTAG_BAROMETER_SERVICE, c);
        let humi = |c| Selector::gatt(devgate_types::uuids::SENSORTAG_HUMIDITY_SERVICE, c);
        use devgate_types::uuids::*;
        assert_eq!(
            replay,
            [
                (BackendOp::Connect, None),
                (BackendOp::Write, Some(baro(SENSORTAG_BAROMETER_CONFIG))),
                (BackendOp::Write, Some(baro(SENSORTAG_BAROMETER_PERIOD))),
                (BackendOp::Subscribe, Some(baro(SENSORTAG_BAROMETER_DATA))),
                (BackendOp::Write, Some(humi(SENSORTAG_HUMIDITY_CONFIG))),
                (BackendOp::Write, Some(humi(SENSORTAG_HUMIDITY_PERIOD))),
                (BackendOp::Subscribe, Some(humi(SENSORTAG_HUMIDITY_DATA))),
            ]
        );

        let mut resubscribed = None;
        while let Ok(event) = events.try_recv() {
            if let DeviceEvent::Resubscribed { components, .. } = event {
                resubscribed = Some(components);
            }
        }
        assert_eq!(
            resubscribed.unwrap(),
            ["Pressure", "Temperature", "Humidity"]
        );
    }

    #[tokio::test]
    async fn test_resubscribe_failure_aborts_connect() {
        let (session, backend) =
            session_for(sensortag::profile().unwrap(), "B0:B4", "CC2650 SensorTag");
        session.connect().await.unwrap();
        session.subscribe(sensortag::PRESSURE).await.unwrap();
        session.disconnect().await.unwrap();

        backend.set_fail_on(Some(BackendOp::Subscribe)).await;
        backend.set_should_fail(true, None).await;

        assert!(session.connect().await.is_err());
        assert_eq!(session.status(), ConnectionState::Disconnected);
        assert!(!session.is_router_attached().await);
        assert_eq!(session.subscription_count(sensortag::PRESSURE).await, 1);
    }

    #[tokio::test]
    async fn test_resubscribe_failure_disables_replayed_sensors() {
        let (session, backend) =
            session_for(sensortag::profile().unwrap(), "B0:B4", "CC2650 SensorTag");
        session.connect().await.unwrap();
        session.subscribe(sensortag::PRESSURE).await.unwrap();
        session.subscribe(sensortag::HUMIDITY).await.unwrap();
        session.disconnect().await.unwrap();
        backend.clear_calls().await;

        backend.set_fail_on(Some(BackendOp::Subscribe)).await;
        backend.set_should_fail(true, None).await;
        assert!(session.connect().await.is_err());

        use devgate_types::uuids::*;
        let baro = |c| Selector::gatt(SENSORTAG_BAROMETER_SERVICE, c);
        let calls: Vec<_> = backend
            .calls()
            .await
            .into_iter()
            .map(|c| (c.op, c.selector, c.payload.map(|p| p.to_vec())))
            .collect();
        assert_eq!(
            calls,
            [
                (BackendOp::Connect, None, None),
                (
                    BackendOp::Write,
                    Some(baro(SENSORTAG_BAROMETER_CONFIG)),
                    Some(vec![sensortag::SENSOR_ON])
                ),
                (
                    BackendOp::Write,
                    Some(baro(SENSORTAG_BAROMETER_PERIOD)),
                    Some(vec![sensortag::DEFAULT_PERIOD])
                ),
                (BackendOp::Subscribe, Some(baro(SENSORTAG_BAROMETER_DATA)), None),
                (
                    BackendOp::Write,
                    Some(baro(SENSORTAG_BAROMETER_CONFIG)),
                    Some(vec![sensortag::SENSOR_OFF])
                ),
                (BackendOp::Disconnect, None, None),
            ]
        );
        assert_eq!(session.subscription_count(sensortag::HUMIDITY).await, 1);
    }
}
