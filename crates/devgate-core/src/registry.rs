//! Device type registry.
//!
//! The [`DeviceRegistry`] holds the device profiles a gateway knows about.
//! Profiles are built once at registration and shared by every session of
//! their type; discovery metadata is matched against them in registration
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use devgate_types::{DeviceIdentity, DeviceOverview, ProtocolKind};

use crate::backend::SharedBackend;
use crate::config::{DeviceEntry, GatewayConfig, SessionConfig};
use crate::devices::{self, DeviceProfile};
use crate::error::{Error, Result};
use crate::session::DeviceSession;

/// Registered device types.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    profiles: Vec<Arc<DeviceProfile>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every bundled device type.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for profile in devices::bundled()? {
            registry.register(profile)?;
        }
        Ok(registry)
    }

    /// Register a device type.
    ///
    /// Type names are unique; registering a second profile with the same
    /// name fails with [`Error::InvalidConfig`].
    pub fn register(&mut self, profile: DeviceProfile) -> Result<()> {
        if self.get(profile.type_name()).is_some() {
            return Err(Error::invalid_config(format!(
                "device type '{}' is already registered",
                profile.type_name()
            )));
        }
        debug!(
            device_type = %profile.type_name(),
            protocol = %profile.protocol(),
            components = profile.catalog().len(),
            "Registered device type"
        );
        self.profiles.push(Arc::new(profile));
        Ok(())
    }

    /// Look up a device type by name.
    pub fn get(&self, type_name: &str) -> Option<Arc<DeviceProfile>> {
        self.profiles
            .iter()
            .find(|p| p.type_name() == type_name)
            .cloned()
    }

    /// First device type whose matcher accepts `overview`.
    pub fn find(&self, overview: &DeviceOverview) -> Option<Arc<DeviceProfile>> {
        self.profiles.iter().find(|p| p.matches(overview)).cloned()
    }

    /// Registered type names in registration order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.type_name())
    }

    /// Number of registered device types.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no device type is registered.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Create a session for a discovered device.
    ///
    /// Fails with [`Error::InvalidConfig`] when no device type matches and
    /// with [`Error::UnsupportedProtocol`] when the matching type speaks a
    /// different protocol than the device or the backend.
    pub fn create_session(
        &self,
        overview: &DeviceOverview,
        backend: SharedBackend,
        config: SessionConfig,
    ) -> Result<DeviceSession> {
        let profile = self.find(overview).ok_or_else(|| {
            Error::invalid_config(format!(
                "no device type matches '{}' ({})",
                overview.name, overview.address
            ))
        })?;
        Self::session_for(profile, overview, backend, config)
    }

    /// Create one session per device in a gateway configuration.
    ///
    /// Entries with an explicit `device_type` use it; the others are matched
    /// by name. `backends` supplies the backend for each protocol. Every
    /// component listed under `subscribe` must exist in the chosen type.
    pub fn create_sessions(
        &self,
        config: &GatewayConfig,
        backends: &HashMap<ProtocolKind, SharedBackend>,
    ) -> Result<Vec<ConfiguredSession>> {
        let session_config = config.to_session_config();
        let mut sessions = Vec::with_capacity(config.devices.len());

        for entry in &config.devices {
            let overview = entry.overview();
            let profile = self.profile_for(entry, &overview)?;

            if let Some(unknown) = entry
                .subscribe
                .iter()
                .find(|c| !profile.catalog().contains(c))
            {
                return Err(Error::unsupported_component(profile.type_name(), unknown.as_str()));
            }

            let backend = backends
                .get(&entry.protocol)
                .cloned()
                .ok_or_else(|| {
                    Error::invalid_config(format!(
                        "no backend configured for protocol {}",
                        entry.protocol
                    ))
                })?;

            let session = Self::session_for(profile, &overview, backend, session_config.clone())?;
            sessions.push(ConfiguredSession {
                session,
                subscribe: entry.subscribe.clone(),
            });
        }

        info!(devices = sessions.len(), "Created sessions from configuration");
        Ok(sessions)
    }

    fn profile_for(
        &self,
        entry: &DeviceEntry,
        overview: &DeviceOverview,
    ) -> Result<Arc<DeviceProfile>> {
        match &entry.device_type {
            Some(type_name) => self.get(type_name).ok_or_else(|| {
                Error::invalid_config(format!("unknown device type '{}'", type_name))
            }),
            None => self.find(overview).ok_or_else(|| {
                Error::invalid_config(format!(
                    "no device type matches '{}' ({})",
                    overview.name, overview.address
                ))
            }),
        }
    }

    fn session_for(
        profile: Arc<DeviceProfile>,
        overview: &DeviceOverview,
        backend: SharedBackend,
        config: SessionConfig,
    ) -> Result<DeviceSession> {
        let identity = DeviceIdentity::from_overview(overview, profile.type_name());
        DeviceSession::new(identity, profile, backend, config)
    }
}

/// A session created from a configuration entry, with the components the
/// entry asks to subscribe to.
#[derive(Debug)]
pub struct ConfiguredSession {
    /// The device session.
    pub session: DeviceSession,
    /// Components to subscribe to once connected.
    pub subscribe: Vec<String>,
}

impl ConfiguredSession {
    /// Connect and subscribe to the configured components.
    pub async fn start(&self) -> Result<()> {
        self.session.connect().await?;
        for component in &self.subscribe {
            self.session.subscribe(component).await?;
        }
        Ok(())
    }
}
