//! Device types.
//!
//! A device type is data plus strategy: a [`ComponentCatalog`], a
//! [`PrimingPolicy`], a [`WriteMode`], a command table, two behavior flags and
//! a discovery matcher, bundled in a [`DeviceProfile`]. Profiles are built
//! once at registration and shared by every session of that type.
//!
//! | Type | Protocol | Components |
//! |------|----------|------------|
//! | [`dummy`] | dummy | DummyData |
//! | [`lora`] | lora | LoraData |
//! | [`humitemp`] | ble | Temperature, Humidity |
//! | [`sensortag`] | ble | Temperature, Humidity, Pressure |
//! | [`switch`] | dummy | (power only) |

pub mod dummy;
pub mod humitemp;
pub mod lora;
pub mod sensortag;
pub mod switch;

use bytes::Bytes;

use devgate_types::{DeviceOverview, ProtocolKind, Selector};

use crate::catalog::ComponentCatalog;
use crate::priming::PrimingPolicy;

/// Discovery predicate deciding whether a device type handles a device.
pub type Matcher = fn(&DeviceOverview) -> bool;

/// How `write` behaves for a device type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Writes are rejected with `UnsupportedOperation`.
    #[default]
    Unsupported,
    /// The payload bytes are written as-is to `selector`.
    Passthrough {
        /// Selector receiving the payload.
        selector: Selector,
    },
    /// Writing `"on"`/`"off"` to `component` toggles the power state.
    PowerToggle {
        /// Name of the power pseudo-component.
        component: String,
    },
}

/// What a named command does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Write the bytes to the profile's command selector.
    Write(Bytes),
    /// Switch the device on.
    PowerOn,
    /// Switch the device off.
    PowerOff,
}

/// A named macro command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command name as listed by `commands()`.
    pub name: String,
    /// Effect of the command.
    pub action: CommandAction,
}

/// Everything a session needs to know about a device type.
#[derive(Clone)]
pub struct DeviceProfile {
    type_name: String,
    protocol: ProtocolKind,
    catalog: ComponentCatalog,
    priming: PrimingPolicy,
    write_mode: WriteMode,
    commands: Vec<Command>,
    command_selector: Selector,
    filter_zero_readings: bool,
    resubscribe_on_connect: bool,
    matcher: Matcher,
}

impl std::fmt::Debug for DeviceProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProfile")
            .field("type_name", &self.type_name)
            .field("protocol", &self.protocol)
            .field("components", &self.catalog.len())
            .field("priming", &self.priming)
            .field("write_mode", &self.write_mode)
            .field("commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

impl DeviceProfile {
    /// Create a profile builder.
    pub fn builder(
        type_name: impl Into<String>,
        protocol: ProtocolKind,
        catalog: ComponentCatalog,
    ) -> DeviceProfileBuilder {
        DeviceProfileBuilder {
            profile: DeviceProfile {
                type_name: type_name.into(),
                protocol,
                catalog,
                priming: PrimingPolicy::Direct,
                write_mode: WriteMode::Unsupported,
                commands: Vec::new(),
                command_selector: Selector::new(),
                filter_zero_readings: false,
                resubscribe_on_connect: false,
                matcher: |_| false,
            },
        }
    }

    /// Device type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Protocol the device type requires.
    pub fn protocol(&self) -> ProtocolKind {
        self.protocol
    }

    /// Component catalog.
    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Read priming policy.
    pub fn priming(&self) -> PrimingPolicy {
        self.priming
    }

    /// Write behavior.
    pub fn write_mode(&self) -> &WriteMode {
        &self.write_mode
    }

    /// Command table.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Look up a command by name, ignoring ASCII case.
    pub fn command(&self, name: &str) -> Option<&Command> {
        self.commands
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Selector that `CommandAction::Write` payloads are written to.
    pub fn command_selector(&self) -> &Selector {
        &self.command_selector
    }

    /// Whether exact-zero readings from notifications are dropped.
    pub fn filter_zero_readings(&self) -> bool {
        self.filter_zero_readings
    }

    /// Whether `connect` replays subscriptions for active components.
    pub fn resubscribe_on_connect(&self) -> bool {
        self.resubscribe_on_connect
    }

    /// Whether the device type has a power state.
    pub fn is_power_controlled(&self) -> bool {
        matches!(self.write_mode, WriteMode::PowerToggle { .. })
            || self
                .commands
                .iter()
                .any(|c| matches!(c.action, CommandAction::PowerOn | CommandAction::PowerOff))
    }

    /// Whether this device type handles the discovered device.
    pub fn matches(&self, overview: &DeviceOverview) -> bool {
        (self.matcher)(overview)
    }
}

/// Builder for [`DeviceProfile`].
#[derive(Debug)]
pub struct DeviceProfileBuilder {
    profile: DeviceProfile,
}

impl DeviceProfileBuilder {
    /// Set the priming policy.
    #[must_use]
    pub fn priming(mut self, priming: PrimingPolicy) -> Self {
        self.profile.priming = priming;
        self
    }

    /// Set the write mode.
    #[must_use]
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.profile.write_mode = mode;
        self
    }

    /// Add a command.
    #[must_use]
    pub fn command(mut self, name: impl Into<String>, action: CommandAction) -> Self {
        self.profile.commands.push(Command {
            name: name.into(),
            action,
        });
        self
    }

    /// Set the selector command payloads are written to.
    #[must_use]
    pub fn command_selector(mut self, selector: Selector) -> Self {
        self.profile.command_selector = selector;
        self
    }

    /// Drop exact-zero readings from notifications.
    #[must_use]
    pub fn filter_zero_readings(mut self, enabled: bool) -> Self {
        self.profile.filter_zero_readings = enabled;
        self
    }

    /// Replay active subscriptions on connect.
    #[must_use]
    pub fn resubscribe_on_connect(mut self, enabled: bool) -> Self {
        self.profile.resubscribe_on_connect = enabled;
        self
    }

    /// Set the discovery matcher.
    #[must_use]
    pub fn matcher(mut self, matcher: Matcher) -> Self {
        self.profile.matcher = matcher;
        self
    }

    /// Build the profile.
    #[must_use]
    pub fn build(self) -> DeviceProfile {
        self.profile
    }
}

/// All bundled device profiles, in matching order.
pub fn bundled() -> crate::error::Result<Vec<DeviceProfile>> {
    Ok(vec![
        dummy::profile()?,
        lora::profile()?,
        humitemp::profile()?,
        sensortag::profile()?,
        switch::profile()?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_profiles_have_unique_names() {
        let profiles = bundled().unwrap();
        let mut names: Vec<_> = profiles.iter().map(|p| p.type_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), profiles.len());
    }

    #[test]
    fn test_bundled_matchers_are_disjoint() {
        let profiles = bundled().unwrap();
        let names = [
            ("Dummy Device", ProtocolKind::Dummy),
            ("LoRa node 7", ProtocolKind::Lora),
            ("HumiTemp Sensor Tag", ProtocolKind::Ble),
            ("CC2650 SensorTag", ProtocolKind::Ble),
            ("Smart Switch", ProtocolKind::Dummy),
        ];
        for (name, protocol) in names {
            let overview = DeviceOverview::new("addr", name, protocol);
            let matching = profiles.iter().filter(|p| p.matches(&overview)).count();
            assert_eq!(matching, 1, "{} should match exactly one type", name);
        }
    }

    #[test]
    fn test_command_lookup_ignores_case() {
        let profile = switch::profile().unwrap();
        assert_eq!(profile.command("on").map(|c| &c.action), Some(&CommandAction::PowerOn));
        assert_eq!(profile.command("OFF").map(|c| &c.action), Some(&CommandAction::PowerOff));
        assert!(profile.command("Toggle").is_none());
        assert!(profile.is_power_controlled());
    }
}
