//! Power-only switch.
//!
//! A switch exposes no data components. Writing `"on"`/`"off"` to the `Power`
//! pseudo-component, or executing the `On`/`Off` commands, moves the session
//! between the `On` and `Off` states without touching the backend.

use devgate_types::{DeviceOverview, ProtocolKind};

use super::{CommandAction, DeviceProfile, WriteMode};
use crate::catalog::ComponentCatalog;
use crate::error::Result;

/// Device type name.
pub const TYPE_NAME: &str = "Switch";

/// Power pseudo-component accepted by `write`.
pub const POWER: &str = "Power";

fn matches(overview: &DeviceOverview) -> bool {
    overview.name.contains("Switch")
}

/// Build the Switch profile.
pub fn profile() -> Result<DeviceProfile> {
    Ok(
        DeviceProfile::builder(TYPE_NAME, ProtocolKind::Dummy, ComponentCatalog::default())
            .write_mode(WriteMode::PowerToggle {
                component: POWER.to_string(),
            })
            .command("On", CommandAction::PowerOn)
            .command("Off", CommandAction::PowerOff)
            .matcher(matches)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile() {
        let profile = profile().unwrap();
        assert!(profile.catalog().is_empty());
        assert!(profile.is_power_controlled());
        assert_eq!(
            profile.write_mode(),
            &WriteMode::PowerToggle {
                component: "Power".to_string()
            }
        );
        assert!(profile.matches(&DeviceOverview::new("sw-1", "Smart Switch", ProtocolKind::Dummy)));
        assert!(!profile.matches(&DeviceOverview::new("sw-1", "Dimmer", ProtocolKind::Dummy)));
    }
}
