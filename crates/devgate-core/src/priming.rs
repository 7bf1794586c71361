//! Sensor priming for power-controlled sensors.
//!
//! Some BLE sensors (the TI SensorTag family) are off until a configuration
//! characteristic is written. Reading one means switching it on, waiting for
//! a measurement to settle, reading, and switching it back off unless a live
//! subscription still needs it.

use std::time::Duration;

use devgate_types::Selector;

use crate::catalog::{ComponentCatalog, ComponentDescriptor};
use crate::ledger::SubscriptionLedger;

/// Default settling interval between enabling a sensor and reading it.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// How a device type reads its components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimingPolicy {
    /// Read the selector directly.
    #[default]
    Direct,
    /// Enable the sensor, wait `settle`, read, then disable unless still needed.
    ///
    /// Components without an enable write are read directly.
    EnableThenRead {
        /// Time to wait after enabling before reading.
        settle: Duration,
    },
}

impl PrimingPolicy {
    /// Priming with the default settling interval.
    pub fn enable_then_read() -> Self {
        Self::EnableThenRead {
            settle: DEFAULT_SETTLE,
        }
    }

    /// Settling interval, if this policy primes.
    pub fn settle(&self) -> Option<Duration> {
        match self {
            Self::Direct => None,
            Self::EnableThenRead { settle } => Some(*settle),
        }
    }
}

/// Whether an active subscription needs `descriptor`'s sensor to stay on.
pub(crate) fn sensor_still_needed(
    ledger: &SubscriptionLedger,
    catalog: &ComponentCatalog,
    descriptor: &ComponentDescriptor,
) -> bool {
    ledger
        .active()
        .filter_map(|name| catalog.get(name))
        .any(|active| active.name() == descriptor.name() || active.shares_enable_with(descriptor))
}

/// Primed reads in progress, counted per enable selector.
///
/// A sensor with a registered read stays on: unsubscribing its last
/// subscriber leaves the disable write to the read that finishes last.
#[derive(Debug, Default)]
pub(crate) struct PrimedReads {
    entries: Vec<(Selector, u32)>,
}

impl PrimedReads {
    /// Register a read that has switched the sensor behind `enable` on.
    pub(crate) fn begin(&mut self, enable: &Selector) {
        match self.entries.iter_mut().find(|(s, _)| s == enable) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((enable.clone(), 1)),
        }
    }

    /// Drop a registration made by [`begin`](Self::begin).
    pub(crate) fn finish(&mut self, enable: &Selector) {
        if let Some(index) = self.entries.iter().position(|(s, _)| s == enable) {
            let count = &mut self.entries[index].1;
            *count -= 1;
            if *count == 0 {
                self.entries.remove(index);
            }
        }
    }

    /// Whether a read still needs `descriptor`'s sensor on.
    pub(crate) fn holds(&self, descriptor: &ComponentDescriptor) -> bool {
        descriptor
            .enable_write()
            .is_some_and(|enable| self.entries.iter().any(|(s, _)| *s == enable.selector))
    }
}
