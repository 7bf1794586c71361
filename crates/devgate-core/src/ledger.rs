//! Reference-counted subscription bookkeeping.
//!
//! The [`SubscriptionLedger`] tracks how many logical subscribers want live
//! updates for each component. It is plain data; the owning session guards
//! it with its per-device lock, so every mutation is atomic with respect to
//! concurrent subscribe/unsubscribe calls on the same device.

/// Reference count per component name.
///
/// Entries exist only while their count is positive and are kept in
/// activation order (the order in which components first became active),
/// which is the order resubscription replays them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionLedger {
    entries: Vec<(String, u32)>,
}

impl SubscriptionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `component`, returning the new count.
    pub fn increment(&mut self, component: &str) -> u32 {
        match self.entries.iter_mut().find(|(name, _)| name == component) {
            Some((_, count)) => {
                *count = count.saturating_add(1);
                *count
            }
            None => {
                self.entries.push((component.to_string(), 1));
                1
            }
        }
    }

    /// Decrement the count for `component`, returning the new count.
    ///
    /// Returns `None` when the component has no active subscription; the
    /// ledger is left untouched in that case, so counts never go negative.
    pub fn decrement(&mut self, component: &str) -> Option<u32> {
        let index = self.entries.iter().position(|(name, _)| name == component)?;
        let count = &mut self.entries[index].1;
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            self.entries.remove(index);
        }
        Some(remaining)
    }

    /// Current count for `component` (zero when inactive).
    pub fn count(&self, component: &str) -> u32 {
        self.entries
            .iter()
            .find(|(name, _)| name == component)
            .map_or(0, |(_, count)| *count)
    }

    /// Whether `component` has at least one active subscription.
    pub fn has_active(&self, component: &str) -> bool {
        self.count(component) > 0
    }

    /// Whether any component has an active subscription.
    pub fn has_any_active(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Active component names in activation order.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| u64::from(*count)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_increment_and_decrement() {
        let mut ledger = SubscriptionLedger::new();
        assert_eq!(ledger.increment("Temperature"), 1);
        assert_eq!(ledger.increment("Temperature"), 2);
        assert!(ledger.has_active("Temperature"));

        assert_eq!(ledger.decrement("Temperature"), Some(1));
        assert_eq!(ledger.decrement("Temperature"), Some(0));
        assert!(!ledger.has_active("Temperature"));
        assert!(!ledger.has_any_active());
    }

    #[test]
    fn test_decrement_underflow_is_noop() {
        let mut ledger = SubscriptionLedger::new();
        assert_eq!(ledger.decrement("Humidity"), None);
        assert_eq!(ledger.count("Humidity"), 0);
        assert_eq!(ledger, SubscriptionLedger::new());
    }

    #[test]
    fn test_activation_order() {
        let mut ledger = SubscriptionLedger::new();
        ledger.increment("Humidity");
        ledger.increment("Temperature");
        ledger.increment("Humidity");
        assert_eq!(ledger.active().collect::<Vec<_>>(), ["Humidity", "Temperature"]);

        // Reactivation moves a component to the back.
        ledger.decrement("Humidity");
        ledger.decrement("Humidity");
        ledger.increment("Humidity");
        assert_eq!(ledger.active().collect::<Vec<_>>(), ["Temperature", "Humidity"]);
        assert_eq!(ledger.total(), 2);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Subscribe(usize),
        Unsubscribe(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3).prop_map(Op::Subscribe),
            (0usize..3).prop_map(Op::Unsubscribe),
        ]
    }

    const NAMES: [&str; 3] = ["Temperature", "Humidity", "Pressure"];

    proptest! {
        /// Any sequence of operations matches a clamped reference model and
        /// `has_any_active` agrees with the counts.
        #[test]
        fn ledger_matches_clamped_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let mut ledger = SubscriptionLedger::new();
            let mut model: HashMap<&str, u32> = HashMap::new();

            for op in ops {
                match op {
                    Op::Subscribe(i) => {
                        ledger.increment(NAMES[i]);
                        *model.entry(NAMES[i]).or_default() += 1;
                    }
                    Op::Unsubscribe(i) => {
                        let expected = model.get(NAMES[i]).copied().unwrap_or(0);
                        let result = ledger.decrement(NAMES[i]);
                        if expected == 0 {
                            prop_assert_eq!(result, None);
                        } else {
                            model.insert(NAMES[i], expected - 1);
                            prop_assert_eq!(result, Some(expected - 1));
                        }
                    }
                }

                for name in NAMES {
                    prop_assert_eq!(ledger.count(name), model.get(name).copied().unwrap_or(0));
                }
                prop_assert_eq!(ledger.has_any_active(), model.values().any(|c| *c > 0));
            }
        }

        /// Subscribing n times then unsubscribing n times restores an empty ledger.
        #[test]
        fn subscribe_then_unsubscribe_restores(n in 1u32..32) {
            let mut ledger = SubscriptionLedger::new();
            for _ in 0..n {
                ledger.increment("DummyData");
            }
            prop_assert_eq!(ledger.count("DummyData"), n);
            for _ in 0..n {
                prop_assert!(ledger.decrement("DummyData").is_some());
            }
            prop_assert_eq!(ledger, SubscriptionLedger::new());
        }
    }
}
