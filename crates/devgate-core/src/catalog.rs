//! Per-device-type component catalogs.
//!
//! A [`ComponentCatalog`] maps logical component names (e.g. `"Temperature"`)
//! to the selectors needed to read, subscribe, enable and tune them, plus a
//! decoder turning raw backend bytes into a [`Value`]. Catalogs are built once
//! when a device type is registered and shared read-only by every session of
//! that type.

use std::collections::HashMap;

use bytes::Bytes;

use devgate_types::{DecodeResult, DeviceComponent, Selector, Value};

use crate::error::{Error, Result};

/// Decoder from a raw payload to a component value.
pub type Decoder = fn(&[u8]) -> DecodeResult<Value>;

/// A control write issued to a backend: a payload sent to a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlWrite {
    /// Capability the payload is written to.
    pub selector: Selector,
    /// Bytes to write.
    pub payload: Bytes,
}

impl ControlWrite {
    /// Create a control write.
    pub fn new(selector: Selector, payload: impl Into<Bytes>) -> Self {
        Self {
            selector,
            payload: payload.into(),
        }
    }
}

/// Static description of one component of a device type.
#[derive(Clone)]
pub struct ComponentDescriptor {
    name: String,
    unit: String,
    read: Selector,
    subscribe: Selector,
    enable: Option<ControlWrite>,
    disable: Option<ControlWrite>,
    frequency: Option<ControlWrite>,
    decoder: Decoder,
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .field("read", &self.read)
            .field("subscribe", &self.subscribe)
            .field("enable", &self.enable)
            .field("disable", &self.disable)
            .field("frequency", &self.frequency)
            .finish_non_exhaustive()
    }
}

impl ComponentDescriptor {
    /// Create a descriptor with empty read/subscribe selectors.
    pub fn new(name: impl Into<String>, unit: impl Into<String>, decoder: Decoder) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            read: Selector::new(),
            subscribe: Selector::new(),
            enable: None,
            disable: None,
            frequency: None,
            decoder,
        }
    }

    /// Use `selector` for both reads and subscriptions.
    #[must_use]
    pub fn data(mut self, selector: Selector) -> Self {
        self.read = selector.clone();
        self.subscribe = selector;
        self
    }

    /// Set the read selector.
    #[must_use]
    pub fn read(mut self, selector: Selector) -> Self {
        self.read = selector;
        self
    }

    /// Set the subscribe selector.
    #[must_use]
    pub fn subscribe(mut self, selector: Selector) -> Self {
        self.subscribe = selector;
        self
    }

    /// Set the write that switches the sensor on.
    #[must_use]
    pub fn enable(mut self, write: ControlWrite) -> Self {
        self.enable = Some(write);
        self
    }

    /// Set the write that switches the sensor off.
    #[must_use]
    pub fn disable(mut self, write: ControlWrite) -> Self {
        self.disable = Some(write);
        self
    }

    /// Set the write that configures the notification period.
    #[must_use]
    pub fn frequency(mut self, write: ControlWrite) -> Self {
        self.frequency = Some(write);
        self
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit of measure.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Selector used by reads.
    pub fn read_selector(&self) -> &Selector {
        &self.read
    }

    /// Selector used by subscriptions and matched against notifications.
    pub fn subscribe_selector(&self) -> &Selector {
        &self.subscribe
    }

    /// Sensor enable write, if the sensor is power controlled.
    pub fn enable_write(&self) -> Option<&ControlWrite> {
        self.enable.as_ref()
    }

    /// Sensor disable write, if the sensor is power controlled.
    pub fn disable_write(&self) -> Option<&ControlWrite> {
        self.disable.as_ref()
    }

    /// Notification period write, if any.
    pub fn frequency_write(&self) -> Option<&ControlWrite> {
        self.frequency.as_ref()
    }

    /// Whether enabling this sensor also enables `other`'s sensor.
    pub(crate) fn shares_enable_with(&self, other: &ComponentDescriptor) -> bool {
        match (&self.enable, &other.enable) {
            (Some(a), Some(b)) => a.selector == b.selector,
            _ => false,
        }
    }

    /// Whether a backend subscription for this component also serves `other`.
    pub(crate) fn shares_subscription_with(&self, other: &ComponentDescriptor) -> bool {
        self.subscribe == other.subscribe
    }

    /// Decode a raw payload.
    pub fn decode(&self, data: &[u8]) -> DecodeResult<Value> {
        (self.decoder)(data)
    }
}

/// Read-only table of the components a device type exposes.
///
/// # Example
///
/// ```
/// use devgate_core::catalog::{ComponentCatalog, ComponentDescriptor};
/// use devgate_types::Value;
///
/// fn first_byte(data: &[u8]) -> devgate_types::DecodeResult<Value> {
///     devgate_types::DecodeError::require_len(data, 1)?;
///     Ok(Value::Integer(i64::from(data[0])))
/// }
///
/// let catalog = ComponentCatalog::builder()
///     .component(ComponentDescriptor::new("LoraData", "lora", first_byte))
///     .build()
///     .unwrap();
/// assert_eq!(catalog.unit("LoraData"), Some("lora"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ComponentCatalog {
    components: Vec<ComponentDescriptor>,
    index: HashMap<String, usize>,
}

impl ComponentCatalog {
    /// Create a new catalog builder.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Look up a component by name.
    pub fn get(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.index.get(name).map(|&i| &self.components[i])
    }

    /// Whether the catalog contains `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Unit of measure of a component.
    pub fn unit(&self, name: &str) -> Option<&str> {
        self.get(name).map(ComponentDescriptor::unit)
    }

    /// Components in declaration order.
    pub fn components(&self) -> &[ComponentDescriptor] {
        &self.components
    }

    /// Component names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(ComponentDescriptor::name)
    }

    /// Name and unit of every component.
    pub fn device_components(&self) -> Vec<DeviceComponent> {
        self.components
            .iter()
            .map(|c| DeviceComponent {
                name: c.name.clone(),
                unit: c.unit.clone(),
            })
            .collect()
    }

    /// Components whose subscribe selector matches a notification selector.
    ///
    /// A component matches when every entry of its subscribe selector is
    /// present in `selector`. Several components may share one selector, in
    /// which case all of them are returned in declaration order.
    pub fn resolve(&self, selector: &Selector) -> Vec<&ComponentDescriptor> {
        self.components
            .iter()
            .filter(|c| c.subscribe.is_subset_of(selector))
            .collect()
    }

    /// Decode `data` for the named component.
    ///
    /// Returns `None` if the component is unknown.
    pub fn decode(&self, name: &str, data: &[u8]) -> Option<DecodeResult<Value>> {
        self.get(name).map(|c| c.decode(data))
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the catalog has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Builder for [`ComponentCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    components: Vec<ComponentDescriptor>,
}

impl CatalogBuilder {
    /// Add a component.
    #[must_use]
    pub fn component(mut self, descriptor: ComponentDescriptor) -> Self {
        self.components.push(descriptor);
        self
    }

    /// Build the catalog.
    ///
    /// Fails with [`Error::InvalidConfig`] on an empty or duplicate name.
    pub fn build(self) -> Result<ComponentCatalog> {
        let mut index = HashMap::with_capacity(self.components.len());
        for (i, component) in self.components.iter().enumerate() {
            if component.name.is_empty() {
                return Err(Error::invalid_config("component name cannot be empty"));
            }
            if index.insert(component.name.clone(), i).is_some() {
                return Err(Error::invalid_config(format!(
                    "duplicate component '{}'",
                    component.name
                )));
            }
        }
        Ok(ComponentCatalog {
            components: self.components,
            index,
        })
    }
}
