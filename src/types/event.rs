//! Event packets and typed accessors for well-known events

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DataDescriptor, Number};
use crate::{DaqError, Result};

/// Event id signalling a value and/or domain descriptor change.
pub const DATA_DESCRIPTOR_CHANGED: &str = "DATA_DESCRIPTOR_CHANGED";
/// Event id signalling a discontinuity in an implicit domain.
pub const IMPLICIT_DOMAIN_GAP_DETECTED: &str = "IMPLICIT_DOMAIN_GAP_DETECTED";

/// Parameter key carrying the value descriptor.
pub const DATA_DESCRIPTOR_KEY: &str = "DataDescriptor";
/// Parameter key carrying the domain descriptor.
pub const DOMAIN_DATA_DESCRIPTOR_KEY: &str = "DomainDataDescriptor";
/// Parameter key carrying the domain gap size.
pub const GAP_DIFF_KEY: &str = "GapDiff";

/// Value stored in an event parameter map.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    /// Explicit "no value" sentinel
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Descriptor(Arc<DataDescriptor>),
}

/// Structured in-band notification.
///
/// Parameters stay a string-keyed map so new event kinds need no changes
/// here; well-known ids are parsed through typed accessors such as
/// [`DescriptorChanged::from_event`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventPacket {
    event_id: String,
    parameters: BTreeMap<String, EventValue>,
}

impl EventPacket {
    pub fn new(event_id: impl Into<String>, parameters: BTreeMap<String, EventValue>) -> Self {
        Self { event_id: event_id.into(), parameters }
    }

    /// Build a `DATA_DESCRIPTOR_CHANGED` event.
    pub fn descriptor_changed(value: DescriptorUpdate, domain: DescriptorUpdate) -> Self {
        let mut parameters = BTreeMap::new();
        if let Some(v) = value.into_event_value() {
            parameters.insert(DATA_DESCRIPTOR_KEY.to_string(), v);
        }
        if let Some(v) = domain.into_event_value() {
            parameters.insert(DOMAIN_DATA_DESCRIPTOR_KEY.to_string(), v);
        }
        Self::new(DATA_DESCRIPTOR_CHANGED, parameters)
    }

    /// Build an `IMPLICIT_DOMAIN_GAP_DETECTED` event.
    pub fn domain_gap(diff: Number) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(GAP_DIFF_KEY.to_string(), EventValue::Number(diff));
        Self::new(IMPLICIT_DOMAIN_GAP_DETECTED, parameters)
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn parameters(&self) -> &BTreeMap<String, EventValue> {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&EventValue> {
        self.parameters.get(key)
    }

    pub fn is_descriptor_changed(&self) -> bool {
        self.event_id == DATA_DESCRIPTOR_CHANGED
    }
}

/// State of one descriptor after a `DATA_DESCRIPTOR_CHANGED` event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DescriptorUpdate {
    /// Key absent: the descriptor did not change
    #[default]
    Unchanged,
    /// Key present with the null sentinel: there is no descriptor now
    Cleared,
    Changed(Arc<DataDescriptor>),
}

impl DescriptorUpdate {
    fn from_parameter(event_id: &str, key: &str, value: Option<&EventValue>) -> Result<Self> {
        match value {
            None => Ok(DescriptorUpdate::Unchanged),
            Some(EventValue::Null) => Ok(DescriptorUpdate::Cleared),
            Some(EventValue::Descriptor(d)) => Ok(DescriptorUpdate::Changed(Arc::clone(d))),
            Some(other) => Err(DaqError::invalid_event(
                event_id,
                format!("parameter '{}' holds {:?}, expected a descriptor", key, other),
            )),
        }
    }

    fn into_event_value(self) -> Option<EventValue> {
        match self {
            DescriptorUpdate::Unchanged => None,
            DescriptorUpdate::Cleared => Some(EventValue::Null),
            DescriptorUpdate::Changed(d) => Some(EventValue::Descriptor(d)),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, DescriptorUpdate::Unchanged)
    }

    /// Apply this update to the currently active descriptor.
    pub fn apply(&self, active: &mut Option<Arc<DataDescriptor>>) {
        match self {
            DescriptorUpdate::Unchanged => {}
            DescriptorUpdate::Cleared => *active = None,
            DescriptorUpdate::Changed(d) => *active = Some(Arc::clone(d)),
        }
    }
}

impl From<Option<DataDescriptor>> for DescriptorUpdate {
    fn from(value: Option<DataDescriptor>) -> Self {
        match value {
            Some(d) => DescriptorUpdate::Changed(Arc::new(d)),
            None => DescriptorUpdate::Cleared,
        }
    }
}

/// Typed view of a `DATA_DESCRIPTOR_CHANGED` event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorChanged {
    pub value: DescriptorUpdate,
    pub domain: DescriptorUpdate,
}

impl DescriptorChanged {
    pub fn from_event(event: &EventPacket) -> Result<Self> {
        if !event.is_descriptor_changed() {
            return Err(DaqError::invalid_event(
                event.event_id(),
                format!("expected {}", DATA_DESCRIPTOR_CHANGED),
            ));
        }
        Ok(Self {
            value: DescriptorUpdate::from_parameter(
                event.event_id(),
                DATA_DESCRIPTOR_KEY,
                event.parameter(DATA_DESCRIPTOR_KEY),
            )?,
            domain: DescriptorUpdate::from_parameter(
                event.event_id(),
                DOMAIN_DATA_DESCRIPTOR_KEY,
                event.parameter(DOMAIN_DATA_DESCRIPTOR_KEY),
            )?,
        })
    }
}

/// Typed view of an `IMPLICIT_DOMAIN_GAP_DETECTED` event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainGap {
    pub diff: Number,
}

impl DomainGap {
    pub fn from_event(event: &EventPacket) -> Result<Self> {
        if event.event_id() != IMPLICIT_DOMAIN_GAP_DETECTED {
            return Err(DaqError::invalid_event(
                event.event_id(),
                format!("expected {}", IMPLICIT_DOMAIN_GAP_DETECTED),
            ));
        }
        match event.parameter(GAP_DIFF_KEY) {
            Some(EventValue::Number(diff)) => Ok(Self { diff: *diff }),
            other => Err(DaqError::invalid_event(
                event.event_id(),
                format!("parameter '{}' holds {:?}, expected a number", GAP_DIFF_KEY, other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> Arc<DataDescriptor> {
        Arc::new(DataDescriptor::builder().name(name).build().unwrap())
    }

    #[test]
    fn absent_key_means_unchanged() {
        let event =
            EventPacket::descriptor_changed(DescriptorUpdate::Changed(descriptor("v")), DescriptorUpdate::Unchanged);
        let parsed = DescriptorChanged::from_event(&event).unwrap();
        assert!(matches!(parsed.value, DescriptorUpdate::Changed(ref d) if d.name() == "v"));
        assert_eq!(parsed.domain, DescriptorUpdate::Unchanged);
        assert!(event.parameter(DOMAIN_DATA_DESCRIPTOR_KEY).is_none());
    }

    #[test]
    fn null_sentinel_means_cleared() {
        let event = EventPacket::descriptor_changed(DescriptorUpdate::Cleared, DescriptorUpdate::Cleared);
        let parsed = DescriptorChanged::from_event(&event).unwrap();
        assert_eq!(parsed.value, DescriptorUpdate::Cleared);
        assert_eq!(parsed.domain, DescriptorUpdate::Cleared);
    }

    #[test]
    fn wrong_parameter_type_is_rejected() {
        let mut parameters = BTreeMap::new();
        parameters.insert(DATA_DESCRIPTOR_KEY.to_string(), EventValue::Bool(true));
        let event = EventPacket::new(DATA_DESCRIPTOR_CHANGED, parameters);
        assert!(matches!(
            DescriptorChanged::from_event(&event),
            Err(DaqError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn wrong_event_id_is_rejected() {
        let event = EventPacket::domain_gap(Number::Int(5));
        assert!(DescriptorChanged::from_event(&event).is_err());
        assert_eq!(DomainGap::from_event(&event).unwrap().diff, Number::Int(5));
    }

    #[test]
    fn update_applies_to_active_descriptor() {
        let mut active = Some(descriptor("a"));
        DescriptorUpdate::Unchanged.apply(&mut active);
        assert_eq!(active.as_ref().map(|d| d.name().to_string()), Some("a".to_string()));
        DescriptorUpdate::Changed(descriptor("b")).apply(&mut active);
        assert_eq!(active.as_ref().map(|d| d.name().to_string()), Some("b".to_string()));
        DescriptorUpdate::Cleared.apply(&mut active);
        assert!(active.is_none());
    }
}
