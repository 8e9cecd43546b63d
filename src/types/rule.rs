//! Data rules: how a sample value is obtained

use serde::{Deserialize, Serialize};

use super::Number;

/// Describes whether sample values are stored in the packet buffer or
/// reconstructed from parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataRule {
    /// Values are physically present in the buffer. The expected deltas are
    /// advisory bounds on inter-sample spacing; set both or neither.
    Explicit { min_expected_delta: Option<Number>, max_expected_delta: Option<Number> },
    /// Value at index `i` is `packet_offset + i * delta + start`.
    Linear { delta: Number, start: Number },
    /// Every sample equals `value`.
    Constant { value: Number },
}

impl DataRule {
    /// Explicit rule without expected deltas.
    pub const fn explicit() -> Self {
        DataRule::Explicit { min_expected_delta: None, max_expected_delta: None }
    }

    /// Explicit rule with both expected deltas.
    pub fn explicit_with_deltas(min: impl Into<Number>, max: impl Into<Number>) -> Self {
        DataRule::Explicit {
            min_expected_delta: Some(min.into()),
            max_expected_delta: Some(max.into()),
        }
    }

    pub fn linear(delta: impl Into<Number>, start: impl Into<Number>) -> Self {
        DataRule::Linear { delta: delta.into(), start: start.into() }
    }

    pub fn constant(value: impl Into<Number>) -> Self {
        DataRule::Constant { value: value.into() }
    }

    /// Implicit rules carry no payload in the packet buffer.
    pub fn is_implicit(&self) -> bool {
        !matches!(self, DataRule::Explicit { .. })
    }

    /// Check the rule's parameters are complete.
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            DataRule::Explicit { min_expected_delta, max_expected_delta } => {
                if min_expected_delta.is_some() != max_expected_delta.is_some() {
                    return Err(crate::DaqError::invalid_descriptor(
                        "explicit rule expected deltas must be set together",
                    ));
                }
                Ok(())
            }
            DataRule::Linear { delta, start } => {
                if !delta.as_f64().is_finite() || !start.as_f64().is_finite() {
                    return Err(crate::DaqError::invalid_descriptor(
                        "linear rule parameters must be finite",
                    ));
                }
                Ok(())
            }
            DataRule::Constant { value } => {
                if !value.as_f64().is_finite() {
                    return Err(crate::DaqError::invalid_descriptor(
                        "constant rule value must be finite",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Reconstruct the value at `index` within a packet whose offset is
    /// `packet_offset`. Returns `None` for explicit rules, whose values live in
    /// the buffer.
    pub fn value_at(&self, packet_offset: Number, index: usize) -> Option<Number> {
        match *self {
            DataRule::Explicit { .. } => None,
            DataRule::Linear { delta, start } => {
                Some(packet_offset.add(delta.scale(index)).add(start))
            }
            DataRule::Constant { value } => Some(value),
        }
    }
}

impl Default for DataRule {
    fn default() -> Self {
        DataRule::explicit()
    }
}
