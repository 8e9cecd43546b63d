//! Error types for the signal data plane.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type is
//! [`DaqError`]. Errors are grouped into categories that tell the caller how to
//! recover:
//!
//! - **Configuration**: an object could not be built (invalid descriptor, reader
//!   bound to an incompatible sample type). Fatal to that instance.
//! - **Capacity**: a call asked for more than fits (buffer too small, window
//!   exceeded). The reader or connection stays usable.
//! - **State**: the object can no longer serve the request (invalid reader,
//!   closed connection). Recover by building a replacement reader with
//!   `from_existing`, which keeps queued data.
//! - **Data**: a packet or event did not match its schema.
//!
//! An empty connection or a read that times out with zero samples is not an
//! error; those outcomes are reported through `Option` and sample counts.
//!
//! ```rust
//! use daqflow::{DaqError, ErrorCategory};
//!
//! let error = DaqError::size_exceeded(6, 5);
//! assert_eq!(error.category(), ErrorCategory::Capacity);
//! assert!(error.is_recoverable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

use crate::types::SampleType;

/// Result type alias for data plane operations.
pub type Result<T, E = DaqError> = std::result::Result<T, E>;

/// Coarse classification of a [`DaqError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Capacity,
    State,
    Data,
}

/// Main error type for data plane operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DaqError {
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Invalid data descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Sample type {found:?} cannot be read as {expected:?}")]
    IncompatibleSampleType { expected: SampleType, found: SampleType },

    #[error("Requested {requested} samples but the reader retains at most {capacity}")]
    SizeExceeded { requested: usize, capacity: usize },

    #[error("Buffer '{buffer}' holds {actual} elements but {required} are required")]
    BufferTooSmall { buffer: &'static str, required: usize, actual: usize },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Signal '{signal}' is already connected to port '{port}'")]
    AlreadyConnected { signal: String, port: String },

    #[error("Port '{port}' is not connected")]
    NotConnected { port: String },

    #[error("Domain error: {reason}")]
    Domain { reason: String },

    #[error("Cannot parse origin '{value}'")]
    OriginParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Malformed '{event_id}' event: {details}")]
    InvalidEvent { event_id: String, details: String },

    #[error("Packet buffer access out of bounds at offset {offset:#x}")]
    Memory { offset: usize },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },
}

impl DaqError {
    /// Returns the category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            DaqError::Configuration { .. }
            | DaqError::InvalidDescriptor { .. }
            | DaqError::IncompatibleSampleType { .. }
            | DaqError::AlreadyConnected { .. }
            | DaqError::Domain { .. }
            | DaqError::OriginParse { .. }
            | DaqError::Parse { .. } => ErrorCategory::Configuration,
            DaqError::SizeExceeded { .. } | DaqError::BufferTooSmall { .. } => {
                ErrorCategory::Capacity
            }
            DaqError::InvalidState { .. } | DaqError::NotConnected { .. } => ErrorCategory::State,
            DaqError::InvalidEvent { .. } | DaqError::Memory { .. } => ErrorCategory::Data,
        }
    }

    /// Returns whether the object that raised this error is still usable.
    ///
    /// Capacity errors leave the reader or connection intact; everything else
    /// requires building a new object.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Capacity)
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DaqError::Configuration { .. } | DaqError::Parse { .. } => vec![
                "Check the reader or port configuration values",
                "Compare the configuration against the documented defaults",
            ],
            DaqError::InvalidDescriptor { .. } => vec![
                "Check that the data rule parameters are complete",
                "Implicit rules require a scalar numeric sample type",
                "Post scaling requires an explicit rule",
            ],
            DaqError::IncompatibleSampleType { .. } => vec![
                "Build the reader with an output type the signal can convert to",
                "Use from_existing to switch output types without losing queued data",
            ],
            DaqError::SizeExceeded { .. } => vec![
                "Request at most the configured history size",
                "Build a reader with a larger window",
            ],
            DaqError::BufferTooSmall { .. } => vec![
                "Allocate buffers for the full requested count",
                "Request fewer samples or blocks per call",
            ],
            DaqError::InvalidState { .. } => vec![
                "Build a replacement reader with from_existing",
                "Check whether the signal was removed or the port disconnected",
            ],
            DaqError::AlreadyConnected { .. } => vec![
                "Reuse the existing connection",
                "Disconnect the port before connecting again",
            ],
            DaqError::NotConnected { .. } => vec!["Connect the port to a signal first"],
            DaqError::Domain { .. } => vec![
                "Use a linear domain rule to derive a sample rate",
                "Check the tick resolution and delta produce an integral rate",
            ],
            DaqError::OriginParse { .. } => vec![
                "Use an ISO-8601 instant such as 1970-01-01T00:00:00Z",
                "Include a time zone designator or explicit offset",
            ],
            DaqError::InvalidEvent { .. } => vec![
                "Check the event parameter types",
                "Build events with the typed constructors",
            ],
            DaqError::Memory { .. } => vec![
                "Check the buffer length against the descriptor's sample size",
                "Verify the producer filled the packet completely",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn configuration(reason: impl Into<String>) -> Self {
        DaqError::Configuration { reason: reason.into() }
    }

    /// Helper constructor for descriptor validation errors.
    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        DaqError::InvalidDescriptor { reason: reason.into() }
    }

    /// Helper constructor for state errors.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        DaqError::InvalidState { reason: reason.into() }
    }

    /// Helper constructor for domain conversion errors.
    pub fn domain(reason: impl Into<String>) -> Self {
        DaqError::Domain { reason: reason.into() }
    }

    /// Helper constructor for window size errors.
    pub fn size_exceeded(requested: usize, capacity: usize) -> Self {
        DaqError::SizeExceeded { requested, capacity }
    }

    /// Helper constructor for undersized caller buffers.
    pub fn buffer_too_small(buffer: &'static str, required: usize, actual: usize) -> Self {
        DaqError::BufferTooSmall { buffer, required, actual }
    }

    /// Helper constructor for malformed events.
    pub fn invalid_event(event_id: impl Into<String>, details: impl Into<String>) -> Self {
        DaqError::InvalidEvent { event_id: event_id.into(), details: details.into() }
    }
}

impl From<serde_yaml_ng::Error> for DaqError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DaqError::Parse { context: "YAML configuration".to_string(), details: err.to_string() }
    }
}
