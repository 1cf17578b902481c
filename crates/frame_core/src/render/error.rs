//! Render error taxonomy
//!
//! Per-frame conditions (stale swapchain, timeouts, bad object references,
//! recording failures) are ordinary values the frame cycle reports back to
//! the caller. Allocation and device errors invalidate the current swapchain
//! generation.

use std::fmt;
use std::time::Duration;

use ash::vk;

use crate::config::ConfigError;
use crate::render::resources::{MaterialId, PipelineId};

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Catalog entry an object pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectReference {
    /// Pipeline identifier not present in the pipeline catalog
    Pipeline(PipelineId),
    /// Material identifier not present in the material catalog
    Material(MaterialId),
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline(id) => write!(f, "pipeline {id:?}"),
            Self::Material(id) => write!(f, "material {id:?}"),
        }
    }
}

/// Errors raised by the frame-rendering core
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Buffer or descriptor allocation failed
    ///
    /// Fatal to the current swapchain generation; recovered by recreating
    /// every frame resource set.
    #[error("Allocation failed: {reason}")]
    AllocationFailure {
        /// What could not be allocated
        reason: String,
    },

    /// The swapchain no longer matches the surface
    ///
    /// The frame cycle reports it as `FrameResult::NeedsRecreation`;
    /// `FrameResult::into_error` turns that back into this variant.
    #[error("Swapchain is out of date")]
    SwapchainStale,

    /// No swapchain image became available in time
    #[error("Timed out after {waited:?} acquiring a swapchain image")]
    AcquireTimeout {
        /// Timeout that elapsed
        waited: Duration,
    },

    /// The frame set's previous submission did not retire in time
    #[error("Timed out after {waited:?} waiting for frame set {image_index} to retire")]
    UploadWaitTimeout {
        /// Swapchain image whose resources were still busy
        image_index: u32,
        /// Timeout that elapsed
        waited: Duration,
    },

    /// An object names a pipeline or material the catalogs do not know
    #[error("Object {object_index} references unregistered {reference}")]
    InvalidObjectReference {
        /// Position of the object in the frame's object list
        object_index: usize,
        /// The identifier that failed to resolve
        reference: ObjectReference,
    },

    /// Command buffer recording failed; the frame is not submitted
    #[error("Command recording failed: {reason}")]
    RecordingFailure {
        /// Description of the failing step
        reason: String,
    },

    /// Unexpected graphics API error
    #[error("Vulkan API error: {0:?}")]
    Device(#[from] vk::Result),

    /// Configuration could not be loaded or is out of range
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RenderError {
    /// Shorthand for an allocation failure
    pub fn allocation(reason: impl Into<String>) -> Self {
        Self::AllocationFailure {
            reason: reason.into(),
        }
    }

    /// Shorthand for a recording failure
    pub fn recording(reason: impl Into<String>) -> Self {
        Self::RecordingFailure {
            reason: reason.into(),
        }
    }

    /// Whether the error only costs the current frame
    pub const fn is_per_frame(&self) -> bool {
        matches!(
            self,
            Self::SwapchainStale
                | Self::AcquireTimeout { .. }
                | Self::UploadWaitTimeout { .. }
                | Self::InvalidObjectReference { .. }
                | Self::RecordingFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_classification() {
        assert!(RenderError::SwapchainStale.is_per_frame());
        assert!(RenderError::recording("end failed").is_per_frame());
        assert!(RenderError::AcquireTimeout {
            waited: Duration::from_millis(5)
        }
        .is_per_frame());

        assert!(!RenderError::allocation("out of memory").is_per_frame());
        assert!(!RenderError::Device(vk::Result::ERROR_DEVICE_LOST).is_per_frame());
    }

    #[test]
    fn test_invalid_reference_message_names_the_object() {
        let error = RenderError::InvalidObjectReference {
            object_index: 4,
            reference: ObjectReference::Material(MaterialId::default()),
        };
        let message = error.to_string();
        assert!(message.starts_with("Object 4 references unregistered material"));
    }
}
