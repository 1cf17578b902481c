//! Per-frame machinery
//!
//! The frame cycle is split into focused managers coordinated by
//! [`FrameCycleController`]:
//! - [`FrameResources`] owns one resource set per swapchain image
//! - [`UniformUploadManager`] writes the camera block
//! - [`CommandRecorder`] records a batch plan
//! - [`SyncManager`] waits on and submits frame sets

pub mod command_recorder;
pub mod cycle;
pub mod resource_manager;
pub mod sync_manager;
pub mod ubo_manager;

pub use command_recorder::{CommandRecorder, ObjectPushConstants};
pub use cycle::{FrameContext, FrameCycleController, FrameState};
pub use resource_manager::{FrameResourceSet, FrameResources};
pub use sync_manager::SyncManager;
pub use ubo_manager::{CameraUbo, UniformUploadManager};
