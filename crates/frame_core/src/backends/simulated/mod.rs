//! Headless backend
//!
//! A logical-clock GPU and a scripted swapchain. Used by the test suite and
//! the demo to exercise the frame cycle without a display or a driver.

mod gpu;
mod swapchain;

pub use gpu::{GpuEvent, Hazard, LiveObjects, RecordedCommand, SimulatedGpu};
pub use swapchain::ScriptedSwapchain;
