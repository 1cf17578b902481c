//! Collaborator implementations
//!
//! - [`vulkan`]: adapters over `ash` for a real device and swapchain
//! - [`simulated`]: a headless device with a logical clock, for tests and demos

pub mod simulated;
pub mod vulkan;
