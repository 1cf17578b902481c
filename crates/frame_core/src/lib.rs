//! # Frame Core
//!
//! The frame-rendering core of a single-pass forward renderer built on Vulkan.
//!
//! ## Features
//!
//! - **Per-image resources**: one uniform buffer, descriptor set and command
//!   buffer per swapchain image, reused only once the GPU is done with them
//! - **Batching**: objects grouped by pipeline, then by material, so state
//!   changes scale with the number of distinct pipelines and materials
//! - **Push constants**: per-object transforms travel with each draw call
//! - **Testable**: every graphics-API interaction goes through the traits in
//!   [`render::api`], with a simulated backend for headless runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_core::prelude::*;
//! use frame_core::backends::simulated::{ScriptedSwapchain, SimulatedGpu};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gpu = SimulatedGpu::new(2);
//!     let mut renderer = FrameRenderer::initialize(
//!         RendererConfig::default(),
//!         gpu.clone(),
//!         gpu,
//!         ScriptedSwapchain::new(3),
//!     )?;
//!
//!     let camera = CameraUniformData::new(Mat4::identity(), 0.0);
//!     match renderer.run_frame(&camera, &[])? {
//!         FrameResult::NeedsRecreation { .. } => renderer.recreate_swapchain(ScriptedSwapchain::new(3))?,
//!         _ => {}
//!     }
//!
//!     renderer.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod backends;
pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, MemoryVisibility, RendererConfig},
        foundation::math::{Mat4, Point3, Vec3},
        render::{
            api::{
                CameraUniformData, FrameReport, FrameResult, MeshBuffers, RenderableObject,
                SwapchainImageIndex,
            },
            primitives::Camera,
            resources::{DrawType, MaterialId, MaterialRegistry, PipelineId, PipelineRegistry},
            FrameRenderer, RenderError, RenderResult,
        },
    };
}
