//! Rendering system
//!
//! - [`api`]: per-frame data and collaborator interfaces
//! - [`resources`]: pipeline and material catalogs
//! - [`batching`]: pipeline/material grouping of the object list
//! - [`frame`]: per-image resources and the frame cycle
//! - [`primitives`]: camera
//! - [`FrameRenderer`]: the public entry point tying these together

pub mod api;
pub mod batching;
pub mod error;
pub mod frame;
pub mod primitives;
pub mod resources;

mod renderer;


pub use error::{ObjectReference, RenderError, RenderResult};
pub use renderer::FrameRenderer;
