//! # Render Batching
//!
//! Groups the frame's objects by pipeline, then by material, so recording
//! binds each pipeline once and each (pipeline, material) pair once.
//!
//! Ordering is first-encountered at every level: pipeline groups appear in
//! the order their first object appears, material groups likewise within a
//! pipeline, and objects keep their input order within a material group.
//! An unchanged object list therefore always yields the same plan.

mod builder;
mod plan;

pub use builder::{BatchBuild, RenderBatchBuilder};
pub use plan::{MaterialGroup, PipelineGroup, PlannedObject, RenderBatchPlan};
