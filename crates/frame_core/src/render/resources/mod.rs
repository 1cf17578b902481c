//! Pipeline and material catalogs
//!
//! Slot-map backed registries implementing [`PipelineCatalog`] and
//! [`MaterialCatalog`]. Identifiers are versioned keys, so an id whose entry
//! was unregistered no longer resolves.
//!
//! [`PipelineCatalog`]: crate::render::api::PipelineCatalog
//! [`MaterialCatalog`]: crate::render::api::MaterialCatalog

mod material_registry;
mod pipeline_registry;

pub use material_registry::{MaterialEntry, MaterialRegistry};
pub use pipeline_registry::{DrawType, PipelineEntry, PipelineRegistry};

slotmap::new_key_type! {
    /// Identifier of a registered pipeline
    pub struct PipelineId;

    /// Identifier of a registered material
    pub struct MaterialId;
}
