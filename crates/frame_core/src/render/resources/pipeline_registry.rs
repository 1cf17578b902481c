//! Pipeline registry
//!
//! Stores compiled pipelines by [`PipelineId`]. Compilation itself happens
//! outside the frame core; the registry only records the resulting handles
//! and the primitive topology they were built for.

use ash::vk;
use slotmap::SlotMap;

use super::PipelineId;
use crate::render::api::{PipelineCatalog, PipelineHandle};

/// Primitive topology a pipeline was compiled with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawType {
    /// Triangle list
    #[default]
    Triangles,
    /// Line list
    Lines,
    /// Point list
    Points,
}

impl DrawType {
    /// Vulkan topology for pipeline creation
    pub const fn topology(self) -> vk::PrimitiveTopology {
        match self {
            Self::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::Lines => vk::PrimitiveTopology::LINE_LIST,
            Self::Points => vk::PrimitiveTopology::POINT_LIST,
        }
    }
}

/// A registered pipeline
#[derive(Debug, Clone)]
pub struct PipelineEntry {
    /// Debug name
    pub name: String,
    /// Compiled pipeline and layout
    pub handle: PipelineHandle,
    /// Topology the pipeline was built for
    pub draw_type: DrawType,
}

/// Catalog of compiled pipelines
#[derive(Debug, Default)]
pub struct PipelineRegistry {
    pipelines: SlotMap<PipelineId, PipelineEntry>,
}

impl PipelineRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled pipeline
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handle: PipelineHandle,
        draw_type: DrawType,
    ) -> PipelineId {
        let name = name.into();
        log::debug!("Registering pipeline '{}' ({:?})", name, draw_type);
        self.pipelines.insert(PipelineEntry {
            name,
            handle,
            draw_type,
        })
    }

    /// Remove a pipeline, returning its handle for destruction
    pub fn unregister(&mut self, id: PipelineId) -> Option<PipelineHandle> {
        let entry = self.pipelines.remove(id)?;
        log::debug!("Unregistered pipeline '{}'", entry.name);
        Some(entry.handle)
    }

    /// Get a registered pipeline
    pub fn get(&self, id: PipelineId) -> Option<&PipelineEntry> {
        self.pipelines.get(id)
    }

    /// Number of registered pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Check if no pipeline is registered
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl PipelineCatalog for PipelineRegistry {
    fn lookup(&self, id: PipelineId) -> Option<PipelineHandle> {
        self.pipelines.get(id).map(|entry| entry.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn handle(raw: u64) -> PipelineHandle {
        PipelineHandle {
            pipeline: vk::Pipeline::from_raw(raw),
            layout: vk::PipelineLayout::from_raw(raw + 100),
            push_constant_stages: vk::ShaderStageFlags::VERTEX,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PipelineRegistry::new();
        let id = registry.register("opaque", handle(1), DrawType::Triangles);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(id), Some(handle(1)));
        assert_eq!(registry.get(id).map(|e| e.name.as_str()), Some("opaque"));
    }

    #[test]
    fn test_unregistered_id_no_longer_resolves() {
        let mut registry = PipelineRegistry::new();
        let id = registry.register("lines", handle(2), DrawType::Lines);

        assert_eq!(registry.unregister(id), Some(handle(2)));
        assert!(registry.lookup(id).is_none());

        // A new entry may reuse the slot but not the stale key
        let replacement = registry.register("points", handle(3), DrawType::Points);
        assert_ne!(replacement, id);
        assert!(registry.lookup(id).is_none());
    }

    #[test]
    fn test_default_id_never_resolves() {
        let mut registry = PipelineRegistry::new();
        registry.register("opaque", handle(1), DrawType::Triangles);
        assert!(registry.lookup(PipelineId::default()).is_none());
    }

    #[test]
    fn test_draw_type_topology() {
        assert_eq!(DrawType::Triangles.topology(), vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(DrawType::Lines.topology(), vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(DrawType::Points.topology(), vk::PrimitiveTopology::POINT_LIST);
    }
}
