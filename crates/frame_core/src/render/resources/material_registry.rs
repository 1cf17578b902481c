//! Material registry
//!
//! Maps [`MaterialId`] to the descriptor sets a material binds after the
//! camera set. A material without textures registers an empty set list.

use slotmap::SlotMap;

use super::MaterialId;
use crate::render::api::{MaterialCatalog, MaterialResources};

/// A registered material
#[derive(Debug, Clone)]
pub struct MaterialEntry {
    /// Debug name
    pub name: String,
    /// Descriptor resources bound with the material
    pub resources: MaterialResources,
}

/// Central registry for material descriptor resources
#[derive(Debug, Default)]
pub struct MaterialRegistry {
    materials: SlotMap<MaterialId, MaterialEntry>,
}

impl MaterialRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material
    pub fn register(&mut self, name: impl Into<String>, resources: MaterialResources) -> MaterialId {
        let name = name.into();
        log::debug!(
            "Registering material '{}' with {} descriptor set(s)",
            name,
            resources.descriptor_sets.len()
        );
        self.materials.insert(MaterialEntry { name, resources })
    }

    /// Remove a material, returning its resources for destruction
    pub fn unregister(&mut self, id: MaterialId) -> Option<MaterialResources> {
        let entry = self.materials.remove(id)?;
        log::debug!("Unregistered material '{}'", entry.name);
        Some(entry.resources)
    }

    /// Get a registered material
    pub fn get(&self, id: MaterialId) -> Option<&MaterialEntry> {
        self.materials.get(id)
    }

    /// Number of registered materials
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Check if no material is registered
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl MaterialCatalog for MaterialRegistry {
    fn lookup(&self, id: MaterialId) -> Option<&MaterialResources> {
        self.materials.get(id).map(|entry| &entry.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::{self, Handle};

    #[test]
    fn test_register_untextured_material() {
        let mut registry = MaterialRegistry::new();
        let id = registry.register("flat", MaterialResources::default());

        let resources = registry.lookup(id).unwrap();
        assert!(resources.descriptor_sets.is_empty());
    }

    #[test]
    fn test_unregister_returns_resources() {
        let mut registry = MaterialRegistry::new();
        let resources = MaterialResources {
            descriptor_sets: vec![vk::DescriptorSet::from_raw(7)],
        };
        let id = registry.register("textured", resources.clone());

        assert_eq!(registry.unregister(id), Some(resources));
        assert!(registry.lookup(id).is_none());
        assert!(registry.is_empty());
    }
}
