//! Recording plan produced by the batch builder

use crate::render::api::{MaterialResources, PipelineHandle, RenderableObject};
use crate::render::resources::{MaterialId, PipelineId};

/// An object scheduled for drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannedObject<'a> {
    /// Position in the frame's object list
    pub index: usize,
    /// The object itself
    pub object: &'a RenderableObject,
}

/// Objects sharing one (pipeline, material) pair
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialGroup<'a> {
    /// Material shared by the group
    pub material_id: MaterialId,
    /// Resolved descriptor resources
    pub resources: &'a MaterialResources,
    /// Objects in input order
    pub objects: Vec<PlannedObject<'a>>,
}

/// Material groups sharing one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineGroup<'a> {
    /// Pipeline shared by the group
    pub pipeline_id: PipelineId,
    /// Resolved pipeline
    pub handle: PipelineHandle,
    /// Material groups in first-encountered order
    pub material_groups: Vec<MaterialGroup<'a>>,
}

impl PipelineGroup<'_> {
    /// Objects across all material groups
    pub fn object_count(&self) -> usize {
        self.material_groups.iter().map(|group| group.objects.len()).sum()
    }
}

/// Ordered recording plan for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderBatchPlan<'a> {
    pub(super) pipeline_groups: Vec<PipelineGroup<'a>>,
}

impl<'a> RenderBatchPlan<'a> {
    /// Pipeline groups in recording order
    pub fn pipeline_groups(&self) -> &[PipelineGroup<'a>] {
        &self.pipeline_groups
    }

    /// Number of distinct pipelines
    pub fn pipeline_count(&self) -> usize {
        self.pipeline_groups.len()
    }

    /// Number of distinct (pipeline, material) pairs
    pub fn material_group_count(&self) -> usize {
        self.pipeline_groups
            .iter()
            .map(|group| group.material_groups.len())
            .sum()
    }

    /// Total objects in the plan
    pub fn object_count(&self) -> usize {
        self.pipeline_groups.iter().map(PipelineGroup::object_count).sum()
    }

    /// Check if the plan draws nothing
    pub fn is_empty(&self) -> bool {
        self.pipeline_groups.is_empty()
    }

    /// Input indices in recording order
    pub fn draw_order(&self) -> Vec<usize> {
        self.pipeline_groups
            .iter()
            .flat_map(|group| &group.material_groups)
            .flat_map(|group| &group.objects)
            .map(|planned| planned.index)
            .collect()
    }
}
