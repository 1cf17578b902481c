//! Batch builder
//!
//! Turns the frame's object list into a [`RenderBatchPlan`], resolving every
//! pipeline and material against the catalogs on the way. Objects whose
//! references do not resolve are left out and reported.

use std::collections::HashMap;

use super::plan::{MaterialGroup, PipelineGroup, PlannedObject, RenderBatchPlan};
use crate::render::api::{MaterialCatalog, PipelineCatalog, RenderableObject};
use crate::render::error::ObjectReference;
use crate::render::resources::{MaterialId, PipelineId};
use crate::render::RenderError;

/// A built plan and the objects that could not be placed in it
#[derive(Debug)]
pub struct BatchBuild<'a> {
    /// Recording plan of every resolvable object
    pub plan: RenderBatchPlan<'a>,
    /// One `InvalidObjectReference` per excluded object
    pub rejected: Vec<RenderError>,
}

/// Groups objects by pipeline, then material
///
/// Keeps its lookup tables between frames to avoid reallocating them.
#[derive(Debug, Default)]
pub struct RenderBatchBuilder {
    pipeline_slots: HashMap<PipelineId, usize>,
    material_slots: HashMap<(PipelineId, MaterialId), usize>,
}

impl RenderBatchBuilder {
    /// Create a builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the plan for `objects`
    ///
    /// An empty list yields an empty plan. When both references of an object
    /// are unknown, the pipeline is reported.
    pub fn build<'a, P, M>(
        &mut self,
        objects: &'a [RenderableObject],
        pipelines: &P,
        materials: &'a M,
    ) -> BatchBuild<'a>
    where
        P: PipelineCatalog + ?Sized,
        M: MaterialCatalog + ?Sized,
    {
        self.pipeline_slots.clear();
        self.material_slots.clear();

        let mut groups: Vec<PipelineGroup<'a>> = Vec::new();
        let mut rejected = Vec::new();

        for (index, object) in objects.iter().enumerate() {
            let Some(handle) = pipelines.lookup(object.pipeline) else {
                rejected.push(Self::reject(index, ObjectReference::Pipeline(object.pipeline)));
                continue;
            };
            let Some(resources) = materials.lookup(object.material) else {
                rejected.push(Self::reject(index, ObjectReference::Material(object.material)));
                continue;
            };

            let group_index = *self.pipeline_slots.entry(object.pipeline).or_insert_with(|| {
                groups.push(PipelineGroup {
                    pipeline_id: object.pipeline,
                    handle,
                    material_groups: Vec::new(),
                });
                groups.len() - 1
            });
            let group = &mut groups[group_index];

            let material_index = *self
                .material_slots
                .entry((object.pipeline, object.material))
                .or_insert_with(|| {
                    group.material_groups.push(MaterialGroup {
                        material_id: object.material,
                        resources,
                        objects: Vec::new(),
                    });
                    group.material_groups.len() - 1
                });

            group.material_groups[material_index]
                .objects
                .push(PlannedObject { index, object });
        }

        let plan = RenderBatchPlan {
            pipeline_groups: groups,
        };
        log::trace!(
            "Built batch plan: {} object(s), {} pipeline(s), {} material group(s), {} rejected",
            plan.object_count(),
            plan.pipeline_count(),
            plan.material_group_count(),
            rejected.len()
        );

        BatchBuild { plan, rejected }
    }

    fn reject(object_index: usize, reference: ObjectReference) -> RenderError {
        log::warn!("Excluding object {} from frame: unregistered {}", object_index, reference);
        RenderError::InvalidObjectReference {
            object_index,
            reference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{MaterialResources, MeshBuffers, PipelineHandle};
    use crate::render::resources::{DrawType, MaterialRegistry, PipelineRegistry};
    use ash::vk::{self, Handle};

    struct Catalogs {
        pipelines: PipelineRegistry,
        materials: MaterialRegistry,
        pipeline_a: PipelineId,
        pipeline_b: PipelineId,
        material_x: MaterialId,
        material_y: MaterialId,
    }

    fn catalogs() -> Catalogs {
        let mut pipelines = PipelineRegistry::new();
        let mut materials = MaterialRegistry::new();
        let pipeline = |raw: u64| PipelineHandle {
            pipeline: vk::Pipeline::from_raw(raw),
            layout: vk::PipelineLayout::from_raw(raw),
            push_constant_stages: vk::ShaderStageFlags::VERTEX,
        };

        let pipeline_a = pipelines.register("A", pipeline(1), DrawType::Triangles);
        let pipeline_b = pipelines.register("B", pipeline(2), DrawType::Lines);
        let material_x = materials.register("X", MaterialResources::default());
        let material_y = materials.register(
            "Y",
            MaterialResources {
                descriptor_sets: vec![vk::DescriptorSet::from_raw(9)],
            },
        );

        Catalogs {
            pipelines,
            materials,
            pipeline_a,
            pipeline_b,
            material_x,
            material_y,
        }
    }

    fn object(pipeline: PipelineId, material: MaterialId) -> RenderableObject {
        let mesh = MeshBuffers::new(vk::Buffer::from_raw(1), vk::Buffer::from_raw(2), 36);
        RenderableObject::new(mesh, pipeline, material)
    }

    #[test]
    fn test_empty_list_yields_empty_plan() {
        let c = catalogs();
        let mut builder = RenderBatchBuilder::new();

        let build = builder.build(&[], &c.pipelines, &c.materials);
        assert!(build.plan.is_empty());
        assert!(build.rejected.is_empty());
    }

    #[test]
    fn test_two_pipeline_three_pair_scenario() {
        let c = catalogs();
        let objects = [
            object(c.pipeline_a, c.material_x),
            object(c.pipeline_a, c.material_y),
            object(c.pipeline_b, c.material_x),
        ];

        let mut builder = RenderBatchBuilder::new();
        let build = builder.build(&objects, &c.pipelines, &c.materials);
        let groups = build.plan.pipeline_groups();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].pipeline_id, c.pipeline_a);
        assert_eq!(groups[1].pipeline_id, c.pipeline_b);

        let a_materials: Vec<_> = groups[0].material_groups.iter().map(|g| g.material_id).collect();
        assert_eq!(a_materials, vec![c.material_x, c.material_y]);
        assert_eq!(groups[1].material_groups.len(), 1);
        assert_eq!(groups[1].material_groups[0].material_id, c.material_x);

        assert_eq!(build.plan.object_count(), 3);
        assert_eq!(build.plan.material_group_count(), 3);
    }

    #[test]
    fn test_interleaved_objects_are_grouped_contiguously() {
        let c = catalogs();
        let objects = [
            object(c.pipeline_b, c.material_y), // 0
            object(c.pipeline_a, c.material_x), // 1
            object(c.pipeline_b, c.material_x), // 2
            object(c.pipeline_a, c.material_x), // 3
            object(c.pipeline_b, c.material_y), // 4
        ];

        let mut builder = RenderBatchBuilder::new();
        let build = builder.build(&objects, &c.pipelines, &c.materials);

        // B first-encountered, Y before X within B, input order within groups
        assert_eq!(build.plan.draw_order(), vec![0, 4, 2, 1, 3]);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let c = catalogs();
        let objects: Vec<_> = (0..40)
            .map(|i| {
                let pipeline = if i % 3 == 0 { c.pipeline_b } else { c.pipeline_a };
                let material = if i % 2 == 0 { c.material_x } else { c.material_y };
                object(pipeline, material)
            })
            .collect();

        let mut builder = RenderBatchBuilder::new();
        let first = builder.build(&objects, &c.pipelines, &c.materials).plan;
        let second = builder.build(&objects, &c.pipelines, &c.materials).plan;

        assert_eq!(first, second);
        assert_eq!(first.draw_order(), second.draw_order());
    }

    #[test]
    fn test_unregistered_material_is_reported_and_excluded() {
        let mut c = catalogs();
        let removed = c.materials.register("temporary", MaterialResources::default());
        c.materials.unregister(removed);

        let objects = [
            object(c.pipeline_a, c.material_x),
            object(c.pipeline_a, removed),
            object(c.pipeline_b, c.material_y),
        ];

        let mut builder = RenderBatchBuilder::new();
        let build = builder.build(&objects, &c.pipelines, &c.materials);

        assert_eq!(build.plan.object_count(), 2);
        assert_eq!(build.plan.draw_order(), vec![0, 2]);
        assert_eq!(build.rejected.len(), 1);
        assert!(matches!(
            build.rejected[0],
            RenderError::InvalidObjectReference {
                object_index: 1,
                reference: ObjectReference::Material(id),
            } if id == removed
        ));
    }

    #[test]
    fn test_unregistered_pipeline_is_reported_first() {
        let c = catalogs();
        let objects = [object(PipelineId::default(), MaterialId::default())];

        let mut builder = RenderBatchBuilder::new();
        let build = builder.build(&objects, &c.pipelines, &c.materials);

        assert!(build.plan.is_empty());
        assert!(matches!(
            build.rejected[0],
            RenderError::InvalidObjectReference {
                reference: ObjectReference::Pipeline(_),
                ..
            }
        ));
    }

    #[test]
    fn test_plan_counts_match_valid_inputs() {
        let c = catalogs();
        for len in 0..12 {
            let objects: Vec<_> = (0..len)
                .map(|i| match i % 4 {
                    0 => object(c.pipeline_a, c.material_x),
                    1 => object(c.pipeline_b, MaterialId::default()),
                    2 => object(c.pipeline_b, c.material_y),
                    _ => object(c.pipeline_a, c.material_y),
                })
                .collect();
            let invalid = objects.iter().filter(|o| o.material == MaterialId::default()).count();

            let mut builder = RenderBatchBuilder::new();
            let build = builder.build(&objects, &c.pipelines, &c.materials);

            assert_eq!(build.plan.object_count(), len - invalid);
            assert_eq!(build.rejected.len(), invalid);
        }
    }
}
