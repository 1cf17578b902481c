//! Headless frame demo
//!
//! Drives the frame renderer over the simulated device: a field of spinning
//! objects spread over two pipelines and three materials, an orbiting camera,
//! and a scripted swapchain resize halfway through.
//!
//! Usage: `frame_demo [config.toml|config.ron]`

use frame_core::backends::simulated::{ScriptedSwapchain, SimulatedGpu};
use frame_core::foundation::logging;
use frame_core::prelude::*;
use frame_core::render::api::{BufferAllocator, MaterialResources, RecordStats};
use nalgebra::{Matrix4, Vector3};
use rand::Rng;

const FRAME_COUNT: u32 = 240;
const RESIZE_AT_FRAME: u32 = 120;
const OBJECT_COUNT: usize = 24;
const FRAME_TICKS: u64 = 16; // ~60 FPS on the simulated clock
const GPU_LATENCY_TICKS: u64 = 40;

type DemoRenderer = FrameRenderer<SimulatedGpu, SimulatedGpu, ScriptedSwapchain>;

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("{0} synchronization hazard(s) detected")]
    Hazards(usize),

    #[error("{0} device object(s) leaked")]
    Leaked(usize),
}

/// A spinning object in the demo scene
struct SceneObject {
    position: Vector3<f32>,
    axis: Vector3<f32>,
    spin_speed: f32,
    scale: f32,
    object: RenderableObject,
}

impl SceneObject {
    fn update(&mut self, time: f32) {
        let rotation = Matrix4::new_rotation(self.axis * (self.spin_speed * time));
        self.object.transform =
            Matrix4::new_translation(&self.position) * rotation * Matrix4::new_scaling(self.scale);
    }
}

#[derive(Default)]
struct Totals {
    presented: u32,
    skipped: u32,
    failed: u32,
    recreations: u32,
    stats: RecordStats,
}

impl Totals {
    fn add(&mut self, stats: &RecordStats) {
        self.stats.pipeline_binds += stats.pipeline_binds;
        self.stats.descriptor_binds += stats.descriptor_binds;
        self.stats.mesh_binds += stats.mesh_binds;
        self.stats.draws += stats.draws;
    }
}

fn load_config() -> Result<RendererConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => RendererConfig::load_from_file(&path),
        None => Ok(RendererConfig::default()),
    }
}

fn build_scene(renderer: &mut DemoRenderer, gpu: &mut SimulatedGpu) -> Result<(Vec<SceneObject>, Vec<MeshBuffers>), DemoError> {
    let stages = ash::vk::ShaderStageFlags::VERTEX;
    let solid = renderer
        .pipelines_mut()
        .register("solid", gpu.create_pipeline(stages), DrawType::Triangles);
    let wireframe = renderer
        .pipelines_mut()
        .register("wireframe", gpu.create_pipeline(stages), DrawType::Lines);

    let plain = renderer
        .materials_mut()
        .register("plain", MaterialResources::default());
    let textured = renderer.materials_mut().register(
        "textured",
        MaterialResources {
            descriptor_sets: vec![gpu.create_material_set()],
        },
    );

    let cube = gpu.create_mesh(24, 36)?;
    let sphere = gpu.create_mesh(482, 2880)?;
    let combinations = [(solid, plain, cube), (solid, textured, sphere), (wireframe, plain, cube)];

    let mut rng = rand::thread_rng();
    let objects = (0..OBJECT_COUNT)
        .map(|_| {
            let (pipeline, material, mesh) = combinations[rng.gen_range(0..combinations.len())];
            let axis = Vector3::new(rng.gen_range(-1.0..1.0), 1.0, rng.gen_range(-1.0..1.0)).normalize();
            SceneObject {
                position: Vector3::new(rng.gen_range(-4.0..4.0), rng.gen_range(-1.0..1.0), rng.gen_range(-4.0..4.0)),
                axis,
                spin_speed: rng.gen_range(0.5..2.0),
                scale: rng.gen_range(0.2..0.6),
                object: RenderableObject::new(mesh, pipeline, material),
            }
        })
        .collect();

    log::info!(
        "Scene ready: {} object(s), {} pipeline(s), {} material(s)",
        OBJECT_COUNT,
        renderer.pipelines().len(),
        renderer.materials().len()
    );
    Ok((objects, vec![cube, sphere]))
}

fn run() -> Result<(), DemoError> {
    let config = load_config()?;
    logging::init(&config.log_level);
    log::info!("Starting frame demo with {:?}", config);

    let mut gpu = SimulatedGpu::new(GPU_LATENCY_TICKS);
    let mut swapchain = ScriptedSwapchain::new(3);
    let mut renderer = FrameRenderer::initialize(config, gpu.clone(), gpu.clone(), swapchain.clone())?;
    let (mut scene, meshes) = build_scene(&mut renderer, &mut gpu)?;

    let mut camera = Camera::default();
    let mut totals = Totals::default();

    for frame in 0..FRAME_COUNT {
        let time = frame as f32 / 60.0;
        gpu.advance(FRAME_TICKS);

        if frame == RESIZE_AT_FRAME {
            log::info!("Simulating a window resize");
            swapchain.script_acquire_stale();
        }

        camera.set_position(Point3::new(8.0 * time.cos(), 3.0, 8.0 * time.sin()));
        for object in &mut scene {
            object.update(time);
        }
        let objects: Vec<RenderableObject> = scene.iter().map(|o| o.object.clone()).collect();

        let result = renderer.run_frame_with_camera(&camera, time, &objects)?;
        for rejected in result.rejected() {
            log::warn!("{}", rejected);
        }
        match result {
            FrameResult::Ok(report) => {
                totals.presented += 1;
                totals.add(&report.stats);
            }
            FrameResult::NeedsRecreation { .. } => {
                totals.recreations += 1;
                swapchain = ScriptedSwapchain::new(2).with_extent(1920, 1080);
                renderer.recreate_swapchain(swapchain.clone())?;
            }
            FrameResult::Skipped(e) => {
                totals.skipped += 1;
                log::warn!("Frame {} skipped: {}", frame, e);
            }
            FrameResult::RecordingFailed { error, .. } => {
                totals.failed += 1;
                log::error!("Frame {} failed: {}", frame, error);
            }
        }

        if frame % 60 == 59 {
            log::info!(
                "Frame {}: clock {} tick(s), {} submission(s) pending",
                frame + 1,
                gpu.now(),
                gpu.pending_submissions()
            );
        }
    }

    let presented = totals.presented.max(1) as usize;
    log::info!(
        "{} presented, {} skipped, {} failed, {} recreation(s)",
        totals.presented,
        totals.skipped,
        totals.failed,
        totals.recreations
    );
    log::info!(
        "Per frame: {} draw(s), {} pipeline bind(s), {} descriptor bind(s), {} mesh bind(s)",
        totals.stats.draws / presented,
        totals.stats.pipeline_binds / presented,
        totals.stats.descriptor_binds / presented,
        totals.stats.mesh_binds / presented
    );

    let (_, mut allocator, _) = renderer.shutdown()?;
    for mesh in meshes {
        allocator.free(mesh.vertex_buffer);
        allocator.free(mesh.index_buffer);
    }

    let hazards = gpu.hazards();
    for hazard in &hazards {
        log::error!("{:?}", hazard);
    }
    if !hazards.is_empty() {
        return Err(DemoError::Hazards(hazards.len()));
    }

    let leaked = gpu.live_objects().total();
    if leaked > 0 {
        return Err(DemoError::Leaked(leaked));
    }

    log::info!("Frame demo finished cleanly");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("Frame demo failed: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
