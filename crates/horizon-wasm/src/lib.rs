use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use horizon_core::error::CollaboratorError;
use horizon_core::governor::DeviceProfile;
use horizon_core::host::{FrameContext, Updatable};
use horizon_core::{
    AppConfig, Application, HostBindings, LensingResult, LightRay, ParameterQueue, ParticleSpawn,
    QualityLevel, SimulationConfigPatch,
};
use wasm_bindgen::prelude::*;

mod host;

use host::{quality_name, AppSlot, JsHooks, JsNotifier, JsSurface, WebFrames, WebTimers};

/// Floats per particle in `add_particles`: x y z vx vy vz mass charge.
const SPAWN_STRIDE: usize = 8;
/// Floats per ray in `bend_rays`: ox oy oz dx dy dz.
const RAY_STRIDE: usize = 6;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();
}

/// GPU-compatible particle struct: 32 bytes, matches the WGSL `Particle`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParticle {
    position: [f32; 3], // 12 bytes
    id: u32,            //  4 bytes
    velocity: [f32; 3], // 12 bytes
    _pad: f32,          //  4 bytes
}

/// Copies every published snapshot into the GPU buffer.
struct GpuBufferWriter {
    buffer: Rc<RefCell<Vec<GpuParticle>>>,
}

impl Updatable for GpuBufferWriter {
    fn name(&self) -> &str {
        "gpu-buffer"
    }

    fn update(&mut self, frame: &FrameContext<'_>) -> Result<(), CollaboratorError> {
        let mut buffer = self.buffer.try_borrow_mut().map_err(|_| CollaboratorError::Update {
            name: self.name().to_string(),
            message: "buffer is borrowed".to_string(),
        })?;
        buffer.clear();
        buffer.extend(frame.snapshot.particles.iter().map(|p| GpuParticle {
            position: p.position.to_array(),
            id: p.id.0,
            velocity: p.velocity.to_array(),
            _pad: 0.0,
        }));
        Ok(())
    }
}

#[wasm_bindgen]
pub struct HorizonApp {
    app: Rc<RefCell<Application>>,
    gpu_buffer: Rc<RefCell<Vec<GpuParticle>>>,
    /// For configuration changes requested while a frame is running.
    parameters: ParameterQueue,
}

#[wasm_bindgen]
impl HorizonApp {
    /// `hooks` is an object of optional callbacks, see the `host` module.
    #[wasm_bindgen(constructor)]
    pub fn new(
        logical_cores: u32,
        memory_gb: f32,
        is_mobile: bool,
        hooks: &js_sys::Object,
    ) -> Result<HorizonApp, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let hooks = JsHooks::from_object(hooks);
        let slot = AppSlot::default();

        let config = AppConfig {
            device: DeviceProfile {
                logical_cores,
                memory_gb,
                is_mobile,
            },
            ..Default::default()
        };
        let bindings = HostBindings {
            frames: Box::new(WebFrames::new(window.clone(), slot.clone())),
            timers: Box::new(WebTimers::new(window, slot.clone())),
            surface: Box::new(JsSurface(hooks.clone())),
            notifier: Box::new(JsNotifier(hooks)),
        };
        let mut app = Application::new(config, bindings).map_err(to_js)?;

        let gpu_buffer = Rc::new(RefCell::new(Vec::new()));
        app.add_collaborator(Box::new(GpuBufferWriter {
            buffer: gpu_buffer.clone(),
        }));

        let parameters = app.parameter_queue();
        let app = Rc::new(RefCell::new(app));
        *slot.borrow_mut() = Rc::downgrade(&app);

        log::info!(
            "HorizonApp created: {} cores, {} GB, mobile={}",
            logical_cores,
            memory_gb,
            is_mobile
        );
        Ok(HorizonApp {
            app,
            gpu_buffer,
            parameters,
        })
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    #[wasm_bindgen]
    pub fn start(&self) {
        self.with_app(|app| app.start());
    }

    #[wasm_bindgen]
    pub fn pause(&self) {
        self.with_app(|app| app.pause());
    }

    #[wasm_bindgen]
    pub fn resume(&self) {
        self.with_app(|app| app.resume());
    }

    #[wasm_bindgen]
    pub fn dispose(&self) {
        self.with_app(|app| app.dispose());
        self.gpu_buffer.borrow_mut().clear();
    }

    #[wasm_bindgen]
    pub fn context_lost(&self) {
        self.with_app(|app| app.notify_context_lost());
    }

    #[wasm_bindgen]
    pub fn context_restored(&self) {
        self.with_app(|app| app.notify_context_restored());
    }

    // ─── Particles ───────────────────────────────────────────────

    /// Add a packed batch; returns how many entries were rejected.
    #[wasm_bindgen]
    pub fn add_particles(&self, data: &[f32]) -> u32 {
        let chunks = data.chunks_exact(SPAWN_STRIDE);
        let tail = chunks.remainder().len();
        if tail != 0 {
            log::warn!("add_particles: ignoring {} trailing floats", tail);
        }
        let batch: Vec<ParticleSpawn> = chunks
            .map(|c| ParticleSpawn {
                position: Vec3::new(c[0], c[1], c[2]),
                velocity: Vec3::new(c[3], c[4], c[5]),
                mass: c[6],
                charge: c[7],
            })
            .collect();
        self.with_app(|app| app.controller_mut().add_particles(&batch).rejected_count() as u32)
            .unwrap_or(batch.len() as u32)
    }

    /// Seed a deterministic accretion disk; returns how many were accepted.
    #[wasm_bindgen]
    pub fn add_accretion_disk(&self, count: u32, inner: f32, outer: f32, seed: u32) -> u32 {
        self.with_app(|app| {
            let controller = app.controller_mut();
            let body = *controller.central_body();
            let g = controller.config().gravitational_constant;
            let batch = ParticleSpawn::accretion_disk(count as usize, inner, outer, &body, g, seed);
            controller.add_particles(&batch).accepted_count() as u32
        })
        .unwrap_or(0)
    }

    #[wasm_bindgen]
    pub fn clear_particles(&self) {
        self.with_app(|app| app.controller_mut().clear_particles());
        self.gpu_buffer.borrow_mut().clear();
    }

    /// Valid until the next frame.
    #[wasm_bindgen]
    pub fn particle_buffer_ptr(&self) -> *const f32 {
        self.gpu_buffer.borrow().as_ptr() as *const f32
    }

    #[wasm_bindgen]
    pub fn particle_buffer_byte_length(&self) -> usize {
        self.gpu_buffer.borrow().len() * std::mem::size_of::<GpuParticle>()
    }

    #[wasm_bindgen]
    pub fn particle_count(&self) -> usize {
        self.read(|app| app.controller().counts().particle_count)
    }

    #[wasm_bindgen]
    pub fn captured_count(&self) -> usize {
        self.read(|app| app.controller().counts().captured_count)
    }

    /// Ids captured during the last frame.
    #[wasm_bindgen]
    pub fn captured_ids(&self) -> Vec<u32> {
        self.read(|app| app.controller().snapshot().captured_ids.iter().map(|id| id.0).collect())
    }

    #[wasm_bindgen]
    pub fn horizon_radius(&self) -> f32 {
        self.read(|app| app.controller().central_body().horizon_radius())
    }

    // ─── Configuration ───────────────────────────────────────────

    #[wasm_bindgen]
    pub fn set_central_mass(&self, mass: f32) -> Result<(), JsValue> {
        self.configure(SimulationConfigPatch {
            central_mass: Some(mass),
            ..Default::default()
        })
    }

    #[wasm_bindgen]
    pub fn set_gravity(&self, gravitational_constant: f32, speed_of_light: f32) -> Result<(), JsValue> {
        self.configure(SimulationConfigPatch {
            gravitational_constant: Some(gravitational_constant),
            speed_of_light: Some(speed_of_light),
            ..Default::default()
        })
    }

    #[wasm_bindgen]
    pub fn set_relativity(&self, enabled: bool, strength: f32) -> Result<(), JsValue> {
        self.configure(SimulationConfigPatch {
            include_relativity: Some(enabled),
            relativity_strength: Some(strength),
            ..Default::default()
        })
    }

    #[wasm_bindgen]
    pub fn set_nbody_config(&self, enabled: bool, softening: f32, theta: f32) -> Result<(), JsValue> {
        self.configure(SimulationConfigPatch {
            pairwise_gravity: Some(enabled),
            pairwise_softening: Some(softening),
            pairwise_theta: Some(theta),
            ..Default::default()
        })
    }

    #[wasm_bindgen]
    pub fn set_time_step(&self, fixed_timestep: f32, max_substeps: u32) -> Result<(), JsValue> {
        self.configure(SimulationConfigPatch {
            fixed_timestep: Some(fixed_timestep),
            max_substeps: Some(max_substeps),
            ..Default::default()
        })
    }

    #[wasm_bindgen]
    pub fn set_particle_capacity(&self, capacity: usize) -> Result<(), JsValue> {
        self.configure(SimulationConfigPatch {
            particle_capacity: Some(capacity),
            ..Default::default()
        })
    }

    // ─── Quality ─────────────────────────────────────────────────

    #[wasm_bindgen]
    pub fn quality(&self) -> String {
        self.read(|app| quality_name(app.quality())).to_string()
    }

    /// 0 = high, 1 = medium, anything else = low.
    #[wasm_bindgen]
    pub fn reset_quality(&self, level: u8) {
        let level = match level {
            0 => QualityLevel::High,
            1 => QualityLevel::Medium,
            _ => QualityLevel::Low,
        };
        self.with_app(|app| app.reset_quality(level));
    }

    /// Smoothed frame gap in milliseconds.
    #[wasm_bindgen]
    pub fn average_frame_gap(&self) -> f64 {
        self.read(|app| app.stats().average_gap_ms)
    }

    // ─── Lensing ─────────────────────────────────────────────────

    /// Bend packed rays. Output stride 4: dx dy dz deflection; absorbed rays
    /// come back as `0 0 0 -1`.
    #[wasm_bindgen]
    pub fn bend_rays(&self, rays: &[f32]) -> Vec<f32> {
        let rays: Vec<LightRay> = rays
            .chunks_exact(RAY_STRIDE)
            .map(|c| LightRay::new(Vec3::new(c[0], c[1], c[2]), Vec3::new(c[3], c[4], c[5])))
            .collect();
        let results = self.read(|app| app.bend_rays(&rays));

        let mut out = Vec::with_capacity(results.len() * 4);
        for result in &results {
            match result {
                LensingResult::Absorbed => out.extend_from_slice(&[0.0, 0.0, 0.0, -1.0]),
                other => {
                    let dir = other.direction().unwrap_or(Vec3::ZERO);
                    out.extend_from_slice(&[dir.x, dir.y, dir.z, other.deflection()]);
                }
            }
        }
        out
    }
}

impl HorizonApp {
    fn with_app<R>(&self, f: impl FnOnce(&mut Application) -> R) -> Option<R> {
        match self.app.try_borrow_mut() {
            Ok(mut app) => Some(f(&mut app)),
            Err(_) => {
                log::warn!("re-entrant call from a hook ignored");
                None
            }
        }
    }

    fn read<R: Default>(&self, f: impl FnOnce(&Application) -> R) -> R {
        match self.app.try_borrow() {
            Ok(app) => f(&app),
            Err(_) => R::default(),
        }
    }

    fn configure(&self, patch: SimulationConfigPatch) -> Result<(), JsValue> {
        match self.with_app(|app| app.configure(&patch)) {
            Some(result) => result.map_err(to_js),
            None => {
                // Called from inside a frame: clamped and applied before the next tick
                self.parameters.request(patch);
                Ok(())
            }
        }
    }
}

fn to_js(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
