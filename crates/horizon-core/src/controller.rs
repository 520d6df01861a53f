use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::body::CentralBody;
use crate::config::{SimulationConfig, SimulationConfigPatch};
use crate::error::{panic_message, ConfigError, ObserverError, RejectReason};
use crate::integrator;
use crate::lensing::{self, LensingResult, LightRay};
use crate::particle::{ParticleId, ParticleSet, ParticleSpawn};
use crate::snapshot::{FrameSnapshot, ParticleCounts};

/// Lifecycle of the controller.
///
/// `Stopped -> Running <-> Paused -> Stopped`; `Disposed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Running,
    Paused,
    Disposed,
}

/// Result of `add_particles`: accepted ids plus every rejected entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddReport {
    pub accepted: Vec<ParticleId>,
    /// `(index into the batch, reason)`
    pub rejected: Vec<(usize, RejectReason)>,
}

impl AddReport {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Per-tick bookkeeping, for logging and the frame stats overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickReport {
    pub substeps: u32,
    pub captured: usize,
    /// Time dropped because the substep cap was hit.
    pub dropped_seconds: f32,
}

/// Observer called with each published snapshot.
///
/// Report failures with `Err`. Panics are caught where unwinding is
/// available; on `wasm32-unknown-unknown` a panic aborts the module.
pub type UpdateCallback = Box<dyn FnMut(&FrameSnapshot) -> Result<(), ObserverError>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

/// Cloneable handle for requesting config changes from inside an observer.
///
/// Patches queued here are validated and applied at the start of the next
/// tick, never in the middle of a step.
#[derive(Clone, Default)]
pub struct ParameterQueue {
    pending: Rc<RefCell<VecDeque<SimulationConfigPatch>>>,
}

impl ParameterQueue {
    pub fn request(&self, patch: SimulationConfigPatch) {
        self.pending.borrow_mut().push_back(patch);
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    pub(crate) fn drain(&self) -> Vec<SimulationConfigPatch> {
        self.pending.borrow_mut().drain(..).collect()
    }
}

/// Owns the particles and runs the fixed-timestep simulation loop.
pub struct PhysicsController {
    state: ControllerState,
    config: SimulationConfig,
    body: CentralBody,
    particles: ParticleSet,
    next_id: u32,
    accumulator: f32,
    /// Ids captured since the last published snapshot.
    pending_captured: Vec<ParticleId>,
    captured_total: usize,
    snapshot: FrameSnapshot,
    observers: Vec<(ObserverId, UpdateCallback)>,
    next_observer: u32,
    parameters: ParameterQueue,
}

impl PhysicsController {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let body = CentralBody::from_config(&config);
        Ok(Self {
            state: ControllerState::Stopped,
            particles: ParticleSet::with_capacity(config.particle_capacity),
            body,
            config,
            next_id: 0,
            accumulator: 0.0,
            pending_captured: Vec::new(),
            captured_total: 0,
            snapshot: FrameSnapshot::default(),
            observers: Vec::new(),
            next_observer: 0,
            parameters: ParameterQueue::default(),
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn central_body(&self) -> &CentralBody {
        &self.body
    }

    /// Last published snapshot.
    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn counts(&self) -> ParticleCounts {
        ParticleCounts {
            particle_count: self.particles.len(),
            captured_count: self.captured_total,
        }
    }

    pub fn parameter_queue(&self) -> ParameterQueue {
        self.parameters.clone()
    }

    pub fn start(&mut self) {
        match self.state {
            ControllerState::Stopped | ControllerState::Paused => {
                log::info!("physics controller running");
                self.state = ControllerState::Running;
            }
            ControllerState::Running => {}
            ControllerState::Disposed => log::warn!("start() on a disposed controller ignored"),
        }
    }

    pub fn pause(&mut self) {
        if self.state == ControllerState::Running {
            self.state = ControllerState::Paused;
        }
    }

    /// Halt stepping and drop any accumulated time. Particles are kept.
    pub fn stop(&mut self) {
        if self.state != ControllerState::Disposed {
            self.state = ControllerState::Stopped;
            self.accumulator = 0.0;
        }
    }

    /// Terminal: drops particles and observers. Every later call is a no-op.
    pub fn dispose(&mut self) {
        if self.state == ControllerState::Disposed {
            return;
        }
        self.state = ControllerState::Disposed;
        self.particles.clear();
        self.pending_captured.clear();
        self.observers.clear();
        self.accumulator = 0.0;
        log::info!("physics controller disposed");
    }

    /// Validate and append a batch.
    ///
    /// Invalid entries are rejected individually; once `particle_capacity`
    /// is reached the remaining valid entries are rejected with
    /// `CapacityExceeded`. Nothing is silently dropped.
    pub fn add_particles(&mut self, batch: &[ParticleSpawn]) -> AddReport {
        let mut report = AddReport::default();
        if self.state == ControllerState::Disposed {
            report
                .rejected
                .extend((0..batch.len()).map(|i| (i, RejectReason::Disposed)));
            return report;
        }

        for (i, spawn) in batch.iter().enumerate() {
            if let Err(reason) = spawn.validate() {
                report.rejected.push((i, reason));
                continue;
            }
            if self.particles.len() >= self.config.particle_capacity {
                report.rejected.push((i, RejectReason::CapacityExceeded));
                continue;
            }
            let id = ParticleId(self.next_id);
            self.next_id = self.next_id.wrapping_add(1);
            self.particles.push(id, spawn);
            report.accepted.push(id);
        }

        if !report.is_complete() {
            log::warn!(
                "add_particles: accepted {}, rejected {}",
                report.accepted_count(),
                report.rejected_count()
            );
        }
        report
    }

    /// Remove every particle. Ids are not reused.
    pub fn clear_particles(&mut self) {
        self.particles.clear();
        self.pending_captured.clear();
        self.accumulator = 0.0;
    }

    /// Merge `patch` into the config. On error the previous config is kept.
    pub fn set_parameters(&mut self, patch: &SimulationConfigPatch) -> Result<(), ConfigError> {
        if self.state == ControllerState::Disposed {
            return Err(ConfigError::Disposed);
        }
        let next = self.config.merged(patch)?;
        if next.particle_capacity < self.particles.len() {
            log::warn!(
                "particle_capacity lowered to {} below {} live particles; existing ones are kept",
                next.particle_capacity,
                self.particles.len()
            );
        }
        self.body = CentralBody::from_config(&next);
        self.config = next;
        Ok(())
    }

    /// Register an observer called once per tick with the new snapshot.
    pub fn on_update<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&FrameSnapshot) -> Result<(), ObserverError> + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(callback)));
        id
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Advance the simulation by `elapsed` seconds of wall time.
    ///
    /// Time accumulates and is consumed in `fixed_timestep` slices, at most
    /// `max_substeps` per call. When the cap is hit, at most one slice of
    /// leftover carries over; the rest is dropped so a frame-rate collapse
    /// cannot snowball.
    pub fn step(&mut self, elapsed: f32) -> TickReport {
        let mut report = TickReport::default();
        if self.state != ControllerState::Running {
            return report;
        }
        if elapsed.is_finite() && elapsed > 0.0 {
            self.accumulator += elapsed;
        }

        let dt = self.config.fixed_timestep;
        while self.accumulator >= dt && report.substeps < self.config.max_substeps {
            let outcome = integrator::step(&mut self.particles, &self.body, dt, &self.config);
            if outcome.captured > 0 {
                let before = self.pending_captured.len();
                self.particles.compact(&mut self.pending_captured);
                report.captured += self.pending_captured.len() - before;
            }
            self.accumulator -= dt;
            report.substeps += 1;
        }

        if report.substeps == self.config.max_substeps && self.accumulator > dt {
            report.dropped_seconds = self.accumulator - dt;
            self.accumulator = dt;
            log::debug!(
                "substep cap hit, dropped {:.3}s of simulation time",
                report.dropped_seconds
            );
        }

        self.captured_total += report.captured;
        report
    }

    /// One external frame: apply deferred parameters, step, publish.
    ///
    /// Observers are only notified while running. Their failures and panics
    /// are logged and never reach the caller.
    pub fn tick(&mut self, elapsed: f32) -> TickReport {
        self.apply_queued_parameters();
        if self.state != ControllerState::Running {
            return TickReport::default();
        }

        let report = self.step(elapsed);
        self.publish(report.substeps as f32 * self.config.fixed_timestep);
        report
    }

    fn apply_queued_parameters(&mut self) {
        for patch in self.parameters.drain() {
            if let Err(err) = self.set_parameters(&patch) {
                log::warn!("queued parameter change rejected: {err}");
            }
        }
    }

    fn publish(&mut self, simulated: f32) {
        self.snapshot.frame += 1;
        self.snapshot.simulated = simulated;
        self.snapshot.fill(&self.particles);
        self.snapshot.captured_ids.clear();
        self.snapshot.captured_ids.append(&mut self.pending_captured);
        self.snapshot.counts = self.counts();

        let snapshot = &self.snapshot;
        for (id, observer) in self.observers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| observer(snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::warn!("observer {:?}: {err}", id),
                Err(payload) => log::warn!(
                    "observer {:?}: {}",
                    id,
                    ObserverError::Panicked(panic_message(payload.as_ref()))
                ),
            }
        }
    }

    /// Bend `rays` around the central body and hand the result to `callback`.
    ///
    /// Runs synchronously. The callback always receives one result per ray:
    /// if the solver panics the rays pass through unchanged.
    pub fn calculate_lensing<F>(&self, rays: &[LightRay], strength: f32, callback: F)
    where
        F: FnOnce(Vec<LensingResult>) -> Result<(), ObserverError>,
    {
        let body = self.body;
        let results = match catch_unwind(|| lensing::bend(rays, &body, strength)) {
            Ok(results) if results.len() == rays.len() => results,
            Ok(_) => lensing::passthrough(rays),
            Err(payload) => {
                log::warn!("lensing solver failed: {}", panic_message(payload.as_ref()));
                lensing::passthrough(rays)
            }
        };

        match catch_unwind(AssertUnwindSafe(move || callback(results))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("lensing callback: {err}"),
            Err(payload) => log::warn!("lensing callback panicked: {}", panic_message(payload.as_ref())),
        }
    }
}
