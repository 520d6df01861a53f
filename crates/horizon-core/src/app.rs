use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::config::{SimulationConfig, SimulationConfigPatch};
use crate::controller::{ParameterQueue, PhysicsController};
use crate::error::{panic_message, CollaboratorError, ConfigError};
use crate::governor::{
    DeviceProfile, FrameStats, GovernorAction, GovernorConfig, PerformanceGovernor, QualityLevel,
};
use crate::host::{
    FrameContext, FrameHost, RenderSurface, TimerHost, TimerId, TimerKind, Updatable, UserNotifier,
};
use crate::lensing::{LensingResult, LightRay};
use crate::recovery::{ContextRecoveryManager, ContextState, Notice, RecoveryCommand, RecoveryConfig};
use crate::scheduler::{FrameConfig, FrameScheduler, LoopState};

/// Everything the application needs at construction. No global lookups.
#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub governor: GovernorConfig,
    pub recovery: RecoveryConfig,
    pub frame: FrameConfig,
    pub device: DeviceProfile,
    /// Multiplier on the lensing deflection.
    pub lensing_strength: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            governor: GovernorConfig::default(),
            recovery: RecoveryConfig::default(),
            frame: FrameConfig::default(),
            device: DeviceProfile::default(),
            lensing_strength: 1.0,
        }
    }
}

/// Host-side implementations the application drives.
pub struct HostBindings {
    pub frames: Box<dyn FrameHost>,
    pub timers: Box<dyn TimerHost>,
    pub surface: Box<dyn RenderSurface>,
    pub notifier: Box<dyn UserNotifier>,
}

/// One frame loop around the simulation, with degraded-mode control.
pub struct Application {
    controller: PhysicsController,
    governor: PerformanceGovernor,
    recovery: ContextRecoveryManager,
    scheduler: FrameScheduler,
    host: HostBindings,
    collaborators: Vec<Box<dyn Updatable>>,
    /// Substep cap from the simulation config, before quality limits.
    base_max_substeps: u32,
    lensing_strength: f32,
    attempt_timer: Option<TimerId>,
    health_timer: Option<TimerId>,
    stats: FrameStats,
    /// Set by `pause`, cleared by `start`/`resume`. Recovery never overrides it.
    user_paused: bool,
    /// Changes requested while the application is borrowed by a frame.
    parameters: ParameterQueue,
    disposed: bool,
}

impl Application {
    pub fn new(config: AppConfig, host: HostBindings) -> Result<Self, ConfigError> {
        let base_max_substeps = config.simulation.max_substeps;
        let controller = PhysicsController::new(config.simulation)?;
        let initial = QualityLevel::for_device(&config.device);
        log::info!("starting at {:?} quality for {:?}", initial, config.device);

        let mut app = Self {
            controller,
            governor: PerformanceGovernor::new(config.governor, initial),
            recovery: ContextRecoveryManager::new(config.recovery),
            scheduler: FrameScheduler::new(config.frame),
            host,
            collaborators: Vec::new(),
            base_max_substeps,
            lensing_strength: config.lensing_strength,
            attempt_timer: None,
            health_timer: None,
            stats: FrameStats::default(),
            user_paused: false,
            parameters: ParameterQueue::default(),
            disposed: false,
        };
        app.apply_quality(initial);
        Ok(app)
    }

    pub fn controller(&self) -> &PhysicsController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PhysicsController {
        &mut self.controller
    }

    pub fn quality(&self) -> QualityLevel {
        self.governor.quality()
    }

    pub fn context_state(&self) -> ContextState {
        self.recovery.state()
    }

    pub fn loop_state(&self) -> LoopState {
        self.scheduler.state()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn add_collaborator(&mut self, collaborator: Box<dyn Updatable>) {
        self.collaborators.push(collaborator);
    }

    /// Change simulation parameters. The substep cap is still limited by the
    /// current quality tier. A rejected patch changes nothing.
    pub fn configure(&mut self, patch: &SimulationConfigPatch) -> Result<(), ConfigError> {
        // Validate the caller's value, not the clamped one
        self.controller.config().merged(patch)?;
        let mut clamped = patch.clone();
        if let Some(max) = patch.max_substeps {
            let tier = self.governor.quality().settings().max_substeps;
            clamped.max_substeps = Some(max.min(tier));
        }
        self.controller.set_parameters(&clamped)?;
        if let Some(max) = patch.max_substeps {
            self.base_max_substeps = max;
        }
        Ok(())
    }

    /// Handle for configuration changes requested while a frame is running.
    /// Queued patches go through [`Application::configure`] before the next
    /// tick.
    pub fn parameter_queue(&self) -> ParameterQueue {
        self.parameters.clone()
    }

    pub fn start(&mut self) {
        if self.disposed {
            return;
        }
        self.user_paused = false;
        self.controller.start();
        self.scheduler.start(self.host.frames.as_mut());
        if self.health_timer.is_none() {
            self.schedule_health_check();
        }
    }

    /// Pause on request of the page (hidden tab, modal open).
    pub fn pause(&mut self) {
        self.user_paused = true;
        self.scheduler.pause(self.host.frames.as_mut());
        self.controller.pause();
    }

    pub fn resume(&mut self) {
        if self.recovery.state() != ContextState::Healthy {
            log::debug!("resume ignored while the context is not healthy");
            return;
        }
        self.user_paused = false;
        self.scheduler.resume(self.host.frames.as_mut());
        if self.scheduler.state() == LoopState::Running {
            self.controller.start();
        }
    }

    /// Explicit upward recovery of the quality tier.
    pub fn reset_quality(&mut self, level: QualityLevel) {
        self.governor.reset(level);
        self.apply_quality(level);
    }

    /// Run one frame. Never panics or returns an error to the host.
    pub fn frame(&mut self, now_ms: f64) {
        if self.disposed {
            return;
        }
        let Some(timing) = self.scheduler.begin_frame(now_ms) else {
            return;
        };

        if let Some(gap) = timing.gap_ms {
            match self.governor.observe_gap(gap) {
                GovernorAction::None => {}
                GovernorAction::ReduceQuality(level) => self.apply_quality(level),
                GovernorAction::RecreateSurface => self.host.surface.request_surface_recreate(),
                GovernorAction::DisableLoop => {
                    self.halt();
                    return;
                }
            }
        }

        self.apply_queued_parameters();
        let report = self.controller.tick(timing.delta);

        let context = FrameContext {
            now_ms,
            delta: timing.delta,
            quality: self.governor.quality(),
            snapshot: self.controller.snapshot(),
        };
        let mut faulted = false;
        for collaborator in self.collaborators.iter_mut() {
            if let Err(err) = run_collaborator(collaborator.as_mut(), &context) {
                log::warn!("{err}");
                faulted = true;
            }
        }

        let counts = self.controller.counts();
        self.stats = FrameStats {
            frame: self.scheduler.frames(),
            average_gap_ms: self.governor.average_gap_ms(),
            substeps: report.substeps,
            particle_count: counts.particle_count,
            captured_count: counts.captured_count,
        };

        if !self.scheduler.end_frame(self.host.frames.as_mut(), faulted) {
            self.controller.pause();
            self.host.notifier.show(Notice::LoopHalted);
        }
    }

    /// Bend `rays` with the configured strength. Lensing is skipped (rays
    /// pass through) when the current tier disables it.
    pub fn bend_rays(&self, rays: &[LightRay]) -> Vec<LensingResult> {
        let mut out = Vec::new();
        let strength = if self.governor.quality().settings().lensing_enabled {
            self.lensing_strength
        } else {
            0.0
        };
        self.controller.calculate_lensing(rays, strength, |results| {
            out = results;
            Ok(())
        });
        out
    }

    pub fn notify_context_lost(&mut self) {
        let commands = self.recovery.on_context_lost();
        self.execute(commands);
    }

    pub fn notify_context_restored(&mut self) {
        let commands = self.recovery.on_context_restored();
        self.execute(commands);
    }

    /// A timer scheduled through `TimerHost` fired.
    pub fn on_timer(&mut self, id: TimerId) {
        if self.disposed {
            return;
        }
        if self.attempt_timer == Some(id) {
            self.attempt_timer = None;
            if self.recovery.begin_attempt() {
                let ok = self.host.surface.probe_health();
                let commands = self.recovery.on_probe_result(ok);
                self.execute(commands);
            }
        } else if self.health_timer == Some(id) {
            self.health_timer = None;
            if self.recovery.state() == ContextState::Healthy
                && self.scheduler.state() == LoopState::Running
            {
                let ok = self.host.surface.probe_health();
                let commands = self.recovery.on_health_check(ok);
                self.execute(commands);
            }
            if self.recovery.state() != ContextState::Failed {
                self.schedule_health_check();
            }
        } else {
            log::debug!("stale timer {:?} ignored", id);
        }
    }

    /// Halt the loop, cancel every timer and drop the simulation. Final.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.scheduler.halt(self.host.frames.as_mut());
        if let Some(id) = self.attempt_timer.take() {
            self.host.timers.cancel(id);
        }
        if let Some(id) = self.health_timer.take() {
            self.host.timers.cancel(id);
        }
        self.controller.dispose();
        self.collaborators.clear();
        self.disposed = true;
        log::info!("application disposed");
    }

    fn halt(&mut self) {
        self.scheduler.halt(self.host.frames.as_mut());
        self.controller.pause();
        self.host.notifier.show(Notice::LoopHalted);
    }

    fn execute(&mut self, commands: Vec<RecoveryCommand>) {
        for command in commands {
            match command {
                RecoveryCommand::PauseFrames => {
                    self.scheduler.pause(self.host.frames.as_mut());
                    self.controller.pause();
                }
                RecoveryCommand::ResumeFrames if self.user_paused => {
                    log::debug!("context recovered, staying paused");
                }
                RecoveryCommand::ResumeFrames => {
                    self.scheduler.resume(self.host.frames.as_mut());
                    if self.scheduler.state() == LoopState::Running {
                        self.controller.start();
                    }
                }
                RecoveryCommand::ShowNotice(notice) => self.host.notifier.show(notice),
                RecoveryCommand::ClearNotice => self.host.notifier.clear(),
                RecoveryCommand::ScheduleAttempt { attempt, delay_ms } => {
                    if let Some(old) = self.attempt_timer.take() {
                        self.host.timers.cancel(old);
                    }
                    log::debug!("recovery attempt {attempt} in {delay_ms}ms");
                    self.attempt_timer =
                        Some(self.host.timers.schedule(TimerKind::RecoveryAttempt, delay_ms));
                }
                RecoveryCommand::CancelAttempt => {
                    if let Some(id) = self.attempt_timer.take() {
                        self.host.timers.cancel(id);
                    }
                }
                RecoveryCommand::RebuildResources => self.host.surface.request_resource_rebuild(),
            }
        }
    }

    fn apply_queued_parameters(&mut self) {
        for patch in self.parameters.drain() {
            if let Err(err) = self.configure(&patch) {
                log::warn!("queued parameter change rejected: {err}");
            }
        }
    }

    fn schedule_health_check(&mut self) {
        let delay = self.recovery.config.health_check_interval_ms;
        self.health_timer = Some(self.host.timers.schedule(TimerKind::HealthCheck, delay));
    }

    fn apply_quality(&mut self, level: QualityLevel) {
        let settings = level.settings();
        let patch = SimulationConfigPatch {
            max_substeps: Some(self.base_max_substeps.min(settings.max_substeps)),
            ..Default::default()
        };
        if let Err(err) = self.controller.set_parameters(&patch) {
            log::warn!("quality {:?} substep cap rejected: {err}", level);
        }
        self.host.surface.apply_quality(level, &settings);
    }
}

fn run_collaborator(
    collaborator: &mut dyn Updatable,
    context: &FrameContext<'_>,
) -> Result<(), CollaboratorError> {
    match catch_unwind(AssertUnwindSafe(|| collaborator.update(context))) {
        Ok(result) => result,
        Err(payload) => Err(CollaboratorError::Panicked {
            name: collaborator.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}
