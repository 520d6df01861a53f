//! WebGL context-loss recovery.
//!
//! A pure state machine: every input returns the commands the application
//! must carry out (pause frames, schedule the next attempt, show a notice).
//! Timers and probes live in the host.

/// Health of the rendering context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    Healthy,
    Lost,
    Recovering,
    /// Terminal until the page is reloaded.
    Failed,
}

/// User-facing message the notifier should show.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Non-blocking: rendering paused, recovery in progress.
    ContextLost,
    /// Terminal: recommend a reload.
    ContextFailed,
    /// Terminal: the frame loop stopped after repeated faults.
    LoopHalted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryCommand {
    PauseFrames,
    ResumeFrames,
    ShowNotice(Notice),
    ClearNotice,
    /// Arm the attempt timer for `attempt`, firing after `delay_ms`.
    ScheduleAttempt { attempt: u32, delay_ms: u32 },
    CancelAttempt,
    /// GPU-side resources must be rebuilt by the render collaborator.
    RebuildResources,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecoveryConfig {
    pub base_delay_ms: u32,
    pub max_delay_ms: u32,
    pub max_recovery_attempts: u32,
    /// Interval of the periodic context probe.
    pub health_check_interval_ms: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            max_recovery_attempts: 5,
            health_check_interval_ms: 10_000,
        }
    }
}

impl RecoveryConfig {
    /// Delay before attempt `attempt` (1-based): `min(cap, base * 2^(attempt-1))`.
    pub fn backoff_delay(&self, attempt: u32) -> u32 {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = (self.base_delay_ms as u64) << exponent;
        delay.min(self.max_delay_ms as u64) as u32
    }
}

pub struct ContextRecoveryManager {
    pub config: RecoveryConfig,
    state: ContextState,
    attempts: u32,
}

impl ContextRecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            state: ContextState::Healthy,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Context-loss signal from the surface, or a failed health probe.
    pub fn on_context_lost(&mut self) -> Vec<RecoveryCommand> {
        if self.state != ContextState::Healthy {
            return Vec::new();
        }
        log::warn!("rendering context lost, pausing frames");
        self.state = ContextState::Lost;
        self.attempts = 0;
        vec![
            RecoveryCommand::PauseFrames,
            RecoveryCommand::ShowNotice(Notice::ContextLost),
            self.schedule_next(),
        ]
    }

    /// The attempt timer fired; the caller probes the surface next and
    /// reports through [`ContextRecoveryManager::on_probe_result`].
    ///
    /// Returns `false` when no attempt is due (restored or failed meanwhile).
    pub fn begin_attempt(&mut self) -> bool {
        match self.state {
            ContextState::Lost | ContextState::Recovering => {
                self.state = ContextState::Recovering;
                self.attempts += 1;
                log::info!(
                    "context recovery attempt {} of {}",
                    self.attempts,
                    self.config.max_recovery_attempts
                );
                true
            }
            ContextState::Healthy | ContextState::Failed => false,
        }
    }

    pub fn on_probe_result(&mut self, ok: bool) -> Vec<RecoveryCommand> {
        if self.state != ContextState::Recovering {
            return Vec::new();
        }
        if ok {
            return self.recovered();
        }
        if self.attempts < self.config.max_recovery_attempts {
            return vec![self.schedule_next()];
        }
        log::error!(
            "rendering context not restored after {} attempts",
            self.attempts
        );
        self.state = ContextState::Failed;
        vec![RecoveryCommand::ShowNotice(Notice::ContextFailed)]
    }

    /// Context-restored signal from the surface.
    pub fn on_context_restored(&mut self) -> Vec<RecoveryCommand> {
        match self.state {
            ContextState::Lost | ContextState::Recovering => {
                let mut commands = vec![RecoveryCommand::CancelAttempt];
                commands.extend(self.recovered());
                commands
            }
            ContextState::Healthy | ContextState::Failed => Vec::new(),
        }
    }

    /// Result of the periodic probe. Only acts while healthy.
    pub fn on_health_check(&mut self, ok: bool) -> Vec<RecoveryCommand> {
        if ok || self.state != ContextState::Healthy {
            return Vec::new();
        }
        log::warn!("health check failed without a context-loss event");
        self.on_context_lost()
    }

    fn schedule_next(&self) -> RecoveryCommand {
        let attempt = self.attempts + 1;
        RecoveryCommand::ScheduleAttempt {
            attempt,
            delay_ms: self.config.backoff_delay(attempt),
        }
    }

    fn recovered(&mut self) -> Vec<RecoveryCommand> {
        log::info!("rendering context restored");
        self.state = ContextState::Healthy;
        self.attempts = 0;
        vec![
            RecoveryCommand::ClearNotice,
            RecoveryCommand::ResumeFrames,
            RecoveryCommand::RebuildResources,
        ]
    }
}

impl Default for ContextRecoveryManager {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = RecoveryConfig::default();
        assert_eq!(config.backoff_delay(1), 500);
        assert_eq!(config.backoff_delay(2), 1000);
        assert_eq!(config.backoff_delay(3), 2000);
        assert_eq!(config.backoff_delay(7), 30_000);
        assert_eq!(config.backoff_delay(40), 30_000);
    }

    #[test]
    fn test_loss_pauses_and_schedules_first_attempt() {
        let mut m = ContextRecoveryManager::default();
        let cmds = m.on_context_lost();
        assert_eq!(m.state(), ContextState::Lost);
        assert_eq!(
            cmds,
            vec![
                RecoveryCommand::PauseFrames,
                RecoveryCommand::ShowNotice(Notice::ContextLost),
                RecoveryCommand::ScheduleAttempt {
                    attempt: 1,
                    delay_ms: 500
                },
            ]
        );
        // Repeated signal while lost is ignored
        assert!(m.on_context_lost().is_empty());
    }

    #[test]
    fn test_successful_probe_restores() {
        let mut m = ContextRecoveryManager::default();
        m.on_context_lost();
        assert!(m.begin_attempt());
        assert_eq!(m.state(), ContextState::Recovering);
        let cmds = m.on_probe_result(true);
        assert_eq!(m.state(), ContextState::Healthy);
        assert!(cmds.contains(&RecoveryCommand::ResumeFrames));
        assert!(cmds.contains(&RecoveryCommand::RebuildResources));
        assert!(cmds.contains(&RecoveryCommand::ClearNotice));
    }

    #[test]
    fn test_restored_signal_cancels_pending_attempt() {
        let mut m = ContextRecoveryManager::default();
        m.on_context_lost();
        let cmds = m.on_context_restored();
        assert_eq!(cmds[0], RecoveryCommand::CancelAttempt);
        assert_eq!(m.state(), ContextState::Healthy);
        assert!(!m.begin_attempt());
    }

    #[test]
    fn test_exhausted_attempts_fail_terminally() {
        let mut m = ContextRecoveryManager::default();
        m.on_context_lost();
        for attempt in 1..=5 {
            assert!(m.begin_attempt());
            let cmds = m.on_probe_result(false);
            if attempt < 5 {
                assert_eq!(
                    cmds,
                    vec![RecoveryCommand::ScheduleAttempt {
                        attempt: attempt + 1,
                        delay_ms: m.config.backoff_delay(attempt + 1),
                    }]
                );
            } else {
                assert_eq!(cmds, vec![RecoveryCommand::ShowNotice(Notice::ContextFailed)]);
            }
        }
        assert_eq!(m.state(), ContextState::Failed);
        assert!(!m.begin_attempt());
        assert!(m.on_context_restored().is_empty());
        assert!(m.on_context_lost().is_empty());
        assert_eq!(m.state(), ContextState::Failed);
    }

    #[test]
    fn test_failed_health_check_forces_loss() {
        let mut m = ContextRecoveryManager::default();
        assert!(m.on_health_check(true).is_empty());
        let cmds = m.on_health_check(false);
        assert_eq!(m.state(), ContextState::Lost);
        assert_eq!(cmds[0], RecoveryCommand::PauseFrames);
    }
}
