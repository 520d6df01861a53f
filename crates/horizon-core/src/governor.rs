/// Rendering quality tier, ordered from most to least expensive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityLevel {
    High,
    Medium,
    Low,
}

impl QualityLevel {
    /// One tier cheaper, `None` at `Low`.
    pub fn degraded(self) -> Option<Self> {
        match self {
            QualityLevel::High => Some(QualityLevel::Medium),
            QualityLevel::Medium => Some(QualityLevel::Low),
            QualityLevel::Low => None,
        }
    }

    pub fn settings(self) -> QualitySettings {
        match self {
            QualityLevel::High => QualitySettings {
                pixel_ratio_cap: 2.0,
                lensing_enabled: true,
                bloom_enabled: true,
                max_substeps: 5,
            },
            QualityLevel::Medium => QualitySettings {
                pixel_ratio_cap: 1.5,
                lensing_enabled: true,
                bloom_enabled: false,
                max_substeps: 3,
            },
            QualityLevel::Low => QualitySettings {
                pixel_ratio_cap: 1.0,
                lensing_enabled: false,
                bloom_enabled: false,
                max_substeps: 2,
            },
        }
    }

    /// Starting tier for a device.
    pub fn for_device(device: &DeviceProfile) -> Self {
        if device.is_mobile || device.logical_cores <= 2 || device.memory_gb < 2.0 {
            QualityLevel::Low
        } else if device.logical_cores <= 4 || device.memory_gb < 4.0 {
            QualityLevel::Medium
        } else {
            QualityLevel::High
        }
    }
}

/// What the render side should apply for a tier.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualitySettings {
    /// Upper bound on `devicePixelRatio`.
    pub pixel_ratio_cap: f32,
    pub lensing_enabled: bool,
    pub bloom_enabled: bool,
    /// Physics substep cap pushed into the simulation config.
    pub max_substeps: u32,
}

/// Host capabilities, read once at startup by the embedding page.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceProfile {
    pub logical_cores: u32,
    pub memory_gb: f32,
    pub is_mobile: bool,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            logical_cores: 8,
            memory_gb: 8.0,
            is_mobile: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GovernorConfig {
    /// Gap at which a frame counts as slow.
    pub warn_gap_ms: f64,
    /// Gap treated as a GPU hang.
    pub error_gap_ms: f64,
    /// Slow score at which quality drops one tier.
    pub reduce_quality_after: u32,
    /// Slow score at which the rendering surface is recreated.
    pub recreate_surface_after: u32,
    /// Hang-level gaps tolerated per session before the loop is disabled.
    pub max_total_failures: u32,
    /// Surface recreations tolerated per session. Once spent, the next
    /// recreation disables the loop instead.
    pub max_surface_recreations: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            warn_gap_ms: 500.0,
            error_gap_ms: 2000.0,
            reduce_quality_after: 3,
            recreate_surface_after: 6,
            max_total_failures: 10,
            max_surface_recreations: 3,
        }
    }
}

/// Decision taken for one frame gap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GovernorAction {
    None,
    ReduceQuality(QualityLevel),
    RecreateSurface,
    DisableLoop,
}

/// Watches inter-frame gaps and degrades rendering under sustained stalls.
///
/// Each slow gap adds to a score (hang-level gaps add double); a normal gap
/// clears it. Crossing the first threshold drops quality one tier, crossing
/// the second recreates the surface. The loop is disabled once either the
/// hang budget or the recreation budget is spent. Degradation is one-way for
/// the session: only [`PerformanceGovernor::reset`] raises the tier again.
pub struct PerformanceGovernor {
    pub config: GovernorConfig,
    quality: QualityLevel,
    /// Consecutive slow-frame score.
    slow_score: u32,
    total_failures: u32,
    surface_recreations: u32,
    disabled: bool,
    /// Exponential moving average of the gap.
    ema_ms: f64,
}

impl PerformanceGovernor {
    pub fn new(config: GovernorConfig, initial: QualityLevel) -> Self {
        Self {
            config,
            quality: initial,
            slow_score: 0,
            total_failures: 0,
            surface_recreations: 0,
            disabled: false,
            ema_ms: 0.0,
        }
    }

    pub fn quality(&self) -> QualityLevel {
        self.quality
    }

    pub fn slow_score(&self) -> u32 {
        self.slow_score
    }

    pub fn total_failures(&self) -> u32 {
        self.total_failures
    }

    pub fn surface_recreations(&self) -> u32 {
        self.surface_recreations
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn average_gap_ms(&self) -> f64 {
        self.ema_ms
    }

    /// Feed the gap between the previous and current frame.
    pub fn observe_gap(&mut self, gap_ms: f64) -> GovernorAction {
        if self.disabled || !gap_ms.is_finite() || gap_ms < 0.0 {
            return GovernorAction::None;
        }

        // EMA with alpha=0.3 for responsiveness
        self.ema_ms = if self.ema_ms == 0.0 {
            gap_ms
        } else {
            self.ema_ms * 0.7 + gap_ms * 0.3
        };

        if gap_ms < self.config.warn_gap_ms {
            // Transient hitch is over
            self.slow_score = 0;
            return GovernorAction::None;
        }

        let previous = self.slow_score;
        if gap_ms >= self.config.error_gap_ms {
            self.slow_score += 2;
            self.total_failures += 1;
            log::warn!(
                "frame gap {:.0}ms looks like a GPU stall ({} of {})",
                gap_ms,
                self.total_failures,
                self.config.max_total_failures
            );
            if self.total_failures >= self.config.max_total_failures {
                self.disabled = true;
                log::error!("too many stalled frames, disabling the frame loop");
                return GovernorAction::DisableLoop;
            }
        } else {
            self.slow_score += 1;
        }

        let score = self.slow_score;
        let crossed = |threshold: u32| previous < threshold && score >= threshold;
        let recreate = crossed(self.config.recreate_surface_after);
        let reduce = crossed(self.config.reduce_quality_after);

        if recreate {
            self.slow_score = 0;
            if self.surface_recreations >= self.config.max_surface_recreations {
                self.disabled = true;
                log::error!(
                    "stalls persist after {} surface recreations, disabling the frame loop",
                    self.surface_recreations
                );
                return GovernorAction::DisableLoop;
            }
            self.surface_recreations += 1;
            log::warn!("sustained stalls, recreating the rendering surface");
            return GovernorAction::RecreateSurface;
        }

        if reduce {
            if let Some(next) = self.quality.degraded() {
                log::warn!("reducing quality {:?} -> {:?}", self.quality, next);
                self.quality = next;
                return GovernorAction::ReduceQuality(next);
            }
        }

        GovernorAction::None
    }

    /// Explicit recovery: back to `level` with all counters cleared.
    pub fn reset(&mut self, level: QualityLevel) {
        self.quality = level;
        self.slow_score = 0;
        self.total_failures = 0;
        self.surface_recreations = 0;
        self.disabled = false;
        self.ema_ms = 0.0;
    }
}

/// Timing statistics for the debug overlay.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    /// Smoothed gap between frames in milliseconds.
    pub average_gap_ms: f64,
    pub substeps: u32,
    pub particle_count: usize,
    pub captured_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor() -> PerformanceGovernor {
        PerformanceGovernor::new(GovernorConfig::default(), QualityLevel::High)
    }

    #[test]
    fn test_normal_frames_do_nothing() {
        let mut g = governor();
        for _ in 0..100 {
            assert_eq!(g.observe_gap(16.7), GovernorAction::None);
        }
        assert_eq!(g.quality(), QualityLevel::High);
        assert!((g.average_gap_ms() - 16.7).abs() < 1e-6);
    }

    #[test]
    fn test_three_warn_frames_reduce_quality() {
        let mut g = governor();
        assert_eq!(g.observe_gap(600.0), GovernorAction::None);
        assert_eq!(g.observe_gap(600.0), GovernorAction::None);
        assert_eq!(
            g.observe_gap(600.0),
            GovernorAction::ReduceQuality(QualityLevel::Medium)
        );
        assert_eq!(g.quality(), QualityLevel::Medium);
    }

    #[test]
    fn test_normal_gap_resets_score() {
        let mut g = governor();
        g.observe_gap(600.0);
        g.observe_gap(600.0);
        g.observe_gap(16.0);
        assert_eq!(g.slow_score(), 0);
        assert_eq!(g.observe_gap(600.0), GovernorAction::None);
        assert_eq!(g.quality(), QualityLevel::High);
    }

    #[test]
    fn test_error_gaps_escalate_to_recreate() {
        let mut g = governor();
        // 2, 4 (crosses 3 -> reduce), 6 (crosses 6 -> recreate)
        assert_eq!(g.observe_gap(2500.0), GovernorAction::None);
        assert_eq!(
            g.observe_gap(2500.0),
            GovernorAction::ReduceQuality(QualityLevel::Medium)
        );
        assert_eq!(g.observe_gap(2500.0), GovernorAction::RecreateSurface);
        assert_eq!(g.slow_score(), 0);
        assert_eq!(g.surface_recreations(), 1);
    }

    #[test]
    fn test_failure_budget_disables_loop() {
        let mut g = governor();
        let mut last = GovernorAction::None;
        for _ in 0..10 {
            last = g.observe_gap(3000.0);
        }
        assert_eq!(last, GovernorAction::DisableLoop);
        assert!(g.is_disabled());
        assert_eq!(g.observe_gap(3000.0), GovernorAction::None);
    }

    #[test]
    fn test_sustained_slow_frames_exhaust_recreations() {
        let mut g = governor();
        let mut recreates = 0;
        let mut disabled_at = None;
        for frame in 0..300 {
            match g.observe_gap(800.0) {
                GovernorAction::RecreateSurface => recreates += 1,
                GovernorAction::DisableLoop => {
                    disabled_at = Some(frame);
                    break;
                }
                _ => {}
            }
        }
        // No hang-level gaps, so only the recreation budget can end this
        assert_eq!(g.total_failures(), 0);
        assert_eq!(recreates, 3);
        // Recreations on gaps 6, 12 and 18; gap 24 would be the fourth
        assert_eq!(disabled_at, Some(23));
        assert!(g.is_disabled());
        assert_eq!(g.quality(), QualityLevel::Low);
    }

    #[test]
    fn test_quality_never_rises_on_its_own() {
        let mut g = governor();
        for _ in 0..3 {
            g.observe_gap(600.0);
        }
        for _ in 0..500 {
            g.observe_gap(10.0);
        }
        assert_eq!(g.quality(), QualityLevel::Medium);

        g.reset(QualityLevel::High);
        assert_eq!(g.quality(), QualityLevel::High);
    }

    #[test]
    fn test_low_is_floor() {
        let mut g = PerformanceGovernor::new(GovernorConfig::default(), QualityLevel::Low);
        for _ in 0..3 {
            assert_ne!(g.observe_gap(600.0), GovernorAction::ReduceQuality(QualityLevel::Low));
        }
        assert_eq!(g.quality(), QualityLevel::Low);
    }

    #[test]
    fn test_device_profile_picks_tier() {
        assert_eq!(QualityLevel::for_device(&DeviceProfile::default()), QualityLevel::High);
        let phone = DeviceProfile {
            is_mobile: true,
            ..Default::default()
        };
        assert_eq!(QualityLevel::for_device(&phone), QualityLevel::Low);
        let laptop = DeviceProfile {
            logical_cores: 4,
            memory_gb: 8.0,
            is_mobile: false,
        };
        assert_eq!(QualityLevel::for_device(&laptop), QualityLevel::Medium);
    }
}
