use crate::host::{FrameHandle, FrameHost};

/// State of the frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Paused,
    /// Stopped for good: too many faults, or disabled by the governor.
    Halted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameConfig {
    /// Upper bound on the delta handed to the simulation, in seconds.
    pub max_delta_seconds: f32,
    /// Consecutive faulty frames tolerated before the loop halts.
    pub max_consecutive_errors: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_delta_seconds: 0.1,
            max_consecutive_errors: 5,
        }
    }
}

/// Timing of the frame being run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    pub now_ms: f64,
    /// Gap since the previous frame; `None` on the first frame after a
    /// start or resume.
    pub gap_ms: Option<f64>,
    /// Gap in seconds clamped to `[0, max_delta_seconds]`.
    pub delta: f32,
}

/// Owns the single animation-frame handle and the fault counter.
pub struct FrameScheduler {
    pub config: FrameConfig,
    state: LoopState,
    handle: Option<FrameHandle>,
    last_frame_ms: Option<f64>,
    consecutive_errors: u32,
    frames: u64,
}

impl FrameScheduler {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            state: LoopState::Idle,
            handle: None,
            last_frame_ms: None,
            consecutive_errors: 0,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn has_pending_frame(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, host: &mut dyn FrameHost) {
        if self.state == LoopState::Idle {
            self.state = LoopState::Running;
            self.arm(host);
        }
    }

    pub fn pause(&mut self, host: &mut dyn FrameHost) {
        if self.state == LoopState::Running {
            self.disarm(host);
            self.state = LoopState::Paused;
            self.last_frame_ms = None;
        }
    }

    pub fn resume(&mut self, host: &mut dyn FrameHost) {
        if self.state == LoopState::Paused {
            self.state = LoopState::Running;
            self.consecutive_errors = 0;
            self.arm(host);
        }
    }

    /// Stop for good. No further frames are requested.
    pub fn halt(&mut self, host: &mut dyn FrameHost) {
        self.disarm(host);
        self.state = LoopState::Halted;
    }

    /// Called when the host delivers a frame. `None` means skip it.
    pub fn begin_frame(&mut self, now_ms: f64) -> Option<FrameTiming> {
        // The delivered frame consumed the handle
        self.handle = None;
        if self.state != LoopState::Running {
            return None;
        }
        let gap_ms = self.last_frame_ms.map(|last| (now_ms - last).max(0.0));
        self.last_frame_ms = Some(now_ms);
        self.frames += 1;
        let delta = gap_ms
            .map(|gap| ((gap / 1000.0) as f32).clamp(0.0, self.config.max_delta_seconds))
            .unwrap_or(0.0);
        Some(FrameTiming {
            now_ms,
            gap_ms,
            delta,
        })
    }

    /// Record the frame's outcome and request the next one.
    ///
    /// Returns `false` when this frame exhausted the fault budget and the
    /// loop halted.
    pub fn end_frame(&mut self, host: &mut dyn FrameHost, faulted: bool) -> bool {
        if faulted {
            self.consecutive_errors += 1;
            if self.consecutive_errors >= self.config.max_consecutive_errors {
                log::error!(
                    "{} consecutive faulty frames, halting the frame loop",
                    self.consecutive_errors
                );
                self.halt(host);
                return false;
            }
        } else {
            self.consecutive_errors = 0;
        }
        if self.state == LoopState::Running {
            self.arm(host);
        }
        true
    }

    fn arm(&mut self, host: &mut dyn FrameHost) {
        if self.handle.is_none() {
            self.handle = Some(host.request_frame());
        }
    }

    fn disarm(&mut self, host: &mut dyn FrameHost) {
        if let Some(handle) = self.handle.take() {
            host.cancel_frame(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHost {
        requested: i32,
        cancelled: Vec<FrameHandle>,
    }

    impl FrameHost for CountingHost {
        fn request_frame(&mut self) -> FrameHandle {
            self.requested += 1;
            FrameHandle(self.requested)
        }

        fn cancel_frame(&mut self, handle: FrameHandle) {
            self.cancelled.push(handle);
        }
    }

    #[test]
    fn test_first_frame_has_no_gap() {
        let mut host = CountingHost::default();
        let mut s = FrameScheduler::new(FrameConfig::default());
        s.start(&mut host);
        let t = s.begin_frame(1000.0).unwrap();
        assert_eq!(t.gap_ms, None);
        assert_eq!(t.delta, 0.0);
        s.end_frame(&mut host, false);
        let t = s.begin_frame(1016.0).unwrap();
        assert_eq!(t.gap_ms, Some(16.0));
        assert!((t.delta - 0.016).abs() < 1e-6);
    }

    #[test]
    fn test_delta_is_clamped() {
        let mut host = CountingHost::default();
        let mut s = FrameScheduler::new(FrameConfig::default());
        s.start(&mut host);
        s.begin_frame(0.0);
        s.end_frame(&mut host, false);
        let t = s.begin_frame(5000.0).unwrap();
        assert_eq!(t.gap_ms, Some(5000.0));
        assert_eq!(t.delta, 0.1);
    }

    #[test]
    fn test_only_one_handle_outstanding() {
        let mut host = CountingHost::default();
        let mut s = FrameScheduler::new(FrameConfig::default());
        s.start(&mut host);
        s.start(&mut host);
        assert_eq!(host.requested, 1);
        s.pause(&mut host);
        assert_eq!(host.cancelled, vec![FrameHandle(1)]);
        assert!(!s.has_pending_frame());
        assert!(s.begin_frame(100.0).is_none());
    }

    #[test]
    fn test_resume_restarts_gap_measurement() {
        let mut host = CountingHost::default();
        let mut s = FrameScheduler::new(FrameConfig::default());
        s.start(&mut host);
        s.begin_frame(0.0);
        s.end_frame(&mut host, false);
        s.pause(&mut host);
        s.resume(&mut host);
        let t = s.begin_frame(60_000.0).unwrap();
        assert_eq!(t.gap_ms, None);
    }

    #[test]
    fn test_consecutive_faults_halt() {
        let mut host = CountingHost::default();
        let mut s = FrameScheduler::new(FrameConfig::default());
        s.start(&mut host);
        for i in 0..4 {
            s.begin_frame(i as f64 * 16.0).unwrap();
            assert!(s.end_frame(&mut host, true));
        }
        s.begin_frame(80.0).unwrap();
        assert!(!s.end_frame(&mut host, true));
        assert_eq!(s.state(), LoopState::Halted);
        assert!(!s.has_pending_frame());
    }

    #[test]
    fn test_clean_frame_resets_faults() {
        let mut host = CountingHost::default();
        let mut s = FrameScheduler::new(FrameConfig::default());
        s.start(&mut host);
        for i in 0..20 {
            s.begin_frame(i as f64 * 16.0).unwrap();
            assert!(s.end_frame(&mut host, i % 2 == 0));
        }
        assert_eq!(s.state(), LoopState::Running);
    }
}
