//! Boundary between the core and its host environment.
//!
//! The browser build implements these with `requestAnimationFrame`,
//! `setTimeout`, the WebGL canvas and DOM overlays; tests implement them with
//! plain recording structs.

use crate::error::CollaboratorError;
use crate::governor::{QualityLevel, QualitySettings};
use crate::recovery::Notice;
use crate::snapshot::FrameSnapshot;

/// Handle of one requested animation frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub i32);

/// Handle of one scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u32);

/// Why a timer was scheduled; echoed back to `Application::on_timer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    RecoveryAttempt,
    HealthCheck,
}

/// Schedules the next call to `Application::frame`.
pub trait FrameHost {
    fn request_frame(&mut self) -> FrameHandle;
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Deferred callbacks. The host calls `Application::on_timer(id)` when due.
pub trait TimerHost {
    fn schedule(&mut self, kind: TimerKind, delay_ms: u32) -> TimerId;
    fn cancel(&mut self, id: TimerId);
}

/// The GPU rendering surface.
pub trait RenderSurface {
    /// Issue a tiny test draw; `true` when the context is usable.
    fn probe_health(&mut self) -> bool;
    /// Throw the renderer away and build a new one.
    fn request_surface_recreate(&mut self);
    /// Context came back: re-upload textures, buffers and programs.
    fn request_resource_rebuild(&mut self);
    fn apply_quality(&mut self, level: QualityLevel, settings: &QualitySettings);
}

/// Non-blocking user-facing messages.
pub trait UserNotifier {
    fn show(&mut self, notice: Notice);
    fn clear(&mut self);
}

/// Everything a per-frame collaborator can read.
pub struct FrameContext<'a> {
    /// Host timestamp of this frame, in milliseconds.
    pub now_ms: f64,
    /// Clamped frame delta in seconds.
    pub delta: f32,
    pub quality: QualityLevel,
    pub snapshot: &'a FrameSnapshot,
}

/// A collaborator taking part in every frame (renderer, UI, audio, ...).
///
/// A failed update should return `Err`, which counts toward the frame fault
/// budget. Panics only count on targets that unwind: on
/// `wasm32-unknown-unknown` they abort and take the whole module down.
pub trait Updatable {
    fn name(&self) -> &str;
    fn update(&mut self, frame: &FrameContext<'_>) -> Result<(), CollaboratorError>;
}
