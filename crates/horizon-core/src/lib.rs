//! Simulation and frame-control core for the event-horizon scene.
//!
//! The physics half advances particles around a fixed central mass and bends
//! light rays for the lensing pass. The control half drives one frame at a
//! time, degrades quality under sustained stalls and walks the rendering
//! surface through context loss and recovery. Everything that touches a real
//! GPU, DOM or clock is reached through the traits in [`host`].
pub mod app;
pub mod body;
pub mod config;
pub mod controller;
pub mod error;
pub mod forces;
pub mod governor;
pub mod host;
pub mod integrator;
pub mod lensing;
pub mod math;
pub mod particle;
pub mod recovery;
pub mod scheduler;
pub mod snapshot;

pub use app::{AppConfig, Application, HostBindings};
pub use body::CentralBody;
pub use config::{SimulationConfig, SimulationConfigPatch};
pub use controller::{ControllerState, ParameterQueue, PhysicsController};
pub use error::{CollaboratorError, ConfigError, ObserverError, RejectReason};
pub use governor::{GovernorAction, PerformanceGovernor, QualityLevel};
pub use lensing::{LensingResult, LightRay};
pub use particle::{ParticleId, ParticleSpawn};
pub use recovery::{ContextRecoveryManager, ContextState};
pub use snapshot::{FrameSnapshot, ParticleCounts, ParticleView};
