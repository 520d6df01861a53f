use thiserror::Error;

/// Why a single `ParticleSpawn` was refused by `add_particles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("position is not finite")]
    NonFinitePosition,
    #[error("velocity is not finite")]
    NonFiniteVelocity,
    #[error("mass must be finite and greater than zero")]
    InvalidMass,
    #[error("particle capacity reached")]
    CapacityExceeded,
    #[error("controller is disposed")]
    Disposed,
}

impl RejectReason {
    /// True for bad input; capacity and lifecycle refusals are not validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RejectReason::NonFinitePosition
                | RejectReason::NonFiniteVelocity
                | RejectReason::InvalidMass
        )
    }
}

/// A rejected `set_parameters` patch. The previous configuration stays active.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be finite and greater than zero, got {value}")]
    NotPositive { field: &'static str, value: f32 },
    #[error("{field} must be finite and not negative, got {value}")]
    Negative { field: &'static str, value: f32 },
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u32,
        value: u32,
    },
    #[error("controller is disposed")]
    Disposed,
}

/// Failure reported by an `on_update` observer or a lensing callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    #[error("observer failed: {0}")]
    Failed(String),
    #[error("observer panicked: {0}")]
    Panicked(String),
}

/// Failure reported by a per-frame collaborator (`Updatable`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("{name} update failed: {message}")]
    Update { name: String, message: String },
    #[error("{name} panicked: {message}")]
    Panicked { name: String, message: String },
}

/// Extract a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
