use glam::Vec3;

use crate::config::SimulationConfig;

/// The black hole: a fixed point mass at the world origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentralBody {
    pub position: Vec3,
    pub mass: f32,
    /// Schwarzschild radius `2GM / c^2`, cached at construction.
    horizon_radius: f32,
}

impl CentralBody {
    pub fn new(mass: f32, gravitational_constant: f32, speed_of_light: f32) -> Self {
        let horizon_radius = 2.0 * gravitational_constant * mass / (speed_of_light * speed_of_light);
        Self {
            position: Vec3::ZERO,
            mass,
            horizon_radius,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.central_mass,
            config.gravitational_constant,
            config.speed_of_light,
        )
    }

    #[inline]
    pub fn horizon_radius(&self) -> f32 {
        self.horizon_radius
    }

    /// Inside or on the horizon counts as captured.
    #[inline]
    pub fn is_captured(&self, point: Vec3) -> bool {
        (point - self.position).length() <= self.horizon_radius
    }

    /// Whether the straight path `from -> to` comes within the horizon
    /// anywhere along its length, not just at its ends.
    pub fn path_crosses_horizon(&self, from: Vec3, to: Vec3) -> bool {
        let seg = to - from;
        let len_sq = seg.length_squared();
        let t = if len_sq > 0.0 {
            ((self.position - from).dot(seg) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.is_captured(from + seg * t)
    }

    /// Speed of a circular orbit at `radius` (`sqrt(GM / r)`).
    pub fn circular_speed(&self, radius: f32, gravitational_constant: f32) -> f32 {
        (gravitational_constant * self.mass / radius).sqrt()
    }
}

impl Default for CentralBody {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}
