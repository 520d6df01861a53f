use crate::error::ConfigError;

/// Parameters controlling the particle integrator and step scheduling.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Scale applied to the central attraction (`G`).
    pub gravitational_constant: f32,
    /// Mass of the central body.
    pub central_mass: f32,
    /// Speed of light in simulation units, used for the horizon radius.
    pub speed_of_light: f32,
    /// Strengthen the pull close to the horizon.
    pub include_relativity: bool,
    /// Coefficient of the `horizon_radius / r` correction term.
    pub relativity_strength: f32,
    /// Mutual attraction between particles (Barnes-Hut).
    pub pairwise_gravity: bool,
    pub pairwise_softening: f32,
    /// Barnes-Hut opening angle (0.0 = exact).
    pub pairwise_theta: f32,
    /// Fixed physics step in seconds.
    pub fixed_timestep: f32,
    /// Upper bound on fixed steps per tick.
    pub max_substeps: u32,
    /// Maximum number of live particles.
    pub particle_capacity: usize,
    /// Distance clamp, as a fraction of the horizon radius.
    pub min_distance_factor: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            gravitational_constant: 1.0,
            central_mass: 0.5,
            speed_of_light: 1.0,
            include_relativity: false,
            relativity_strength: 1.5,
            pairwise_gravity: false,
            pairwise_softening: 0.05,
            pairwise_theta: 0.7,
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 5,
            particle_capacity: 10_000,
            min_distance_factor: 0.01,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("gravitational_constant", self.gravitational_constant)?;
        positive("central_mass", self.central_mass)?;
        positive("speed_of_light", self.speed_of_light)?;
        non_negative("relativity_strength", self.relativity_strength)?;
        non_negative("pairwise_softening", self.pairwise_softening)?;
        non_negative("pairwise_theta", self.pairwise_theta)?;
        positive("fixed_timestep", self.fixed_timestep)?;
        positive("min_distance_factor", self.min_distance_factor)?;
        if self.max_substeps < 1 {
            return Err(ConfigError::TooSmall {
                field: "max_substeps",
                min: 1,
                value: self.max_substeps,
            });
        }
        Ok(())
    }

    /// Merge a patch into a copy of this config and validate the result.
    ///
    /// `self` is left untouched when the merged config is invalid.
    pub fn merged(&self, patch: &SimulationConfigPatch) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if let Some(v) = patch.gravitational_constant {
            next.gravitational_constant = v;
        }
        if let Some(v) = patch.central_mass {
            next.central_mass = v;
        }
        if let Some(v) = patch.speed_of_light {
            next.speed_of_light = v;
        }
        if let Some(v) = patch.include_relativity {
            next.include_relativity = v;
        }
        if let Some(v) = patch.relativity_strength {
            next.relativity_strength = v;
        }
        if let Some(v) = patch.pairwise_gravity {
            next.pairwise_gravity = v;
        }
        if let Some(v) = patch.pairwise_softening {
            next.pairwise_softening = v;
        }
        if let Some(v) = patch.pairwise_theta {
            next.pairwise_theta = v;
        }
        if let Some(v) = patch.fixed_timestep {
            next.fixed_timestep = v;
        }
        if let Some(v) = patch.max_substeps {
            next.max_substeps = v;
        }
        if let Some(v) = patch.particle_capacity {
            next.particle_capacity = v;
        }
        if let Some(v) = patch.min_distance_factor {
            next.min_distance_factor = v;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial update for [`SimulationConfig`]; `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationConfigPatch {
    pub gravitational_constant: Option<f32>,
    pub central_mass: Option<f32>,
    pub speed_of_light: Option<f32>,
    pub include_relativity: Option<bool>,
    pub relativity_strength: Option<f32>,
    pub pairwise_gravity: Option<bool>,
    pub pairwise_softening: Option<f32>,
    pub pairwise_theta: Option<f32>,
    pub fixed_timestep: Option<f32>,
    pub max_substeps: Option<u32>,
    pub particle_capacity: Option<usize>,
    pub min_distance_factor: Option<f32>,
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_merge_rejects_zero_timestep() {
        let config = SimulationConfig::default();
        let patch = SimulationConfigPatch {
            fixed_timestep: Some(0.0),
            ..Default::default()
        };
        let err = config.merged(&patch).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NotPositive {
                field: "fixed_timestep",
                ..
            }
        ));
    }

    #[test]
    fn test_merge_rejects_negative_mass() {
        let patch = SimulationConfigPatch {
            central_mass: Some(-1.0),
            ..Default::default()
        };
        assert!(SimulationConfig::default().merged(&patch).is_err());
    }

    #[test]
    fn test_merge_applies_only_set_fields() {
        let config = SimulationConfig::default();
        let patch = SimulationConfigPatch {
            include_relativity: Some(true),
            max_substeps: Some(8),
            ..Default::default()
        };
        let next = config.merged(&patch).unwrap();
        assert!(next.include_relativity);
        assert_eq!(next.max_substeps, 8);
        assert_eq!(next.central_mass, config.central_mass);
        assert_eq!(next.fixed_timestep, config.fixed_timestep);
    }
}
