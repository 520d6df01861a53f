//! Central-mass particle integrator.
//!
//! Semi-implicit (symplectic) Euler: velocity first, then position with the
//! new velocity. It keeps circular orbits bounded where explicit Euler
//! spirals outward, and it is cheap enough to run several fixed substeps per
//! frame.

use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::body::CentralBody;
use crate::config::SimulationConfig;
use crate::forces::nbody::pairwise_accelerations;
use crate::particle::ParticleSet;

/// What happened during one integrator step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Particles integrated this step.
    pub integrated: usize,
    /// Particles newly marked captured this step.
    pub captured: usize,
}

/// Acceleration toward the central body at `position`.
///
/// `|r|` is clamped to `horizon_radius * min_distance_factor` so a particle
/// sitting on the singularity never produces an infinite pull.
pub fn central_acceleration(position: Vec3, body: &CentralBody, config: &SimulationConfig) -> Vec3 {
    let r_vec = position - body.position;
    let horizon = body.horizon_radius();
    let r = r_vec.length().max(horizon * config.min_distance_factor);
    let r_hat = if r_vec.length_squared() > 0.0 {
        r_vec.normalize()
    } else {
        Vec3::ZERO
    };

    let mut magnitude = config.gravitational_constant * body.mass / (r * r);
    if config.include_relativity {
        magnitude *= relativistic_factor(horizon, r, config.relativity_strength);
    }
    -r_hat * magnitude
}

/// Pull multiplier near the horizon: `1 + strength * (horizon / r)`.
///
/// With the default strength of 1.5 this is the `3GM / (c^2 r)` term of the
/// Schwarzschild orbit equation. It is a visual approximation, not a
/// geodesic solver.
#[inline]
pub fn relativistic_factor(horizon_radius: f32, r: f32, strength: f32) -> f32 {
    1.0 + strength * horizon_radius / r
}

/// Advance one particle. Returns `true` when its path this step touched the
/// horizon; a fast particle cannot tunnel through between two samples.
#[inline]
fn advance(
    position: &mut Vec3,
    velocity: &mut Vec3,
    extra_acc: Vec3,
    body: &CentralBody,
    dt: f32,
    config: &SimulationConfig,
) -> bool {
    if body.is_captured(*position) {
        return true;
    }
    let from = *position;
    let acc = central_acceleration(from, body, config) + extra_acc;
    *velocity += acc * dt;
    *position += *velocity * dt;
    body.path_crosses_horizon(from, *position)
}

/// Advance every non-captured particle by `dt`, in place.
///
/// Particles found on or inside the horizon before their update, or whose
/// path during it touches the horizon, are flagged `captured` and skipped by every later call. Flagged particles
/// are left in the set; the controller compacts them out.
pub fn step(
    particles: &mut ParticleSet,
    body: &CentralBody,
    dt: f32,
    config: &SimulationConfig,
) -> StepOutcome {
    let count = particles.len();
    if count == 0 || dt <= 0.0 {
        return StepOutcome::default();
    }

    if config.pairwise_gravity {
        pairwise_accelerations(
            &particles.position,
            &particles.mass,
            &particles.captured,
            config.gravitational_constant,
            config.pairwise_softening,
            config.pairwise_theta,
            &mut particles.acceleration,
        );
    } else {
        particles.acceleration.iter_mut().for_each(|a| *a = Vec3::ZERO);
    }

    let already_captured = particles.captured.iter().filter(|&&c| c).count();

    let ParticleSet {
        position,
        velocity,
        captured,
        acceleration,
        ..
    } = particles;

    #[cfg(feature = "parallel")]
    position
        .par_iter_mut()
        .zip(velocity.par_iter_mut())
        .zip(captured.par_iter_mut())
        .zip(acceleration.par_iter())
        .for_each(|(((p, v), c), a)| {
            if !*c {
                *c = advance(p, v, *a, body, dt, config);
            }
        });

    #[cfg(not(feature = "parallel"))]
    position
        .iter_mut()
        .zip(velocity.iter_mut())
        .zip(captured.iter_mut())
        .zip(acceleration.iter())
        .for_each(|(((p, v), c), a)| {
            if !*c {
                *c = advance(p, v, *a, body, dt, config);
            }
        });

    let now_captured = captured.iter().filter(|&&c| c).count();
    let outcome = StepOutcome {
        integrated: count - already_captured,
        captured: now_captured - already_captured,
    };
    if outcome.captured > 0 {
        log::debug!("{} particle(s) crossed the horizon", outcome.captured);
    }
    outcome
}
