//! Light bending around the central body for the lensing distortion map.
//!
//! A thin-lens model: each ray is treated as a straight line, bent once at
//! its point of closest approach by an angle falling off with the square of
//! the impact parameter. Independent of the particle state, so the render
//! side can call it once per camera move.

use glam::{Quat, Vec3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::body::CentralBody;
use crate::math::{any_orthogonal, is_finite_vec};

/// A transient input ray. `direction` is normalized on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRay {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl LightRay {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LensingResult {
    /// The ray passes within the horizon radius and never reaches the camera.
    Absorbed,
    Deflected {
        direction: Vec3,
        endpoint: Vec3,
        /// Bend angle in radians.
        deflection: f32,
        /// Impact parameter.
        closest_approach: f32,
    },
    /// Ray could not be evaluated (non-finite or zero direction); passed
    /// through unchanged.
    Passthrough { direction: Vec3 },
}

impl LensingResult {
    pub fn is_absorbed(&self) -> bool {
        matches!(self, LensingResult::Absorbed)
    }

    /// Outgoing direction, `None` when absorbed.
    pub fn direction(&self) -> Option<Vec3> {
        match *self {
            LensingResult::Absorbed => None,
            LensingResult::Deflected { direction, .. } => Some(direction),
            LensingResult::Passthrough { direction } => Some(direction),
        }
    }

    pub fn deflection(&self) -> f32 {
        match *self {
            LensingResult::Deflected { deflection, .. } => deflection,
            _ => 0.0,
        }
    }
}

/// Bend one ray. See [`bend`].
pub fn bend_ray(ray: &LightRay, body: &CentralBody, strength: f32) -> LensingResult {
    let dir = ray.direction;
    if !is_finite_vec(ray.origin) || !is_finite_vec(dir) || dir.length_squared() < 1e-12 {
        return LensingResult::Passthrough { direction: dir };
    }
    let dir = dir.normalize();
    let horizon = body.horizon_radius();

    // Closest point on the forward half-line
    let to_center = body.position - ray.origin;
    let t = to_center.dot(dir).max(0.0);
    let pivot = ray.origin + dir * t;
    let toward = body.position - pivot;
    let closest_approach = toward.length();

    if closest_approach <= horizon {
        return LensingResult::Absorbed;
    }

    let ratio = horizon / closest_approach;
    let deflection = (ratio * ratio * strength).clamp(0.0, std::f32::consts::PI);

    // Rotate toward the body in the plane of the ray and the body
    let axis = dir.cross(toward);
    let axis = if axis.length_squared() > 1e-12 {
        axis.normalize()
    } else {
        any_orthogonal(dir)
    };
    let direction = (Quat::from_axis_angle(axis, deflection) * dir).normalize();
    let endpoint = pivot + direction * t;

    LensingResult::Deflected {
        direction,
        endpoint,
        deflection,
        closest_approach,
    }
}

/// Bend every ray in `rays` under the field of `body`.
///
/// Pure: no shared state, output has the same length and order as the
/// input. Deflection is `(horizon_radius / closest_approach)^2 * strength`
/// radians, capped at pi.
pub fn bend(rays: &[LightRay], body: &CentralBody, strength: f32) -> Vec<LensingResult> {
    #[cfg(feature = "parallel")]
    {
        rays.par_iter().map(|ray| bend_ray(ray, body, strength)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        rays.iter().map(|ray| bend_ray(ray, body, strength)).collect()
    }
}

/// Identity result for `rays`, used when the solver cannot run.
pub fn passthrough(rays: &[LightRay]) -> Vec<LensingResult> {
    rays.iter()
        .map(|ray| LensingResult::Passthrough {
            direction: ray.direction,
        })
        .collect()
}
