use glam::Vec3;

use crate::body::CentralBody;
use crate::error::RejectReason;
use crate::math::{hash11, is_finite_vec, smoothstep};

/// Stable particle identifier, unique for the lifetime of a controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticleId(pub u32);

/// One entry of a caller-supplied batch for `add_particles`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSpawn {
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f32,
    /// Reserved; does not affect gravity.
    pub charge: f32,
}

impl ParticleSpawn {
    pub fn new(position: Vec3, velocity: Vec3, mass: f32) -> Self {
        Self {
            position,
            velocity,
            mass,
            charge: 0.0,
        }
    }

    /// Particle on a circular orbit of `radius` in the XZ plane, at `angle`
    /// radians, moving counter-clockwise seen from +Y.
    pub fn circular_orbit(radius: f32, angle: f32, body: &CentralBody, g: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        let position = body.position + Vec3::new(cos * radius, 0.0, sin * radius);
        let speed = body.circular_speed(radius, g);
        let velocity = Vec3::new(-sin * speed, 0.0, cos * speed);
        Self::new(position, velocity, 1.0)
    }

    /// Deterministic accretion disk between `inner` and `outer` radius.
    ///
    /// Radii and phases come from a hash of the index and `seed`, so the same
    /// arguments always produce the same batch. The disk thickens toward the
    /// outer edge.
    pub fn accretion_disk(
        count: usize,
        inner: f32,
        outer: f32,
        body: &CentralBody,
        g: f32,
        seed: u32,
    ) -> Vec<Self> {
        let seed = seed as f32 * 0.618;
        (0..count)
            .map(|i| {
                let t = i as f32;
                let radius = inner + (outer - inner) * hash11(t * 1.73 + seed);
                let angle = hash11(t * 7.31 + seed + 11.0) * std::f32::consts::TAU;
                let mut spawn = Self::circular_orbit(radius, angle, body, g);
                let thickness = 0.02 + 0.06 * smoothstep(inner, outer, radius);
                spawn.position.y = (hash11(t * 3.17 + seed + 5.0) - 0.5) * thickness * radius;
                spawn
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), RejectReason> {
        if !is_finite_vec(self.position) {
            return Err(RejectReason::NonFinitePosition);
        }
        if !is_finite_vec(self.velocity) {
            return Err(RejectReason::NonFiniteVelocity);
        }
        if !self.mass.is_finite() || self.mass <= 0.0 {
            return Err(RejectReason::InvalidMass);
        }
        Ok(())
    }
}

/// SoA particle storage
///
/// Columns always have equal length. Buffers keep their allocation across
/// `clear`, so a controller refilled to the same capacity does not allocate.
#[derive(Default)]
pub struct ParticleSet {
    pub id: Vec<ParticleId>,
    pub position: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub mass: Vec<f32>,
    pub charge: Vec<f32>,
    /// Set by the integrator, removed by `compact`.
    pub captured: Vec<bool>,
    /// Scratch buffer for pairwise accelerations.
    pub acceleration: Vec<Vec3>,
}

impl ParticleSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: Vec::with_capacity(capacity),
            position: Vec::with_capacity(capacity),
            velocity: Vec::with_capacity(capacity),
            mass: Vec::with_capacity(capacity),
            charge: Vec::with_capacity(capacity),
            captured: Vec::with_capacity(capacity),
            acceleration: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    pub fn push(&mut self, id: ParticleId, spawn: &ParticleSpawn) {
        self.id.push(id);
        self.position.push(spawn.position);
        self.velocity.push(spawn.velocity);
        self.mass.push(spawn.mass);
        self.charge.push(spawn.charge);
        self.captured.push(false);
        self.acceleration.push(Vec3::ZERO);
    }

    pub fn clear(&mut self) {
        self.id.clear();
        self.position.clear();
        self.velocity.clear();
        self.mass.clear();
        self.charge.clear();
        self.captured.clear();
        self.acceleration.clear();
    }

    /// Remove captured particles, preserving the order of the rest.
    ///
    /// Captured ids are appended to `removed` in their storage order.
    pub fn compact(&mut self, removed: &mut Vec<ParticleId>) {
        let count = self.len();
        let mut write = 0;
        for read in 0..count {
            if self.captured[read] {
                removed.push(self.id[read]);
                continue;
            }
            if write != read {
                self.id[write] = self.id[read];
                self.position[write] = self.position[read];
                self.velocity[write] = self.velocity[read];
                self.mass[write] = self.mass[read];
                self.charge[write] = self.charge[read];
                self.captured[write] = false;
                self.acceleration[write] = self.acceleration[read];
            }
            write += 1;
        }
        self.id.truncate(write);
        self.position.truncate(write);
        self.velocity.truncate(write);
        self.mass.truncate(write);
        self.charge.truncate(write);
        self.captured.truncate(write);
        self.acceleration.truncate(write);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_at(x: f32) -> ParticleSpawn {
        ParticleSpawn::new(Vec3::new(x, 0.0, 0.0), Vec3::ZERO, 1.0)
    }

    #[test]
    fn test_compact_keeps_order_and_reports_removed() {
        let mut set = ParticleSet::with_capacity(4);
        for i in 0..4 {
            set.push(ParticleId(i), &spawn_at(i as f32));
        }
        set.captured[1] = true;
        set.captured[3] = true;

        let mut removed = Vec::new();
        set.compact(&mut removed);

        assert_eq!(removed, vec![ParticleId(1), ParticleId(3)]);
        assert_eq!(set.id, vec![ParticleId(0), ParticleId(2)]);
        assert_eq!(set.position[1], Vec3::new(2.0, 0.0, 0.0));
        assert!(set.captured.iter().all(|c| !c));
        assert_eq!(set.acceleration.len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        let nan = ParticleSpawn::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::ZERO, 1.0);
        assert_eq!(nan.validate(), Err(RejectReason::NonFinitePosition));

        let fast = ParticleSpawn::new(Vec3::X, Vec3::splat(f32::INFINITY), 1.0);
        assert_eq!(fast.validate(), Err(RejectReason::NonFiniteVelocity));

        let negative = ParticleSpawn::new(Vec3::X, Vec3::ZERO, -1.0);
        assert_eq!(negative.validate(), Err(RejectReason::InvalidMass));

        let zero = ParticleSpawn::new(Vec3::X, Vec3::ZERO, 0.0);
        assert_eq!(zero.validate(), Err(RejectReason::InvalidMass));

        assert!(spawn_at(3.0).validate().is_ok());
    }

    #[test]
    fn test_circular_orbit_speed_and_direction() {
        let body = CentralBody::new(0.5, 1.0, 1.0);
        let spawn = ParticleSpawn::circular_orbit(4.0, 0.0, &body, 1.0);
        assert!((spawn.position - Vec3::new(4.0, 0.0, 0.0)).length() < 1e-6);
        // sqrt(G * M / r) = sqrt(0.5 / 4)
        assert!((spawn.velocity.length() - (0.125f32).sqrt()).abs() < 1e-6);
        assert!(spawn.velocity.dot(spawn.position).abs() < 1e-6);
    }

    #[test]
    fn test_accretion_disk_is_deterministic_and_bounded() {
        let body = CentralBody::new(0.5, 1.0, 1.0);
        let a = ParticleSpawn::accretion_disk(200, 2.0, 6.0, &body, 1.0, 7);
        let b = ParticleSpawn::accretion_disk(200, 2.0, 6.0, &body, 1.0, 7);
        assert_eq!(a, b);
        for spawn in &a {
            let planar = Vec3::new(spawn.position.x, 0.0, spawn.position.z).length();
            assert!((2.0 - 1e-3..=6.0 + 1e-3).contains(&planar), "radius {planar}");
            assert!(spawn.validate().is_ok());
        }
    }
}
