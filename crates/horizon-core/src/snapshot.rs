use glam::Vec3;

use crate::particle::{ParticleId, ParticleSet};

/// Read-only copy of one live particle for render/UI correlation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleView {
    pub id: ParticleId,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// Aggregate counts for the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParticleCounts {
    /// Live particles after this tick.
    pub particle_count: usize,
    /// Particles captured since the controller was created.
    pub captured_count: usize,
}

/// What observers receive once per tick.
///
/// `captured_ids` holds exactly the particles removed during this tick's
/// step; they never appear in `particles` again.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameSnapshot {
    pub frame: u64,
    /// Simulated time advanced during this tick, in seconds.
    pub simulated: f32,
    pub particles: Vec<ParticleView>,
    pub captured_ids: Vec<ParticleId>,
    pub counts: ParticleCounts,
}

impl FrameSnapshot {
    /// Refill from `set`, reusing the existing allocations.
    pub(crate) fn fill(&mut self, set: &ParticleSet) {
        self.particles.clear();
        self.particles.extend(
            set.id
                .iter()
                .zip(&set.position)
                .zip(&set.velocity)
                .zip(&set.captured)
                .filter(|&(_, &captured)| !captured)
                .map(|(((&id, &position), &velocity), _)| ParticleView {
                    id,
                    position,
                    velocity,
                }),
        );
    }

    pub fn find(&self, id: ParticleId) -> Option<&ParticleView> {
        self.particles.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ParticleSpawn;

    #[test]
    fn test_fill_skips_captured_and_reuses_buffer() {
        let mut set = ParticleSet::with_capacity(3);
        for i in 0..3 {
            let spawn = ParticleSpawn::new(Vec3::new(i as f32 + 5.0, 0.0, 0.0), Vec3::Y, 1.0);
            set.push(ParticleId(i), &spawn);
        }
        set.captured[1] = true;

        let mut snapshot = FrameSnapshot::default();
        snapshot.fill(&set);
        let ids: Vec<u32> = snapshot.particles.iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec![0, 2]);
        assert!(snapshot.find(ParticleId(1)).is_none());
        assert_eq!(snapshot.find(ParticleId(2)).map(|p| p.position.x), Some(7.0));

        set.captured[0] = true;
        snapshot.fill(&set);
        assert_eq!(snapshot.particles.len(), 1, "stale views must be dropped on refill");
    }
}
