use glam::Vec3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const EMPTY: u32 = u32::MAX;
const MAX_DEPTH: u32 = 32;

/// Barnes-Hut octree node, stored in a flat arena.
///
/// A leaf holds one particle; an internal node holds the aggregate mass and
/// center of mass of its subtree. Children are arena indices.
struct Node {
    center_of_mass: Vec3,
    total_mass: f32,
    bbox_min: Vec3,
    bbox_max: Vec3,
    children: [u32; 8],
    particle: u32,
    leaf_pos: Vec3,
}

impl Node {
    fn new(bbox_min: Vec3, bbox_max: Vec3) -> Self {
        Self {
            center_of_mass: Vec3::ZERO,
            total_mass: 0.0,
            bbox_min,
            bbox_max,
            children: [EMPTY; 8],
            particle: EMPTY,
            leaf_pos: Vec3::ZERO,
        }
    }

    fn is_leaf(&self) -> bool {
        self.particle != EMPTY
    }

    fn size(&self) -> f32 {
        let d = self.bbox_max - self.bbox_min;
        d.x.max(d.y).max(d.z)
    }

    fn octant_of(&self, pos: Vec3) -> usize {
        let c = (self.bbox_min + self.bbox_max) * 0.5;
        (pos.x >= c.x) as usize | ((pos.y >= c.y) as usize) << 1 | ((pos.z >= c.z) as usize) << 2
    }

    fn octant_bounds(&self, octant: usize) -> (Vec3, Vec3) {
        let c = (self.bbox_min + self.bbox_max) * 0.5;
        let pick = |bit: usize, lo: f32, mid: f32, hi: f32| {
            if octant & bit != 0 {
                (mid, hi)
            } else {
                (lo, mid)
            }
        };
        let (x0, x1) = pick(1, self.bbox_min.x, c.x, self.bbox_max.x);
        let (y0, y1) = pick(2, self.bbox_min.y, c.y, self.bbox_max.y);
        let (z0, z1) = pick(4, self.bbox_min.z, c.z, self.bbox_max.z);
        (Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
    }
}

struct Octree {
    nodes: Vec<Node>,
}

impl Octree {
    /// Build over the particles whose `skip` flag is false.
    fn build(positions: &[Vec3], masses: &[f32], skip: &[bool]) -> Option<Self> {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut any = false;
        for (i, &p) in positions.iter().enumerate() {
            if skip[i] {
                continue;
            }
            min = min.min(p);
            max = max.max(p);
            any = true;
        }
        if !any {
            return None;
        }

        // Cube with a small margin so boundary particles land inside
        let center = (min + max) * 0.5;
        let half = ((max - min).max_element() * 0.5).max(1e-3) * 1.01;
        let mut tree = Self {
            nodes: vec![Node::new(center - Vec3::splat(half), center + Vec3::splat(half))],
        };

        for (i, &p) in positions.iter().enumerate() {
            if !skip[i] {
                tree.insert(p, masses[i], i as u32);
            }
        }
        Some(tree)
    }

    fn insert(&mut self, pos: Vec3, mass: f32, idx: u32) {
        let mut node = 0usize;
        let mut depth = 0;
        loop {
            let is_leaf = self.nodes[node].is_leaf();
            if !is_leaf && self.nodes[node].total_mass == 0.0 {
                // Empty node becomes a leaf
                let n = &mut self.nodes[node];
                n.particle = idx;
                n.leaf_pos = pos;
                n.center_of_mass = pos;
                n.total_mass = mass;
                return;
            }

            if depth >= MAX_DEPTH {
                // Coincident particles: fold into this node
                self.accumulate(node, pos, mass);
                return;
            }

            if is_leaf {
                // Push the resident particle one level down
                let n = &self.nodes[node];
                let (resident, resident_pos, resident_mass) = (n.particle, n.leaf_pos, n.total_mass);
                self.nodes[node].particle = EMPTY;
                let child = self.child_for(node, resident_pos);
                let c = &mut self.nodes[child];
                c.particle = resident;
                c.leaf_pos = resident_pos;
                c.center_of_mass = resident_pos;
                c.total_mass = resident_mass;
            }

            self.accumulate(node, pos, mass);
            node = self.child_for(node, pos);
            depth += 1;
        }
    }

    fn accumulate(&mut self, node: usize, pos: Vec3, mass: f32) {
        let n = &mut self.nodes[node];
        let total = n.total_mass + mass;
        n.center_of_mass = (n.center_of_mass * n.total_mass + pos * mass) / total;
        n.total_mass = total;
    }

    /// Child index covering `pos`, created empty if missing.
    fn child_for(&mut self, node: usize, pos: Vec3) -> usize {
        let octant = self.nodes[node].octant_of(pos);
        let existing = self.nodes[node].children[octant];
        if existing != EMPTY {
            return existing as usize;
        }
        let (lo, hi) = self.nodes[node].octant_bounds(octant);
        let id = self.nodes.len();
        self.nodes.push(Node::new(lo, hi));
        self.nodes[node].children[octant] = id as u32;
        id
    }

    /// Acceleration on particle `idx` at `pos`.
    ///
    /// Opening criterion: a node is treated as a point mass when
    /// `size / distance < theta`.
    fn acceleration(&self, pos: Vec3, idx: u32, theta: f32, softening_sq: f32, g: f32) -> Vec3 {
        let mut acc = Vec3::ZERO;
        let mut stack = vec![0usize];
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if node.particle == idx || node.total_mass < 1e-12 {
                continue;
            }
            let diff = node.center_of_mass - pos;
            let dist_sq = diff.length_squared() + softening_sq;
            let s = node.size();
            if node.is_leaf() || s * s < theta * theta * dist_sq {
                let dist = dist_sq.sqrt();
                if dist > 1e-8 {
                    acc += diff * (g * node.total_mass / (dist_sq * dist));
                }
            } else {
                stack.extend(node.children.iter().filter(|&&c| c != EMPTY).map(|&c| c as usize));
            }
        }
        acc
    }
}

/// Mutual particle attraction via Barnes-Hut, O(N log N).
///
/// Writes each particle's acceleration into `out` (overwriting it). Entries
/// flagged in `skip` neither attract nor receive acceleration.
pub fn pairwise_accelerations(
    positions: &[Vec3],
    masses: &[f32],
    skip: &[bool],
    g: f32,
    softening: f32,
    theta: f32,
    out: &mut [Vec3],
) {
    let tree = match Octree::build(positions, masses, skip) {
        Some(tree) => tree,
        None => {
            out.iter_mut().for_each(|a| *a = Vec3::ZERO);
            return;
        }
    };
    let softening_sq = softening * softening;

    let compute = |i: usize| {
        if skip[i] {
            Vec3::ZERO
        } else {
            tree.acceleration(positions[i], i as u32, theta, softening_sq, g)
        }
    };

    #[cfg(feature = "parallel")]
    out.par_iter_mut().enumerate().for_each(|(i, a)| *a = compute(i));

    #[cfg(not(feature = "parallel"))]
    out.iter_mut().enumerate().for_each(|(i, a)| *a = compute(i));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(positions: &[Vec3], masses: &[f32], theta: f32) -> Vec<Vec3> {
        let skip = vec![false; positions.len()];
        let mut out = vec![Vec3::ZERO; positions.len()];
        pairwise_accelerations(positions, masses, &skip, 1.0, 0.0, theta, &mut out);
        out
    }

    #[test]
    fn test_two_bodies_attract_by_mass() {
        let positions = [Vec3::new(-0.5, 0.0, 0.0), Vec3::new(0.5, 0.0, 0.0)];
        let acc = run(&positions, &[1.0, 3.0], 0.0);
        assert!(acc[0].x > 0.0 && acc[1].x < 0.0);
        // a0 = G * m1 / d^2 = 3, a1 = G * m0 / d^2 = 1
        assert!((acc[0].x - 3.0).abs() < 1e-3, "a0 = {}", acc[0].x);
        assert!((acc[1].x + 1.0).abs() < 1e-3, "a1 = {}", acc[1].x);
    }

    #[test]
    fn test_inverse_square_falloff() {
        let near = run(&[Vec3::ZERO, Vec3::X], &[1.0, 1.0], 0.0);
        let far = run(&[Vec3::ZERO, Vec3::X * 2.0], &[1.0, 1.0], 0.0);
        let ratio = near[0].x / far[0].x;
        assert!((ratio - 4.0).abs() < 1e-2, "ratio {ratio}");
    }

    #[test]
    fn test_approximation_close_to_exact() {
        let mut positions = vec![Vec3::ZERO];
        for i in 0..6 {
            positions.push(Vec3::new(10.0 + i as f32 * 0.1, i as f32 * 0.1, 0.0));
        }
        let masses = vec![1.0; positions.len()];
        let exact = run(&positions, &masses, 0.0);
        let approx = run(&positions, &masses, 0.7);
        let rel = (exact[0].length() - approx[0].length()).abs() / exact[0].length();
        assert!(rel < 0.1, "relative error {rel}");
    }

    #[test]
    fn test_skipped_particles_do_not_attract() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::X * -1.0];
        let skip = [false, false, true];
        let mut out = vec![Vec3::ONE; 3];
        pairwise_accelerations(&positions, &[1.0; 3], &skip, 1.0, 0.0, 0.0, &mut out);
        assert!(out[0].x > 0.0, "only the +X neighbour should pull");
        assert_eq!(out[2], Vec3::ZERO);
    }

    #[test]
    fn test_coincident_particles_terminate() {
        let positions = vec![Vec3::splat(1.0); 4];
        let acc = run(&positions, &[1.0; 4], 0.5);
        assert!(acc.iter().all(|a| a.is_finite()));
    }
}
