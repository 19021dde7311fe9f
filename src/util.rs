//! Shared type aliases and small helpers used across the engine.

use rand_xoshiro::rand_core::SeedableRng;

/// index of a vertex (IP block) in the hypergraph, `[0, num_vertices)`
pub type VertexIndex = usize;
/// index of a hyperedge (net) in the hypergraph, `[0, num_edges)`
pub type EdgeIndex = usize;
/// index of a partition (chiplet), `[0, num_partitions)`
pub type PartIndex = usize;
/// index of a fabrication technology node in a [`crate::cost_model::TechLibrary`]
pub type TechIndex = usize;

/// the RNG used everywhere a deterministic, seedable stream is required; each
/// parallel worker seeds its own instance as `seed + worker_id` so runs are
/// reproducible across thread counts as long as the cost model is deterministic
pub type DeterministicRng = rand_xoshiro::Xoshiro256StarStar;

/// seed one RNG per worker, offset from a base seed as required by the
/// determinism contract in the concurrency model
pub fn seeded_rng(base_seed: u64, worker_id: u64) -> DeterministicRng {
    DeterministicRng::seed_from_u64(base_seed.wrapping_add(worker_id))
}

/// a weight vector attached to a vertex or an edge; component 0 is always the
/// "primary" weight (area for vertices, bandwidth for edges)
pub type WeightVec = Vec<f32>;

/// lexicographic comparison of two weight vectors, used to break gain ties in
/// [`crate::gain_bucket::GainBucket`]
pub fn lexicographic_cmp(a: &[f32], b: &[f32]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.partial_cmp(y) {
            Some(std::cmp::Ordering::Equal) | None => continue,
            Some(other) => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// clamp a value into `[lo, hi]`
pub fn clampf(v: f32, lo: f32, hi: f32) -> f32 {
    v.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexicographic_cmp_orders_by_first_differing_component() {
        assert_eq!(lexicographic_cmp(&[1.0, 2.0], &[1.0, 3.0]), std::cmp::Ordering::Less);
        assert_eq!(lexicographic_cmp(&[2.0], &[1.0, 100.0]), std::cmp::Ordering::Greater);
        assert_eq!(lexicographic_cmp(&[1.0, 2.0], &[1.0, 2.0]), std::cmp::Ordering::Equal);
    }

    #[test]
    fn seeded_rng_is_deterministic_per_worker() {
        use rand::RngCore;
        let mut a = seeded_rng(42, 3);
        let mut b = seeded_rng(42, 3);
        assert_eq!(a.next_u64(), b.next_u64());
        let mut c = seeded_rng(42, 4);
        assert_ne!(seeded_rng(42, 3).next_u64(), c.next_u64());
    }
}
