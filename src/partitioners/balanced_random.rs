//! Balanced random k-way: uniform random assignment repaired towards a
//! balance target by greedy, then random, then relaxed moves.

use super::InitialPartitioner;
use crate::hypergraph::Hypergraph;
use crate::util::{seeded_rng, PartIndex, VertexIndex};
use rand::Rng;

pub struct BalancedRandomKWayPartitioner {
    pub ub_factor: f32,
    pub max_iterations: usize,
}

impl Default for BalancedRandomKWayPartitioner {
    fn default() -> Self {
        Self { ub_factor: 10.0, max_iterations: 50 }
    }
}

impl InitialPartitioner for BalancedRandomKWayPartitioner {
    fn name(&self) -> &'static str {
        "balanced-random-kway"
    }

    fn partition(&self, hypergraph: &Hypergraph, num_parts: PartIndex, seed: u64) -> Option<Vec<PartIndex>> {
        let n = hypergraph.num_vertices();
        if n == 0 || num_parts == 0 {
            return None;
        }
        let mut rng = seeded_rng(seed, 1);
        let mut partition: Vec<PartIndex> = (0..n).map(|_| rng.gen_range(0..num_parts)).collect();

        let target = n / num_parts;
        let remainder = n % num_parts;
        let target_size = |p: PartIndex| target + usize::from(p < remainder);

        let mut upper_factor = self.ub_factor;
        for iteration in 0..self.max_iterations {
            let mut sizes = vec![0usize; num_parts];
            for &p in &partition {
                sizes[p] += 1;
            }
            let upper: Vec<usize> = (0..num_parts).map(|p| ((target_size(p) as f32) * (1.0 + upper_factor * 0.01)).ceil() as usize).collect();

            let overloaded: Vec<PartIndex> = (0..num_parts).filter(|&p| sizes[p] > upper[p]).collect();
            if overloaded.is_empty() {
                return Some(partition);
            }

            let mut improved = false;
            for &from in &overloaded {
                let underloaded: Vec<PartIndex> = (0..num_parts).filter(|&p| sizes[p] < target_size(p)).collect();
                if let Some(&to) = underloaded.first() {
                    if let Some(v) = partition.iter().position(|&p| p == from) {
                        partition[v] = to;
                        sizes[from] -= 1;
                        sizes[to] += 1;
                        improved = true;
                    }
                }
            }

            if !improved {
                // move random vertices out of overloaded partitions into underloaded ones
                for &from in &overloaded {
                    let underloaded: Vec<PartIndex> = (0..num_parts).filter(|&p| sizes[p] < target_size(p)).collect();
                    if underloaded.is_empty() {
                        continue;
                    }
                    let candidates: Vec<VertexIndex> = (0..n).filter(|&v| partition[v] == from).collect();
                    if let Some(&v) = candidates.get(rng.gen_range(0..candidates.len().max(1))) {
                        let to = underloaded[rng.gen_range(0..underloaded.len())];
                        partition[v] = to;
                        sizes[from] -= 1;
                        sizes[to] += 1;
                    }
                }
            }

            upper_factor = self.ub_factor * (1.0 + 0.05 * iteration as f32);
        }
        Some(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_hypergraph(n: usize) -> Hypergraph {
        Hypergraph::new(vec![vec![1.0]; n], vec![], vec![], vec![], vec![])
    }

    #[test]
    fn produces_a_dense_partition() {
        let h = uniform_hypergraph(20);
        let partitioner = BalancedRandomKWayPartitioner::default();
        let partition = partitioner.partition(&h, 4, 7).unwrap();
        assert_eq!(partition.len(), 20);
        assert!(partition.iter().all(|&p| p < 4));
    }

    #[test]
    fn balances_within_tolerance() {
        let h = uniform_hypergraph(100);
        let partitioner = BalancedRandomKWayPartitioner { ub_factor: 10.0, max_iterations: 50 };
        let partition = partitioner.partition(&h, 4, 1).unwrap();
        let mut sizes = vec![0usize; 4];
        for &p in &partition {
            sizes[p] += 1;
        }
        for &s in &sizes {
            assert!(s <= 30, "partition too large: {s}"); // target 25, upper ~27.5, allow generous slack
        }
    }
}
