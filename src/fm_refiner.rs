//! K-way Fiduccia-Mattigeyses style refinement driven by a [`CostOracle`] as
//! gain source, with boundary-vertex discovery and best-prefix rollback.

use crate::cost_model::CostOracle;
use crate::gain_bucket::{best_legal_candidate, GainBucket, VertexGain};
use crate::hypergraph::Hypergraph;
use crate::util::{lexicographic_cmp, seeded_rng, PartIndex, TechIndex, VertexIndex, WeightVec};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct FmConfig {
    pub max_move: usize,
    pub refiner_iters: usize,
    /// fraction of interior (non-boundary) vertices reservoir-sampled into the
    /// boundary set each pass, per §4.6
    pub random_non_boundary_ratio: f32,
    /// traversal depth `GetBestCandidate` shelves before giving up on a bucket
    pub gating_max_depth: usize,
}

impl Default for FmConfig {
    fn default() -> Self {
        Self { max_move: 64, refiner_iters: 3, random_non_boundary_ratio: 0.05, gating_max_depth: 32 }
    }
}

pub struct FMRefiner<'h, 'c> {
    hypergraph: &'h Hypergraph,
    cost_oracle: &'c dyn CostOracle,
    config: FmConfig,
}

impl<'h, 'c> FMRefiner<'h, 'c> {
    pub fn new(hypergraph: &'h Hypergraph, cost_oracle: &'c dyn CostOracle, config: FmConfig) -> Self {
        Self { hypergraph, cost_oracle, config }
    }

    fn boundary_set(&self, partition: &[PartIndex], seed: u64) -> Vec<VertexIndex> {
        let n = self.hypergraph.num_vertices();
        let mut boundary = Vec::new();
        let mut interior = Vec::new();
        for v in 0..n {
            let mut touched: Vec<PartIndex> = Vec::new();
            for &e in self.hypergraph.edges_of_vertex(v) {
                for &u in self.hypergraph.vertices_of_edge(e) {
                    let p = partition[u];
                    if !touched.contains(&p) {
                        touched.push(p);
                    }
                }
            }
            if touched.len() >= 2 {
                boundary.push(v);
            } else {
                interior.push(v);
            }
        }

        let mut rng = seeded_rng(seed, 0);
        let sample_count = ((interior.len() as f32) * self.config.random_non_boundary_ratio).round() as usize;
        if sample_count > 0 {
            interior.shuffle(&mut rng);
            boundary.extend(interior.into_iter().take(sample_count));
        }
        boundary.shuffle(&mut rng);
        boundary
    }

    fn block_balance(&self, partition: &[PartIndex], num_parts: PartIndex) -> Vec<WeightVec> {
        let dv = self.hypergraph.vertex_weight_dim();
        let mut balance = vec![vec![0.0f32; dv]; num_parts];
        for (v, &p) in partition.iter().enumerate() {
            for (b, w) in balance[p].iter_mut().zip(self.hypergraph.vertex_weights(v).iter()) {
                *b += w;
            }
        }
        balance
    }

    fn cost_with_override(
        &self,
        partition: &mut [PartIndex],
        num_parts: PartIndex,
        tech_per_part: &[TechIndex],
        aspect_ratios: &[f32],
        x: &[f32],
        y: &[f32],
        v: VertexIndex,
        to: PartIndex,
    ) -> f32 {
        let saved = partition[v];
        partition[v] = to;
        let cost = self.cost_oracle.cost(self.hypergraph, partition, num_parts, tech_per_part, aspect_ratios, x, y, true);
        partition[v] = saved;
        cost
    }

    /// single FM pass; mutates `partition`/`block_balance` in place (rolled
    /// back to the best-prefix point before returning) and returns the best
    /// cumulative gain achieved
    #[allow(clippy::too_many_arguments)]
    fn pass(
        &self,
        partition: &mut Vec<PartIndex>,
        num_parts: PartIndex,
        tech_per_part: &[TechIndex],
        aspect_ratios: &[f32],
        x: &[f32],
        y: &[f32],
        upper: &[WeightVec],
        lower: &[WeightVec],
        legacy_cost: f32,
        seed: u64,
        mut gate: Option<&mut dyn FnMut(&[PartIndex]) -> bool>,
    ) -> f32 {
        let boundary = self.boundary_set(partition, seed);
        let mut block_balance = self.block_balance(partition, num_parts);
        let mut current_cost = legacy_cost;

        let mut buckets: Vec<GainBucket> = (0..num_parts).map(|_| GainBucket::new()).collect();
        let mut visited = vec![false; self.hypergraph.num_vertices()];
        for &v in &boundary {
            let from = partition[v];
            for p in 0..num_parts {
                if p == from {
                    continue;
                }
                let cost = self.cost_with_override(partition, num_parts, tech_per_part, aspect_ratios, x, y, v, p);
                let gain = current_cost - cost;
                buckets[p].insert(VertexGain { v, from, to: p, gain }, self.hypergraph.vertex_weights(v));
            }
        }

        let weight_of = |v: VertexIndex| self.hypergraph.vertex_weights(v).clone();
        let mut trace: Vec<(VertexIndex, PartIndex, PartIndex, WeightVec)> = Vec::new();
        let mut cumulative_gain = 0.0f32;
        let mut best_cum_gain = 0.0f32;
        let mut best_move_index: Option<usize> = None;

        for _ in 0..self.config.max_move {
            let mut candidates: Vec<(PartIndex, VertexGain)> = Vec::new();
            for p in 0..num_parts {
                if buckets[p].is_empty() {
                    continue;
                }
                if let Some(candidate) = best_legal_candidate(&mut buckets[p], &block_balance, weight_of, upper, lower, self.config.gating_max_depth) {
                    candidates.push((p, candidate));
                }
            }
            if candidates.is_empty() {
                break;
            }
            candidates.sort_by(|(_, a), (_, b)| b.gain.partial_cmp(&a.gain).unwrap_or(std::cmp::Ordering::Equal).then_with(|| {
                lexicographic_cmp(&weight_of(a.v), &weight_of(b.v))
            }));

            let mut chosen: Option<usize> = None;
            if let Some(gate_fn) = gate.as_deref_mut() {
                for (idx, (_, candidate)) in candidates.iter().enumerate() {
                    let saved = partition[candidate.v];
                    partition[candidate.v] = candidate.to;
                    let feasible = gate_fn(partition);
                    partition[candidate.v] = saved;
                    if feasible {
                        chosen = Some(idx);
                        break;
                    }
                }
            } else {
                chosen = Some(0);
            }

            // a boundary vertex is offered by every destination bucket it's
            // legal for, so the same `v` can surface as the top candidate of
            // more than one bucket this round (only impossible when
            // num_parts == 2); once the chosen copy moves `v`, every other
            // copy's `from` is stale and must be dropped, not reinserted
            let moved_v = chosen.and_then(|idx| candidates.get(idx)).map(|(_, c)| c.v);

            // put every non-chosen (and, if nothing chosen, every) candidate back,
            // except stale duplicates of the vertex that is moving this round
            for (idx, (p, candidate)) in candidates.into_iter().enumerate() {
                if Some(idx) == chosen {
                    let v = candidate.v;
                    let from = candidate.from;
                    let to = candidate.to;
                    let gain = candidate.gain;
                    let weight = weight_of(v);

                    for (b, w) in block_balance[to].iter_mut().zip(weight.iter()) {
                        *b += w;
                    }
                    for (b, w) in block_balance[from].iter_mut().zip(weight.iter()) {
                        *b -= w;
                    }
                    partition[v] = to;
                    current_cost -= gain;
                    visited[v] = true;
                    trace.push((v, from, to, weight));
                    cumulative_gain += gain;
                    if cumulative_gain > best_cum_gain {
                        best_cum_gain = cumulative_gain;
                        best_move_index = Some(trace.len() - 1);
                    }

                    for p2 in 0..num_parts {
                        buckets[p2].remove(v);
                    }
                    for u in self.hypergraph.neighbors(v) {
                        if visited[u] || !buckets.iter().any(|b| b.contains(u)) {
                            continue;
                        }
                        for p2 in 0..num_parts {
                            if p2 == partition[u] || !buckets[p2].contains(u) {
                                continue;
                            }
                            let cost = self.cost_with_override(partition, num_parts, tech_per_part, aspect_ratios, x, y, u, p2);
                            let new_gain = current_cost - cost;
                            buckets[p2].change_priority(u, new_gain, self.hypergraph.vertex_weights(u));
                        }
                    }
                } else if Some(candidate.v) != moved_v {
                    buckets[p].insert(candidate, self.hypergraph.vertex_weights(candidate.v));
                }
            }
            if chosen.is_none() {
                break;
            }
        }

        let rollback_from = trace.len();
        let keep = best_move_index.map(|i| i + 1).unwrap_or(0);
        for (v, from, _to, weight) in trace[keep..rollback_from].iter().rev() {
            partition[*v] = *from;
        }
        debug!(moves_kept = keep, moves_total = rollback_from, best_cum_gain, "fm pass complete");
        best_cum_gain
    }

    /// run up to `refiner_iters` passes, stopping early at non-positive gain;
    /// returns the final cost (recomputed from scratch after the last pass)
    #[allow(clippy::too_many_arguments)]
    pub fn refine(
        &self,
        partition: &mut Vec<PartIndex>,
        num_parts: PartIndex,
        tech_per_part: &[TechIndex],
        aspect_ratios: &[f32],
        x: &[f32],
        y: &[f32],
        upper: &[WeightVec],
        lower: &[WeightVec],
        seed: u64,
        mut gate: Option<&mut dyn FnMut(&[PartIndex]) -> bool>,
    ) -> f32 {
        let mut legacy_cost = self.cost_oracle.cost(self.hypergraph, partition, num_parts, tech_per_part, aspect_ratios, x, y, false);
        for iteration in 0..self.config.refiner_iters {
            let gain = self.pass(
                partition,
                num_parts,
                tech_per_part,
                aspect_ratios,
                x,
                y,
                upper,
                lower,
                legacy_cost,
                seed.wrapping_add(iteration as u64),
                gate.as_deref_mut(),
            );
            legacy_cost = self.cost_oracle.cost(self.hypergraph, partition, num_parts, tech_per_part, aspect_ratios, x, y, false);
            if gain <= 0.0 {
                break;
            }
        }
        legacy_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_model::{DefaultCostOracle, TechLibrary, TechNode};

    fn library() -> TechLibrary {
        TechLibrary { nodes: vec![TechNode { name: "t".into(), wafer_cost_per_area: 1.0, io_cost_per_net: 1.0, assembly_cost_per_chiplet: 0.0, test_cost_per_area: 0.0 }] }
    }

    fn disconnected_pairs() -> Hypergraph {
        Hypergraph::new(
            vec![vec![1.0]; 4],
            vec![vec![0, 1], vec![2, 3]],
            vec![vec![10.0]; 2],
            vec![1000.0; 2],
            vec![1.0; 2],
        )
    }

    #[test]
    fn refine_reduces_cost_on_a_misplaced_pair() {
        let h = disconnected_pairs();
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let refiner = FMRefiner::new(&h, &oracle, FmConfig::default());
        // {0,1} split across partitions, {2,3} also split: worst case cut
        let mut partition = vec![0, 1, 0, 1];
        let before = oracle.cost(&h, &partition, 2, &[0, 0], &[], &[], &[], false);
        let upper = h.upper_balance(2, 50.0, &[0.5, 0.5]);
        let lower = h.lower_balance(2, 50.0, &[0.5, 0.5]);
        let after = refiner.refine(&mut partition, 2, &[0, 0], &[], &[], &[], &upper, &lower, 1, None);
        assert!(after <= before + 1e-6);
        assert_eq!(partition[0], partition[1]);
        assert_eq!(partition[2], partition[3]);
    }

    #[test]
    fn refine_never_worsens_a_trivial_single_partition() {
        let h = disconnected_pairs();
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let refiner = FMRefiner::new(&h, &oracle, FmConfig::default());
        let mut partition = vec![0, 0, 0, 0];
        let before = oracle.cost(&h, &partition, 1, &[0], &[], &[], &[], false);
        let upper = h.upper_balance(1, 50.0, &[1.0]);
        let lower = h.lower_balance(1, 50.0, &[1.0]);
        let after = refiner.refine(&mut partition, 1, &[0], &[], &[], &[], &upper, &lower, 1, None);
        assert!(after <= before + 1e-6);
    }

    #[test]
    fn refine_stays_correct_with_more_than_two_partitions() {
        // a boundary vertex is offered by every destination bucket it is legal
        // for, so with num_parts > 2 the same vertex can be the top candidate
        // of more than one bucket in a single round; this must not corrupt
        // block_balance/partition via a stale duplicate being reapplied later
        let n = 9;
        let edges: Vec<_> = (0..n - 1).map(|i| vec![i, i + 1]).collect();
        let m = edges.len();
        let h = Hypergraph::new(vec![vec![1.0]; n], edges, vec![vec![1.0]; m], vec![1000.0; m], vec![1.0; m]);
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let refiner = FMRefiner::new(&h, &oracle, FmConfig::default());
        let num_parts = 4;
        let mut partition: Vec<PartIndex> = (0..n).map(|v| v % num_parts).collect();
        let tech_per_part = vec![0; num_parts];
        let before = oracle.cost(&h, &partition, num_parts, &tech_per_part, &[], &[], &[], false);
        let base = vec![1.0 / num_parts as f32; num_parts];
        let upper = h.upper_balance(num_parts, 50.0, &base);
        let lower = h.lower_balance(num_parts, 50.0, &base);
        let after = refiner.refine(&mut partition, num_parts, &tech_per_part, &[], &[], &[], &upper, &lower, 3, None);
        assert!(after <= before + 1e-6);
        assert!(partition.iter().all(|&p| p < num_parts));
    }
}
