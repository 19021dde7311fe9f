//! Builds chiplets and bundled nets from a partition, runs a pool of
//! [`SequencePairSA`] workers in parallel, and picks the best.

use crate::chiplet::Chiplet;
use crate::hypergraph::Hypergraph;
use crate::sequence_pair::SequencePair;
use crate::sequence_pair_sa::{CostWeights, NetRef, Normalizers, PerturbationWeights, SaConfig, SequencePairSA};
use crate::util::PartIndex;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct FloorplanConfig {
    pub max_steps: usize,
    pub perturbations_per_step: usize,
    pub requested_workers: usize,
    pub min_cooling: f32,
    pub max_cooling: f32,
    pub separation: f32,
    pub cost_weights: CostWeights,
    pub perturbation_weights: PerturbationWeights,
    pub acceptance_tolerance: f32,
}

impl Default for FloorplanConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            perturbations_per_step: 40,
            requested_workers: 4,
            min_cooling: 10.0,
            max_cooling: 50.0,
            separation: 0.5,
            cost_weights: CostWeights::default(),
            perturbation_weights: PerturbationWeights::default(),
            acceptance_tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FloorplanResult {
    pub valid: bool,
    pub aspect_ratios: Vec<f32>,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub cost_hint: f32,
}

/// warm-start slots: "local" is reused by mid-pass feasibility checks inside
/// FMRefiner, "global" is reused at pass boundaries (§3, Lifecycles)
#[derive(Debug, Clone, Default)]
pub struct WarmStart {
    pub local: Option<SequencePair>,
    pub global: Option<SequencePair>,
}

pub struct Floorplanner<'h> {
    hypergraph: &'h Hypergraph,
    config: FloorplanConfig,
}

impl<'h> Floorplanner<'h> {
    pub fn new(hypergraph: &'h Hypergraph, config: FloorplanConfig) -> Self {
        Self { hypergraph, config }
    }

    /// build one [`Chiplet`] per non-empty partition and one [`BundledNet`]
    /// per hyperedge crossing ≥2 partitions, reduced to its first two distinct
    /// partitions (frozen bundled-net policy, see DESIGN.md)
    pub fn build(&self, partition: &[PartIndex], num_parts: PartIndex) -> (Vec<Chiplet>, Vec<NetRef>, Vec<PartIndex>) {
        let mut area = vec![0.0f32; num_parts];
        for (v, &p) in partition.iter().enumerate() {
            area[p] += self.hypergraph.vertex_weights(v)[0];
        }
        // only materialize chiplets for partitions that actually contain vertices;
        // remap to a dense index space so empty partitions don't waste a worker slot
        let mut dense_of: Vec<Option<usize>> = vec![None; num_parts];
        let mut present = Vec::new();
        for p in 0..num_parts {
            if area[p] > 0.0 {
                dense_of[p] = Some(present.len());
                present.push(p);
            }
        }
        let chiplets: Vec<Chiplet> = present
            .iter()
            .map(|&p| {
                let side = area[p].max(1e-6).sqrt();
                Chiplet::new(side, side, area[p].max(1e-6), self.config.separation)
            })
            .collect();

        let mut nets = Vec::new();
        for e in 0..self.hypergraph.num_edges() {
            let mut touched: Vec<PartIndex> = Vec::new();
            for &v in self.hypergraph.vertices_of_edge(e) {
                let p = partition[v];
                if !touched.contains(&p) {
                    touched.push(p);
                }
            }
            if touched.len() >= 2 {
                let a = dense_of[touched[0]].unwrap();
                let b = dense_of[touched[1]].unwrap();
                nets.push(NetRef {
                    term_a: a,
                    term_b: b,
                    weight: self.hypergraph.edge_weights(e)[0],
                    reach: self.hypergraph.reach(e),
                    io_area: self.hypergraph.io_area(e),
                });
            }
        }
        (chiplets, nets, present)
    }

    /// run the worker pool for the partition, returning per-partition aspect
    /// ratios/coordinates aligned to `[0, num_parts)` (zero-filled for empty
    /// partitions) and a validity flag
    pub fn run(&self, partition: &[PartIndex], num_parts: PartIndex, seed: u64, warm_start: &mut WarmStart, use_local_slot: bool) -> FloorplanResult {
        let (chiplets, nets, present) = self.build(partition, num_parts);
        if chiplets.is_empty() {
            return FloorplanResult { valid: false, ..Default::default() };
        }

        let worker_count = self.config.requested_workers.clamp(2, 4);
        let steps_per_worker = (self.config.max_steps / worker_count).max(5);
        let perturb_per_worker = (self.config.perturbations_per_step / worker_count).max(4);

        // compute shared normalizers once from the initial (unperturbed) floorplan,
        // deterministically, rather than racing worker 0 for it
        let mut initial_chiplets = chiplets.clone();
        let identity = SequencePair::identity(chiplets.len());
        let (w0, h0) = identity.pack(&mut initial_chiplets);
        let area_excess0: f32 = initial_chiplets.iter().map(|c| (c.area() - c.min_area).max(0.0)).sum();
        let net_viol0: f32 = nets
            .iter()
            .map(|n| {
                crate::chiplet::net_violation(
                    &crate::chiplet::BundledNet { term_a: n.term_a, term_b: n.term_b, weight: n.weight, reach: n.reach, io_area: n.io_area },
                    &initial_chiplets[n.term_a],
                    &initial_chiplets[n.term_b],
                )
            })
            .sum();
        let normalizers = Normalizers::from_state(area_excess0, w0 * h0, net_viol0);

        let warm = if use_local_slot { warm_start.local.clone() } else { warm_start.global.clone() };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .build()
            .expect("failed to build sequence-pair-SA thread pool");

        let cost_weights = self.config.cost_weights;
        let perturbation_weights = self.config.perturbation_weights;
        let acceptance_tolerance = self.config.acceptance_tolerance;
        let min_cooling = self.config.min_cooling;
        let max_cooling = self.config.max_cooling;

        let mut results = Vec::new();
        pool.scope(|_| {
            use rayon::prelude::*;
            (0..worker_count)
                .into_par_iter()
                .map(|worker_id| {
                    let t_min = if worker_count == 1 {
                        min_cooling
                    } else {
                        min_cooling + (max_cooling - min_cooling) * worker_id as f32 / (worker_count - 1) as f32
                    };
                    let config = SaConfig {
                        max_steps: steps_per_worker,
                        perturbations_per_step: perturb_per_worker,
                        t_init: 10.0,
                        t_min: (t_min / 1000.0).max(1e-4),
                        cost_weights,
                        perturbation_weights,
                        acceptance_tolerance,
                    };
                    let rng = crate::util::seeded_rng(seed, worker_id as u64);
                    let sa = SequencePairSA::new(chiplets.clone(), nets_clone(&nets), warm.clone(), normalizers, config, rng);
                    sa.run()
                })
                .collect_into_vec(&mut results);
        });

        let best = results
            .into_iter()
            .reduce(|a, b| {
                let a_better = match (a.valid, b.valid) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => a.cost <= b.cost,
                };
                if a_better {
                    a
                } else {
                    b
                }
            })
            .expect("at least one worker must run when chiplets is non-empty");

        debug!(valid = best.valid, cost = best.cost, "floorplanner selected best worker");

        if use_local_slot {
            warm_start.local = Some(best.sequence_pair.clone());
        } else {
            warm_start.global = Some(best.sequence_pair.clone());
        }

        let mut aspect_ratios = vec![0.0f32; num_parts];
        let mut x = vec![0.0f32; num_parts];
        let mut y = vec![0.0f32; num_parts];
        for (dense_idx, &p) in present.iter().enumerate() {
            aspect_ratios[p] = best.chiplets[dense_idx].aspect_ratio();
            x[p] = best.chiplets[dense_idx].x;
            y[p] = best.chiplets[dense_idx].y;
        }

        FloorplanResult { valid: best.valid, aspect_ratios, x, y, cost_hint: best.cost }
    }
}

fn nets_clone(nets: &[NetRef]) -> Vec<NetRef> {
    nets.iter().map(|n| NetRef { term_a: n.term_a, term_b: n.term_b, weight: n.weight, reach: n.reach, io_area: n.io_area }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vertex_two_edge_hypergraph() -> Hypergraph {
        Hypergraph::new(
            vec![vec![100.0], vec![100.0], vec![100.0], vec![100.0]],
            vec![vec![0, 1], vec![2, 3]],
            vec![vec![1.0], vec![1.0]],
            vec![1000.0, 1000.0],
            vec![1.0, 1.0],
        )
    }

    #[test]
    fn builds_one_chiplet_per_nonempty_partition() {
        let h = two_vertex_two_edge_hypergraph();
        let fp = Floorplanner::new(&h, FloorplanConfig::default());
        let (chiplets, nets, present) = fp.build(&[0, 0, 1, 1], 2);
        assert_eq!(chiplets.len(), 2);
        assert_eq!(present, vec![0, 1]);
        assert!(nets.is_empty(), "both edges are internal to a partition");
    }

    #[test]
    fn cross_partition_edge_becomes_a_bundled_net() {
        let h = two_vertex_two_edge_hypergraph();
        let fp = Floorplanner::new(&h, FloorplanConfig::default());
        let (_, nets, _) = fp.build(&[0, 1, 0, 1], 2);
        assert_eq!(nets.len(), 2);
    }

    #[test]
    fn no_chiplets_built_yields_invalid_result() {
        let h = Hypergraph::new(vec![], vec![], vec![], vec![], vec![]);
        let fp = Floorplanner::new(&h, FloorplanConfig::default());
        let mut warm = WarmStart::default();
        let result = fp.run(&[], 0, 42, &mut warm, false);
        assert!(!result.valid);
        assert!(result.aspect_ratios.is_empty());
    }

    #[test]
    fn single_nonempty_partition_floorplan_is_valid() {
        let h = Hypergraph::new(vec![vec![1.0]], vec![], vec![], vec![], vec![]);
        let fp = Floorplanner::new(&h, FloorplanConfig::default());
        let mut warm = WarmStart::default();
        let result = fp.run(&[0], 1, 42, &mut warm, false);
        assert!(result.valid);
        assert_eq!(result.aspect_ratios.len(), 1);
    }

    #[test]
    fn single_partition_floorplan_is_valid_with_reasonable_aspect_ratio() {
        let h = two_vertex_two_edge_hypergraph();
        let fp = Floorplanner::new(&h, FloorplanConfig::default());
        let mut warm = WarmStart::default();
        let result = fp.run(&[0, 0, 0, 0], 1, 7, &mut warm, false);
        assert!(result.valid);
        assert!((result.aspect_ratios[0] - 1.0).abs() < 2.0);
    }
}
