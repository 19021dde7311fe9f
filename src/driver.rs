//! Runs every initial partitioner, filters outliers by cost statistics,
//! floorplans and refines the survivors in parallel, and picks the best.

use crate::cost_model::CostOracle;
use crate::fm_refiner::{FMRefiner, FmConfig};
use crate::floorplanner::{FloorplanConfig, Floorplanner, WarmStart};
use crate::hypergraph::Hypergraph;
use crate::partitioners::balanced_random::BalancedRandomKWayPartitioner;
use crate::partitioners::crossbar::CrossBarBfsPartitioner;
use crate::partitioners::kway_cut::KWayCutPartitioner;
use crate::partitioners::spectral::SpectralKMeansPartitioner;
use crate::partitioners::{num_parts_used, relabel_contiguous, InitialPartitioner};
use crate::util::{PartIndex, TechIndex};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub chiplet_set: Vec<PartIndex>,
    pub spectral_k: PartIndex,
    pub ub_factor: f32,
    pub floorplan_config: FloorplanConfig,
    pub fm_config: FmConfig,
    pub requested_threads: usize,
    pub outlier_zscore: f32,
    pub outlier_ratio: f32,
    pub min_kept: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            chiplet_set: (1..=8).collect(),
            spectral_k: 4,
            ub_factor: 10.0,
            floorplan_config: FloorplanConfig::default(),
            fm_config: FmConfig::default(),
            requested_threads: num_cpus::get(),
            outlier_zscore: 1.5,
            outlier_ratio: 2.0,
            min_kept: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverResult {
    pub partition: Vec<PartIndex>,
    pub num_parts: PartIndex,
    pub tech_per_part: Vec<TechIndex>,
    pub aspect_ratios: Vec<f32>,
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub cost: f32,
    pub valid: bool,
}

struct Candidate {
    name: &'static str,
    partition: Vec<PartIndex>,
    num_parts: PartIndex,
    tech_per_part: Vec<TechIndex>,
    cost: f32,
}

/// `Driver` co-searches nothing itself (that is `GeneticTechPartitioner`'s
/// job); it runs the fixed-tech pipeline described in §4.9.
pub struct Driver<'h, 'c> {
    hypergraph: &'h Hypergraph,
    cost_oracle: &'c dyn CostOracle,
    config: DriverConfig,
}

impl<'h, 'c> Driver<'h, 'c> {
    pub fn new(hypergraph: &'h Hypergraph, cost_oracle: &'c dyn CostOracle, config: DriverConfig) -> Self {
        Self { hypergraph, cost_oracle, config }
    }

    fn fm_config_for(&self) -> FmConfig {
        let n = self.hypergraph.num_vertices();
        // the source text's "max_move = max(0.05, 0.5)*V, refiner_iters in
        // {1,3} by threshold V > 200" is read here as: larger graphs get a
        // cheaper pass (fewer moves, one iteration), smaller graphs get a
        // more thorough one (more moves, three iterations) -- see DESIGN.md.
        let (move_fraction, refiner_iters) = if n > 200 { (0.05, 1) } else { (0.5, 3) };
        FmConfig { max_move: ((n as f32) * move_fraction).ceil().max(1.0) as usize, refiner_iters, ..self.config.fm_config }
    }

    fn make_candidate(&self, name: &'static str, raw: Option<Vec<PartIndex>>, tech: TechIndex) -> Option<Candidate> {
        let raw = raw?;
        let partition = relabel_contiguous(&raw);
        let num_parts = num_parts_used(&partition);
        let tech_per_part = vec![tech; num_parts];
        let cost = self.cost_oracle.cost(self.hypergraph, &partition, num_parts, &tech_per_part, &[], &[], &[], false);
        Some(Candidate { name, partition, num_parts, tech_per_part, cost })
    }

    fn generate_candidates(&self, tech: TechIndex, seed: u64) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let spectral = SpectralKMeansPartitioner::default();
        if let Some(c) = self.make_candidate("spectral+kmeans", spectral.partition(self.hypergraph, self.config.spectral_k, seed), tech) {
            candidates.push(c);
        }

        let crossbar = CrossBarBfsPartitioner::default();
        let balanced = BalancedRandomKWayPartitioner::default();
        let kway = KWayCutPartitioner::default();
        for &p in &self.config.chiplet_set {
            if let Some(c) = self.make_candidate("crossbar-bfs", crossbar.partition(self.hypergraph, p, seed), tech) {
                candidates.push(c);
            }
            if let Some(c) = self.make_candidate("balanced-random-kway", balanced.partition(self.hypergraph, p, seed), tech) {
                candidates.push(c);
            }
            if let Some(c) = self.make_candidate("kway-cut", kway.partition(self.hypergraph, p, seed), tech) {
                candidates.push(c);
            }
        }
        candidates
    }

    /// drop candidates whose z-score exceeds `outlier_zscore` or whose cost
    /// ratio to the minimum exceeds `outlier_ratio`; if fewer than `min_kept`
    /// survive, fall back to the `min_kept` cheapest candidates (`candidates`
    /// must already be sorted ascending by cost)
    fn filter_outliers(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if candidates.len() <= self.config.min_kept {
            return candidates;
        }
        let costs: Vec<f32> = candidates.iter().map(|c| c.cost).collect();
        let mean = costs.iter().sum::<f32>() / costs.len() as f32;
        let variance = costs.iter().map(|c| (c - mean).powi(2)).sum::<f32>() / costs.len() as f32;
        let std = variance.sqrt();
        let min_cost = costs.first().copied().unwrap_or(0.0).max(1e-9);

        let mut survivor_count = candidates
            .iter()
            .filter(|c| {
                let z = if std > 1e-9 { (c.cost - mean) / std } else { 0.0 };
                z <= self.config.outlier_zscore && c.cost / min_cost <= self.config.outlier_ratio
            })
            .count();
        if survivor_count < self.config.min_kept {
            info!(kept = survivor_count, min_kept = self.config.min_kept, "relaxing outlier thresholds to honor minimum kept count");
            survivor_count = self.config.min_kept;
        }
        let mut survivors = candidates;
        survivors.truncate(survivor_count.max(self.config.min_kept).min(survivors.len()));
        survivors
    }

    pub fn run(&self, tech: TechIndex, seed: u64) -> DriverResult {
        let candidates = self.generate_candidates(tech, seed);
        if candidates.is_empty() {
            return DriverResult { partition: vec![], num_parts: 0, tech_per_part: vec![], aspect_ratios: vec![], x: vec![], y: vec![], cost: f32::INFINITY, valid: false };
        }

        let mut candidates = candidates;
        candidates.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal));
        let total = candidates.len();
        let survivors = self.filter_outliers(candidates);
        debug!(total, kept = survivors.len(), "outlier filtering complete");

        let thread_count = self.config.requested_threads.max(1);
        let fm_config = self.fm_config_for();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(thread_count).build().expect("failed to build driver thread pool");

        let floorplan_config = self.config.floorplan_config;
        let ub_factor = self.config.ub_factor;
        let hypergraph = self.hypergraph;
        let cost_oracle = self.cost_oracle;

        let mut refined = Vec::new();
        pool.scope(|_| {
            use rayon::prelude::*;
            survivors
                .into_par_iter()
                .map(|candidate| refine_candidate(hypergraph, cost_oracle, &floorplan_config, fm_config, ub_factor, candidate, seed))
                .collect_into_vec(&mut refined);
        });

        refined
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
            .expect("at least one refined candidate when candidates is non-empty")
    }
}

fn refine_candidate(
    hypergraph: &Hypergraph,
    cost_oracle: &dyn CostOracle,
    floorplan_config: &FloorplanConfig,
    fm_config: FmConfig,
    ub_factor: f32,
    candidate: Candidate,
    seed: u64,
) -> DriverResult {
    let Candidate { name, partition, num_parts, tech_per_part, .. } = candidate;
    let result = refine_partition(hypergraph, cost_oracle, floorplan_config, fm_config, ub_factor, partition, num_parts, tech_per_part, seed);
    debug!(candidate = name, cost = result.cost, valid = result.valid, "driver candidate refined");
    result
}

/// floorplan then FM-refine one already-chosen partition; shared by `Driver`
/// (over its generated candidates) and `GeneticTechPartitioner` (over each
/// individual's own partition, per §4.10's "Driver-like refinement minus
/// outer filtering")
#[allow(clippy::too_many_arguments)]
pub fn refine_partition(
    hypergraph: &Hypergraph,
    cost_oracle: &dyn CostOracle,
    floorplan_config: &FloorplanConfig,
    fm_config: FmConfig,
    ub_factor: f32,
    mut partition: Vec<PartIndex>,
    num_parts: PartIndex,
    tech_per_part: Vec<TechIndex>,
    seed: u64,
) -> DriverResult {
    let floorplanner = Floorplanner::new(hypergraph, *floorplan_config);
    let mut warm_start = WarmStart::default();
    let floorplan = floorplanner.run(&partition, num_parts, seed, &mut warm_start, false);

    let base = vec![1.0 / num_parts as f32; num_parts];
    let upper = hypergraph.upper_balance(num_parts, ub_factor, &base);
    let lower = hypergraph.lower_balance(num_parts, ub_factor, &base);

    let refiner = FMRefiner::new(hypergraph, cost_oracle, fm_config);

    #[cfg(feature = "floorplan_gating")]
    let cost = {
        // reduced SA per §4.7: 50 steps x 10 perturbations on the hypothetical
        // partition, accepting the move only if the floorplan reports validity
        let mut gate_config = *floorplan_config;
        gate_config.max_steps = 50;
        gate_config.perturbations_per_step = 10;
        let gate_floorplanner = Floorplanner::new(hypergraph, gate_config);
        let mut gate_warm_start = WarmStart::default();
        let mut gate = |candidate_partition: &[PartIndex]| {
            let p = num_parts_used(candidate_partition);
            gate_floorplanner.run(candidate_partition, p, seed, &mut gate_warm_start, true).valid
        };
        refiner.refine(&mut partition, num_parts, &tech_per_part, &floorplan.aspect_ratios, &floorplan.x, &floorplan.y, &upper, &lower, seed, Some(&mut gate))
    };
    #[cfg(not(feature = "floorplan_gating"))]
    let cost = refiner.refine(&mut partition, num_parts, &tech_per_part, &floorplan.aspect_ratios, &floorplan.x, &floorplan.y, &upper, &lower, seed, None);

    DriverResult { partition, num_parts, tech_per_part, aspect_ratios: floorplan.aspect_ratios, x: floorplan.x, y: floorplan.y, cost, valid: floorplan.valid }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_model::{DefaultCostOracle, TechLibrary, TechNode};

    fn library() -> TechLibrary {
        TechLibrary { nodes: vec![TechNode { name: "t".into(), wafer_cost_per_area: 1.0, io_cost_per_net: 1.0, assembly_cost_per_chiplet: 2.0, test_cost_per_area: 0.5 }] }
    }

    fn linear_chain(n: usize) -> Hypergraph {
        let edges: Vec<_> = (0..n - 1).map(|i| vec![i, i + 1]).collect();
        let m = edges.len();
        Hypergraph::new(vec![vec![10.0]; n], edges, vec![vec![1.0]; m], vec![50.0; m], vec![1.0; m])
    }

    #[test]
    fn single_partition_request_is_valid_and_dense() {
        let h = linear_chain(5);
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let config = DriverConfig { chiplet_set: vec![1], requested_threads: 1, ..DriverConfig::default() };
        let driver = Driver::new(&h, &oracle, config);
        let result = driver.run(0, 42);
        assert_eq!(result.partition, vec![0, 0, 0, 0, 0]);
        assert_eq!(result.num_parts, 1);
        assert!(result.cost > 0.0);
    }

    #[test]
    fn disconnected_pairs_split_into_two_partitions_after_refinement() {
        let h = Hypergraph::new(vec![vec![1.0]; 4], vec![vec![0, 1], vec![2, 3]], vec![vec![10.0]; 2], vec![1000.0; 2], vec![1.0; 2]);
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let config = DriverConfig { chiplet_set: vec![2], requested_threads: 1, ..DriverConfig::default() };
        let driver = Driver::new(&h, &oracle, config);
        let result = driver.run(0, 7);
        assert_eq!(result.num_parts, 2);
        assert_eq!(result.partition[0], result.partition[1]);
        assert_eq!(result.partition[2], result.partition[3]);
        assert_ne!(result.partition[0], result.partition[2]);
    }
}
