//! Genetic outer loop co-searching `(num_partitions, vertex→partition map,
//! partition→tech map)`.

use crate::cost_model::CostOracle;
use crate::driver::{refine_partition, DriverConfig};
use crate::hypergraph::Hypergraph;
use crate::partitioners::crossbar::CrossBarBfsPartitioner;
use crate::partitioners::kway_cut::KWayCutPartitioner;
use crate::partitioners::spectral::SpectralKMeansPartitioner;
use crate::partitioners::{num_parts_used, relabel_contiguous, InitialPartitioner};
use crate::util::{seeded_rng, PartIndex, TechIndex};
use rand::Rng;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub generations: usize,
    pub tournament_size: usize,
    pub crossover_rate: f32,
    pub mutation_rate: f32,
    pub patience: usize,
    pub min_p: PartIndex,
    pub max_p: PartIndex,
    pub elitism: usize,
    pub driver_config: DriverConfig,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            tournament_size: 3,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            patience: 5,
            min_p: 1,
            max_p: 8,
            elitism: 2,
            driver_config: DriverConfig::default(),
        }
    }
}

/// `(P, π, τ, cost, valid)`, per §3's Data Model.
#[derive(Debug, Clone)]
pub struct GeneticSolution {
    pub num_parts: PartIndex,
    pub partition: Vec<PartIndex>,
    pub tech_per_part: Vec<TechIndex>,
    pub cost: f32,
    pub valid: bool,
    evaluated: bool,
}

impl GeneticSolution {
    fn new(num_parts: PartIndex, partition: Vec<PartIndex>, tech_per_part: Vec<TechIndex>) -> Self {
        Self { num_parts, partition, tech_per_part, cost: f32::INFINITY, valid: false, evaluated: false }
    }

    fn repair(&mut self, num_techs: usize, rng: &mut impl Rng) {
        self.partition = relabel_contiguous(&self.partition);
        self.num_parts = num_parts_used(&self.partition);
        if self.tech_per_part.len() > self.num_parts {
            self.tech_per_part.truncate(self.num_parts);
        }
        while self.tech_per_part.len() < self.num_parts {
            self.tech_per_part.push(rng.gen_range(0..num_techs.max(1)));
        }
        self.evaluated = false;
    }
}

pub struct GeneticTechPartitioner<'h, 'c> {
    hypergraph: &'h Hypergraph,
    cost_oracle: &'c dyn CostOracle,
    num_techs: usize,
    config: GeneticConfig,
}

impl<'h, 'c> GeneticTechPartitioner<'h, 'c> {
    pub fn new(hypergraph: &'h Hypergraph, cost_oracle: &'c dyn CostOracle, num_techs: usize, config: GeneticConfig) -> Self {
        Self { hypergraph, cost_oracle, num_techs, config }
    }

    fn random_tech_assignment(&self, num_parts: PartIndex, rng: &mut impl Rng) -> Vec<TechIndex> {
        (0..num_parts).map(|_| rng.gen_range(0..self.num_techs.max(1))).collect()
    }

    /// diversified initial population: some individuals from the k-way cut
    /// fallback, some spectral, the remainder random, spread across
    /// `[min_p, max_p]`
    fn initialize(&self, seed: u64) -> Vec<GeneticSolution> {
        let n = self.hypergraph.num_vertices();
        let span = (self.config.max_p - self.config.min_p + 1).max(1);
        let mut population = Vec::with_capacity(self.config.population_size);
        let spectral = SpectralKMeansPartitioner::default();
        let crossbar = CrossBarBfsPartitioner::default();
        let kway = KWayCutPartitioner::default();

        for i in 0..self.config.population_size {
            let p = self.config.min_p + (i % span);
            let mut rng = seeded_rng(seed, i as u64);
            let raw = match i % 3 {
                0 => kway.partition(self.hypergraph, p, seed + i as u64),
                1 => spectral.partition(self.hypergraph, p, seed + i as u64),
                _ => crossbar.partition(self.hypergraph, p, seed + i as u64),
            }
            .unwrap_or_else(|| (0..n).map(|v| v % p).collect());
            let partition = relabel_contiguous(&raw);
            let num_parts = num_parts_used(&partition);
            let tech_per_part = self.random_tech_assignment(num_parts, &mut rng);
            population.push(GeneticSolution::new(num_parts, partition, tech_per_part));
        }
        population
    }

    /// "Driver-like refinement minus outer filtering" (§4.10 step 1): floorplan
    /// and FM-refine this individual's own starting partition directly, rather
    /// than generating and filtering a fresh set of candidates.
    fn evaluate(&self, individual: &mut GeneticSolution, seed: u64) {
        if individual.evaluated {
            return;
        }
        let result = refine_partition(
            self.hypergraph,
            self.cost_oracle,
            &self.config.driver_config.floorplan_config,
            self.config.driver_config.fm_config,
            self.config.driver_config.ub_factor,
            individual.partition.clone(),
            individual.num_parts,
            individual.tech_per_part.clone(),
            seed,
        );
        individual.partition = result.partition;
        individual.cost = result.cost;
        individual.valid = result.valid;
        individual.evaluated = true;
    }

    fn tournament_select<'p>(&self, population: &'p [GeneticSolution], rng: &mut impl Rng) -> &'p GeneticSolution {
        let mut best: Option<&GeneticSolution> = None;
        for _ in 0..self.config.tournament_size.max(1) {
            let candidate = &population[rng.gen_range(0..population.len())];
            best = Some(match best {
                Some(b) if b.cost <= candidate.cost => b,
                _ => candidate,
            });
        }
        best.expect("tournament_size >= 1")
    }

    /// per-vertex inheritance from `a`/`b`, projected to `P' = choice(P_a,
    /// P_b)` via mod-then-contiguous-relabel (frozen policy, see DESIGN.md)
    fn crossover(&self, a: &GeneticSolution, b: &GeneticSolution, rng: &mut impl Rng) -> GeneticSolution {
        let target_p = if rng.gen_bool(0.5) { a.num_parts } else { b.num_parts };
        let raw: Vec<PartIndex> = (0..self.hypergraph.num_vertices())
            .map(|v| {
                let from_a = rng.gen_bool(0.5);
                let src = if from_a { a.partition[v] } else { b.partition[v] };
                src % target_p.max(1)
            })
            .collect();
        let partition = relabel_contiguous(&raw);
        let num_parts = num_parts_used(&partition);

        let (short, long) = if a.tech_per_part.len() <= b.tech_per_part.len() { (a, b) } else { (b, a) };
        let cut = rng.gen_range(0..=short.tech_per_part.len());
        let mut tech_per_part = short.tech_per_part[..cut].to_vec();
        while tech_per_part.len() < num_parts {
            if tech_per_part.len() < long.tech_per_part.len() {
                tech_per_part.push(long.tech_per_part[tech_per_part.len()]);
            } else {
                tech_per_part.push(rng.gen_range(0..self.num_techs.max(1)));
            }
        }
        tech_per_part.truncate(num_parts);

        GeneticSolution::new(num_parts, partition, tech_per_part)
    }

    fn mutate(&self, individual: &mut GeneticSolution, rng: &mut impl Rng) {
        match rng.gen_range(0..3) {
            0 => {
                let v = rng.gen_range(0..individual.partition.len());
                individual.partition[v] = rng.gen_range(0..individual.num_parts.max(1));
            }
            1 => {
                if individual.num_parts > 0 {
                    let p = rng.gen_range(0..individual.num_parts);
                    individual.tech_per_part[p] = rng.gen_range(0..self.num_techs.max(1));
                }
            }
            _ => {
                let grow = rng.gen_bool(0.5);
                let new_p = if grow { individual.num_parts + 1 } else { individual.num_parts.saturating_sub(1) };
                let new_p = new_p.clamp(self.config.min_p, self.config.max_p);
                if new_p != individual.num_parts && new_p > 0 {
                    for p in individual.partition.iter_mut() {
                        if *p >= new_p {
                            *p = new_p - 1;
                        }
                    }
                    individual.num_parts = new_p;
                }
            }
        }
        individual.evaluated = false;
    }

    pub fn run(&self, seed: u64) -> GeneticSolution {
        self.run_with_progress(seed, |_, _, _| {})
    }

    /// Same search as [`Self::run`], calling `on_generation(generation,
    /// total_generations, best_cost_so_far)` after each generation settles —
    /// the hook the CLI uses to drive a progress bar.
    pub fn run_with_progress(&self, seed: u64, mut on_generation: impl FnMut(usize, usize, f32)) -> GeneticSolution {
        let mut rng = seeded_rng(seed, 0);
        let mut population = self.initialize(seed);
        for individual in population.iter_mut() {
            individual.repair(self.num_techs, &mut rng);
            self.evaluate(individual, seed);
        }

        let mut best = population.iter().min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal)).cloned().expect("non-empty population");
        let mut generations_without_improvement = 0usize;
        let mut cost_cache: HashMap<(PartIndex, Vec<PartIndex>, Vec<TechIndex>), f32> = HashMap::new();

        for generation in 0..self.config.generations {
            let mut elites: Vec<GeneticSolution> = population.clone();
            elites.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal));
            elites.truncate(self.config.elitism);

            let mut next_generation = Vec::with_capacity(self.config.population_size);
            next_generation.extend(elites.into_iter());

            while next_generation.len() < self.config.population_size {
                let parent_a = self.tournament_select(&population, &mut rng);
                let parent_b = self.tournament_select(&population, &mut rng);
                let mut child = if rng.gen::<f32>() < self.config.crossover_rate {
                    self.crossover(parent_a, parent_b, &mut rng)
                } else {
                    parent_a.clone()
                };
                if rng.gen::<f32>() < self.config.mutation_rate {
                    self.mutate(&mut child, &mut rng);
                }
                child.repair(self.num_techs, &mut rng);
                next_generation.push(child);
            }

            for individual in next_generation.iter_mut() {
                let key = (individual.num_parts, individual.partition.clone(), individual.tech_per_part.clone());
                if let Some(&cached) = cost_cache.get(&key) {
                    individual.cost = cached;
                    individual.valid = true;
                    individual.evaluated = true;
                } else {
                    self.evaluate(individual, seed + generation as u64);
                    cost_cache.insert(key, individual.cost);
                }
            }

            population = next_generation;
            let generation_best = population.iter().min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal)).cloned().expect("non-empty population");
            if generation_best.cost < best.cost - 1e-6 {
                best = generation_best;
                generations_without_improvement = 0;
            } else {
                generations_without_improvement += 1;
            }
            info!(generation, best_cost = best.cost, "genetic generation complete");
            on_generation(generation + 1, self.config.generations, best.cost);
            if generations_without_improvement >= self.config.patience {
                info!(generation, "stopping early: no improvement within patience window");
                break;
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_model::{DefaultCostOracle, TechLibrary, TechNode};

    fn library_with_gradient() -> TechLibrary {
        TechLibrary {
            nodes: vec![
                TechNode { name: "t1".into(), wafer_cost_per_area: 2.0, io_cost_per_net: 0.1, assembly_cost_per_chiplet: 1.0, test_cost_per_area: 0.1 },
                TechNode { name: "t2".into(), wafer_cost_per_area: 0.5, io_cost_per_net: 0.1, assembly_cost_per_chiplet: 1.0, test_cost_per_area: 0.1 },
                TechNode { name: "t3".into(), wafer_cost_per_area: 3.0, io_cost_per_net: 0.1, assembly_cost_per_chiplet: 1.0, test_cost_per_area: 0.1 },
            ],
        }
    }

    fn chain(n: usize) -> Hypergraph {
        let edges: Vec<_> = (0..n - 1).map(|i| vec![i, i + 1]).collect();
        let m = edges.len();
        Hypergraph::new(vec![vec![50.0]; n], edges, vec![vec![1.0]; m], vec![100.0; m], vec![1.0; m])
    }

    #[test]
    fn converges_to_a_valid_solution_with_positive_cost() {
        let h = chain(12);
        let lib = library_with_gradient();
        let oracle = DefaultCostOracle::new(&lib);
        let config = GeneticConfig { population_size: 8, generations: 4, driver_config: DriverConfig { requested_threads: 1, ..DriverConfig::default() }, ..GeneticConfig::default() };
        let partitioner = GeneticTechPartitioner::new(&h, &oracle, lib.len(), config);
        let best = partitioner.run(1);
        assert!(best.valid);
        assert!(best.cost > 0.0);
        assert_eq!(best.tech_per_part.len(), best.num_parts);
    }

    #[test]
    fn favors_the_cheapest_tech_for_a_uniform_single_partition() {
        let h = chain(6);
        let lib = library_with_gradient();
        let oracle = DefaultCostOracle::new(&lib);
        let config = GeneticConfig {
            population_size: 10,
            generations: 6,
            min_p: 1,
            max_p: 1,
            driver_config: DriverConfig { chiplet_set: vec![1], requested_threads: 1, ..DriverConfig::default() },
            ..GeneticConfig::default()
        };
        let partitioner = GeneticTechPartitioner::new(&h, &oracle, lib.len(), config);
        let best = partitioner.run(3);
        assert_eq!(best.num_parts, 1);
        assert_eq!(best.tech_per_part[0], 1, "t2 has the lowest wafer cost and should be favored");
    }
}
