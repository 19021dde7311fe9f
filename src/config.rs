//! `EngineConfig`: every tunable named in spec §4, bundled into one
//! serde-deserializable struct so the CLI can load an override file and
//! individual flags can patch it afterwards.

use crate::driver::DriverConfig;
use crate::fm_refiner::FmConfig;
use crate::floorplanner::FloorplanConfig;
use crate::genetic::GeneticConfig;
use crate::sequence_pair_sa::{CostWeights, PerturbationWeights};
use crate::util::PartIndex;
use serde::{Deserialize, Serialize};

/// top-level tunables for one engine run; `Default` matches the values named
/// throughout spec.md (chiplet_set `{1..8}`, ub_factor 10%, etc.)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// candidate partition counts the Driver sweeps, spec §4.9 step 2
    pub chiplet_set: Vec<PartIndex>,
    /// `k` passed to the spectral+k-means partitioner
    pub spectral_k: PartIndex,
    /// balance envelope half-width, in percent, spec §4.1
    pub ub_factor: f32,
    /// outlier z-score threshold, spec §4.9 step 4
    pub outlier_zscore: f32,
    /// outlier cost-ratio threshold, spec §4.9 step 4
    pub outlier_ratio: f32,
    /// minimum candidates kept after outlier filtering, spec §9
    pub min_kept: usize,
    /// maximum OS threads the engine may use; 0 means uncapped (`num_cpus::get()`)
    pub max_threads: usize,
    /// whether the per-move floorplan-feasibility gate (spec §4.7) is active;
    /// the reference implementation disables it by default (spec §9)
    pub floorplan_gating: bool,
    pub sa_max_steps: usize,
    pub sa_perturbations_per_step: usize,
    pub sa_requested_workers: usize,
    pub sa_min_cooling: f32,
    pub sa_max_cooling: f32,
    pub sa_acceptance_tolerance: f32,
    pub sa_cost_weights: CostWeights,
    pub sa_perturbation_weights: PerturbationWeights,
    pub genetic_population: usize,
    pub genetic_generations: usize,
    pub genetic_tournament_size: usize,
    pub genetic_crossover_rate: f32,
    pub genetic_mutation_rate: f32,
    pub genetic_patience: usize,
    pub genetic_elitism: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chiplet_set: (1..=8).collect(),
            spectral_k: 4,
            ub_factor: 10.0,
            outlier_zscore: 1.5,
            outlier_ratio: 2.0,
            min_kept: 3,
            max_threads: 0,
            floorplan_gating: false,
            sa_max_steps: 200,
            sa_perturbations_per_step: 40,
            sa_requested_workers: 4,
            sa_min_cooling: 10.0,
            sa_max_cooling: 50.0,
            sa_acceptance_tolerance: 1e-3,
            sa_cost_weights: CostWeights::default(),
            sa_perturbation_weights: PerturbationWeights::default(),
            genetic_population: 20,
            genetic_generations: 10,
            genetic_tournament_size: 3,
            genetic_crossover_rate: 0.8,
            genetic_mutation_rate: 0.1,
            genetic_patience: 5,
            genetic_elitism: 2,
        }
    }
}

impl EngineConfig {
    pub fn resolved_threads(&self) -> usize {
        if self.max_threads == 0 {
            num_cpus::get()
        } else {
            self.max_threads
        }
    }

    pub fn floorplan_config(&self) -> FloorplanConfig {
        FloorplanConfig {
            max_steps: self.sa_max_steps,
            perturbations_per_step: self.sa_perturbations_per_step,
            requested_workers: self.sa_requested_workers.min(self.resolved_threads().max(1)).min(4),
            min_cooling: self.sa_min_cooling,
            max_cooling: self.sa_max_cooling,
            cost_weights: self.sa_cost_weights,
            perturbation_weights: self.sa_perturbation_weights,
            acceptance_tolerance: self.sa_acceptance_tolerance,
            ..FloorplanConfig::default()
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            chiplet_set: self.chiplet_set.clone(),
            spectral_k: self.spectral_k,
            ub_factor: self.ub_factor,
            floorplan_config: self.floorplan_config(),
            fm_config: FmConfig::default(),
            requested_threads: self.resolved_threads(),
            outlier_zscore: self.outlier_zscore,
            outlier_ratio: self.outlier_ratio,
            min_kept: self.min_kept,
        }
    }

    pub fn genetic_config(&self) -> GeneticConfig {
        GeneticConfig {
            population_size: self.genetic_population,
            generations: self.genetic_generations,
            tournament_size: self.genetic_tournament_size,
            crossover_rate: self.genetic_crossover_rate,
            mutation_rate: self.genetic_mutation_rate,
            patience: self.genetic_patience,
            min_p: self.chiplet_set.iter().copied().min().unwrap_or(1),
            max_p: self.chiplet_set.iter().copied().max().unwrap_or(8),
            elitism: self.genetic_elitism,
            driver_config: self.driver_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chiplet_set, config.chiplet_set);
        assert_eq!(back.genetic_population, config.genetic_population);
    }

    #[test]
    fn resolved_threads_defaults_to_hardware_concurrency() {
        let config = EngineConfig::default();
        assert_eq!(config.resolved_threads(), num_cpus::get());
    }

    #[test]
    fn max_threads_override_caps_resolved_threads() {
        let config = EngineConfig { max_threads: 2, ..EngineConfig::default() };
        assert_eq!(config.resolved_threads(), 2);
    }
}
