//! chipletpart: co-optimizing chiplet partitioner.
//!
//! Partitions a chiplet-level hypergraph design into a small number of
//! partitions and assigns a fabrication technology node to each, via a
//! multi-start partitioner, an FM-style K-way refiner driven by a cost
//! oracle, a sequence-pair simulated-annealing floorplanner, and a genetic
//! outer loop that co-searches partition count / vertex mapping / tech
//! mapping. See `DESIGN.md` at the repository root for the grounding ledger.

pub mod chiplet;
pub mod config;
pub mod cost_model;
pub mod driver;
pub mod error;
pub mod floorplanner;
pub mod fm_refiner;
pub mod gain_bucket;
pub mod genetic;
pub mod hypergraph;
pub mod ingest;
pub mod partitioners;
pub mod persist;
pub mod sequence_pair;
pub mod sequence_pair_sa;
pub mod util;

pub use config::EngineConfig;
pub use cost_model::{CostOracle, DefaultCostOracle, TechLibrary, TechNode};
pub use driver::{Driver, DriverConfig, DriverResult};
pub use error::{ChipletPartError, Result};
pub use genetic::{GeneticConfig, GeneticSolution, GeneticTechPartitioner};
pub use hypergraph::Hypergraph;
