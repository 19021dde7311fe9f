use anyhow::{bail, Context, Result};
use chipletpart::cost_model::{DefaultCostOracle, TechLibrary};
use chipletpart::driver::Driver;
use chipletpart::genetic::GeneticTechPartitioner;
use chipletpart::{config::EngineConfig, ingest, persist};
use clap::{Parser, Subcommand};
use pbr::ProgressBar;
use std::path::PathBuf;

pub fn main() {
    if let Err(err) = Cli::parse().run() {
        eprintln!("chipletpart: {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser)]
#[clap(author = clap::crate_authors!(", "))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
#[clap(about = "Co-optimizing chiplet partitioner")]
#[clap(propagate_version = true)]
#[clap(subcommand_required = true)]
#[clap(arg_required_else_help = true)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

/// the six library files plus netlist/blocks every mode shares
#[derive(Parser)]
struct DesignFiles {
    io: PathBuf,
    layer: PathBuf,
    wafer: PathBuf,
    assembly: PathBuf,
    test: PathBuf,
    netlist: PathBuf,
    blocks: PathBuf,
    /// default net reach used when a net omits it in the netlist file
    reach: f32,
    /// minimum separation enforced between chiplets by the floorplanner
    separation: f32,
}

#[derive(Subcommand)]
enum Commands {
    /// partition with a single, fixed tech node for every chiplet
    Partition {
        #[clap(flatten)]
        design: DesignFiles,
        /// tech node name, must appear in the wafer/io/assembly/test files
        tech: String,
        #[clap(long)]
        seed: Option<u64>,
        /// override the default engine tunables from a JSON file
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// re-score an existing partition file against the cost oracle, without re-partitioning
    Evaluate {
        part_file: PathBuf,
        #[clap(flatten)]
        design: DesignFiles,
        tech: String,
        #[clap(long)]
        seed: Option<u64>,
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// co-optimize the vertex→partition map jointly with a per-partition tech
    /// pick from a comma-separated candidate list
    TechAssignment {
        #[clap(flatten)]
        design: DesignFiles,
        /// comma-separated tech node names to choose among
        tech: String,
        #[clap(long)]
        seed: Option<u64>,
        #[clap(long)]
        config: Option<PathBuf>,
    },
    /// the same co-optimization as `tech-assignment`, with explicit genetic
    /// hyperparameter overrides
    Genetic {
        #[clap(flatten)]
        design: DesignFiles,
        #[clap(long, action)]
        genetic_tech_part: bool,
        #[clap(long, multiple_values = true)]
        tech_nodes: Vec<String>,
        #[clap(long)]
        generations: Option<usize>,
        #[clap(long)]
        population: Option<usize>,
        #[clap(long)]
        seed: Option<u64>,
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: &Option<PathBuf>) -> Result<EngineConfig> {
    match path {
        None => Ok(EngineConfig::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
        }
    }
}

/// `driver_config()` projects `EngineConfig` onto `DriverConfig`, but the
/// separation distance is a per-invocation CLI argument (spec §6), not an
/// `EngineConfig` tunable, so it's patched in afterwards
fn driver_config_for(engine_config: &EngineConfig, separation: f32) -> chipletpart::DriverConfig {
    let mut driver_config = engine_config.driver_config();
    driver_config.floorplan_config.separation = separation;
    driver_config
}

fn load_design(design: &DesignFiles) -> Result<(chipletpart::Hypergraph, Vec<String>, TechLibrary)> {
    let tech_library = ingest::read_tech_library(&design.io, &design.layer, &design.wafer, &design.assembly, &design.test)?;
    let blocks = ingest::read_blocks(&design.blocks)?;
    let mut nets = ingest::read_netlist(&design.netlist)?;
    for net in &mut nets {
        if net.reach <= 0.0 || !net.reach.is_finite() {
            net.reach = design.reach;
        }
    }
    let (hypergraph, names) = ingest::build_hypergraph(&blocks, &nets)?;
    let map_path = PathBuf::from("output.map");
    persist::write_block_map(&map_path, &names)?;
    Ok((hypergraph, names, tech_library))
}

fn tech_index(tech_library: &TechLibrary, name: &str) -> Result<usize> {
    tech_library
        .nodes
        .iter()
        .position(|n| n.name == name)
        .with_context(|| format!("tech node {name} not found in the library files"))
}

fn subset_library(tech_library: &TechLibrary, names: &[String]) -> Result<TechLibrary> {
    let mut nodes = Vec::with_capacity(names.len());
    for name in names {
        let idx = tech_index(tech_library, name)?;
        nodes.push(tech_library.nodes[idx].clone());
    }
    if nodes.is_empty() {
        bail!("tech candidate list is empty");
    }
    Ok(TechLibrary { nodes })
}

impl Cli {
    fn run(self) -> Result<()> {
        tracing_subscriber::fmt::try_init().ok();
        match self.command {
            Commands::Partition { design, tech, seed, config } => {
                let engine_config = load_config(&config)?;
                let (hypergraph, _names, tech_library) = load_design(&design)?;
                let tech = tech_index(&tech_library, &tech)?;
                let cost_oracle = DefaultCostOracle::new(&tech_library);
                let driver = Driver::new(&hypergraph, &cost_oracle, driver_config_for(&engine_config, design.separation));
                let result = driver.run(tech, seed.unwrap_or(0));
                let stem = design.netlist.to_string_lossy().into_owned();
                persist::write_partition(&PathBuf::from(format!("{stem}.cpart.{}", result.num_parts)), &result.partition)?;
                persist::write_tech_assignment(
                    &PathBuf::from(format!("{stem}.chipletpart.techs.{}", result.num_parts)),
                    &tech_library.nodes.iter().map(|n| n.name.clone()).collect::<Vec<_>>(),
                    &result.tech_per_part,
                )?;
                println!("partitioned into {} chiplets, cost = {:.4}, valid = {}", result.num_parts, result.cost, result.valid);
                Ok(())
            }
            Commands::Evaluate { part_file, design, tech, seed: _, config } => {
                let engine_config = load_config(&config)?;
                let (hypergraph, _names, tech_library) = load_design(&design)?;
                let tech = tech_index(&tech_library, &tech)?;
                let partition = persist::read_partition(&part_file)?;
                if partition.len() != hypergraph.num_vertices() {
                    bail!(
                        "partition file has {} entries but the design has {} blocks",
                        partition.len(),
                        hypergraph.num_vertices()
                    );
                }
                let num_parts = partition.iter().copied().max().map(|m| m + 1).unwrap_or(0);
                let tech_per_part = vec![tech; num_parts];
                let cost_oracle = DefaultCostOracle::new(&tech_library);
                let _ = engine_config; // evaluate mode does not run the driver, only scores the given partition
                let cost = cost_oracle_cost(&hypergraph, &cost_oracle, &partition, num_parts, &tech_per_part);
                println!("cost = {cost:.4}");
                Ok(())
            }
            Commands::TechAssignment { design, tech, seed, config } => {
                let engine_config = load_config(&config)?;
                let (hypergraph, _names, tech_library) = load_design(&design)?;
                let names: Vec<String> = tech.split(',').map(|s| s.trim().to_string()).collect();
                let subset = subset_library(&tech_library, &names)?;
                run_genetic(&hypergraph, &subset, &engine_config, design.separation, seed, None, None)
            }
            Commands::Genetic { design, genetic_tech_part, tech_nodes, generations, population, seed, config } => {
                if !genetic_tech_part {
                    bail!("genetic mode requires --genetic-tech-part");
                }
                if tech_nodes.is_empty() {
                    bail!("genetic mode requires --tech-nodes <t1 t2 ...>");
                }
                let engine_config = load_config(&config)?;
                let (hypergraph, _names, tech_library) = load_design(&design)?;
                let subset = subset_library(&tech_library, &tech_nodes)?;
                run_genetic(&hypergraph, &subset, &engine_config, design.separation, seed, generations, population)
            }
        }
    }
}

fn cost_oracle_cost(
    hypergraph: &chipletpart::Hypergraph,
    cost_oracle: &DefaultCostOracle,
    partition: &[usize],
    num_parts: usize,
    tech_per_part: &[usize],
) -> f32 {
    use chipletpart::cost_model::CostOracle;
    cost_oracle.cost(hypergraph, partition, num_parts, tech_per_part, &[], &[], &[], false)
}

fn run_genetic(
    hypergraph: &chipletpart::Hypergraph,
    tech_library: &TechLibrary,
    engine_config: &EngineConfig,
    separation: f32,
    seed: Option<u64>,
    generations: Option<usize>,
    population: Option<usize>,
) -> Result<()> {
    let mut genetic_config = engine_config.genetic_config();
    genetic_config.driver_config.floorplan_config.separation = separation;
    if let Some(g) = generations {
        genetic_config.generations = g;
    }
    if let Some(p) = population {
        genetic_config.population_size = p;
    }
    let cost_oracle = DefaultCostOracle::new(tech_library);
    let total_generations = genetic_config.generations;
    let partitioner = GeneticTechPartitioner::new(hypergraph, &cost_oracle, tech_library.len(), genetic_config);
    let mut pb = ProgressBar::on(std::io::stderr(), total_generations as u64);
    pb.message("co-optimizing: ");
    let solution = partitioner.run_with_progress(seed.unwrap_or(0), |generation, _total, best_cost| {
        pb.set(generation as u64);
        pb.message(&format!("co-optimizing (best cost {best_cost:.4}): "));
    });
    pb.finish();

    persist::write_partition(&PathBuf::from(format!("output.chipletpart.parts.{}", solution.num_parts)), &solution.partition)?;
    persist::write_tech_assignment(
        &PathBuf::from(format!("output.chipletpart.techs.{}", solution.num_parts)),
        &tech_library.nodes.iter().map(|n| n.name.clone()).collect::<Vec<_>>(),
        &solution.tech_per_part,
    )?;
    println!(
        "co-optimized into {} chiplets, cost = {:.4}, valid = {}",
        solution.num_parts, solution.cost, solution.valid
    );
    Ok(())
}
