//! The cost oracle contract (spec §4.2) and a deterministic default
//! implementation standing in for the external silicon/packaging/test/NRE
//! model, which is explicitly out of scope for the core.

use crate::chiplet::{routing_length_proxy, Chiplet};
use crate::hypergraph::Hypergraph;
use crate::util::{PartIndex, TechIndex};

/// one fabrication process entry; field shapes mirror what the original
/// `cost_model/` ingestion would feed a real model (wafer/layer/IO/assembly/
/// test costs keyed by tech identifier), kept intentionally simple since the
/// real model is a non-goal
#[derive(Debug, Clone)]
pub struct TechNode {
    pub name: String,
    pub wafer_cost_per_area: f32,
    pub io_cost_per_net: f32,
    pub assembly_cost_per_chiplet: f32,
    pub test_cost_per_area: f32,
}

#[derive(Debug, Clone, Default)]
pub struct TechLibrary {
    pub nodes: Vec<TechNode>,
}

impl TechLibrary {
    pub fn get(&self, tech: TechIndex) -> &TechNode {
        &self.nodes[tech]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// `cost(π, τ, ar, x, y, approx) → f32`, pure and deterministic; the core
/// never assumes numerical equality between the approximate and exact modes,
/// only that larger is worse and both are deterministic for identical inputs
pub trait CostOracle: Send + Sync {
    fn cost(
        &self,
        hypergraph: &Hypergraph,
        partition: &[PartIndex],
        num_parts: PartIndex,
        tech_per_part: &[TechIndex],
        aspect_ratios: &[f32],
        x: &[f32],
        y: &[f32],
        approx: bool,
    ) -> f32;
}

/// deterministic stand-in for the real cost model; see SPEC_FULL.md §4.11 for
/// the formula and DESIGN.md for why `approx=true` falls back to a plain
/// cut-size term instead of the exact net-violation integral
pub struct DefaultCostOracle<'t> {
    pub tech_library: &'t TechLibrary,
    pub violation_penalty: f32,
    pub halo: f32,
}

impl<'t> DefaultCostOracle<'t> {
    pub fn new(tech_library: &'t TechLibrary) -> Self {
        Self { tech_library, violation_penalty: 1.0, halo: 0.5 }
    }

    fn area_by_partition(&self, hypergraph: &Hypergraph, partition: &[PartIndex], num_parts: PartIndex) -> Vec<f32> {
        let mut area = vec![0.0f32; num_parts];
        for (v, &p) in partition.iter().enumerate() {
            area[p] += hypergraph.vertex_weights(v)[0];
        }
        area
    }

    fn chiplet_for(&self, p: PartIndex, area: f32, aspect_ratios: &[f32], x: &[f32], y: &[f32]) -> Chiplet {
        let ar = aspect_ratios.get(p).copied().filter(|v| *v > 0.0).unwrap_or(1.0);
        let height = (area.max(1e-6) / ar).sqrt();
        let width = area.max(1e-6) / height;
        Chiplet { x: x.get(p).copied().unwrap_or(0.0), y: y.get(p).copied().unwrap_or(0.0), width, height, min_area: area, halo: self.halo }
    }
}

impl<'t> CostOracle for DefaultCostOracle<'t> {
    fn cost(
        &self,
        hypergraph: &Hypergraph,
        partition: &[PartIndex],
        num_parts: PartIndex,
        tech_per_part: &[TechIndex],
        aspect_ratios: &[f32],
        x: &[f32],
        y: &[f32],
        approx: bool,
    ) -> f32 {
        let area = self.area_by_partition(hypergraph, partition, num_parts);
        let mut total = 0.0f32;
        for p in 0..num_parts {
            if area[p] <= 0.0 {
                continue;
            }
            let tech = self.tech_library.get(tech_per_part[p]);
            total += tech.wafer_cost_per_area * area[p];
            total += tech.assembly_cost_per_chiplet;
            total += tech.test_cost_per_area * area[p];
        }

        let have_positions = !aspect_ratios.is_empty() && !x.is_empty() && !y.is_empty();
        let chiplets: Vec<Option<Chiplet>> = (0..num_parts)
            .map(|p| if have_positions && area[p] > 0.0 { Some(self.chiplet_for(p, area[p], aspect_ratios, x, y)) } else { None })
            .collect();

        for e in 0..hypergraph.num_edges() {
            let mut touched: Vec<PartIndex> = Vec::new();
            for &v in hypergraph.vertices_of_edge(e) {
                let p = partition[v];
                if !touched.contains(&p) {
                    touched.push(p);
                }
            }
            if touched.len() < 2 {
                continue;
            }
            let (a, b) = (touched[0], touched[1]);
            let weight = hypergraph.edge_weights(e)[0];
            total += self.tech_library.get(tech_per_part[a]).io_cost_per_net * hypergraph.io_area(e);

            if approx || !have_positions {
                // cheaper, deterministic, monotonic-in-expectation cut-size proxy
                total += weight;
                continue;
            }
            if let (Some(ca), Some(cb)) = (&chiplets[a], &chiplets[b]) {
                let length = routing_length_proxy(ca, cb, hypergraph.io_area(e));
                total += self.violation_penalty * weight * (length - hypergraph.reach(e)).max(0.0);
            }
        }

        total.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> TechLibrary {
        TechLibrary {
            nodes: vec![
                TechNode { name: "7nm".into(), wafer_cost_per_area: 1.0, io_cost_per_net: 0.1, assembly_cost_per_chiplet: 5.0, test_cost_per_area: 0.2 },
                TechNode { name: "14nm".into(), wafer_cost_per_area: 0.5, io_cost_per_net: 0.1, assembly_cost_per_chiplet: 3.0, test_cost_per_area: 0.1 },
            ],
        }
    }

    fn small_hypergraph() -> Hypergraph {
        Hypergraph::new(
            vec![vec![10.0], vec![10.0], vec![10.0], vec![10.0]],
            vec![vec![0, 1], vec![2, 3]],
            vec![vec![1.0], vec![1.0]],
            vec![5.0, 5.0],
            vec![1.0, 1.0],
        )
    }

    #[test]
    fn cost_is_nonnegative_and_deterministic() {
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let h = small_hypergraph();
        let partition = vec![0, 0, 1, 1];
        let c1 = oracle.cost(&h, &partition, 2, &[0, 1], &[], &[], &[], false);
        let c2 = oracle.cost(&h, &partition, 2, &[0, 1], &[], &[], &[], false);
        assert!(c1 >= 0.0);
        assert_eq!(c1, c2);
    }

    #[test]
    fn cheaper_tech_choice_lowers_cost() {
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let h = small_hypergraph();
        let partition = vec![0, 0, 1, 1];
        let cost_7nm = oracle.cost(&h, &partition, 2, &[0, 0], &[], &[], &[], false);
        let cost_14nm = oracle.cost(&h, &partition, 2, &[1, 1], &[], &[], &[], false);
        assert!(cost_14nm < cost_7nm);
    }

    #[test]
    fn merging_into_one_partition_removes_cut_cost() {
        let lib = library();
        let oracle = DefaultCostOracle::new(&lib);
        let h = small_hypergraph();
        let cut = oracle.cost(&h, &[0, 1, 1, 0], 2, &[0, 0], &[], &[], &[], false);
        let uncut = oracle.cost(&h, &[0, 0, 0, 0], 1, &[0], &[], &[], &[], false);
        assert!(uncut < cut);
    }
}
