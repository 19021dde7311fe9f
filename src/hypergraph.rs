//! Immutable CSR hypergraph: vertices are IP blocks, hyperedges are nets.
//!
//! Built once by the ingestion layer (or a test), then shared by reference
//! for the lifetime of a run. Two CSR views are kept so that both
//! `edges_of_vertex` and `vertices_of_edge` are O(degree) without an
//! intermediate adjacency rebuild.

use crate::util::{EdgeIndex, PartIndex, VertexIndex, WeightVec};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Hypergraph {
    num_vertices: usize,
    num_edges: usize,
    /// per-vertex weight vectors, dimension `dv`; component 0 is area
    vertex_weights: Vec<WeightVec>,
    /// per-edge weight vectors, dimension `de`; component 0 is bandwidth
    edge_weights: Vec<WeightVec>,
    reach: Vec<f32>,
    io_area: Vec<f32>,
    /// CSR: edge -> vertices
    edge_vertices_offsets: Vec<usize>,
    edge_vertices: Vec<VertexIndex>,
    /// CSR: vertex -> edges
    vertex_edges_offsets: Vec<usize>,
    vertex_edges: Vec<EdgeIndex>,
}

impl Hypergraph {
    /// build from per-edge vertex lists; `edges[e]` lists the (deduplicated,
    /// order-preserved) vertices touched by hyperedge `e`.
    pub fn new(
        vertex_weights: Vec<WeightVec>,
        edges: Vec<Vec<VertexIndex>>,
        edge_weights: Vec<WeightVec>,
        reach: Vec<f32>,
        io_area: Vec<f32>,
    ) -> Self {
        let num_vertices = vertex_weights.len();
        let num_edges = edges.len();
        assert_eq!(edges.len(), edge_weights.len(), "edges.len() must match edge_weights.len()");
        assert_eq!(edges.len(), reach.len(), "edges.len() must match reach.len()");
        assert_eq!(edges.len(), io_area.len(), "edges.len() must match io_area.len()");
        for (e, vs) in edges.iter().enumerate() {
            assert!(!vs.is_empty(), "hyperedge {e} has no vertices");
            for &v in vs {
                assert!(v < num_vertices, "hyperedge {e} references out-of-range vertex {v}");
            }
        }

        let mut edge_vertices_offsets = Vec::with_capacity(num_edges + 1);
        let mut edge_vertices = Vec::new();
        edge_vertices_offsets.push(0);
        for vs in &edges {
            edge_vertices.extend_from_slice(vs);
            edge_vertices_offsets.push(edge_vertices.len());
        }

        let mut vertex_edge_lists: Vec<Vec<EdgeIndex>> = vec![Vec::new(); num_vertices];
        for (e, vs) in edges.iter().enumerate() {
            for &v in vs {
                vertex_edge_lists[v].push(e);
            }
        }
        let mut vertex_edges_offsets = Vec::with_capacity(num_vertices + 1);
        let mut vertex_edges = Vec::new();
        vertex_edges_offsets.push(0);
        for list in &vertex_edge_lists {
            vertex_edges.extend_from_slice(list);
            vertex_edges_offsets.push(vertex_edges.len());
        }

        Self {
            num_vertices,
            num_edges,
            vertex_weights,
            edge_weights,
            reach,
            io_area,
            edge_vertices_offsets,
            edge_vertices,
            vertex_edges_offsets,
            vertex_edges,
        }
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    #[inline]
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    #[inline]
    pub fn vertex_weights(&self, v: VertexIndex) -> &WeightVec {
        &self.vertex_weights[v]
    }

    #[inline]
    pub fn edge_weights(&self, e: EdgeIndex) -> &WeightVec {
        &self.edge_weights[e]
    }

    #[inline]
    pub fn reach(&self, e: EdgeIndex) -> f32 {
        self.reach[e]
    }

    #[inline]
    pub fn io_area(&self, e: EdgeIndex) -> f32 {
        self.io_area[e]
    }

    #[inline]
    pub fn vertices_of_edge(&self, e: EdgeIndex) -> &[VertexIndex] {
        &self.edge_vertices[self.edge_vertices_offsets[e]..self.edge_vertices_offsets[e + 1]]
    }

    #[inline]
    pub fn edges_of_vertex(&self, v: VertexIndex) -> &[EdgeIndex] {
        &self.vertex_edges[self.vertex_edges_offsets[v]..self.vertex_edges_offsets[v + 1]]
    }

    /// `⋃_{e∋v} vertices(e) \ {v}`
    pub fn neighbors(&self, v: VertexIndex) -> BTreeSet<VertexIndex> {
        let mut result = BTreeSet::new();
        for &e in self.edges_of_vertex(v) {
            for &u in self.vertices_of_edge(e) {
                if u != v {
                    result.insert(u);
                }
            }
        }
        result
    }

    pub fn vertex_weight_dim(&self) -> usize {
        self.vertex_weights.first().map(|w| w.len()).unwrap_or(1)
    }

    /// `Σ_v weight(v)`, componentwise
    pub fn total_vertex_weights(&self) -> WeightVec {
        let dv = self.vertex_weight_dim();
        let mut total = vec![0.0f32; dv];
        for w in &self.vertex_weights {
            for (t, c) in total.iter_mut().zip(w.iter()) {
                *t += c;
            }
        }
        total
    }

    /// per-partition upper balance envelope: row `p` is `(base[p] + ub_factor*0.01) * total`
    pub fn upper_balance(&self, num_parts: PartIndex, ub_factor: f32, base: &[f32]) -> Vec<WeightVec> {
        self.balance_envelope(num_parts, ub_factor, base, 1.0)
    }

    /// per-partition lower balance envelope: row `p` is `(base[p] - ub_factor*0.01) * total`
    pub fn lower_balance(&self, num_parts: PartIndex, ub_factor: f32, base: &[f32]) -> Vec<WeightVec> {
        self.balance_envelope(num_parts, ub_factor, base, -1.0)
    }

    fn balance_envelope(&self, num_parts: PartIndex, ub_factor: f32, base: &[f32], sign: f32) -> Vec<WeightVec> {
        assert_eq!(base.len(), num_parts, "base.len() must equal num_parts");
        let total = self.total_vertex_weights();
        base.iter()
            .map(|b| {
                let factor = b + sign * ub_factor * 0.01;
                total.iter().map(|t| factor * t).collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_chain(n: usize) -> Hypergraph {
        let vertex_weights = (0..n).map(|_| vec![100.0f32]).collect();
        let edges: Vec<_> = (0..n - 1).map(|i| vec![i, i + 1]).collect();
        let m = edges.len();
        Hypergraph::new(vertex_weights, edges, vec![vec![1.0]; m], vec![50.0; m], vec![1.0; m])
    }

    #[test]
    fn csr_views_are_consistent() {
        let h = linear_chain(5);
        assert_eq!(h.num_vertices(), 5);
        assert_eq!(h.num_edges(), 4);
        assert_eq!(h.vertices_of_edge(0), &[0, 1]);
        assert_eq!(h.edges_of_vertex(1), &[0, 1]);
        assert_eq!(h.neighbors(1), BTreeSet::from([0, 2]));
        assert_eq!(h.neighbors(0), BTreeSet::from([1]));
    }

    #[test]
    fn total_and_balance_envelopes() {
        let h = linear_chain(5);
        assert_eq!(h.total_vertex_weights(), vec![500.0]);
        let upper = h.upper_balance(2, 10.0, &[0.5, 0.5]);
        assert_eq!(upper.len(), 2);
        assert!((upper[0][0] - (0.6 * 500.0)).abs() < 1e-3);
        let lower = h.lower_balance(2, 10.0, &[0.5, 0.5]);
        assert!((lower[0][0] - (0.4 * 500.0)).abs() < 1e-3);
    }

    #[test]
    #[should_panic(expected = "out-of-range")]
    fn construction_rejects_out_of_range_vertex() {
        Hypergraph::new(vec![vec![1.0]], vec![vec![0, 1]], vec![vec![1.0]], vec![1.0], vec![1.0]);
    }

    #[test]
    #[should_panic(expected = "edges.len()")]
    fn construction_rejects_size_mismatch() {
        Hypergraph::new(vec![vec![1.0], vec![1.0]], vec![vec![0, 1]], vec![], vec![], vec![]);
    }
}
