//! Crossbar-seeded BFS expansion: seed partitions from the highest-degree
//! vertices, then grow each by majority-edge BFS.

use super::InitialPartitioner;
use crate::hypergraph::Hypergraph;
use crate::util::{PartIndex, VertexIndex};
use std::collections::VecDeque;

pub struct CrossBarBfsPartitioner {
    /// percentile threshold for "crossbar" (high-degree) vertex selection
    pub quantile: f32,
    /// fraction of tallied boundary edges from a partition required to join it
    pub join_threshold: f32,
}

impl Default for CrossBarBfsPartitioner {
    fn default() -> Self {
        Self { quantile: 0.99, join_threshold: 0.60 }
    }
}

impl InitialPartitioner for CrossBarBfsPartitioner {
    fn name(&self) -> &'static str {
        "crossbar-bfs"
    }

    fn partition(&self, hypergraph: &Hypergraph, num_parts: PartIndex, _seed: u64) -> Option<Vec<PartIndex>> {
        let n = hypergraph.num_vertices();
        if n == 0 || num_parts == 0 {
            return None;
        }
        if n <= num_parts {
            return Some((0..n).collect());
        }

        let degree: Vec<usize> = (0..n).map(|v| hypergraph.edges_of_vertex(v).len()).collect();
        let mut by_degree: Vec<VertexIndex> = (0..n).collect();
        by_degree.sort_by(|&a, &b| degree[b].cmp(&degree[a]));

        // crossbar vertices: top (1-quantile) fraction by degree; seed the
        // first `num_parts` of them as the initial partition centers
        let crossbar_count = ((1.0 - self.quantile) * n as f32).ceil().max(num_parts as f32) as usize;
        let crossbar_count = crossbar_count.min(n);
        let seeds = &by_degree[..crossbar_count.max(num_parts)];
        if seeds.len() < num_parts {
            return None;
        }

        let mut partition: Vec<Option<PartIndex>> = vec![None; n];
        let mut queues: Vec<VecDeque<VertexIndex>> = Vec::with_capacity(num_parts);
        for &seed_vertex in &seeds[..num_parts] {
            let p = queues.len();
            partition[seed_vertex] = Some(p);
            let mut q = VecDeque::new();
            q.push_back(seed_vertex);
            queues.push(q);
        }

        // boundary-edge tallies are computed inline per round below
        let mut active = true;
        while active {
            active = false;
            for p in 0..num_parts {
                let mut next_round = VecDeque::new();
                while let Some(v) = queues[p].pop_front() {
                    for u in hypergraph.neighbors(v) {
                        if partition[u].is_some() {
                            continue;
                        }
                        let mut counts = vec![0usize; num_parts];
                        let mut total = 0usize;
                        for &e in hypergraph.edges_of_vertex(u) {
                            for &w in hypergraph.vertices_of_edge(e) {
                                if w == u {
                                    continue;
                                }
                                if let Some(pw) = partition[w] {
                                    counts[pw] += 1;
                                    total += 1;
                                }
                            }
                        }
                        if total > 0 && counts[p] as f32 / total as f32 >= self.join_threshold {
                            partition[u] = Some(p);
                            next_round.push_back(u);
                            active = true;
                        }
                    }
                }
                queues[p] = next_round;
            }
        }

        // remaining unassigned: majority-neighbor iterative assignment
        loop {
            let mut progressed = false;
            for v in 0..n {
                if partition[v].is_some() {
                    continue;
                }
                let mut counts = vec![0usize; num_parts];
                let mut total = 0usize;
                for u in hypergraph.neighbors(v) {
                    if let Some(p) = partition[u] {
                        counts[p] += 1;
                        total += 1;
                    }
                }
                if total > 0 {
                    let best = counts.iter().enumerate().max_by_key(|&(_, c)| *c).map(|(p, _)| p).unwrap();
                    partition[v] = Some(best);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        // leftover isolated vertices: assign whole connected components (among
        // themselves) to the smallest partition, so mutually-isolated vertices
        // that are only connected to each other still land together
        let mut sizes = vec![0usize; num_parts];
        for p in partition.iter().flatten() {
            sizes[*p] += 1;
        }
        for v in 0..n {
            if partition[v].is_some() {
                continue;
            }
            let mut component = Vec::new();
            let mut queue = VecDeque::from([v]);
            let mut seen = std::collections::HashSet::from([v]);
            while let Some(u) = queue.pop_front() {
                component.push(u);
                for w in hypergraph.neighbors(u) {
                    if partition[w].is_none() && seen.insert(w) {
                        queue.push_back(w);
                    }
                }
            }
            let smallest = sizes.iter().enumerate().min_by_key(|&(_, s)| *s).map(|(p, _)| p).unwrap();
            for &u in &component {
                partition[u] = Some(smallest);
            }
            sizes[smallest] += component.len();
        }

        Some(partition.into_iter().map(|p| p.unwrap()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_disjoint_pairs() -> Hypergraph {
        Hypergraph::new(
            vec![vec![1.0]; 4],
            vec![vec![0, 1], vec![2, 3]],
            vec![vec![1.0]; 2],
            vec![10.0; 2],
            vec![1.0; 2],
        )
    }

    #[test]
    fn produces_a_dense_partition_over_disjoint_pairs() {
        let h = two_disjoint_pairs();
        let partitioner = CrossBarBfsPartitioner::default();
        let partition = partitioner.partition(&h, 2, 42).unwrap();
        assert_eq!(partition.len(), 4);
        assert!(partition.iter().all(|&p| p < 2));
        assert!(crate::partitioners::is_dense(&partition, crate::partitioners::num_parts_used(&partition)));
    }

    #[test]
    fn every_vertex_gets_assigned() {
        let h = two_disjoint_pairs();
        let partitioner = CrossBarBfsPartitioner::default();
        let partition = partitioner.partition(&h, 2, 1).unwrap();
        assert!(partition.iter().all(|&p| p < 2));
    }
}
