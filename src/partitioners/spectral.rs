//! Spectral embedding (combinatorial Laplacian) followed by k-means.
//!
//! The corpus carries no dense-linear-algebra crate (the teacher has none,
//! and none of the sibling examples pull in `nalgebra`/`ndarray`), so the
//! symmetric eigendecomposition is a small in-house cyclic Jacobi solver —
//! adequate for the vertex counts this engine targets and avoids fabricating
//! a dependency the corpus never reaches for.

use super::{num_parts_used, InitialPartitioner};
use crate::hypergraph::Hypergraph;
use crate::util::{seeded_rng, PartIndex, VertexIndex};
use rand::Rng;

pub struct SpectralKMeansPartitioner {
    pub kmeans_max_iters: usize,
}

impl Default for SpectralKMeansPartitioner {
    fn default() -> Self {
        Self { kmeans_max_iters: 100 }
    }
}

impl InitialPartitioner for SpectralKMeansPartitioner {
    fn name(&self) -> &'static str {
        "spectral+kmeans"
    }

    fn partition(&self, hypergraph: &Hypergraph, num_parts: PartIndex, seed: u64) -> Option<Vec<PartIndex>> {
        let n = hypergraph.num_vertices();
        if n == 0 || num_parts == 0 {
            return None;
        }
        if n <= num_parts {
            return Some((0..n).collect());
        }

        let laplacian = combinatorial_laplacian(hypergraph);
        let k = num_parts;
        let want = (k + 3).min(n);
        let (eigenvalues, eigenvectors) = jacobi_eigen(&laplacian, 200)?;
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eigenvalues[a].partial_cmp(&eigenvalues[b]).unwrap_or(std::cmp::Ordering::Equal));
        let selected = &order[..want];

        // skip the trivial (near-zero) null eigenvector at selected[0]
        let upper = (k + 1).min(selected.len());
        if upper <= 1 {
            return None;
        }
        let embedding_dims = &selected[1..upper];
        let mut embedding: Vec<Vec<f32>> = vec![Vec::with_capacity(embedding_dims.len()); n];
        for &dim in embedding_dims {
            for (v, row) in embedding.iter_mut().enumerate() {
                row.push(eigenvectors[v][dim]);
            }
        }
        // column-normalize
        let cols = embedding_dims.len();
        for c in 0..cols {
            let norm: f32 = embedding.iter().map(|row| row[c] * row[c]).sum::<f32>().sqrt();
            if norm > 1e-9 {
                for row in embedding.iter_mut() {
                    row[c] /= norm;
                }
            }
        }

        let assignment = kmeans(&embedding, k, self.kmeans_max_iters, seed)?;
        if assignment.iter().any(|a| a.is_none()) {
            return None; // validity: every vertex must be assigned
        }
        let assignment: Vec<PartIndex> = assignment.into_iter().map(|a| a.unwrap()).collect();
        if num_parts_used(&assignment) == 0 {
            return None;
        }
        Some(assignment)
    }
}

fn combinatorial_laplacian(hypergraph: &Hypergraph) -> Vec<Vec<f32>> {
    let n = hypergraph.num_vertices();
    let mut adjacency = vec![vec![0.0f32; n]; n];
    for v in 0..n {
        for &u in hypergraph.neighbors(v).iter() {
            adjacency[v][u] = 1.0;
        }
    }
    let mut laplacian = vec![vec![0.0f32; n]; n];
    for v in 0..n {
        let degree: f32 = adjacency[v].iter().sum();
        for u in 0..n {
            laplacian[v][u] = if u == v { degree - adjacency[v][u] } else { -adjacency[v][u] };
        }
    }
    laplacian
}

/// cyclic Jacobi eigenvalue algorithm for a dense symmetric matrix; returns
/// `(eigenvalues, eigenvectors)` where `eigenvectors[v][dim]` is the `dim`-th
/// eigenvector's component at vertex `v`. `None` if it fails to converge
/// within `max_sweeps` sweeps.
fn jacobi_eigen(matrix: &[Vec<f32>], max_sweeps: usize) -> Option<(Vec<f32>, Vec<Vec<f32>>)> {
    let n = matrix.len();
    let mut a = matrix.to_vec();
    let mut v = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        v[i][i] = 1.0;
    }

    for _ in 0..max_sweeps {
        let mut off_diag_sum = 0.0f32;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diag_sum += a[p][q] * a[p][q];
            }
        }
        if off_diag_sum.sqrt() < 1e-7 {
            let eigenvalues: Vec<f32> = (0..n).map(|i| a[i][i]).collect();
            let eigenvectors: Vec<Vec<f32>> = (0..n).map(|row| (0..n).map(|col| v[row][col]).collect()).collect();
            return Some((eigenvalues, eigenvectors));
        }
        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < 1e-10 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                let app = a[p][p];
                let aqq = a[q][q];
                let apq = a[p][q];
                a[p][p] = c * c * app - 2.0 * s * c * apq + s * s * aqq;
                a[q][q] = s * s * app + 2.0 * s * c * apq + c * c * aqq;
                a[p][q] = 0.0;
                a[q][p] = 0.0;
                for i in 0..n {
                    if i != p && i != q {
                        let aip = a[i][p];
                        let aiq = a[i][q];
                        a[i][p] = c * aip - s * aiq;
                        a[p][i] = a[i][p];
                        a[i][q] = s * aip + c * aiq;
                        a[q][i] = a[i][q];
                    }
                }
                for i in 0..n {
                    let vip = v[i][p];
                    let viq = v[i][q];
                    v[i][p] = c * vip - s * viq;
                    v[i][q] = s * vip + c * viq;
                }
            }
        }
    }
    None
}

fn kmeans(embedding: &[Vec<f32>], k: usize, max_iters: usize, seed: u64) -> Option<Vec<Option<PartIndex>>> {
    let n = embedding.len();
    if n == 0 {
        return None;
    }
    let dims = embedding[0].len();
    let mut rng = seeded_rng(seed, 0);
    let mut centroids: Vec<Vec<f32>> = (0..k).map(|_| embedding[rng.gen_range(0..n)].clone()).collect();
    let mut assignment = vec![None; n];

    for _ in 0..max_iters.max(1) {
        let mut changed = false;
        for (v, point) in embedding.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f32::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let dist: f32 = point.iter().zip(centroid.iter()).map(|(p, c)| (p - c).powi(2)).sum();
                if dist < best_dist {
                    best_dist = dist;
                    best = c;
                }
            }
            if assignment[v] != Some(best) {
                changed = true;
            }
            assignment[v] = Some(best);
        }

        let mut sums = vec![vec![0.0f32; dims]; k];
        let mut counts = vec![0usize; k];
        for (v, point) in embedding.iter().enumerate() {
            let c = assignment[v].unwrap();
            counts[c] += 1;
            for d in 0..dims {
                sums[c][d] += point[d];
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // reinitialize empty clusters to a random row
                centroids[c] = embedding[rng.gen_range(0..n)].clone();
            } else {
                for d in 0..dims {
                    centroids[c][d] = sums[c][d] / counts[c] as f32;
                }
            }
        }
        if !changed {
            break;
        }
    }
    Some(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypergraph::Hypergraph;

    fn two_clique_hypergraph() -> Hypergraph {
        // two well-separated cliques of 4 vertices each, joined by a single bridge edge
        let mut edges = Vec::new();
        for i in 0..4 {
            for j in (i + 1)..4 {
                edges.push(vec![i, j]);
                edges.push(vec![4 + i, 4 + j]);
            }
        }
        edges.push(vec![3, 4]);
        let m = edges.len();
        Hypergraph::new(vec![vec![1.0]; 8], edges, vec![vec![1.0]; m], vec![1000.0; m], vec![1.0; m])
    }

    #[test]
    fn separates_two_cliques() {
        let h = two_clique_hypergraph();
        let partitioner = SpectralKMeansPartitioner::default();
        let result = partitioner.partition(&h, 2, 42);
        assert!(result.is_some());
        let partition = result.unwrap();
        assert_eq!(partition.len(), 8);
        // the two cliques should not all land in the same partition
        let first_clique: std::collections::HashSet<_> = partition[0..4].iter().collect();
        assert!(first_clique.len() <= 2, "clique 0 should be assigned to at most 2 distinct partitions");
    }

    #[test]
    fn jacobi_reproduces_known_eigenvalues_of_identity() {
        let identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let (eigenvalues, _) = jacobi_eigen(&identity, 50).unwrap();
        assert!((eigenvalues[0] - 1.0).abs() < 1e-5);
        assert!((eigenvalues[1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn fewer_vertices_than_partitions_yields_singleton_partition() {
        let h = Hypergraph::new(vec![vec![1.0]; 2], vec![vec![0, 1]], vec![vec![1.0]], vec![10.0], vec![1.0]);
        let partitioner = SpectralKMeansPartitioner::default();
        let result = partitioner.partition(&h, 5, 1).unwrap();
        assert_eq!(result, vec![0, 1]);
    }
}
