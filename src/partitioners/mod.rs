//! The four multi-start initial partitioners: spectral+k-means, crossbar BFS,
//! balanced random k-way, and a METIS-like k-way cut.

pub mod balanced_random;
pub mod crossbar;
pub mod kway_cut;
pub mod spectral;

use crate::hypergraph::Hypergraph;
use crate::util::PartIndex;

/// common interface the driver iterates over; modeled as variants rather than
/// inheritance per the design notes ("Dynamic dispatch over initial
/// partitioners")
pub trait InitialPartitioner {
    fn name(&self) -> &'static str;

    /// build a partition map `π: [0, V) -> [0, num_parts)`; `None` on
    /// convergence failure (`SolverFailure`), in which case the caller skips
    /// this candidate and proceeds to the next
    fn partition(&self, hypergraph: &Hypergraph, num_parts: PartIndex, seed: u64) -> Option<Vec<PartIndex>>;
}

/// repair a raw assignment vector into a dense, contiguous partition map:
/// renumber the distinct labels actually used starting at 0. Does not
/// guarantee every `[0, num_parts)` label is populated; callers that need
/// that invariant should call [`is_dense`] first.
pub fn relabel_contiguous(raw: &[usize]) -> Vec<PartIndex> {
    let mut next_label = std::collections::HashMap::new();
    let mut out = Vec::with_capacity(raw.len());
    for &label in raw {
        let len = next_label.len();
        let dense = *next_label.entry(label).or_insert(len);
        out.push(dense);
    }
    out
}

pub fn num_parts_used(partition: &[PartIndex]) -> PartIndex {
    1 + partition.iter().copied().max().unwrap_or(0)
}

pub fn is_dense(partition: &[PartIndex], num_parts: PartIndex) -> bool {
    let mut seen = vec![false; num_parts];
    for &p in partition {
        if p >= num_parts {
            return false;
        }
        seen[p] = true;
    }
    seen.into_iter().all(|s| s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relabel_contiguous_preserves_first_seen_order() {
        assert_eq!(relabel_contiguous(&[5, 5, 2, 2, 9]), vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn is_dense_detects_gaps() {
        assert!(is_dense(&[0, 1, 1, 2], 3));
        assert!(!is_dense(&[0, 2, 2], 3));
    }
}
