//! Indexed max-heap keyed by vertex-move gain, with in-place priority change
//! and deletion. Backed by the `priority-queue` crate, which already
//! maintains the `item -> index` side map the design notes call for (the
//! notes warn specifically against standard-library heaps that don't expose
//! position; this crate is the idiomatic escape hatch).

use crate::util::{lexicographic_cmp, PartIndex, VertexIndex, WeightVec};
use ordered_float::OrderedFloat;
use priority_queue::PriorityQueue;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct VertexGain {
    pub v: VertexIndex,
    pub from: PartIndex,
    pub to: PartIndex,
    pub gain: f32,
}

/// priority key: primary order by gain, ties broken by preferring the vertex
/// with the lexicographically smaller weight vector (so a *smaller* weight
/// vector must sort as a *larger* key)
#[derive(Debug, Clone, PartialEq)]
struct GainKey {
    gain: OrderedFloat<f32>,
    /// vertex weight vector; compared in *reverse* lexicographic order so a
    /// smaller weight vector yields a larger key on a gain tie
    weight: Vec<OrderedFloat<f32>>,
}

impl Eq for GainKey {}

impl PartialOrd for GainKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GainKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gain.cmp(&other.gain).then_with(|| {
            lexicographic_cmp(
                &other.weight.iter().map(|w| w.0).collect::<Vec<_>>(),
                &self.weight.iter().map(|w| w.0).collect::<Vec<_>>(),
            )
        })
    }
}

impl GainKey {
    fn new(gain: f32, weight: &WeightVec) -> Self {
        Self { gain: OrderedFloat(gain), weight: weight.iter().map(|&w| OrderedFloat(w)).collect() }
    }
}

pub struct GainBucket {
    heap: PriorityQueue<VertexIndex, GainKey>,
    records: std::collections::HashMap<VertexIndex, VertexGain>,
    active: bool,
}

impl GainBucket {
    pub fn new() -> Self {
        Self { heap: PriorityQueue::new(), records: std::collections::HashMap::new(), active: true }
    }

    pub fn insert(&mut self, gain: VertexGain, weight: &WeightVec) {
        let key = GainKey::new(gain.gain, weight);
        self.heap.push(gain.v, key);
        self.records.insert(gain.v, gain);
    }

    pub fn peek_max(&self) -> Option<&VertexGain> {
        let (v, _) = self.heap.peek()?;
        self.records.get(v)
    }

    pub fn extract_max(&mut self) -> Option<VertexGain> {
        let (v, _) = self.heap.pop()?;
        self.records.remove(&v)
    }

    /// O(log n) priority update; a no-op if `v` is not currently present
    pub fn change_priority(&mut self, v: VertexIndex, new_gain: f32, weight: &WeightVec) {
        if let Some(record) = self.records.get_mut(&v) {
            record.gain = new_gain;
            let key = GainKey::new(new_gain, weight);
            self.heap.change_priority(&v, key);
        }
    }

    pub fn remove(&mut self, v: VertexIndex) -> Option<VertexGain> {
        self.heap.remove(&v);
        self.records.remove(&v)
    }

    pub fn contains(&self, v: VertexIndex) -> bool {
        self.records.contains_key(&v)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Default for GainBucket {
    fn default() -> Self {
        Self::new()
    }
}

/// balance-legal candidate search: BFS the heap up to a fixed traversal depth
/// (bounded by repeated `peek`/temporary-removal), returning the first move
/// whose destination/source balance bounds are respected
pub fn best_legal_candidate(
    bucket: &mut GainBucket,
    block_balance: &[WeightVec],
    weight_of: impl Fn(VertexIndex) -> WeightVec,
    upper: &[WeightVec],
    lower: &[WeightVec],
    max_depth: usize,
) -> Option<VertexGain> {
    let mut shelved = Vec::new();
    let mut found = None;
    for _ in 0..max_depth {
        let Some(candidate) = bucket.extract_max() else { break };
        let w = weight_of(candidate.v);
        let legal = upper[candidate.to]
            .iter()
            .zip(block_balance[candidate.to].iter())
            .zip(w.iter())
            .all(|((u, b), wi)| *u >= b + wi)
            && block_balance[candidate.from]
                .iter()
                .zip(w.iter())
                .zip(lower[candidate.from].iter())
                .all(|((b, wi), l)| b - wi >= *l);
        if legal {
            found = Some(candidate.clone());
            shelved.push((candidate, w));
            break;
        } else {
            shelved.push((candidate, w));
        }
    }
    for (gain, w) in shelved {
        if found.as_ref().map(|f| f.v) != Some(gain.v) {
            bucket.insert(gain, &w);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_heap_orders_by_gain() {
        let mut bucket = GainBucket::new();
        bucket.insert(VertexGain { v: 0, from: 0, to: 1, gain: 1.0 }, &vec![5.0]);
        bucket.insert(VertexGain { v: 1, from: 0, to: 1, gain: 5.0 }, &vec![5.0]);
        bucket.insert(VertexGain { v: 2, from: 0, to: 1, gain: 3.0 }, &vec![5.0]);
        assert_eq!(bucket.peek_max().unwrap().v, 1);
        assert_eq!(bucket.extract_max().unwrap().v, 1);
        assert_eq!(bucket.extract_max().unwrap().v, 2);
        assert_eq!(bucket.extract_max().unwrap().v, 0);
        assert!(bucket.is_empty());
    }

    #[test]
    fn ties_prefer_smaller_weight_vector() {
        let mut bucket = GainBucket::new();
        bucket.insert(VertexGain { v: 0, from: 0, to: 1, gain: 2.0 }, &vec![10.0]);
        bucket.insert(VertexGain { v: 1, from: 0, to: 1, gain: 2.0 }, &vec![3.0]);
        assert_eq!(bucket.extract_max().unwrap().v, 1);
    }

    #[test]
    fn change_priority_and_remove_update_containment() {
        let mut bucket = GainBucket::new();
        bucket.insert(VertexGain { v: 0, from: 0, to: 1, gain: 1.0 }, &vec![1.0]);
        bucket.insert(VertexGain { v: 1, from: 0, to: 1, gain: 2.0 }, &vec![1.0]);
        bucket.change_priority(0, 10.0, &vec![1.0]);
        assert_eq!(bucket.peek_max().unwrap().v, 0);
        bucket.remove(0);
        assert!(!bucket.contains(0));
        assert_eq!(bucket.peek_max().unwrap().v, 1);
    }

    #[test]
    fn best_legal_candidate_skips_infeasible_moves() {
        let mut bucket = GainBucket::new();
        bucket.insert(VertexGain { v: 0, from: 0, to: 1, gain: 10.0 }, &vec![100.0]);
        bucket.insert(VertexGain { v: 1, from: 0, to: 1, gain: 1.0 }, &vec![1.0]);
        let block_balance = vec![vec![100.0], vec![0.0]];
        let upper = vec![vec![100.0], vec![2.0]]; // moving v=0 (weight 100) would violate upper[1]
        let lower = vec![vec![0.0], vec![0.0]];
        let weight_of = |v: VertexIndex| if v == 0 { vec![100.0] } else { vec![1.0] };
        let best = best_legal_candidate(&mut bucket, &block_balance, weight_of, &upper, &lower, 10);
        assert_eq!(best.unwrap().v, 1);
        assert!(bucket.contains(0), "infeasible candidate must be put back");
    }
}
