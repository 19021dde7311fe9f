//! One simulated-annealing worker solving a floorplan on a sequence-pair
//! representation.

use crate::chiplet::{net_violation, Chiplet, MAX_ASPECT_RATIO, MIN_ASPECT_RATIO};
use crate::sequence_pair::SequencePair;
use crate::util::DeterministicRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerturbationWeights {
    pub pos_swap: f32,
    pub neg_swap: f32,
    pub double_swap: f32,
    pub resize: f32,
    pub expand: f32,
}

impl Default for PerturbationWeights {
    fn default() -> Self {
        Self { pos_swap: 0.25, neg_swap: 0.25, double_swap: 0.15, resize: 0.25, expand: 0.10 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostWeights {
    pub area: f32,
    pub package: f32,
    pub net: f32,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self { area: 1.0, package: 1.0, net: 1.0 }
    }
}

/// normalizers computed once from the initial floorplan and shared by every
/// worker in the pool, per the concurrency contract in §4.4
#[derive(Debug, Clone, Copy)]
pub struct Normalizers {
    pub area: f32,
    pub package: f32,
    pub net: f32,
}

impl Normalizers {
    pub fn from_state(area_excess: f32, wh: f32, net_violation_sum: f32) -> Self {
        Self {
            area: if area_excess > 1e-6 { area_excess } else { 1.0 },
            package: if wh > 1e-6 { wh } else { 1.0 },
            net: if net_violation_sum > 1e-6 { net_violation_sum } else { 1.0 },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SaConfig {
    pub max_steps: usize,
    pub perturbations_per_step: usize,
    pub t_init: f32,
    pub t_min: f32,
    pub cost_weights: CostWeights,
    pub perturbation_weights: PerturbationWeights,
    /// acceptance tolerance `epsilon` below which a worker is declared valid
    pub acceptance_tolerance: f32,
}

impl Default for SaConfig {
    fn default() -> Self {
        Self {
            max_steps: 200,
            perturbations_per_step: 20,
            t_init: 10.0,
            t_min: 0.01,
            cost_weights: CostWeights::default(),
            perturbation_weights: PerturbationWeights::default(),
            acceptance_tolerance: 1e-3,
        }
    }
}

pub struct NetRef {
    pub term_a: usize,
    pub term_b: usize,
    pub weight: f32,
    pub reach: f32,
    pub io_area: f32,
}

pub struct SaResult {
    pub valid: bool,
    pub chiplets: Vec<Chiplet>,
    pub sequence_pair: SequencePair,
    pub width: f32,
    pub height: f32,
    pub cost: f32,
}

pub struct SequencePairSA {
    chiplets: Vec<Chiplet>,
    nets: Vec<NetRef>,
    sequence_pair: SequencePair,
    normalizers: Normalizers,
    config: SaConfig,
    rng: DeterministicRng,
}

impl SequencePairSA {
    pub fn new(
        chiplets: Vec<Chiplet>,
        nets: Vec<NetRef>,
        warm_start: Option<SequencePair>,
        normalizers: Normalizers,
        config: SaConfig,
        rng: DeterministicRng,
    ) -> Self {
        let n = chiplets.len();
        let sequence_pair = match warm_start {
            Some(sp) if sp.len() == n => sp,
            _ => SequencePair::identity(n),
        };
        Self { chiplets, nets, sequence_pair, normalizers, config, rng }
    }

    fn net_violation_sum(&self) -> f32 {
        self.nets
            .iter()
            .map(|net| {
                net_violation(
                    &crate::chiplet::BundledNet {
                        term_a: net.term_a,
                        term_b: net.term_b,
                        weight: net.weight,
                        reach: net.reach,
                        io_area: net.io_area,
                    },
                    &self.chiplets[net.term_a],
                    &self.chiplets[net.term_b],
                )
            })
            .sum()
    }

    fn area_excess(&self) -> f32 {
        self.chiplets.iter().map(|c| (c.area() - c.min_area).max(0.0)).sum()
    }

    fn cost_from(&self, area_excess: f32, wh: f32, net_viol: f32) -> f32 {
        let w = self.config.cost_weights;
        let n = self.normalizers;
        w.area * (area_excess / n.area) + w.package * (wh / n.package) + w.net * (net_viol / n.net)
    }

    /// repack and compute the cost of the current state
    fn evaluate(&mut self) -> f32 {
        let (width, height) = self.sequence_pair.pack(&mut self.chiplets);
        let area_excess = self.area_excess();
        let net_viol = self.net_violation_sum();
        self.cost_from(area_excess, width * height, net_viol)
    }

    fn choose_perturbation(&mut self) -> u8 {
        let w = self.config.perturbation_weights;
        let total = w.pos_swap + w.neg_swap + w.double_swap + w.resize + w.expand;
        let mut r = self.rng.gen::<f32>() * total;
        for (kind, weight) in [(0u8, w.pos_swap), (1, w.neg_swap), (2, w.double_swap), (3, w.resize), (4, w.expand)] {
            if r < weight {
                return kind;
            }
            r -= weight;
        }
        4
    }

    fn random_pair(&mut self, n: usize) -> (usize, usize) {
        if n < 2 {
            return (0, 0);
        }
        let i = self.rng.gen_range(0..n);
        let mut j = self.rng.gen_range(0..n);
        while j == i {
            j = self.rng.gen_range(0..n);
        }
        (i, j)
    }

    fn perturb(&mut self) {
        let n = self.chiplets.len();
        if n == 0 {
            return;
        }
        match self.choose_perturbation() {
            0 => {
                let (i, j) = self.random_pair(n);
                self.sequence_pair.pos.swap(i, j);
            }
            1 => {
                let (i, j) = self.random_pair(n);
                self.sequence_pair.neg.swap(i, j);
            }
            2 => {
                let (i, j) = self.random_pair(n);
                self.sequence_pair.pos.swap(i, j);
                self.sequence_pair.neg.swap(i, j);
            }
            3 => self.perturb_resize(),
            _ => self.perturb_expand(),
        }
    }

    fn perturb_resize(&mut self) {
        let n = self.chiplets.len();
        let i = self.rng.gen_range(0..n);
        if self.rng.gen::<f32>() < 0.2 {
            let ar = self.rng.gen_range(MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO);
            self.chiplets[i].resize_to_aspect_ratio(ar);
            return;
        }
        // snap: align this chiplet's width/height to a breakpoint of another chiplet
        let xs: Vec<f32> = self.chiplets.iter().enumerate().filter(|(k, _)| *k != i).map(|(_, c)| c.x + c.width).collect();
        let ys: Vec<f32> = self.chiplets.iter().enumerate().filter(|(k, _)| *k != i).map(|(_, c)| c.y + c.height).collect();
        let cur_right = self.chiplets[i].x + self.chiplets[i].width;
        let cur_top = self.chiplets[i].y + self.chiplets[i].height;
        let next_right = xs.iter().copied().filter(|&v| v > cur_right).fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.min(v))));
        let prev_right = xs.iter().copied().filter(|&v| v < cur_right).fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.max(v))));
        let next_top = ys.iter().copied().filter(|&v| v > cur_top).fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.min(v))));
        let prev_top = ys.iter().copied().filter(|&v| v < cur_top).fold(None, |acc: Option<f32>, v| Some(acc.map_or(v, |a| a.max(v))));
        let options: Vec<(u8, Option<f32>)> = vec![(0, next_right), (1, prev_right), (2, next_top), (3, prev_top)];
        let choice = self.rng.gen_range(0..options.len());
        let (kind, target_opt) = options[choice];
        if let Some(target) = target_opt {
            let chiplet = &mut self.chiplets[i];
            match kind {
                0 | 1 => {
                    let new_width = (target - chiplet.x).max(1e-3);
                    chiplet.width = new_width;
                    if chiplet.area() < chiplet.min_area {
                        chiplet.height = chiplet.min_area / chiplet.width;
                    }
                }
                _ => {
                    let new_height = (target - chiplet.y).max(1e-3);
                    chiplet.height = new_height;
                    if chiplet.area() < chiplet.min_area {
                        chiplet.width = chiplet.min_area / chiplet.height;
                    }
                }
            }
        }
    }

    /// incident nets' unused reach, the slack by which this chiplet may grow
    fn expand_slack(&self, i: usize) -> f32 {
        let mut slack = f32::INFINITY;
        for net in &self.nets {
            if net.term_a == i || net.term_b == i {
                let other = if net.term_a == i { net.term_b } else { net.term_a };
                let length = crate::chiplet::routing_length_proxy(&self.chiplets[i], &self.chiplets[other], net.io_area);
                slack = slack.min((net.reach - length).max(0.0));
            }
        }
        if slack.is_infinite() {
            1.0
        } else {
            slack
        }
    }

    /// grow the chiplet with the least net-violation load into free space along
    /// a random axis, bounded by the expand slack derived from its nets
    fn perturb_expand(&mut self) {
        let n = self.chiplets.len();
        if n == 0 {
            return;
        }
        // pick the chiplet with minimal violation load among its incident nets
        let mut best = 0usize;
        let mut best_load = f32::INFINITY;
        for i in 0..n {
            let load: f32 = self
                .nets
                .iter()
                .filter(|net| net.term_a == i || net.term_b == i)
                .map(|net| {
                    let other = if net.term_a == i { net.term_b } else { net.term_a };
                    net_violation(
                        &crate::chiplet::BundledNet { term_a: i, term_b: other, weight: net.weight, reach: net.reach, io_area: net.io_area },
                        &self.chiplets[i],
                        &self.chiplets[other],
                    )
                })
                .sum();
            if load < best_load {
                best_load = load;
                best = i;
            }
        }
        let slack = self.expand_slack(best).min(2.0 * self.chiplets[best].width.max(self.chiplets[best].height));
        if slack <= 0.0 {
            return;
        }
        let grow = slack * self.rng.gen::<f32>();
        if self.rng.gen::<bool>() {
            self.chiplets[best].width += grow;
        } else {
            self.chiplets[best].height += grow;
        }
    }

    /// run the full metropolis schedule and return the best (last, since SA is
    /// monotone-cooling) state with a validity flag
    pub fn run(mut self) -> SaResult {
        if self.chiplets.is_empty() {
            return SaResult { valid: false, chiplets: vec![], sequence_pair: self.sequence_pair, width: 0.0, height: 0.0, cost: f32::INFINITY };
        }
        let mut temperature = self.config.t_init;
        let steps = self.config.max_steps.max(1);
        let cooling_exponent = 1.0 / (steps as f32 * self.config.perturbations_per_step.max(1) as f32);
        let cooling_base = (self.config.t_min / self.config.t_init).powf(cooling_exponent);

        let mut current_cost = self.evaluate();
        for _ in 0..steps {
            for _ in 0..self.config.perturbations_per_step.max(1) {
                let snapshot_sequence = self.sequence_pair.clone();
                let snapshot_chiplets = self.chiplets.clone();
                self.perturb();
                let candidate_cost = self.evaluate();
                let delta = candidate_cost - current_cost;
                let accept = delta <= 0.0 || self.rng.gen::<f32>() < (-delta / temperature.max(1e-6)).exp();
                if accept {
                    current_cost = candidate_cost;
                } else {
                    self.sequence_pair = snapshot_sequence;
                    self.chiplets = snapshot_chiplets;
                }
                temperature *= cooling_base;
            }
        }

        let (width, height) = self.sequence_pair.pack(&mut self.chiplets);
        let net_viol = self.net_violation_sum();
        let valid = net_viol <= self.config.acceptance_tolerance;
        SaResult { valid, chiplets: self.chiplets, sequence_pair: self.sequence_pair, width, height, cost: current_cost }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::seeded_rng;

    fn chiplets(n: usize) -> Vec<Chiplet> {
        (0..n).map(|_| Chiplet::new(10.0, 10.0, 1.0, 0.5)).collect()
    }

    #[test]
    fn converges_to_a_valid_floorplan_with_slack_nets() {
        let nets = vec![NetRef { term_a: 0, term_b: 1, weight: 1.0, reach: 1000.0, io_area: 1.0 }];
        let sa = SequencePairSA::new(
            chiplets(3),
            nets,
            None,
            Normalizers::from_state(1.0, 900.0, 1.0),
            SaConfig { max_steps: 20, perturbations_per_step: 10, ..Default::default() },
            seeded_rng(1, 0),
        );
        let result = sa.run();
        assert!(result.valid);
        assert_eq!(result.chiplets.len(), 3);
        assert!(result.width > 0.0 && result.height > 0.0);
    }

    #[test]
    fn empty_floorplan_is_invalid() {
        let sa = SequencePairSA::new(vec![], vec![], None, Normalizers::from_state(1.0, 1.0, 1.0), SaConfig::default(), seeded_rng(1, 0));
        let result = sa.run();
        assert!(!result.valid);
        assert!(result.chiplets.is_empty());
    }

    #[test]
    fn deterministic_given_same_seed() {
        let nets = vec![NetRef { term_a: 0, term_b: 1, weight: 2.0, reach: 5.0, io_area: 1.0 }];
        let cfg = SaConfig { max_steps: 15, perturbations_per_step: 8, ..Default::default() };
        let norm = Normalizers::from_state(1.0, 400.0, 1.0);
        let a = SequencePairSA::new(chiplets(2), nets_copy(), None, norm, cfg, seeded_rng(7, 0)).run();
        let b = SequencePairSA::new(chiplets(2), nets_copy(), None, norm, cfg, seeded_rng(7, 0)).run();
        assert!((a.width - b.width).abs() < 1e-9);
        assert!((a.height - b.height).abs() < 1e-9);
        assert_eq!(a.sequence_pair.pos, b.sequence_pair.pos);
    }

    fn nets_copy() -> Vec<NetRef> {
        vec![NetRef { term_a: 0, term_b: 1, weight: 2.0, reach: 5.0, io_area: 1.0 }]
    }
}
