//! C2: load-balancing policies.

use rand::Rng;
use sched_core::LoadPolicyKind;

const WEIGHTED_EPSILON: f64 = 1e-6;

/// A pure function from a load vector to the chosen local index. Holds
/// no state of its own — `sched_core::LoadPolicyKind` selects which
/// variant a running scheduler uses.
#[derive(Debug, Clone, Copy)]
pub struct LoadPolicy(LoadPolicyKind);

impl LoadPolicy {
    pub fn new(kind: LoadPolicyKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> LoadPolicyKind {
        self.0
    }

    /// Picks a local index into `loads`. Panics if `loads` is empty;
    /// callers only invoke this over a non-empty eligible subset.
    pub fn pick(&self, loads: &[u32], rng: &mut impl Rng) -> usize {
        assert!(!loads.is_empty(), "pick called with no eligible engines");
        match self.0 {
            LoadPolicyKind::Lru | LoadPolicyKind::Pure => 0,
            LoadPolicyKind::PlainRandom => rng.gen_range(0..loads.len()),
            LoadPolicyKind::TwoBin => {
                let a = rng.gen_range(0..loads.len());
                let b = rng.gen_range(0..loads.len());
                a.min(b)
            }
            LoadPolicyKind::Weighted => weighted_pick(loads, rng),
            LoadPolicyKind::LeastLoad => least_load(loads),
        }
    }
}

fn least_load(loads: &[u32]) -> usize {
    let mut best = 0;
    for (i, &load) in loads.iter().enumerate().skip(1) {
        if load < loads[best] {
            best = i;
        }
    }
    best
}

/// Draws two indices weighted by `1/(epsilon+load)` and returns the
/// less-loaded of the two, breaking ties toward the first draw.
fn weighted_pick(loads: &[u32], rng: &mut impl Rng) -> usize {
    let a = weighted_draw(loads, rng);
    let b = weighted_draw(loads, rng);
    if loads[b] < loads[a] {
        b
    } else {
        a
    }
}

fn weighted_draw(loads: &[u32], rng: &mut impl Rng) -> usize {
    let weights: Vec<f64> = loads
        .iter()
        .map(|&l| 1.0 / (WEIGHTED_EPSILON + l as f64))
        .collect();
    let total: f64 = weights.iter().sum();
    let mut draw = rng.gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        if draw < *w {
            return i;
        }
        draw -= w;
    }
    weights.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn lru_always_picks_front() {
        let p = LoadPolicy::new(LoadPolicyKind::Lru);
        assert_eq!(p.pick(&[5, 0, 2], &mut rng()), 0);
    }

    #[test]
    fn pure_delegates_to_lru() {
        let p = LoadPolicy::new(LoadPolicyKind::Pure);
        assert_eq!(p.pick(&[5, 0, 2], &mut rng()), 0);
    }

    #[test]
    fn least_load_picks_first_on_tie() {
        let p = LoadPolicy::new(LoadPolicyKind::LeastLoad);
        assert_eq!(p.pick(&[1, 0, 0, 2], &mut rng()), 1);
    }

    #[test]
    fn plain_random_stays_in_bounds() {
        let p = LoadPolicy::new(LoadPolicyKind::PlainRandom);
        let mut r = rng();
        for _ in 0..50 {
            assert!(p.pick(&[0, 0, 0, 0], &mut r) < 4);
        }
    }

    #[test]
    fn two_bin_stays_in_bounds() {
        let p = LoadPolicy::new(LoadPolicyKind::TwoBin);
        let mut r = rng();
        for _ in 0..50 {
            assert!(p.pick(&[1, 2, 3], &mut r) < 3);
        }
    }

    #[test]
    fn weighted_favors_zero_load_over_many_draws() {
        let p = LoadPolicy::new(LoadPolicyKind::Weighted);
        let mut r = rng();
        let mut picks_of_idle = 0;
        for _ in 0..200 {
            if p.pick(&[0, 50], &mut r) == 0 {
                picks_of_idle += 1;
            }
        }
        assert!(picks_of_idle > 150, "expected idle engine to dominate, got {picks_of_idle}/200");
    }

    #[test]
    #[should_panic]
    fn pick_panics_on_empty_loads() {
        let p = LoadPolicy::new(LoadPolicyKind::LeastLoad);
        p.pick(&[], &mut rng());
    }
}
