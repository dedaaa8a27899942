//! Day-over-day change detection between two ranked top-N snapshots.
//!
//! The detector is a pure function of the two snapshots it is given; the
//! caller fetches both fresh from the history store each run, so no
//! yesterday-state survives between runs.

use std::collections::{HashMap, HashSet};

use crate::domain::model::{ChangeEvent, ChangeKind, Observation};
use crate::domain::normalizer::round2;

pub const DEFAULT_THRESHOLD_PCT: f64 = 5.0;
pub const DEFAULT_TOP_N: usize = 10;

pub struct ChangeDetector {
    threshold_pct: f64,
}

impl ChangeDetector {
    pub fn new(threshold_pct: f64) -> Self {
        Self { threshold_pct }
    }

    /// Compare today's ranked snapshot against the previous trading day's.
    ///
    /// Emits `Moved` for products present in both whose per-gram price
    /// changed by at least the threshold, `Entered` for products new to the
    /// top-N regardless of magnitude, and `Dropped` for products that left
    /// it. Ranks are 1-based positions in the given snapshots.
    pub fn detect(&self, current: &[Observation], previous: &[Observation]) -> Vec<ChangeEvent> {
        let prev_by_key: HashMap<&str, (usize, &Observation)> = previous
            .iter()
            .enumerate()
            .map(|(i, obs)| (obs.product.key.as_str(), (i + 1, obs)))
            .collect();

        let mut events = Vec::new();

        for (i, obs) in current.iter().enumerate() {
            let rank_current = i + 1;
            let current_ppg = obs.product.price_per_fine_gram;

            match prev_by_key.get(obs.product.key.as_str()) {
                Some((rank_previous, prev_obs)) => {
                    let previous_ppg = prev_obs.product.price_per_fine_gram;
                    let pct_change = match (previous_ppg, current_ppg) {
                        (Some(prev), Some(cur)) if prev > 0.0 => Some((cur - prev) / prev * 100.0),
                        _ => None,
                    };
                    // Threshold applies to the raw change; rounding is
                    // presentation only.
                    if let Some(pct) = pct_change {
                        if pct.abs() >= self.threshold_pct {
                            events.push(ChangeEvent {
                                kind: ChangeKind::Moved,
                                product_key: obs.product.key.clone(),
                                name: obs.product.name.clone(),
                                previous_price_per_gram: previous_ppg,
                                current_price_per_gram: current_ppg,
                                pct_change: Some(round2(pct)),
                                rank_previous: Some(*rank_previous),
                                rank_current: Some(rank_current),
                            });
                        }
                    }
                }
                None => {
                    events.push(ChangeEvent {
                        kind: ChangeKind::Entered,
                        product_key: obs.product.key.clone(),
                        name: obs.product.name.clone(),
                        previous_price_per_gram: None,
                        current_price_per_gram: current_ppg,
                        pct_change: None,
                        rank_previous: None,
                        rank_current: Some(rank_current),
                    });
                }
            }
        }

        // Leavers are reported in their own category, never silently omitted.
        let current_keys: HashSet<&str> = current
            .iter()
            .map(|obs| obs.product.key.as_str())
            .collect();
        for (i, obs) in previous.iter().enumerate() {
            if !current_keys.contains(obs.product.key.as_str()) {
                events.push(ChangeEvent {
                    kind: ChangeKind::Dropped,
                    product_key: obs.product.key.clone(),
                    name: obs.product.name.clone(),
                    previous_price_per_gram: obs.product.price_per_fine_gram,
                    current_price_per_gram: None,
                    pct_change: None,
                    rank_previous: Some(i + 1),
                    rank_current: None,
                });
            }
        }

        events
    }
}
