use serde::{Deserialize, Serialize};

use crate::catalog::Gate;
use crate::state::{ItemResult, RunSummary, MAX_HINTS};
use crate::util::clamp01;

/// Points multiplier per hints used. Hint counts are bounded to 0..=4 by
/// the hint protocol; lookups clamp into the table anyway.
pub const HINT_FACTORS: [f64; MAX_HINTS as usize + 1] = [1.0, 0.75, 0.5, 0.25, 0.0];

/// Tunables frozen for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Time constant of the speed decay, in seconds.
    pub tau_secs: f64,
    pub base_points: u32,
    pub wrong_tap_penalty: u32,
    pub max_wrongs_per_item: u32,
    /// Added to an item's effective time per hint used.
    pub hint_time_penalty_secs: f64,
    /// Taken off the run clock per hint used.
    pub hint_run_deduct_secs: f64,
    pub streak_start: u32,
    pub streak_bonus_per_item: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tau_secs: 6.0,
            base_points: 100,
            wrong_tap_penalty: 5,
            max_wrongs_per_item: 3,
            hint_time_penalty_secs: 3.0,
            hint_run_deduct_secs: 5.0,
            streak_start: 3,
            streak_bonus_per_item: 10,
        }
    }
}

pub fn hint_factor(hints: u8) -> f64 {
    HINT_FACTORS[usize::from(hints.min(MAX_HINTS))]
}

/// Points for a correctly answered item, before any streak bonus.
pub fn compute_item_points(result: &ItemResult, config: &RunConfig) -> u32 {
    let hints = result.hints_used;
    let wrongs = result.wrongs;
    if result.assisted || hints >= MAX_HINTS || wrongs >= config.max_wrongs_per_item {
        return 0;
    }

    let effective_secs =
        result.item_time_ms as f64 / 1000.0 + config.hint_time_penalty_secs * f64::from(hints);
    let speed = clamp01((-effective_secs / config.tau_secs).exp());
    let wrong_decay = 0.5_f64.powi(wrongs as i32);
    let base = (f64::from(config.base_points) * speed * wrong_decay * hint_factor(hints)).floor();

    let penalty = f64::from(config.wrong_tap_penalty) * f64::from(wrongs);
    (base - penalty).max(0.0) as u32
}

/// Accuracy must reach the minimum; the median must be strictly under the
/// limit.
pub fn gate_passes(accuracy: f64, median_item_secs: f64, gate: &Gate) -> bool {
    accuracy >= gate.min_accuracy && median_item_secs < gate.max_median_item_secs
}

pub fn evaluate_gate(summary: &RunSummary, gate: &Gate, gating_enabled: bool) -> bool {
    !gating_enabled || gate_passes(summary.accuracy, summary.median_item_secs, gate)
}
