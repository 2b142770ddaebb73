use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::category::Category;
use crate::state::{ItemResult, RunSummary};

/// How often each hint tier had to be opened. Tier 1 shows rotation
/// centres, tier 2 mirror lines, tier 3 glide axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureWeakness {
    pub rotations: u32,
    pub mirrors: u32,
    pub glides: u32,
}

/// Cross-run learner state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub unlocked_levels: Vec<String>,
    /// truth -> picked -> count, mismatches only.
    pub confusion_matrix: BTreeMap<Category, BTreeMap<Category, u32>>,
    pub feature_weakness: FeatureWeakness,
}

impl Progress {
    /// Fresh progress with the catalog's first level open.
    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self {
            unlocked_levels: catalog.first_level().map(|l| l.id.clone()).into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_unlocked(&self, level_id: &str) -> bool {
        self.unlocked_levels.iter().any(|l| l == level_id)
    }

    /// Returns true if the level was newly unlocked.
    pub fn unlock(&mut self, level_id: &str) -> bool {
        if self.is_unlocked(level_id) {
            return false;
        }
        self.unlocked_levels.push(level_id.to_string());
        true
    }

    /// Fold one run's item results into the confusion matrix and the
    /// feature weakness counters.
    pub fn record_results(&mut self, stats: &[ItemResult]) {
        for result in stats {
            if let Some(picked) = result.picked.filter(|p| *p != result.truth) {
                *self
                    .confusion_matrix
                    .entry(result.truth)
                    .or_default()
                    .entry(picked)
                    .or_insert(0) += 1;
            }
            if result.hints_used >= 1 {
                self.feature_weakness.rotations += 1;
            }
            if result.hints_used >= 2 {
                self.feature_weakness.mirrors += 1;
            }
            if result.hints_used >= 3 {
                self.feature_weakness.glides += 1;
            }
        }
    }

    /// Apply a finished run. On a passed gate the level after the run's
    /// level is unlocked; its id is returned if it was not open before.
    pub fn apply_run(
        &mut self,
        catalog: &Catalog,
        summary: &RunSummary,
        stats: &[ItemResult],
        gate_passed: bool,
    ) -> Option<String> {
        self.record_results(stats);
        if !gate_passed {
            return None;
        }
        let next = catalog.next_level(&summary.level_id)?;
        self.unlock(&next.id).then(|| next.id.clone())
    }

    /// Total times `truth` was mistaken for something else.
    pub fn confusion_count(&self, truth: Category) -> u32 {
        self.confusion_matrix
            .get(&truth)
            .map(|row| row.values().sum())
            .unwrap_or(0)
    }

    /// Most frequent (truth, picked, count) mix-ups, largest first.
    pub fn top_confusions(&self, n: usize) -> Vec<(Category, Category, u32)> {
        self.confusion_matrix
            .iter()
            .flat_map(|(truth, row)| {
                row.iter()
                    .map(move |(picked, count)| (*truth, *picked, *count))
            })
            .sorted_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)).then(a.1.cmp(&b.1)))
            .take(n)
            .collect()
    }
}

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub user_id: String,
    pub finished_at: DateTime<Local>,
    pub gate_passed: bool,
    pub summary: RunSummary,
}
