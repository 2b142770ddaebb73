use serde::{Deserialize, Serialize};

use crate::catalog::Item;
use crate::category::Category;
use crate::util::median;

/// Number of hint tiers. The last tier reveals the answer.
pub const MAX_HINTS: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Ended,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Completed,
    NoMoreItems,
    Timeout,
    Quit,
    Other(String),
}

impl EndReason {
    pub fn as_str(&self) -> &str {
        match self {
            EndReason::Completed => "completed",
            EndReason::NoMoreItems => "no-more-items",
            EndReason::Timeout => "timeout",
            EndReason::Quit => "quit",
            EndReason::Other(s) => s,
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label {
            "completed" => EndReason::Completed,
            "no-more-items" => EndReason::NoMoreItems,
            "timeout" => EndReason::Timeout,
            "quit" => EndReason::Quit,
            other => EndReason::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the active item was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ResolveReason {
    Correct,
    MaxWrongs,
    #[serde(rename = "hint4")]
    #[strum(serialize = "hint4")]
    Hint4,
    TimeoutItem,
}

/// Outcome record for one item. Lives in the engine while the item is
/// active and is frozen into [`RunState::stats`] at resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub item_id: String,
    pub truth: Category,
    pub wrongs: u32,
    pub hints_used: u8,
    pub item_time_ms: u64,
    pub effective_time_ms: u64,
    pub points: u32,
    pub assisted: bool,
    pub picked: Option<Category>,
}

impl ItemResult {
    pub fn new(item: &Item) -> Self {
        Self {
            item_id: item.id.clone(),
            truth: item.truth,
            wrongs: 0,
            hints_used: 0,
            item_time_ms: 0,
            effective_time_ms: 0,
            points: 0,
            assisted: false,
            picked: None,
        }
    }

    /// Solved cleanly: right answer, unassisted, and worth something.
    pub fn is_correct(&self) -> bool {
        !self.assisted && self.picked == Some(self.truth) && self.points > 0
    }
}

/// Hints revealed for the active item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HintState {
    revealed: u8,
    active: [bool; MAX_HINTS as usize],
}

impl HintState {
    pub fn revealed(&self) -> u8 {
        self.revealed
    }

    pub fn next_order(&self) -> u8 {
        self.revealed + 1
    }

    pub fn is_active(&self, order: u8) -> bool {
        usize::from(order)
            .checked_sub(1)
            .and_then(|i| self.active.get(i))
            .copied()
            .unwrap_or(false)
    }

    /// Reveal `order` if it is the next tier. Returns false for anything
    /// out of sequence or past the last tier.
    pub fn reveal(&mut self, order: u8) -> bool {
        if order == 0 || order > MAX_HINTS || order != self.next_order() {
            return false;
        }
        self.revealed = order;
        self.active[usize::from(order - 1)] = true;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub level_id: String,
    pub items: Vec<Item>,
    pub index: usize,
    pub run_time_remaining: f64,
    pub score: u32,
    pub streak: u32,
    pub longest_streak: u32,
    pub stats: Vec<ItemResult>,
    pub status: RunStatus,
}

impl RunState {
    pub fn new(level_id: &str, items: Vec<Item>, run_duration_secs: f64) -> Self {
        Self {
            level_id: level_id.to_string(),
            items,
            index: 0,
            run_time_remaining: run_duration_secs,
            score: 0,
            streak: 0,
            longest_streak: 0,
            stats: Vec::new(),
            status: RunStatus::Running,
        }
    }

    pub fn current_item(&self) -> Option<&Item> {
        self.items.get(self.index)
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            level_id: self.level_id.clone(),
            index: self.index,
            item_count: self.items.len(),
            item_ids: self.items.iter().map(|i| i.id.clone()).collect(),
            current_item_id: self.current_item().map(|i| i.id.clone()),
            run_time_remaining: self.run_time_remaining,
            score: self.score,
            streak: self.streak,
            longest_streak: self.longest_streak,
            stats: self.stats.clone(),
            status: self.status,
        }
    }
}

/// Owned copy of the run handed to listeners and callers. Changing it has
/// no effect on the engine. Items are referenced by id; the full item is
/// carried by `item-active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub level_id: String,
    pub index: usize,
    pub item_count: usize,
    /// Presentation order of the run's items.
    pub item_ids: Vec<String>,
    pub current_item_id: Option<String>,
    pub run_time_remaining: f64,
    pub score: u32,
    pub streak: u32,
    pub longest_streak: u32,
    pub stats: Vec<ItemResult>,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub level_id: String,
    pub total_score: u32,
    pub attempted: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub median_item_secs: f64,
    pub longest_streak: u32,
    pub reason: EndReason,
}

impl RunSummary {
    pub fn from_run(state: &RunState, reason: EndReason) -> Self {
        let attempted = state.stats.len();
        let correct = state.stats.iter().filter(|r| r.is_correct()).count();
        let accuracy = if attempted == 0 {
            0.0
        } else {
            correct as f64 / attempted as f64
        };

        let unassisted_secs = state
            .stats
            .iter()
            .filter(|r| !r.assisted)
            .map(|r| r.item_time_ms as f64 / 1000.0)
            .collect::<Vec<f64>>();

        Self {
            level_id: state.level_id.clone(),
            total_score: state.score,
            attempted,
            correct,
            accuracy,
            median_item_secs: median(&unassisted_secs).unwrap_or(0.0),
            longest_streak: state.longest_streak,
            reason,
        }
    }
}
