//! Synchronous notifications from the run engine.
//!
//! Every state change is published as a [`RunEvent`] carrying owned
//! snapshots, so listeners can keep what they receive without holding on to
//! engine state. Dispatch happens inline on the caller's thread; a panicking
//! listener is logged and skipped, and the remaining listeners still run.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::warn;

use crate::catalog::{Item, Level};
use crate::category::Category;
use crate::state::{EndReason, ItemResult, ResolveReason, RunSnapshot, RunSummary};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RunEvent {
    RunStarted {
        run: RunSnapshot,
        level: Level,
    },
    RunTick {
        delta_ms: u64,
        run: RunSnapshot,
    },
    ItemActive {
        item: Item,
        index: usize,
        run: RunSnapshot,
    },
    HintUsed {
        order: u8,
        item_id: String,
        run: RunSnapshot,
    },
    GuessEvaluated {
        guess: Category,
        correct: bool,
        run: RunSnapshot,
        result: ItemResult,
    },
    ItemResolved {
        item_id: String,
        result: ItemResult,
        run: RunSnapshot,
        reason: ResolveReason,
    },
    ScoreUpdated {
        score: u32,
        run: RunSnapshot,
    },
    RunEnded {
        summary: RunSummary,
        gate_passed: bool,
        reason: EndReason,
    },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run-started",
            RunEvent::RunTick { .. } => "run-tick",
            RunEvent::ItemActive { .. } => "item-active",
            RunEvent::HintUsed { .. } => "hint-used",
            RunEvent::GuessEvaluated { .. } => "guess-evaluated",
            RunEvent::ItemResolved { .. } => "item-resolved",
            RunEvent::ScoreUpdated { .. } => "score-updated",
            RunEvent::RunEnded { .. } => "run-ended",
        }
    }
}

pub type Listener = Box<dyn FnMut(&RunEvent)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&RunEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver `event` to every listener in subscription order.
    pub fn emit(&mut self, event: &RunEvent) {
        for (id, listener) in self.listeners.iter_mut() {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if delivered.is_err() {
                warn!(listener = id.0, event = event.name(), "listener panicked during dispatch");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn score_event(score: u32) -> RunEvent {
        RunEvent::ScoreUpdated {
            score,
            run: crate::state::RunState::new("basics", vec![], 10.0).snapshot(),
        }
    }

    #[test]
    fn listeners_receive_events_in_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = seen.clone();
        bus.subscribe(move |e| a.borrow_mut().push(format!("a:{}", e.name())));
        let b = seen.clone();
        bus.subscribe(move |e| b.borrow_mut().push(format!("b:{}", e.name())));

        bus.emit(&score_event(1));
        assert_eq!(*seen.borrow(), vec!["a:score-updated", "b:score-updated"]);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let mut bus = EventBus::new();
        bus.subscribe(|_| panic!("listener failure"));
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        bus.subscribe(move |_| *c.borrow_mut() += 1);

        bus.emit(&score_event(1));
        bus.emit(&score_event(2));
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        let c = count.clone();
        let id = bus.subscribe(move |_| *c.borrow_mut() += 1);
        bus.emit(&score_event(1));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&score_event(2));
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn events_serialize_with_kebab_tag() {
        let json = serde_json::to_value(score_event(7)).unwrap();
        assert_eq!(json["event"], "score-updated");
        assert_eq!(json["score"], 7);
    }
}
