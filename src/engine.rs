//! The run engine: one timed session at a time, driven entirely by the
//! caller.
//!
//! A run goes `Idle -> Running -> Ended` exactly once. While it is running
//! the caller forwards guesses ([`Engine::on_guess`]), hint requests
//! ([`Engine::on_hint_request`]) and elapsed time ([`Engine::on_tick`]); the
//! engine never reads wall time on its own except through the injected
//! [`Clock`] to stamp item durations. Every transition is published on the
//! [`EventBus`] before the call returns.

use std::collections::HashSet;

use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{Catalog, Item, Level};
use crate::category::Category;
use crate::clock::{Clock, SystemClock};
use crate::config::{Features, RunConfigOverrides};
use crate::error::EngineError;
use crate::events::{EventBus, ListenerId, RunEvent};
use crate::item_source::{BankSource, ItemSource};
use crate::progress::{Progress, RunRecord};
use crate::scoring::{compute_item_points, evaluate_gate, RunConfig};
use crate::state::{
    EndReason, HintState, ItemResult, ResolveReason, RunSnapshot, RunState, RunStatus, RunSummary,
    MAX_HINTS,
};
use crate::store::{MemoryStore, ProgressStore};

/// Presentation side effect of a granted hint, e.g. drawing an overlay.
pub trait HintRenderer {
    fn render(&mut self, order: u8, item: &Item, payload: Option<&str>);
}

#[derive(Debug, Default)]
pub struct NoopHintRenderer;

impl HintRenderer for NoopHintRenderer {
    fn render(&mut self, _order: u8, _item: &Item, _payload: Option<&str>) {}
}

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Use these items instead of asking the item source.
    pub items: Option<Vec<Item>>,
}

/// Scratch state of the item currently on screen.
#[derive(Debug)]
struct ActiveItem {
    result: ItemResult,
    hints: HintState,
    activated_at_ms: u64,
    rejected: HashSet<Category>,
}

#[derive(Debug)]
struct Run {
    state: RunState,
    level: Level,
    config: RunConfig,
    active: Option<ActiveItem>,
}

#[derive(Debug, Clone, Copy)]
struct ResolveOptions {
    correct: bool,
    assisted: bool,
    picked: Option<Category>,
    reason: ResolveReason,
    advance: bool,
}

pub struct EngineBuilder {
    catalog: Catalog,
    clock: Box<dyn Clock>,
    source: Box<dyn ItemSource>,
    renderer: Box<dyn HintRenderer>,
    store: Box<dyn ProgressStore>,
    user_id: String,
    seed: Option<u64>,
    overrides: RunConfigOverrides,
    features: Features,
}

impl EngineBuilder {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            clock: Box::new(SystemClock::new()),
            source: Box::new(BankSource),
            renderer: Box::new(NoopHintRenderer),
            store: Box::new(MemoryStore::new()),
            user_id: "local".to_string(),
            seed: None,
            overrides: RunConfigOverrides::default(),
            features: Features::default(),
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn item_source(mut self, source: impl ItemSource + 'static) -> Self {
        self.source = Box::new(source);
        self
    }

    pub fn boxed_item_source(mut self, source: Box<dyn ItemSource>) -> Self {
        self.source = source;
        self
    }

    pub fn hint_renderer(mut self, renderer: impl HintRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn store(mut self, store: impl ProgressStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn boxed_store(mut self, store: Box<dyn ProgressStore>) -> Self {
        self.store = store;
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn run_config(mut self, overrides: RunConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Build the engine and load the user's progress. A store failure is
    /// logged and the user starts from fresh progress.
    pub fn build(self) -> Engine {
        let progress = match self.store.load_progress(&self.user_id) {
            Ok(Some(progress)) => progress,
            Ok(None) => Progress::for_catalog(&self.catalog),
            Err(e) => {
                warn!(
                    user = %self.user_id,
                    error = %e,
                    "could not load progress, starting fresh"
                );
                Progress::for_catalog(&self.catalog)
            }
        };
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Engine {
            catalog: self.catalog,
            clock: self.clock,
            source: self.source,
            renderer: self.renderer,
            store: self.store,
            user_id: self.user_id,
            rng,
            run_config: self.overrides.apply(RunConfig::default()),
            features: self.features,
            progress,
            bus: EventBus::new(),
            run: None,
            last_summary: None,
        }
    }
}

pub struct Engine {
    catalog: Catalog,
    clock: Box<dyn Clock>,
    source: Box<dyn ItemSource>,
    renderer: Box<dyn HintRenderer>,
    store: Box<dyn ProgressStore>,
    user_id: String,
    rng: StdRng,
    run_config: RunConfig,
    features: Features,
    progress: Progress,
    bus: EventBus,
    run: Option<Run>,
    last_summary: Option<RunSummary>,
}

impl Engine {
    pub fn builder(catalog: Catalog) -> EngineBuilder {
        EngineBuilder::new(catalog)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&RunEvent) + 'static) -> ListenerId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn status(&self) -> RunStatus {
        self.run
            .as_ref()
            .map(|r| r.state.status)
            .unwrap_or(RunStatus::Idle)
    }

    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.run.as_ref().map(|r| r.state.snapshot())
    }

    pub fn current_level(&self) -> Option<&Level> {
        self.run.as_ref().map(|r| &r.level)
    }

    pub fn current_item(&self) -> Option<&Item> {
        self.run
            .as_ref()
            .filter(|r| r.active.is_some())
            .and_then(|r| r.state.current_item())
    }

    /// The live result of the active item.
    pub fn current_result(&self) -> Option<&ItemResult> {
        self.run
            .as_ref()
            .and_then(|r| r.active.as_ref())
            .map(|a| &a.result)
    }

    pub fn hint_state(&self) -> Option<HintState> {
        self.run
            .as_ref()
            .and_then(|r| r.active.as_ref())
            .map(|a| a.hints)
    }

    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    /// Run history from the store; empty if the store cannot be read.
    pub fn history(&self) -> Vec<RunRecord> {
        self.store.run_history(&self.user_id).unwrap_or_else(|e| {
            warn!(user = %self.user_id, error = %e, "could not read run history");
            Vec::new()
        })
    }

    /// Forget all progress and history for this user.
    pub fn reset_progress(&mut self) {
        self.progress = Progress::for_catalog(&self.catalog);
        if let Err(e) = self.store.reset(&self.user_id) {
            warn!(user = %self.user_id, error = %e, "could not reset stored progress");
        }
    }

    /// Start a run of `level_id`. A run still in progress is ended first
    /// with reason `superseded`.
    #[instrument(skip(self, options))]
    pub fn start_run(
        &mut self,
        level_id: &str,
        options: StartOptions,
    ) -> Result<RunSnapshot, EngineError> {
        let level = self
            .catalog
            .level(level_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownLevel(level_id.to_string()))?;

        let mut items = match options.items {
            Some(items) => items,
            None => self
                .source
                .select_items(&level, &self.catalog, &self.progress, &mut self.rng),
        };
        items.truncate(level.pool_size);
        if items.is_empty() {
            return Err(EngineError::EmptyItemPool(level.id));
        }

        if self.run.is_some() {
            warn!("starting a run while another is active");
            self.end_run(EndReason::Other("superseded".to_string()));
        }

        info!(level = %level.id, items = items.len(), "run started");
        let state = RunState::new(&level.id, items, level.run_duration_secs);
        let started = RunEvent::RunStarted {
            run: state.snapshot(),
            level: level.clone(),
        };
        self.run = Some(Run {
            state,
            level,
            config: self.run_config,
            active: None,
        });
        self.bus.emit(&started);

        self.activate_current_item();
        self.snapshot()
            .ok_or_else(|| EngineError::EmptyItemPool(level_id.to_string()))
    }

    fn activate_current_item(&mut self) {
        let now = self.clock.now_ms();
        let event = {
            let Some(run) = self.run.as_mut() else {
                return;
            };
            if run.state.status != RunStatus::Running {
                return;
            }
            match run.state.current_item() {
                Some(item) => {
                    let item = item.clone();
                    run.active = Some(ActiveItem {
                        result: ItemResult::new(&item),
                        hints: HintState::default(),
                        activated_at_ms: now,
                        rejected: HashSet::new(),
                    });
                    debug!(item = %item.id, index = run.state.index, "item active");
                    Some(RunEvent::ItemActive {
                        item,
                        index: run.state.index,
                        run: run.state.snapshot(),
                    })
                }
                None => None,
            }
        };

        match event {
            Some(event) => self.bus.emit(&event),
            None => {
                self.end_run(EndReason::NoMoreItems);
            }
        }
    }

    /// Classify the active item. Unknown labels and repeats of an already
    /// rejected guess are ignored.
    pub fn on_guess(&mut self, label: &str) {
        let Some(guess) = Category::parse(label) else {
            debug!(label, "ignoring unrecognized guess");
            return;
        };
        let streaks = self.features.streaks;

        let (event, follow_up) = {
            let Some(run) = self.run.as_mut() else {
                return;
            };
            if run.state.status != RunStatus::Running {
                return;
            }
            let Some(active) = run.active.as_mut() else {
                return;
            };

            if guess == active.result.truth {
                let event = RunEvent::GuessEvaluated {
                    guess,
                    correct: true,
                    run: run.state.snapshot(),
                    result: active.result.clone(),
                };
                let follow_up = ResolveOptions {
                    correct: true,
                    assisted: false,
                    picked: Some(guess),
                    reason: ResolveReason::Correct,
                    advance: true,
                };
                (event, Some(follow_up))
            } else {
                if !active.rejected.insert(guess) {
                    return;
                }
                active.result.wrongs += 1;
                active.result.picked = Some(guess);
                if streaks {
                    run.state.streak = 0;
                }
                let exhausted = active.result.wrongs >= run.config.max_wrongs_per_item;
                let event = RunEvent::GuessEvaluated {
                    guess,
                    correct: false,
                    result: active.result.clone(),
                    run: run.state.snapshot(),
                };
                let follow_up = exhausted.then_some(ResolveOptions {
                    correct: false,
                    assisted: true,
                    picked: None,
                    reason: ResolveReason::MaxWrongs,
                    advance: true,
                });
                (event, follow_up)
            }
        };

        self.bus.emit(&event);
        if let Some(options) = follow_up {
            self.resolve_current_item(options);
        }
    }

    /// Reveal hint tier `order`, which must be the next unrevealed tier.
    pub fn on_hint_request(&mut self, order: u8) {
        if !self.features.hints {
            return;
        }
        let timer = self.features.timer;
        let streaks = self.features.streaks;

        let granted = {
            let Some(run) = self.run.as_mut() else {
                return;
            };
            if run.state.status != RunStatus::Running {
                return;
            }
            let Some(active) = run.active.as_mut() else {
                return;
            };
            if !active.hints.reveal(order) {
                debug!(order, next = active.hints.next_order(), "ignoring out of order hint");
                return;
            }
            active.result.hints_used = order;

            if timer {
                run.state.run_time_remaining -= run.config.hint_run_deduct_secs;
            }
            if timer && run.state.run_time_remaining <= 0.0 {
                None
            } else {
                if streaks {
                    run.state.streak = 0;
                }
                run.state.current_item().cloned().map(|item| {
                    let event = RunEvent::HintUsed {
                        order,
                        item_id: item.id.clone(),
                        run: run.state.snapshot(),
                    };
                    (item, event)
                })
            }
        };

        let Some((item, event)) = granted else {
            info!(order, "hint deduction exhausted the run clock");
            self.handle_timeout();
            return;
        };
        self.renderer.render(order, &item, item.hint_payload(order));
        self.bus.emit(&event);

        if order == MAX_HINTS {
            self.resolve_current_item(ResolveOptions {
                correct: false,
                assisted: true,
                picked: None,
                reason: ResolveReason::Hint4,
                advance: true,
            });
        }
    }

    /// Advance the run clock by `delta_ms`.
    pub fn on_tick(&mut self, delta_ms: u64) {
        let now = self.clock.now_ms();
        let timer = self.features.timer;

        let event = {
            let Some(run) = self.run.as_mut() else {
                return;
            };
            if run.state.status != RunStatus::Running {
                return;
            }
            if timer {
                run.state.run_time_remaining -= delta_ms as f64 / 1000.0;
            }
            if timer && run.state.run_time_remaining <= 0.0 {
                None
            } else {
                if let Some(active) = run.active.as_mut() {
                    active.result.item_time_ms = now.saturating_sub(active.activated_at_ms);
                }
                Some(RunEvent::RunTick {
                    delta_ms,
                    run: run.state.snapshot(),
                })
            }
        };

        match event {
            Some(event) => self.bus.emit(&event),
            None => self.handle_timeout(),
        }
    }

    fn handle_timeout(&mut self) {
        let has_active = self.run.as_ref().is_some_and(|r| r.active.is_some());
        if has_active {
            self.resolve_current_item(ResolveOptions {
                correct: false,
                assisted: true,
                picked: None,
                reason: ResolveReason::TimeoutItem,
                advance: false,
            });
        }
        self.end_run(EndReason::Timeout);
    }

    fn resolve_current_item(&mut self, options: ResolveOptions) {
        let now = self.clock.now_ms();
        let features = self.features;

        let (resolved, score_event, next) = {
            let Some(run) = self.run.as_mut() else {
                return;
            };
            if run.state.status != RunStatus::Running {
                return;
            }
            let Some(active) = run.active.take() else {
                return;
            };
            let config = run.config;
            let mut result = active.result;

            result.item_time_ms = now.saturating_sub(active.activated_at_ms);
            let hint_penalty_ms =
                (config.hint_time_penalty_secs * f64::from(result.hints_used) * 1000.0).round();
            result.effective_time_ms = result.item_time_ms + hint_penalty_ms.max(0.0) as u64;
            if let Some(picked) = options.picked {
                result.picked = Some(picked);
            } else if options.correct {
                result.picked = Some(result.truth);
            }
            result.assisted = options.assisted;

            let mut points = if options.correct && !options.assisted {
                compute_item_points(&result, &config)
            } else {
                0
            };

            if features.streaks {
                let qualifies = options.correct
                    && !result.assisted
                    && result.wrongs == 0
                    && result.hints_used == 0;
                if qualifies {
                    run.state.streak += 1;
                    if run.state.streak >= config.streak_start {
                        points += config.streak_bonus_per_item;
                    }
                    run.state.longest_streak = run.state.longest_streak.max(run.state.streak);
                } else {
                    run.state.streak = 0;
                }
            }

            if result.assisted {
                points = 0;
            }
            result.points = points;

            run.state.stats.push(result.clone());
            run.state.score += points;
            run.state.index += 1;
            debug!(
                item = %result.item_id,
                reason = %options.reason,
                points,
                score = run.state.score,
                "item resolved"
            );

            let snapshot = run.state.snapshot();
            let resolved = RunEvent::ItemResolved {
                item_id: result.item_id.clone(),
                result,
                run: snapshot.clone(),
                reason: options.reason,
            };
            let score_event = RunEvent::ScoreUpdated {
                score: run.state.score,
                run: snapshot,
            };

            let next = if !options.advance {
                None
            } else if run.state.index >= run.state.items.len() {
                Some(Some(EndReason::Completed))
            } else if features.timer && run.state.run_time_remaining <= 0.0 {
                // No tick has run the clock out yet, e.g. a level with no run time.
                Some(Some(EndReason::Timeout))
            } else {
                Some(None)
            };
            (resolved, score_event, next)
        };

        self.bus.emit(&resolved);
        self.bus.emit(&score_event);

        match next {
            None => {}
            Some(Some(reason)) => {
                self.end_run(reason);
            }
            Some(None) => self.activate_current_item(),
        }
    }

    /// Finish the current run. Returns `None` when no run is in progress,
    /// including on a second call for the same run.
    pub fn end_run(&mut self, reason: EndReason) -> Option<RunSummary> {
        let mut run = self.run.take()?;
        if run.state.status != RunStatus::Running {
            return None;
        }
        run.state.status = RunStatus::Ended;

        let summary = RunSummary::from_run(&run.state, reason.clone());
        let gate_passed = evaluate_gate(&summary, &run.level.gate, self.features.gating);
        let unlocked = self
            .progress
            .apply_run(&self.catalog, &summary, &run.state.stats, gate_passed);
        info!(
            level = %summary.level_id,
            reason = %reason,
            score = summary.total_score,
            accuracy = summary.accuracy,
            median_secs = summary.median_item_secs,
            gate_passed,
            unlocked = unlocked.as_deref().unwrap_or("-"),
            "run ended"
        );

        self.persist(&summary, gate_passed);

        self.bus.emit(&RunEvent::RunEnded {
            summary: summary.clone(),
            gate_passed,
            reason,
        });
        self.last_summary = Some(summary.clone());
        Some(summary)
    }

    fn persist(&mut self, summary: &RunSummary, gate_passed: bool) {
        if let Err(e) = self.store.save_progress(&self.user_id, &self.progress) {
            warn!(user = %self.user_id, error = %e, "could not save progress");
        }
        let record = RunRecord {
            user_id: self.user_id.clone(),
            finished_at: Local::now(),
            gate_passed,
            summary: summary.clone(),
        };
        if let Err(e) = self.store.append_run(&record) {
            warn!(user = %self.user_id, error = %e, "could not append run history");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("user_id", &self.user_id)
            .field("status", &self.status())
            .field("features", &self.features)
            .field("run_config", &self.run_config)
            .field("bus", &self.bus)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn item(id: &str, truth: Category) -> Item {
        Item {
            id: id.into(),
            truth,
            content: format!("{id}.png"),
            hints: vec![],
        }
    }

    fn engine(clock: ManualClock) -> Engine {
        Engine::builder(Catalog::embedded().unwrap())
            .clock(clock)
            .seed(Some(1))
            .build()
    }

    fn start(engine: &mut Engine, items: Vec<Item>) -> RunSnapshot {
        engine
            .start_run(
                "basics",
                StartOptions {
                    items: Some(items),
                },
            )
            .unwrap()
    }

    #[test]
    fn effective_time_adds_hint_penalty() {
        let clock = ManualClock::new();
        let mut e = engine(clock.clone());
        start(&mut e, vec![item("a", Category::P1), item("b", Category::P2)]);
        e.on_hint_request(1);
        clock.advance_ms(1200);
        e.on_guess("p1");

        let snap = e.snapshot().unwrap();
        let r = &snap.stats[0];
        assert_eq!(r.item_time_ms, 1200);
        assert_eq!(r.effective_time_ms, 1200 + 3000);
        assert_eq!(r.hints_used, 1);
    }

    #[test]
    fn live_elapsed_time_updates_on_tick() {
        let clock = ManualClock::new();
        let mut e = engine(clock.clone());
        start(&mut e, vec![item("a", Category::P1)]);
        clock.advance_ms(700);
        e.on_tick(700);
        assert_eq!(e.current_result().unwrap().item_time_ms, 700);
    }

    #[test]
    fn status_returns_to_idle_after_end() {
        let mut e = engine(ManualClock::new());
        assert_eq!(e.status(), RunStatus::Idle);
        start(&mut e, vec![item("a", Category::P1)]);
        assert_eq!(e.status(), RunStatus::Running);
        e.end_run(EndReason::Quit);
        assert_eq!(e.status(), RunStatus::Idle);
        assert!(e.snapshot().is_none());
        assert_eq!(e.last_summary().unwrap().reason, EndReason::Quit);
    }

    #[test]
    fn starting_over_an_active_run_supersedes_it() {
        let mut e = engine(ManualClock::new());
        start(&mut e, vec![item("a", Category::P1)]);
        start(&mut e, vec![item("b", Category::P2)]);
        assert_eq!(
            e.last_summary().unwrap().reason,
            EndReason::Other("superseded".into())
        );
        assert_eq!(e.current_item().unwrap().id, "b");
    }
}
