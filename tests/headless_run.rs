use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use symtrain::clock::ManualClock;
use symtrain::runtime::{Command, FixedTicker, Runner, TestEventSource, TrainerEvent};
use symtrain::{Catalog, EndReason, Engine, RunStatus, StartOptions};

fn key(c: char) -> TrainerEvent {
    TrainerEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
}

fn bank_items(catalog: &Catalog, ids: &[&str]) -> StartOptions {
    let items = ids
        .iter()
        .map(|id| {
            catalog
                .items()
                .iter()
                .find(|i| i.id == *id)
                .cloned()
                .unwrap()
        })
        .collect();
    StartOptions { items: Some(items) }
}

/// Drives the engine the same way the binary does, without a TTY.
fn drive(engine: &mut Engine, runner: &mut Runner<TestEventSource, FixedTicker>) {
    let categories = engine.current_level().unwrap().categories.clone();
    for _ in 0..200u32 {
        if engine.status() != RunStatus::Running {
            break;
        }
        match runner.step() {
            TrainerEvent::Tick => {
                let delta = runner.elapsed_since_tick();
                engine.on_tick(delta);
            }
            TrainerEvent::Resize => {}
            TrainerEvent::Key(key) => match Command::from_key(&key) {
                Some(Command::Pick(i)) => engine.on_guess(&categories[i].to_string()),
                Some(Command::Hint) => {
                    let order = engine.hint_state().unwrap().next_order();
                    engine.on_hint_request(order);
                }
                Some(Command::Quit) => {
                    engine.end_run(EndReason::Quit);
                }
                None => {}
            },
        }
    }
}

#[test]
fn keyboard_run_completes() {
    let catalog = Catalog::embedded().unwrap();
    let options = bank_items(&catalog, &["p1-01", "pm-02", "pg-03"]);
    let mut engine = Engine::builder(catalog).clock(ManualClock::new()).build();
    engine.start_run("basics", options).unwrap();

    let (tx, rx) = mpsc::channel();
    // basics menu: 1) p1  2) p2  3) pm  4) pg
    for c in ['1', '2', '3', ' ', '4'] {
        tx.send(key(c)).unwrap();
    }
    let mut runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    drive(&mut engine, &mut runner);

    assert_eq!(engine.status(), RunStatus::Idle);
    let summary = engine.last_summary().unwrap();
    assert_eq!(summary.reason, EndReason::Completed);
    assert_eq!(summary.attempted, 3);
    assert_eq!(summary.correct, 3);
    assert_eq!(summary.longest_streak, 1);
}

#[test]
fn quit_key_ends_the_run() {
    let catalog = Catalog::embedded().unwrap();
    let options = bank_items(&catalog, &["p2-01", "p1-02"]);
    let mut engine = Engine::builder(catalog).clock(ManualClock::new()).build();
    engine.start_run("basics", options).unwrap();

    let (tx, rx) = mpsc::channel();
    tx.send(key('2')).unwrap();
    tx.send(TrainerEvent::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)))
        .unwrap();
    let mut runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    drive(&mut engine, &mut runner);

    let summary = engine.last_summary().unwrap();
    assert_eq!(summary.reason, EndReason::Quit);
    assert_eq!(summary.attempted, 1);
}
