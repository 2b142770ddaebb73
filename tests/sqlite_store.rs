use symtrain::clock::ManualClock;
use symtrain::store::{ProgressStore, SqliteStore};
use symtrain::{Catalog, Engine, StartOptions};

// Two engines sharing one database file, as two launches of the binary would.
#[test]
fn progress_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("progress.db");

    {
        let catalog = Catalog::embedded().unwrap();
        let clock = ManualClock::new();
        let mut engine = Engine::builder(catalog)
            .clock(clock.clone())
            .store(SqliteStore::open(&path).unwrap())
            .user_id("ada")
            .seed(Some(3))
            .build();
        engine.start_run("basics", StartOptions::default()).unwrap();
        while let Some(truth) = engine.current_item().map(|i| i.truth) {
            clock.advance_ms(1500);
            engine.on_guess(&truth.to_string());
        }
        assert!(engine.progress().is_unlocked("reflections"));
    }

    let engine = Engine::builder(Catalog::embedded().unwrap())
        .store(SqliteStore::open(&path).unwrap())
        .user_id("ada")
        .build();
    assert!(engine.progress().is_unlocked("reflections"));
    let history = engine.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].summary.level_id, "basics");
    assert!(history[0].gate_passed);

    let other = SqliteStore::open(&path).unwrap();
    assert!(other.load_progress("grace").unwrap().is_none());
    assert!(other.run_history("grace").unwrap().is_empty());
}

#[test]
fn reset_clears_one_user() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.db");

    for user in ["ada", "grace"] {
        let mut engine = Engine::builder(Catalog::embedded().unwrap())
            .clock(ManualClock::new())
            .store(SqliteStore::open(&path).unwrap())
            .user_id(user)
            .build();
        engine.start_run("basics", StartOptions::default()).unwrap();
        engine.end_run(symtrain::EndReason::Quit);
    }

    let mut engine = Engine::builder(Catalog::embedded().unwrap())
        .store(SqliteStore::open(&path).unwrap())
        .user_id("ada")
        .build();
    engine.reset_progress();
    assert!(engine.history().is_empty());

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.run_history("grace").unwrap().len(), 1);
    assert!(store.load_progress("ada").unwrap().is_none());
}
