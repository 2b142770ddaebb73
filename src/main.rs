use std::{error::Error, fs::File, io::stdin, path::PathBuf, time::Duration};

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode},
    tty::IsTty,
};
use tracing::warn;

use symtrain::{
    config::{FileSettingsStore, Settings, SettingsStore},
    item_source::{BankSource, GeneratedSource, ItemSource, WeaknessSource},
    logging,
    runtime::{Command, CrosstermEventSource, FixedTicker, Runner, TrainerEvent},
    store::{MemoryStore, ProgressStore, SqliteStore},
    ui::{self, ClockDisplay, TerminalHintRenderer},
    Catalog, EndReason, Engine, Level, RunEvent, RunStatus, StartOptions,
};

const TICK_RATE_MS: u64 = 100;

/// timed symmetry trainer: classify wallpaper patterns against the clock
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Classify patterns into the seventeen wallpaper groups against a run clock, \
                  with tiered hints, streak bonuses and level gates."
)]
pub struct Cli {
    /// user whose progress to load and update
    #[clap(short = 'u', long)]
    user: Option<String>,

    /// progress database path
    #[clap(long)]
    db: Option<PathBuf>,

    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// list levels and their gates
    Levels,
    /// play one run
    Play {
        /// level id (defaults to the last level played)
        #[clap(short = 'l', long)]
        level: Option<String>,

        /// seed for item selection
        #[clap(long)]
        seed: Option<u64>,

        /// disable the run clock
        #[clap(long)]
        no_timer: bool,

        /// draw items uniformly instead of targeting weak spots
        #[clap(long)]
        random: bool,

        /// synthesize new items instead of using the bank
        #[clap(long, conflicts_with = "random")]
        generated: bool,
    },
    /// show unlocked levels and weak spots
    Progress,
    /// list past runs
    History {
        /// write history as csv to this path
        #[clap(long)]
        csv: Option<PathBuf>,
    },
    /// forget progress and history
    Reset,
}

fn open_store(db: Option<PathBuf>) -> Box<dyn ProgressStore> {
    let opened = match db {
        Some(path) => SqliteStore::open(path),
        None => SqliteStore::open_default(),
    };
    match opened {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(error = %e, "progress database unavailable, progress will not be kept");
            Box::new(MemoryStore::new())
        }
    }
}

/// Engine for the read-only subcommands: the user's progress and history,
/// no run.
fn build_engine(catalog: Catalog, store: Box<dyn ProgressStore>, settings: &Settings) -> Engine {
    Engine::builder(catalog)
        .boxed_store(store)
        .user_id(settings.user_id.clone())
        .build()
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _log_guard = logging::init_tracing(logging::log_path().as_deref());

    let settings_store = FileSettingsStore::new();
    let mut settings = settings_store.load();
    if let Some(user) = &cli.user {
        settings.user_id = user.clone();
    }

    let catalog = Catalog::embedded()?;
    let store = open_store(cli.db.clone());

    match cli.command.clone().unwrap_or(Commands::Levels) {
        Commands::Levels => {
            let engine = build_engine(catalog, store, &settings);
            for line in ui::level_lines(engine.catalog().levels(), engine.progress()) {
                println!("{line}");
            }
        }
        Commands::Progress => {
            let engine = build_engine(catalog, store, &settings);
            for line in ui::progress_lines(engine.progress()) {
                println!("{line}");
            }
        }
        Commands::History { csv } => {
            let history = build_engine(catalog, store, &settings).history();
            match csv {
                Some(path) => ui::write_history_csv(&history, File::create(path)?)?,
                None => {
                    for line in ui::history_lines(&history) {
                        println!("{line}");
                    }
                }
            }
        }
        Commands::Reset => {
            let mut engine = build_engine(catalog, store, &settings);
            engine.reset_progress();
            println!("progress for {} cleared", engine.user_id());
        }
        Commands::Play {
            level,
            seed,
            no_timer,
            random,
            generated,
        } => {
            if !stdin().is_tty() {
                let mut cmd = Cli::command();
                cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
            }

            let source: Box<dyn ItemSource> = if generated {
                Box::new(GeneratedSource)
            } else if random {
                Box::new(BankSource)
            } else {
                Box::new(WeaknessSource)
            };
            let mut features = settings.features;
            if no_timer {
                features.timer = false;
            }

            let mut engine = Engine::builder(catalog)
                .boxed_store(store)
                .boxed_item_source(source)
                .hint_renderer(TerminalHintRenderer)
                .user_id(settings.user_id.clone())
                .seed(seed.or(settings.seed))
                .run_config(settings.run_config)
                .features(features)
                .build();

            let level_id = level
                .or_else(|| settings.last_level.clone())
                .or_else(|| engine.catalog().first_level().map(|l| l.id.clone()))
                .unwrap_or_default();
            let locked = engine.catalog().level(&level_id).is_some()
                && !engine.progress().is_unlocked(&level_id);
            if locked {
                let mut cmd = Cli::command();
                cmd.error(
                    ErrorKind::InvalidValue,
                    format!("level {level_id} is locked; pass the previous level's gate first"),
                )
                .exit();
            }

            play(&mut engine, &level_id)?;

            settings.last_level = Some(level_id);
            if let Err(e) = settings_store.save(&settings) {
                warn!(error = %e, "could not save settings");
            }
        }
    }

    Ok(())
}

fn play(engine: &mut Engine, level_id: &str) -> Result<(), Box<dyn Error>> {
    let mut level: Option<Level> = None;
    let mut clock = ClockDisplay::default();
    engine.subscribe(move |event| {
        let lines = match event {
            RunEvent::RunTick { run, .. } => {
                clock.update(run.run_time_remaining).into_iter().collect()
            }
            RunEvent::RunStarted { level: started, run } => {
                level = Some(started.clone());
                clock.update(run.run_time_remaining);
                ui::event_line(event).into_iter().collect()
            }
            RunEvent::ItemActive { item, index, run } => match &level {
                Some(level) => ui::item_lines(item, *index, run.item_count, level),
                None => vec![item.content.clone()],
            },
            RunEvent::RunEnded {
                summary,
                gate_passed,
                ..
            } => ui::summary_lines(summary, *gate_passed),
            other => ui::event_line(other).into_iter().collect(),
        };
        // Output is best effort; a closed terminal must not stop the run.
        let _ = ui::print_lines(lines);
    });

    enable_raw_mode()?;
    let result = drive(engine, level_id);
    disable_raw_mode()?;
    result
}

fn drive(engine: &mut Engine, level_id: &str) -> Result<(), Box<dyn Error>> {
    engine.start_run(level_id, StartOptions::default())?;
    let categories = engine
        .current_level()
        .map(|l| l.categories.clone())
        .unwrap_or_default();

    let mut runner = Runner::new(
        CrosstermEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_RATE_MS)),
    );
    runner.elapsed_since_tick();

    while engine.status() == RunStatus::Running {
        match runner.step() {
            TrainerEvent::Tick => {
                let delta = runner.elapsed_since_tick();
                engine.on_tick(delta);
            }
            TrainerEvent::Resize => {}
            TrainerEvent::Key(key) => match Command::from_key(&key) {
                Some(Command::Pick(i)) => {
                    if let Some(category) = categories.get(i) {
                        engine.on_guess(&category.to_string());
                    }
                }
                Some(Command::Hint) => {
                    if let Some(hints) = engine.hint_state() {
                        engine.on_hint_request(hints.next_order());
                    }
                }
                Some(Command::Quit) => {
                    engine.end_run(EndReason::Quit);
                }
                None => {}
            },
        }
    }
    Ok(())
}
