// Library surface for the trainer binary and integration tests.
pub mod app_dirs;
pub mod catalog;
pub mod category;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod item_source;
pub mod logging;
pub mod progress;
pub mod runtime;
pub mod scoring;
pub mod state;
pub mod store;
pub mod ui;
pub mod util;

pub use catalog::{Catalog, Gate, Item, Level};
pub use category::Category;
pub use engine::{Engine, EngineBuilder, HintRenderer, StartOptions};
pub use error::{EngineError, StoreError};
pub use events::RunEvent;
pub use scoring::{compute_item_points, RunConfig};
pub use state::{EndReason, RunSnapshot, RunStatus, RunSummary};
