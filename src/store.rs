use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Local};
use rusqlite::{params, Connection};

use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::progress::{Progress, RunRecord};

/// Where cross-run progress and run history live. The engine treats every
/// call as best effort.
pub trait ProgressStore {
    fn load_progress(&self, user_id: &str) -> Result<Option<Progress>, StoreError>;
    fn save_progress(&mut self, user_id: &str, progress: &Progress) -> Result<(), StoreError>;
    fn append_run(&mut self, record: &RunRecord) -> Result<(), StoreError>;
    /// Newest first.
    fn run_history(&self, user_id: &str) -> Result<Vec<RunRecord>, StoreError>;
    fn reset(&mut self, user_id: &str) -> Result<(), StoreError>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS progress (
    user_id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS run_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    level_id TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    total_score INTEGER NOT NULL,
    accuracy REAL NOT NULL,
    median_item_secs REAL NOT NULL,
    gate_passed BOOLEAN NOT NULL,
    summary TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_run_history_user ON run_history(user_id, finished_at);
"#;

/// SQLite backed store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open the store at the default state path, falling back to the
    /// working directory when no home is known.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("symtrain.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl ProgressStore for SqliteStore {
    fn load_progress(&self, user_id: &str) -> Result<Option<Progress>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT data FROM progress WHERE user_id = ?1")?;
        let mut rows = stmt.query([user_id])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    fn save_progress(&mut self, user_id: &str, progress: &Progress) -> Result<(), StoreError> {
        let data = serde_json::to_string(progress)?;
        self.conn.execute(
            r#"
            INSERT INTO progress (user_id, data, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE
            SET data = excluded.data, updated_at = excluded.updated_at
            "#,
            params![user_id, data, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn append_run(&mut self, record: &RunRecord) -> Result<(), StoreError> {
        let summary = serde_json::to_string(&record.summary)?;
        self.conn.execute(
            r#"
            INSERT INTO run_history
            (user_id, level_id, finished_at, total_score,
             accuracy, median_item_secs, gate_passed, summary)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.user_id,
                record.summary.level_id,
                record.finished_at.to_rfc3339(),
                record.summary.total_score,
                record.summary.accuracy,
                record.summary.median_item_secs,
                record.gate_passed,
                summary,
            ],
        )?;
        Ok(())
    }

    fn run_history(&self, user_id: &str) -> Result<Vec<RunRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, finished_at, gate_passed, summary
            FROM run_history
            WHERE user_id = ?1
            ORDER BY id DESC
            "#,
        )?;

        let rows = stmt.query_map([user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (user_id, finished_at, gate_passed, summary) = row?;
            let finished_at = DateTime::parse_from_rfc3339(&finished_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        1,
                        "finished_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            history.push(RunRecord {
                user_id,
                finished_at,
                gate_passed,
                summary: serde_json::from_str(&summary)?,
            });
        }
        Ok(history)
    }

    fn reset(&mut self, user_id: &str) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM progress WHERE user_id = ?1", [user_id])?;
        tx.execute("DELETE FROM run_history WHERE user_id = ?1", [user_id])?;
        tx.commit()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryData {
    progress: HashMap<String, Progress>,
    history: Vec<RunRecord>,
    failing: bool,
}

/// In-process store. Clones share the same data, so a caller can keep a
/// handle for inspection after giving one to the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Rc<RefCell<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every call fails with an I/O error.
    pub fn failing() -> Self {
        let store = Self::default();
        store.data.borrow_mut().failing = true;
        store
    }

    pub fn with_progress(user_id: &str, progress: Progress) -> Self {
        let store = Self::default();
        store
            .data
            .borrow_mut()
            .progress
            .insert(user_id.to_string(), progress);
        store
    }

    pub fn progress(&self, user_id: &str) -> Option<Progress> {
        self.data.borrow().progress.get(user_id).cloned()
    }

    pub fn history_len(&self) -> usize {
        self.data.borrow().history.len()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.data.borrow().failing {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store unavailable",
            )));
        }
        Ok(())
    }
}

impl ProgressStore for MemoryStore {
    fn load_progress(&self, user_id: &str) -> Result<Option<Progress>, StoreError> {
        self.check()?;
        Ok(self.progress(user_id))
    }

    fn save_progress(&mut self, user_id: &str, progress: &Progress) -> Result<(), StoreError> {
        self.check()?;
        self.data
            .borrow_mut()
            .progress
            .insert(user_id.to_string(), progress.clone());
        Ok(())
    }

    fn append_run(&mut self, record: &RunRecord) -> Result<(), StoreError> {
        self.check()?;
        self.data.borrow_mut().history.push(record.clone());
        Ok(())
    }

    fn run_history(&self, user_id: &str) -> Result<Vec<RunRecord>, StoreError> {
        self.check()?;
        Ok(self
            .data
            .borrow()
            .history
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn reset(&mut self, user_id: &str) -> Result<(), StoreError> {
        self.check()?;
        let mut data = self.data.borrow_mut();
        data.progress.remove(user_id);
        data.history.retain(|r| r.user_id != user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::state::{EndReason, RunSummary};

    fn record(user: &str, level: &str, score: u32) -> RunRecord {
        RunRecord {
            user_id: user.into(),
            finished_at: Local::now(),
            gate_passed: score > 50,
            summary: RunSummary {
                level_id: level.into(),
                total_score: score,
                attempted: 4,
                correct: 3,
                accuracy: 0.75,
                median_item_secs: 2.5,
                longest_streak: 2,
                reason: EndReason::Completed,
            },
        }
    }

    #[test]
    fn sqlite_progress_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.load_progress("ada").unwrap(), None);

        let mut progress = Progress::default();
        progress.unlock("basics");
        progress.record_results(&[crate::state::ItemResult {
            item_id: "p2-01".into(),
            truth: Category::P2,
            wrongs: 1,
            hints_used: 2,
            item_time_ms: 100,
            effective_time_ms: 100,
            points: 0,
            assisted: false,
            picked: Some(Category::P1),
        }]);
        store.save_progress("ada", &progress).unwrap();
        assert_eq!(store.load_progress("ada").unwrap(), Some(progress.clone()));

        progress.unlock("reflections");
        store.save_progress("ada", &progress).unwrap();
        assert_eq!(store.load_progress("ada").unwrap(), Some(progress));
    }

    #[test]
    fn sqlite_history_is_newest_first_and_per_user() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.append_run(&record("ada", "basics", 10)).unwrap();
        store.append_run(&record("ada", "basics", 90)).unwrap();
        store.append_run(&record("bob", "square", 40)).unwrap();

        let history = store.run_history("ada").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].summary.total_score, 90);
        assert!(history[0].gate_passed);
        assert_eq!(history[1].summary.total_score, 10);
    }

    #[test]
    fn sqlite_reset_clears_user() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.append_run(&record("ada", "basics", 10)).unwrap();
        store.append_run(&record("bob", "basics", 10)).unwrap();
        store.save_progress("ada", &Progress::default()).unwrap();
        store.reset("ada").unwrap();
        assert!(store.run_history("ada").unwrap().is_empty());
        assert_eq!(store.load_progress("ada").unwrap(), None);
        assert_eq!(store.run_history("bob").unwrap().len(), 1);
    }

    #[test]
    fn memory_store_clones_share_data() {
        let store = MemoryStore::new();
        let mut handle = store.clone();
        handle.append_run(&record("ada", "basics", 1)).unwrap();
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn failing_memory_store_errors() {
        let mut store = MemoryStore::failing();
        assert!(store.load_progress("ada").is_err());
        assert!(store.save_progress("ada", &Progress::default()).is_err());
    }
}
