use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::scoring::RunConfig;

/// Engine feature switches, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Run clock counts down and hints cost run time.
    pub timer: bool,
    pub streaks: bool,
    /// When off, every run passes its gate.
    pub gating: bool,
    pub hints: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            timer: true,
            streaks: true,
            gating: true,
            hints: true,
        }
    }
}

/// Partial [`RunConfig`]; unset fields keep their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfigOverrides {
    pub tau_secs: Option<f64>,
    pub base_points: Option<u32>,
    pub wrong_tap_penalty: Option<u32>,
    pub max_wrongs_per_item: Option<u32>,
    pub hint_time_penalty_secs: Option<f64>,
    pub hint_run_deduct_secs: Option<f64>,
    pub streak_start: Option<u32>,
    pub streak_bonus_per_item: Option<u32>,
}

impl RunConfigOverrides {
    pub fn apply(&self, base: RunConfig) -> RunConfig {
        RunConfig {
            tau_secs: self.tau_secs.unwrap_or(base.tau_secs),
            base_points: self.base_points.unwrap_or(base.base_points),
            wrong_tap_penalty: self.wrong_tap_penalty.unwrap_or(base.wrong_tap_penalty),
            max_wrongs_per_item: self.max_wrongs_per_item.unwrap_or(base.max_wrongs_per_item),
            hint_time_penalty_secs: self
                .hint_time_penalty_secs
                .unwrap_or(base.hint_time_penalty_secs),
            hint_run_deduct_secs: self
                .hint_run_deduct_secs
                .unwrap_or(base.hint_run_deduct_secs),
            streak_start: self.streak_start.unwrap_or(base.streak_start),
            streak_bonus_per_item: self
                .streak_bonus_per_item
                .unwrap_or(base.streak_bonus_per_item),
        }
    }
}

/// Persisted user preferences for the terminal trainer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub user_id: String,
    pub last_level: Option<String>,
    pub seed: Option<u64>,
    pub features: Features,
    pub run_config: RunConfigOverrides,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            last_level: None,
            seed: None,
            features: Features::default(),
            run_config: RunConfigOverrides::default(),
        }
    }
}

pub trait SettingsStore {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new() -> Self {
        let path = AppDirs::settings_path()
            .unwrap_or_else(|| PathBuf::from("symtrain_settings.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileSettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Settings>(&bytes) {
                Ok(settings) => return settings,
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "ignoring unreadable settings"
                ),
            }
        }
        Settings::default()
    }

    fn save(&self, settings: &Settings) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("nope.json"));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn save_and_load_custom_settings() {
        let dir = tempdir().unwrap();
        let store = FileSettingsStore::with_path(dir.path().join("nested").join("settings.json"));
        let settings = Settings {
            user_id: "ada".into(),
            last_level: Some("square".into()),
            seed: Some(7),
            features: Features {
                timer: false,
                ..Features::default()
            },
            run_config: RunConfigOverrides {
                base_points: Some(200),
                ..RunConfigOverrides::default()
            },
        };
        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert_eq!(FileSettingsStore::with_path(&path).load(), Settings::default());
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, br#"{"user_id":"bob","run_config":{"tau_secs":4.0}}"#).unwrap();
        let settings = FileSettingsStore::with_path(&path).load();
        assert_eq!(settings.user_id, "bob");
        assert_eq!(settings.features, Features::default());
        assert_eq!(settings.run_config.apply(RunConfig::default()).tau_secs, 4.0);
    }

    #[test]
    fn overrides_only_touch_set_fields() {
        let overrides = RunConfigOverrides {
            max_wrongs_per_item: Some(5),
            hint_run_deduct_secs: Some(0.0),
            ..RunConfigOverrides::default()
        };
        let cfg = overrides.apply(RunConfig::default());
        assert_eq!(cfg.max_wrongs_per_item, 5);
        assert_eq!(cfg.hint_run_deduct_secs, 0.0);
        assert_eq!(cfg.base_points, RunConfig::default().base_points);
    }
}
