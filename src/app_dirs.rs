use directories::ProjectDirs;
use std::path::PathBuf;

const APP: &str = "symtrain";

/// Where the trainer keeps its files. State (progress database, log) goes
/// under `~/.local/state/symtrain`; settings under the platform config dir.
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        match std::env::var("HOME") {
            Ok(home) => Some(PathBuf::from(home).join(".local").join("state").join(APP)),
            Err(_) => ProjectDirs::from("", "", APP).map(|pd| pd.data_local_dir().to_path_buf()),
        }
    }

    pub fn db_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("progress.db"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("symtrain.log"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP).map(|pd| pd.config_dir().join("settings.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_files_share_a_directory() {
        if let (Some(db), Some(log)) = (AppDirs::db_path(), AppDirs::log_path()) {
            assert_eq!(db.parent(), log.parent());
            assert!(db.ends_with("symtrain/progress.db"));
        }
    }
}
