pub mod auth;
pub mod settings;

pub use auth::Credential;
pub use settings::{GitSettings, HostingConfig, Settings, SyncSettings};

use crate::errors::{Result, StackError};
use std::path::{Path, PathBuf};

/// Get the global configuration directory (~/.gstack/)
pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| StackError::config("Could not find home directory"))?;
    Ok(home_dir.join(".gstack"))
}

/// Per-repository directory inside the git dir, so it is never committed
pub fn state_dir(git_dir: &Path) -> PathBuf {
    git_dir.join("gstack")
}

pub fn state_file(git_dir: &Path) -> PathBuf {
    state_dir(git_dir).join("state.json")
}

/// Present only while a restack is halted on a conflict
pub fn restack_state_file(git_dir: &Path) -> PathBuf {
    state_dir(git_dir).join("RESTACK_STATE")
}

pub fn repo_config_file(git_dir: &Path) -> PathBuf {
    state_dir(git_dir).join("config.json")
}

/// Check if a repository has been initialized
pub fn is_repo_initialized(git_dir: &Path) -> bool {
    state_file(git_dir).exists()
}

/// Defaults, then the global file, then the repository file
pub fn load_settings(git_dir: &Path) -> Result<Settings> {
    let repo_file = repo_config_file(git_dir);
    let settings = match get_config_dir() {
        Ok(dir) => {
            let global_file = dir.join("config.json");
            Settings::load_layered(&[global_file.as_path(), repo_file.as_path()])?
        }
        Err(_) => Settings::load_from_file(&repo_file)?,
    };
    settings.validate()?;
    Ok(settings)
}
