pub mod config;
pub mod init;
pub mod stack;

use crate::config::{is_repo_initialized, load_settings, restack_state_file, state_file, Settings};
use crate::errors::{Result, StackError};
use crate::git::{get_current_repository, GitRepository};
use crate::storage::Database;
use std::path::PathBuf;

/// Everything a command needs about the repository it runs in
pub(crate) struct RepoContext {
    pub repo: GitRepository,
    pub settings: Settings,
    pub db: Database,
}

impl RepoContext {
    /// Open the current repository, requiring `gstack init` to have run
    pub fn open() -> Result<Self> {
        let repo = get_current_repository()?;
        let git_dir = repo.git_dir().to_path_buf();
        if !is_repo_initialized(&git_dir) {
            return Err(StackError::config(
                "Repository is not initialized for gstack. Run 'gstack init' first.",
            ));
        }

        let settings = load_settings(&git_dir)?;
        let repo = repo
            .with_sync_command(settings.sync.command_name.clone())
            .with_remote(settings.git.remote.clone());
        let (db, _) = Database::open(&state_file(&git_dir))?;
        Ok(Self { repo, settings, db })
    }

    pub fn progress_path(&self) -> PathBuf {
        restack_state_file(self.repo.git_dir())
    }
}
