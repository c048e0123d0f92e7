pub mod rebase;
pub mod repository;
pub mod runner;

pub use rebase::{
    ConflictKind, RebaseConflict, RebaseOperation, RebaseOutcome, RebaseRequest,
};
pub use repository::{GitRepository, DEFAULT_SYNC_COMMAND};
pub use runner::{GitOutput, GitRunner};

use crate::errors::{Result, StackError};
use std::path::{Path, PathBuf};

/// Find the root of the Git repository
pub fn find_repository_root(start_path: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start_path)?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| StackError::config("Repository has no working directory (bare repo?)"))?;

    Ok(workdir.to_path_buf())
}

/// Get the current working directory as a Git repository
pub fn get_current_repository() -> Result<GitRepository> {
    let current_dir = std::env::current_dir()
        .map_err(|e| StackError::config(format!("Could not get current directory: {e}")))?;

    let repo_root = find_repository_root(&current_dir)?;
    GitRepository::open(&repo_root)
}

/// Owner and repository name from a remote URL.
///
/// Accepts `https://host/owner/repo(.git)`, `ssh://git@host/owner/repo.git`
/// and the scp-like `git@host:owner/repo.git`.
pub fn parse_remote_slug(remote_url: &str) -> Result<(String, String)> {
    let remote_url = remote_url.trim();
    let path = if remote_url.contains("://") {
        let parsed = url::Url::parse(remote_url)?;
        parsed.path().to_string()
    } else if let Some((_, path)) = remote_url.split_once(':') {
        path.to_string()
    } else {
        return Err(StackError::validation(format!(
            "Unrecognized remote URL '{remote_url}'"
        )));
    };

    let mut segments = path
        .trim_matches('/')
        .trim_end_matches(".git")
        .rsplitn(2, '/');
    match (segments.next(), segments.next()) {
        (Some(name), Some(owner)) if !name.is_empty() && !owner.is_empty() => {
            // Nested groups keep only their last component as owner
            let owner = owner.rsplit('/').next().unwrap_or(owner);
            Ok((owner.to_string(), name.to_string()))
        }
        _ => Err(StackError::validation(format!(
            "Remote URL '{remote_url}' does not name an owner and repository"
        ))),
    }
}
