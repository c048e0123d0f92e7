//! Durable storage of the branch graph.
//!
//! The whole graph lives in memory behind a single `RwLock` and is rewritten
//! to disk wholesale whenever a write transaction commits.

pub mod model;
mod read;
mod write;

pub use model::{Branch, ParentRef, PullRequestRecord, Repository, Stack, State};
pub use read::{GraphRead, ReadTx};
pub use write::WriteTx;

use crate::errors::{Result, StackError};
use crate::utils::atomic_file;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Handle to the persisted graph of one repository
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    state: RwLock<State>,
}

impl Database {
    /// Open the state file at `path`, creating its directory if needed.
    ///
    /// Returns the database and whether state already existed on disk.
    pub fn open(path: &Path) -> Result<(Self, bool)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StackError::config(format!("Failed to create state directory {parent:?}: {e}"))
            })?;
        }

        let (state, existed) = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let state: State = serde_json::from_str(&content).map_err(|e| {
                StackError::corruption(format!("Failed to parse state file {path:?}: {e}"))
            })?;
            debug!(
                "Loaded state from {:?}: {} branches, {} stacks",
                path,
                state.branches.len(),
                state.stacks.len()
            );
            (state, true)
        } else {
            debug!("No state at {:?}, starting empty", path);
            (State::default(), false)
        };

        Ok((
            Self {
                path: path.to_path_buf(),
                state: RwLock::new(state),
            },
            existed,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire a shared snapshot of the graph
    pub fn begin_read(&self) -> ReadTx<'_> {
        // A writer that panicked has already rolled back in its Drop
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        ReadTx::new(guard)
    }

    /// Acquire the exclusive writer, blocking until all other holders release
    pub fn begin_write(&self) -> WriteTx<'_> {
        let guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        WriteTx::new(self, guard)
    }

    fn persist(&self, state: &State) -> Result<()> {
        atomic_file::write_json(&self.path, state)?;
        debug!("Persisted state to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let (db, existed) = Database::open(&dir.path().join("gstack").join("state.json")).unwrap();
        assert!(!existed);
        (dir, db)
    }

    #[test]
    fn test_open_creates_directory() {
        let (dir, db) = open_temp();
        assert!(dir.path().join("gstack").is_dir());
        assert!(db.begin_read().all_branches().is_empty());
    }

    #[test]
    fn test_commit_persists_and_reopen_reports_existing() {
        let (dir, db) = open_temp();
        let mut tx = db.begin_write();
        tx.upsert_branch(Branch::new("feat-a", ParentRef::trunk("main", None)))
            .unwrap();
        tx.commit().unwrap();
        drop(db);

        let (db, existed) = Database::open(&dir.path().join("gstack").join("state.json")).unwrap();
        assert!(existed);
        assert!(db.begin_read().branch("feat-a").is_some());
    }

    #[test]
    fn test_unparseable_state_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Database::open(&path).unwrap_err();
        assert!(err.is_corruption());
    }
}
