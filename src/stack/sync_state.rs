use crate::errors::{Result, StackError};
use crate::utils::atomic_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Progress of a restack halted on a conflict
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RestackState {
    /// Name of the stack being restacked
    pub stack_name: String,
    /// Branch the user was on before the restack started
    pub original_branch: String,
    /// Branch whose rebase is awaiting resolution
    pub halted_branch: String,
    /// Parent head the halted branch is being moved onto
    pub target_parent_head: String,
    /// Branches already restacked in this run
    #[serde(default)]
    pub restacked: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl RestackState {
    /// Save restack state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_file::write_json(path, self)?;
        tracing::debug!("Saved restack state to {:?}", path);
        Ok(())
    }

    /// Load restack state from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StackError::NoRestackInProgress);
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| StackError::config(format!("Failed to read restack state: {e}")))?;

        let state: Self = serde_json::from_str(&json)
            .map_err(|e| StackError::corruption(format!("Failed to parse restack state: {e}")))?;

        tracing::debug!("Loaded restack state from {:?}", path);
        Ok(state)
    }

    /// Delete restack state file
    pub fn delete(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)
                .map_err(|e| StackError::config(format!("Failed to delete restack state: {e}")))?;
            tracing::debug!("Deleted restack state file");
        }

        Ok(())
    }

    /// Check if restack state exists
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_load_delete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gstack").join("RESTACK_STATE");
        let state = RestackState {
            stack_name: "payments".to_string(),
            original_branch: "feat-b".to_string(),
            halted_branch: "feat-a".to_string(),
            target_parent_head: "abc123".to_string(),
            restacked: vec![],
            started_at: Utc::now(),
        };

        assert!(!RestackState::exists(&path));
        state.save(&path).unwrap();
        assert!(RestackState::exists(&path));
        assert_eq!(RestackState::load(&path).unwrap(), state);

        RestackState::delete(&path).unwrap();
        assert!(!RestackState::exists(&path));
        assert!(matches!(
            RestackState::load(&path),
            Err(StackError::NoRestackInProgress)
        ));
    }
}
