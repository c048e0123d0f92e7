//! Re-linearizing a stack after its parents moved.
//!
//! The walk visits members in dependency order and rebases each branch whose
//! parent head differs from the one recorded. A conflict halts the walk with
//! git left mid-rebase; progress is persisted so `continue`, `skip` and
//! `abort` can pick it up from a later process.

use super::sync_state::RestackState;
use crate::errors::{Result, StackError};
use crate::git::rebase::{ConflictKind, RebaseOperation, RebaseOutcome, RebaseRequest};
use crate::storage::{Branch, Database, GraphRead};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The git operations a restack needs
pub trait RestackGit {
    fn current_branch(&self) -> Result<String>;
    /// Commit hash a local branch points at
    fn branch_head(&self, branch: &str) -> Result<String>;
    fn checkout(&self, branch: &str) -> Result<()>;
    fn rebase(&self, request: &RebaseRequest) -> Result<RebaseOutcome>;
}

/// Why and where a restack stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestackConflict {
    pub stack: String,
    pub branch: String,
    pub hint: String,
    pub headline: Option<String>,
    pub kind: ConflictKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestackSummary {
    pub stack: String,
    /// Branches rebased onto a new parent head, in walk order
    pub restacked: Vec<String>,
    /// Branches whose parent had not moved
    pub unchanged: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestackReport {
    Completed(RestackSummary),
    Halted(RestackConflict),
}

enum Step {
    Unchanged,
    Restacked,
    Halted {
        conflict: RestackConflict,
        target_parent_head: String,
    },
}

/// Drives restacks of one repository
pub struct RestackManager<'a, G: RestackGit> {
    db: &'a Database,
    git: &'a G,
    progress_path: PathBuf,
}

impl<'a, G: RestackGit> RestackManager<'a, G> {
    /// `progress_path` is where a halted restack is recorded
    pub fn new(db: &'a Database, git: &'a G, progress_path: &Path) -> Self {
        Self {
            db,
            git,
            progress_path: progress_path.to_path_buf(),
        }
    }

    /// The halted restack, if any
    pub fn in_progress(&self) -> Result<Option<RestackState>> {
        if RestackState::exists(&self.progress_path) {
            RestackState::load(&self.progress_path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Restack every member of `stack_name` whose parent moved
    pub fn restack(&self, stack_name: &str) -> Result<RestackReport> {
        if let Some(state) = self.in_progress()? {
            return Err(StackError::RestackInProgress(state.stack_name));
        }

        let original_branch = self.git.current_branch()?;
        info!("Restacking stack '{}'", stack_name);
        let summary = RestackSummary {
            stack: stack_name.to_string(),
            ..RestackSummary::default()
        };
        self.walk(stack_name, &original_branch, summary)
    }

    /// Resume after the user resolved the conflict and staged the result
    pub fn continue_restack(&self) -> Result<RestackReport> {
        self.resolve(RebaseOperation::Continue)
    }

    /// Drop the conflicting commit and resume
    pub fn skip_restack(&self) -> Result<RestackReport> {
        self.resolve(RebaseOperation::Skip)
    }

    /// Abandon the halted rebase. The halted branch keeps its old recorded
    /// parent head, so the next restack tries it again.
    pub fn abort_restack(&self) -> Result<RestackState> {
        let state = RestackState::load(&self.progress_path)?;

        match self
            .git
            .rebase(&RebaseRequest::resolution(RebaseOperation::Abort))?
        {
            RebaseOutcome::Aborted | RebaseOutcome::Updated | RebaseOutcome::AlreadyUpToDate => {
                RestackState::delete(&self.progress_path)?;
                self.return_to(&state.original_branch)?;
                info!(
                    "Aborted restack of '{}' at '{}'",
                    state.stack_name, state.halted_branch
                );
                Ok(state)
            }
            RebaseOutcome::NotInProgress => {
                RestackState::delete(&self.progress_path)?;
                Err(StackError::NoRebaseInProgress(state.halted_branch))
            }
            RebaseOutcome::Conflict(conflict) => Err(StackError::rebase(format!(
                "git could not abort the rebase of '{}': {}",
                state.halted_branch,
                conflict.hint.trim()
            ))),
        }
    }

    fn resolve(&self, operation: RebaseOperation) -> Result<RestackReport> {
        let state = RestackState::load(&self.progress_path)?;
        debug!(
            "Resolving halted restack of '{}' with {:?}",
            state.halted_branch, operation
        );

        match self.git.rebase(&RebaseRequest::resolution(operation))? {
            RebaseOutcome::Updated | RebaseOutcome::AlreadyUpToDate | RebaseOutcome::Aborted => {
                self.record_parent_head(&state.halted_branch, &state.target_parent_head)?;
                RestackState::delete(&self.progress_path)?;
                info!("Restacked '{}' after resolution", state.halted_branch);

                let mut restacked = state.restacked;
                restacked.push(state.halted_branch);
                let summary = RestackSummary {
                    stack: state.stack_name.clone(),
                    restacked,
                    unchanged: Vec::new(),
                };
                self.walk(&state.stack_name, &state.original_branch, summary)
            }
            RebaseOutcome::Conflict(conflict) => {
                warn!("Rebase of '{}' is still conflicted", state.halted_branch);
                Ok(RestackReport::Halted(RestackConflict {
                    stack: state.stack_name,
                    branch: state.halted_branch,
                    hint: conflict.hint,
                    headline: conflict.headline,
                    kind: conflict.kind,
                }))
            }
            RebaseOutcome::NotInProgress => {
                RestackState::delete(&self.progress_path)?;
                Err(StackError::NoRebaseInProgress(state.halted_branch))
            }
        }
    }

    fn walk(
        &self,
        stack_name: &str,
        original_branch: &str,
        mut summary: RestackSummary,
    ) -> Result<RestackReport> {
        // Owned copies: the read lock must not outlive this block
        let plan: Vec<Branch> = {
            let tx = self.db.begin_read();
            tx.ordered_stack_branches(stack_name)?
                .into_iter()
                .cloned()
                .collect()
        };

        for branch in &plan {
            match self.step(stack_name, branch)? {
                Step::Unchanged => {
                    if !summary.restacked.contains(&branch.name) {
                        summary.unchanged.push(branch.name.clone());
                    }
                }
                Step::Restacked => summary.restacked.push(branch.name.clone()),
                Step::Halted {
                    conflict,
                    target_parent_head,
                } => {
                    RestackState {
                        stack_name: stack_name.to_string(),
                        original_branch: original_branch.to_string(),
                        halted_branch: branch.name.clone(),
                        target_parent_head,
                        restacked: summary.restacked,
                        started_at: Utc::now(),
                    }
                    .save(&self.progress_path)?;
                    warn!(
                        "Restack of '{}' halted on '{}'",
                        stack_name, conflict.branch
                    );
                    return Ok(RestackReport::Halted(conflict));
                }
            }
        }

        self.return_to(original_branch)?;
        info!(
            "Restack of '{}' complete: {} restacked, {} unchanged",
            stack_name,
            summary.restacked.len(),
            summary.unchanged.len()
        );
        Ok(RestackReport::Completed(summary))
    }

    fn step(&self, stack_name: &str, branch: &Branch) -> Result<Step> {
        let parent_head = self.git.branch_head(branch.parent.name())?;
        let recorded = branch.parent.head();

        if recorded == Some(parent_head.as_str()) {
            debug!(
                "'{}' is already on '{}' at {}",
                branch.name,
                branch.parent.name(),
                parent_head
            );
            return Ok(Step::Unchanged);
        }

        let request = match recorded {
            Some(old_head) => RebaseRequest::normal(old_head)
                .onto(parent_head.as_str())
                .branch(branch.name.as_str()),
            None => RebaseRequest::normal(parent_head.as_str()).branch(branch.name.as_str()),
        };
        info!(
            "Rebasing '{}' onto '{}' ({})",
            branch.name,
            branch.parent.name(),
            parent_head
        );

        match self.git.rebase(&request)? {
            RebaseOutcome::Updated | RebaseOutcome::AlreadyUpToDate => {
                self.record_parent_head(&branch.name, &parent_head)?;
                Ok(Step::Restacked)
            }
            RebaseOutcome::Conflict(conflict) => Ok(Step::Halted {
                conflict: RestackConflict {
                    stack: stack_name.to_string(),
                    branch: branch.name.clone(),
                    hint: conflict.hint,
                    headline: conflict.headline,
                    kind: conflict.kind,
                },
                target_parent_head: parent_head,
            }),
            outcome => Err(StackError::rebase(format!(
                "unexpected outcome {outcome:?} while rebasing '{}'",
                branch.name
            ))),
        }
    }

    fn record_parent_head(&self, branch: &str, head: &str) -> Result<()> {
        let mut tx = self.db.begin_write();
        tx.set_parent_head(branch, head)?;
        tx.commit()?;
        debug!("Recorded parent head {} for '{}'", head, branch);
        Ok(())
    }

    fn return_to(&self, branch: &str) -> Result<()> {
        if self.git.current_branch().ok().as_deref() != Some(branch) {
            self.git.checkout(branch)?;
        }
        Ok(())
    }
}
