use super::model::{Branch, ParentRef, Repository, Stack, State};
use super::read::GraphRead;
use super::Database;
use crate::errors::{Result, StackError};
use crate::stack::graph;
use std::collections::HashSet;
use std::sync::RwLockWriteGuard;
use tracing::{debug, warn};

/// The single writer.
///
/// Holds the exclusive lock plus a snapshot of the graph taken at
/// acquisition. Every exit path other than a successful [`WriteTx::commit`]
/// restores the snapshot before the lock is released.
pub struct WriteTx<'a> {
    db: &'a Database,
    guard: RwLockWriteGuard<'a, State>,
    snapshot: State,
    finished: bool,
}

impl<'a> WriteTx<'a> {
    pub(super) fn new(db: &'a Database, guard: RwLockWriteGuard<'a, State>) -> Self {
        let snapshot = guard.clone();
        Self {
            db,
            guard,
            snapshot,
            finished: false,
        }
    }

    /// Validate, persist and release.
    ///
    /// On failure the in-memory graph is rolled back before the lock drops.
    pub fn commit(mut self) -> Result<()> {
        let result = check_invariants(&self.guard).and_then(|_| self.db.persist(&self.guard));
        match &result {
            Ok(()) => debug!("Write transaction committed"),
            Err(e) => {
                warn!("Write transaction failed to commit, rolling back: {}", e);
                self.rollback();
            }
        }
        self.finished = true;
        result
    }

    /// Discard all changes and release
    pub fn abort(mut self) {
        self.rollback();
        self.finished = true;
        debug!("Write transaction aborted");
    }

    fn rollback(&mut self) {
        *self.guard = std::mem::take(&mut self.snapshot);
    }

    pub fn set_repository(&mut self, repository: Repository) {
        self.guard.repository = repository;
    }

    /// Insert or replace a branch by name
    pub fn upsert_branch(&mut self, branch: Branch) -> Result<()> {
        if branch.parent.name() == branch.name {
            return Err(StackError::validation(format!(
                "Branch '{}' cannot be its own parent",
                branch.name
            )));
        }
        self.guard.branches.insert(branch.name.clone(), branch);
        Ok(())
    }

    pub fn branch_mut(&mut self, name: &str) -> Result<&mut Branch> {
        self.guard
            .branches
            .get_mut(name)
            .ok_or_else(|| StackError::BranchNotFound(name.to_string()))
    }

    pub fn delete_branch(&mut self, name: &str) -> Option<Branch> {
        self.guard.branches.remove(name)
    }

    /// Record the parent head a branch is now built on
    pub fn set_parent_head(&mut self, branch: &str, head: &str) -> Result<()> {
        self.branch_mut(branch)?.parent.set_head(head);
        Ok(())
    }

    /// Delete a branch, attaching its children to its own parent.
    ///
    /// Children keep their recorded head: it is still the tip their commits
    /// were built on, so the next restack replays only their own commits.
    /// A trunk-parented branch with several children is refused, since a
    /// stack has a single root on its base.
    pub fn retire_branch(&mut self, name: &str) -> Result<Branch> {
        let retired = self
            .guard
            .branches
            .get(name)
            .ok_or_else(|| StackError::BranchNotFound(name.to_string()))?;
        if retired.parent.is_trunk() {
            let children = graph::children(&self.guard, name);
            if children.len() > 1 {
                let names: Vec<&str> = children.iter().map(|b| b.name.as_str()).collect();
                return Err(StackError::validation(format!(
                    "Cannot retire '{}': its children ({}) would all sit on '{}'",
                    name,
                    names.join(", "),
                    retired.parent.name()
                )));
            }
        }
        let retired = self
            .guard
            .branches
            .remove(name)
            .ok_or_else(|| StackError::BranchNotFound(name.to_string()))?;

        for child in self.guard.branches.values_mut() {
            if let ParentRef::Branch {
                name: parent_name,
                head,
            } = &child.parent
            {
                if parent_name == name {
                    let head = head.clone();
                    child.parent = match &retired.parent {
                        ParentRef::Trunk { name, .. } => ParentRef::trunk(name.clone(), head),
                        ParentRef::Branch { name, .. } => ParentRef::branch(name.clone(), head),
                    };
                    debug!(
                        "Re-parented '{}' onto '{}'",
                        child.name,
                        child.parent.name()
                    );
                }
            }
        }

        for stack in self.guard.stacks.values_mut() {
            stack.branches.remove(name);
        }

        Ok(retired)
    }

    /// Insert or replace a stack by name
    pub fn upsert_stack(&mut self, stack: Stack) {
        self.guard.stacks.insert(stack.name.clone(), stack);
    }

    pub fn create_stack(&mut self, name: &str, creator: &str, base_branch: &str) -> Result<Stack> {
        if name.trim().is_empty() {
            return Err(StackError::validation("Stack name cannot be empty"));
        }
        if self.guard.stacks.contains_key(name) {
            return Err(StackError::StackExists(name.to_string()));
        }
        let stack = Stack::new(name, creator, base_branch);
        self.guard.stacks.insert(name.to_string(), stack.clone());
        Ok(stack)
    }

    /// Remove a stack, clearing the current-stack pointer if it named it
    pub fn delete_stack(&mut self, name: &str) -> Option<Stack> {
        let removed = self.guard.stacks.remove(name);
        if removed.is_some() && self.guard.repository.current_stack.as_deref() == Some(name) {
            self.guard.repository.current_stack = None;
        }
        removed
    }

    pub fn set_current_stack(&mut self, name: Option<&str>) -> Result<()> {
        if let Some(name) = name {
            if !self.guard.stacks.contains_key(name) {
                return Err(StackError::StackNotFound(name.to_string()));
            }
        }
        self.guard.repository.current_stack = name.map(str::to_string);
        Ok(())
    }

    pub fn add_branch_to_stack(&mut self, stack: &str, branch: &str) -> Result<()> {
        let entry = self
            .guard
            .stacks
            .get_mut(stack)
            .ok_or_else(|| StackError::StackNotFound(stack.to_string()))?;
        if !entry.branches.insert(branch.to_string()) {
            return Err(StackError::AlreadyMember {
                stack: stack.to_string(),
                branch: branch.to_string(),
            });
        }
        Ok(())
    }

    pub fn remove_branch_from_stack(&mut self, stack: &str, branch: &str) -> Result<()> {
        let entry = self
            .guard
            .stacks
            .get_mut(stack)
            .ok_or_else(|| StackError::StackNotFound(stack.to_string()))?;
        if !entry.branches.remove(branch) {
            return Err(StackError::NotMember {
                stack: stack.to_string(),
                branch: branch.to_string(),
            });
        }
        Ok(())
    }
}

impl GraphRead for WriteTx<'_> {
    fn state(&self) -> &State {
        &self.guard
    }
}

impl Drop for WriteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Write transaction dropped without commit or abort, rolling back");
            self.rollback();
        }
    }
}

/// Parent chains must end at a trunk marker, the current stack must exist and
/// every stack must order
fn check_invariants(state: &State) -> Result<()> {
    if let Some(current) = &state.repository.current_stack {
        if !state.stacks.contains_key(current) {
            return Err(StackError::corruption(format!(
                "current stack '{current}' does not exist"
            )));
        }
    }

    let mut rooted: HashSet<&str> = HashSet::new();
    for start in state.branches.values() {
        let mut chain: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = start;
        loop {
            if rooted.contains(current.name.as_str()) {
                break;
            }
            if !seen.insert(current.name.as_str()) {
                return Err(StackError::corruption(format!(
                    "branch '{}' is its own ancestor",
                    current.name
                )));
            }
            chain.push(&current.name);
            match &current.parent {
                ParentRef::Trunk { .. } => break,
                ParentRef::Branch { name, .. } => {
                    current = state.branches.get(name).ok_or_else(|| {
                        StackError::corruption(format!(
                            "parent '{}' of branch '{}' is not tracked",
                            name, current.name
                        ))
                    })?;
                }
            }
        }
        rooted.extend(chain);
    }

    for name in state.stacks.keys() {
        graph::ordered_stack_branches(state, name)?;
    }

    Ok(())
}
