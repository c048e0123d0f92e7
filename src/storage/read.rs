use super::model::{Branch, Repository, Stack, State};
use crate::errors::Result;
use crate::stack::graph::{self, HeritageEntry};
use std::sync::RwLockReadGuard;

/// Read operations shared by read and write transactions
pub trait GraphRead {
    fn state(&self) -> &State;

    fn repository(&self) -> &Repository {
        &self.state().repository
    }

    fn branch(&self, name: &str) -> Option<&Branch> {
        self.state().branches.get(name)
    }

    /// All tracked branches by creation time, then name
    fn all_branches(&self) -> Vec<&Branch> {
        let mut branches: Vec<&Branch> = self.state().branches.values().collect();
        branches.sort_by(|a, b| graph::by_creation(a, b));
        branches
    }

    fn stack(&self, name: &str) -> Option<&Stack> {
        self.state().stacks.get(name)
    }

    /// All stacks by creation time, then name
    fn all_stacks(&self) -> Vec<&Stack> {
        let mut stacks: Vec<&Stack> = self.state().stacks.values().collect();
        stacks.sort_by(|a, b| {
            a.created_date
                .cmp(&b.created_date)
                .then_with(|| a.name.cmp(&b.name))
        });
        stacks
    }

    fn current_stack(&self) -> Option<&Stack> {
        self.repository()
            .current_stack
            .as_deref()
            .and_then(|name| self.stack(name))
    }

    /// The first stack, in listing order, that has `branch` as a member
    fn find_stack_by_branch(&self, branch: &str) -> Option<&Stack> {
        self.all_stacks().into_iter().find(|s| s.contains(branch))
    }

    fn children(&self, name: &str) -> Vec<&Branch> {
        graph::children(self.state(), name)
    }

    fn ordered_stack_branches(&self, stack: &str) -> Result<Vec<&Branch>> {
        graph::ordered_stack_branches(self.state(), stack)
    }

    fn heritage(&self, branch: &str) -> Result<Vec<HeritageEntry<'_>>> {
        graph::heritage(self.state(), branch)
    }
}

/// A consistent, shared view of the graph for the life of the guard
pub struct ReadTx<'a> {
    guard: RwLockReadGuard<'a, State>,
}

impl<'a> ReadTx<'a> {
    pub(super) fn new(guard: RwLockReadGuard<'a, State>) -> Self {
        Self { guard }
    }
}

impl GraphRead for ReadTx<'_> {
    fn state(&self) -> &State {
        &self.guard
    }
}
