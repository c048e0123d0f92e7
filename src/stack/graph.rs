//! Lineage and ordering queries over the branch graph.
//!
//! Everything here is a pure function of [`State`]; callers reach these
//! through [`GraphRead`](crate::storage::GraphRead).

use crate::errors::{Result, StackError};
use crate::storage::{Branch, ParentRef, State};
use std::cmp::Ordering;
use std::collections::HashSet;

/// One step of a branch's ancestry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeritageEntry<'a> {
    Branch(&'a Branch),
    /// The trunk the chain is rooted at
    Trunk(&'a str),
}

impl HeritageEntry<'_> {
    pub fn name(&self) -> &str {
        match self {
            HeritageEntry::Branch(branch) => &branch.name,
            HeritageEntry::Trunk(name) => name,
        }
    }
}

/// Creation time, then name
pub fn by_creation(a: &Branch, b: &Branch) -> Ordering {
    a.created_date
        .cmp(&b.created_date)
        .then_with(|| a.name.cmp(&b.name))
}

/// Branches whose parent is `name`, oldest first
pub fn children<'a>(state: &'a State, name: &str) -> Vec<&'a Branch> {
    let mut found: Vec<&Branch> = state
        .branches
        .values()
        .filter(|b| b.parent.name() == name)
        .collect();
    found.sort_by(|a, b| by_creation(a, b));
    found
}

/// The branch itself, each ancestor, then the trunk it is rooted at
pub fn heritage<'a>(state: &'a State, branch: &str) -> Result<Vec<HeritageEntry<'a>>> {
    let mut current = state
        .branches
        .get(branch)
        .ok_or_else(|| StackError::BranchNotFound(branch.to_string()))?;

    let mut entries = vec![HeritageEntry::Branch(current)];
    let mut seen: HashSet<&str> = HashSet::from([current.name.as_str()]);

    loop {
        match &current.parent {
            ParentRef::Trunk { name, .. } => {
                entries.push(HeritageEntry::Trunk(name));
                return Ok(entries);
            }
            ParentRef::Branch { name, .. } => {
                let parent = state.branches.get(name).ok_or_else(|| {
                    StackError::corruption(format!(
                        "heritage of '{}' is broken: parent '{}' of '{}' is not tracked",
                        branch, name, current.name
                    ))
                })?;
                if !seen.insert(parent.name.as_str()) {
                    return Err(StackError::corruption(format!(
                        "heritage of '{}' contains a cycle at '{}'",
                        branch, parent.name
                    )));
                }
                entries.push(HeritageEntry::Branch(parent));
                current = parent;
            }
        }
    }
}

/// Members of a stack with every branch after its parent.
///
/// Roots (members whose parent is outside the stack) come first, those cut
/// from the base branch before others, then each root's descendants
/// depth-first in creation order. The result is validated rather than
/// trusted: a member that cannot be placed after its parent is an error.
pub fn ordered_stack_branches<'a>(state: &'a State, stack_name: &str) -> Result<Vec<&'a Branch>> {
    let stack = state
        .stacks
        .get(stack_name)
        .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))?;

    let mut members: Vec<&Branch> = Vec::with_capacity(stack.branches.len());
    for name in &stack.branches {
        if *name == stack.base_branch {
            continue;
        }
        let branch = state.branches.get(name).ok_or_else(|| {
            StackError::ordering(
                stack_name,
                name.as_str(),
                "branch is a stack member but is not tracked",
            )
        })?;
        members.push(branch);
    }
    members.sort_by(|a, b| by_creation(a, b));

    let member_names: HashSet<&str> = members.iter().map(|b| b.name.as_str()).collect();
    let in_stack_parent = |branch: &Branch| match &branch.parent {
        ParentRef::Branch { name, .. } => member_names.contains(name.as_str()),
        ParentRef::Trunk { .. } => false,
    };

    let mut roots: Vec<&Branch> = members
        .iter()
        .copied()
        .filter(|b| !in_stack_parent(b))
        .collect();
    roots.sort_by(|a, b| {
        let a_on_base = a.parent.name() == stack.base_branch;
        let b_on_base = b.parent.name() == stack.base_branch;
        b_on_base.cmp(&a_on_base).then_with(|| by_creation(a, b))
    });

    let mut ordered: Vec<&Branch> = Vec::with_capacity(members.len());
    let mut placed: HashSet<&str> = HashSet::new();
    for root in roots {
        let mut pending = vec![root];
        while let Some(branch) = pending.pop() {
            if !placed.insert(branch.name.as_str()) {
                continue;
            }
            ordered.push(branch);
            // Reverse so the oldest child is visited first
            for child in members.iter().rev() {
                if !child.parent.is_trunk()
                    && child.parent.name() == branch.name
                    && !placed.contains(child.name.as_str())
                {
                    pending.push(child);
                }
            }
        }
    }

    // Members caught in a cycle are unreachable from any root
    for member in &members {
        if placed.insert(member.name.as_str()) {
            ordered.push(member);
        }
    }

    validate_order(stack_name, &ordered, &member_names)?;
    Ok(ordered)
}

fn validate_order(stack: &str, ordered: &[&Branch], members: &HashSet<&str>) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for (position, branch) in ordered.iter().enumerate() {
        match &branch.parent {
            ParentRef::Trunk { name, .. } => {
                if position != 0 {
                    return Err(StackError::ordering(
                        stack.to_string(),
                        branch.name.clone(),
                        format!("only the first branch may be parented at trunk '{name}'"),
                    ));
                }
            }
            ParentRef::Branch { name, .. } => {
                if !members.contains(name.as_str()) {
                    return Err(StackError::ordering(
                        stack.to_string(),
                        branch.name.clone(),
                        format!("parent '{name}' is not a member of the stack"),
                    ));
                }
                if !seen.contains(name.as_str()) {
                    return Err(StackError::ordering(
                        stack.to_string(),
                        branch.name.clone(),
                        format!("parent '{name}' does not appear before it"),
                    ));
                }
            }
        }
        seen.insert(branch.name.as_str());
    }
    Ok(())
}
