//! Persisted entities of the branch graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The working copy this state belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
    /// Name of the active stack. Persisted as `""` when unset.
    #[serde(default, with = "empty_as_none")]
    pub current_stack: Option<String>,
}

/// Where a branch was cut from, plus the head of that parent as last observed.
///
/// The trunk form marks the root of a parent chain; no [`Branch`] backs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawParentRef", into = "RawParentRef")]
pub enum ParentRef {
    Trunk { name: String, head: Option<String> },
    Branch { name: String, head: Option<String> },
}

impl ParentRef {
    pub fn trunk<S: Into<String>>(name: S, head: Option<String>) -> Self {
        ParentRef::Trunk {
            name: name.into(),
            head,
        }
    }

    pub fn branch<S: Into<String>>(name: S, head: Option<String>) -> Self {
        ParentRef::Branch {
            name: name.into(),
            head,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ParentRef::Trunk { name, .. } | ParentRef::Branch { name, .. } => name,
        }
    }

    /// The recorded head, used to detect drift of the parent
    pub fn head(&self) -> Option<&str> {
        match self {
            ParentRef::Trunk { head, .. } | ParentRef::Branch { head, .. } => head.as_deref(),
        }
    }

    pub fn is_trunk(&self) -> bool {
        matches!(self, ParentRef::Trunk { .. })
    }

    pub fn set_head<S: Into<String>>(&mut self, new_head: S) {
        match self {
            ParentRef::Trunk { head, .. } | ParentRef::Branch { head, .. } => {
                *head = Some(new_head.into())
            }
        }
    }
}

/// On-disk shape of a [`ParentRef`]: `{ "name", "trunk", "head" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawParentRef {
    name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    trunk: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    head: Option<String>,
}

impl From<RawParentRef> for ParentRef {
    fn from(raw: RawParentRef) -> Self {
        let head = raw.head.filter(|h| !h.is_empty());
        if raw.trunk {
            ParentRef::Trunk {
                name: raw.name,
                head,
            }
        } else {
            ParentRef::Branch {
                name: raw.name,
                head,
            }
        }
    }
}

impl From<ParentRef> for RawParentRef {
    fn from(parent: ParentRef) -> Self {
        let trunk = parent.is_trunk();
        let (name, head) = match parent {
            ParentRef::Trunk { name, head } | ParentRef::Branch { name, head } => (name, head),
        };
        RawParentRef { name, trunk, head }
    }
}

/// Local mirror of a remote pull request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub id: String,
    pub number: u64,
    pub permalink: String,
    pub state: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
}

impl PullRequestRecord {
    pub fn is_merged(&self) -> bool {
        self.state == "merged"
    }
}

/// A tracked branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub created_date: DateTime<Utc>,
    pub parent: ParentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
}

impl Branch {
    pub fn new<S: Into<String>>(name: S, parent: ParentRef) -> Self {
        Self {
            name: name.into(),
            created_date: Utc::now(),
            parent,
            pull_request: None,
            merge_commit: None,
        }
    }
}

/// A named set of branches rooted at a base branch.
///
/// Member order is derived from each member's [`ParentRef`], never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    #[serde(default)]
    pub creator: String,
    pub created_date: DateTime<Utc>,
    pub base_branch: String,
    #[serde(default)]
    pub branches: BTreeSet<String>,
}

impl Stack {
    pub fn new<S: Into<String>>(name: S, creator: S, base_branch: S) -> Self {
        Self {
            name: name.into(),
            creator: creator.into(),
            created_date: Utc::now(),
            base_branch: base_branch.into(),
            branches: BTreeSet::new(),
        }
    }

    pub fn contains(&self, branch: &str) -> bool {
        self.branches.contains(branch)
    }
}

/// The whole persisted graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub repository: Repository,
    #[serde(default)]
    pub branches: BTreeMap<String, Branch>,
    #[serde(default)]
    pub stacks: BTreeMap<String, Stack>,
}

mod empty_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.filter(|s| !s.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_ref_wire_format() {
        let trunk = ParentRef::trunk("main", Some("abc123".to_string()));
        let json = serde_json::to_value(&trunk).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "main", "trunk": true, "head": "abc123"})
        );

        let parent: ParentRef =
            serde_json::from_value(serde_json::json!({"name": "feat-a", "head": ""})).unwrap();
        assert_eq!(parent, ParentRef::branch("feat-a", None));
        assert!(!parent.is_trunk());
    }

    #[test]
    fn test_empty_current_stack_is_none() {
        let repo: Repository = serde_json::from_value(serde_json::json!({
            "id": "1",
            "owner": "octo",
            "name": "widgets",
            "current_stack": ""
        }))
        .unwrap();
        assert_eq!(repo.current_stack, None);

        let json = serde_json::to_value(&repo).unwrap();
        assert_eq!(json["current_stack"], "");
    }

    #[test]
    fn test_set_head_keeps_form() {
        let mut parent = ParentRef::trunk("main", None);
        parent.set_head("def456");
        assert!(parent.is_trunk());
        assert_eq!(parent.head(), Some("def456"));
        assert_eq!(parent.name(), "main");
    }

    #[test]
    fn test_duplicate_members_collapse_on_load() {
        let stack: Stack = serde_json::from_value(serde_json::json!({
            "name": "s",
            "creator": "me",
            "created_date": "2024-01-01T00:00:00Z",
            "base_branch": "main",
            "branches": ["feat-a", "feat-a", "feat-b"]
        }))
        .unwrap();
        assert_eq!(stack.branches.len(), 2);
    }
}
