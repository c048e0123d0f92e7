use crate::config::Settings;
use crate::errors::{Result, StackError};
use crate::git::{parse_remote_slug, GitRepository};
use crate::storage::{Branch, Database, GraphRead, ParentRef, Repository, Stack};
use tracing::{info, warn};

/// Registration operations tying git branches to the graph
pub struct StackService<'a> {
    db: &'a Database,
    git: &'a GitRepository,
    settings: &'a Settings,
}

impl<'a> StackService<'a> {
    pub fn new(db: &'a Database, git: &'a GitRepository, settings: &'a Settings) -> Self {
        Self { db, git, settings }
    }

    /// Record the repository identity from the configured remote
    pub fn init(&self) -> Result<Repository> {
        let remote = &self.settings.git.remote;
        let (owner, name) = match self
            .git
            .get_remote_url(remote)
            .and_then(|url| parse_remote_slug(&url))
        {
            Ok(slug) => slug,
            Err(e) => {
                warn!("Could not read repository identity from '{}': {}", remote, e);
                (String::new(), String::new())
            }
        };

        let mut tx = self.db.begin_write();
        let repository = Repository {
            id: if owner.is_empty() {
                String::new()
            } else {
                format!("{owner}/{name}")
            },
            owner,
            name,
            current_stack: tx.repository().current_stack.clone(),
        };
        tx.set_repository(repository.clone());
        tx.commit()?;

        info!("Initialized gstack in {}", self.git.path().display());
        Ok(repository)
    }

    /// Create a stack rooted at `base` (the trunk by default) and make it current
    pub fn create_stack(&self, name: &str, base: Option<&str>) -> Result<Stack> {
        let base = base.unwrap_or(&self.settings.git.trunk_branch);
        if !self.git.branch_exists(base) {
            return Err(StackError::validation(format!(
                "Base branch '{base}' does not exist"
            )));
        }
        let creator = self
            .git
            .runner()
            .git(&["config", "user.name"])
            .unwrap_or_default();

        let mut tx = self.db.begin_write();
        let stack = tx.create_stack(name, &creator, base)?;
        tx.set_current_stack(Some(name))?;
        tx.commit()?;

        info!("Created stack '{}' on '{}'", name, base);
        Ok(stack)
    }

    pub fn switch_stack(&self, name: &str) -> Result<()> {
        let mut tx = self.db.begin_write();
        tx.set_current_stack(Some(name))?;
        tx.commit()
    }

    /// Branch off the current branch and add the new branch to the current stack
    pub fn create_branch(&self, name: &str) -> Result<Branch> {
        if self.git.branch_exists(name) {
            return Err(StackError::validation(format!(
                "Branch '{name}' already exists; use `gstack stack track {name}`"
            )));
        }
        let current = self.git.get_current_branch()?;
        let head = self.git.get_branch_head(&current)?;
        let (stack, parent) = self.parent_in_current_stack(&current, head)?;

        self.git.create_branch(name, None)?;
        self.git.checkout_branch(name)?;

        self.register(&stack, Branch::new(name, parent))
    }

    /// Register an existing git branch, parented at `parent` or the stack base
    pub fn track_branch(&self, name: &str, parent: Option<&str>) -> Result<Branch> {
        if !self.git.branch_exists(name) {
            return Err(StackError::validation(format!(
                "Branch '{name}' does not exist"
            )));
        }
        let base = self.current_stack()?.base_branch;
        let parent_name = parent.unwrap_or(&base);
        if parent_name == name {
            return Err(StackError::validation("A branch cannot be its own parent"));
        }
        // The fork point is the parent head the branch was built on
        let fork_point = self.git.runner().git(&["merge-base", parent_name, name])?;
        let (stack, parent) = self.parent_in_current_stack(parent_name, fork_point)?;

        self.register(&stack, Branch::new(name, parent))
    }

    fn current_stack(&self) -> Result<Stack> {
        self.db
            .begin_read()
            .current_stack()
            .cloned()
            .ok_or_else(|| {
                StackError::validation("No current stack; create one with `gstack stack create`")
            })
    }

    /// The current stack and a parent reference to `parent` within it
    fn parent_in_current_stack(&self, parent: &str, head: String) -> Result<(String, ParentRef)> {
        let tx = self.db.begin_read();
        let stack = tx.current_stack().ok_or_else(|| {
            StackError::validation("No current stack; create one with `gstack stack create`")
        })?;

        let parent_ref = if parent == stack.base_branch {
            // Only one member may sit directly on the base
            if let Some(root) = stack
                .branches
                .iter()
                .filter_map(|name| tx.branch(name))
                .find(|b| b.parent.is_trunk())
            {
                return Err(StackError::validation(format!(
                    "Stack '{}' already starts at '{}'; branch off it instead",
                    stack.name, root.name
                )));
            }
            ParentRef::trunk(parent, Some(head))
        } else if stack.contains(parent) && tx.branch(parent).is_some() {
            ParentRef::branch(parent, Some(head))
        } else {
            return Err(StackError::NotMember {
                stack: stack.name.clone(),
                branch: parent.to_string(),
            });
        };
        Ok((stack.name.clone(), parent_ref))
    }

    fn register(&self, stack: &str, branch: Branch) -> Result<Branch> {
        let mut tx = self.db.begin_write();
        if tx.branch(&branch.name).is_some() {
            tx.abort();
            return Err(StackError::validation(format!(
                "Branch '{}' is already tracked",
                branch.name
            )));
        }
        tx.upsert_branch(branch.clone())?;
        tx.add_branch_to_stack(stack, &branch.name)?;
        tx.commit()?;

        info!(
            "Tracking '{}' on '{}' in stack '{}'",
            branch.name,
            branch.parent.name(),
            stack
        );
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed");
    }

    fn commit(dir: &Path, file: &str, message: &str) {
        std::fs::write(dir.join(file), message).unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-q", "-m", message]);
    }

    fn setup() -> (TempDir, GitRepository, Database) {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        git(path, &["init", "-q"]);
        git(path, &["config", "user.name", "Test User"]);
        git(path, &["config", "user.email", "test@example.com"]);
        commit(path, "README.md", "Initial commit");
        git(path, &["branch", "-M", "main"]);
        git(
            path,
            &["remote", "add", "origin", "git@github.com:octo/widgets.git"],
        );

        let repo = GitRepository::open(path).unwrap();
        let (db, _) = Database::open(&path.join(".git/gstack/state.json")).unwrap();
        (dir, repo, db)
    }

    #[test]
    fn test_init_reads_slug_from_remote() {
        let (_dir, repo, db) = setup();
        let settings = Settings::default();
        let repository = StackService::new(&db, &repo, &settings).init().unwrap();
        assert_eq!(repository.owner, "octo");
        assert_eq!(repository.name, "widgets");
        assert_eq!(db.begin_read().repository().id, "octo/widgets");
    }

    #[test]
    fn test_create_stack_sets_current_and_creator() {
        let (_dir, repo, db) = setup();
        let settings = Settings::default();
        let service = StackService::new(&db, &repo, &settings);

        let stack = service.create_stack("feature", None).unwrap();
        assert_eq!(stack.base_branch, "main");
        assert_eq!(stack.creator, "Test User");
        assert_eq!(
            db.begin_read().current_stack().map(|s| s.name.clone()),
            Some("feature".to_string())
        );

        assert!(service.create_stack("other", Some("missing")).is_err());
    }

    #[test]
    fn test_create_branch_chains_parents() {
        let (dir, repo, db) = setup();
        let settings = Settings::default();
        let service = StackService::new(&db, &repo, &settings);
        service.create_stack("feature", None).unwrap();

        let main_head = repo.get_branch_head("main").unwrap();
        let a = service.create_branch("feat-a").unwrap();
        assert_eq!(a.parent, ParentRef::trunk("main", Some(main_head)));
        assert_eq!(repo.get_current_branch().unwrap(), "feat-a");

        commit(dir.path(), "a.txt", "Add a");
        let a_head = repo.get_branch_head("feat-a").unwrap();
        let b = service.create_branch("feat-b").unwrap();
        assert_eq!(b.parent, ParentRef::branch("feat-a", Some(a_head)));

        let read = db.begin_read();
        let names: Vec<&str> = read
            .ordered_stack_branches("feature")
            .unwrap()
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(names, vec!["feat-a", "feat-b"]);
    }

    #[test]
    fn test_create_branch_requires_current_stack() {
        let (_dir, repo, db) = setup();
        let settings = Settings::default();
        let err = StackService::new(&db, &repo, &settings)
            .create_branch("feat-a")
            .unwrap_err();
        assert!(matches!(err, StackError::Validation(_)));
        assert!(!repo.branch_exists("feat-a"));
    }

    #[test]
    fn test_track_records_fork_point() {
        let (dir, repo, db) = setup();
        let settings = Settings::default();
        let service = StackService::new(&db, &repo, &settings);
        service.create_stack("feature", None).unwrap();

        let fork = repo.get_branch_head("main").unwrap();
        git(dir.path(), &["checkout", "-q", "-b", "feat-x"]);
        commit(dir.path(), "x.txt", "Add x");
        git(dir.path(), &["checkout", "-q", "main"]);
        commit(dir.path(), "main.txt", "Move main");

        let tracked = service.track_branch("feat-x", None).unwrap();
        assert_eq!(tracked.parent, ParentRef::trunk("main", Some(fork)));

        assert!(service.track_branch("feat-x", None).is_err());
        assert!(service.track_branch("nope", None).is_err());

        git(dir.path(), &["branch", "feat-y", "main"]);
        let err = service.track_branch("feat-y", None).unwrap_err();
        assert!(matches!(err, StackError::Validation(_)));
    }

    #[test]
    fn test_track_on_tracked_parent() {
        let (dir, repo, db) = setup();
        let settings = Settings::default();
        let service = StackService::new(&db, &repo, &settings);
        service.create_stack("feature", None).unwrap();
        service.create_branch("feat-a").unwrap();
        commit(dir.path(), "a.txt", "Add a");
        let a_head = repo.get_branch_head("feat-a").unwrap();

        git(dir.path(), &["checkout", "-q", "-b", "feat-b"]);
        commit(dir.path(), "b.txt", "Add b");

        let tracked = service.track_branch("feat-b", Some("feat-a")).unwrap();
        assert_eq!(tracked.parent, ParentRef::branch("feat-a", Some(a_head)));

        git(dir.path(), &["branch", "feat-c", "feat-b"]);
        let err = service
            .track_branch("feat-c", Some("untracked"))
            .unwrap_err();
        assert!(matches!(err, StackError::GitCommand { .. }));
    }
}
