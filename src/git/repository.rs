use super::rebase::{self, RebaseOutcome, RebaseRequest};
use super::runner::GitRunner;
use crate::errors::{Result, StackError};
use crate::stack::remote::SubmitGit;
use crate::stack::restack::RestackGit;
use git2::Repository;
use std::path::{Path, PathBuf};
use tracing::info;

/// Command name shown in rewritten rebase hints
pub const DEFAULT_SYNC_COMMAND: &str = "gstack stack sync";

/// Wrapper around git2::Repository for ref lookups, plus a subprocess runner
/// for everything that touches the working tree
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
    runner: GitRunner,
    sync_command: String,
    remote: String,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| StackError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| StackError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            runner: GitRunner::new(&workdir),
            path: workdir,
            sync_command: DEFAULT_SYNC_COMMAND.to_string(),
            remote: "origin".to_string(),
        })
    }

    /// Use a different command name when rewriting rebase hints
    pub fn with_sync_command<S: Into<String>>(mut self, command: S) -> Self {
        self.sync_command = command.into();
        self
    }

    /// Push to a remote other than `origin`
    pub fn with_remote<S: Into<String>>(mut self, remote: S) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The per-worktree git directory
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn runner(&self) -> &GitRunner {
        &self.runner
    }

    /// Get the current branch name
    pub fn get_current_branch(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| StackError::config(format!("Could not get HEAD: {e}")))?;

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(name.to_string());
            }
        }

        let commit = head.peel_to_commit()?;
        Err(StackError::validation(format!(
            "HEAD is detached at {}; check out a branch first",
            commit.id()
        )))
    }

    /// Get the HEAD commit hash
    pub fn get_head_commit_hash(&self) -> Result<String> {
        let head = self
            .repo
            .head()
            .map_err(|e| StackError::config(format!("Could not get HEAD: {e}")))?;
        Ok(head.peel_to_commit()?.id().to_string())
    }

    /// Get the commit hash at the head of a local branch
    pub fn get_branch_head(&self, branch_name: &str) -> Result<String> {
        let branch = self
            .repo
            .find_branch(branch_name, git2::BranchType::Local)
            .map_err(|e| {
                StackError::validation(format!("Could not find branch '{branch_name}': {e}"))
            })?;

        let commit = branch.get().peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, git2::BranchType::Local).is_ok()
    }

    /// Create a branch at `target`, or at HEAD
    pub fn create_branch(&self, name: &str, target: Option<&str>) -> Result<()> {
        let target_commit = match target {
            Some(target) => self
                .repo
                .revparse_single(target)
                .map_err(|e| {
                    StackError::validation(format!("Could not find target '{target}': {e}"))
                })?
                .peel_to_commit()?,
            None => self.repo.head()?.peel_to_commit()?,
        };

        self.repo.branch(name, &target_commit, false).map_err(|e| {
            StackError::validation(format!("Could not create branch '{name}': {e}"))
        })?;

        info!("Created branch '{}'", name);
        Ok(())
    }

    /// Switch to a branch
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        self.runner.git(&["checkout", name])?;
        info!("Switched to branch '{}'", name);
        Ok(())
    }

    /// Check if the working directory has uncommitted changes
    pub fn is_dirty(&self) -> Result<bool> {
        let statuses = self.repo.statuses(None)?;

        Ok(statuses.iter().any(|status| {
            status.status().intersects(
                git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_NEW
                    | git2::Status::INDEX_DELETED
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED,
            )
        }))
    }

    /// Whether git itself is in the middle of a rebase
    pub fn is_rebase_in_progress(&self) -> bool {
        let git_dir = self.git_dir();
        git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
    }

    /// Get remote URL for a given remote name
    pub fn get_remote_url(&self, name: &str) -> Result<String> {
        let remote = self.repo.find_remote(name)?;
        let url = remote
            .url()
            .ok_or_else(|| StackError::config(format!("URL of remote '{name}' is not UTF-8")))?;
        Ok(url.to_string())
    }

    /// Push a branch, leasing on its remote-tracking ref once it has one
    pub fn push_branch(&self, branch: &str) -> Result<()> {
        let tracking = format!("refs/remotes/{}/{}", self.remote, branch);
        if self.repo.find_reference(&tracking).is_ok() {
            self.runner
                .git(&["push", "--force-with-lease", &self.remote, branch])?;
        } else {
            self.runner
                .git(&["push", "--set-upstream", &self.remote, branch])?;
        }
        info!("Pushed '{}' to '{}'", branch, self.remote);
        Ok(())
    }

    /// Subject and body of the commit at the tip of a branch
    pub fn tip_commit_message(&self, branch: &str) -> Result<(String, String)> {
        let message = self
            .runner
            .git(&["log", "-1", "--format=%B", &format!("refs/heads/{branch}")])?;
        let (subject, body) = message.split_once('\n').unwrap_or((message.as_str(), ""));
        Ok((subject.trim().to_string(), body.trim().to_string()))
    }

    /// Run a rebase and classify its outcome
    pub fn rebase(&self, request: &RebaseRequest) -> Result<RebaseOutcome> {
        rebase::run_rebase(&self.runner, request, &self.sync_command)
    }
}

impl RestackGit for GitRepository {
    fn current_branch(&self) -> Result<String> {
        self.get_current_branch()
    }

    fn branch_head(&self, branch: &str) -> Result<String> {
        self.get_branch_head(branch)
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.checkout_branch(branch)
    }

    fn rebase(&self, request: &RebaseRequest) -> Result<RebaseOutcome> {
        GitRepository::rebase(self, request)
    }
}

impl SubmitGit for GitRepository {
    fn push_branch(&self, branch: &str) -> Result<()> {
        GitRepository::push_branch(self, branch)
    }

    fn commit_message(&self, branch: &str) -> Result<(String, String)> {
        self.tip_commit_message(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::rebase::RebaseOperation;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(repo_path: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn create_test_repo() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let repo_path = temp_dir.path().to_path_buf();

        git(&repo_path, &["init"]);
        git(&repo_path, &["config", "user.name", "Test"]);
        git(&repo_path, &["config", "user.email", "test@test.com"]);

        std::fs::write(repo_path.join("README.md"), "# Test").unwrap();
        git(&repo_path, &["add", "."]);
        git(&repo_path, &["commit", "-m", "Initial commit"]);
        git(&repo_path, &["branch", "-M", "main"]);

        (temp_dir, repo_path)
    }

    fn create_commit(repo_path: &Path, message: &str, filename: &str) {
        std::fs::write(repo_path.join(filename), format!("Content for {filename}\n")).unwrap();
        git(repo_path, &["add", filename]);
        git(repo_path, &["commit", "-m", message]);
    }

    #[test]
    fn test_branch_operations() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        assert_eq!(repo.get_current_branch().unwrap(), "main");

        repo.create_branch("feature", None).unwrap();
        assert!(repo.branch_exists("feature"));
        assert_eq!(
            repo.get_branch_head("feature").unwrap(),
            repo.get_head_commit_hash().unwrap()
        );

        repo.checkout_branch("feature").unwrap();
        assert_eq!(repo.get_current_branch().unwrap(), "feature");
        assert!(repo.get_branch_head("missing").is_err());
    }

    #[test]
    fn test_dirty_detection() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        assert!(!repo.is_dirty().unwrap());
        std::fs::write(repo_path.join("README.md"), "# Changed").unwrap();
        assert!(repo.is_dirty().unwrap());
    }

    #[test]
    fn test_rebase_onto_advanced_trunk() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        git(&repo_path, &["checkout", "-b", "feature"]);
        create_commit(&repo_path, "Feature work", "feature.rs");
        git(&repo_path, &["checkout", "main"]);
        create_commit(&repo_path, "Trunk work", "trunk.rs");

        let outcome = repo
            .rebase(&RebaseRequest::normal("main").branch("feature"))
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(repo.get_current_branch().unwrap(), "feature");
        assert!(repo_path.join("trunk.rs").exists());
        assert!(!repo.is_rebase_in_progress());
    }

    #[test]
    fn test_resolution_without_rebase_is_not_in_progress() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        let outcome = repo
            .rebase(&RebaseRequest::resolution(RebaseOperation::Continue))
            .unwrap();
        assert_eq!(outcome, RebaseOutcome::NotInProgress);
    }

    #[test]
    fn test_push_branch_first_then_with_lease() {
        let (_temp_dir, repo_path) = create_test_repo();
        let remote_dir = TempDir::new().unwrap();
        git(remote_dir.path(), &["init", "--bare", "-q"]);
        let remote_url = remote_dir.path().to_str().unwrap();
        git(&repo_path, &["remote", "add", "origin", remote_url]);
        let repo = GitRepository::open(&repo_path).unwrap();

        git(&repo_path, &["checkout", "-b", "feature"]);
        create_commit(&repo_path, "Feature work", "feature.rs");
        repo.push_branch("feature").unwrap();

        // Rewritten history goes out through the lease
        git(&repo_path, &["commit", "--amend", "-m", "Feature work, revised"]);
        repo.push_branch("feature").unwrap();

        let remote_head = Command::new("git")
            .args(["rev-parse", "refs/heads/feature"])
            .current_dir(remote_dir.path())
            .output()
            .unwrap();
        assert_eq!(
            String::from_utf8_lossy(&remote_head.stdout).trim(),
            repo.get_branch_head("feature").unwrap()
        );
    }

    #[test]
    fn test_tip_commit_message_splits_subject() {
        let (_temp_dir, repo_path) = create_test_repo();
        let repo = GitRepository::open(&repo_path).unwrap();

        git(&repo_path, &["checkout", "-b", "feature"]);
        std::fs::write(repo_path.join("a.rs"), "a").unwrap();
        git(&repo_path, &["add", "a.rs"]);
        git(&repo_path, &["commit", "-m", "Add a", "-m", "Explains why a exists."]);

        let (subject, body) = repo.tip_commit_message("feature").unwrap();
        assert_eq!(subject, "Add a");
        assert_eq!(body, "Explains why a exists.");

        let (subject, body) = repo.tip_commit_message("main").unwrap();
        assert_eq!(subject, "Initial commit");
        assert_eq!(body, "");
    }
}
