//! Running `git rebase` and classifying what it did.
//!
//! git reports rebase results only as free text, so the classification is
//! kept in a pure function ([`classify`]) that is total over its inputs.

use super::runner::GitRunner;
use crate::errors::Result;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static PROGRESS_FRAGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^.+\r").expect("progress regex is valid"));
static HINT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^hint:.*$\n?").expect("hint regex is valid"));
static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^error: (.+)$").expect("error regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOperation {
    Normal,
    Continue,
    Abort,
    Skip,
}

/// What to ask git to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseRequest {
    pub operation: RebaseOperation,
    /// Ignored by the resolution operations
    pub upstream: String,
    pub onto: Option<String>,
    /// Branch to check out and rebase; the current branch when unset
    pub branch: Option<String>,
}

impl RebaseRequest {
    pub fn normal<S: Into<String>>(upstream: S) -> Self {
        Self {
            operation: RebaseOperation::Normal,
            upstream: upstream.into(),
            onto: None,
            branch: None,
        }
    }

    /// A `Continue`, `Abort` or `Skip` of the rebase already in progress
    pub fn resolution(operation: RebaseOperation) -> Self {
        Self {
            operation,
            upstream: String::new(),
            onto: None,
            branch: None,
        }
    }

    pub fn onto<S: Into<String>>(mut self, onto: S) -> Self {
        self.onto = Some(onto.into());
        self
    }

    pub fn branch<S: Into<String>>(mut self, branch: S) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn args(&self) -> Vec<&str> {
        let mut args = vec!["rebase"];
        match self.operation {
            RebaseOperation::Continue => args.push("--continue"),
            RebaseOperation::Abort => args.push("--abort"),
            RebaseOperation::Skip => args.push("--skip"),
            RebaseOperation::Normal => {
                if let Some(onto) = &self.onto {
                    args.push("--onto");
                    args.push(onto);
                }
                args.push(&self.upstream);
                if let Some(branch) = &self.branch {
                    args.push(branch);
                }
            }
        }
        args
    }

    /// `--continue` would otherwise open an editor for the commit message
    pub fn env(&self) -> Vec<(&'static str, &'static str)> {
        match self.operation {
            RebaseOperation::Continue => vec![("GIT_EDITOR", "true")],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A commit could not be applied cleanly
    Merge,
    /// git failed in a way not otherwise recognized
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseConflict {
    pub kind: ConflictKind,
    pub hint: String,
    pub headline: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Updated,
    AlreadyUpToDate,
    Aborted,
    NotInProgress,
    Conflict(RebaseConflict),
}

impl RebaseOutcome {
    /// Whether the branch now sits on its target
    pub fn is_success(&self) -> bool {
        matches!(self, RebaseOutcome::Updated | RebaseOutcome::AlreadyUpToDate)
    }
}

/// Map one rebase invocation's exit code and output to an outcome
pub fn classify(
    operation: RebaseOperation,
    exit_code: i32,
    stdout: &str,
    stderr: &str,
    command_name: &str,
) -> RebaseOutcome {
    if exit_code == 0 {
        if stderr.contains("Successfully rebased") {
            return RebaseOutcome::Updated;
        }
        if stdout.contains("is up to date") {
            return RebaseOutcome::AlreadyUpToDate;
        }
        if operation == RebaseOperation::Abort {
            return RebaseOutcome::Aborted;
        }
        return RebaseOutcome::Updated;
    }

    let lower = stderr.to_lowercase();
    if lower.contains("no rebase in progress") {
        return RebaseOutcome::NotInProgress;
    }
    if lower.contains("could not apply") {
        let hint = normalize_hint(stderr, command_name);
        let headline = extract_headline(&hint);
        return RebaseOutcome::Conflict(RebaseConflict {
            kind: ConflictKind::Merge,
            hint,
            headline,
        });
    }

    RebaseOutcome::Conflict(RebaseConflict {
        kind: ConflictKind::Unclassified,
        hint: stderr.to_string(),
        headline: None,
    })
}

/// Drop progress noise and git's own advice, and point the user at our command
pub fn normalize_hint(stderr: &str, command_name: &str) -> String {
    let stripped = PROGRESS_FRAGMENT.replace_all(stderr, "");
    let stripped = HINT_LINE.replace_all(&stripped, "");
    stripped.replace("git rebase", command_name)
}

/// The message of the first `error:` line
pub fn extract_headline(hint: &str) -> Option<String> {
    ERROR_LINE
        .captures(hint)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end().to_string())
        .filter(|s| !s.is_empty())
}

/// Invoke the rebase and classify the result
pub fn run_rebase(
    runner: &GitRunner,
    request: &RebaseRequest,
    command_name: &str,
) -> Result<RebaseOutcome> {
    let output = runner.run_with_env(&request.args(), &request.env())?;
    let outcome = classify(
        request.operation,
        output.exit_code,
        &output.stdout,
        &output.stderr,
        command_name,
    );
    debug!("{:?} rebase classified as {:?}", request.operation, outcome);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CMD: &str = "gstack stack sync";

    #[test]
    fn test_success_variants() {
        assert_eq!(
            classify(
                RebaseOperation::Normal,
                0,
                "",
                "Successfully rebased and updated refs/heads/feat-a.\n",
                CMD
            ),
            RebaseOutcome::Updated
        );
        assert_eq!(
            classify(
                RebaseOperation::Normal,
                0,
                "Current branch feat-a is up to date.\n",
                "",
                CMD
            ),
            RebaseOutcome::AlreadyUpToDate
        );
        assert_eq!(
            classify(RebaseOperation::Abort, 0, "", "", CMD),
            RebaseOutcome::Aborted
        );
        assert_eq!(
            classify(RebaseOperation::Skip, 0, "", "", CMD),
            RebaseOutcome::Updated
        );
    }

    #[test]
    fn test_successful_message_wins_over_abort() {
        assert_eq!(
            classify(
                RebaseOperation::Abort,
                0,
                "",
                "Successfully rebased 3 commits",
                CMD
            ),
            RebaseOutcome::Updated
        );
    }

    #[test]
    fn test_not_in_progress_is_case_insensitive() {
        assert_eq!(
            classify(
                RebaseOperation::Continue,
                128,
                "",
                "fatal: No rebase in progress?\n",
                CMD
            ),
            RebaseOutcome::NotInProgress
        );
    }

    #[test]
    fn test_merge_conflict_is_normalized() {
        let stderr = "Rebasing (1/2)\r\
                      error: could not apply a1b2c3... fix conflicts\n\
                      hint: Resolve all conflicts manually, mark them as resolved with\n\
                      hint: \"git add/rm <conflicted_files>\", then run \"git rebase --continue\".\n\
                      Could not apply a1b2c3... fix conflicts\n\
                      To abort, run \"git rebase --abort\".\n";

        let conflict = match classify(RebaseOperation::Normal, 1, "", stderr, CMD) {
            RebaseOutcome::Conflict(conflict) => conflict,
            other => panic!("expected a conflict, got {other:?}"),
        };
        assert_eq!(conflict.kind, ConflictKind::Merge);
        assert_eq!(
            conflict.headline.as_deref(),
            Some("could not apply a1b2c3... fix conflicts")
        );
        assert!(!conflict.hint.contains("hint:"));
        assert!(!conflict.hint.contains("Rebasing (1/2)"));
        assert!(conflict.hint.contains("gstack stack sync --abort"));
    }

    #[test]
    fn test_unrecognized_failure_keeps_raw_stderr() {
        let stderr = "fatal: invalid upstream 'nope'\n";
        assert_eq!(
            classify(RebaseOperation::Normal, 128, "", stderr, CMD),
            RebaseOutcome::Conflict(RebaseConflict {
                kind: ConflictKind::Unclassified,
                hint: stderr.to_string(),
                headline: None,
            })
        );
    }

    #[test]
    fn test_headline_absent_without_error_line() {
        assert_eq!(extract_headline("CONFLICT (content): Merge conflict"), None);
    }

    #[test]
    fn test_request_args() {
        let request = RebaseRequest::normal("old-head")
            .onto("new-head")
            .branch("feat-b");
        assert_eq!(
            request.args(),
            vec!["rebase", "--onto", "new-head", "old-head", "feat-b"]
        );
        assert!(request.env().is_empty());

        let resume = RebaseRequest::resolution(RebaseOperation::Continue);
        assert_eq!(resume.args(), vec!["rebase", "--continue"]);
        assert_eq!(resume.env(), vec![("GIT_EDITOR", "true")]);

        assert_eq!(
            RebaseRequest::resolution(RebaseOperation::Skip).args(),
            vec!["rebase", "--skip"]
        );
    }
}
