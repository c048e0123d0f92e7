use crate::errors::{Result, StackError};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Captured result of one git invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs git as a subprocess pinned to a working directory.
///
/// Arguments are passed as a vector, never through a shell, and stdin is
/// closed so git can never block on a prompt.
#[derive(Debug, Clone)]
pub struct GitRunner {
    workdir: PathBuf,
}

impl GitRunner {
    pub fn new(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run git and capture its output whatever the exit status
    pub fn run(&self, args: &[&str]) -> Result<GitOutput> {
        self.run_with_env(args, &[])
    }

    pub fn run_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> Result<GitOutput> {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(&self.workdir)
            .stdin(Stdio::null());
        for (key, value) in env {
            command.env(key, value);
        }

        let output = command.output().map_err(|e| StackError::GitCommand {
            command: args.join(" "),
            stderr: format!("failed to spawn git: {e}"),
        })?;

        // Killed by a signal when there is no code
        let exit_code = output.status.code().unwrap_or(-1);
        debug!("git {} exited with {}", args.join(" "), exit_code);

        Ok(GitOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run git, failing on a non-zero exit; returns trimmed stdout
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.success() {
            return Err(StackError::GitCommand {
                command: args.join(" "),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_git_version_runs() {
        let dir = TempDir::new().unwrap();
        let runner = GitRunner::new(dir.path());
        let version = runner.git(&["--version"]).unwrap();
        assert!(version.starts_with("git version"));
    }

    #[test]
    fn test_failure_is_captured_or_reported() {
        let dir = TempDir::new().unwrap();
        let runner = GitRunner::new(dir.path());

        let output = runner.run(&["rev-parse", "--verify", "no-such-ref"]).unwrap();
        assert!(!output.success());
        assert!(!output.stderr.is_empty());

        let err = runner.git(&["rev-parse", "--verify", "no-such-ref"]).unwrap_err();
        assert!(matches!(err, StackError::GitCommand { .. }));
    }
}
