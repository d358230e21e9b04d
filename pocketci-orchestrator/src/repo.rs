//! Repository fetching
//!
//! Materializes the repository at the event's commit and computes the list
//! of files the commit changed. The clone keeps a little history (two commits
//! are enough for the parent diff, more for merge commits), which is why this
//! is a manual `git clone --depth 10` rather than a bare single-commit fetch.

use std::path::Path;

use tempfile::TempDir;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Errors from materializing a repository.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {action} failed: {stderr}")]
    Git { action: String, stderr: String },
}

/// A working tree checked out at a specific commit.
///
/// The tree lives in a temporary directory owned by this handle; dropping the
/// snapshot removes it. Snapshots never cross the process boundary — runners
/// re-clone instead.
#[derive(Debug)]
pub struct RepoSnapshot {
    dir: TempDir,
}

impl RepoSnapshot {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Clones repositories with netrc-backed credentials.
#[derive(Debug)]
pub struct Fetcher {
    /// Private HOME visible only to git subprocesses; holds the netrc file.
    auth_home: TempDir,
}

impl Fetcher {
    /// Creates a fetcher. When a username/token pair is provided it is
    /// written as a netrc entry for github.com so clones of private
    /// repositories authenticate.
    pub fn new(credentials: Option<(&str, &str)>) -> Result<Self, FetchError> {
        let auth_home = TempDir::new()?;

        if let Some((username, token)) = credentials {
            let netrc = format!("machine github.com login {username} password {token}\n");
            std::fs::write(auth_home.path().join(".netrc"), netrc)?;
        }

        Ok(Self { auth_home })
    }

    /// Clones `url` at `git_ref`, checks out `sha`, and returns the snapshot
    /// together with the files changed by the commit.
    ///
    /// With a base (`base_ref`/`base_sha`, the PR case) the diff compares
    /// HEAD against the base commit; without one it compares HEAD against its
    /// parent.
    pub async fn fetch(
        &self,
        url: &str,
        git_ref: &str,
        sha: &str,
        base_ref: Option<&str>,
        base_sha: Option<&str>,
    ) -> Result<(RepoSnapshot, Vec<String>), FetchError> {
        info!(
            "cloning repository {url} ref={git_ref} sha={sha} base_ref={}",
            base_ref.unwrap_or("")
        );

        // Cloning into the (empty) temp dir itself keeps the snapshot path
        // and the worktree path identical.
        let dir = TempDir::new()?;
        let target = dir.path().to_path_buf();

        let mut clone_args = vec!["clone".to_string(), "--single-branch".to_string()];
        if !git_ref.is_empty() {
            clone_args.push("--branch".to_string());
            clone_args.push(git_ref.to_string());
        }
        clone_args.push("--depth".to_string());
        clone_args.push("10".to_string());
        clone_args.push(url.to_string());
        clone_args.push(target.to_string_lossy().into_owned());

        self.run_git(&clone_args, None).await?;

        if !sha.is_empty() {
            self.run_git(&["checkout".to_string(), sha.to_string()], Some(&target))
                .await?;
        }

        let diff = match (base_ref, base_sha) {
            (Some(base_ref), Some(base_sha)) => {
                self.run_git(
                    &[
                        "fetch".to_string(),
                        "origin".to_string(),
                        base_ref.to_string(),
                    ],
                    Some(&target),
                )
                .await?;
                self.run_git(
                    &[
                        "diff-tree".to_string(),
                        "--no-commit-id".to_string(),
                        "--name-only".to_string(),
                        "-r".to_string(),
                        "HEAD".to_string(),
                        base_sha.to_string(),
                    ],
                    Some(&target),
                )
                .await?
            }
            _ => {
                self.run_git(
                    &[
                        "diff-tree".to_string(),
                        "--no-commit-id".to_string(),
                        "--name-only".to_string(),
                        "-r".to_string(),
                        "HEAD".to_string(),
                    ],
                    Some(&target),
                )
                .await?
            }
        };

        let changed = parse_changed_files(&diff);
        debug!("computed {} changed file(s)", changed.len());

        Ok((RepoSnapshot { dir }, changed))
    }

    async fn run_git(&self, args: &[String], cwd: Option<&Path>) -> Result<String, FetchError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .env("HOME", self.auth_home.path())
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(FetchError::Git {
                action: args.first().cloned().unwrap_or_default(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Splits `git diff-tree --name-only` output into file paths.
fn parse_changed_files(output: &str) -> Vec<String> {
    output
        .trim_end_matches('\n')
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    #[test]
    fn parse_changed_files_splits_lines() {
        assert_eq!(
            parse_changed_files("main.go\ngo.mod\n"),
            vec!["main.go", "go.mod"]
        );
    }

    #[test]
    fn parse_changed_files_handles_empty_output() {
        assert!(parse_changed_files("").is_empty());
        assert!(parse_changed_files("\n").is_empty());
    }

    /// Builds a local upstream with two commits on `main` and a `feature`
    /// branch adding one file on top.
    fn fixture_repo() -> (TempDir, String, String, String) {
        let upstream = TempDir::new().unwrap();
        let path = upstream.path();

        let git = |args: &[&str]| {
            let out = StdCommand::new("git")
                .args([
                    "-c",
                    "user.name=pocketci",
                    "-c",
                    "user.email=ci@pocketci.dev",
                ])
                .args(args)
                .current_dir(path)
                .output()
                .expect("git runs");
            assert!(
                out.status.success(),
                "git {args:?}: {}",
                String::from_utf8_lossy(&out.stderr)
            );
            String::from_utf8_lossy(&out.stdout).trim().to_string()
        };

        git(&["init", "-b", "main"]);
        std::fs::write(path.join("README.md"), "docs").unwrap();
        git(&["add", "."]);
        git(&["commit", "-m", "initial"]);
        let base_sha = git(&["rev-parse", "HEAD"]);

        std::fs::write(path.join("main.go"), "package main").unwrap();
        git(&["add", "."]);
        git(&["commit", "-m", "add main.go"]);
        let push_sha = git(&["rev-parse", "HEAD"]);

        git(&["checkout", "-b", "feature"]);
        std::fs::write(path.join("feature.go"), "package feature").unwrap();
        git(&["add", "."]);
        git(&["commit", "-m", "add feature.go"]);
        let head_sha = git(&["rev-parse", "HEAD"]);
        git(&["checkout", "main"]);

        (upstream, base_sha, push_sha, head_sha)
    }

    #[tokio::test]
    async fn push_diff_compares_against_parent() {
        let (upstream, _base, push_sha, _head) = fixture_repo();
        let url = upstream.path().to_string_lossy().into_owned();

        let fetcher = Fetcher::new(None).unwrap();
        let (snapshot, changed) = fetcher
            .fetch(&url, "main", &push_sha, None, None)
            .await
            .unwrap();

        assert_eq!(changed, vec!["main.go"]);
        assert!(snapshot.path().join("main.go").exists());
    }

    #[tokio::test]
    async fn pr_diff_compares_against_base() {
        let (upstream, _base, push_sha, head_sha) = fixture_repo();
        let url = upstream.path().to_string_lossy().into_owned();

        let fetcher = Fetcher::new(None).unwrap();
        let (_snapshot, changed) = fetcher
            .fetch(&url, "feature", &head_sha, Some("main"), Some(&push_sha))
            .await
            .unwrap();

        assert_eq!(changed, vec!["feature.go"]);
    }

    #[tokio::test]
    async fn clone_failure_carries_stderr() {
        let fetcher = Fetcher::new(None).unwrap();
        let err = fetcher
            .fetch("/nonexistent/repo", "main", "sha", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Git { action, .. } if action == "clone"));
    }
}
