//! Working-tree state of the solver repository.

use std::path::Path;

use cpbench_core::{HarnessError, Result};

use crate::tool::{ToolExecutor, ToolInvocation};

/// Commit and cleanliness of a working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingTreeState {
    pub commit_hash: String,
    pub has_dirty_files: bool,
}

async fn git_stdout(
    executor: &dyn ToolExecutor,
    git: &str,
    repo_dir: &Path,
    args: &[&str],
) -> Result<String> {
    let invocation = ToolInvocation::new("git", git)
        .args(args.iter().copied())
        .current_dir(repo_dir);
    let output = executor.execute(&invocation).await?;
    if !output.success() {
        return Err(HarnessError::GitFailed(format!(
            "git {} failed: {}",
            args.join(" "),
            output.stderr.trim()
        )));
    }
    Ok(output.stdout)
}

/// Capture the HEAD commit of the repository at `repo_dir`.
pub async fn capture_head_sha(
    executor: &dyn ToolExecutor,
    git: &str,
    repo_dir: &Path,
) -> Result<String> {
    let sha = git_stdout(executor, git, repo_dir, &["rev-parse", "HEAD"])
        .await?
        .trim()
        .to_string();
    if sha.is_empty() {
        return Err(HarnessError::GitFailed(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }
    Ok(sha)
}

/// Whether `git status --porcelain` lists any change.
pub async fn has_dirty_files(
    executor: &dyn ToolExecutor,
    git: &str,
    repo_dir: &Path,
) -> Result<bool> {
    let status = git_stdout(executor, git, repo_dir, &["status", "--porcelain"]).await?;
    Ok(status.lines().any(|line| !line.trim().is_empty()))
}

/// Commit hash and dirtiness in one call.
pub async fn working_tree_state(
    executor: &dyn ToolExecutor,
    git: &str,
    repo_dir: &Path,
) -> Result<WorkingTreeState> {
    let has_dirty_files = has_dirty_files(executor, git, repo_dir).await?;
    let commit_hash = capture_head_sha(executor, git, repo_dir).await?;
    Ok(WorkingTreeState {
        commit_hash,
        has_dirty_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedExecutor;
    use crate::tool::{ProcessExecutor, ToolOutput};
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn capture_head_sha_returns_40_hex_chars() {
        let repo = make_git_repo();
        let sha = capture_head_sha(&ProcessExecutor, "git", repo.path())
            .await
            .unwrap();
        assert_eq!(sha.len(), 40, "SHA should be 40 hex chars, got: {sha}");
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn capture_head_sha_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let result = capture_head_sha(&ProcessExecutor, "git", dir.path()).await;
        assert!(matches!(result, Err(HarnessError::GitFailed(_))));
    }

    #[tokio::test]
    async fn untracked_file_makes_tree_dirty() {
        let repo = make_git_repo();
        assert!(!has_dirty_files(&ProcessExecutor, "git", repo.path())
            .await
            .unwrap());

        std::fs::write(repo.path().join("notes.txt"), "wip").unwrap();
        assert!(has_dirty_files(&ProcessExecutor, "git", repo.path())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn working_tree_state_from_scripted_git() {
        let executor = ScriptedExecutor::new()
            .on_match(
                |inv| inv.args.first().map(String::as_str) == Some("status"),
                |_| ToolOutput::exited(0).with_stdout(" M src/main.rs\n"),
            )
            .on("git", ToolOutput::exited(0).with_stdout("deadbeef\n"));

        let state = working_tree_state(&executor, "git", Path::new("."))
            .await
            .unwrap();
        assert_eq!(
            state,
            WorkingTreeState {
                commit_hash: "deadbeef".to_string(),
                has_dirty_files: true,
            }
        );
    }
}
