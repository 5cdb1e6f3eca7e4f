use std::path::{Path, PathBuf};
use std::process::Command;

use auh_core::{ToolError, ToolResult, VersionControl};

/// Version-control collaborator backed by the `git` CLI, rooted at the
/// shared working tree for the whole run.
#[derive(Debug, Clone)]
pub struct GitTree {
    workdir: PathBuf,
}

impl GitTree {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn run(&self, action: &str, args: &[&str]) -> ToolResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|err| {
                ToolError::new("git", action, format!("failed launching git: {err}"), "")
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            let summary = stderr
                .lines()
                .chain(stdout.lines())
                .next()
                .unwrap_or("non-zero exit status")
                .to_string();
            return Err(ToolError::new(
                "git",
                action,
                summary,
                format!("{stdout}{stderr}"),
            ));
        }

        Ok(stdout)
    }
}

impl VersionControl for GitTree {
    fn status(&self) -> ToolResult<String> {
        self.run("status", &["status", "--porcelain"])
    }

    fn checkout_branch(&self, name: &str) -> ToolResult<()> {
        self.run("checkout", &["checkout", name]).map(|_| ())
    }

    fn create_branch(&self, name: &str) -> ToolResult<()> {
        self.run("create-branch", &["checkout", "-b", name])
            .map(|_| ())
    }

    fn delete_branch(&self, name: &str) -> ToolResult<()> {
        self.run("delete-branch", &["branch", "-D", name])
            .map(|_| ())
    }

    fn reset_hard(&self, commits_back: u32) -> ToolResult<()> {
        let target = if commits_back == 0 {
            "HEAD".to_string()
        } else {
            format!("HEAD~{commits_back}")
        };
        self.run("reset", &["reset", "--hard", &target]).map(|_| ())
    }

    fn clean_untracked(&self) -> ToolResult<()> {
        self.run("clean", &["clean", "-fd"]).map(|_| ())
    }

    fn commit(&self, message: &str, author: &str) -> ToolResult<()> {
        self.run(
            "commit",
            &["commit", "-a", "--author", author, "-m", message],
        )
        .map(|_| ())
    }

    fn create_patch(&self, out_dir: &Path) -> ToolResult<String> {
        let out = out_dir.display().to_string();
        self.run("format-patch", &["format-patch", "-1", "-o", &out])
            .map(|stdout| stdout.trim().to_string())
    }

    fn last_commit(&self, branch: &str) -> ToolResult<String> {
        self.run("rev-parse", &["rev-parse", branch])
            .map(|stdout| stdout.trim().to_string())
    }

    fn pull(&self) -> ToolResult<()> {
        self.run("pull", &["pull"]).map(|_| ())
    }
}
