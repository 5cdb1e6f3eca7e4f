use std::path::{Path, PathBuf};

use crate::error::ToolError;

pub type ToolResult<T> = Result<T, ToolError>;

/// Version-control operations against the single shared working tree.
/// Exactly one recipe touches the tree at a time; the trait carries no
/// locking of its own.
pub trait VersionControl {
    /// Porcelain status output; empty means the tree is clean.
    fn status(&self) -> ToolResult<String>;
    fn checkout_branch(&self, name: &str) -> ToolResult<()>;
    fn create_branch(&self, name: &str) -> ToolResult<()>;
    fn delete_branch(&self, name: &str) -> ToolResult<()>;
    /// Hard-reset `commits_back` commits behind the current head (0 resets
    /// to the head itself).
    fn reset_hard(&self, commits_back: u32) -> ToolResult<()>;
    fn clean_untracked(&self) -> ToolResult<()>;
    fn commit(&self, message: &str, author: &str) -> ToolResult<()>;
    /// Writes a patch for the latest commit into `out_dir` and returns the
    /// path the tool reported.
    fn create_patch(&self, out_dir: &Path) -> ToolResult<String>;
    fn last_commit(&self, branch: &str) -> ToolResult<String>;
    fn pull(&self) -> ToolResult<()>;
}

/// Build-system operations the orchestrator depends on. Implementations
/// are thin process wrappers; how the underlying tool is invoked is out of
/// scope here.
pub trait BuildSystem {
    /// Raw variable dump for one recipe, parsed by the caller.
    fn env(&self, recipe: &str) -> ToolResult<String>;
    /// Runs the upstream version scan and returns the path of the tabular
    /// report it produced.
    fn upstream_check(&self, targets: &[String]) -> ToolResult<PathBuf>;
    /// Extracts the pairwise `(recipe, depends_on)` relation for the given
    /// recipe set. A "multiple providers" diagnostic is not an extraction
    /// error; implementations return whatever edges they recovered.
    fn dependency_edges(&self, recipes: &[String]) -> ToolResult<Vec<(String, String)>>;
    fn unpack(&self, recipe: &str) -> ToolResult<()>;
    fn fetch(&self, recipe: &str) -> ToolResult<()>;
    fn cleanall(&self, recipe: &str) -> ToolResult<()>;
    /// Renames the recipe metadata to the new version and resets its
    /// revision counter.
    fn rename(&self, recipe: &str, new_version: &str) -> ToolResult<()>;
    fn compile(&self, recipe: &str, machine: &str) -> ToolResult<()>;
}

/// A composed notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<PathBuf>,
}

/// Outbound notification delivery. Failures are non-fatal to the run; a
/// local copy of every composed message is retained regardless.
pub trait Notifier {
    fn send(&self, message: &OutgoingMessage) -> ToolResult<()>;
}
