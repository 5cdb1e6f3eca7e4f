use thiserror::Error;

use crate::status::AttemptStatus;

/// Non-zero exit or rejection from an external collaborator, with the
/// captured diagnostic output preserved for inspection.
#[derive(Debug, Clone, Error)]
#[error("{tool} {action} failed: {summary}")]
pub struct ToolError {
    pub tool: String,
    pub action: String,
    pub summary: String,
    pub output: String,
}

impl ToolError {
    pub fn new(
        tool: impl Into<String>,
        action: impl Into<String>,
        summary: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            tool: tool.into(),
            action: action.into(),
            summary: summary.into(),
            output: output.into(),
        }
    }

    pub fn output_contains(&self, needle: &str) -> bool {
        self.output.contains(needle) || self.summary.contains(needle)
    }
}

/// A recipe stopping early without anything to roll back. Not an error:
/// callers match on this instead of catching control-flow exceptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignStop {
    AlreadyCurrent,
    UnsupportedSource,
}

impl BenignStop {
    pub fn status(self) -> AttemptStatus {
        match self {
            BenignStop::AlreadyCurrent => AttemptStatus::UpgradeNotNeeded,
            BenignStop::UnsupportedSource => AttemptStatus::UnsupportedSource,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            BenignStop::AlreadyCurrent => "target version is already current",
            BenignStop::UnsupportedSource => "source location scheme is not supported",
        }
    }
}

/// Execution failure of a single recipe. Terminates processing for that
/// recipe only; the run continues with the next one.
#[derive(Debug, Clone, Error)]
pub enum UpgradeFailure {
    #[error("fetch error: {0}")]
    Fetch(ToolError),

    #[error("compile error for machine {machine}: {cause}")]
    Compile { machine: String, cause: ToolError },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("build environment error: {0}")]
    Environment(String),

    #[error("commit reported success but produced no patch artifact")]
    PatchMissing,
}

impl UpgradeFailure {
    pub fn status(&self) -> AttemptStatus {
        match self {
            UpgradeFailure::Fetch(_) => AttemptStatus::FetchError,
            UpgradeFailure::Compile { .. } => AttemptStatus::CompileError,
            UpgradeFailure::PatchMissing => AttemptStatus::PatchMissing,
            UpgradeFailure::Tool(_) | UpgradeFailure::Environment(_) => {
                AttemptStatus::UnknownError
            }
        }
    }

    /// Captured tool output, when the failure carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            UpgradeFailure::Fetch(cause)
            | UpgradeFailure::Compile { cause, .. }
            | UpgradeFailure::Tool(cause) => Some(cause.output.as_str()),
            UpgradeFailure::Environment(_) | UpgradeFailure::PatchMissing => None,
        }
    }
}
