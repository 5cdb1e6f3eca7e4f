use std::fmt;

/// Final per-recipe attempt status, persisted verbatim in the history
/// ledger. The ledger text is the contract: selection compares the stored
/// text against these exact renderings when deciding whether a failed
/// upgrade may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Succeeded,
    FetchError,
    CompileError,
    PatchMissing,
    UpgradeNotNeeded,
    UnsupportedSource,
    UnknownError,
}

impl AttemptStatus {
    pub fn as_text(self) -> &'static str {
        match self {
            AttemptStatus::Succeeded => "Succeeded",
            AttemptStatus::FetchError => "Fetch error",
            AttemptStatus::CompileError => "Compile error",
            AttemptStatus::PatchMissing => "Patch missing after commit",
            AttemptStatus::UpgradeNotNeeded => "Upgrade not needed",
            AttemptStatus::UnsupportedSource => "Unsupported source location",
            AttemptStatus::UnknownError => "Failed(unknown error)",
        }
    }

    /// Parses a ledger status text back into a status. Texts written by
    /// other tool versions come back as `None` and are treated as
    /// non-retryable by selection.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "Succeeded" => Some(AttemptStatus::Succeeded),
            "Fetch error" => Some(AttemptStatus::FetchError),
            "Compile error" => Some(AttemptStatus::CompileError),
            "Patch missing after commit" => Some(AttemptStatus::PatchMissing),
            "Upgrade not needed" => Some(AttemptStatus::UpgradeNotNeeded),
            "Unsupported source location" => Some(AttemptStatus::UnsupportedSource),
            "Failed(unknown error)" => Some(AttemptStatus::UnknownError),
            _ => None,
        }
    }

    /// Transient failures may be retried for the same target version once
    /// the cooldown window has elapsed. Everything else is final for that
    /// version.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            AttemptStatus::FetchError | AttemptStatus::UnknownError
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}
