use std::collections::BTreeMap;
use std::path::PathBuf;

use auh_core::{AttemptStatus, BenignStop, UpgradeFailure};

use crate::recipe::SourceKind;

/// Mutable state for one recipe's trip through the pipeline. Owned by the
/// pipeline while steps run, then read-only for outcome recording; never
/// shared across recipes or reused across runs.
#[derive(Debug, Default)]
pub struct UpgradeContext {
    pub recipe: String,
    pub target_version: String,
    pub maintainer: String,
    pub workdir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub recipe_dir: PathBuf,
    pub source: Option<SourceKind>,
    pub stop: Option<BenignStop>,
    pub error: Option<UpgradeFailure>,
    pub patch_file: Option<PathBuf>,
    pub compiled_machines: Vec<String>,
}

impl UpgradeContext {
    pub fn new(
        recipe: impl Into<String>,
        target_version: impl Into<String>,
        maintainer: impl Into<String>,
    ) -> Self {
        Self {
            recipe: recipe.into(),
            target_version: target_version.into(),
            maintainer: maintainer.into(),
            ..Self::default()
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn skipped(&self) -> bool {
        self.error.is_none() && self.stop.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.stop.is_none()
    }

    /// Final status for the ledger and the run summary.
    pub fn attempt_status(&self) -> AttemptStatus {
        if let Some(failure) = &self.error {
            failure.status()
        } else if let Some(stop) = self.stop {
            stop.status()
        } else {
            AttemptStatus::Succeeded
        }
    }
}

/// Parses a raw build-environment dump into variable assignments. The
/// first assignment of a variable wins, matching how the dump repeats
/// overridden values further down.
pub fn parse_build_env(dump: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for line in dump.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.is_empty() || key.contains(' ') || key.contains('\t') {
            continue;
        }
        env.entry(key.to_string())
            .or_insert_with(|| value.trim().trim_matches('"').to_string());
    }
    env
}
