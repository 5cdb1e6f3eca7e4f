use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_COOLDOWN_DAYS: i64 = 7;
pub const MAX_COOLDOWN_DAYS: i64 = 30;

pub const DEFAULT_MACHINES: &[&str] =
    &["qemux86", "qemux86-64", "qemuarm", "qemumips", "qemuppc"];

/// Immutable run-wide configuration, threaded explicitly through the
/// orchestrator and its collaborators.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub build_dir: PathBuf,
    pub from_address: String,
    pub machines: Vec<String>,
    pub blacklist: Vec<String>,
    pub maintainers_whitelist: Vec<String>,
    pub status_recipients: Vec<String>,
    pub maintainer_override: BTreeMap<String, String>,
    pub cooldown_days: i64,
    pub drop_previous_commits: bool,
    pub clean_sstate: bool,
    pub clean_tmp: bool,
    pub send_emails: bool,
    pub skip_compilation: bool,
}

impl RunConfig {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            from_address: "auh@not.set".to_string(),
            machines: DEFAULT_MACHINES.iter().map(|m| (*m).to_string()).collect(),
            blacklist: Vec::new(),
            maintainers_whitelist: Vec::new(),
            status_recipients: Vec::new(),
            maintainer_override: BTreeMap::new(),
            cooldown_days: DEFAULT_COOLDOWN_DAYS,
            drop_previous_commits: false,
            clean_sstate: false,
            clean_tmp: false,
            send_emails: false,
            skip_compilation: false,
        }
    }

    /// Commit author string used for upgrade commits.
    pub fn author(&self) -> String {
        format!("Upgrade Helper <{}>", self.from_address)
    }

    /// Root of all helper state under the build directory.
    pub fn helper_dir(&self) -> PathBuf {
        self.build_dir.join("upgrade-helper")
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// Retry cooldowns outside `1..=MAX_COOLDOWN_DAYS` are clamped rather
    /// than rejected.
    pub fn clamp_cooldown(days: i64) -> i64 {
        days.clamp(1, MAX_COOLDOWN_DAYS)
    }
}
