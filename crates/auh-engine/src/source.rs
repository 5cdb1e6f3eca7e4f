use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use auh_core::{
    parse_upstream_report, BuildSystem, UpstreamCandidate, VersionControl,
    STATUS_UPDATE_AVAILABLE,
};

use crate::layout::RunLayout;

/// Produces the candidate set for one run. The explicit-list source is
/// operator-driven and bypasses the eligibility policy; the scan source
/// yields everything upstream reported and relies on the policy to filter.
pub trait CandidateSource {
    fn gather(
        &self,
        vcs: &dyn VersionControl,
        build: &dyn BuildSystem,
        layout: &RunLayout,
        today: NaiveDate,
    ) -> Result<Vec<UpstreamCandidate>>;

    /// Whether the gathered candidates go through selection filtering.
    fn scan_filtered(&self) -> bool {
        true
    }
}

/// Operator-requested recipes with explicit target versions.
pub struct ExplicitList {
    candidates: Vec<UpstreamCandidate>,
}

impl ExplicitList {
    pub fn new(requests: Vec<(String, String, String)>) -> Self {
        let candidates = requests
            .into_iter()
            .map(|(recipe, target_version, maintainer)| UpstreamCandidate {
                recipe,
                current_version: String::new(),
                next_version: target_version,
                status: STATUS_UPDATE_AVAILABLE.to_string(),
                maintainer,
                skip_reason: String::new(),
            })
            .collect();
        Self { candidates }
    }
}

impl CandidateSource for ExplicitList {
    fn gather(
        &self,
        _vcs: &dyn VersionControl,
        _build: &dyn BuildSystem,
        _layout: &RunLayout,
        _today: NaiveDate,
    ) -> Result<Vec<UpstreamCandidate>> {
        Ok(self.candidates.clone())
    }

    fn scan_filtered(&self) -> bool {
        false
    }
}

/// Full upstream version scan over the whole recipe universe. The scan is
/// expensive, so a same-day report against an unchanged master head is
/// reused from the cache marker instead of re-running the check.
#[derive(Debug, Default)]
pub struct UpstreamScan;

impl UpstreamScan {
    fn cached_report(
        &self,
        layout: &RunLayout,
        today: NaiveDate,
        master_commit: &str,
    ) -> Option<std::path::PathBuf> {
        let marker = fs::read_to_string(layout.scan_cache_path()).ok()?;
        let mut fields = marker.trim().splitn(3, ',');
        let date = fields.next()?;
        let commit = fields.next()?;
        let path = std::path::PathBuf::from(fields.next()?);
        if date == today.format("%Y-%m-%d").to_string()
            && commit == master_commit
            && path.is_file()
        {
            Some(path)
        } else {
            None
        }
    }
}

impl CandidateSource for UpstreamScan {
    fn gather(
        &self,
        vcs: &dyn VersionControl,
        build: &dyn BuildSystem,
        layout: &RunLayout,
        today: NaiveDate,
    ) -> Result<Vec<UpstreamCandidate>> {
        let master_commit = match vcs.last_commit("master") {
            Ok(commit) => commit,
            Err(err) => {
                warn!(%err, "cannot resolve master head, scan cache disabled");
                "unknown".to_string()
            }
        };

        let report = match self.cached_report(layout, today, &master_commit) {
            Some(cached) => {
                info!(path = %cached.display(), "reusing today's upstream report");
                cached
            }
            None => {
                info!("running upstream version check, this may take a while");
                let report = build
                    .upstream_check(&["universe".to_string()])
                    .context("upstream version check failed")?;
                let marker = format!(
                    "{},{},{}\n",
                    today.format("%Y-%m-%d"),
                    master_commit,
                    report.display()
                );
                if let Err(err) = fs::write(layout.scan_cache_path(), marker) {
                    warn!(%err, "failed recording scan cache marker");
                }
                report
            }
        };

        let raw = fs::read_to_string(&report)
            .with_context(|| format!("failed reading upstream report: {}", report.display()))?;
        Ok(parse_upstream_report(&raw))
    }
}
