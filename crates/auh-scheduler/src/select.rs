use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use auh_core::{HistoryRecord, RunConfig, UpstreamCandidate};

// Recipes carrying these markers are handled through their primary
// target's upgrade, never on their own.
const EXCLUDED_NAME_MARKERS: &[&str] = &["cross", "native"];

/// Selection rules applied to scan candidates. Built from the run
/// configuration; kept separate so the rules can be exercised without one.
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    pub blacklist: Vec<String>,
    pub maintainers_whitelist: Vec<String>,
    pub cooldown_days: i64,
}

impl SelectionPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            blacklist: config.blacklist.clone(),
            maintainers_whitelist: config.maintainers_whitelist.clone(),
            cooldown_days: RunConfig::clamp_cooldown(config.cooldown_days),
        }
    }
}

/// Filters the scan candidates down to the recipes eligible for an upgrade
/// attempt this run. Rules apply in a fixed order and the first failing
/// rule excludes the candidate; survivors keep their input order.
pub fn select_candidates(
    candidates: &[UpstreamCandidate],
    history: &BTreeMap<String, HistoryRecord>,
    policy: &SelectionPolicy,
    today: NaiveDate,
) -> Vec<UpstreamCandidate> {
    candidates
        .iter()
        .filter(|candidate| is_eligible(candidate, history, policy, today))
        .cloned()
        .collect()
}

fn is_eligible(
    candidate: &UpstreamCandidate,
    history: &BTreeMap<String, HistoryRecord>,
    policy: &SelectionPolicy,
    today: NaiveDate,
) -> bool {
    let recipe = candidate.recipe.as_str();

    if !candidate.update_available() {
        if candidate.skip_reason.is_empty() {
            debug!(recipe, status = %candidate.status, "skipping: no update available");
        } else {
            debug!(recipe, reason = %candidate.skip_reason, "skipping: scan flagged skip reason");
        }
        return false;
    }

    if candidate.maintainer.is_empty() {
        debug!(recipe, "skipping: no maintainer to own the change");
        return false;
    }

    if policy.blacklist.iter().any(|entry| entry == recipe) {
        debug!(recipe, "skipping: blacklisted");
        return false;
    }

    if !policy.maintainers_whitelist.is_empty()
        && !policy
            .maintainers_whitelist
            .iter()
            .any(|entry| candidate.maintainer.contains(entry))
    {
        debug!(
            recipe,
            maintainer = %candidate.maintainer,
            "skipping: maintainer not in whitelist"
        );
        return false;
    }

    if let Some(record) = history.get(recipe) {
        if record.target_version == candidate.next_version
            && !retry_allowed(record, policy.cooldown_days, today)
        {
            debug!(
                recipe,
                version = %candidate.next_version,
                status = %record.status_text,
                "skipping: already attempted for this version"
            );
            return false;
        }
    }

    if EXCLUDED_NAME_MARKERS
        .iter()
        .any(|marker| recipe.contains(marker))
    {
        debug!(recipe, "skipping: cross or native recipe");
        return false;
    }

    true
}

// A previous attempt for the same target version blocks a retry unless it
// failed transiently and the cooldown window has fully elapsed.
fn retry_allowed(record: &HistoryRecord, cooldown_days: i64, today: NaiveDate) -> bool {
    let transient = record
        .status()
        .map(|status| status.is_transient())
        .unwrap_or(false);
    if !transient {
        return false;
    }

    let elapsed = today.signed_duration_since(record.attempt_date).num_days();
    elapsed > cooldown_days
}
