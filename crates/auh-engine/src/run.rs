use std::collections::BTreeMap;
use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use auh_core::{BuildSystem, Notifier, RunConfig, UpstreamCandidate, VersionControl};
use auh_history::HistoryStore;
use auh_scheduler::{order_recipes, select_candidates, SelectionPolicy};

use crate::context::UpgradeContext;
use crate::layout::RunLayout;
use crate::outcome::{OutcomeAggregator, RunStatistics};
use crate::pipeline::StepPipeline;
use crate::source::CandidateSource;

const MASTER_BRANCH: &str = "master";
const UPGRADES_BRANCH: &str = "upgrades";

/// One whole batch run: candidate gathering, selection, dependency
/// ordering and the per-recipe pipeline, with failures isolated per
/// recipe.
pub struct UpgradeRun<'a> {
    pub vcs: &'a dyn VersionControl,
    pub build: &'a dyn BuildSystem,
    pub notifier: Option<&'a dyn Notifier>,
    pub config: &'a RunConfig,
    pub history: &'a HistoryStore,
    pub layout: &'a RunLayout,
}

impl UpgradeRun<'_> {
    pub fn execute(&self, source: &dyn CandidateSource, today: NaiveDate) -> Result<RunStatistics> {
        if source.scan_filtered() {
            self.prepare_master()?;
            self.prepare_build_area();
        }

        let candidates = source.gather(self.vcs, self.build, self.layout, today)?;
        let history = self.history.load()?;

        let selected = if source.scan_filtered() {
            let policy = SelectionPolicy::from_config(self.config);
            select_candidates(&candidates, &history, &policy, today)
        } else {
            candidates
        };
        if selected.is_empty() {
            info!("no recipes eligible for upgrade");
            return Ok(RunStatistics::default());
        }

        let names: Vec<String> = selected
            .iter()
            .map(|candidate| candidate.recipe.clone())
            .collect();
        let edges = self
            .build
            .dependency_edges(&names)
            .context("failed extracting recipe dependencies")?;
        let ordered = order_recipes(&names, &edges)?;

        let by_name: BTreeMap<&str, &UpstreamCandidate> = selected
            .iter()
            .map(|candidate| (candidate.recipe.as_str(), candidate))
            .collect();

        let pipeline = StepPipeline {
            vcs: self.vcs,
            build: self.build,
            config: self.config,
            layout: self.layout,
        };
        let mut aggregator = OutcomeAggregator::new(
            self.config,
            self.layout,
            self.history,
            self.notifier,
            today,
        );

        let total = ordered.len();
        for (index, name) in ordered.iter().enumerate() {
            let Some(candidate) = by_name.get(name.as_str()) else {
                continue;
            };
            info!(
                recipe = %name,
                "upgrading recipe {} of {total}",
                index + 1
            );

            let mut ctx = UpgradeContext::new(
                &candidate.recipe,
                &candidate.next_version,
                &candidate.maintainer,
            );
            pipeline.process(&mut ctx);
            self.rollback_after(&ctx);
            aggregator.record(&ctx)?;
        }

        aggregator.write_statistics()?;
        info!("{}", aggregator.statistics().summary_text().trim_end());
        aggregator.send_status_mail();

        Ok(aggregator.statistics().clone())
    }

    /// Puts the shared tree on a fresh upgrades branch off the latest
    /// master. Failures here poison every later attempt, so they abort the
    /// run.
    fn prepare_master(&self) -> Result<()> {
        info!("refreshing {MASTER_BRANCH} and recreating the work branch");
        self.vcs
            .reset_hard(0)
            .context("failed resetting the working tree")?;
        self.vcs
            .clean_untracked()
            .context("failed cleaning the working tree")?;
        self.vcs
            .checkout_branch(MASTER_BRANCH)
            .context("failed checking out master")?;
        // Stale work branch from a previous run, if any.
        let _ = self.vcs.delete_branch(UPGRADES_BRANCH);
        self.vcs.pull().context("failed pulling latest master")?;
        self.vcs
            .create_branch(UPGRADES_BRANCH)
            .context("failed creating the work branch")?;
        Ok(())
    }

    /// Optionally clears the shared-state and tmp caches so every scan run
    /// rebuilds from a known baseline. Missing directories are fine.
    fn prepare_build_area(&self) {
        let mut targets = Vec::new();
        if self.config.clean_sstate {
            targets.push(self.config.build_dir().join("sstate-cache"));
        }
        if self.config.clean_tmp {
            targets.push(self.config.build_dir().join("tmp"));
        }
        for target in targets {
            if !target.exists() {
                continue;
            }
            info!(path = %target.display(), "removing build cache");
            if let Err(err) = fs::remove_dir_all(&target) {
                warn!(path = %target.display(), %err, "failed removing build cache");
            }
        }
    }

    /// Unwinds the upgrade commit when the run is configured to keep the
    /// branch shallow, or when a failed attempt still produced one. The
    /// patch artifact in the workdir survives either way.
    fn rollback_after(&self, ctx: &UpgradeContext) {
        let committed = ctx.patch_file.is_some();
        let drop_commit = (ctx.succeeded() && self.config.drop_previous_commits)
            || (ctx.failed() && committed);
        if !drop_commit || !committed {
            return;
        }
        if let Err(err) = self.vcs.reset_hard(1) {
            warn!(recipe = %ctx.recipe, %err, "failed dropping the upgrade commit");
            return;
        }
        if let Err(err) = self.vcs.clean_untracked() {
            warn!(recipe = %ctx.recipe, %err, "failed cleaning after rollback");
        }
    }
}
