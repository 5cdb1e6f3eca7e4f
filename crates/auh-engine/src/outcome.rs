use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use auh_core::{HistoryRecord, Notifier, OutgoingMessage, RunConfig};
use auh_history::HistoryStore;

use crate::context::UpgradeContext;
use crate::layout::{OutcomeBucket, RunLayout};
use crate::recipe::handler_for;

/// Per-maintainer success and failure counts for the run summary.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MaintainerTally {
    pub succeeded: usize,
    pub failed: usize,
}

/// Aggregate counters for one run, serialized next to the run outputs.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStatistics {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub by_maintainer: BTreeMap<String, MaintainerTally>,
}

impl RunStatistics {
    fn record(&mut self, ctx: &UpgradeContext) {
        self.attempted += 1;
        if ctx.succeeded() {
            self.succeeded += 1;
            self.tally(&ctx.maintainer).succeeded += 1;
        } else if ctx.failed() {
            self.failed += 1;
            self.tally(&ctx.maintainer).failed += 1;
        } else {
            self.skipped += 1;
        }
    }

    fn tally(&mut self, maintainer: &str) -> &mut MaintainerTally {
        self.by_maintainer
            .entry(maintainer.to_string())
            .or_default()
    }

    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Attempted {} recipe upgrade(s): {} succeeded, {} failed, {} skipped.\n",
            self.attempted, self.succeeded, self.failed, self.skipped
        );
        if !self.by_maintainer.is_empty() {
            text.push('\n');
            text.push_str("Per maintainer:\n");
            for (maintainer, tally) in &self.by_maintainer {
                let _ = writeln!(
                    text,
                    "  {maintainer}: {} succeeded, {} failed",
                    tally.succeeded, tally.failed
                );
            }
        }
        text
    }
}

/// Records the outcome of each attempt: statistics, history ledger,
/// outcome links and the per-recipe notification. Notification delivery
/// failures never fail the run; a copy of every composed message is kept
/// in the recipe workdir either way.
pub struct OutcomeAggregator<'a> {
    config: &'a RunConfig,
    layout: &'a RunLayout,
    history: &'a HistoryStore,
    notifier: Option<&'a dyn Notifier>,
    today: NaiveDate,
    stats: RunStatistics,
    status_mail_sent: bool,
}

impl<'a> OutcomeAggregator<'a> {
    pub fn new(
        config: &'a RunConfig,
        layout: &'a RunLayout,
        history: &'a HistoryStore,
        notifier: Option<&'a dyn Notifier>,
        today: NaiveDate,
    ) -> Self {
        Self {
            config,
            layout,
            history,
            notifier,
            today,
            stats: RunStatistics::default(),
            status_mail_sent: false,
        }
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.stats
    }

    pub fn record(&mut self, ctx: &UpgradeContext) -> Result<()> {
        self.stats.record(ctx);

        self.history
            .update(&HistoryRecord::new(
                &ctx.recipe,
                &ctx.target_version,
                &ctx.maintainer,
                self.today,
                ctx.attempt_status(),
            ))
            .with_context(|| format!("failed recording {} in the history ledger", ctx.recipe))?;

        self.layout.link_outcome(&ctx.recipe, OutcomeBucket::All)?;
        if ctx.succeeded() {
            self.layout
                .link_outcome(&ctx.recipe, OutcomeBucket::Succeeded)?;
        } else if ctx.failed() {
            self.layout
                .link_outcome(&ctx.recipe, OutcomeBucket::Failed)?;
        }

        self.notify(ctx);
        Ok(())
    }

    fn notify(&self, ctx: &UpgradeContext) {
        let message = self.compose_message(ctx);

        let artifact = self.layout.mail_artifact_path(&ctx.recipe);
        let mut copy = format!("Subject: {}\n\n{}", message.subject, message.body);
        for attachment in &message.attachments {
            let _ = writeln!(copy, "\n[attachment: {}]", attachment.display());
        }
        if let Err(err) = fs::write(&artifact, copy) {
            warn!(recipe = %ctx.recipe, %err, "failed keeping local message copy");
        }

        if !self.config.send_emails {
            return;
        }
        let Some(notifier) = self.notifier else {
            return;
        };
        if message.to.is_empty() {
            warn!(recipe = %ctx.recipe, "no maintainer address, not sending notification");
            return;
        }
        if let Err(err) = notifier.send(&message) {
            warn!(recipe = %ctx.recipe, %err, "failed sending notification");
        }
    }

    fn compose_message(&self, ctx: &UpgradeContext) -> OutgoingMessage {
        let verdict = if ctx.succeeded() {
            "SUCCEEDED"
        } else if ctx.failed() {
            "FAILED"
        } else {
            "SKIPPED"
        };
        let subject = format!(
            "[AUH] {}: upgrading to {} {verdict}",
            ctx.recipe, ctx.target_version
        );

        let recipient = self
            .config
            .maintainer_override
            .get(&ctx.maintainer)
            .cloned()
            .unwrap_or_else(|| ctx.maintainer.clone());
        let to = if recipient.is_empty() {
            Vec::new()
        } else {
            vec![recipient]
        };

        let mut body = String::from("Hello,\n\n");
        let _ = writeln!(
            body,
            "this is the automatic upgrade helper reporting on {} -> {}.",
            ctx.recipe, ctx.target_version
        );
        body.push('\n');

        if ctx.succeeded() {
            body.push_str("The upgrade succeeded. Please review the attached patch.\n\n");
            if !ctx.compiled_machines.is_empty() {
                let _ = writeln!(
                    body,
                    "The recipe compiled for: {}.",
                    ctx.compiled_machines.join(", ")
                );
            }
            if let Some(kind) = ctx.source {
                if let Some(diff_name) = handler_for(kind).license_diff_name() {
                    if ctx.workdir.join(diff_name).is_file() {
                        let _ = writeln!(
                            body,
                            "The license checksum changed; see the attached {diff_name}."
                        );
                    }
                }
            }
            body.push_str(
                "\nNext steps:\n  * review the patch and amend it if needed\n  \
                 * apply it with git am and submit it upstream\n",
            );
        } else if let Some(failure) = &ctx.error {
            let _ = writeln!(body, "The upgrade FAILED: {failure}.");
            if let Some(diagnostics) = failure.diagnostics() {
                if !diagnostics.trim().is_empty() {
                    body.push_str("\nCaptured tool output:\n\n");
                    body.push_str(diagnostics);
                    body.push('\n');
                }
            }
            body.push_str("\nAny partial changes were committed for triage; see the attachments.\n");
        } else if let Some(stop) = ctx.stop {
            let _ = writeln!(body, "The upgrade was skipped: {}.", stop.describe());
        }

        body.push_str("\nRegards,\nThe Upgrade Helper\n");

        let attachments = match fs::read_dir(&ctx.workdir) {
            Ok(entries) => {
                let mut files: Vec<_> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file())
                    .filter(|path| path != &self.layout.mail_artifact_path(&ctx.recipe))
                    .collect();
                files.sort();
                files
            }
            Err(_) => Vec::new(),
        };

        OutgoingMessage {
            from: self.config.author(),
            to,
            cc: self.config.status_recipients.clone(),
            subject,
            body,
            attachments,
        }
    }

    /// Serializes the run counters next to the run outputs.
    pub fn write_statistics(&self) -> Result<()> {
        let path = self.layout.statistics_path();
        let rendered = serde_json::to_string_pretty(&self.stats)
            .context("failed serializing run statistics")?;
        fs::write(&path, rendered)
            .with_context(|| format!("failed writing run statistics: {}", path.display()))
    }

    /// Sends the whole-run status summary, at most once per run.
    pub fn send_status_mail(&mut self) {
        if self.status_mail_sent || self.stats.attempted == 0 || !self.config.send_emails {
            return;
        }
        self.status_mail_sent = true;

        let Some(notifier) = self.notifier else {
            return;
        };
        if self.config.status_recipients.is_empty() {
            warn!("no status recipients configured, not sending run summary");
            return;
        }

        let message = OutgoingMessage {
            from: self.config.author(),
            to: self.config.status_recipients.clone(),
            cc: Vec::new(),
            subject: format!("[AUH] Upgrade status: {}", self.today.format("%Y-%m-%d")),
            body: self.stats.summary_text(),
            attachments: Vec::new(),
        };
        match notifier.send(&message) {
            Ok(()) => info!("run status summary sent"),
            Err(err) => warn!(%err, "failed sending run status summary"),
        }
    }
}
