use tracing::{error, info, warn};

use auh_core::{BenignStop, BuildSystem, RunConfig, UpgradeFailure, VersionControl};

use crate::context::{parse_build_env, UpgradeContext};
use crate::layout::RunLayout;
use crate::recipe::{classify_source, handler_for};

const UPGRADES_BRANCH: &str = "upgrades";
const SCRATCH_BRANCH: &str = "remove_patches";
const NOTHING_TO_COMMIT_MARKER: &str = "nothing to commit";

/// Whether the pipeline proceeds to the next step or stops without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFlow {
    Continue,
    Stop(BenignStop),
}

type StepFn<'p> = fn(&StepPipeline<'p>, &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure>;

/// Runs one recipe through the ordered upgrade steps and finalizes the
/// attempt with a commit regardless of how the steps ended. Holds no
/// per-recipe state; everything mutable lives in the context.
pub struct StepPipeline<'a> {
    pub vcs: &'a dyn VersionControl,
    pub build: &'a dyn BuildSystem,
    pub config: &'a RunConfig,
    pub layout: &'a RunLayout,
}

impl<'p> StepPipeline<'p> {
    pub fn process(&self, ctx: &mut UpgradeContext) {
        info!(
            recipe = %ctx.recipe,
            version = %ctx.target_version,
            maintainer = %ctx.maintainer,
            "starting upgrade attempt"
        );

        // The step sequence every recipe walks. A step's banner is logged
        // before it runs; steps without one log their own progress.
        let steps: &[(StepFn<'p>, Option<&str>)] = &[
            (Self::create_workdir, None),
            (Self::load_env, Some("Loading environment ...")),
            (Self::check_current, None),
            (Self::ensure_clean_tree, None),
            (Self::prepare_branch, None),
            (Self::classify, Some("Detecting source location ...")),
            (Self::unpack_original, Some("Unpacking current sources ...")),
            (Self::rename, Some("Renaming recipe ...")),
            (Self::clean_all, Some("Cleaning previous build artifacts ...")),
            (Self::fetch_new, Some("Fetching upgraded sources ...")),
            (Self::compile, None),
        ];

        for (step, banner) in steps {
            if let Some(banner) = banner {
                info!(recipe = %ctx.recipe, "{banner}");
            }
            match step(self, ctx) {
                Ok(StepFlow::Continue) => {}
                Ok(StepFlow::Stop(stop)) => {
                    info!(recipe = %ctx.recipe, "{}", stop.describe());
                    ctx.stop = Some(stop);
                    break;
                }
                Err(failure) => {
                    error!(recipe = %ctx.recipe, %failure, "upgrade step failed");
                    ctx.error = Some(failure);
                    break;
                }
            }
        }

        self.finalize_commit(ctx);
    }

    fn create_workdir(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        ctx.workdir = self
            .layout
            .ensure_recipe_workdir(&ctx.recipe)
            .map_err(|err| UpgradeFailure::Environment(err.to_string()))?;
        Ok(StepFlow::Continue)
    }

    fn load_env(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        self.reload_env(ctx)?;
        Ok(StepFlow::Continue)
    }

    /// Re-runs the environment dump; needed again after the rename step
    /// rewrites the recipe metadata.
    fn reload_env(&self, ctx: &mut UpgradeContext) -> Result<(), UpgradeFailure> {
        let dump = self.build.env(&ctx.recipe)?;
        ctx.env = parse_build_env(&dump);
        let recipe_file = ctx
            .env
            .get("FILE")
            .ok_or_else(|| {
                UpgradeFailure::Environment(format!(
                    "environment for {} carries no recipe file path",
                    ctx.recipe
                ))
            })?;
        ctx.recipe_dir = std::path::Path::new(recipe_file)
            .parent()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_default();
        Ok(())
    }

    fn check_current(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        match ctx.env.get("PV") {
            Some(current) if *current == ctx.target_version => {
                Ok(StepFlow::Stop(BenignStop::AlreadyCurrent))
            }
            _ => Ok(StepFlow::Continue),
        }
    }

    fn ensure_clean_tree(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        let status = self.vcs.status().map_err(UpgradeFailure::Tool)?;
        if !status.trim().is_empty() {
            warn!(recipe = %ctx.recipe, "working tree is dirty, discarding leftovers");
            self.vcs.reset_hard(0).map_err(UpgradeFailure::Tool)?;
            self.vcs.clean_untracked().map_err(UpgradeFailure::Tool)?;
            self.reload_env(ctx)?;
        }
        Ok(StepFlow::Continue)
    }

    fn prepare_branch(&self, _ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        if self.vcs.checkout_branch(UPGRADES_BRANCH).is_err() {
            self.vcs
                .create_branch(UPGRADES_BRANCH)
                .map_err(UpgradeFailure::Tool)?;
        }
        // Scratch branch from an interrupted earlier run, if any.
        let _ = self.vcs.delete_branch(SCRATCH_BRANCH);
        Ok(StepFlow::Continue)
    }

    fn classify(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        let src_uri = ctx.env.get("SRC_URI").map(String::as_str).unwrap_or("");
        match classify_source(src_uri) {
            Some(kind) => {
                ctx.source = Some(kind);
                Ok(StepFlow::Continue)
            }
            None => Ok(StepFlow::Stop(BenignStop::UnsupportedSource)),
        }
    }

    fn unpack_original(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        let handler = self.handler(ctx)?;
        handler
            .unpack(self.build, ctx)
            .map_err(UpgradeFailure::Fetch)?;
        Ok(StepFlow::Continue)
    }

    fn rename(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        self.build
            .rename(&ctx.recipe, &ctx.target_version)
            .map_err(UpgradeFailure::Tool)?;
        self.reload_env(ctx)?;
        Ok(StepFlow::Continue)
    }

    fn clean_all(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        self.build
            .cleanall(&ctx.recipe)
            .map_err(UpgradeFailure::Tool)?;
        Ok(StepFlow::Continue)
    }

    fn fetch_new(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        let handler = self.handler(ctx)?;
        handler
            .fetch(self.build, ctx)
            .map_err(UpgradeFailure::Fetch)?;
        Ok(StepFlow::Continue)
    }

    fn compile(&self, ctx: &mut UpgradeContext) -> Result<StepFlow, UpgradeFailure> {
        if self.config.skip_compilation {
            warn!(recipe = %ctx.recipe, "compilation disabled, upgrade is untested");
            return Ok(StepFlow::Continue);
        }
        let handler = self.handler(ctx)?;
        for machine in &self.config.machines {
            info!(recipe = %ctx.recipe, %machine, "Compiling ...");
            handler
                .compile(self.build, ctx, machine)
                .map_err(|cause| UpgradeFailure::Compile {
                    machine: machine.clone(),
                    cause,
                })?;
            ctx.compiled_machines.push(machine.clone());
        }
        Ok(StepFlow::Continue)
    }

    fn handler(
        &self,
        ctx: &UpgradeContext,
    ) -> Result<&'static dyn crate::recipe::RecipeSource, UpgradeFailure> {
        let kind = ctx.source.ok_or_else(|| {
            UpgradeFailure::Environment(format!(
                "source location of {} was never classified",
                ctx.recipe
            ))
        })?;
        Ok(handler_for(kind))
    }

    /// Commits whatever the attempt left behind, even after a failure, so
    /// partial metadata edits are preserved on the work branch for triage.
    /// A clean tree is the common case for skipped and early-failed
    /// recipes and is not an error.
    fn finalize_commit(&self, ctx: &mut UpgradeContext) {
        let message = match ctx.source {
            Some(kind) => handler_for(kind).commit_message(ctx),
            None => format!("{}: upgrade to {}", ctx.recipe, ctx.target_version),
        };

        match self.vcs.commit(&message, &self.config.author()) {
            Ok(()) => {}
            Err(err) if err.output_contains(NOTHING_TO_COMMIT_MARKER) => {
                info!(recipe = %ctx.recipe, "no changes to commit");
                return;
            }
            Err(err) => {
                error!(recipe = %ctx.recipe, %err, "failed committing upgrade");
                if ctx.error.is_none() {
                    ctx.error = Some(UpgradeFailure::Tool(err));
                }
                return;
            }
        }

        match self.vcs.create_patch(&ctx.workdir) {
            Ok(reported) => {
                let path = std::path::PathBuf::from(reported.trim());
                let present = !reported.trim().is_empty()
                    && path
                        .metadata()
                        .map(|meta| meta.len() > 0)
                        .unwrap_or(false);
                if present {
                    ctx.patch_file = Some(path);
                } else if ctx.error.is_none() {
                    ctx.error = Some(UpgradeFailure::PatchMissing);
                }
            }
            Err(err) => {
                error!(recipe = %ctx.recipe, %err, "failed extracting patch");
                if ctx.error.is_none() {
                    ctx.error = Some(UpgradeFailure::Tool(err));
                }
            }
        }
    }
}
