use auh_core::{BuildSystem, ToolResult};

use crate::context::UpgradeContext;

/// Where a recipe's sources come from, decided once per attempt from its
/// source location list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Archive,
    Scm,
}

/// Classifies a source location list. Archive schemes win when a recipe
/// mixes both, matching how mixed recipes are fetched in practice.
pub fn classify_source(src_uri: &str) -> Option<SourceKind> {
    if src_uri.contains("http://") || src_uri.contains("https://") || src_uri.contains("ftp://") {
        Some(SourceKind::Archive)
    } else if src_uri.contains("git://") {
        Some(SourceKind::Scm)
    } else {
        None
    }
}

/// Per-source-kind behavior the pipeline delegates to. Both kinds share
/// the step sequence; only these seams differ.
pub trait RecipeSource {
    fn unpack(&self, build: &dyn BuildSystem, ctx: &UpgradeContext) -> ToolResult<()>;
    fn fetch(&self, build: &dyn BuildSystem, ctx: &UpgradeContext) -> ToolResult<()>;
    fn compile(
        &self,
        build: &dyn BuildSystem,
        ctx: &UpgradeContext,
        machine: &str,
    ) -> ToolResult<()>;
    fn commit_message(&self, ctx: &UpgradeContext) -> String;
    /// Name of the license comparison artifact, when the kind produces one.
    fn license_diff_name(&self) -> Option<&'static str>;
}

struct ArchiveRecipe;

impl RecipeSource for ArchiveRecipe {
    fn unpack(&self, build: &dyn BuildSystem, ctx: &UpgradeContext) -> ToolResult<()> {
        build.unpack(&ctx.recipe)
    }

    fn fetch(&self, build: &dyn BuildSystem, ctx: &UpgradeContext) -> ToolResult<()> {
        build.fetch(&ctx.recipe)
    }

    fn compile(
        &self,
        build: &dyn BuildSystem,
        ctx: &UpgradeContext,
        machine: &str,
    ) -> ToolResult<()> {
        build.compile(&ctx.recipe, machine)
    }

    fn commit_message(&self, ctx: &UpgradeContext) -> String {
        format!("{}: upgrade to {}", ctx.recipe, ctx.target_version)
    }

    fn license_diff_name(&self) -> Option<&'static str> {
        Some("license_diff.txt")
    }
}

struct ScmRecipe;

impl RecipeSource for ScmRecipe {
    fn unpack(&self, build: &dyn BuildSystem, ctx: &UpgradeContext) -> ToolResult<()> {
        build.unpack(&ctx.recipe)
    }

    fn fetch(&self, build: &dyn BuildSystem, ctx: &UpgradeContext) -> ToolResult<()> {
        build.fetch(&ctx.recipe)
    }

    fn compile(
        &self,
        build: &dyn BuildSystem,
        ctx: &UpgradeContext,
        machine: &str,
    ) -> ToolResult<()> {
        build.compile(&ctx.recipe, machine)
    }

    fn commit_message(&self, ctx: &UpgradeContext) -> String {
        format!(
            "{}: upgrade to {} (source control revision)",
            ctx.recipe, ctx.target_version
        )
    }

    fn license_diff_name(&self) -> Option<&'static str> {
        None
    }
}

static ARCHIVE: ArchiveRecipe = ArchiveRecipe;
static SCM: ScmRecipe = ScmRecipe;

pub fn handler_for(kind: SourceKind) -> &'static dyn RecipeSource {
    match kind {
        SourceKind::Archive => &ARCHIVE,
        SourceKind::Scm => &SCM,
    }
}
