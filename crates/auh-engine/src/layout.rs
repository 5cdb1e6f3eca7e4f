use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;

const WORK_DIR_NAME: &str = "work";
const RECIPES_DIR_NAME: &str = "recipes";
const STATISTICS_FILE_NAME: &str = "statistics.json";
const SCAN_CACHE_FILE_NAME: &str = "last_checkpkg_run";

/// Outcome buckets the run directory sorts recipes into, via symbolic
/// links back to the per-recipe workdirs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeBucket {
    All,
    Succeeded,
    Failed,
}

impl OutcomeBucket {
    fn dir_name(self) -> &'static str {
        match self {
            OutcomeBucket::All => "all",
            OutcomeBucket::Succeeded => "succeeded",
            OutcomeBucket::Failed => "failed",
        }
    }
}

/// On-disk layout of one run: per-recipe workdirs, outcome link farms and
/// the statistics summary, all under `<helper_dir>/work/<date>`.
#[derive(Debug, Clone)]
pub struct RunLayout {
    helper_dir: PathBuf,
    run_dir: PathBuf,
}

impl RunLayout {
    pub fn create(helper_dir: impl Into<PathBuf>, run_date: NaiveDate) -> Result<Self> {
        let helper_dir = helper_dir.into();
        let run_dir = helper_dir
            .join(WORK_DIR_NAME)
            .join(run_date.format("%Y-%m-%d").to_string());

        for bucket in [
            OutcomeBucket::All,
            OutcomeBucket::Succeeded,
            OutcomeBucket::Failed,
        ] {
            let bucket_dir = run_dir.join(RECIPES_DIR_NAME).join(bucket.dir_name());
            fs::create_dir_all(&bucket_dir).with_context(|| {
                format!("failed creating run directory: {}", bucket_dir.display())
            })?;
        }

        Ok(Self {
            helper_dir,
            run_dir,
        })
    }

    pub fn helper_dir(&self) -> &Path {
        &self.helper_dir
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn recipe_workdir(&self, recipe: &str) -> PathBuf {
        self.run_dir.join(recipe)
    }

    /// Creates the workdir for one recipe, clearing leftover files from a
    /// previous attempt on the same day.
    pub fn ensure_recipe_workdir(&self, recipe: &str) -> Result<PathBuf> {
        let workdir = self.recipe_workdir(recipe);
        if workdir.exists() {
            for entry in fs::read_dir(&workdir)
                .with_context(|| format!("failed reading workdir: {}", workdir.display()))?
            {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fs::remove_file(entry.path()).with_context(|| {
                        format!("failed clearing workdir file: {}", entry.path().display())
                    })?;
                }
            }
        } else {
            fs::create_dir_all(&workdir)
                .with_context(|| format!("failed creating workdir: {}", workdir.display()))?;
        }
        Ok(workdir)
    }

    /// Links a recipe workdir into an outcome bucket. Re-linking the same
    /// recipe replaces the previous link.
    pub fn link_outcome(&self, recipe: &str, bucket: OutcomeBucket) -> Result<()> {
        let link = self
            .run_dir
            .join(RECIPES_DIR_NAME)
            .join(bucket.dir_name())
            .join(recipe);
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link)
                .with_context(|| format!("failed replacing outcome link: {}", link.display()))?;
        }

        let target = Path::new("..").join("..").join(recipe);
        symlink(&target, &link)
            .with_context(|| format!("failed creating outcome link: {}", link.display()))
    }

    pub fn statistics_path(&self) -> PathBuf {
        self.run_dir.join(STATISTICS_FILE_NAME)
    }

    pub fn mail_artifact_path(&self, recipe: &str) -> PathBuf {
        self.recipe_workdir(recipe).join(format!("mail_{recipe}.txt"))
    }

    /// Cache marker for the upstream scan, shared across runs.
    pub fn scan_cache_path(&self) -> PathBuf {
        self.helper_dir.join(SCAN_CACHE_FILE_NAME)
    }
}
