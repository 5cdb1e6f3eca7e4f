use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tempfile::TempDir;

use auh_core::{
    AttemptStatus, BenignStop, BuildSystem, Notifier, OutgoingMessage, RunConfig, ToolError,
    ToolResult, VersionControl,
};
use auh_history::HistoryStore;

use super::{
    classify_source, parse_build_env, CandidateSource, ExplicitList, RunLayout, SourceKind,
    StepPipeline, UpgradeContext, UpgradeRun, UpstreamScan,
};

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 28).expect("valid date")
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum PatchMode {
    #[default]
    Written,
    EmptyFile,
    PathOnly,
}

#[derive(Default)]
struct FakeVcs {
    calls: RefCell<Vec<String>>,
    status_output: RefCell<String>,
    nothing_to_commit: Cell<bool>,
    fail_patch: Cell<bool>,
    patch_mode: Cell<PatchMode>,
}

impl FakeVcs {
    fn called(&self, prefix: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|call| call.starts_with(prefix))
    }
}

impl VersionControl for FakeVcs {
    fn status(&self) -> ToolResult<String> {
        self.calls.borrow_mut().push("status".to_string());
        Ok(self.status_output.borrow().clone())
    }

    fn checkout_branch(&self, name: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("checkout {name}"));
        Ok(())
    }

    fn create_branch(&self, name: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("branch {name}"));
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("delete {name}"));
        Ok(())
    }

    fn reset_hard(&self, commits_back: u32) -> ToolResult<()> {
        self.calls
            .borrow_mut()
            .push(format!("reset_hard {commits_back}"));
        Ok(())
    }

    fn clean_untracked(&self) -> ToolResult<()> {
        self.calls.borrow_mut().push("clean".to_string());
        Ok(())
    }

    fn commit(&self, message: &str, _author: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("commit {message}"));
        if self.nothing_to_commit.get() {
            return Err(ToolError::new(
                "git",
                "commit",
                "nothing to commit, working tree clean",
                "nothing to commit, working tree clean",
            ));
        }
        Ok(())
    }

    fn create_patch(&self, out_dir: &Path) -> ToolResult<String> {
        self.calls.borrow_mut().push("create_patch".to_string());
        if self.fail_patch.get() {
            return Err(ToolError::new(
                "git",
                "format-patch",
                "unable to write patch",
                "fatal: could not create leading directories\n",
            ));
        }
        let path = out_dir.join("0001-upgrade.patch");
        match self.patch_mode.get() {
            PatchMode::Written => {
                fs::write(&path, "diff --git a b\n").map_err(|err| {
                    ToolError::new("git", "format-patch", err.to_string(), "")
                })?;
            }
            PatchMode::EmptyFile => {
                fs::write(&path, "").map_err(|err| {
                    ToolError::new("git", "format-patch", err.to_string(), "")
                })?;
            }
            PatchMode::PathOnly => {}
        }
        Ok(path.display().to_string())
    }

    fn last_commit(&self, _branch: &str) -> ToolResult<String> {
        Ok("abc123".to_string())
    }

    fn pull(&self) -> ToolResult<()> {
        self.calls.borrow_mut().push("pull".to_string());
        Ok(())
    }
}

fn env_dump(pv: &str, src_uri: &str) -> String {
    format!(
        "FILE=\"/meta/recipes-core/demo/demo_{pv}.bb\"\nPV=\"{pv}\"\nSRC_URI=\"{src_uri}\"\n"
    )
}

#[derive(Default)]
struct FakeBuild {
    env_dumps: RefCell<BTreeMap<String, String>>,
    edges: Vec<(String, String)>,
    fail_fetch: BTreeSet<String>,
    fail_compile: BTreeSet<String>,
    report: Option<PathBuf>,
    calls: RefCell<Vec<String>>,
}

impl FakeBuild {
    fn with_env(self, recipe: &str, dump: String) -> Self {
        self.env_dumps.borrow_mut().insert(recipe.to_string(), dump);
        self
    }

    fn called(&self, prefix: &str) -> bool {
        self.calls
            .borrow()
            .iter()
            .any(|call| call.starts_with(prefix))
    }
}

impl BuildSystem for FakeBuild {
    fn env(&self, recipe: &str) -> ToolResult<String> {
        self.calls.borrow_mut().push(format!("env {recipe}"));
        Ok(self
            .env_dumps
            .borrow()
            .get(recipe)
            .cloned()
            .unwrap_or_else(|| env_dump("1.0", "https://example.com/demo-1.0.tar.gz")))
    }

    fn upstream_check(&self, _targets: &[String]) -> ToolResult<PathBuf> {
        self.calls.borrow_mut().push("upstream_check".to_string());
        self.report
            .clone()
            .ok_or_else(|| ToolError::new("bitbake", "checkpkg", "no report configured", ""))
    }

    fn dependency_edges(&self, recipes: &[String]) -> ToolResult<Vec<(String, String)>> {
        self.calls
            .borrow_mut()
            .push(format!("dependency_edges {}", recipes.join(",")));
        Ok(self.edges.clone())
    }

    fn unpack(&self, recipe: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("unpack {recipe}"));
        Ok(())
    }

    fn fetch(&self, recipe: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("fetch {recipe}"));
        if self.fail_fetch.contains(recipe) {
            return Err(ToolError::new(
                "bitbake",
                "fetch",
                format!("fetch of {recipe} failed"),
                "Fetcher failure: Unable to find file\n",
            ));
        }
        Ok(())
    }

    fn cleanall(&self, recipe: &str) -> ToolResult<()> {
        self.calls.borrow_mut().push(format!("cleanall {recipe}"));
        Ok(())
    }

    fn rename(&self, recipe: &str, new_version: &str) -> ToolResult<()> {
        self.calls
            .borrow_mut()
            .push(format!("rename {recipe} {new_version}"));
        Ok(())
    }

    fn compile(&self, recipe: &str, machine: &str) -> ToolResult<()> {
        self.calls
            .borrow_mut()
            .push(format!("compile {recipe} {machine}"));
        if self.fail_compile.contains(recipe) {
            return Err(ToolError::new(
                "bitbake",
                "compile",
                format!("build of {recipe} failed"),
                "ERROR: Task do_compile failed\n",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeNotifier {
    sent: RefCell<Vec<OutgoingMessage>>,
}

impl Notifier for FakeNotifier {
    fn send(&self, message: &OutgoingMessage) -> ToolResult<()> {
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }
}

struct Fixture {
    _dir: TempDir,
    config: RunConfig,
    layout: RunLayout,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("must create temp dir");
        let mut config = RunConfig::new(dir.path());
        config.machines = vec!["qemux86".to_string()];
        let layout =
            RunLayout::create(config.helper_dir(), run_date()).expect("must create layout");
        Self {
            _dir: dir,
            config,
            layout,
        }
    }

    fn pipeline<'a>(&'a self, vcs: &'a FakeVcs, build: &'a FakeBuild) -> StepPipeline<'a> {
        StepPipeline {
            vcs,
            build,
            config: &self.config,
            layout: &self.layout,
        }
    }
}

#[test]
fn build_env_parsing_takes_first_assignment_and_strips_quotes() {
    let env = parse_build_env("PV=\"1.0\"\nPV=\"9.9\"\n# comment line\nbad key=1\nSRC_URI=git://host/repo\n");
    assert_eq!(env.get("PV").map(String::as_str), Some("1.0"));
    assert_eq!(env.get("SRC_URI").map(String::as_str), Some("git://host/repo"));
    assert!(!env.contains_key("bad key"));
}

#[test]
fn source_classification_prefers_archives_over_scm() {
    assert_eq!(
        classify_source("https://example.com/a.tar.gz"),
        Some(SourceKind::Archive)
    );
    assert_eq!(classify_source("git://host/repo;branch=main"), Some(SourceKind::Scm));
    assert_eq!(
        classify_source("git://host/repo https://example.com/extra.patch"),
        Some(SourceKind::Archive)
    );
    assert_eq!(classify_source("svn://host/repo"), None);
}

#[test]
fn current_version_stops_early_without_touching_sources() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let build =
        FakeBuild::default().with_env("demo", env_dump("2.0", "https://example.com/d.tar.gz"));

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.skipped());
    assert_eq!(ctx.stop, Some(BenignStop::AlreadyCurrent));
    assert_eq!(ctx.attempt_status(), AttemptStatus::UpgradeNotNeeded);
    assert!(!build.called("unpack"));
    assert!(vcs.called("commit"));
}

#[test]
fn unsupported_source_scheme_is_a_skip_not_a_failure() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let build = FakeBuild::default().with_env("demo", env_dump("1.0", "svn://host/repo"));

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.skipped());
    assert_eq!(ctx.stop, Some(BenignStop::UnsupportedSource));
    assert!(!build.called("unpack"));
}

#[test]
fn fetch_failure_skips_compile_but_still_commits() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let mut build = FakeBuild::default();
    build.fail_fetch.insert("demo".to_string());

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.failed());
    assert_eq!(ctx.attempt_status(), AttemptStatus::FetchError);
    assert!(!build.called("compile"));
    assert!(vcs.called("commit"));
}

#[test]
fn compile_failure_names_the_machine() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let mut build = FakeBuild::default();
    build.fail_compile.insert("demo".to_string());

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.failed());
    assert_eq!(ctx.attempt_status(), AttemptStatus::CompileError);
    let rendered = ctx.error.as_ref().expect("compile failure").to_string();
    assert!(rendered.contains("qemux86"));
}

#[test]
fn successful_upgrade_produces_a_patch() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.succeeded());
    assert_eq!(ctx.compiled_machines, vec!["qemux86".to_string()]);
    let patch = ctx.patch_file.as_ref().expect("patch artifact");
    assert!(patch.is_file());
    assert!(build.called("rename demo 2.0"));
    assert!(build.called("cleanall demo"));
}

#[test]
fn skip_compilation_still_succeeds_without_compiling() {
    let mut fixture = Fixture::new();
    fixture.config.skip_compilation = true;
    let vcs = FakeVcs::default();
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.succeeded());
    assert!(ctx.compiled_machines.is_empty());
    assert!(!build.called("compile"));
}

#[test]
fn clean_tree_with_nothing_to_commit_is_benign() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    vcs.nothing_to_commit.set(true);
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.succeeded());
    assert!(ctx.patch_file.is_none());
    assert!(!vcs.called("create_patch"));
}

#[test]
fn commit_without_patch_artifact_is_a_failure() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    vcs.patch_mode.set(PatchMode::PathOnly);
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.failed());
    assert_eq!(ctx.attempt_status(), AttemptStatus::PatchMissing);
}

#[test]
fn empty_patch_artifact_is_a_failure() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    vcs.patch_mode.set(PatchMode::EmptyFile);
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert_eq!(ctx.attempt_status(), AttemptStatus::PatchMissing);
}

#[test]
fn dirty_tree_is_discarded_before_upgrading() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    *vcs.status_output.borrow_mut() = " M meta/recipes-core/demo/demo_1.0.bb\n".to_string();
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(vcs.called("reset_hard 0"));
    assert!(vcs.called("clean"));
    assert!(ctx.succeeded());
}

#[test]
fn explicit_run_orders_by_dependency_and_isolates_failures() {
    let fixture = Fixture::new();
    let mut config = fixture.config.clone();
    config.send_emails = true;
    config.status_recipients = vec!["status@example.com".to_string()];

    let vcs = FakeVcs::default();
    let mut build = FakeBuild::default();
    build.edges = vec![("alpha".to_string(), "beta".to_string())];
    build.fail_fetch.insert("alpha".to_string());
    let notifier = FakeNotifier::default();
    let history = HistoryStore::open(config.helper_dir());

    let run = UpgradeRun {
        vcs: &vcs,
        build: &build,
        notifier: Some(&notifier),
        config: &config,
        history: &history,
        layout: &fixture.layout,
    };
    let source = ExplicitList::new(vec![
        (
            "alpha".to_string(),
            "2.0".to_string(),
            "dev@example.com".to_string(),
        ),
        (
            "beta".to_string(),
            "3.1".to_string(),
            "dev@example.com".to_string(),
        ),
    ]);

    let stats = run.execute(&source, run_date()).expect("run must complete");
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);

    // beta is alpha's dependency, so it is attempted first.
    let calls = build.calls.borrow();
    let beta_fetch = calls.iter().position(|call| call == "fetch beta");
    let alpha_fetch = calls.iter().position(|call| call == "fetch alpha");
    assert!(beta_fetch.expect("beta fetched") < alpha_fetch.expect("alpha fetched"));
    drop(calls);

    let records = history.load().expect("must load ledger");
    assert_eq!(
        records["alpha"].status(),
        Some(AttemptStatus::FetchError)
    );
    assert_eq!(records["beta"].status(), Some(AttemptStatus::Succeeded));

    assert!(fixture.layout.mail_artifact_path("beta").is_file());
    assert!(fixture.layout.statistics_path().is_file());
    assert!(fixture
        .layout
        .run_dir()
        .join("recipes/succeeded/beta")
        .symlink_metadata()
        .is_ok());
    assert!(fixture
        .layout
        .run_dir()
        .join("recipes/failed/alpha")
        .symlink_metadata()
        .is_ok());

    let sent = notifier.sent.borrow();
    assert!(sent
        .iter()
        .any(|message| message.subject.contains("alpha") && message.subject.contains("FAILED")));
    assert!(sent
        .iter()
        .any(|message| message.subject.contains("beta") && message.subject.contains("SUCCEEDED")));
    assert!(sent
        .iter()
        .any(|message| message.subject.starts_with("[AUH] Upgrade status:")));
}

#[test]
fn failed_attempts_roll_the_upgrade_commit_back() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let mut build = FakeBuild::default();
    build.fail_compile.insert("demo".to_string());
    let history = HistoryStore::open(fixture.config.helper_dir());

    let run = UpgradeRun {
        vcs: &vcs,
        build: &build,
        notifier: None,
        config: &fixture.config,
        history: &history,
        layout: &fixture.layout,
    };
    let source = ExplicitList::new(vec![(
        "demo".to_string(),
        "2.0".to_string(),
        "dev@example.com".to_string(),
    )]);
    run.execute(&source, run_date()).expect("run must complete");

    assert!(vcs.called("reset_hard 1"));
}

#[test]
fn patch_extraction_rejection_keeps_the_tool_diagnostics() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    vcs.fail_patch.set(true);
    let build = FakeBuild::default();

    let mut ctx = UpgradeContext::new("demo", "2.0", "dev@example.com");
    fixture.pipeline(&vcs, &build).process(&mut ctx);

    assert!(ctx.failed());
    assert_eq!(ctx.attempt_status(), AttemptStatus::UnknownError);
    let failure = ctx.error.as_ref().expect("patch extraction failure");
    assert!(failure
        .diagnostics()
        .expect("captured output")
        .contains("could not create leading directories"));
}

fn report_row(recipe: &str, next_version: &str, maintainer: &str) -> String {
    let mut columns = vec![""; 16];
    columns[0] = recipe;
    columns[1] = "1.0";
    columns[2] = next_version;
    columns[11] = "UPDATE";
    columns[14] = maintainer;
    columns.join("\t")
}

#[test]
fn scan_run_prepares_master_and_applies_selection() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();

    let report_path = fixture.layout.helper_dir().join("checkpkg.csv");
    fs::write(
        &report_path,
        format!(
            "header\n{}\n{}\n",
            report_row("zlib", "2.0", "dev@example.com"),
            report_row("zlib-native", "2.0", "dev@example.com"),
        ),
    )
    .expect("must write report");

    let mut build = FakeBuild::default();
    build.report = Some(report_path);
    let history = HistoryStore::open(fixture.config.helper_dir());
    let run = UpgradeRun {
        vcs: &vcs,
        build: &build,
        notifier: None,
        config: &fixture.config,
        history: &history,
        layout: &fixture.layout,
    };

    let stats = run
        .execute(&UpstreamScan, run_date())
        .expect("run must complete");
    assert_eq!(stats.attempted, 1);
    assert_eq!(stats.succeeded, 1);

    let calls = vcs.calls.borrow();
    let position = |call: &str| {
        calls
            .iter()
            .position(|entry| entry == call)
            .expect("call recorded")
    };
    assert!(position("reset_hard 0") < position("checkout master"));
    assert!(position("checkout master") < position("pull"));
    assert!(position("delete upgrades") < position("pull"));
    assert!(position("pull") < position("branch upgrades"));
    drop(calls);

    assert!(build.called("upstream_check"));
    assert!(build.called("fetch zlib"));
    assert!(!build.called("env zlib-native"));

    let records = history.load().expect("must load ledger");
    assert_eq!(records["zlib"].status(), Some(AttemptStatus::Succeeded));
    assert!(!records.contains_key("zlib-native"));
}

#[test]
fn dependency_cycle_aborts_before_any_pipeline_work() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();
    let mut build = FakeBuild::default();
    build.edges = vec![
        ("alpha".to_string(), "beta".to_string()),
        ("beta".to_string(), "alpha".to_string()),
    ];
    let history = HistoryStore::open(fixture.config.helper_dir());
    let run = UpgradeRun {
        vcs: &vcs,
        build: &build,
        notifier: None,
        config: &fixture.config,
        history: &history,
        layout: &fixture.layout,
    };
    let source = ExplicitList::new(vec![
        (
            "alpha".to_string(),
            "2.0".to_string(),
            "dev@example.com".to_string(),
        ),
        (
            "beta".to_string(),
            "3.0".to_string(),
            "dev@example.com".to_string(),
        ),
    ]);

    let err = run
        .execute(&source, run_date())
        .expect_err("cycle must abort the run");
    assert!(err.to_string().contains("circular dependency"));
    assert!(!build.called("env"));
    assert!(!vcs.called("commit"));
    assert!(history.load().expect("must load ledger").is_empty());
}

#[test]
fn upstream_scan_reuses_a_same_day_report() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();

    let report_path = fixture.layout.helper_dir().join("checkpkg.csv");
    fs::write(
        &report_path,
        "header\ndemo\t1.0\t2.0\t\t\t\t\t\t\t\t\tUPDATE\t\t\tdev@example.com\t\n",
    )
    .expect("must write report");
    fs::write(
        fixture.layout.scan_cache_path(),
        format!("2026-08-28,abc123,{}\n", report_path.display()),
    )
    .expect("must write cache marker");

    let build = FakeBuild::default();
    let scan = UpstreamScan;
    let candidates = scan
        .gather(&vcs, &build, &fixture.layout, run_date())
        .expect("must gather");

    assert!(!build.called("upstream_check"));
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].recipe, "demo");
    assert_eq!(candidates[0].next_version, "2.0");
}

#[test]
fn upstream_scan_runs_the_check_when_the_cache_is_stale() {
    let fixture = Fixture::new();
    let vcs = FakeVcs::default();

    let report_path = fixture.layout.helper_dir().join("checkpkg.csv");
    fs::write(&report_path, "header\n").expect("must write report");
    fs::write(
        fixture.layout.scan_cache_path(),
        format!("2026-08-01,old-head,{}\n", report_path.display()),
    )
    .expect("must write cache marker");

    let mut build = FakeBuild::default();
    build.report = Some(report_path.clone());
    let scan = UpstreamScan;
    scan.gather(&vcs, &build, &fixture.layout, run_date())
        .expect("must gather");

    assert!(build.called("upstream_check"));
    let marker = fs::read_to_string(fixture.layout.scan_cache_path()).expect("must read marker");
    assert!(marker.starts_with("2026-08-28,abc123,"));
}
