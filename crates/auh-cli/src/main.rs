mod config;
mod logging;
mod render;

use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use auh_engine::{CandidateSource, ExplicitList, RunLayout, UpgradeRun, UpstreamScan};
use auh_history::HistoryStore;
use auh_tools::{Bitbake, GitTree, Sendmail};

#[derive(Parser, Debug)]
#[command(name = "auh")]
#[command(about = "Automatic recipe upgrade helper", long_about = None)]
struct Cli {
    /// Recipe to upgrade, or "all" to scan the whole tree
    recipes: Vec<String>,

    /// Target version for an explicit recipe upgrade
    #[arg(short = 't', long)]
    to_version: Option<String>,

    /// Maintainer address credited with an explicit recipe upgrade
    #[arg(short = 'm', long)]
    maintainer: Option<String>,

    /// Configuration file (default: $BUILDDIR/upgrade-helper/upgrade-helper.conf)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Send notification mails
    #[arg(short = 'e', long)]
    send_emails: bool,

    /// Skip the per-machine compilation step
    #[arg(short = 's', long)]
    skip_compilation: bool,

    /// Log filter, e.g. "debug" (overrides AUH_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Print a shell completion script and exit
    #[arg(long, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut command = Cli::command();
        clap_complete::generate(shell, &mut command, "auh", &mut std::io::stdout());
        return Ok(());
    }

    logging::init(cli.log_level.as_deref());
    install_interrupt_handler();

    let build_dir = env::var("BUILDDIR")
        .map(PathBuf::from)
        .context("BUILDDIR is not set; source the build environment first")?;

    let loaded = config::load(&build_dir, cli.config.as_deref())?;
    let mut run_config = loaded.run;
    if cli.send_emails {
        run_config.send_emails = true;
    }
    if cli.skip_compilation {
        run_config.skip_compilation = true;
    }

    let source = candidate_source(&cli)?;

    let tree_root = loaded
        .layer_dir
        .or_else(|| build_dir.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| build_dir.clone());

    let today = Local::now().date_naive();
    let layout = RunLayout::create(run_config.helper_dir(), today)?;
    let history = HistoryStore::open(run_config.helper_dir());
    let vcs = GitTree::new(&tree_root);
    let build = Bitbake::new(&build_dir);
    let notifier = Sendmail::default();

    let run = UpgradeRun {
        vcs: &vcs,
        build: &build,
        notifier: Some(&notifier),
        config: &run_config,
        history: &history,
        layout: &layout,
    };
    let stats = run.execute(source.as_ref(), today)?;

    let colored = std::io::stdout().is_terminal();
    print!("{}", render::render_summary(&stats, colored));
    Ok(())
}

fn candidate_source(cli: &Cli) -> Result<Box<dyn CandidateSource>> {
    if cli.recipes.is_empty() {
        bail!("nothing to do; name a recipe or pass \"all\"");
    }
    if cli.recipes.iter().any(|recipe| recipe == "all") {
        if cli.recipes.len() > 1 || cli.to_version.is_some() {
            bail!("\"all\" scans the whole tree and takes no recipe or --to-version");
        }
        return Ok(Box::new(UpstreamScan));
    }
    if cli.recipes.len() > 1 {
        bail!("explicit upgrades take one recipe at a time");
    }

    let target_version = cli
        .to_version
        .clone()
        .context("explicit upgrades need --to-version")?;
    let maintainer = cli.maintainer.clone().unwrap_or_default();
    Ok(Box::new(ExplicitList::new(vec![(
        cli.recipes[0].clone(),
        target_version,
        maintainer,
    )])))
}

// External tools are spawned in this process group; an interrupt must
// take them down too or a half-finished bitbake keeps the tree locked.
extern "C" fn forward_interrupt(_signal: libc::c_int) {
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
        libc::kill(0, libc::SIGTERM);
    }
    std::process::exit(130);
}

fn install_interrupt_handler() {
    unsafe {
        libc::signal(libc::SIGINT, forward_interrupt as libc::sighandler_t);
    }
}
