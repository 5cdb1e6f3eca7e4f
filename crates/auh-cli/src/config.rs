use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use auh_core::RunConfig;

pub const CONFIG_FILE_NAME: &str = "upgrade-helper.conf";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    settings: Settings,
    maintainer_override: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Settings {
    layer_dir: Option<PathBuf>,
    from_address: Option<String>,
    machines: Option<Vec<String>>,
    blacklist: Option<Vec<String>>,
    maintainers_whitelist: Option<Vec<String>>,
    status_recipients: Option<Vec<String>>,
    cooldown_days: Option<i64>,
    drop_previous_commits: Option<bool>,
    clean_sstate: Option<bool>,
    clean_tmp: Option<bool>,
    send_emails: Option<bool>,
    skip_compilation: Option<bool>,
}

/// Run configuration plus the CLI-only extras the engine does not carry.
pub struct LoadedConfig {
    pub run: RunConfig,
    pub layer_dir: Option<PathBuf>,
}

/// Loads the TOML configuration. An explicitly named file must exist; the
/// default location is optional and silently falls back to defaults.
pub fn load(build_dir: &Path, explicit_path: Option<&Path>) -> Result<LoadedConfig> {
    let content = match explicit_path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed reading configuration: {}", path.display()))?,
        ),
        None => {
            let default_path = build_dir.join("upgrade-helper").join(CONFIG_FILE_NAME);
            match fs::read_to_string(&default_path) {
                Ok(content) => Some(content),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    info!(
                        path = %default_path.display(),
                        "no configuration file, using defaults"
                    );
                    None
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed reading configuration: {}", default_path.display())
                    });
                }
            }
        }
    };

    let parsed: FileConfig = match content {
        Some(content) => toml::from_str(&content).context("failed parsing configuration")?,
        None => FileConfig::default(),
    };

    let mut run = RunConfig::new(build_dir);
    let settings = parsed.settings;
    if let Some(from_address) = settings.from_address {
        run.from_address = from_address;
    }
    if let Some(machines) = settings.machines {
        run.machines = machines;
    }
    if let Some(blacklist) = settings.blacklist {
        run.blacklist = blacklist;
    }
    if let Some(whitelist) = settings.maintainers_whitelist {
        run.maintainers_whitelist = whitelist;
    }
    if let Some(recipients) = settings.status_recipients {
        run.status_recipients = recipients;
    }
    if let Some(cooldown) = settings.cooldown_days {
        run.cooldown_days = RunConfig::clamp_cooldown(cooldown);
    }
    if let Some(drop) = settings.drop_previous_commits {
        run.drop_previous_commits = drop;
    }
    if let Some(clean_sstate) = settings.clean_sstate {
        run.clean_sstate = clean_sstate;
    }
    if let Some(clean_tmp) = settings.clean_tmp {
        run.clean_tmp = clean_tmp;
    }
    if let Some(send_emails) = settings.send_emails {
        run.send_emails = send_emails;
    }
    if let Some(skip_compilation) = settings.skip_compilation {
        run.skip_compilation = skip_compilation;
    }
    run.maintainer_override = parsed.maintainer_override;

    Ok(LoadedConfig {
        run,
        layer_dir: settings.layer_dir,
    })
}
