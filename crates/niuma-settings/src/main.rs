//! NiuMa settings tool entry point.
//!
//! Reads and edits the NiuMa timer extension's persisted settings from the
//! command line.  Settings live in a JSON store file; where that file is and
//! how malformed values are treated comes from a TOML config file.
//!
//! # Usage
//!
//! ```text
//! niuma-settings [OPTIONS] <COMMAND>
//!
//! Commands:
//!   show                     Print every setting as JSON
//!   get <KEY>                Print one setting
//!   set <KEY> <VALUE>        Set one setting (VALUE is JSON or a bare word)
//!   reset [KEY]              Restore one default, or all of them
//!   keys                     List the setting keys
//!   tag add <work|fun> <DOMAIN>
//!   tag remove <DOMAIN>
//!   tag list
//!   classify <HOST>          Report whether HOST is work, fun or neither
//!   init-config [--force]    Write a default config file
//!
//! Options:
//!   --config <PATH>   Config file  [env: NIUMA_CONFIG]
//!   --store <PATH>    Store file, overrides the config  [env: NIUMA_STORE]
//! ```
//!
//! Logs go to stderr; command output goes to stdout as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use niuma_core::{keys, Tag};
use niuma_settings::application::manage_settings::SettingsService;
use niuma_settings::application::manage_tags::{add_domain, classify, remove_domain};
use niuma_settings::infrastructure::storage::config::{
    config_dir, config_file_path, load_config_from, save_config_to, AppConfig,
};
use niuma_settings::infrastructure::storage::json_file::JsonFileStore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Inspect and edit NiuMa timer settings.
#[derive(Debug, Parser)]
#[command(
    name = "niuma-settings",
    about = "Inspect and edit the NiuMa timer extension's persisted settings",
    version
)]
struct Cli {
    /// Path of the TOML config file.
    ///
    /// Defaults to `config.toml` in the platform config directory.
    #[arg(long, env = "NIUMA_CONFIG")]
    config: Option<PathBuf>,

    /// Path of the JSON settings store.  Takes precedence over `storage.path`
    /// in the config file.
    #[arg(long, env = "NIUMA_STORE")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every setting as JSON.
    Show,
    /// Print the value of one setting.
    Get { key: String },
    /// Set one setting.  VALUE is parsed as JSON, or taken as a string.
    Set { key: String, value: String },
    /// Restore the default of KEY, or of every setting.
    Reset { key: Option<String> },
    /// List the setting keys.
    Keys,
    /// Manage the work/fun domain lists.
    Tag {
        #[command(subcommand)]
        action: TagCommand,
    },
    /// Report whether HOST counts as work, fun or neither.
    Classify { host: String },
    /// Write a config file with default values.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
enum TagCommand {
    /// List DOMAIN under TAG (moving it from the other tag if needed).
    Add { tag: Tag, domain: String },
    /// Remove DOMAIN from whichever tag lists it.
    Remove { domain: String },
    /// Print both lists.
    List,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config_file_path().context("no --config given")?,
    };
    // `--force` must be able to replace a config that no longer parses, so
    // this runs before the config is loaded.
    if let Command::InitConfig { force } = cli.command {
        init_tracing(&AppConfig::default().logging.level);
        return init_config(&config_path, force);
    }

    let config = load_config_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;
    init_tracing(&config.logging.level);
    debug!(config = %config_path.display(), "config loaded");

    let base_dir = match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => config_dir().context("cannot locate a directory for the store")?,
    };
    let store_path = config.store_path(cli.store.as_deref(), &base_dir);
    let store = JsonFileStore::open(&store_path)
        .with_context(|| format!("opening settings store {}", store_path.display()))?
        .with_quota(config.storage.quota());
    info!(store = %store_path.display(), "using settings store");

    let service = SettingsService::open(Arc::new(store), config.registry_options())
        .context("loading settings")?;

    run(&service, cli.command)
}

fn run(service: &SettingsService, command: Command) -> anyhow::Result<()> {
    let tags = &service.settings().domain_tags;
    match command {
        Command::Show => print_json(&service.show()),
        Command::Get { key } => print_json(&service.get(&key)?),
        Command::Set { key, value } => print_json(&service.set_from_input(&key, &value)?),
        Command::Reset { key } => {
            service.reset(key.as_deref())?;
            print_json(&service.show())
        }
        Command::Keys => print_json(&keys::ALL),
        Command::Tag { action } => match action {
            TagCommand::Add { tag, domain } => print_json(&add_domain(tags, tag, &domain)?),
            TagCommand::Remove { domain } => print_json(&remove_domain(tags, &domain)?),
            TagCommand::List => print_json(&tags.get()),
        },
        Command::Classify { host } => print_json(&classify(tags, &host)),
        Command::InitConfig { .. } => bail!("init-config does not operate on the store"),
    }
}

/// Logs to stderr at `level`; `RUST_LOG` wins when set.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    save_config_to(&AppConfig::default(), path)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "wrote default config");
    println!("{}", path.display());
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
