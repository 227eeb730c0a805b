// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `offer-matrix`: inspect offer files and view-preference tokens.
//!
//! # Usage
//! ```text
//! offer-matrix render offers.json [--namespace Acme] [--hidden-token T]
//! offer-matrix token encode --hidden MR --order "a.pdf::BTA::P1"
//! offer-matrix token decode <T>
//! offer-matrix share-url https://offers.example/matrix <token> [--hidden MR]
//! offer-matrix prefs save Acme --hidden "Sporta ārsts"
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` for detail.

mod render;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use offer_app_core::config::ConfigService;
use offer_app_core::prefs::{MatrixPrefs, PrefsPort};
use offer_config_fs::FsConfigStore;
use offer_matrix::{canon, codec, ColumnKey, HiddenFeatures, OfferGroup, OrderState, ViewPreferences};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Offer comparison matrix tools")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an offers JSON file as a comparison table
    Render {
        /// JSON array of offer groups as the backend returns them
        file: PathBuf,
        /// Hidden-row token from a share link (replaces saved hidden rows)
        #[arg(long)]
        hidden_token: Option<String>,
        /// Apply preferences saved under this company name
        #[arg(long)]
        namespace: Option<String>,
        /// Config directory (defaults to the platform config dir)
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
    /// Encode or decode preference tokens
    Token {
        #[command(subcommand)]
        cmd: TokenCommand,
    },
    /// Build a share link carrying a share token and hidden rows
    ShareUrl {
        /// Page the link points at
        base: String,
        /// Share token
        token: String,
        /// Feature rows to hide (repeatable; aliases allowed)
        #[arg(long)]
        hidden: Vec<String>,
    },
    /// Local preference snapshots
    Prefs {
        #[command(subcommand)]
        cmd: PrefsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Print the token for the given preferences
    Encode {
        /// Feature rows to hide (repeatable; aliases allowed)
        #[arg(long)]
        hidden: Vec<String>,
        /// Column keys in display order (repeatable)
        #[arg(long)]
        order: Vec<String>,
    },
    /// Print the preferences a token carries, as JSON
    Decode {
        /// Token to decode
        token: String,
        /// Fail on malformed tokens instead of printing empty preferences
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
    /// Save preferences for a company name
    Save {
        /// Company or context name
        namespace: String,
        /// Feature rows to hide (repeatable; aliases allowed)
        #[arg(long)]
        hidden: Vec<String>,
        /// Column keys in display order (repeatable)
        #[arg(long)]
        order: Vec<String>,
        /// Config directory (defaults to the platform config dir)
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
    /// Print saved preferences as JSON
    Show {
        /// Company or context name
        namespace: String,
        /// Config directory (defaults to the platform config dir)
        #[arg(long)]
        config_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    match args.cmd {
        Command::Render {
            file,
            hidden_token,
            namespace,
            config_dir,
        } => render_file(&file, hidden_token.as_deref(), namespace.as_deref(), config_dir)?,
        Command::Token { cmd } => match cmd {
            TokenCommand::Encode { hidden, order } => {
                println!("{}", codec::encode(&preferences(&hidden, &order)));
            }
            TokenCommand::Decode { token, strict } => {
                let prefs = if strict {
                    codec::try_decode(&token).context("malformed token")?
                } else {
                    codec::decode(&token)
                };
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            }
        },
        Command::ShareUrl {
            base,
            token,
            hidden,
        } => {
            let base = Url::parse(&base).with_context(|| format!("invalid base url {base:?}"))?;
            println!("{}", codec::share_url(&base, &token, &hidden_rows(&hidden)));
        }
        Command::Prefs { cmd } => match cmd {
            PrefsCommand::Save {
                namespace,
                hidden,
                order,
                config_dir,
            } => {
                let prefs = MatrixPrefs::from(&preferences(&hidden, &order));
                config(config_dir)?
                    .save_prefs(&namespace, &prefs)
                    .with_context(|| format!("save preferences for {namespace:?}"))?;
                info!(%namespace, "preferences saved");
                println!("saved preferences for {namespace}");
            }
            PrefsCommand::Show {
                namespace,
                config_dir,
            } => {
                let Some(prefs) = config(config_dir)?.load_prefs(&namespace) else {
                    bail!("no preferences saved for {namespace:?}");
                };
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            }
        },
    }

    Ok(())
}

fn config(dir: Option<PathBuf>) -> Result<ConfigService<FsConfigStore>> {
    let store = match dir {
        Some(dir) => FsConfigStore::at(&dir)
            .with_context(|| format!("open config dir {}", dir.display()))?,
        None => FsConfigStore::new().context("open platform config dir")?,
    };
    Ok(ConfigService::new(store))
}

fn hidden_rows(labels: &[String]) -> HiddenFeatures {
    labels.iter().map(|l| canon::canonical_key(l)).collect()
}

fn preferences(hidden: &[String], order: &[String]) -> ViewPreferences {
    ViewPreferences {
        order: OrderState::from_keys(order.iter().map(|k| ColumnKey::from(k.as_str()))),
        hidden: hidden_rows(hidden),
    }
}

fn render_file(
    file: &Path,
    hidden_token: Option<&str>,
    namespace: Option<&str>,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let groups: Vec<OfferGroup> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file.display()))?;
    debug!(groups = groups.len(), "offers loaded");

    let mut prefs = ViewPreferences::default();
    if let Some(namespace) = namespace {
        match config(config_dir)?.load_prefs(namespace) {
            Some(saved) => prefs = ViewPreferences::from(&saved),
            None => info!(%namespace, "no saved preferences"),
        }
    }
    if let Some(token) = hidden_token {
        prefs.hidden = codec::decode_hidden(token);
    }

    println!("{}", render::table(&groups, &prefs));
    Ok(())
}
