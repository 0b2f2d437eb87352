//! CLI command definitions, routing, and tracing setup.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use couponfinder_core::cache::Freshness;
use couponfinder_core::credential::mask_token;
use couponfinder_core::pipeline::{
    CouponFinder, ProgressReporter, ResultSource, SearchOutcome, SearchRequest,
};
use couponfinder_core::{CredentialStore, ResultCache, site};
use couponfinder_gemini::GeminiClient;
use couponfinder_shared::{AppConfig, api_key_from_env, db_path, init_config, load_config};
use couponfinder_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// CouponFinder: ask an AI model for working coupon codes.
#[derive(Parser)]
#[command(
    name = "couponfinder",
    version,
    about = "Find coupon codes for a shopping site using a Gemini model.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search coupon codes for the site a URL belongs to.
    Search {
        /// Page URL on the shopping site.
        url: String,

        /// Model id (defaults to the selected model).
        #[arg(short, long)]
        model: Option<String>,

        /// Ignore cached results and ask the model again.
        #[arg(long)]
        refresh: bool,
    },

    /// Inspect or clear cached results.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage the stored API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Show or change the selected model.
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// List cached sites.
    List,
    /// Remove every cached result.
    Clear,
}

#[derive(Subcommand)]
pub(crate) enum KeyAction {
    /// Store an API key. Reads one line from stdin when no key is given.
    Set { token: Option<String> },
    /// Show the stored key, masked.
    Show,
    /// Remove the stored key.
    Clear,
}

#[derive(Subcommand)]
pub(crate) enum ModelAction {
    /// Print the selected model.
    Show,
    /// Select a model id.
    Set { model: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "couponfinder=info",
        1 => "couponfinder=debug",
        _ => "couponfinder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Search {
            url,
            model,
            refresh,
        } => cmd_search(&url, model.as_deref(), refresh).await,
        Command::Cache { action } => match action {
            CacheAction::List => cmd_cache_list().await,
            CacheAction::Clear => cmd_cache_clear().await,
        },
        Command::Key { action } => match action {
            KeyAction::Set { token } => cmd_key_set(token).await,
            KeyAction::Show => cmd_key_show().await,
            KeyAction::Clear => cmd_key_clear().await,
        },
        Command::Model { action } => match action {
            ModelAction::Show => cmd_model_show().await,
            ModelAction::Set { model } => cmd_model_set(&model).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Load config and open the settings database.
async fn open_store() -> Result<(AppConfig, Arc<Storage>)> {
    let config = load_config()?;
    let path = db_path(&config)?;
    let storage = Storage::open(&path).await?;
    Ok((config, Arc::new(storage)))
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

async fn cmd_search(url: &str, model: Option<&str>, refresh: bool) -> Result<()> {
    let site = site::resolve(url)?;
    let (config, store) = open_store().await?;
    let credentials = CredentialStore::from_config(store.clone(), &config);

    let access_token = match credentials.load_token().await? {
        Some(token) => token,
        None => api_key_from_env(&config).ok_or_else(|| {
            eyre!(
                "no API key configured: run `couponfinder key set` or export {}",
                config.gemini.api_key_env
            )
        })?,
    };

    let model = match model {
        Some(m) => m.to_string(),
        None => credentials.selected_model().await?,
    };

    let channel = GeminiClient::from_config(&config.gemini)?;
    let finder = CouponFinder::new(store, channel, &config)?;
    let request = SearchRequest {
        model,
        access_token,
        force_refresh: refresh,
    };

    info!(domain = %site.domain, refresh, "searching for coupon codes");

    let reporter = CliProgress::new();
    let result = finder.search(&site, &request, &reporter).await;
    reporter.clear();
    let outcome = result?;

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome) {
    println!();
    println!("  {}", outcome.site.label());

    if let ResultSource::Cached { age } = &outcome.source {
        println!("  (cached {} min ago)", age.num_minutes());
    }
    println!();

    if outcome.records.is_empty() {
        println!("  No active coupon codes found for this website.");
        println!();
        return;
    }

    let width = outcome
        .records
        .iter()
        .map(|r| r.code().chars().count())
        .max()
        .unwrap_or(0);

    for record in &outcome.records {
        println!("  {:<width$}  {}", record.code(), record.description());
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &SearchOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// cache
// ---------------------------------------------------------------------------

async fn cmd_cache_list() -> Result<()> {
    let (config, store) = open_store().await?;
    let cache = ResultCache::from_config(store, &config)?;
    let entries = cache.entries().await?;

    if entries.is_empty() {
        println!("No cached results.");
        return Ok(());
    }

    for entry in entries {
        let state = match entry.freshness {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
        };
        println!(
            "  {:<32} {:>3} codes  {}  {}",
            entry.site_key,
            entry.record_count,
            state,
            entry.created_at.format("%Y-%m-%d %H:%M UTC"),
        );
    }
    Ok(())
}

async fn cmd_cache_clear() -> Result<()> {
    let (config, store) = open_store().await?;
    let removed = ResultCache::from_config(store, &config)?.clear_all().await?;
    println!("Cleared {removed} cached result(s).");
    Ok(())
}

// ---------------------------------------------------------------------------
// key / model
// ---------------------------------------------------------------------------

async fn cmd_key_set(token: Option<String>) -> Result<()> {
    let token = match token {
        Some(t) => t,
        None => {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            line
        }
    };

    let (config, store) = open_store().await?;
    let credentials = CredentialStore::from_config(store, &config);
    credentials.save_token(&token).await?;

    if token.trim().is_empty() {
        println!("API key removed.");
    } else {
        println!("API key saved.");
    }
    Ok(())
}

async fn cmd_key_show() -> Result<()> {
    let (config, store) = open_store().await?;
    let credentials = CredentialStore::from_config(store, &config);

    match credentials.load_token().await? {
        Some(token) => println!("{}", mask_token(&token)),
        None if api_key_from_env(&config).is_some() => {
            println!("No stored key; using ${}.", config.gemini.api_key_env)
        }
        None => println!("No API key configured."),
    }
    Ok(())
}

async fn cmd_key_clear() -> Result<()> {
    let (config, store) = open_store().await?;
    CredentialStore::from_config(store, &config)
        .clear_token()
        .await?;
    println!("API key removed.");
    Ok(())
}

async fn cmd_model_show() -> Result<()> {
    let (config, store) = open_store().await?;
    let model = CredentialStore::from_config(store, &config)
        .selected_model()
        .await?;
    println!("{model}");
    Ok(())
}

async fn cmd_model_set(model: &str) -> Result<()> {
    let (config, store) = open_store().await?;
    CredentialStore::from_config(store, &config)
        .set_model(model)
        .await?;
    println!("Model set to {}.", model.trim());
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
