//! Application configuration for CouponFinder.
//!
//! User config lives at `~/.couponfinder/couponfinder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CouponFinderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "couponfinder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".couponfinder";

/// Default database file name inside the config directory.
const DB_FILE_NAME: &str = "couponfinder.db";

// ---------------------------------------------------------------------------
// Config structs (matching couponfinder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gemini provider settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Extraction and validation policy.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Stored credential settings.
    #[serde(default)]
    pub credential: CredentialConfig,
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var consulted when no key is stored.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used when none has been selected.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// API base URL (without the `/models/...` suffix).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Ask the provider to ground the answer with web search.
    #[serde(default = "default_true")]
    pub search_grounding: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            endpoint: default_endpoint(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            search_grounding: true,
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_output_tokens() -> u32 {
    2000
}
fn default_top_p() -> f64 {
    0.8
}
fn default_top_k() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Minutes a cached result set stays fresh.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

fn default_ttl_minutes() -> u64 {
    30
}

/// `[extraction]` section.
///
/// These thresholds were tuned against observed model output; they are
/// policy, not derived values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Minimum trimmed length of an accepted code.
    #[serde(default = "default_min_code_len")]
    pub min_code_len: usize,

    /// Shortest token the scraping fallback picks up.
    #[serde(default = "default_scrape_min_len")]
    pub scrape_min_len: usize,

    /// Longest token the scraping fallback picks up.
    #[serde(default = "default_scrape_max_len")]
    pub scrape_max_len: usize,

    /// Upper-case words the scraping fallback never treats as codes.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Codes that are always rejected (compared case-insensitively).
    #[serde(default = "default_placeholder_codes")]
    pub placeholder_codes: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_code_len: default_min_code_len(),
            scrape_min_len: default_scrape_min_len(),
            scrape_max_len: default_scrape_max_len(),
            stop_words: default_stop_words(),
            placeholder_codes: default_placeholder_codes(),
        }
    }
}

fn default_min_code_len() -> usize {
    3
}
fn default_scrape_min_len() -> usize {
    3
}
fn default_scrape_max_len() -> usize {
    15
}
fn default_stop_words() -> Vec<String> {
    ["HTTP", "HTTPS", "JSON", "CODE", "SAVE", "THE", "AND", "FOR", "YOU"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_placeholder_codes() -> Vec<String> {
    [
        "NULL",
        "NONE",
        "N/A",
        "NO_CODES_FOUND",
        "",
        "undefined",
        "null",
        "NO CODE NEEDED",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path; defaults to `~/.couponfinder/couponfinder.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

/// `[credential]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Key the stored API token is obfuscated with.
    #[serde(default = "default_obfuscation_key")]
    pub obfuscation_key: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            obfuscation_key: default_obfuscation_key(),
        }
    }
}

fn default_obfuscation_key() -> String {
    "couponfinder-2024".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.couponfinder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CouponFinderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.couponfinder/couponfinder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Resolve the database path: `[storage].db_path` if set, else the default.
pub fn db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.db_path {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(DB_FILE_NAME)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CouponFinderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CouponFinderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CouponFinderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CouponFinderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CouponFinderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key from the env var named in `[gemini].api_key_env`.
pub fn api_key_from_env(config: &AppConfig) -> Option<String> {
    match std::env::var(&config.gemini.api_key_env) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}
