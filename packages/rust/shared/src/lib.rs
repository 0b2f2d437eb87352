//! Shared types, error model, and configuration for CouponFinder.
//!
//! This crate is the foundation depended on by all other CouponFinder crates.
//! It provides:
//! - [`CouponFinderError`], the unified error type
//! - [`SiteIdentity`], the subject of every search
//! - The answer-channel boundary ([`AnswerChannel`], [`FailureKind`])
//! - Configuration ([`AppConfig`], config loading)

pub mod channel;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use channel::{AnswerChannel, AnswerRequest, FailureKind};
pub use config::{
    AppConfig, CacheConfig, CredentialConfig, ExtractionConfig, GeminiConfig, StorageConfig,
    api_key_from_env, config_dir, config_file_path, db_path, init_config, load_config,
    load_config_from,
};
pub use error::{CouponFinderError, Result};
pub use types::SiteIdentity;
