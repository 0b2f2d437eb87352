//! Reversible obfuscation for the stored API token, plus the reserved
//! credential and model-selection keys.
//!
//! This is NOT encryption. Each byte of the secret is XOR-ed with the key
//! (repeating) and the result is base64-encoded, which only keeps the token
//! from sitting in plain text at rest.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use couponfinder_shared::{AppConfig, CouponFinderError, Result};
use couponfinder_storage::KeyValueStore;
use serde_json::Value;
use tracing::{debug, info};

/// Reserved key for the obfuscated API token.
pub const CREDENTIAL_KEY: &str = "credential:api_key";

/// Reserved key for the selected model id.
pub const MODEL_KEY: &str = "settings:model";

/// Tokens this short are never real keys.
const MIN_TOKEN_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Obfuscator
// ---------------------------------------------------------------------------

fn xor_with_key(bytes: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return bytes.to_vec();
    }
    bytes
        .iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

/// Obfuscate `secret` with `key` into printable base64 text.
pub fn encrypt(secret: &str, key: &str) -> String {
    STANDARD.encode(xor_with_key(secret.as_bytes(), key.as_bytes()))
}

/// Reverse [`encrypt`].
///
/// Returns an empty string when `cipher_text` is not valid base64 or does not
/// decode to UTF-8. Callers must read `""` as "no usable credential".
pub fn decrypt(cipher_text: &str, key: &str) -> String {
    let Ok(bytes) = STANDARD.decode(cipher_text.trim()) else {
        return String::new();
    };
    String::from_utf8(xor_with_key(&bytes, key.as_bytes())).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Persisted settings
// ---------------------------------------------------------------------------

/// Stored API token and model selection, on top of the shared key-value store.
pub struct CredentialStore<S> {
    store: Arc<S>,
    key: String,
    default_model: String,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            default_model: default_model.into(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &AppConfig) -> Self {
        Self::new(
            store,
            config.credential.obfuscation_key.clone(),
            config.gemini.default_model.clone(),
        )
    }

    /// Store `token` obfuscated. A blank token removes the stored one.
    pub async fn save_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            return self.clear_token().await;
        }
        if token.chars().count() <= MIN_TOKEN_LEN {
            return Err(CouponFinderError::validation(
                "API key is too short to be valid",
            ));
        }

        let cipher_text = encrypt(token, &self.key);
        self.store
            .set(HashMap::from([(
                CREDENTIAL_KEY.to_string(),
                Value::String(cipher_text),
            )]))
            .await?;
        info!("API key saved");
        Ok(())
    }

    /// The stored token, if one decodes to something usable.
    pub async fn load_token(&self) -> Result<Option<String>> {
        let found = self.store.get(&[CREDENTIAL_KEY]).await?;
        let Some(cipher_text) = found.get(CREDENTIAL_KEY).and_then(Value::as_str) else {
            debug!("no stored API key");
            return Ok(None);
        };

        let token = decrypt(cipher_text, &self.key);
        if token.chars().count() <= MIN_TOKEN_LEN {
            debug!("stored API key did not decode to a usable value");
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub async fn clear_token(&self) -> Result<()> {
        self.store.remove(&[CREDENTIAL_KEY]).await?;
        info!("API key removed");
        Ok(())
    }

    /// The selected model, or the configured default.
    pub async fn selected_model(&self) -> Result<String> {
        let found = self.store.get(&[MODEL_KEY]).await?;
        Ok(found
            .get(MODEL_KEY)
            .and_then(Value::as_str)
            .filter(|m| !m.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| self.default_model.clone()))
    }

    pub async fn set_model(&self, model: &str) -> Result<()> {
        let model = model.trim();
        if model.is_empty() {
            return Err(CouponFinderError::validation("model id must not be empty"));
        }
        self.store
            .set(HashMap::from([(
                MODEL_KEY.to_string(),
                Value::String(model.to_string()),
            )]))
            .await?;
        info!(model, "model selection saved");
        Ok(())
    }
}

/// Show only the first few characters of a token.
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}…")
}
