//! Gemini `generateContent` client.
//!
//! Implements [`AnswerChannel`] over the Gemini REST API. One request per
//! prompt, no retries. The access token travels as the `key` query parameter
//! and is never logged, so neither is the request URL.

use std::time::Duration;

use async_trait::async_trait;
use couponfinder_shared::{
    AnswerChannel, AnswerRequest, CouponFinderError, FailureKind, GeminiConfig, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("CouponFinder/", env!("CARGO_PKG_VERSION"));

/// Reason used when an error body carries no message.
const FALLBACK_ERROR: &str = "API request failed";

/// Reason used when a successful response has no answer text.
const NO_RESPONSE: &str = "no response from model";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Request settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiOptions {
    /// API base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub endpoint: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
    /// Attach the Google Search grounding tool.
    pub search_grounding: bool,
    /// Transport timeout. `None` waits as long as the provider takes.
    pub timeout: Option<Duration>,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self::from(&GeminiConfig::default())
    }
}

impl From<&GeminiConfig> for GeminiOptions {
    fn from(config: &GeminiConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            top_p: config.top_p,
            top_k: config.top_k,
            search_grounding: config.search_grounding,
            timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search_retrieval: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    top_p: f64,
    top_k: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GenerateResponse {
    fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }

    fn is_grounded(&self) -> bool {
        self.candidates
            .first()
            .is_some_and(|c| c.grounding_metadata.is_some())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Answer channel backed by the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    options: GeminiOptions,
}

impl GeminiClient {
    pub fn new(options: GeminiOptions) -> Result<Self> {
        Ok(Self {
            http: build_client(&options)?,
            options,
        })
    }

    pub fn from_config(config: &GeminiConfig) -> Result<Self> {
        Self::new(GeminiOptions::from(config))
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:generateContent",
            self.options.endpoint.trim_end_matches('/')
        )
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        let tools = if self.options.search_grounding {
            vec![Tool {
                google_search_retrieval: serde_json::Map::new(),
            }]
        } else {
            Vec::new()
        };

        GenerateRequest {
            contents: vec![Content {
                parts: vec![TextPart { text: prompt }],
            }],
            tools,
            generation_config: GenerationConfig {
                temperature: self.options.temperature,
                max_output_tokens: self.options.max_output_tokens,
                top_p: self.options.top_p,
                top_k: self.options.top_k,
            },
        }
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(options: &GeminiOptions) -> Result<Client> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| CouponFinderError::Network(format!("failed to build HTTP client: {e}")))
}

/// Transport failures are never classified beyond "other".
fn transport_error(context: &str, e: reqwest::Error) -> CouponFinderError {
    // Strip the URL: it carries the access token.
    let e = e.without_url();
    CouponFinderError::Provider {
        kind: FailureKind::Other,
        reason: format!("{context}: {e}"),
    }
}

#[async_trait]
impl AnswerChannel for GeminiClient {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn ask(&self, request: &AnswerRequest) -> Result<String> {
        let body = self.request_body(&request.prompt);
        debug!(
            prompt_len = request.prompt.len(),
            grounding = self.options.search_grounding,
            "sending generateContent request"
        );

        let response = self
            .http
            .post(self.generate_url(&request.model))
            .query(&[("key", request.access_token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("request failed", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error("failed to read response body", e))?;

        if !status.is_success() {
            let reason = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|env| env.error)
                .and_then(|err| err.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_ERROR.to_string());
            let err = CouponFinderError::provider(reason);
            warn!(
                %status,
                kind = ?err.failure_kind(),
                "provider rejected request"
            );
            return Err(err);
        }

        let parsed: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            CouponFinderError::Provider {
                kind: FailureKind::Other,
                reason: format!("unreadable response from model: {e}"),
            }
        })?;

        if parsed.is_grounded() {
            debug!("answer carries grounding metadata");
        }

        let answer = parsed
            .first_text()
            .map(str::trim)
            .ok_or_else(|| CouponFinderError::Provider {
                kind: FailureKind::Other,
                reason: NO_RESPONSE.to_string(),
            })?;

        info!(answer_len = answer.len(), "answer received");
        Ok(answer.to_string())
    }
}
