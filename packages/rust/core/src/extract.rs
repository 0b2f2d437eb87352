//! Structured extraction of coupon candidates from free-form model answers.
//!
//! The answer is supposed to be a JSON array of `{code, description}`
//! objects, but nothing guarantees it. Extraction is an ordered list of
//! strategies, each `&str -> Option<Vec<CandidateRecord>>`; the first one that
//! yields a non-empty list wins. Extraction never fails: when every strategy
//! comes up empty it returns a single [`NO_CODES_FOUND`] sentinel, which the
//! validator always rejects.

use std::collections::HashSet;
use std::sync::LazyLock;

use couponfinder_shared::AppConfig;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::record::{CandidateRecord, NO_CODES_FOUND};

/// Description attached to every scraped token.
const SCRAPED_DESCRIPTION: &str = "Found in the answer text without a label, try this code";

/// Description attached to the sentinel record.
const SENTINEL_DESCRIPTION: &str = "No coupon codes could be found for this website";

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Thresholds for the token-scraping fallback.
#[derive(Debug, Clone)]
pub struct ScrapePolicy {
    pub min_len: usize,
    pub max_len: usize,
    /// Exact upper-case tokens that are never codes.
    pub stop_words: HashSet<String>,
}

impl Default for ScrapePolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ScrapePolicy {
    fn from(config: &AppConfig) -> Self {
        let ex = &config.extraction;
        Self {
            min_len: ex.scrape_min_len,
            max_len: ex.scrape_max_len,
            stop_words: ex.stop_words.iter().map(|w| w.to_uppercase()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Which strategy produced an [`Extraction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The whole answer was a JSON list.
    Direct,
    /// The first `[...]` substring was a JSON list.
    Bracketed,
    /// A fenced code block held a JSON list.
    Fenced,
    /// A list followed a `codes:` / `array:` label.
    Keyword,
    /// Upper-case tokens scraped from prose.
    Scraped,
    /// Nothing usable; the sentinel record was emitted.
    Sentinel,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Bracketed => "bracketed",
            Self::Fenced => "fenced",
            Self::Keyword => "keyword",
            Self::Scraped => "scraped",
            Self::Sentinel => "sentinel",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type StrategyFn = fn(&str, &ScrapePolicy) -> Option<Vec<CandidateRecord>>;

/// The fallback chain, most trusting first.
const STRATEGIES: &[(Strategy, StrategyFn)] = &[
    (Strategy::Direct, direct_parse),
    (Strategy::Bracketed, bracketed_parse),
    (Strategy::Fenced, fenced_parse),
    (Strategy::Keyword, keyword_parse),
    (Strategy::Scraped, scrape_tokens),
];

/// Candidates pulled from one answer, with the strategy that found them.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub strategy: Strategy,
    pub candidates: Vec<CandidateRecord>,
}

/// Run the fallback chain over a raw answer.
pub fn extract(raw: &str, policy: &ScrapePolicy) -> Extraction {
    for (strategy, run) in STRATEGIES {
        if let Some(candidates) = run(raw, policy).filter(|c| !c.is_empty()) {
            debug!(%strategy, count = candidates.len(), "extraction strategy matched");
            return Extraction {
                strategy: *strategy,
                candidates,
            };
        }
    }

    debug!("no strategy matched, emitting sentinel");
    Extraction {
        strategy: Strategy::Sentinel,
        candidates: vec![CandidateRecord::new(NO_CODES_FOUND, SENTINEL_DESCRIPTION)],
    }
}

/// Parse `text` as a JSON list holding at least one object, and coerce
/// each element. Lists of bare scalars (`[1]`, `["see below"]`) don't count.
fn parse_list(text: &str) -> Option<Vec<CandidateRecord>> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let items = value.as_array()?;
    if !items.iter().any(Value::is_object) {
        return None;
    }
    Some(items.iter().map(CandidateRecord::from_json).collect())
}

/// First `[` up to the first `]` after it.
fn first_bracketed(text: &str) -> Option<&str> {
    static BRACKET_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)\[.*?\]").expect("valid regex"));

    BRACKET_RE.find(text).map(|m| m.as_str())
}

fn direct_parse(text: &str, _policy: &ScrapePolicy) -> Option<Vec<CandidateRecord>> {
    parse_list(text)
}

fn bracketed_parse(text: &str, _policy: &ScrapePolicy) -> Option<Vec<CandidateRecord>> {
    parse_list(first_bracketed(text)?)
}

fn fenced_parse(text: &str, _policy: &ScrapePolicy) -> Option<Vec<CandidateRecord>> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```(?i:json)?\s*(.*?)```").expect("valid regex")
    });

    FENCE_RE.captures_iter(text).find_map(|caps| {
        let interior = caps.get(1)?.as_str();
        parse_list(interior).or_else(|| parse_list(first_bracketed(interior)?))
    })
}

fn keyword_parse(text: &str, _policy: &ScrapePolicy) -> Option<Vec<CandidateRecord>> {
    static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)\b(?:codes?|array)\s*:\s*(\[.*?\])").expect("valid regex")
    });

    KEYWORD_RE
        .captures_iter(text)
        .find_map(|caps| parse_list(caps.get(1)?.as_str()))
}

/// Pick out code-looking tokens: upper-case letters and digits only.
///
/// Tokens are maximal alphanumeric runs, so `Save15` or `FREESHIPping` are
/// never cut down to a partial match. Repeats keep their first position.
fn scrape_tokens(text: &str, policy: &ScrapePolicy) -> Option<Vec<CandidateRecord>> {
    static TOKEN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").expect("valid regex"));

    let mut seen = HashSet::new();
    let candidates: Vec<CandidateRecord> = TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|t| (policy.min_len..=policy.max_len).contains(&t.len()))
        .filter(|t| t.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()))
        .filter(|t| !policy.stop_words.contains(*t))
        .filter(|t| seen.insert(*t))
        .map(|t| CandidateRecord::new(t, SCRAPED_DESCRIPTION))
        .collect();

    Some(candidates)
}
