//! Acceptance rules for extracted candidates.
//!
//! A candidate is accepted only if every rule holds; there is no partial
//! repair. Output order follows input order and nothing is deduplicated.

use std::collections::HashSet;

use couponfinder_shared::AppConfig;
use tracing::debug;

use crate::record::{AcceptedRecord, CandidateRecord};

/// Thresholds and placeholder set used by [`validate`].
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Minimum length of the trimmed code, in characters.
    pub min_code_len: usize,
    /// Rejected codes, stored upper-cased.
    pub placeholder_codes: HashSet<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ValidationPolicy {
    fn from(config: &AppConfig) -> Self {
        let ex = &config.extraction;
        Self {
            min_code_len: ex.min_code_len,
            placeholder_codes: ex
                .placeholder_codes
                .iter()
                .map(|c| c.to_uppercase())
                .collect(),
        }
    }
}

/// Why a candidate was dropped. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotARecord,
    MissingCode,
    MissingDescription,
    Placeholder,
    TooShort,
}

impl ValidationPolicy {
    /// Check one candidate against every rule.
    pub fn check(
        &self,
        candidate: &CandidateRecord,
    ) -> std::result::Result<AcceptedRecord, Rejection> {
        let CandidateRecord::Record { code, description } = candidate else {
            return Err(Rejection::NotARecord);
        };

        let code = match code.as_deref() {
            Some(c) if c != "null" => c,
            _ => return Err(Rejection::MissingCode),
        };

        let description = match description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => return Err(Rejection::MissingDescription),
        };

        let code = code.trim();
        if self.placeholder_codes.contains(&code.to_uppercase()) {
            return Err(Rejection::Placeholder);
        }

        if code.chars().count() < self.min_code_len {
            return Err(Rejection::TooShort);
        }

        Ok(AcceptedRecord::new(code.to_string(), description.to_string()))
    }
}

/// Keep the candidates that pass every rule, in their original order.
pub fn validate(candidates: &[CandidateRecord], policy: &ValidationPolicy) -> Vec<AcceptedRecord> {
    let accepted: Vec<AcceptedRecord> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| match policy.check(candidate) {
            Ok(record) => Some(record),
            Err(reason) => {
                debug!(index, ?reason, "candidate rejected");
                None
            }
        })
        .collect();

    debug!(
        accepted = accepted.len(),
        total = candidates.len(),
        "validation complete"
    );
    accepted
}
