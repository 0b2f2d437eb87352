//! Core domain types shared across CouponFinder crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SiteIdentity
// ---------------------------------------------------------------------------

/// The site a search is run for.
///
/// Produced by the site resolver for one user-initiated search and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteIdentity {
    /// Normalized host, lower-cased, without a leading `www.`.
    pub domain: String,
    /// Display name derived from the first label of `domain` (e.g. `Kohls`).
    pub entity_name: String,
    /// The URL the identity was resolved from.
    pub source_url: String,
}

impl SiteIdentity {
    /// Short `Name (domain)` label for prompts and log lines.
    pub fn label(&self) -> String {
        format!("{} ({})", self.entity_name, self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_includes_name_and_domain() {
        let site = SiteIdentity {
            domain: "kohls.com".into(),
            entity_name: "Kohls".into(),
            source_url: "https://www.kohls.com/".into(),
        };
        assert_eq!(site.label(), "Kohls (kohls.com)");
    }
}
