//! Site identity resolution from a page URL.

use couponfinder_shared::{CouponFinderError, Result, SiteIdentity};
use tracing::debug;
use url::Url;

/// Resolve the site a URL belongs to.
///
/// Only `http` and `https` URLs with a host are accepted; browser-internal
/// pages (`chrome://`, `about:`, `file://`, ...) fail.
pub fn resolve(url: &str) -> Result<SiteIdentity> {
    let parsed = Url::parse(url.trim()).map_err(|_| unable_to_detect(url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(unable_to_detect(url));
    }

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| unable_to_detect(url))?
        .to_lowercase();

    let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();
    let label = domain.split('.').next().unwrap_or_default();
    if label.is_empty() {
        return Err(unable_to_detect(url));
    }

    let site = SiteIdentity {
        entity_name: capitalize(label),
        domain,
        source_url: parsed.to_string(),
    };
    debug!(domain = %site.domain, entity = %site.entity_name, "site resolved");
    Ok(site)
}

fn unable_to_detect(url: &str) -> CouponFinderError {
    CouponFinderError::validation(format!("unable to detect site for {url}"))
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
