//! Prompt construction for a coupon search.

use couponfinder_shared::SiteIdentity;

/// Build the search prompt for `site`.
///
/// Pure function of the identity: the same site always yields the same prompt.
/// The prompt names the entity as the only valid subject, tells the model to
/// ignore competitors, and asks for a JSON array of `{"code", "description"}`
/// objects. The answer is not guaranteed to follow that shape, which is what
/// the extractor's fallback chain is for.
pub fn build_prompt(site: &SiteIdentity) -> String {
    let name = &site.entity_name;
    let domain = &site.domain;

    format!(
        "Search the web for coupon codes, promo codes and discount codes that are \
currently valid for {name} ({domain}).\n\
\n\
Rules:\n\
- Only return codes that can be redeemed at {name}. {name} is the only valid subject.\n\
- Do not include codes for competitors, marketplaces, cashback portals or any \
other retailer, even if they sell similar products.\n\
- Skip expired codes and offers that need no code.\n\
- Each description should say what the code gives (for example \"20% off orders over $50\").\n\
\n\
Respond with a JSON array and nothing else, using exactly this shape:\n\
[{{\"code\": \"EXAMPLE10\", \"description\": \"10% off your first order\"}}]\n\
\n\
If you cannot find any valid codes for {name}, respond with:\n\
[{{\"code\": \"NO_CODES_FOUND\", \"description\": \"No current codes found for {name}\"}}]"
    )
}
