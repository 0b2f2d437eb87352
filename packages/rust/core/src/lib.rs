//! Domain logic for CouponFinder.
//!
//! Turns a page URL into a site identity, asks an answer channel for coupon
//! codes, salvages records from whatever text comes back, filters them, and
//! caches the accepted set per site. Also holds the stored-credential
//! obfuscator.

pub mod cache;
pub mod clock;
pub mod credential;
pub mod extract;
pub mod pipeline;
pub mod query;
pub mod record;
pub mod site;
pub mod validate;

pub use cache::{CacheListing, CachedResult, Freshness, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{CredentialStore, decrypt, encrypt, mask_token};
pub use extract::{Extraction, ScrapePolicy, Strategy, extract};
pub use pipeline::{
    CouponFinder, ProgressReporter, ResultSource, SearchOutcome, SearchRequest, SilentProgress,
};
pub use record::{AcceptedRecord, CandidateRecord};
pub use validate::{ValidationPolicy, validate};
