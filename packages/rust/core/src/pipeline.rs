//! End-to-end search: site → cache check → prompt → answer → extract → validate → cache.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use tracing::{info, instrument, warn};

use couponfinder_shared::{
    AnswerChannel, AnswerRequest, AppConfig, CouponFinderError, Result, SiteIdentity,
};
use couponfinder_storage::KeyValueStore;

use crate::cache::ResultCache;
use crate::clock::{Clock, SystemClock};
use crate::extract::{self, ScrapePolicy, Strategy};
use crate::query;
use crate::record::AcceptedRecord;
use crate::validate::{self, ValidationPolicy};

/// Per-search inputs that are not part of the site itself.
#[derive(Clone)]
pub struct SearchRequest {
    /// Model id passed through to the answer channel.
    pub model: String,
    /// Provider access token. Never logged.
    pub access_token: String,
    /// Skip the cache lookup and always query the provider.
    pub force_refresh: bool,
}

impl std::fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchRequest")
            .field("model", &self.model)
            .field("access_token", &"<redacted>")
            .field("force_refresh", &self.force_refresh)
            .finish()
    }
}

/// Where the records of a [`SearchOutcome`] came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSource {
    /// Served from a fresh cache entry of the given age.
    Cached { age: Duration },
    /// Fetched from the provider just now.
    Fresh {
        /// Extraction strategy that produced the candidates.
        strategy: Strategy,
        /// Candidates before validation.
        candidates: usize,
    },
}

/// Result of [`CouponFinder::search`].
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub site: SiteIdentity,
    /// Accepted records in answer order. Empty means "no codes found".
    pub records: Vec<AcceptedRecord>,
    pub source: ResultSource,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the search completes successfully.
    fn done(&self, outcome: &SearchOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &SearchOutcome) {}
}

/// Runs coupon searches against one answer channel and one result cache.
pub struct CouponFinder<S, A, C = SystemClock> {
    cache: ResultCache<S, C>,
    channel: A,
    scrape: ScrapePolicy,
    validation: ValidationPolicy,
}

impl<S: KeyValueStore, A: AnswerChannel> CouponFinder<S, A, SystemClock> {
    /// Build a finder with policies and TTL taken from `config`.
    pub fn new(store: Arc<S>, channel: A, config: &AppConfig) -> Result<Self> {
        Ok(Self::with_cache(
            ResultCache::from_config(store, config)?,
            channel,
            ScrapePolicy::from(config),
            ValidationPolicy::from(config),
        ))
    }
}

impl<S: KeyValueStore, A: AnswerChannel, C: Clock> CouponFinder<S, A, C> {
    pub fn with_cache(
        cache: ResultCache<S, C>,
        channel: A,
        scrape: ScrapePolicy,
        validation: ValidationPolicy,
    ) -> Self {
        Self {
            cache,
            channel,
            scrape,
            validation,
        }
    }

    pub fn cache(&self) -> &ResultCache<S, C> {
        &self.cache
    }

    /// Find coupon codes for `site`.
    ///
    /// A fresh cache entry short-circuits everything after step 1 unless
    /// `request.force_refresh` is set. Provider failures are returned as-is
    /// and never touch the cache.
    #[instrument(skip_all, fields(domain = %site.domain, model = %request.model))]
    pub async fn search(
        &self,
        site: &SiteIdentity,
        request: &SearchRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<SearchOutcome> {
        let start = Instant::now();

        if request.access_token.trim().is_empty() {
            return Err(CouponFinderError::config("no API key configured"));
        }

        // --- Phase 1: Cache ---
        if !request.force_refresh {
            progress.phase("Checking cache");
            if let Some(hit) = self.cache.get(&site.domain).await? {
                info!(
                    records = hit.records.len(),
                    age_secs = hit.age.num_seconds(),
                    "serving cached results"
                );
                let outcome = SearchOutcome {
                    site: site.clone(),
                    records: hit.records,
                    source: ResultSource::Cached { age: hit.age },
                };
                progress.done(&outcome);
                return Ok(outcome);
            }
        }

        // --- Phase 2: Ask ---
        progress.phase(&format!("Asking {} about {}", request.model, site.entity_name));
        let answer = self
            .channel
            .ask(&AnswerRequest {
                prompt: query::build_prompt(site),
                model: request.model.clone(),
                access_token: request.access_token.clone(),
            })
            .await?;

        // --- Phase 3: Extract + validate ---
        progress.phase("Extracting codes");
        let extraction = extract::extract(&answer, &self.scrape);
        let records = validate::validate(&extraction.candidates, &self.validation);

        // --- Phase 4: Cache ---
        progress.phase("Saving results");
        if let Err(e) = self.cache.put(&site.domain, &records).await {
            warn!(error = %e, "failed to cache results");
        }

        info!(
            strategy = %extraction.strategy,
            candidates = extraction.candidates.len(),
            accepted = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search complete"
        );

        let outcome = SearchOutcome {
            site: site.clone(),
            records,
            source: ResultSource::Fresh {
                strategy: extraction.strategy,
                candidates: extraction.candidates.len(),
            },
        };
        progress.done(&outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use couponfinder_shared::FailureKind;
    use couponfinder_storage::MemoryStore;
    use serde_json::Value;

    use super::*;
    use crate::cache::cache_key;
    use crate::clock::ManualClock;
    use crate::credential::CREDENTIAL_KEY;

    /// Answers every request with the same scripted reply.
    struct ScriptedChannel {
        reply: std::result::Result<String, String>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn answering(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                reply: Err(reason.to_string()),
                ..Self::answering("")
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnswerChannel for ScriptedChannel {
        async fn ask(&self, request: &AnswerRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(reason) => Err(CouponFinderError::provider(reason.clone())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        phases: Mutex<Vec<String>>,
        done: AtomicUsize,
    }

    impl ProgressReporter for RecordingProgress {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn done(&self, _outcome: &SearchOutcome) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    type TestFinder = CouponFinder<MemoryStore, ScriptedChannel, Arc<ManualClock>>;

    fn finder(channel: ScriptedChannel) -> (TestFinder, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ResultCache::with_clock(store.clone(), Duration::minutes(30), clock.clone());
        let finder = CouponFinder::with_cache(
            cache,
            channel,
            ScrapePolicy::default(),
            ValidationPolicy::default(),
        );
        (finder, store, clock)
    }

    fn kohls() -> SiteIdentity {
        SiteIdentity {
            domain: "kohls.com".into(),
            entity_name: "Kohls".into(),
            source_url: "https://www.kohls.com/".into(),
        }
    }

    fn request() -> SearchRequest {
        SearchRequest {
            model: "gemini-1.5-flash".into(),
            access_token: "AIzaSyD-test-token-000000".into(),
            force_refresh: false,
        }
    }

    fn codes(outcome: &SearchOutcome) -> Vec<&str> {
        outcome.records.iter().map(|r| r.code()).collect()
    }

    #[tokio::test]
    async fn clean_json_answer_yields_records() {
        let (finder, _, _) = finder(ScriptedChannel::answering(
            r#"[{"code":"SAVE20","description":"20% off"}]"#,
        ));
        let progress = RecordingProgress::default();

        let outcome = finder.search(&kohls(), &request(), &progress).await.unwrap();

        assert_eq!(codes(&outcome), vec!["SAVE20"]);
        assert_eq!(outcome.records[0].description(), "20% off");
        assert_eq!(
            outcome.source,
            ResultSource::Fresh {
                strategy: Strategy::Direct,
                candidates: 1
            }
        );
        assert_eq!(progress.done.load(Ordering::SeqCst), 1);
        assert!(progress.phases.lock().unwrap().len() >= 3);

        let prompts = finder.channel.prompts.lock().unwrap();
        assert!(prompts[0].contains("Kohls"));
    }

    #[tokio::test]
    async fn fenced_short_code_is_rejected() {
        let (finder, _, _) = finder(ScriptedChannel::answering(
            "Here you go:\n```json\n[{\"code\":\"AB\",\"description\":\"x\"}]\n```",
        ));
        let outcome = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();
        assert!(outcome.records.is_empty());
    }

    #[tokio::test]
    async fn prose_answer_falls_back_to_scraping() {
        let (finder, _, _) = finder(ScriptedChannel::answering(
            "You can try SAVE15 for 15% off, or FREESHIP on orders over $50.",
        ));
        let outcome = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();

        assert_eq!(codes(&outcome), vec!["SAVE15", "FREESHIP"]);
        assert!(matches!(
            outcome.source,
            ResultSource::Fresh {
                strategy: Strategy::Scraped,
                ..
            }
        ));
        assert!(outcome.records.iter().all(|r| !r.description().is_empty()));
    }

    #[tokio::test]
    async fn sentinel_answer_yields_nothing() {
        let (finder, store, _) = finder(ScriptedChannel::answering(
            r#"[{"code":"NO_CODES_FOUND","description":"No current codes"}]"#,
        ));
        let outcome = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();
        assert!(outcome.records.is_empty());

        // Empty results are still cached.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn empty_answer_yields_nothing() {
        let (finder, _, _) = finder(ScriptedChannel::answering("   "));
        let outcome = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();
        assert!(outcome.records.is_empty());
        assert!(matches!(
            outcome.source,
            ResultSource::Fresh {
                strategy: Strategy::Sentinel,
                candidates: 1
            }
        ));
    }

    #[tokio::test]
    async fn fresh_cache_hit_skips_the_channel() {
        let (finder, _, clock) = finder(ScriptedChannel::answering(
            r#"[{"code":"SAVE20","description":"20% off"}]"#,
        ));
        let first = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();

        clock.advance(Duration::minutes(5));
        let second = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();

        assert_eq!(finder.channel.calls(), 1);
        assert_eq!(first.records, second.records);
        assert_eq!(
            second.source,
            ResultSource::Cached {
                age: Duration::minutes(5)
            }
        );
    }

    #[tokio::test]
    async fn stale_entry_triggers_refetch() {
        let (finder, _, clock) = finder(ScriptedChannel::answering(
            r#"[{"code":"SAVE20","description":"20% off"}]"#,
        ));
        finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();

        clock.advance(Duration::minutes(30));
        let outcome = finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();

        assert_eq!(finder.channel.calls(), 2);
        assert!(matches!(outcome.source, ResultSource::Fresh { .. }));
    }

    #[tokio::test]
    async fn force_refresh_bypasses_fresh_entry() {
        let (finder, _, _) = finder(ScriptedChannel::answering(
            r#"[{"code":"SAVE20","description":"20% off"}]"#,
        ));
        finder.search(&kohls(), &request(), &SilentProgress).await.unwrap();

        let refresh = SearchRequest {
            force_refresh: true,
            ..request()
        };
        finder.search(&kohls(), &refresh, &SilentProgress).await.unwrap();
        assert_eq!(finder.channel.calls(), 2);
    }

    #[tokio::test]
    async fn provider_error_leaves_cache_untouched() {
        let (finder, store, _) = finder(ScriptedChannel::failing(
            "You exceeded your current quota, please check your plan",
        ));
        let previous = serde_json::json!({
            "site_key": "kohls.com",
            "records": [{"code": "OLD10", "description": "old"}],
            "created_at": "2020-01-01T00:00:00Z"
        });
        store
            .set(HashMap::from([(cache_key("kohls.com"), previous.clone())]))
            .await
            .unwrap();

        let err = finder
            .search(&kohls(), &request(), &SilentProgress)
            .await
            .unwrap_err();

        assert_eq!(err.failure_kind(), Some(FailureKind::QuotaExceeded));
        let stored = store.get(&["cache:kohls.com"]).await.unwrap();
        assert_eq!(stored.get("cache:kohls.com"), Some(&previous));
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_io() {
        let (finder, store, _) = finder(ScriptedChannel::answering("[]"));
        let no_token = SearchRequest {
            access_token: "  ".into(),
            ..request()
        };

        let err = finder
            .search(&kohls(), &no_token, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, CouponFinderError::Config { .. }));
        assert_eq!(finder.channel.calls(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn sites_are_cached_independently() {
        let (finder, store, _) = finder(ScriptedChannel::answering(
            r#"[{"code":"SAVE20","description":"20% off"}]"#,
        ));
        store
            .set(HashMap::from([(
                CREDENTIAL_KEY.to_string(),
                Value::String("c2VjcmV0".into()),
            )]))
            .await
            .unwrap();

        let target = SiteIdentity {
            domain: "target.com".into(),
            entity_name: "Target".into(),
            source_url: "https://target.com".into(),
        };
        let (site, first, second) = (kohls(), request(), request());
        let (a, b) = tokio::join!(
            finder.search(&site, &first, &SilentProgress),
            finder.search(&target, &second, &SilentProgress),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(finder.cache().entries().await.unwrap().len(), 2);
        assert_eq!(finder.cache().clear_all().await.unwrap(), 2);
        assert_eq!(store.len().await, 1);
    }
}
