//! One remote timeline fronted by its gap-aware cache.

use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::application::error::FeedError;
use crate::application::fetch::TimelineFetcher;
use crate::application::timeline::Timeline;
use crate::cache::{CacheRecord, PageCache};
use crate::domain::Status;
use crate::domain::types::{Scope, TimelineQuery};

pub(crate) const METRIC_FETCH_TOTAL: &str = "tootline_fetch_total";
pub(crate) const METRIC_FETCH_ERROR_TOTAL: &str = "tootline_fetch_error_total";
pub(crate) const METRIC_CACHE_HIT_TOTAL: &str = "tootline_cache_hit_total";
pub(crate) const METRIC_GAP_MARKED_TOTAL: &str = "tootline_gap_marked_total";

/// Outcome of walking the cache down from a requested id.
enum Probe {
    /// A status that satisfies the request is already known.
    Hit(Status),
    /// Nothing usable is cached at or above this id; fetch from here.
    Miss(u64),
    /// Every id down to zero is a known gap.
    Exhausted,
}

/// A single remote timeline and everything learned about it so far.
///
/// Owns its cache exclusively; one source per host, one reader at a time.
pub struct FeedSource<F> {
    fetcher: F,
    cache: PageCache,
}

impl<F> FeedSource<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: PageCache::new(),
        }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Record a freshly fetched page and return it newest-first.
    ///
    /// `expected_max_id` is the inclusive ceiling the page was requested
    /// with. Every id between that ceiling and the first status, and between
    /// consecutive statuses, is remembered as a gap for `scope`.
    pub fn update_page(
        &mut self,
        mut statuses: Vec<Status>,
        scope: Scope,
        expected_max_id: Option<u64>,
    ) -> Vec<Status> {
        statuses.sort_by(|a, b| b.id.cmp(&a.id));

        let mut upper = expected_max_id;
        for status in &statuses {
            if let (Some(high), Some(low)) = (upper, status.id.checked_add(1)) {
                if low <= high {
                    self.cache.put_range(low, high, CacheRecord::gap(scope));
                    counter!(METRIC_GAP_MARKED_TOTAL, "scope" => scope.as_str()).increment(1);
                }
            }
            self.cache.put(status.id, CacheRecord::Stored(status.clone()));
            upper = status.id.checked_sub(1);
        }

        statuses
    }

    fn probe_cache(&self, scope: Scope, from_id: u64) -> Probe {
        let mut id = from_id;
        loop {
            let Some(hit) = self.cache.lookup(id) else {
                return Probe::Miss(id);
            };

            match (scope, hit.record) {
                (Scope::Federated, CacheRecord::Stored(status)) => {
                    return Probe::Hit(status.clone());
                }
                (Scope::Local, CacheRecord::Stored(status)) if status.is_local() => {
                    return Probe::Hit(status.clone());
                }
                // Nothing local lives here; keep walking down.
                (
                    Scope::Local,
                    CacheRecord::Stored(_) | CacheRecord::GapLocal | CacheRecord::GapFederated,
                ) => {}
                // A local gap proves nothing about the federated timeline, and
                // a federated gap still goes to the server. A failed fetch stops
                // the walk in either scope, even with usable records below it.
                (Scope::Federated, CacheRecord::GapLocal | CacheRecord::GapFederated)
                | (_, CacheRecord::FetchError) => return Probe::Miss(id),
            }

            match hit.first_id.checked_sub(1) {
                Some(next) => id = next,
                None => return Probe::Exhausted,
            }
        }
    }
}

impl<F: TimelineFetcher> FeedSource<F> {
    /// Up to one page of statuses at or below `from_id`, newest-first.
    ///
    /// A cached status that satisfies the request is returned on its own
    /// without touching the network. Otherwise the server is asked for the
    /// uncovered part and the cache learns from the answer.
    #[instrument(skip(self))]
    pub async fn get_page(
        &mut self,
        scope: Scope,
        from_id: Option<u64>,
    ) -> Result<Vec<Status>, FeedError> {
        let ceiling = match from_id {
            Some(from_id) => match self.probe_cache(scope, from_id) {
                Probe::Hit(status) => {
                    debug!(id = status.id, "served from cache");
                    counter!(METRIC_CACHE_HIT_TOTAL, "scope" => scope.as_str()).increment(1);
                    return Ok(vec![status]);
                }
                Probe::Exhausted => {
                    debug!("cache proves nothing remains below");
                    return Ok(Vec::new());
                }
                Probe::Miss(ceiling) => Some(ceiling),
            },
            None => None,
        };

        // The server bound is exclusive.
        let max_id = ceiling.and_then(|id| id.checked_add(1));
        counter!(METRIC_FETCH_TOTAL, "scope" => scope.as_str()).increment(1);

        let statuses = match self.fetcher.fetch_public(scope.is_local(), max_id).await {
            Ok(statuses) => statuses,
            Err(err) => {
                warn!(error = %err, ?max_id, "timeline fetch failed");
                counter!(METRIC_FETCH_ERROR_TOTAL, "scope" => scope.as_str()).increment(1);
                if let Some(id) = ceiling {
                    self.cache.put(id, CacheRecord::FetchError);
                }
                return Err(err);
            }
        };

        debug!(count = statuses.len(), ?max_id, "fetched timeline page");
        Ok(self.update_page(statuses, scope, ceiling))
    }

    /// Lazily walk the timeline between the bounds of `query`.
    pub fn iterate(&mut self, query: TimelineQuery) -> Timeline<'_, F> {
        Timeline::new(self, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fetch::testing::{ScriptedFetcher, local_status, remote_status};

    fn ids(statuses: &[Status]) -> Vec<u64> {
        statuses.iter().map(|status| status.id).collect()
    }

    fn local_feed() -> ScriptedFetcher {
        ScriptedFetcher::new(vec![local_status(6), local_status(3), local_status(2)])
    }

    #[tokio::test]
    async fn empty_feed_returns_nothing_after_one_request() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let mut source = FeedSource::new(&fetcher);

        assert!(source.get_page(Scope::Local, None).await?.is_empty());
        assert_eq!(fetcher.calls(), 1);

        assert!(source.get_page(Scope::Local, Some(10)).await?.is_empty());
        assert_eq!(fetcher.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn missing_from_id_returns_statuses_below() -> Result<(), FeedError> {
        let fetcher = local_feed();
        let mut source = FeedSource::new(&fetcher);

        let page = source.get_page(Scope::Local, Some(4)).await?;
        assert_eq!(ids(&page), vec![3, 2]);
        assert_eq!(fetcher.requests(), vec![(true, Some(5))]);
        Ok(())
    }

    #[tokio::test]
    async fn from_id_is_inclusive() -> Result<(), FeedError> {
        let fetcher = local_feed();
        let mut source = FeedSource::new(&fetcher);

        assert_eq!(ids(&source.get_page(Scope::Local, Some(3)).await?), vec![3, 2]);
        assert_eq!(ids(&source.get_page(Scope::Local, Some(3)).await?), vec![3]);
        assert_eq!(fetcher.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn from_id_above_newest_returns_everything() -> Result<(), FeedError> {
        let fetcher = local_feed();
        let mut source = FeedSource::new(&fetcher);

        let page = source.get_page(Scope::Local, Some(7)).await?;
        assert_eq!(ids(&page), vec![6, 3, 2]);
        assert_eq!(fetcher.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn from_id_below_oldest_returns_nothing() -> Result<(), FeedError> {
        let fetcher = local_feed();
        let mut source = FeedSource::new(&fetcher);

        assert!(source.get_page(Scope::Local, Some(1)).await?.is_empty());
        assert_eq!(fetcher.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unbounded_requests_always_hit_the_network() -> Result<(), FeedError> {
        let fetcher = local_feed();
        let mut source = FeedSource::new(&fetcher);

        source.get_page(Scope::Local, None).await?;
        source.get_page(Scope::Local, None).await?;
        assert_eq!(fetcher.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn cached_range_is_not_fetched_twice() -> Result<(), FeedError> {
        let fetcher = local_feed();
        let mut source = FeedSource::new(&fetcher);

        let first = source.get_page(Scope::Local, Some(5)).await?;
        let second = source.get_page(Scope::Local, Some(5)).await?;

        assert_eq!(ids(&first), vec![3, 2]);
        // Walks the gap at 4..=5 down to the cached status 3.
        assert_eq!(ids(&second), vec![3]);
        assert_eq!(fetcher.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn page_marks_gaps_of_the_fetched_scope() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![local_status(8), local_status(5), local_status(3)]);
        let mut source = FeedSource::new(&fetcher);

        source.get_page(Scope::Local, Some(10)).await?;
        let cache = source.cache();

        for gap in [4, 6, 7, 9, 10] {
            assert_eq!(cache.get(gap), Some(&CacheRecord::GapLocal), "id {gap}");
        }
        for stored in [3, 5, 8] {
            assert!(matches!(cache.get(stored), Some(CacheRecord::Stored(_))));
        }
        assert!(cache.get(2).is_none());
        assert!(cache.get(11).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unbounded_page_marks_only_between_statuses() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![local_status(8), local_status(5)]);
        let mut source = FeedSource::new(&fetcher);

        source.get_page(Scope::Federated, None).await?;
        let cache = source.cache();

        assert!(cache.get(9).is_none());
        assert_eq!(cache.get(6), Some(&CacheRecord::GapFederated));
        assert_eq!(cache.get(7), Some(&CacheRecord::GapFederated));
        Ok(())
    }

    #[tokio::test]
    async fn local_gap_does_not_answer_federated_queries() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![local_status(3), remote_status(5)]);
        let mut source = FeedSource::new(&fetcher);

        assert_eq!(ids(&source.get_page(Scope::Local, Some(6)).await?), vec![3]);
        assert_eq!(source.cache().get(5), Some(&CacheRecord::GapLocal));

        let federated = source.get_page(Scope::Federated, Some(6)).await?;
        assert_eq!(ids(&federated), vec![5, 3]);
        assert_eq!(fetcher.calls(), 2);
        assert!(matches!(source.cache().get(5), Some(CacheRecord::Stored(_))));
        Ok(())
    }

    #[tokio::test]
    async fn federated_fetch_upgrades_local_gaps() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![local_status(2)]);
        let mut source = FeedSource::new(&fetcher);

        source.get_page(Scope::Local, Some(6)).await?;
        assert_eq!(source.cache().get(4), Some(&CacheRecord::GapLocal));

        source.get_page(Scope::Federated, Some(6)).await?;
        assert_eq!(source.cache().get(4), Some(&CacheRecord::GapFederated));

        source.get_page(Scope::Local, Some(6)).await?;
        assert_eq!(source.cache().get(4), Some(&CacheRecord::GapFederated));
        Ok(())
    }

    #[tokio::test]
    async fn local_walk_skips_cached_remote_statuses() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![remote_status(5), local_status(3)]);
        let mut source = FeedSource::new(&fetcher);

        source.get_page(Scope::Federated, Some(5)).await?;
        assert_eq!(fetcher.calls(), 1);

        let page = source.get_page(Scope::Local, Some(5)).await?;
        assert_eq!(ids(&page), vec![3]);
        assert_eq!(fetcher.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn federated_gap_still_reaches_the_server() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![local_status(3)]);
        let mut source = FeedSource::new(&fetcher);

        source.get_page(Scope::Federated, Some(6)).await?;
        source.get_page(Scope::Federated, Some(6)).await?;
        assert_eq!(fetcher.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn walk_below_zero_needs_no_request() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(Vec::new());
        let mut source = FeedSource::new(&fetcher);

        source.update_page(vec![local_status(6), remote_status(0)], Scope::Local, Some(6));
        let page = source.get_page(Scope::Local, Some(4)).await?;

        assert!(page.is_empty());
        assert_eq!(fetcher.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn transport_errors_propagate_and_are_noted() {
        let fetcher = local_feed();
        fetcher.fail_requests(true);
        let mut source = FeedSource::new(&fetcher);

        let err = source
            .get_page(Scope::Local, Some(4))
            .await
            .expect_err("scripted failure");
        assert!(err.is_transport());
        assert_eq!(source.cache().get(4), Some(&CacheRecord::FetchError));

        fetcher.fail_requests(false);
        let page = source.get_page(Scope::Local, Some(4)).await.expect("retry");
        assert_eq!(ids(&page), vec![3, 2]);
        assert_eq!(source.cache().get(4), Some(&CacheRecord::GapLocal));
    }

    #[tokio::test]
    async fn local_walk_refetches_at_a_failed_id() -> Result<(), FeedError> {
        let fetcher = ScriptedFetcher::new(vec![local_status(9)]);
        fetcher.fail_requests(true);
        let mut source = FeedSource::new(&fetcher);

        let failed = source.get_page(Scope::Local, Some(10)).await;
        assert!(failed.is_err());
        source.update_page(vec![local_status(9)], Scope::Local, Some(9));
        assert_eq!(source.cache().get(10), Some(&CacheRecord::FetchError));

        fetcher.fail_requests(false);
        let page = source.get_page(Scope::Local, Some(10)).await?;
        assert_eq!(ids(&page), vec![9]);
        assert_eq!(fetcher.requests(), vec![(true, Some(11)); 2]);
        assert_eq!(source.cache().get(10), Some(&CacheRecord::GapLocal));
        Ok(())
    }

    #[test]
    fn update_page_sorts_newest_first() {
        let mut source = FeedSource::new(ScriptedFetcher::new(Vec::new()));
        let sorted = source.update_page(
            vec![local_status(1), local_status(7), local_status(4)],
            Scope::Local,
            None,
        );
        assert_eq!(ids(&sorted), vec![7, 4, 1]);
    }
}
