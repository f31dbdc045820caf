//! Bounded, lazy walk over a paginated timeline.
//!
//! A [`Timeline`] turns repeated page fetches into one newest-first sequence
//! of statuses, cut off at the query's newest and oldest bounds. Bounds may be
//! status ids or timestamps; a timestamp newest bound is first converted into
//! a starting id by [`find_starting_id`].

use std::collections::VecDeque;

use async_stream::try_stream;
use futures::Stream;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::application::error::FeedError;
use crate::application::feed::FeedSource;
use crate::application::fetch::TimelineFetcher;
use crate::domain::Status;
use crate::domain::types::{Bound, Scope, TimelineQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// The newest bound has not been resolved into a cursor yet.
    Init,
    /// The next page has to be requested.
    Fetching,
    /// Statuses of the current page are being handed out.
    Yielding {
        page_cursor: Option<u64>,
    },
    Done,
}

/// Single-use cursor over the statuses matching a [`TimelineQuery`].
///
/// Holds the source exclusively while alive. To walk the same range again,
/// ask the source for a new timeline; pages seen before will come from its
/// cache.
pub struct Timeline<'a, F> {
    source: &'a mut FeedSource<F>,
    query: TimelineQuery,
    state: State,
    /// Id of the last status processed; the next page starts below it.
    cursor: Option<u64>,
    page: VecDeque<Status>,
}

impl<'a, F: TimelineFetcher> Timeline<'a, F> {
    pub(crate) fn new(source: &'a mut FeedSource<F>, query: TimelineQuery) -> Self {
        Self {
            source,
            query,
            state: State::Init,
            cursor: None,
            page: VecDeque::new(),
        }
    }

    /// Next status of the walk, or `None` once a bound or the end of the
    /// timeline is reached.
    ///
    /// Fetch errors are returned as-is; the walk stays where it was, so
    /// calling `next` again retries the failed request.
    pub async fn next(&mut self) -> Result<Option<Status>, FeedError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Init => match self.start_cursor().await? {
                    Some(cursor) => {
                        self.cursor = cursor;
                        self.state = State::Fetching;
                    }
                    None => self.finish(),
                },
                State::Fetching => {
                    let from_id = match self.cursor {
                        None => None,
                        Some(0) => {
                            self.finish();
                            continue;
                        }
                        Some(cursor) => Some(cursor - 1),
                    };
                    let page = self.source.get_page(self.query.scope, from_id).await?;
                    self.page = page.into();
                    self.state = State::Yielding {
                        page_cursor: self.cursor,
                    };
                }
                State::Yielding { page_cursor } => {
                    let Some(status) = self.page.pop_front() else {
                        if self.cursor == page_cursor {
                            // The last page moved nothing: end of the timeline.
                            self.finish();
                        } else {
                            self.state = State::Fetching;
                        }
                        continue;
                    };

                    if self.is_past_oldest(&status) {
                        self.finish();
                        continue;
                    }

                    let wanted = self.is_within_newest(&status) && self.is_in_scope(&status);
                    self.cursor = Some(status.id);
                    if wanted {
                        return Ok(Some(status));
                    }
                }
            }
        }
    }

    /// Drain the walk into a vector.
    pub async fn collect_all(mut self) -> Result<Vec<Status>, FeedError> {
        let mut statuses = Vec::new();
        while let Some(status) = self.next().await? {
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Adapt the walk into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<Status, FeedError>> + 'a
    where
        F: 'a,
    {
        try_stream! {
            let mut timeline = self;
            while let Some(status) = timeline.next().await? {
                yield status;
            }
        }
    }

    /// Cursor the walk starts from, or `None` when nothing can match the
    /// newest bound.
    async fn start_cursor(&mut self) -> Result<Option<Option<u64>>, FeedError> {
        let cursor = match self.query.newest {
            Bound::None => None,
            Bound::ById(id) => id.checked_add(1),
            Bound::ByTimestamp(at) => match find_starting_id(self.source, at).await? {
                Some(id) => Some(id),
                None => {
                    debug!(newest = %at, "no status old enough for newest bound");
                    return Ok(None);
                }
            },
        };
        Ok(Some(cursor))
    }

    fn finish(&mut self) {
        self.state = State::Done;
        self.page.clear();
    }

    fn is_past_oldest(&self, status: &Status) -> bool {
        match self.query.oldest {
            Bound::None => false,
            Bound::ById(oldest) => status.id < oldest,
            Bound::ByTimestamp(oldest) => status.created_at.is_some_and(|at| at < oldest),
        }
    }

    fn is_within_newest(&self, status: &Status) -> bool {
        match self.query.newest {
            Bound::None => true,
            Bound::ById(newest) => status.id <= newest,
            Bound::ByTimestamp(newest) => status.created_at.is_none_or(|at| at <= newest),
        }
    }

    fn is_in_scope(&self, status: &Status) -> bool {
        match self.query.scope {
            Scope::Federated => true,
            Scope::Local => status.is_local(),
        }
    }
}

fn is_newer_than(status: &Status, target: OffsetDateTime) -> bool {
    status.created_at.is_some_and(|at| at > target)
}

/// Starting cursor for a walk whose newest bound is the timestamp `target`.
///
/// Returns the id of a status newer than `target` directly above the region
/// where statuses become old enough, or just above the newest status when
/// the whole timeline is old enough. `None` means the timeline is empty.
/// Always searches the local timeline. Statuses without a timestamp count as
/// old enough.
#[instrument(skip(source))]
pub async fn find_starting_id<F: TimelineFetcher>(
    source: &mut FeedSource<F>,
    target: OffsetDateTime,
) -> Result<Option<u64>, FeedError> {
    let first_page = source.get_page(Scope::Local, None).await?;
    let Some(first) = first_page.into_iter().next() else {
        return Ok(None);
    };
    if !is_newer_than(&first, target) {
        return Ok(Some(first.id.saturating_add(1)));
    }

    // `newest` is always newer than the target; `oldest`, when known, is not.
    let mut newest = first;
    let mut oldest: Option<Status> = None;
    let mut oldest_id: u64 = 1;

    while is_newer_than(&newest, target)
        && oldest
            .as_ref()
            .is_none_or(|status| !is_newer_than(status, target))
    {
        let newest_id = newest.id;
        if newest_id <= oldest_id {
            return Ok(Some(newest.id));
        }
        let middle_id = newest_id.midpoint(oldest_id);
        if middle_id == newest_id || middle_id == oldest_id {
            return Ok(Some(newest.id));
        }

        let page = source.get_page(Scope::Local, Some(middle_id)).await?;
        debug!(
            middle_id,
            newest_id,
            oldest_id,
            found = page.len(),
            "bisecting timeline"
        );

        match page.into_iter().next() {
            None => {
                oldest = None;
                oldest_id = middle_id;
            }
            Some(candidate) if !is_newer_than(&candidate, target) => {
                if candidate.id <= oldest_id {
                    return Ok(Some(newest.id));
                }
                oldest_id = candidate.id;
                oldest = Some(candidate);
            }
            Some(candidate) => {
                if candidate.id == newest_id {
                    return Ok(Some(newest.id));
                }
                newest = candidate;
            }
        }
    }

    Ok(None)
}
