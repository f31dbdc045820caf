//! Seam between the timeline core and whatever actually talks to a server.

use async_trait::async_trait;

use crate::application::error::FeedError;
use crate::domain::Status;

/// Fetches one page of a public timeline.
#[async_trait]
pub trait TimelineFetcher: Send + Sync {
    /// Statuses with ids strictly below `max_id` (or the newest page when
    /// `None`), restricted to local authors when `local` is set.
    ///
    /// Order of the returned statuses is unspecified.
    async fn fetch_public(
        &self,
        local: bool,
        max_id: Option<u64>,
    ) -> Result<Vec<Status>, FeedError>;
}

#[async_trait]
impl<T> TimelineFetcher for &T
where
    T: TimelineFetcher + ?Sized,
{
    async fn fetch_public(
        &self,
        local: bool,
        max_id: Option<u64>,
    ) -> Result<Vec<Status>, FeedError> {
        (**self).fetch_public(local, max_id).await
    }
}
