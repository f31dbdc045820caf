//! Lazy, cache-backed walks over Mastodon-compatible public timelines.
//!
//! A [`FeedSource`] fronts one instance's public timeline with a cache that
//! remembers both the statuses it has seen and the id ranges known to hold
//! none. [`FeedSource::iterate`] turns it into a [`Timeline`] that hands out
//! statuses newest-first between two [`Bound`]s, fetching pages on demand.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

pub use application::error::{AppError, FeedError};
pub use application::feed::FeedSource;
pub use application::fetch::TimelineFetcher;
pub use application::timeline::{Timeline, find_starting_id};
pub use domain::types::{Bound, Scope, TimelineQuery};
pub use domain::{Account, Status};
pub use infra::http::{HttpFetcher, open_feed};
