//! Gap-aware cache of a remote timeline.
//!
//! Each feed source owns one [`PageCache`]. It remembers statuses it has seen
//! and, just as importantly, the id ranges a fetch proved empty, so later
//! queries over the same region can be answered without a request.

mod record;
mod store;

pub use record::CacheRecord;
pub use store::{Lookup, PageCache};
