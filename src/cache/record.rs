//! What the cache knows about a single timeline position.

use crate::domain::{Status, types::Scope};

/// Knowledge recorded for one status id.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRecord {
    /// The status at this id has been seen.
    Stored(Status),
    /// No local status exists at this id; a federated one still might.
    GapLocal,
    /// No status exists at this id in either scope.
    GapFederated,
    /// The last attempt to resolve this id failed.
    FetchError,
}

impl CacheRecord {
    /// Gap record produced by a fetch in `scope`.
    pub fn gap(scope: Scope) -> Self {
        match scope {
            Scope::Local => CacheRecord::GapLocal,
            Scope::Federated => CacheRecord::GapFederated,
        }
    }

    /// Combine the existing record with newly learned knowledge.
    ///
    /// Records only ever gain strength. A stored status always wins, and a
    /// federated gap is never weakened to a local one.
    pub fn merge(self, incoming: CacheRecord) -> CacheRecord {
        use CacheRecord::{FetchError, GapFederated, GapLocal, Stored};

        match (self, incoming) {
            (_, Stored(status)) => Stored(status),
            (Stored(status), _) => Stored(status),
            (GapFederated, _) | (_, GapFederated) => GapFederated,
            (GapLocal, _) | (FetchError, GapLocal) => GapLocal,
            (FetchError, FetchError) => FetchError,
        }
    }
}
