//! Shared domain enumerations for timeline queries.

use std::{fmt, str::FromStr};

use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use super::error::DomainError;

/// Which slice of a public timeline is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Only statuses authored on the serving instance.
    Local,
    /// The unfiltered timeline, local and remote statuses mixed.
    Federated,
}

impl Scope {
    pub fn from_local_flag(local: bool) -> Self {
        if local {
            Scope::Local
        } else {
            Scope::Federated
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, Scope::Local)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Federated => "federated",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a timeline query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bound {
    #[default]
    None,
    ById(u64),
    ByTimestamp(OffsetDateTime),
}

impl From<u64> for Bound {
    fn from(id: u64) -> Self {
        Bound::ById(id)
    }
}

impl From<OffsetDateTime> for Bound {
    fn from(at: OffsetDateTime) -> Self {
        Bound::ByTimestamp(at)
    }
}

impl FromStr for Bound {
    type Err = DomainError;

    /// Accepts an RFC 3339 timestamp, a `YYYY-MM-DD` date (midnight UTC) or a status id.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("bound must not be empty"));
        }

        if let Ok(at) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            return Ok(Bound::ByTimestamp(at));
        }

        if let Ok(date) = Date::parse(trimmed, format_description!("[year]-[month]-[day]")) {
            return Ok(Bound::ByTimestamp(date.midnight().assume_utc()));
        }

        trimmed.parse::<u64>().map(Bound::ById).map_err(|_| {
            DomainError::validation(format!(
                "`{trimmed}` is neither a timestamp nor a status id"
            ))
        })
    }
}

/// Everything a bounded timeline walk needs besides the source itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineQuery {
    pub scope: Scope,
    pub newest: Bound,
    pub oldest: Bound,
}

impl TimelineQuery {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            newest: Bound::None,
            oldest: Bound::None,
        }
    }

    pub fn newest(mut self, bound: impl Into<Bound>) -> Self {
        self.newest = bound.into();
        self
    }

    pub fn oldest(mut self, bound: impl Into<Bound>) -> Self {
        self.oldest = bound.into();
        self
    }
}
