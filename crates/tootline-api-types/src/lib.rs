//! Wire types for the public timeline API.
//!
//! Only the fields the timeline walker interprets are typed; everything else a
//! server sends is carried through `extra` untouched so output round-trips.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// One entry of a public timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Strictly increasing with creation time; servers send it as a decimal string.
    #[serde(deserialize_with = "deserialize_id", serialize_with = "serialize_id")]
    pub id: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Author of a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// `username` for local accounts, `username@domain` for remote ones.
    pub acct: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Status {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            created_at: None,
            account: None,
            extra: Map::new(),
        }
    }

    pub fn with_created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    /// Whether the status was authored on the instance serving the timeline.
    pub fn is_local(&self) -> bool {
        self.account.as_ref().is_some_and(Account::is_local)
    }
}

impl Account {
    pub fn new(username: impl Into<String>, acct: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            acct: acct.into(),
            extra: Map::new(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.username == self.acct
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .parse()
            .map_err(|err| de::Error::custom(format!("invalid status id `{text}`: {err}"))),
    }
}

fn serialize_id<S>(id: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn parses_string_ids_and_keeps_unknown_fields() {
        let raw = r#"{
            "id": "109372839",
            "created_at": "2022-11-19T10:15:30.000Z",
            "content": "<p>hello</p>",
            "account": {"username": "alice", "acct": "alice", "bot": false}
        }"#;

        let status: Status = serde_json::from_str(raw).expect("status");
        assert_eq!(status.id, 109_372_839);
        assert_eq!(status.created_at, Some(datetime!(2022-11-19 10:15:30 UTC)));
        assert_eq!(status.extra["content"], "<p>hello</p>");
        assert!(status.is_local());

        let out = serde_json::to_value(&status).expect("serialize");
        assert_eq!(out["id"], "109372839");
        assert_eq!(out["account"]["bot"], false);
    }

    #[test]
    fn numeric_id_and_missing_created_at() {
        let status: Status = serde_json::from_str(r#"{"id": 7}"#).expect("status");
        assert_eq!(status.id, 7);
        assert!(status.created_at.is_none());
        assert!(!status.is_local());
    }

    #[test]
    fn remote_account_is_not_local() {
        let status = Status::new(1).with_account(Account::new("bob", "bob@elsewhere.social"));
        assert!(!status.is_local());
    }

    #[test]
    fn rejects_non_numeric_id() {
        let err = serde_json::from_str::<Status>(r#"{"id": "abc"}"#).expect_err("bad id");
        assert!(err.to_string().contains("invalid status id"));
    }
}
