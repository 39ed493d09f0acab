//! Wire model for raw search results
//!
//! Mirrors the API's post shape closely enough to round-trip: everything the
//! reducer needs is here, unknown fields are dropped on parse. Timestamps
//! stay in the API's string form; raw pages are the archival record and are
//! never rewritten.

use serde::{Deserialize, Serialize};

/// One persisted page of raw results for one term within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPage {
    /// The originating query, as configured.
    pub query: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    /// Exclusive lower bound the fetch was issued with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_id: Option<u64>,
    /// Pagination upper bound the fetch was issued with, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_id: Option<u64>,
    pub posts: Vec<RawPost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPost {
    pub id: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub favorite_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub user: RawUser,
    #[serde(default)]
    pub entities: RawEntities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweeted_status: Option<Box<RawPost>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawUser {
    pub id: u64,
    #[serde(default)]
    pub screen_name: String,
    #[serde(default)]
    pub followers_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntities {
    #[serde(default)]
    pub hashtags: Vec<RawHashtag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHashtag {
    pub text: String,
}

impl RawPost {
    /// Minimal post for tests and fixtures.
    pub fn stub(id: u64) -> Self {
        Self {
            id,
            text: format!("post {id}"),
            created_at: String::new(),
            favorite_count: 0,
            retweet_count: 0,
            user: RawUser::default(),
            entities: RawEntities::default(),
            retweeted_status: None,
        }
    }
}
