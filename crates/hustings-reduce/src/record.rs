//! Reduced record shape
//!
//! The analysis-facing form of one post: flattened author fields, hashtag
//! texts only, and the set of configured queries that surfaced it. Reduced
//! files are JSON arrays of these, one file per run.

use hustings_collect::RawPost;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducedRecord {
    pub id: u64,
    pub text: String,
    pub created_at: String,
    pub favorite_count: u64,
    pub repost_count: u64,
    pub author: String,
    pub author_id: u64,
    pub author_followers: u64,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost_of: Option<RepostRecord>,
    /// Normalized originating terms, sorted. Always non-empty.
    pub queries: Vec<String>,
    pub candidate: String,
}

/// The reposted original, carried inline. No hashtags or queries of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostRecord {
    pub id: u64,
    pub text: String,
    pub created_at: String,
    pub favorite_count: u64,
    pub repost_count: u64,
    pub author: String,
    pub author_id: u64,
    pub author_followers: u64,
}

impl ReducedRecord {
    /// Map one raw post, tagging it with its candidate and originating query.
    pub fn from_raw(post: &RawPost, query: String, candidate: String) -> Self {
        Self {
            id: post.id,
            text: post.text.clone(),
            created_at: post.created_at.clone(),
            favorite_count: post.favorite_count,
            repost_count: post.retweet_count,
            author: post.user.screen_name.clone(),
            author_id: post.user.id,
            author_followers: post.user.followers_count,
            hashtags: post.entities.hashtags.iter().map(|h| h.text.clone()).collect(),
            repost_of: post.retweeted_status.as_deref().map(RepostRecord::from_raw),
            queries: vec![query],
            candidate,
        }
    }
}

impl RepostRecord {
    fn from_raw(post: &RawPost) -> Self {
        Self {
            id: post.id,
            text: post.text.clone(),
            created_at: post.created_at.clone(),
            favorite_count: post.favorite_count,
            repost_count: post.retweet_count,
            author: post.user.screen_name.clone(),
            author_id: post.user.id,
            author_followers: post.user.followers_count,
        }
    }
}
