use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Id = i64;

/// Text a reply carries after a password-verified delete.
pub const DELETED_TEXT: &str = "[deleted]";

/// Threads shown per board listing.
pub const THREAD_LIST_LIMIT: usize = 10;
/// Replies attached to each thread in a board listing.
pub const REPLY_PREVIEW_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Board {
    pub boardname: String,
    pub created_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Thread {
    pub id: Id,
    pub boardname: String,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub reported: bool,
    pub delete_password: String, // salted digest, see crate::password
}

#[derive(Debug, Clone)]
pub struct NewThread {
    pub boardname: String,
    pub text: String,
    pub delete_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Reply {
    pub id: Id,
    pub thread_id: Id,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub reported: bool,
    pub delete_password: String, // salted digest, see crate::password
}

/// Reply input; the owning thread is addressed by board and id so the
/// repository can resolve and bump it in the same operation.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub boardname: String,
    pub thread_id: Id,
    pub text: String,
    pub delete_password: String,
}

// ---------------------------------------------------------------------------
// Client-facing projections. Secrets and moderation flags never leave the
// process; only these types are serialized into responses.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ThreadView {
    #[schema(value_type = i64)]
    pub id: Id,
    pub boardname: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub text: String,
}

impl From<&Thread> for ThreadView {
    fn from(t: &Thread) -> Self {
        Self {
            id: t.id,
            boardname: t.boardname.clone(),
            created_on: t.created_on,
            bumped_on: t.bumped_on,
            text: t.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ReplyView {
    #[schema(value_type = i64)]
    pub id: Id,
    #[schema(value_type = i64)]
    pub thread_id: Id,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub text: String,
}

impl From<&Reply> for ReplyView {
    fn from(r: &Reply) -> Self {
        Self {
            id: r.id,
            thread_id: r.thread_id,
            created_on: r.created_on,
            bumped_on: r.bumped_on,
            text: r.text.clone(),
        }
    }
}

/// A thread as seen in listings: no board name, no flags, with its replies.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ThreadWithReplies {
    #[schema(value_type = i64)]
    pub id: Id,
    pub text: String,
    pub created_on: DateTime<Utc>,
    pub bumped_on: DateTime<Utc>,
    pub replies: Vec<ReplyView>,
}

impl ThreadWithReplies {
    pub fn new(thread: &Thread, replies: &[Reply]) -> Self {
        Self {
            id: thread.id,
            text: thread.text.clone(),
            created_on: thread.created_on,
            bumped_on: thread.bumped_on,
            replies: replies.iter().map(ReplyView::from).collect(),
        }
    }
}

/// Newest first by creation time; ties broken by id so order is stable.
pub(crate) fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (DateTime<Utc>, Id),
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}
