use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

use crate::domain::group::GroupSummary;
use crate::domain::user::PublicUser;
use crate::domain::Id;

/// Number of characters shown when a post is rendered as a one-liner.
pub const POST_PREVIEW_CHARS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Id,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub author: PublicUser,
    pub group: Option<GroupSummary>,
    /// Object storage key of the attached image, e.g. `posts/<sha256>.png`.
    pub image: Option<String>,
}

impl Post {
    pub fn preview(&self) -> String {
        self.text.chars().take(POST_PREVIEW_CHARS).collect()
    }

    pub fn group_id(&self) -> Option<Id> {
        self.group.as_ref().map(|group| group.id)
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Id,
    pub text: String,
    pub group_id: Option<Id>,
    pub image: Option<String>,
}

/// Fields an author may change. `image: None` keeps the current image.
#[derive(Debug, Clone)]
pub struct PostUpdate {
    pub text: String,
    pub group_id: Option<Id>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(Id),
    Author(Id),
    /// Posts whose author is followed by the given user.
    FollowedBy(Id),
}
