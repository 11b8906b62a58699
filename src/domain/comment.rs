use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::user::PublicUser;
use crate::domain::Id;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author: PublicUser,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Id,
    pub author_id: Id,
    pub text: String,
}
