use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::Id;

/// Directed edge: `user_id` follows `author_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    pub user_id: Id,
    pub author_id: Id,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
