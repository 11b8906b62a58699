use anyhow::Result;

use crate::domain::comment::{Comment, NewComment};
use crate::domain::Id;
use crate::infra::store::SharedStore;

pub enum CommentOutcome {
    Added(Comment),
    /// Blank text; nothing was stored.
    Blank,
    PostMissing,
}

#[derive(Clone)]
pub struct CommentService {
    store: SharedStore,
}

impl CommentService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn add(&self, post_id: Id, author_id: Id, text: &str) -> Result<CommentOutcome> {
        if self.store.get_post(post_id).await?.is_none() {
            return Ok(CommentOutcome::PostMissing);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(CommentOutcome::Blank);
        }

        let comment = self
            .store
            .create_comment(NewComment {
                post_id,
                author_id,
                text: text.to_string(),
            })
            .await?;
        Ok(match comment {
            Some(comment) => {
                tracing::info!(comment_id = comment.id, post_id, author_id, "comment added");
                CommentOutcome::Added(comment)
            }
            None => CommentOutcome::PostMissing,
        })
    }

    /// Newest first.
    pub async fn list(&self, post_id: Id) -> Result<Vec<Comment>> {
        self.store.list_comments(post_id).await
    }
}
