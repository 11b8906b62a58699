use anyhow::Result;

use crate::domain::Id;
use crate::infra::store::SharedStore;

#[derive(Clone)]
pub struct SocialService {
    store: SharedStore,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct FollowCounts {
    pub followers: usize,
    pub following: usize,
}

impl SocialService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Idempotent. Returns whether a new edge was created.
    pub async fn follow(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let created = self.store.follow(user_id, author_id).await?;
        if created {
            tracing::info!(user_id, author_id, "follow created");
        }
        Ok(created)
    }

    /// Removing an absent edge is a no-op.
    pub async fn unfollow(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let removed = self.store.unfollow(user_id, author_id).await?;
        if removed {
            tracing::info!(user_id, author_id, "follow removed");
        }
        Ok(removed)
    }

    /// Follow status shown on an author's profile. Anonymous viewers and
    /// authors looking at their own profile never "follow".
    pub async fn is_following(&self, viewer_id: Option<Id>, author_id: Id) -> Result<bool> {
        match viewer_id {
            Some(viewer_id) if viewer_id != author_id => {
                self.store.is_following(viewer_id, author_id).await
            }
            _ => Ok(false),
        }
    }

    pub async fn counts(&self, user_id: Id) -> Result<FollowCounts> {
        Ok(FollowCounts {
            followers: self.store.follower_count(user_id).await?,
            following: self.store.following_count(user_id).await?,
        })
    }
}
