use anyhow::Result;

use crate::app::pagination::Page;
use crate::app::posts::paginate_posts;
use crate::domain::post::{Post, PostFilter};
use crate::domain::Id;
use crate::infra::store::SharedStore;

#[derive(Clone)]
pub struct FeedService {
    store: SharedStore,
    page_size: usize,
}

impl FeedService {
    pub fn new(store: SharedStore, page_size: usize) -> Self {
        Self { store, page_size }
    }

    /// Posts by every author `user_id` follows, newest first.
    pub async fn follow_feed(&self, user_id: Id, raw_page: Option<&str>) -> Result<Page<Post>> {
        paginate_posts(
            self.store.as_ref(),
            PostFilter::FollowedBy(user_id),
            self.page_size,
            raw_page,
        )
        .await
    }
}
