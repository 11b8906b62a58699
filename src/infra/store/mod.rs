//! Relational entity store.
//!
//! Services talk to storage only through [`Store`]. Two backends exist:
//! [`postgres::PgStore`] for deployments and [`memory::MemoryStore`] for
//! tests and local runs without a database. Every mutating method runs as a
//! single unit: a scoped transaction on Postgres, one held write lock in
//! memory.

use anyhow::Result;
use std::sync::Arc;

use crate::domain::comment::{Comment, NewComment};
use crate::domain::group::{Group, NewGroup};
use crate::domain::post::{NewPost, Post, PostFilter, PostUpdate};
use crate::domain::user::User;
use crate::domain::Id;

pub mod memory;
pub mod postgres;

pub type SharedStore = Arc<dyn Store>;

#[axum::async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn create_user(&self, username: &str) -> Result<User>;
    async fn get_user(&self, id: Id) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Removes the user together with their posts, comments and follow edges.
    async fn delete_user(&self, id: Id) -> Result<bool>;

    async fn create_group(&self, new: NewGroup) -> Result<Group>;
    async fn get_group(&self, id: Id) -> Result<Option<Group>>;
    async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>>;
    async fn list_groups(&self) -> Result<Vec<Group>>;
    /// Posts of a deleted group survive with their group cleared.
    async fn delete_group(&self, id: Id) -> Result<bool>;

    async fn count_posts(&self, filter: PostFilter) -> Result<usize>;
    /// Posts matching `filter`, newest first (`created DESC, id DESC`).
    async fn list_posts(&self, filter: PostFilter, offset: usize, limit: usize)
        -> Result<Vec<Post>>;
    async fn get_post(&self, id: Id) -> Result<Option<Post>>;
    async fn create_post(&self, new: NewPost) -> Result<Post>;
    /// Applies `update` only when `editor_id` is the post's author. Returns
    /// `None` when no such post exists for that author.
    async fn update_post(&self, id: Id, editor_id: Id, update: PostUpdate)
        -> Result<Option<Post>>;
    /// Removes the post and its comments.
    async fn delete_post(&self, id: Id) -> Result<bool>;

    /// Comments on a post, newest first.
    async fn list_comments(&self, post_id: Id) -> Result<Vec<Comment>>;
    /// Returns `None` when the post does not exist.
    async fn create_comment(&self, new: NewComment) -> Result<Option<Comment>>;

    /// Creates the edge unless it already exists. Returns whether it was created.
    async fn follow(&self, user_id: Id, author_id: Id) -> Result<bool>;
    /// Returns whether an edge was removed.
    async fn unfollow(&self, user_id: Id, author_id: Id) -> Result<bool>;
    async fn is_following(&self, user_id: Id, author_id: Id) -> Result<bool>;
    /// Number of edges pointing at `author_id`.
    async fn follower_count(&self, author_id: Id) -> Result<usize>;
    /// Number of edges starting at `user_id`.
    async fn following_count(&self, user_id: Id) -> Result<usize>;
}
