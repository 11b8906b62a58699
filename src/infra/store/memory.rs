use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::domain::comment::{Comment, NewComment};
use crate::domain::group::{Group, GroupSummary, NewGroup};
use crate::domain::post::{NewPost, Post, PostFilter, PostUpdate};
use crate::domain::social_graph::Follow;
use crate::domain::user::{PublicUser, User};
use crate::domain::Id;
use crate::infra::store::Store;

#[derive(Debug, Clone)]
struct PostRow {
    id: Id,
    text: String,
    created: OffsetDateTime,
    author_id: Id,
    group_id: Option<Id>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: Id,
    post_id: Id,
    author_id: Id,
    text: String,
    created: OffsetDateTime,
}

#[derive(Default)]
struct State {
    users: BTreeMap<Id, User>,
    groups: BTreeMap<Id, Group>,
    posts: BTreeMap<Id, PostRow>,
    comments: BTreeMap<Id, CommentRow>,
    follows: Vec<Follow>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn matches(&self, row: &PostRow, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(group_id) => row.group_id == Some(group_id),
            PostFilter::Author(author_id) => row.author_id == author_id,
            PostFilter::FollowedBy(user_id) => self
                .follows
                .iter()
                .any(|edge| edge.user_id == user_id && edge.author_id == row.author_id),
        }
    }

    fn hydrate_post(&self, row: &PostRow) -> Result<Post> {
        let author = self
            .users
            .get(&row.author_id)
            .ok_or_else(|| anyhow!("post {} references missing user {}", row.id, row.author_id))?;
        let group = row
            .group_id
            .and_then(|group_id| self.groups.get(&group_id))
            .map(GroupSummary::from);

        Ok(Post {
            id: row.id,
            text: row.text.clone(),
            created: row.created,
            author: PublicUser::from(author),
            group,
            image: row.image.clone(),
        })
    }

    fn hydrate_comment(&self, row: &CommentRow) -> Result<Comment> {
        let author = self.users.get(&row.author_id).ok_or_else(|| {
            anyhow!("comment {} references missing user {}", row.id, row.author_id)
        })?;

        Ok(Comment {
            id: row.id,
            post_id: row.post_id,
            author: PublicUser::from(author),
            text: row.text.clone(),
            created: row.created,
        })
    }

    /// Matching rows, newest first.
    fn ordered_posts(&self, filter: PostFilter) -> Vec<&PostRow> {
        let mut rows: Vec<&PostRow> = self
            .posts
            .values()
            .filter(|row| self.matches(row, filter))
            .collect();
        rows.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        rows
    }
}

/// In-process store. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[axum::async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_user(&self, username: &str) -> Result<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|user| user.username == username) {
            return Err(anyhow!("username already taken: {}", username));
        }
        let id = state.next_id();
        let user = User {
            id,
            username: username.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn delete_user(&self, id: Id) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }
        state.posts.retain(|_, row| row.author_id != id);
        let State {
            posts, comments, ..
        } = &mut *state;
        comments.retain(|_, row| row.author_id != id && posts.contains_key(&row.post_id));
        state
            .follows
            .retain(|edge| edge.user_id != id && edge.author_id != id);
        Ok(true)
    }

    async fn create_group(&self, new: NewGroup) -> Result<Group> {
        let mut state = self.state.write().await;
        if state.groups.values().any(|group| group.slug == new.slug) {
            return Err(anyhow!("group slug already taken: {}", new.slug));
        }
        let id = state.next_id();
        let group = Group {
            id,
            title: new.title,
            slug: new.slug,
            description: new.description,
        };
        state.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn get_group(&self, id: Id) -> Result<Option<Group>> {
        Ok(self.state.read().await.groups.get(&id).cloned())
    }

    async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let state = self.state.read().await;
        Ok(state.groups.values().find(|group| group.slug == slug).cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let state = self.state.read().await;
        let mut groups: Vec<Group> = state.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn delete_group(&self, id: Id) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.groups.remove(&id).is_none() {
            return Ok(false);
        }
        for row in state.posts.values_mut() {
            if row.group_id == Some(id) {
                row.group_id = None;
            }
        }
        Ok(true)
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .values()
            .filter(|row| state.matches(row, filter))
            .count())
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let state = self.state.read().await;
        state
            .ordered_posts(filter)
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| state.hydrate_post(row))
            .collect()
    }

    async fn get_post(&self, id: Id) -> Result<Option<Post>> {
        let state = self.state.read().await;
        state
            .posts
            .get(&id)
            .map(|row| state.hydrate_post(row))
            .transpose()
    }

    async fn create_post(&self, new: NewPost) -> Result<Post> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&new.author_id) {
            return Err(anyhow!("unknown author {}", new.author_id));
        }
        if let Some(group_id) = new.group_id {
            if !state.groups.contains_key(&group_id) {
                return Err(anyhow!("unknown group {}", group_id));
            }
        }
        let id = state.next_id();
        let row = PostRow {
            id,
            text: new.text,
            created: OffsetDateTime::now_utc(),
            author_id: new.author_id,
            group_id: new.group_id,
            image: new.image,
        };
        state.posts.insert(id, row.clone());
        state.hydrate_post(&row)
    }

    async fn update_post(
        &self,
        id: Id,
        editor_id: Id,
        update: PostUpdate,
    ) -> Result<Option<Post>> {
        let mut state = self.state.write().await;
        if let Some(group_id) = update.group_id {
            if !state.groups.contains_key(&group_id) {
                return Err(anyhow!("unknown group {}", group_id));
            }
        }
        let row = match state.posts.get_mut(&id) {
            Some(row) if row.author_id == editor_id => row,
            _ => return Ok(None),
        };
        row.text = update.text;
        row.group_id = update.group_id;
        if let Some(image) = update.image {
            row.image = Some(image);
        }
        let row = row.clone();
        state.hydrate_post(&row).map(Some)
    }

    async fn delete_post(&self, id: Id) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.posts.remove(&id).is_none() {
            return Ok(false);
        }
        state.comments.retain(|_, row| row.post_id != id);
        Ok(true)
    }

    async fn list_comments(&self, post_id: Id) -> Result<Vec<Comment>> {
        let state = self.state.read().await;
        let mut rows: Vec<&CommentRow> = state
            .comments
            .values()
            .filter(|row| row.post_id == post_id)
            .collect();
        rows.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        rows.into_iter()
            .map(|row| state.hydrate_comment(row))
            .collect()
    }

    async fn create_comment(&self, new: NewComment) -> Result<Option<Comment>> {
        let mut state = self.state.write().await;
        if !state.posts.contains_key(&new.post_id) {
            return Ok(None);
        }
        if !state.users.contains_key(&new.author_id) {
            return Err(anyhow!("unknown author {}", new.author_id));
        }
        let id = state.next_id();
        let row = CommentRow {
            id,
            post_id: new.post_id,
            author_id: new.author_id,
            text: new.text,
            created: OffsetDateTime::now_utc(),
        };
        state.comments.insert(id, row.clone());
        state.hydrate_comment(&row).map(Some)
    }

    async fn follow(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) || !state.users.contains_key(&author_id) {
            return Err(anyhow!("unknown user in follow {} -> {}", user_id, author_id));
        }
        let exists = state
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id);
        if exists {
            return Ok(false);
        }
        state.follows.push(Follow {
            user_id,
            author_id,
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(true)
    }

    async fn unfollow(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let mut state = self.state.write().await;
        let before = state.follows.len();
        state
            .follows
            .retain(|edge| !(edge.user_id == user_id && edge.author_id == author_id));
        Ok(state.follows.len() != before)
    }

    async fn is_following(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .follows
            .iter()
            .any(|edge| edge.user_id == user_id && edge.author_id == author_id))
    }

    async fn follower_count(&self, author_id: Id) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .follows
            .iter()
            .filter(|edge| edge.author_id == author_id)
            .count())
    }

    async fn following_count(&self, user_id: Id) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .follows
            .iter()
            .filter(|edge| edge.user_id == user_id)
            .count())
    }
}
