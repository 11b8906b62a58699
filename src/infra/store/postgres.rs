use anyhow::Result;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, QueryBuilder, Row};

use crate::domain::comment::{Comment, NewComment};
use crate::domain::group::{Group, GroupSummary, NewGroup};
use crate::domain::post::{NewPost, Post, PostFilter, PostUpdate};
use crate::domain::user::{PublicUser, User};
use crate::domain::Id;
use crate::infra::db::Db;
use crate::infra::store::Store;

const POST_COLUMNS: &str = "SELECT p.id, p.text, p.created, p.image, \
            p.author_id, u.username AS author_username, \
            g.id AS group_id, g.slug AS group_slug, g.title AS group_title \
     FROM posts p \
     JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id";

const COMMENT_COLUMNS: &str = "SELECT c.id, c.post_id, c.text, c.created, \
            c.author_id, u.username AS author_username \
     FROM comments c \
     JOIN users u ON u.id = c.author_id";

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

fn push_post_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: PostFilter) {
    match filter {
        PostFilter::All => {}
        PostFilter::Group(group_id) => {
            builder.push(" WHERE p.group_id = ").push_bind(group_id);
        }
        PostFilter::Author(author_id) => {
            builder.push(" WHERE p.author_id = ").push_bind(author_id);
        }
        PostFilter::FollowedBy(user_id) => {
            builder
                .push(" WHERE p.author_id IN (SELECT author_id FROM follows WHERE user_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }
}

fn map_user(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        created_at: row.get("created_at"),
    }
}

fn map_group(row: &PgRow) -> Group {
    Group {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
    }
}

fn map_post(row: &PgRow) -> Post {
    let group_id: Option<Id> = row.get("group_id");
    let group = group_id.map(|id| GroupSummary {
        id,
        slug: row.get("group_slug"),
        title: row.get("group_title"),
    });

    Post {
        id: row.get("id"),
        text: row.get("text"),
        created: row.get("created"),
        author: PublicUser {
            id: row.get("author_id"),
            username: row.get("author_username"),
        },
        group,
        image: row.get("image"),
    }
}

fn map_comment(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author: PublicUser {
            id: row.get("author_id"),
            username: row.get("author_username"),
        },
        text: row.get("text"),
        created: row.get("created"),
    }
}

#[axum::async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn create_user(&self, username: &str) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (username) VALUES ($1) RETURNING id, username, created_at",
        )
        .bind(username)
        .fetch_one(self.db.pool())
        .await?;

        Ok(map_user(&row))
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, username, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(map_user))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, username, created_at FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(map_user))
    }

    async fn delete_user(&self, id: Id) -> Result<bool> {
        // posts, comments and follows go with the user via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_group(&self, new: NewGroup) -> Result<Group> {
        let row = sqlx::query(
            "INSERT INTO groups (title, slug, description) VALUES ($1, $2, $3) \
             RETURNING id, title, slug, description",
        )
        .bind(new.title)
        .bind(new.slug)
        .bind(new.description)
        .fetch_one(self.db.pool())
        .await?;

        Ok(map_group(&row))
    }

    async fn get_group(&self, id: Id) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, title, slug, description FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(map_group))
    }

    async fn get_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, title, slug, description FROM groups WHERE slug = $1")
            .bind(slug)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(map_group))
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT id, title, slug, description FROM groups ORDER BY title, id")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows.iter().map(map_group).collect())
    }

    async fn delete_group(&self, id: Id) -> Result<bool> {
        // posts.group_id is ON DELETE SET NULL
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<usize> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        push_post_filter(&mut builder, filter);
        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(self.db.pool())
            .await?;

        Ok(usize::try_from(count)?)
    }

    async fn list_posts(
        &self,
        filter: PostFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let mut builder = QueryBuilder::<Postgres>::new(POST_COLUMNS);
        push_post_filter(&mut builder, filter);
        builder
            .push(" ORDER BY p.created DESC, p.id DESC LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(offset)?);

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        Ok(rows.iter().map(map_post).collect())
    }

    async fn get_post(&self, id: Id) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE p.id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        Ok(row.as_ref().map(map_post))
    }

    async fn create_post(&self, new: NewPost) -> Result<Post> {
        let mut tx = self.db.pool().begin().await?;

        let id: Id = sqlx::query_scalar(
            "INSERT INTO posts (author_id, text, group_id, image) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(new.author_id)
        .bind(new.text)
        .bind(new.group_id)
        .bind(new.image)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("{} WHERE p.id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(map_post(&row))
    }

    async fn update_post(
        &self,
        id: Id,
        editor_id: Id,
        update: PostUpdate,
    ) -> Result<Option<Post>> {
        let mut tx = self.db.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE posts \
             SET text = $3, group_id = $4, image = COALESCE($5, image) \
             WHERE id = $1 AND author_id = $2",
        )
        .bind(id)
        .bind(editor_id)
        .bind(update.text)
        .bind(update.group_id)
        .bind(update.image)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(&format!("{} WHERE p.id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(map_post(&row)))
    }

    async fn delete_post(&self, id: Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_comments(&self, post_id: Id) -> Result<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "{} WHERE c.post_id = $1 ORDER BY c.created DESC, c.id DESC",
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(map_comment).collect())
    }

    async fn create_comment(&self, new: NewComment) -> Result<Option<Comment>> {
        let mut tx = self.db.pool().begin().await?;

        let post_exists: Option<Id> =
            sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR SHARE")
                .bind(new.post_id)
                .fetch_optional(&mut *tx)
                .await?;
        if post_exists.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let id: Id = sqlx::query_scalar(
            "INSERT INTO comments (post_id, author_id, text) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(new.post_id)
        .bind(new.author_id)
        .bind(new.text)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query(&format!("{} WHERE c.id = $1", COMMENT_COLUMNS))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(map_comment(&row)))
    }

    async fn follow(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        // The schema has no unique (user_id, author_id) constraint, so the
        // existence check and the insert share one statement.
        let result = sqlx::query(
            "INSERT INTO follows (user_id, author_id) \
             SELECT $1, $2 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2 \
             )",
        )
        .bind(user_id)
        .bind(author_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unfollow(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_following(&self, user_id: Id, author_id: Id) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(self.db.pool())
        .await?;

        Ok(exists)
    }

    async fn follower_count(&self, author_id: Id) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(usize::try_from(count)?)
    }

    async fn following_count(&self, user_id: Id) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(usize::try_from(count)?)
    }
}
