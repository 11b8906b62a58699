//! Store behaviour shared by every backend
//!
//! Each case runs against the in-memory store, and against Postgres when
//! `DATABASE_URL` is set. The Postgres cases share one database, so every
//! case creates uniquely named rows and only counts what it created.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;

use scribe::domain::comment::NewComment;
use scribe::domain::group::{Group, NewGroup};
use scribe::domain::post::{NewPost, Post, PostFilter, PostUpdate};
use scribe::domain::user::User;
use scribe::domain::Id;
use scribe::infra::db::Db;
use scribe::infra::store::postgres::PgStore;
use scribe::infra::store::Store;

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

static SCHEMA_APPLIED: OnceCell<()> = OnceCell::const_new();

async fn connect(url: &str) -> Db {
    let mut config = common::test_config();
    config.db_max_connections = 4;
    config.db_connect_timeout_seconds = 10;
    config.db_idle_timeout_seconds = 30;
    config.db_max_lifetime_seconds = 60;
    Db::connect(&config, url)
        .await
        .expect("failed to connect to DATABASE_URL")
}

/// A fresh pool per test; the schema is applied once per test binary.
async fn pg_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    SCHEMA_APPLIED
        .get_or_init(|| async {
            connect(&url).await.migrate().await.expect("migration failed");
        })
        .await;
    Some(PgStore::new(connect(&url).await))
}

macro_rules! store_cases {
    ($($case:ident),* $(,)?) => {
        mod memory {
            use scribe::infra::store::memory::MemoryStore;
            $(
                #[tokio::test]
                async fn $case() {
                    super::$case(&MemoryStore::new()).await;
                }
            )*
        }

        mod postgres {
            $(
                #[tokio::test]
                async fn $case() {
                    let Some(store) = super::pg_store().await else {
                        eprintln!("DATABASE_URL not set, skipping");
                        return;
                    };
                    super::$case(&store).await;
                }
            )*
        }
    };
}

store_cases!(
    posts_page_newest_first,
    deleting_group_clears_posts,
    deleting_post_removes_comments,
    deleting_user_removes_their_rows,
    update_is_author_only_and_keeps_image,
    follow_is_idempotent,
    followed_by_filter_selects_followed_authors,
    comments_need_a_post_and_list_newest_first,
    usernames_and_slugs_are_unique,
);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

static SEQ: AtomicUsize = AtomicUsize::new(0);

fn unique(prefix: &str) -> String {
    format!(
        "{}-{}-{}-{}",
        prefix,
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed),
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    )
}

async fn user(store: &dyn Store, prefix: &str) -> User {
    store
        .create_user(&unique(prefix))
        .await
        .expect("create_user failed")
}

async fn group(store: &dyn Store) -> Group {
    let slug = unique("group");
    store
        .create_group(NewGroup {
            title: "Group".into(),
            slug,
            description: String::new(),
        })
        .await
        .expect("create_group failed")
}

async fn post(store: &dyn Store, author: &User, group: Option<&Group>, text: &str) -> Post {
    store
        .create_post(NewPost {
            author_id: author.id,
            text: text.into(),
            group_id: group.map(|g| g.id),
            image: None,
        })
        .await
        .expect("create_post failed")
}

async fn comment(store: &dyn Store, post_id: Id, author: &User, text: &str) {
    store
        .create_comment(NewComment {
            post_id,
            author_id: author.id,
            text: text.into(),
        })
        .await
        .expect("create_comment failed")
        .expect("post should exist");
}

fn ids(posts: &[Post]) -> Vec<Id> {
    posts.iter().map(|p| p.id).collect()
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

async fn posts_page_newest_first(store: &dyn Store) {
    let author = user(store, "author").await;
    let first = post(store, &author, None, "one").await;
    let second = post(store, &author, None, "two").await;
    let third = post(store, &author, None, "three").await;
    let filter = PostFilter::Author(author.id);

    assert_eq!(store.count_posts(filter).await.unwrap(), 3);
    let page = store.list_posts(filter, 0, 2).await.unwrap();
    assert_eq!(ids(&page), vec![third.id, second.id]);
    let rest = store.list_posts(filter, 2, 2).await.unwrap();
    assert_eq!(ids(&rest), vec![first.id]);
    assert!(store.list_posts(filter, 4, 2).await.unwrap().is_empty());
}

async fn deleting_group_clears_posts(store: &dyn Store) {
    let author = user(store, "author").await;
    let group = group(store).await;
    let kept = post(store, &author, Some(&group), "in group").await;
    assert_eq!(kept.group_id(), Some(group.id));

    assert!(store.delete_group(group.id).await.unwrap());
    assert!(!store.delete_group(group.id).await.unwrap());

    let kept = store.get_post(kept.id).await.unwrap().expect("post survives");
    assert_eq!(kept.group, None);
    assert_eq!(kept.text, "in group");
    assert!(store.get_group(group.id).await.unwrap().is_none());
    assert_eq!(store.count_posts(PostFilter::Group(group.id)).await.unwrap(), 0);
}

async fn deleting_post_removes_comments(store: &dyn Store) {
    let author = user(store, "author").await;
    let doomed = post(store, &author, None, "doomed").await;
    comment(store, doomed.id, &author, "first").await;
    comment(store, doomed.id, &author, "second").await;

    assert!(store.delete_post(doomed.id).await.unwrap());

    assert!(store.get_post(doomed.id).await.unwrap().is_none());
    assert!(store.list_comments(doomed.id).await.unwrap().is_empty());
}

async fn deleting_user_removes_their_rows(store: &dyn Store) {
    let author = user(store, "author").await;
    let reader = user(store, "reader").await;
    let bystander = user(store, "bystander").await;
    let authored = post(store, &author, None, "by author").await;
    let other = post(store, &bystander, None, "by bystander").await;
    comment(store, other.id, &author, "author was here").await;
    comment(store, other.id, &reader, "reader was here").await;
    store.follow(reader.id, author.id).await.unwrap();
    store.follow(author.id, bystander.id).await.unwrap();

    assert!(store.delete_user(author.id).await.unwrap());

    assert!(store.get_user(author.id).await.unwrap().is_none());
    assert!(store.get_post(authored.id).await.unwrap().is_none());
    let remaining = store.list_comments(other.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].author.id, reader.id);
    assert_eq!(store.following_count(reader.id).await.unwrap(), 0);
    assert_eq!(store.follower_count(bystander.id).await.unwrap(), 0);
}

async fn update_is_author_only_and_keeps_image(store: &dyn Store) {
    let author = user(store, "author").await;
    let other = user(store, "other").await;
    let group = group(store).await;
    let original = store
        .create_post(NewPost {
            author_id: author.id,
            text: "orig".into(),
            group_id: None,
            image: Some("posts/first.png".into()),
        })
        .await
        .unwrap();

    let foreign = store
        .update_post(
            original.id,
            other.id,
            PostUpdate {
                text: "stolen".into(),
                group_id: None,
                image: None,
            },
        )
        .await
        .unwrap();
    assert!(foreign.is_none());
    assert_eq!(store.get_post(original.id).await.unwrap().unwrap().text, "orig");

    let edited = store
        .update_post(
            original.id,
            author.id,
            PostUpdate {
                text: "edited".into(),
                group_id: Some(group.id),
                image: None,
            },
        )
        .await
        .unwrap()
        .expect("author may edit");
    assert_eq!(edited.text, "edited");
    assert_eq!(edited.group_id(), Some(group.id));
    assert_eq!(edited.image.as_deref(), Some("posts/first.png"));
    assert_eq!(edited.created, original.created);

    let replaced = store
        .update_post(
            original.id,
            author.id,
            PostUpdate {
                text: "edited".into(),
                group_id: None,
                image: Some("posts/second.png".into()),
            },
        )
        .await
        .unwrap()
        .expect("author may edit");
    assert_eq!(replaced.image.as_deref(), Some("posts/second.png"));
    assert_eq!(replaced.group, None);

    let missing = store
        .update_post(
            original.id + 1_000_000,
            author.id,
            PostUpdate {
                text: "ghost".into(),
                group_id: None,
                image: None,
            },
        )
        .await
        .unwrap();
    assert!(missing.is_none());
}

async fn follow_is_idempotent(store: &dyn Store) {
    let author = user(store, "author").await;
    let reader = user(store, "reader").await;

    assert!(store.follow(reader.id, author.id).await.unwrap());
    assert!(!store.follow(reader.id, author.id).await.unwrap());
    assert!(store.is_following(reader.id, author.id).await.unwrap());
    assert!(!store.is_following(author.id, reader.id).await.unwrap());
    assert_eq!(store.follower_count(author.id).await.unwrap(), 1);
    assert_eq!(store.following_count(reader.id).await.unwrap(), 1);

    assert!(store.unfollow(reader.id, author.id).await.unwrap());
    assert!(!store.unfollow(reader.id, author.id).await.unwrap());
    assert_eq!(store.follower_count(author.id).await.unwrap(), 0);
}

async fn followed_by_filter_selects_followed_authors(store: &dyn Store) {
    let reader = user(store, "reader").await;
    let followed = user(store, "followed").await;
    let stranger = user(store, "stranger").await;
    let older = post(store, &followed, None, "older").await;
    post(store, &stranger, None, "unseen").await;
    let newer = post(store, &followed, None, "newer").await;
    let filter = PostFilter::FollowedBy(reader.id);

    assert_eq!(store.count_posts(filter).await.unwrap(), 0);

    store.follow(reader.id, followed.id).await.unwrap();

    assert_eq!(store.count_posts(filter).await.unwrap(), 2);
    let feed = store.list_posts(filter, 0, 10).await.unwrap();
    assert_eq!(ids(&feed), vec![newer.id, older.id]);
}

async fn comments_need_a_post_and_list_newest_first(store: &dyn Store) {
    let author = user(store, "author").await;
    let target = post(store, &author, None, "target").await;

    let orphan = store
        .create_comment(NewComment {
            post_id: target.id + 1_000_000,
            author_id: author.id,
            text: "nowhere".into(),
        })
        .await
        .unwrap();
    assert!(orphan.is_none());

    comment(store, target.id, &author, "first").await;
    comment(store, target.id, &author, "second").await;

    let texts: Vec<String> = store
        .list_comments(target.id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(texts, vec!["second", "first"]);
}

async fn usernames_and_slugs_are_unique(store: &dyn Store) {
    let existing = user(store, "taken").await;
    assert!(store.create_user(&existing.username).await.is_err());

    let group = group(store).await;
    let duplicate = store
        .create_group(NewGroup {
            title: "Other".into(),
            slug: group.slug.clone(),
            description: String::new(),
        })
        .await;
    assert!(duplicate.is_err());
}
