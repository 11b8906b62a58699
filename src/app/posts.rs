use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::app::media::{ImageUpload, MediaService, StoredImage, Upload};
use crate::app::pagination::{Page, Paginator};
use crate::domain::group::{Group, GroupSummary};
use crate::domain::post::{NewPost, Post, PostFilter, PostUpdate};
use crate::domain::Id;
use crate::infra::store::{SharedStore, Store};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// Fetches one page of posts matching `filter`, slicing at the store.
pub async fn paginate_posts(
    store: &dyn Store,
    filter: PostFilter,
    page_size: usize,
    raw_page: Option<&str>,
) -> Result<Page<Post>> {
    let count = store.count_posts(filter).await?;
    let paginator = Paginator::new(count, page_size);
    let number = paginator.resolve(raw_page);
    let window = paginator.window(number);
    let posts = store.list_posts(filter, window.offset, window.limit).await?;
    Ok(Page::new(posts, number, &paginator))
}

/// Raw post form submission.
#[derive(Debug, Clone, Default)]
pub struct PostFormData {
    pub text: String,
    /// Group id as submitted; empty means no group.
    pub group: String,
    pub image: Option<Upload>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PostFormFields {
    pub text: String,
    pub group: String,
}

/// Form context returned for display and for rejected submissions.
#[derive(Debug, Clone, Serialize)]
pub struct PostForm {
    pub fields: PostFormFields,
    pub errors: BTreeMap<&'static str, Vec<&'static str>>,
    pub groups: Vec<GroupSummary>,
}

pub enum Submission {
    Saved(Post),
    Invalid(PostForm),
}

pub enum EditAccess {
    NotFound,
    /// The post exists but belongs to someone else.
    Forbidden(Post),
    Allowed(Post),
}

struct CleanPost {
    text: String,
    group_id: Option<Id>,
    image: Option<ImageUpload>,
}

#[derive(Clone)]
pub struct PostService {
    store: SharedStore,
    media: MediaService,
    page_size: usize,
}

impl PostService {
    pub fn new(store: SharedStore, media: MediaService, page_size: usize) -> Self {
        Self {
            store,
            media,
            page_size,
        }
    }

    pub async fn list_page(&self, filter: PostFilter, raw_page: Option<&str>) -> Result<Page<Post>> {
        paginate_posts(self.store.as_ref(), filter, self.page_size, raw_page).await
    }

    pub async fn get_post(&self, post_id: Id) -> Result<Option<Post>> {
        self.store.get_post(post_id).await
    }

    pub async fn group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        self.store.get_group_by_slug(slug).await
    }

    pub async fn count_by_author(&self, author_id: Id) -> Result<usize> {
        self.store.count_posts(PostFilter::Author(author_id)).await
    }

    pub async fn empty_form(&self) -> Result<PostForm> {
        Ok(PostForm {
            fields: PostFormFields::default(),
            errors: BTreeMap::new(),
            groups: self.group_choices().await?,
        })
    }

    pub async fn form_for(&self, post: &Post) -> Result<PostForm> {
        Ok(PostForm {
            fields: PostFormFields {
                text: post.text.clone(),
                group: post.group_id().map(|id| id.to_string()).unwrap_or_default(),
            },
            errors: BTreeMap::new(),
            groups: self.group_choices().await?,
        })
    }

    pub async fn create(&self, author_id: Id, data: PostFormData) -> Result<Submission> {
        let clean = match self.clean(data).await? {
            Ok(clean) => clean,
            Err(form) => return Ok(Submission::Invalid(form)),
        };
        let stored = self.store_image(clean.image).await?;

        let created = self
            .store
            .create_post(NewPost {
                author_id,
                text: clean.text,
                group_id: clean.group_id,
                image: stored.as_ref().map(|stored| stored.key.clone()),
            })
            .await;
        let post = match created {
            Ok(post) => post,
            Err(err) => {
                self.discard_image(stored).await;
                return Err(err);
            }
        };
        tracing::info!(post_id = post.id, author_id, "post created");
        Ok(Submission::Saved(post))
    }

    pub async fn load_for_edit(&self, post_id: Id, editor_id: Id) -> Result<EditAccess> {
        Ok(match self.store.get_post(post_id).await? {
            None => EditAccess::NotFound,
            Some(post) if post.author.id != editor_id => EditAccess::Forbidden(post),
            Some(post) => EditAccess::Allowed(post),
        })
    }

    /// Validates and applies an edit. `Ok(None)` when the post vanished or
    /// is no longer owned by `editor_id` at write time.
    pub async fn update(
        &self,
        post_id: Id,
        editor_id: Id,
        data: PostFormData,
    ) -> Result<Option<Submission>> {
        let clean = match self.clean(data).await? {
            Ok(clean) => clean,
            Err(form) => return Ok(Some(Submission::Invalid(form))),
        };
        let stored = self.store_image(clean.image).await?;

        let updated = self
            .store
            .update_post(
                post_id,
                editor_id,
                PostUpdate {
                    text: clean.text,
                    group_id: clean.group_id,
                    image: stored.as_ref().map(|stored| stored.key.clone()),
                },
            )
            .await;
        match updated {
            Ok(Some(post)) => {
                tracing::info!(post_id, editor_id, "post updated");
                Ok(Some(Submission::Saved(post)))
            }
            Ok(None) => {
                self.discard_image(stored).await;
                Ok(None)
            }
            Err(err) => {
                self.discard_image(stored).await;
                Err(err)
            }
        }
    }

    async fn store_image(&self, image: Option<ImageUpload>) -> Result<Option<StoredImage>> {
        match image {
            Some(image) => Ok(Some(self.media.store(image).await?)),
            None => Ok(None),
        }
    }

    async fn discard_image(&self, stored: Option<StoredImage>) {
        if let Some(stored) = stored {
            self.media.discard(&stored).await;
        }
    }

    async fn group_choices(&self) -> Result<Vec<GroupSummary>> {
        let groups = self.store.list_groups().await?;
        Ok(groups.iter().map(GroupSummary::from).collect())
    }

    async fn clean(&self, data: PostFormData) -> Result<Result<CleanPost, PostForm>> {
        let mut errors: BTreeMap<&'static str, Vec<&'static str>> = BTreeMap::new();

        let text = data.text.trim().to_string();
        if text.is_empty() {
            errors.entry("text").or_default().push(REQUIRED);
        }

        let raw_group = data.group.trim();
        let group = match raw_group.parse::<Id>() {
            Ok(id) => self.store.get_group(id).await?,
            Err(_) => None,
        };
        let group_id = group.map(|group| group.id);
        if !raw_group.is_empty() && group_id.is_none() {
            errors.entry("group").or_default().push(INVALID_CHOICE);
        }

        let image = match data.image.as_ref().filter(|upload| !upload.bytes.is_empty()) {
            Some(upload) => match self.media.inspect(upload) {
                Ok(image) => Some(image),
                Err(rejection) => {
                    errors.entry("image").or_default().push(rejection.message());
                    None
                }
            },
            None => None,
        };

        if errors.is_empty() {
            return Ok(Ok(CleanPost {
                text,
                group_id,
                image,
            }));
        }

        Ok(Err(PostForm {
            fields: PostFormFields {
                text: data.text,
                group: data.group,
            },
            errors,
            groups: self.group_choices().await?,
        }))
    }
}
