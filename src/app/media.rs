use anyhow::Result;
use bytes::Bytes;
use image::ImageFormat;
use sha2::{Digest, Sha256};

use crate::infra::storage::{ObjectStorage, StoredObject};

/// A file part received with a post form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Bytes,
}

/// An upload that decoded as one of the accepted image formats.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    format: ImageFormat,
    bytes: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRejection {
    TooLarge,
    NotAnImage,
}

impl ImageRejection {
    pub fn message(&self) -> &'static str {
        match self {
            Self::TooLarge => "The submitted file is too large.",
            Self::NotAnImage => {
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image."
            }
        }
    }
}

/// Key of a stored image. `fresh` is set when this upload created the object
/// rather than finding identical content already stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub key: String,
    pub fresh: bool,
}

#[derive(Clone)]
pub struct MediaService {
    storage: ObjectStorage,
    max_bytes: usize,
}

impl MediaService {
    pub fn new(storage: ObjectStorage, max_bytes: usize) -> Self {
        Self { storage, max_bytes }
    }

    /// Checks size and decodes the full image; nothing is stored.
    pub fn inspect(&self, upload: &Upload) -> Result<ImageUpload, ImageRejection> {
        if upload.bytes.len() > self.max_bytes {
            return Err(ImageRejection::TooLarge);
        }
        let format = image::guess_format(&upload.bytes).map_err(|_| ImageRejection::NotAnImage)?;
        if extension_for_format(format).is_none() {
            return Err(ImageRejection::NotAnImage);
        }
        image::load_from_memory_with_format(&upload.bytes, format).map_err(|err| {
            tracing::debug!(error = %err, filename = ?upload.filename, "rejected image upload");
            ImageRejection::NotAnImage
        })?;
        Ok(ImageUpload {
            format,
            bytes: upload.bytes.clone(),
        })
    }

    /// Stores the image under a content-addressed key.
    pub async fn store(&self, image: ImageUpload) -> Result<StoredImage> {
        let (ext, content_type) = extension_for_format(image.format)
            .ok_or_else(|| anyhow::anyhow!("unsupported image format"))?;
        let digest = hex::encode(Sha256::digest(&image.bytes));
        let key = format!("posts/{}.{}", digest, ext);
        let fresh = !self.storage.exists(&key).await?;
        if fresh {
            self.storage.put(&key, image.bytes, content_type).await?;
            tracing::info!(key = %key, "stored post image");
        }
        Ok(StoredImage { key, fresh })
    }

    /// Drops an image whose post was never written. Objects that existed
    /// before the upload may back other posts and are kept.
    pub async fn discard(&self, stored: &StoredImage) {
        if !stored.fresh {
            return;
        }
        match self.storage.delete(&stored.key).await {
            Ok(()) => tracing::info!(key = %stored.key, "discarded unused post image"),
            Err(err) => {
                tracing::warn!(error = ?err, key = %stored.key, "failed to discard post image")
            }
        }
    }

    pub async fn open(&self, key: &str) -> Result<Option<StoredObject>> {
        self.storage.get(key).await
    }
}

fn extension_for_format(format: ImageFormat) -> Option<(&'static str, &'static str)> {
    match format {
        ImageFormat::Jpeg => Some(("jpg", "image/jpeg")),
        ImageFormat::Png => Some(("png", "image/png")),
        ImageFormat::Gif => Some(("gif", "image/gif")),
        ImageFormat::WebP => Some(("webp", "image/webp")),
        _ => None,
    }
}
