use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

/// Blob store for uploaded post images, addressed by relative keys such as
/// `posts/<digest>.png`.
#[derive(Clone)]
pub enum ObjectStorage {
    S3 { client: Client, bucket: String },
    Local { root: PathBuf },
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

impl ObjectStorage {
    /// S3 when a bucket is configured, otherwise a directory under `MEDIA_ROOT`.
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let Some(bucket) = config.s3_bucket.clone() else {
            return Ok(Self::local(&config.media_root));
        };

        let region_provider = RegionProviderChain::first_try(Region::new(config.s3_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned());
        s3_builder.set_endpoint_url(config.s3_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(s3_builder.build());

        Ok(Self::S3 { client, bucket })
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::Local { root: root.into() }
    }

    pub async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        check_key(key)?;
        match self {
            Self::S3 { client, bucket } => {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .content_type(content_type)
                    .body(ByteStream::from(bytes))
                    .send()
                    .await?;
            }
            Self::Local { root } => {
                let path = root.join(key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, &bytes).await?;
            }
        }
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        match self {
            Self::S3 { client, bucket } => {
                match client.head_object().bucket(bucket).key(key).send().await {
                    Ok(_) => Ok(true),
                    Err(err)
                        if err
                            .as_service_error()
                            .map(|service| service.is_not_found())
                            .unwrap_or(false) =>
                    {
                        Ok(false)
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Self::Local { root } => Ok(tokio::fs::try_exists(root.join(key)).await?),
        }
    }

    /// Removes the object. Missing objects are not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        check_key(key)?;
        match self {
            Self::S3 { client, bucket } => {
                client.delete_object().bucket(bucket).key(key).send().await?;
            }
            Self::Local { root } => match tokio::fs::remove_file(root.join(key)).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            },
        }
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        if check_key(key).is_err() {
            return Ok(None);
        }
        match self {
            Self::S3 { client, bucket } => {
                let object = match client.get_object().bucket(bucket).key(key).send().await {
                    Ok(object) => object,
                    Err(err) => {
                        if err
                            .as_service_error()
                            .map(|service| service.is_no_such_key())
                            .unwrap_or(false)
                        {
                            return Ok(None);
                        }
                        return Err(err.into());
                    }
                };
                let content_type = object
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| content_type_for_key(key).to_string());
                let bytes = object.body.collect().await?.into_bytes();
                Ok(Some(StoredObject { bytes, content_type }))
            }
            Self::Local { root } => match tokio::fs::read(root.join(key)).await {
                Ok(data) => Ok(Some(StoredObject {
                    bytes: Bytes::from(data),
                    content_type: content_type_for_key(key).to_string(),
                })),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            },
        }
    }
}

fn check_key(key: &str) -> Result<()> {
    let path = Path::new(key);
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || path.components().any(|c| !matches!(c, std::path::Component::Normal(_)))
    {
        return Err(anyhow!("invalid object key"));
    }
    Ok(())
}

pub fn content_type_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
