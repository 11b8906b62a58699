use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, StatusCode};
use axum::Form;
use bytes::BytesMut;
use serde::Deserialize;

use crate::app::media::Upload;
use crate::app::posts::PostFormData;
use crate::http::AppError;
use crate::AppState;

/// Post form body, accepted as `multipart/form-data` (needed for images) or
/// `application/x-www-form-urlencoded`.
pub struct PostFormInput(pub PostFormData);

#[derive(Deserialize)]
struct UrlencodedPostForm {
    #[serde(default)]
    text: String,
    #[serde(default)]
    group: String,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

#[axum::async_trait]
impl FromRequest<AppState> for PostFormInput {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Form(form) = Form::<UrlencodedPostForm>::from_request(req, state)
                .await
                .map_err(|err| AppError::bad_request(err.body_text()))?;
            return Ok(Self(PostFormData {
                text: form.text,
                group: form.group,
                image: None,
            }));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        let mut data = PostFormData::default();
        // set once the image outgrew the upload limit; the rest of the body
        // may then be cut off by the request limit
        let mut image_too_large = false;
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(err) if image_too_large && is_cut_off(&err) => break,
                Err(err) => return Err(AppError::bad_request(err.body_text())),
            };
            let name = field.name().unwrap_or_default().to_string();
            let result = match name.as_str() {
                "text" => read_text(field).await.map(|text| data.text = text),
                "group" => read_text(field).await.map(|group| data.group = group),
                "image" => {
                    let filename = field.file_name().map(str::to_string);
                    let (bytes, cut_off) = read_upload(field, state.upload_max_bytes).await?;
                    image_too_large = bytes.len() > state.upload_max_bytes;
                    if cut_off && !image_too_large {
                        return Err(AppError::bad_request("request body too large"));
                    }
                    // browsers send an empty part when no file was chosen
                    if !bytes.is_empty() {
                        data.image = Some(Upload {
                            filename,
                            bytes: bytes.freeze(),
                        });
                    }
                    if cut_off {
                        break;
                    }
                    Ok(())
                }
                _ => Ok(()),
            };
            match result {
                Ok(()) => {}
                Err(err) if image_too_large && is_cut_off(&err) => break,
                Err(err) => return Err(AppError::bad_request(err.body_text())),
            }
        }
        Ok(Self(data))
    }
}

fn is_cut_off(err: &MultipartError) -> bool {
    err.status() == StatusCode::PAYLOAD_TOO_LARGE
}

/// Buffers an upload up to one chunk past `max_bytes` and drains the rest.
/// The flag reports that the request body limit ended the part early.
async fn read_upload(
    mut field: Field<'_>,
    max_bytes: usize,
) -> Result<(BytesMut, bool), AppError> {
    let mut bytes = BytesMut::new();
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if bytes.len() <= max_bytes {
                    bytes.extend_from_slice(&chunk);
                }
            }
            Ok(None) => return Ok((bytes, false)),
            Err(err) if is_cut_off(&err) => return Ok((bytes, true)),
            Err(err) => return Err(AppError::bad_request(err.body_text())),
        }
    }
}

async fn read_text(field: Field<'_>) -> Result<String, MultipartError> {
    field.text().await
}
