use super::{AppState, Result, WebError};
use crate::coordinator::CreateProfile;
use crate::core::{PictureData, ProfileId, UserProfile};
use axum::Json;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

const PICTURE_FIELD: &str = "profilePicture";

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

pub async fn healthcheck() -> Json<ApiMessage> {
    Json(ApiMessage {
        message: "ok".to_string(),
    })
}

pub async fn create_user(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<UserProfile>)> {
    let form = ProfileForm::read(multipart?).await?;

    let profile = state
        .coordinator
        .create(CreateProfile {
            name: form.name,
            email: form.email,
            picture: form.picture,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>> {
    let profile = state.coordinator.fetch(&ProfileId::new(id)).await?;
    Ok(Json(profile))
}

pub async fn replace_picture(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UserProfile>> {
    let form = ProfileForm::read(multipart?).await?;
    let picture = form
        .picture
        .ok_or_else(|| WebError::Input(format!("{PICTURE_FIELD} file is required")))?;

    let profile = state
        .coordinator
        .replace_picture(&ProfileId::new(id), picture)
        .await?;
    Ok(Json(profile))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiMessage>> {
    let outcome = state.coordinator.delete(&ProfileId::new(id)).await?;

    let message = if outcome.picture_removed {
        "User and profile picture deleted successfully"
    } else {
        "User deleted successfully"
    };
    Ok(Json(ApiMessage {
        message: message.to_string(),
    }))
}

/// Fields of the profile forms. Unknown parts are ignored.
#[derive(Debug, Default)]
struct ProfileForm {
    name: Option<String>,
    email: Option<String>,
    picture: Option<PictureData>,
}

impl ProfileForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(input_error)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                // Text fields are stored exactly as sent.
                Some("name") => form.name = Some(field.text().await.map_err(input_error)?),
                Some("email") => form.email = Some(field.text().await.map_err(input_error)?),
                Some(PICTURE_FIELD) => {
                    let file_name = field.file_name().map(str::to_string);
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(input_error)?;

                    // Browsers send an empty part when no file was chosen, and
                    // FormData turns a missing file into a plain text part.
                    if bytes.is_empty() || (file_name.is_none() && content_type.is_none()) {
                        continue;
                    }

                    let mut picture = PictureData::new(bytes);
                    picture.file_name = file_name;
                    picture.content_type = content_type;
                    form.picture = Some(picture);
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

fn input_error(err: MultipartError) -> WebError {
    WebError::Input(err.body_text())
}
