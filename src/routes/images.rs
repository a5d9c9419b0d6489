use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::domain::save::can_edit;
use crate::error::{AppError, AppResult};
use crate::jobs::{enqueue_job, JOB_PURGE_TEMP_UPLOADS};
use crate::models::{FlashImage, NewFlashImage};
use crate::schema::flash_images;
use crate::state::AppState;
use crate::storage::{ObjectStorage, EXTRA_IMAGES_PREFIX, TEMP_PREFIX};

use super::flashes::load_flash;

pub const TEMP_NAME_PREFIX: &str = "temp_";
pub const TEMP_EXTRA_NAME_PREFIX: &str = "temp_extra_";

const TEMP_GC_PROBABILITY: f64 = 0.10;

/// Basename-only validation for temp upload names: the expected prefix, no
/// path separators, no parent references. Everything filesystem-adjacent in
/// the upload flow goes through here first.
pub fn sanitize_temp_name<'a>(name: &'a str, required_prefix: &str) -> Result<&'a str, String> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err("invalid image filename".to_string());
    }
    if !name.starts_with(required_prefix) {
        return Err(format!("filename must start with {required_prefix}"));
    }
    Ok(name)
}

fn extension_of(name: &str) -> Option<&str> {
    name.rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()) && !ext.is_empty())
}

/// Moves a validated temp upload into its permanent prefix and returns the
/// new object key.
pub async fn promote_temp(
    storage: &dyn ObjectStorage,
    temp_name: &str,
    dest_prefix: &str,
) -> AppResult<String> {
    let ext = extension_of(temp_name).unwrap_or("bin");
    let dest_key = format!("{dest_prefix}{}.{ext}", Uuid::new_v4());
    storage
        .move_object(&format!("{TEMP_PREFIX}{temp_name}"), &dest_key)
        .await
        .map_err(AppError::from)?;
    Ok(dest_key)
}

#[derive(Serialize)]
pub struct TempUploadResponse {
    pub ok: bool,
    pub filename: String,
}

pub async fn upload_temp_image(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<TempUploadResponse>)> {
    let mut kind = "main".to_string();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        match field.name() {
            Some("kind") => {
                kind = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (original_name, bytes) = file.ok_or_else(|| AppError::bad_request("file is required"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("file must not be empty"));
    }

    let prefix = match kind.as_str() {
        "main" => TEMP_NAME_PREFIX,
        "extra" => TEMP_EXTRA_NAME_PREFIX,
        other => return Err(AppError::bad_request(format!("unknown upload kind: {other}"))),
    };

    let ext = extension_of(&original_name).unwrap_or("bin").to_lowercase();
    let temp_name = format!("{prefix}{}.{ext}", Uuid::new_v4());
    let content_type = mime_guess::from_path(&original_name)
        .first()
        .map(|mime| mime.to_string());

    state
        .storage
        .put_object(&format!("{TEMP_PREFIX}{temp_name}"), bytes, content_type)
        .await?;

    tracing::debug!(user = %user.user_id, name = %temp_name, "temp image stored");

    // Probabilistic GC: roughly one upload in ten sweeps temp objects
    // older than a day.
    if rand::thread_rng().gen_bool(TEMP_GC_PROBABILITY) {
        let mut conn = state.db()?;
        if let Err(err) = enqueue_job(&mut conn, JOB_PURGE_TEMP_UPLOADS, json!({}), None) {
            warn!(error = %err, "failed to enqueue temp purge job");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(TempUploadResponse {
            ok: true,
            filename: temp_name,
        }),
    ))
}

pub async fn delete_temp_image(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(name): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let name = sanitize_temp_name(&name, TEMP_NAME_PREFIX).map_err(AppError::bad_request)?;
    state
        .storage
        .delete_object(&format!("{TEMP_PREFIX}{name}"))
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ExtraImageUpload {
    pub filename: String,
    pub caption: Option<String>,
}

#[derive(Deserialize)]
pub struct AddExtraImagesRequest {
    pub images: Vec<ExtraImageUpload>,
}

#[derive(Serialize)]
pub struct ExtraImageInfo {
    pub id: Uuid,
    pub object_key: String,
    pub caption: Option<String>,
    pub position: i32,
}

impl From<FlashImage> for ExtraImageInfo {
    fn from(image: FlashImage) -> Self {
        Self {
            id: image.id,
            object_key: image.object_key,
            caption: image.caption,
            position: image.position,
        }
    }
}

pub async fn add_extra_images(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(flash_id): Path<Uuid>,
    Json(payload): Json<AddExtraImagesRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if payload.images.is_empty() {
        return Err(AppError::bad_request("images must not be empty"));
    }
    for upload in &payload.images {
        sanitize_temp_name(&upload.filename, TEMP_EXTRA_NAME_PREFIX)
            .map_err(AppError::bad_request)?;
    }

    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, flash_id)?;
    if !can_edit(user.role, flash.created_by == user.user_id) {
        return Err(AppError::forbidden("not allowed to edit this flash"));
    }
    if flash.is_archived {
        return Err(AppError::conflict("archived flashes are read-only"));
    }

    let next_position: i32 = flash_images::table
        .filter(flash_images::flash_id.eq(flash.id))
        .select(diesel::dsl::max(flash_images::position))
        .first::<Option<i32>>(&mut conn)?
        .map(|max| max + 1)
        .unwrap_or(0);

    // Object moves happen before the insert; a failed insert leaves
    // orphans for the GC rather than rows pointing at missing objects.
    let mut rows = Vec::with_capacity(payload.images.len());
    for (index, upload) in payload.images.iter().enumerate() {
        let key = promote_temp(
            state.storage.as_ref(),
            &upload.filename,
            EXTRA_IMAGES_PREFIX,
        )
        .await?;
        rows.push(NewFlashImage {
            id: Uuid::new_v4(),
            flash_id: flash.id,
            object_key: key,
            caption: upload.caption.clone(),
            position: next_position + index as i32,
        });
    }

    diesel::insert_into(flash_images::table)
        .values(&rows)
        .execute(&mut conn)?;

    diesel::update(crate::schema::flashes::table.find(flash.id))
        .set(crate::schema::flashes::updated_at.eq(Utc::now().naive_utc()))
        .execute(&mut conn)?;

    let saved: Vec<FlashImage> = flash_images::table
        .filter(flash_images::flash_id.eq(flash.id))
        .order(flash_images::position.asc())
        .load(&mut conn)?;

    Ok(Json(json!({
        "ok": true,
        "images": saved.into_iter().map(ExtraImageInfo::from).collect::<Vec<_>>(),
    })))
}

pub async fn remove_extra_image(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((flash_id, image_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, flash_id)?;
    if !can_edit(user.role, flash.created_by == user.user_id) {
        return Err(AppError::forbidden("not allowed to edit this flash"));
    }
    if flash.is_archived {
        return Err(AppError::conflict("archived flashes are read-only"));
    }

    let image: FlashImage = flash_images::table
        .find(image_id)
        .filter(flash_images::flash_id.eq(flash.id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    diesel::delete(flash_images::table.find(image.id)).execute(&mut conn)?;
    if let Err(err) = state.storage.delete_object(&image.object_key).await {
        warn!(key = %image.object_key, error = %err, "failed to delete extra image object");
    }

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_names_require_expected_prefix() {
        assert!(sanitize_temp_name("temp_abc.png", TEMP_NAME_PREFIX).is_ok());
        assert!(sanitize_temp_name("abc.png", TEMP_NAME_PREFIX).is_err());
        assert!(sanitize_temp_name("extra_abc.png", TEMP_EXTRA_NAME_PREFIX).is_err());
        assert!(sanitize_temp_name("temp_extra_abc.png", TEMP_EXTRA_NAME_PREFIX).is_ok());
    }

    #[test]
    fn path_traversal_attempts_rejected() {
        assert!(sanitize_temp_name("../temp_abc.png", TEMP_NAME_PREFIX).is_err());
        assert!(sanitize_temp_name("temp_../secret", TEMP_NAME_PREFIX).is_err());
        assert!(sanitize_temp_name("temp_a/b.png", TEMP_NAME_PREFIX).is_err());
        assert!(sanitize_temp_name("temp_a\\b.png", TEMP_NAME_PREFIX).is_err());
    }

    #[test]
    fn extensions_are_validated() {
        assert_eq!(extension_of("temp_x.png"), Some("png"));
        assert_eq!(extension_of("temp_x.tar.gz"), Some("gz"));
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("bad.p?g"), None);
    }
}
