use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::approvals::{self, Approver};
use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::domain::save::{can_edit, FlashFields};
use crate::domain::workflow::{
    initial_state, should_notify, FlashState, FlashType, PreviewStatus,
};
use crate::error::{AppError, AppResult};
use crate::jobs::{enqueue_job, JOB_RENDER_PREVIEW};
use crate::models::{Flash, FlashImage, NewFlash, NewFlashApprover};
use crate::notify;
use crate::schema::{flash_approvers, flash_display_targets, flash_images, flashes};
use crate::state::AppState;
use crate::storage::IMAGES_PREFIX;
use crate::utils::json::{classify_nullable, classify_nullable_date, NullableDate, NullableValue};

use super::images::{promote_temp, sanitize_temp_name, ExtraImageInfo, TEMP_NAME_PREFIX};

pub(crate) fn load_flash(conn: &mut PgConnection, id: Uuid) -> AppResult<Flash> {
    flashes::table
        .find(id)
        .first(conn)
        .optional()?
        .ok_or_else(AppError::not_found)
}

pub(crate) fn parse_state(flash: &Flash) -> AppResult<FlashState> {
    FlashState::parse(&flash.state)
        .ok_or_else(|| AppError::internal(format!("flash {} has corrupt state {}", flash.id, flash.state)))
}

/// Submitted approver ids must name existing, active users; the defensive
/// silent-drop behavior applies only when resolving stored JSON.
pub(crate) fn validate_approver_ids(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<()> {
    let known: i64 = crate::schema::users::table
        .filter(crate::schema::users::id.eq_any(ids))
        .filter(crate::schema::users::active.eq(true))
        .count()
        .get_result(conn)?;
    if known != ids.len() as i64 {
        return Err(AppError::bad_request("unknown or inactive approver id"));
    }
    Ok(())
}

#[derive(Serialize)]
pub struct LockInfo {
    pub user_id: Uuid,
    pub started_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct FlashInfo {
    pub id: Uuid,
    pub translation_group_id: Option<Uuid>,
    pub flash_type: String,
    pub original_type: Option<String>,
    pub lang: String,
    pub title: String,
    pub title_short: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub root_causes: Option<String>,
    pub actions: Option<String>,
    pub site: Option<String>,
    pub occurred_at: Option<NaiveDateTime>,
    pub state: String,
    pub submission_comment: Option<String>,
    pub created_by: Uuid,
    pub published_at: Option<NaiveDateTime>,
    pub image_key: Option<String>,
    pub image_key_2: Option<String>,
    pub image_key_3: Option<String>,
    pub image_transforms: Option<Value>,
    pub annotations_data: Option<Value>,
    pub grid_bitmap: Option<String>,
    pub preview_status: String,
    pub has_preview: bool,
    pub display_expires_at: Option<NaiveDateTime>,
    pub display_removed_at: Option<NaiveDateTime>,
    pub is_archived: bool,
    pub approvers: Vec<Approver>,
    pub extra_images: Vec<ExtraImageInfo>,
    pub display_target_ids: Vec<Uuid>,
    pub editing: Option<LockInfo>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Serialize)]
pub struct FlashDetail {
    pub ok: bool,
    pub flash: FlashInfo,
}

pub(crate) fn flash_detail(
    conn: &mut PgConnection,
    lock_minutes: i64,
    flash: Flash,
) -> AppResult<FlashDetail> {
    let approvers = approvals::selected_approvers(conn, &flash.selected_approvers)?;
    let extra: Vec<FlashImage> = flash_images::table
        .filter(flash_images::flash_id.eq(flash.id))
        .order(flash_images::position.asc())
        .load(conn)?;
    let target_ids: Vec<Uuid> = flash_display_targets::table
        .filter(flash_display_targets::flash_id.eq(flash.id))
        .select(flash_display_targets::display_target_id)
        .load(conn)?;

    let editing = match (flash.editing_user_id, flash.editing_started_at) {
        (Some(user_id), Some(started_at)) => {
            let cutoff = (Utc::now() - chrono::Duration::minutes(lock_minutes)).naive_utc();
            (started_at > cutoff).then_some(LockInfo {
                user_id,
                started_at,
            })
        }
        _ => None,
    };

    Ok(FlashDetail {
        ok: true,
        flash: FlashInfo {
            id: flash.id,
            translation_group_id: flash.translation_group_id,
            flash_type: flash.flash_type,
            original_type: flash.original_type,
            lang: flash.lang,
            title: flash.title,
            title_short: flash.title_short,
            summary: flash.summary,
            description: flash.description,
            root_causes: flash.root_causes,
            actions: flash.actions,
            site: flash.site,
            occurred_at: flash.occurred_at,
            state: flash.state,
            submission_comment: flash.submission_comment,
            created_by: flash.created_by,
            published_at: flash.published_at,
            image_key: flash.image_key,
            image_key_2: flash.image_key_2,
            image_key_3: flash.image_key_3,
            image_transforms: flash.image_transforms,
            annotations_data: flash.annotations_data,
            grid_bitmap: flash.grid_bitmap,
            preview_status: flash.preview_status,
            has_preview: flash.preview_key.is_some(),
            display_expires_at: flash.display_expires_at,
            display_removed_at: flash.display_removed_at,
            is_archived: flash.is_archived,
            approvers,
            extra_images: extra.into_iter().map(ExtraImageInfo::from).collect(),
            display_target_ids: target_ids,
            editing,
            created_at: flash.created_at,
            updated_at: flash.updated_at,
        },
    })
}

#[derive(Deserialize)]
pub struct FlashListQuery {
    pub state: Option<String>,
    pub site: Option<String>,
    pub lang: Option<String>,
    pub flash_type: Option<String>,
    #[serde(default)]
    pub include_archived: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct FlashSummary {
    pub id: Uuid,
    pub flash_type: String,
    pub lang: String,
    pub title: String,
    pub title_short: Option<String>,
    pub site: Option<String>,
    pub state: String,
    pub preview_status: String,
    pub is_archived: bool,
    pub created_by: Uuid,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

pub async fn list_flashes(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<FlashListQuery>,
) -> AppResult<Json<Vec<FlashSummary>>> {
    // Unknown filter values are rejected rather than silently widened.
    if let Some(value) = query.state.as_deref() {
        if FlashState::parse(value).is_none() {
            return Err(AppError::bad_request(format!("unknown state: {value}")));
        }
    }
    if let Some(value) = query.flash_type.as_deref() {
        if FlashType::parse(value).is_none() {
            return Err(AppError::bad_request(format!("unknown flash type: {value}")));
        }
    }

    let mut conn = state.db()?;
    let mut select = flashes::table.into_boxed();
    if let Some(value) = query.state {
        select = select.filter(flashes::state.eq(value));
    }
    if let Some(value) = query.site {
        select = select.filter(flashes::site.eq(value));
    }
    if let Some(value) = query.lang {
        select = select.filter(flashes::lang.eq(value));
    }
    if let Some(value) = query.flash_type {
        select = select.filter(flashes::flash_type.eq(value));
    }
    if !query.include_archived {
        select = select.filter(flashes::is_archived.eq(false));
    }

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let rows: Vec<Flash> = select
        .order(flashes::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    let summaries = rows
        .into_iter()
        .map(|flash| FlashSummary {
            id: flash.id,
            flash_type: flash.flash_type,
            lang: flash.lang,
            title: flash.title,
            title_short: flash.title_short,
            site: flash.site,
            state: flash.state,
            preview_status: flash.preview_status,
            is_archived: flash.is_archived,
            created_by: flash.created_by,
            published_at: flash.published_at,
            created_at: flash.created_at,
        })
        .collect();

    Ok(Json(summaries))
}

pub async fn get_flash(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<FlashDetail>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, flash)?;
    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct CreateFlashRequest {
    #[serde(flatten)]
    pub fields: FlashFields,
    #[serde(default)]
    pub approver_ids: Vec<Uuid>,
    pub submission_type: Option<String>,
    #[serde(default)]
    pub temp_images: Vec<String>,
}

pub async fn create_flash(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateFlashRequest>,
) -> AppResult<(StatusCode, Json<FlashDetail>)> {
    payload
        .fields
        .validate_create()
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    let submit = match payload.submission_type.as_deref() {
        None | Some("draft") => false,
        Some("review") | Some("submit") => true,
        Some(other) => {
            return Err(AppError::bad_request(format!(
                "unknown submission type: {other}"
            )))
        }
    };

    if payload.temp_images.len() > 3 {
        return Err(AppError::bad_request("at most three main images allowed"));
    }
    for name in &payload.temp_images {
        sanitize_temp_name(name, TEMP_NAME_PREFIX).map_err(AppError::bad_request)?;
    }

    let flash_type = match payload.fields.flash_type.as_deref() {
        Some(value) => FlashType::parse(value)
            .ok_or_else(|| AppError::bad_request(format!("unknown flash type: {value}")))?,
        None => FlashType::Yellow,
    };

    let has_approvers = !payload.approver_ids.is_empty();
    let new_state = initial_state(submit, has_approvers);

    let mut conn = state.db()?;
    if has_approvers {
        validate_approver_ids(&mut conn, &payload.approver_ids)?;
    }

    // Temp uploads are promoted before the insert; a failed transaction
    // leaves orphans in images/ for the GC rather than dangling row keys.
    let mut image_keys: Vec<String> = Vec::new();
    for name in &payload.temp_images {
        image_keys.push(promote_temp(state.storage.as_ref(), name, IMAGES_PREFIX).await?);
    }

    let selected: Value = json!(payload
        .approver_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>());

    let title = payload
        .fields
        .trimmed_title()
        .ok_or_else(|| AppError::bad_request("title must not be empty"))?;

    let new_flash = NewFlash {
        id: Uuid::new_v4(),
        translation_group_id: None,
        flash_type: flash_type.as_str().to_string(),
        original_type: None,
        lang: payload
            .fields
            .lang
            .clone()
            .unwrap_or_else(|| "en".to_string()),
        title,
        title_short: payload.fields.title_short.clone(),
        summary: payload.fields.summary.clone(),
        description: payload.fields.description.clone(),
        root_causes: payload.fields.root_causes.clone(),
        actions: payload.fields.actions.clone(),
        site: payload.fields.site.clone(),
        occurred_at: payload.fields.occurred_at_datetime(),
        state: new_state.as_str().to_string(),
        selected_approvers: selected,
        submission_comment: payload.fields.submission_comment.clone(),
        created_by: user.user_id,
        image_key: image_keys.first().cloned(),
        image_key_2: image_keys.get(1).cloned(),
        image_key_3: image_keys.get(2).cloned(),
        image_transforms: payload.fields.image_transforms.clone(),
        annotations_data: payload.fields.annotations_data.clone(),
        grid_bitmap: payload.fields.grid_bitmap.clone(),
        preview_status: PreviewStatus::Queued.as_str().to_string(),
    };

    let flash_id = new_flash.id;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(flashes::table)
            .values(&new_flash)
            .execute(conn)?;

        if new_state == FlashState::PendingSupervisor {
            let rows: Vec<NewFlashApprover> = payload
                .approver_ids
                .iter()
                .map(|approver| NewFlashApprover {
                    flash_id,
                    user_id: *approver,
                })
                .collect();
            diesel::insert_into(flash_approvers::table)
                .values(&rows)
                .execute(conn)?;
        }

        let flash: Flash = flashes::table.find(flash_id).first(conn)?;

        if should_notify(FlashState::Draft, new_state, false) {
            notify::queue_transition_notification(conn, &flash, FlashState::Draft, new_state)?;
        }

        enqueue_job(conn, JOB_RENDER_PREVIEW, json!({ "flash_id": flash_id }), None)?;

        audit::record(
            conn,
            Some(user.user_id),
            "flash_created",
            audit::TARGET_FLASH,
            Some(flash_id),
            json!({ "state": new_state.as_str(), "submitted": submit }),
        )?;

        Ok(())
    })?;

    let flash = load_flash(&mut conn, flash_id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, flash)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = flashes)]
struct UpdateFlashChangeset {
    title: Option<String>,
    title_short: Option<Option<String>>,
    summary: Option<Option<String>>,
    description: Option<Option<String>>,
    root_causes: Option<Option<String>>,
    actions: Option<Option<String>>,
    site: Option<Option<String>>,
    occurred_at: Option<Option<NaiveDateTime>>,
    lang: Option<String>,
    flash_type: Option<String>,
    original_type: Option<Option<String>>,
    submission_comment: Option<Option<String>>,
    image_transforms: Option<Option<Value>>,
    annotations_data: Option<Option<Value>>,
    grid_bitmap: Option<Option<String>>,
    image_key: Option<Option<String>>,
    image_key_2: Option<Option<String>>,
    image_key_3: Option<Option<String>>,
    preview_status: Option<String>,
    updated_at: Option<NaiveDateTime>,
}

fn field_value<'a>(body: &'a Value, key: &str, alias: Option<&str>) -> Option<&'a Value> {
    body.get(key)
        .or_else(|| alias.and_then(|alias| body.get(alias)))
}

fn nullable_text(
    body: &Value,
    key: &str,
    alias: Option<&str>,
) -> AppResult<Option<Option<String>>> {
    match classify_nullable(field_value(body, key, alias)).map_err(AppError::bad_request)? {
        NullableValue::Omitted => Ok(None),
        NullableValue::Null => Ok(Some(None)),
        NullableValue::String(value) => Ok(Some(Some(value))),
    }
}

/// Inline saves: content only, state strictly preserved. Submission and
/// review travel through the dedicated workflow endpoints.
pub async fn update_flash(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<FlashDetail>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let current_state = parse_state(&flash)?;
    let is_creator = flash.created_by == user.user_id;

    if !can_edit(user.role, is_creator) {
        audit::record(
            &mut conn,
            Some(user.user_id),
            "permission_denied",
            audit::TARGET_FLASH,
            Some(flash.id),
            json!({ "action": "update" }),
        )?;
        return Err(AppError::forbidden("not allowed to edit this flash"));
    }
    if flash.is_archived || current_state == FlashState::Archived {
        return Err(AppError::conflict("archived flashes are read-only"));
    }
    // After submission only the safety team and admins may touch content.
    if !current_state.is_editable() && !user.role.is_admin_or_safety() {
        return Err(AppError::forbidden(
            "only the safety team may edit a submitted flash",
        ));
    }

    let fields: FlashFields =
        serde_json::from_value(body.clone()).map_err(|err| AppError::bad_request(err.to_string()))?;
    fields
        .validate_partial()
        .map_err(|err| AppError::bad_request(err.to_string()))?;

    // Replacing the main image slots goes through the same temp promotion
    // as the create path.
    let mut new_image_keys: Option<Vec<String>> = None;
    if let Some(value) = body.get("temp_images") {
        let names: Vec<String> = serde_json::from_value(value.clone())
            .map_err(|err| AppError::bad_request(format!("invalid temp_images: {err}")))?;
        if names.len() > 3 {
            return Err(AppError::bad_request("at most three main images allowed"));
        }
        for name in &names {
            sanitize_temp_name(name, TEMP_NAME_PREFIX).map_err(AppError::bad_request)?;
        }
        let mut keys = Vec::with_capacity(names.len());
        for name in &names {
            keys.push(promote_temp(state.storage.as_ref(), name, IMAGES_PREFIX).await?);
        }
        new_image_keys = Some(keys);
    }

    let mut changeset = UpdateFlashChangeset {
        title: fields.trimmed_title(),
        title_short: nullable_text(&body, "title_short", Some("short_text"))?,
        summary: nullable_text(&body, "summary", None)?,
        description: nullable_text(&body, "description", None)?,
        root_causes: nullable_text(&body, "root_causes", None)?,
        actions: nullable_text(&body, "actions", None)?,
        site: nullable_text(&body, "site", Some("worksite"))?,
        submission_comment: nullable_text(&body, "submission_comment", None)?,
        grid_bitmap: nullable_text(&body, "grid_bitmap", None)?,
        lang: fields.lang.clone(),
        updated_at: Some(Utc::now().naive_utc()),
        ..UpdateFlashChangeset::default()
    };

    match classify_nullable_date(field_value(&body, "occurred_at", Some("event_date")))
        .map_err(AppError::bad_request)?
    {
        NullableDate::Omitted => {}
        NullableDate::Null => changeset.occurred_at = Some(None),
        NullableDate::Date(date) => {
            changeset.occurred_at = Some(date.and_hms_opt(0, 0, 0));
        }
    }

    if let Some(value) = body.get("image_transforms") {
        changeset.image_transforms = Some((!value.is_null()).then(|| value.clone()));
    }
    if let Some(value) = body.get("annotations_data") {
        changeset.annotations_data = Some((!value.is_null()).then(|| value.clone()));
    }
    if let Some(keys) = &new_image_keys {
        changeset.image_key = Some(keys.first().cloned());
        changeset.image_key_2 = Some(keys.get(1).cloned());
        changeset.image_key_3 = Some(keys.get(2).cloned());
    }

    // Workflow-relevant classification is frozen on translation children.
    if !flash.is_translation_child() {
        if let Some(new_type) = fields.flash_type.as_deref() {
            if new_type != flash.flash_type {
                changeset.flash_type = Some(new_type.to_string());
                // Promotion to investigation keeps the original colour.
                if new_type == FlashType::Green.as_str() {
                    changeset.original_type = Some(Some(flash.flash_type.clone()));
                }
            }
        }
    }

    changeset.preview_status = Some(PreviewStatus::Queued.as_str().to_string());

    conn.transaction::<_, AppError, _>(|conn| {
        diesel::update(flashes::table.find(flash.id))
            .set(&changeset)
            .execute(conn)?;
        enqueue_job(conn, JOB_RENDER_PREVIEW, json!({ "flash_id": flash.id }), None)?;
        audit::record(
            conn,
            Some(user.user_id),
            "flash_updated",
            audit::TARGET_FLASH,
            Some(flash.id),
            json!({ "state": flash.state.as_str() }),
        )?;
        Ok(())
    })?;

    let updated = load_flash(&mut conn, flash.id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, updated)?;
    Ok(Json(detail))
}

pub async fn get_preview(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let key = flash.preview_key.ok_or_else(AppError::not_found)?;
    let bytes = state
        .storage
        .get_object(&key)
        .await
        .map_err(|_| AppError::not_found())?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("inline; filename=\"flash-{id}.png\""))
            .expect("valid content disposition"),
    );
    Ok((headers, Body::from(bytes)))
}
