use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::domain::save::{can_archive, can_decide_supervisor, can_review, can_submit};
use crate::domain::workflow::{
    apply, should_notify, FlashState, TransitionError, WorkflowAction,
};
use crate::error::{AppError, AppResult};
use crate::jobs::{enqueue_job, JOB_RENDER_PREVIEW};
use crate::models::{Flash, NewFlash, NewFlashApprover};
use crate::notify;
use crate::schema::{flash_approvers, flashes};
use crate::state::AppState;

use super::flashes::{flash_detail, load_flash, parse_state, FlashDetail};

fn transition_error(err: TransitionError) -> AppError {
    AppError::conflict(err.to_string())
}

fn denied(
    conn: &mut diesel::PgConnection,
    user: &AuthenticatedUser,
    flash: &Flash,
    action: &str,
) -> AppResult<AppError> {
    audit::record(
        conn,
        Some(user.user_id),
        "permission_denied",
        audit::TARGET_FLASH,
        Some(flash.id),
        json!({ "action": action }),
    )?;
    Ok(AppError::forbidden("not allowed to perform this action"))
}

#[derive(Deserialize, Default)]
pub struct SubmitRequest {
    pub approver_ids: Option<Vec<Uuid>>,
    pub submission_comment: Option<String>,
}

/// Draft / request_info → pending_supervisor or pending_review, depending on
/// whether any approvers were selected.
pub async fn submit_flash(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<SubmitRequest>>,
) -> AppResult<Json<FlashDetail>> {
    let Json(payload) = payload.unwrap_or_default();
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let current = parse_state(&flash)?;

    if !can_submit(user.role, flash.created_by == user.user_id) {
        return Err(denied(&mut conn, &user, &flash, "submit")?);
    }

    let approver_ids = payload
        .approver_ids
        .unwrap_or_else(|| crate::approvals::approver_ids(&flash.selected_approvers));
    if !approver_ids.is_empty() {
        super::flashes::validate_approver_ids(&mut conn, &approver_ids)?;
    }
    let action = WorkflowAction::Submit {
        has_approvers: !approver_ids.is_empty(),
    };
    let next = apply(current, action, flash.is_translation_child()).map_err(transition_error)?;

    let flash_id = flash.id;
    conn.transaction::<_, AppError, _>(|conn| {
        let selected: Value = json!(approver_ids
            .iter()
            .map(|approver| approver.to_string())
            .collect::<Vec<_>>());

        diesel::update(flashes::table.find(flash_id))
            .set((
                flashes::state.eq(next.as_str()),
                flashes::selected_approvers.eq(selected),
                flashes::submission_comment.eq(payload.submission_comment.as_deref()),
                flashes::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        diesel::delete(
            flash_approvers::table.filter(flash_approvers::flash_id.eq(flash_id)),
        )
        .execute(conn)?;
        if next == FlashState::PendingSupervisor {
            let rows: Vec<NewFlashApprover> = approver_ids
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

        let updated: Flash = flashes::table.find(flash_id).first(conn)?;
        if should_notify(current, next, updated.is_translation_child()) {
            notify::queue_transition_notification(conn, &updated, current, next)?;
        }

        audit::record(
            conn,
            Some(user.user_id),
            "flash_submitted",
            audit::TARGET_FLASH,
            Some(flash_id),
            json!({ "from": current.as_str(), "to": next.as_str() }),
        )?;
        Ok(())
    })?;

    let updated = load_flash(&mut conn, flash_id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, updated)?;
    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub approve: bool,
    pub comment: Option<String>,
}

/// Supervisor gate: approve forwards to safety review, otherwise the flash
/// returns to its author for more information.
pub async fn supervisor_decision(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> AppResult<Json<FlashDetail>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let current = parse_state(&flash)?;

    let is_selected: bool = diesel::select(diesel::dsl::exists(
        flash_approvers::table
            .filter(flash_approvers::flash_id.eq(flash.id))
            .filter(flash_approvers::user_id.eq(user.user_id)),
    ))
    .get_result(&mut conn)?;

    if !can_decide_supervisor(user.role, is_selected) {
        return Err(denied(&mut conn, &user, &flash, "supervisor_decision")?);
    }

    let action = if payload.approve {
        WorkflowAction::SupervisorApprove
    } else {
        WorkflowAction::SupervisorRequestChanges
    };
    let next = apply(current, action, flash.is_translation_child()).map_err(transition_error)?;

    let flash_id = flash.id;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::update(flashes::table.find(flash_id))
            .set((
                flashes::state.eq(next.as_str()),
                flashes::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        diesel::update(
            flash_approvers::table
                .filter(flash_approvers::flash_id.eq(flash_id))
                .filter(flash_approvers::user_id.eq(user.user_id)),
        )
        .set((
            flash_approvers::decision.eq(if payload.approve {
                "approved"
            } else {
                "changes_requested"
            }),
            flash_approvers::decided_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;

        let updated: Flash = flashes::table.find(flash_id).first(conn)?;
        if should_notify(current, next, updated.is_translation_child()) {
            notify::queue_transition_notification(conn, &updated, current, next)?;
        }

        audit::record(
            conn,
            Some(user.user_id),
            action.as_str(),
            audit::TARGET_FLASH,
            Some(flash_id),
            json!({
                "from": current.as_str(),
                "to": next.as_str(),
                "comment": payload.comment,
            }),
        )?;
        Ok(())
    })?;

    let updated = load_flash(&mut conn, flash_id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, updated)?;
    Ok(Json(detail))
}

/// Safety-team gate: approval publishes the flash and opens its display
/// window; rejection sends it back to the author.
pub async fn safety_review(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> AppResult<Json<FlashDetail>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let current = parse_state(&flash)?;

    if !can_review(user.role) {
        return Err(denied(&mut conn, &user, &flash, "safety_review")?);
    }

    let action = if payload.approve {
        WorkflowAction::ReviewApprove
    } else {
        WorkflowAction::ReviewRequestChanges
    };
    let next = apply(current, action, flash.is_translation_child()).map_err(transition_error)?;

    let flash_id = flash.id;
    let display_expiry_days = state.config.display_expiry_days;
    conn.transaction::<_, AppError, _>(|conn| {
        let now = Utc::now();
        if next == FlashState::Published {
            diesel::update(flashes::table.find(flash_id))
                .set((
                    flashes::state.eq(next.as_str()),
                    flashes::published_at.eq(now.naive_utc()),
                    flashes::display_expires_at
                        .eq((now + chrono::Duration::days(display_expiry_days)).naive_utc()),
                    flashes::updated_at.eq(now.naive_utc()),
                ))
                .execute(conn)?;
            enqueue_job(conn, JOB_RENDER_PREVIEW, json!({ "flash_id": flash_id }), None)?;
        } else {
            diesel::update(flashes::table.find(flash_id))
                .set((
                    flashes::state.eq(next.as_str()),
                    flashes::updated_at.eq(now.naive_utc()),
                ))
                .execute(conn)?;
        }

        let updated: Flash = flashes::table.find(flash_id).first(conn)?;
        if should_notify(current, next, updated.is_translation_child()) {
            notify::queue_transition_notification(conn, &updated, current, next)?;
        }

        audit::record(
            conn,
            Some(user.user_id),
            action.as_str(),
            audit::TARGET_FLASH,
            Some(flash_id),
            json!({
                "from": current.as_str(),
                "to": next.as_str(),
                "comment": payload.comment,
            }),
        )?;
        Ok(())
    })?;

    let updated = load_flash(&mut conn, flash_id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, updated)?;
    Ok(Json(detail))
}

/// One-way archive: clears the heavy media columns, keeps every text field.
/// Anything not currently published is rejected before any write.
pub async fn archive_flash(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let current = parse_state(&flash)?;

    if !can_archive(user.role) {
        return Err(denied(&mut conn, &user, &flash, "archive")?);
    }
    if flash.is_archived {
        return Err(AppError::conflict("flash is already archived"));
    }
    let next = apply(current, WorkflowAction::Archive, flash.is_translation_child())
        .map_err(transition_error)?;

    let flash_id = flash.id;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::update(flashes::table.find(flash_id))
            .set((
                flashes::state.eq(next.as_str()),
                flashes::is_archived.eq(true),
                flashes::annotations_data.eq::<Option<Value>>(None),
                flashes::image_transforms.eq::<Option<Value>>(None),
                flashes::grid_bitmap.eq::<Option<String>>(None),
                flashes::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let updated: Flash = flashes::table.find(flash_id).first(conn)?;
        if should_notify(current, next, updated.is_translation_child()) {
            notify::queue_transition_notification(conn, &updated, current, next)?;
        }

        audit::record(
            conn,
            Some(user.user_id),
            "flash_archived",
            audit::TARGET_FLASH,
            Some(flash_id),
            json!({ "from": current.as_str() }),
        )?;
        Ok(())
    })?;

    Ok(Json(json!({ "success": true })))
}

/// Re-queues the publication notification for a flash that is already
/// published; anything else is rejected before touching the email log.
pub async fn resend_email(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    let current = parse_state(&flash)?;

    user.require_admin_or_safety()?;
    if current != FlashState::Published || flash.is_archived {
        return Err(AppError::conflict("only published flashes can be resent"));
    }
    if flash.is_translation_child() {
        return Err(AppError::conflict(
            "translation variants do not send notifications",
        ));
    }

    let queued = conn.transaction::<_, AppError, _>(|conn| {
        let queued = notify::queue_transition_notification(
            conn,
            &flash,
            FlashState::Published,
            FlashState::Published,
        )?;
        audit::record(
            conn,
            Some(user.user_id),
            "email_resent",
            audit::TARGET_FLASH,
            Some(flash.id),
            json!({ "queued": queued }),
        )?;
        Ok(queued)
    })?;

    Ok(Json(json!({ "ok": true, "queued": queued })))
}

#[derive(Deserialize)]
pub struct CreateTranslationRequest {
    pub lang: String,
}

/// Clones the flash content into a new draft inside the source's translation
/// group. Children never enter review and never notify.
pub async fn create_translation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateTranslationRequest>,
) -> AppResult<(StatusCode, Json<FlashDetail>)> {
    let lang = payload.lang.trim().to_lowercase();
    if lang.is_empty() || lang.len() > 8 {
        return Err(AppError::bad_request("lang must be a short language code"));
    }

    let mut conn = state.db()?;
    let source = load_flash(&mut conn, id)?;
    if !can_submit(user.role, source.created_by == user.user_id) {
        return Err(denied(&mut conn, &user, &source, "translate")?);
    }
    if source.is_archived {
        return Err(AppError::conflict("archived flashes are read-only"));
    }

    let root_id = source.translation_group_id.unwrap_or(source.id);
    let root: Flash = load_flash(&mut conn, root_id)?;

    let sibling_langs: Vec<String> = flashes::table
        .filter(flashes::translation_group_id.eq(root_id))
        .select(flashes::lang)
        .load(&mut conn)?;
    if root.lang == lang || sibling_langs.iter().any(|existing| existing == &lang) {
        return Err(AppError::conflict(format!(
            "a {lang} variant already exists in this translation group"
        )));
    }

    let child = NewFlash {
        id: Uuid::new_v4(),
        translation_group_id: Some(root_id),
        flash_type: source.flash_type.clone(),
        original_type: source.original_type.clone(),
        lang,
        title: source.title.clone(),
        title_short: source.title_short.clone(),
        summary: source.summary.clone(),
        description: source.description.clone(),
        root_causes: source.root_causes.clone(),
        actions: source.actions.clone(),
        site: source.site.clone(),
        occurred_at: source.occurred_at,
        state: FlashState::Draft.as_str().to_string(),
        selected_approvers: json!([]),
        submission_comment: None,
        created_by: user.user_id,
        image_key: source.image_key.clone(),
        image_key_2: source.image_key_2.clone(),
        image_key_3: source.image_key_3.clone(),
        image_transforms: source.image_transforms.clone(),
        annotations_data: source.annotations_data.clone(),
        grid_bitmap: source.grid_bitmap.clone(),
        preview_status: crate::domain::workflow::PreviewStatus::Queued.as_str().to_string(),
    };

    let child_id = child.id;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::insert_into(flashes::table)
            .values(&child)
            .execute(conn)?;
        enqueue_job(conn, JOB_RENDER_PREVIEW, json!({ "flash_id": child_id }), None)?;
        audit::record(
            conn,
            Some(user.user_id),
            "translation_created",
            audit::TARGET_FLASH,
            Some(child_id),
            json!({ "source": source.id, "lang": child.lang.as_str() }),
        )?;
        Ok(())
    })?;

    let created = load_flash(&mut conn, child_id)?;
    let detail = flash_detail(&mut conn, state.config.editing_lock_minutes, created)?;
    Ok((StatusCode::CREATED, Json(detail)))
}
