use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::schema::flashes;
use crate::state::AppState;

use super::flashes::load_flash;

/// Advisory editing lease. Holding it only informs other clients; it never
/// blocks a write, and an expired lease is free for the taking.
pub async fn acquire_lock(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;

    let now = Utc::now().naive_utc();
    let cutoff =
        (Utc::now() - chrono::Duration::minutes(state.config.editing_lock_minutes)).naive_utc();

    if let (Some(holder), Some(started_at)) = (flash.editing_user_id, flash.editing_started_at) {
        if holder != user.user_id && started_at > cutoff {
            return Err(AppError::conflict(format!(
                "flash is being edited by user {holder}"
            )));
        }
    }

    diesel::update(flashes::table.find(flash.id))
        .set((
            flashes::editing_user_id.eq(Some(user.user_id)),
            flashes::editing_started_at.eq(Some(now)),
        ))
        .execute(&mut conn)?;

    Ok(Json(json!({
        "ok": true,
        "editing": { "user_id": user.user_id, "started_at": now },
        "expires_in_minutes": state.config.editing_lock_minutes,
    })))
}

pub async fn release_lock(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;

    match flash.editing_user_id {
        None => {}
        Some(holder) if holder == user.user_id => {}
        Some(holder) => {
            // Admins may break a colleague's lease, with a paper trail.
            user.require_admin()
                .map_err(|_| AppError::forbidden("lock is held by another user"))?;
            audit::record(
                &mut conn,
                Some(user.user_id),
                "lock_overridden",
                audit::TARGET_FLASH,
                Some(flash.id),
                json!({ "previous_holder": holder }),
            )?;
        }
    }

    diesel::update(flashes::table.find(flash.id))
        .set((
            flashes::editing_user_id.eq::<Option<Uuid>>(None),
            flashes::editing_started_at.eq::<Option<chrono::NaiveDateTime>>(None),
        ))
        .execute(&mut conn)?;

    Ok(Json(json!({ "ok": true })))
}
