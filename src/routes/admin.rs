use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::models::{AuditEntry, EmailLogEntry};
use crate::schema::{audit_log, email_log};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub flash_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct AuditEntryInfo {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub created_at: NaiveDateTime,
}

pub async fn list_audit_log(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<AuditEntryInfo>>> {
    user.require_admin_or_safety()?;
    let mut conn = state.db()?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut select = audit_log::table.into_boxed();
    if let Some(flash_id) = query.flash_id {
        select = select.filter(audit_log::target_id.eq(flash_id));
    }

    let rows: Vec<AuditEntry> = select
        .order(audit_log::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|entry| AuditEntryInfo {
                id: entry.id,
                actor_id: entry.actor_id,
                action: entry.action,
                target_type: entry.target_type,
                target_id: entry.target_id,
                detail: entry.detail,
                created_at: entry.created_at,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
pub struct EmailLogEntryInfo {
    pub id: Uuid,
    pub flash_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}

pub async fn list_email_log(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<EmailLogEntryInfo>>> {
    user.require_admin_or_safety()?;
    let mut conn = state.db()?;

    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut select = email_log::table.into_boxed();
    if let Some(flash_id) = query.flash_id {
        select = select.filter(email_log::flash_id.eq(flash_id));
    }

    let rows: Vec<EmailLogEntry> = select
        .order(email_log::created_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|entry| EmailLogEntryInfo {
                id: entry.id,
                flash_id: entry.flash_id,
                recipient: entry.recipient,
                subject: entry.subject,
                status: entry.status,
                error: entry.error,
                created_at: entry.created_at,
            })
            .collect(),
    ))
}
