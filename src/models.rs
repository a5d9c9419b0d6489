use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub full_name: String,
    pub email: String,
    pub lang: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub full_name: String,
    pub email: String,
    pub lang: String,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = role_assignments)]
#[diesel(belongs_to(User))]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub worksite: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = role_assignments)]
pub struct NewRoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category: String,
    pub worksite: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = flashes)]
pub struct Flash {
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
    pub selected_approvers: serde_json::Value,
    pub submission_comment: Option<String>,
    pub created_by: Uuid,
    pub published_at: Option<NaiveDateTime>,
    pub image_key: Option<String>,
    pub image_key_2: Option<String>,
    pub image_key_3: Option<String>,
    pub image_transforms: Option<serde_json::Value>,
    pub annotations_data: Option<serde_json::Value>,
    pub grid_bitmap: Option<String>,
    pub preview_key: Option<String>,
    pub preview_status: String,
    pub display_expires_at: Option<NaiveDateTime>,
    pub display_removed_at: Option<NaiveDateTime>,
    pub display_removed_by: Option<Uuid>,
    pub is_archived: bool,
    pub editing_user_id: Option<Uuid>,
    pub editing_started_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Flash {
    pub fn is_translation_child(&self) -> bool {
        matches!(self.translation_group_id, Some(group) if group != self.id)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = flashes)]
pub struct NewFlash {
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
    pub selected_approvers: serde_json::Value,
    pub submission_comment: Option<String>,
    pub created_by: Uuid,
    pub image_key: Option<String>,
    pub image_key_2: Option<String>,
    pub image_key_3: Option<String>,
    pub image_transforms: Option<serde_json::Value>,
    pub annotations_data: Option<serde_json::Value>,
    pub grid_bitmap: Option<String>,
    pub preview_status: String,
}

#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = flash_approvers)]
#[diesel(belongs_to(Flash))]
#[diesel(belongs_to(User))]
#[diesel(primary_key(flash_id, user_id))]
pub struct FlashApprover {
    pub flash_id: Uuid,
    pub user_id: Uuid,
    pub decision: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub assigned_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = flash_approvers)]
pub struct NewFlashApprover {
    pub flash_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = flash_images)]
#[diesel(belongs_to(Flash))]
pub struct FlashImage {
    pub id: Uuid,
    pub flash_id: Uuid,
    pub object_key: String,
    pub caption: Option<String>,
    pub position: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = flash_images)]
pub struct NewFlashImage {
    pub id: Uuid,
    pub flash_id: Uuid,
    pub object_key: String,
    pub caption: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = display_targets)]
pub struct DisplayTarget {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = display_targets)]
pub struct NewDisplayTarget {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub active: bool,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = flash_display_targets)]
#[diesel(belongs_to(Flash))]
#[diesel(belongs_to(DisplayTarget))]
#[diesel(primary_key(flash_id, display_target_id))]
pub struct FlashDisplayTarget {
    pub flash_id: Uuid,
    pub display_target_id: Uuid,
    pub assigned_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = flash_display_targets)]
pub struct NewFlashDisplayTarget {
    pub flash_id: Uuid,
    pub display_target_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = audit_log)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub detail: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = audit_log)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Uuid>,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = email_log)]
pub struct EmailLogEntry {
    pub id: Uuid,
    pub flash_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub status: String,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = email_log)]
pub struct NewEmailLogEntry {
    pub id: Uuid,
    pub flash_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub status: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = login_attempts)]
pub struct NewLoginAttempt {
    pub id: Uuid,
    pub username: String,
    pub ip: String,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
