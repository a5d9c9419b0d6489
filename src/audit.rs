use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::models::NewAuditEntry;
use crate::schema::audit_log;

pub const TARGET_FLASH: &str = "flash";
pub const TARGET_DISPLAY: &str = "display_target";
pub const TARGET_USER: &str = "user";

/// Append-only. Every mutating workflow action, permission violation and
/// lock override lands here; rows are never updated.
pub fn record(
    conn: &mut PgConnection,
    actor_id: Option<Uuid>,
    action: &str,
    target_type: &str,
    target_id: Option<Uuid>,
    detail: Value,
) -> Result<(), diesel::result::Error> {
    let entry = NewAuditEntry {
        id: Uuid::new_v4(),
        actor_id,
        action: action.to_string(),
        target_type: target_type.to_string(),
        target_id,
        detail,
    };
    diesel::insert_into(audit_log::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}
