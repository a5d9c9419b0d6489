use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::User;
use crate::schema::{role_assignments, users};

pub const CATEGORY_SUPERVISOR: &str = "supervisor";

#[derive(Debug, Clone, Serialize)]
pub struct Approver {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub lang: String,
}

impl From<User> for Approver {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            lang: user.lang,
        }
    }
}

/// Active users holding a supervisor assignment for the given worksite. A
/// NULL worksite on the assignment means "supervisor everywhere" and always
/// matches. An empty result is not an error: it routes the flash straight to
/// the safety team.
pub fn worksite_supervisors(
    conn: &mut PgConnection,
    site: &str,
) -> Result<Vec<Approver>, diesel::result::Error> {
    let rows: Vec<User> = users::table
        .inner_join(role_assignments::table)
        .filter(role_assignments::category.eq(CATEGORY_SUPERVISOR))
        .filter(
            role_assignments::worksite
                .eq(site)
                .or(role_assignments::worksite.is_null()),
        )
        .filter(users::active.eq(true))
        .select(User::as_select())
        .distinct()
        .order(users::full_name.asc())
        .load(conn)?;
    Ok(rows.into_iter().map(Approver::from).collect())
}

/// All active supervisors regardless of worksite, for reviewer-search UIs.
pub fn all_supervisors(conn: &mut PgConnection) -> Result<Vec<Approver>, diesel::result::Error> {
    let rows: Vec<User> = users::table
        .inner_join(role_assignments::table)
        .filter(role_assignments::category.eq(CATEGORY_SUPERVISOR))
        .filter(users::active.eq(true))
        .select(User::as_select())
        .distinct()
        .order(users::full_name.asc())
        .load(conn)?;
    Ok(rows.into_iter().map(Approver::from).collect())
}

/// Resolves a `selected_approvers` JSON array against the user table,
/// silently dropping ids that are malformed, unknown or inactive.
pub fn selected_approvers(
    conn: &mut PgConnection,
    selected: &Value,
) -> Result<Vec<Approver>, diesel::result::Error> {
    let ids = approver_ids(selected);
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<User> = users::table
        .filter(users::id.eq_any(&ids))
        .filter(users::active.eq(true))
        .order(users::full_name.asc())
        .load(conn)?;
    Ok(rows.into_iter().map(Approver::from).collect())
}

/// Extracts well-formed UUIDs from the stored JSON array; anything else in
/// the array is ignored.
pub fn approver_ids(selected: &Value) -> Vec<Uuid> {
    selected
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .filter_map(|raw| Uuid::parse_str(raw).ok())
                .collect()
        })
        .unwrap_or_default()
}
