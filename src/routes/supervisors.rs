use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::approvals::{self, Approver};
use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SupervisorQuery {
    pub site: Option<String>,
}

/// Approver candidates for the submission UI: scoped to a worksite when one
/// is given, the full roster otherwise.
pub async fn list_supervisors(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<SupervisorQuery>,
) -> AppResult<Json<Vec<Approver>>> {
    let mut conn = state.db()?;
    let supervisors = match query.site.as_deref().map(str::trim) {
        Some(site) if !site.is_empty() => approvals::worksite_supervisors(&mut conn, site)?,
        _ => approvals::all_supervisors(&mut conn)?,
    };
    Ok(Json(supervisors))
}
