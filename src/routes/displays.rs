use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{DisplayTarget, Flash, NewDisplayTarget, NewFlashDisplayTarget};
use crate::schema::{display_targets, flash_display_targets, flashes};
use crate::state::AppState;

use super::flashes::load_flash;

#[derive(Serialize)]
pub struct DisplayTargetInfo {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub active: bool,
}

impl From<DisplayTarget> for DisplayTargetInfo {
    fn from(target: DisplayTarget) -> Self {
        Self {
            id: target.id,
            name: target.name,
            api_key: target.api_key,
            active: target.active,
        }
    }
}

pub async fn list_targets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DisplayTargetInfo>>> {
    user.require_admin_or_safety()?;
    let mut conn = state.db()?;
    let targets: Vec<DisplayTarget> = display_targets::table
        .order(display_targets::name.asc())
        .load(&mut conn)?;
    Ok(Json(targets.into_iter().map(DisplayTargetInfo::from).collect()))
}

#[derive(Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
}

pub async fn create_target(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTargetRequest>,
) -> AppResult<(StatusCode, Json<DisplayTargetInfo>)> {
    user.require_admin()?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    let target = NewDisplayTarget {
        id: Uuid::new_v4(),
        name: name.to_string(),
        api_key: generate_api_key(),
        active: true,
    };

    match diesel::insert_into(display_targets::table)
        .values(&target)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => return Err(AppError::bad_request("display name already exists")),
        Err(err) => return Err(AppError::from(err)),
    }

    let saved: DisplayTarget = display_targets::table.find(target.id).first(&mut conn)?;
    Ok((StatusCode::CREATED, Json(DisplayTargetInfo::from(saved))))
}

#[derive(Deserialize)]
pub struct UpdateTargetRequest {
    pub name: Option<String>,
    pub active: Option<bool>,
}

pub async fn update_target(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTargetRequest>,
) -> AppResult<Json<DisplayTargetInfo>> {
    user.require_admin()?;
    let mut conn = state.db()?;
    let existing: DisplayTarget = display_targets::table
        .find(id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::bad_request("name must not be empty")),
        Some(value) => Some(value.to_string()),
        None => None,
    };

    diesel::update(display_targets::table.find(existing.id))
        .set((
            name.map(|value| display_targets::name.eq(value)),
            payload.active.map(|value| display_targets::active.eq(value)),
            display_targets::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let saved: DisplayTarget = display_targets::table.find(existing.id).first(&mut conn)?;
    Ok(Json(DisplayTargetInfo::from(saved)))
}

pub async fn delete_target(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require_admin()?;
    let mut conn = state.db()?;
    let deleted = diesel::delete(display_targets::table.find(id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    audit::record(
        &mut conn,
        Some(user.user_id),
        "display_target_deleted",
        audit::TARGET_DISPLAY,
        Some(id),
        json!({}),
    )?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AssignTargetsRequest {
    pub target_ids: Vec<Uuid>,
}

/// Replaces the flash's signage channel set.
pub async fn assign_targets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignTargetsRequest>,
) -> AppResult<Json<serde_json::Value>> {
    user.require_admin_or_safety()?;
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;

    let known: Vec<Uuid> = display_targets::table
        .filter(display_targets::id.eq_any(&payload.target_ids))
        .select(display_targets::id)
        .load(&mut conn)?;
    if known.len() != payload.target_ids.len() {
        return Err(AppError::bad_request("unknown display target id"));
    }

    let flash_id = flash.id;
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(
            flash_display_targets::table.filter(flash_display_targets::flash_id.eq(flash_id)),
        )
        .execute(conn)?;
        let rows: Vec<NewFlashDisplayTarget> = payload
            .target_ids
            .iter()
            .map(|target| NewFlashDisplayTarget {
                flash_id,
                display_target_id: *target,
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(flash_display_targets::table)
                .values(&rows)
                .execute(conn)?;
        }
        Ok(())
    })?;

    Ok(Json(json!({ "ok": true, "assigned": payload.target_ids.len() })))
}

/// Pulls a published flash off signage without touching its workflow state.
pub async fn remove_from_display(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    user.require_admin_or_safety()?;
    let mut conn = state.db()?;
    let flash = load_flash(&mut conn, id)?;
    if flash.display_removed_at.is_some() {
        return Err(AppError::conflict("flash is already removed from display"));
    }

    let now = Utc::now().naive_utc();
    diesel::update(flashes::table.find(flash.id))
        .set((
            flashes::display_removed_at.eq(Some(now)),
            flashes::display_removed_by.eq(Some(user.user_id)),
            flashes::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    audit::record(
        &mut conn,
        Some(user.user_id),
        "display_removed",
        audit::TARGET_FLASH,
        Some(flash.id),
        json!({}),
    )?;

    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct PlaylistQuery {
    pub api_key: Option<String>,
    pub format: Option<String>,
}

#[derive(Serialize)]
pub struct PlaylistItem {
    pub id: Uuid,
    pub flash_type: String,
    pub lang: String,
    pub title: String,
    pub title_short: Option<String>,
    pub site: Option<String>,
    pub preview_url: Option<String>,
    pub published_at: Option<NaiveDateTime>,
}

fn authenticate_display(
    state: &AppState,
    headers: &HeaderMap,
    query_key: Option<&str>,
) -> AppResult<DisplayTarget> {
    let key = query_key
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-api-key")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(AppError::unauthorized)?;

    let mut conn = state.db()?;
    display_targets::table
        .filter(display_targets::api_key.eq(&key))
        .filter(display_targets::active.eq(true))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)
}

fn playlist_flashes(state: &AppState, target: &DisplayTarget) -> AppResult<Vec<Flash>> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let rows: Vec<Flash> = flashes::table
        .inner_join(flash_display_targets::table)
        .filter(flash_display_targets::display_target_id.eq(target.id))
        .filter(flashes::state.eq("published"))
        .filter(flashes::is_archived.eq(false))
        .filter(flashes::display_removed_at.is_null())
        .filter(
            flashes::display_expires_at
                .is_null()
                .or(flashes::display_expires_at.gt(now)),
        )
        .order(flashes::published_at.desc())
        .select(crate::models::Flash::as_select())
        .load(&mut conn)?;
    Ok(rows)
}

/// Public signage endpoint: api-key authenticated, rate limited per client
/// IP, serving JSON or a self-contained rotating HTML slideshow.
pub async fn playlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PlaylistQuery>,
) -> AppResult<Response> {
    let ip = super::client_ip(&headers);
    if !state.playlist_limiter.allow(ip).await {
        return Err(AppError::too_many_requests("playlist rate limit exceeded"));
    }

    let target = authenticate_display(&state, &headers, query.api_key.as_deref())?;
    let rows = playlist_flashes(&state, &target)?;

    let items: Vec<PlaylistItem> = rows
        .into_iter()
        .map(|flash| PlaylistItem {
            preview_url: flash
                .preview_key
                .is_some()
                .then(|| format!("/playlist/preview/{}?api_key={}", flash.id, target.api_key)),
            id: flash.id,
            flash_type: flash.flash_type,
            lang: flash.lang,
            title: flash.title,
            title_short: flash.title_short,
            site: flash.site,
            published_at: flash.published_at,
        })
        .collect();

    match query.format.as_deref() {
        None | Some("json") => Ok(Json(json!({
            "ok": true,
            "target": target.name,
            "generated_at": Utc::now().naive_utc(),
            "items": items,
        }))
        .into_response()),
        Some("html") => Ok(Html(render_slideshow(&target.name, &items)).into_response()),
        Some(other) => Err(AppError::bad_request(format!("unknown format: {other}"))),
    }
}

/// Preview image access for displays, authenticated with the same api key
/// and counted against the same rate window as the playlist itself.
pub async fn playlist_preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(flash_id): Path<Uuid>,
    Query(query): Query<PlaylistQuery>,
) -> AppResult<impl IntoResponse> {
    let ip = super::client_ip(&headers);
    if !state.playlist_limiter.allow(ip).await {
        return Err(AppError::too_many_requests("playlist rate limit exceeded"));
    }

    let target = authenticate_display(&state, &headers, query.api_key.as_deref())?;
    let allowed = playlist_flashes(&state, &target)?
        .into_iter()
        .find(|flash| flash.id == flash_id)
        .ok_or_else(AppError::not_found)?;

    let key = allowed.preview_key.ok_or_else(AppError::not_found)?;
    let bytes = state
        .storage
        .get_object(&key)
        .await
        .map_err(|_| AppError::not_found())?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("max-age=300"),
    );
    Ok((response_headers, Body::from(bytes)))
}

fn type_color(flash_type: &str) -> &'static str {
    match flash_type {
        "red" => "#c0392b",
        "green" => "#27ae60",
        _ => "#f1c40f",
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_slideshow(target_name: &str, items: &[PlaylistItem]) -> String {
    let slides: String = items
        .iter()
        .map(|item| {
            let image = item
                .preview_url
                .as_deref()
                .map(|url| format!("<img src=\"{}\" alt=\"\">", html_escape(url)))
                .unwrap_or_default();
            format!(
                "<section class=\"slide\" style=\"border-color:{}\"><h1>{}</h1><p>{}</p>{}</section>",
                type_color(&item.flash_type),
                html_escape(&item.title),
                html_escape(item.title_short.as_deref().unwrap_or("")),
                image,
            )
        })
        .collect();

    format!(
        concat!(
            "<!doctype html><html><head><meta charset=\"utf-8\">",
            "<title>{title}</title><style>",
            "body{{margin:0;background:#111;color:#eee;font-family:sans-serif}}",
            ".slide{{display:none;padding:4vh 6vw;border-left:1.5vw solid;min-height:92vh}}",
            ".slide.active{{display:block}}",
            ".slide img{{max-width:80vw;max-height:60vh}}",
            "</style></head><body>{slides}",
            "<script>",
            "var slides=document.querySelectorAll('.slide');var i=0;",
            "function rotate(){{if(!slides.length)return;",
            "slides.forEach(function(s){{s.classList.remove('active')}});",
            "slides[i%slides.length].classList.add('active');i++;}}",
            "rotate();setInterval(rotate,10000);",
            "</script></body></html>"
        ),
        title = html_escape(target_name),
        slides = slides,
    )
}

fn generate_api_key() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slideshow_escapes_markup_in_titles() {
        let items = vec![PlaylistItem {
            id: Uuid::new_v4(),
            flash_type: "red".to_string(),
            lang: "en".to_string(),
            title: "<script>alert(1)</script>".to_string(),
            title_short: None,
            site: None,
            preview_url: None,
            published_at: None,
        }];
        let html = render_slideshow("Lobby", &items);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn type_colors_cover_all_types() {
        assert_ne!(type_color("red"), type_color("green"));
        assert_eq!(type_color("yellow"), type_color("unknown"));
    }

    #[test]
    fn api_keys_are_long_and_hex() {
        let key = generate_api_key();
        assert_eq!(key.len(), 48);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
