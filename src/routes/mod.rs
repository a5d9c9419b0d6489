use std::net::IpAddr;

use axum::http::{HeaderMap, HeaderValue};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

/// Best-effort client address for rate limiting: proxy headers first, a
/// placeholder otherwise. Good enough for advisory counters.
pub(crate) fn client_ip(headers: &HeaderMap) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

pub mod admin;
pub mod auth;
pub mod displays;
pub mod flashes;
pub mod health;
pub mod images;
pub mod locks;
pub mod review;
pub mod supervisors;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let flashes_routes = Router::new()
        .route("/", get(flashes::list_flashes).post(flashes::create_flash))
        .route(
            "/:id",
            get(flashes::get_flash).patch(flashes::update_flash),
        )
        .route("/:id/submit", post(review::submit_flash))
        .route("/:id/decision", post(review::supervisor_decision))
        .route("/:id/review", post(review::safety_review))
        .route("/:id/archive", post(review::archive_flash))
        .route("/:id/resend-email", post(review::resend_email))
        .route("/:id/translations", post(review::create_translation))
        .route(
            "/:id/lock",
            put(locks::acquire_lock).delete(locks::release_lock),
        )
        .route("/:id/preview", get(flashes::get_preview))
        .route(
            "/:id/extra-images",
            post(images::add_extra_images),
        )
        .route(
            "/:id/extra-images/:image_id",
            delete(images::remove_extra_image),
        )
        .route("/:id/display-targets", put(displays::assign_targets))
        .route("/:id/display-remove", post(displays::remove_from_display));

    let images_routes = Router::new()
        .route("/temp", post(images::upload_temp_image))
        .route("/temp/:name", delete(images::delete_temp_image));

    let displays_routes = Router::new()
        .route(
            "/",
            get(displays::list_targets).post(displays::create_target),
        )
        .route(
            "/:id",
            axum::routing::patch(displays::update_target).delete(displays::delete_target),
        );

    let admin_routes = Router::new()
        .route("/audit-log", get(admin::list_audit_log))
        .route("/email-log", get(admin::list_email_log));

    let playlist_routes = Router::new()
        .route("/", get(displays::playlist))
        .route("/preview/:flash_id", get(displays::playlist_preview));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/flashes", flashes_routes)
        .nest("/api/images", images_routes)
        .nest("/api/displays", displays_routes)
        .nest("/api/admin", admin_routes)
        .route("/api/supervisors", get(supervisors::list_supervisors))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/playlist", playlist_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
