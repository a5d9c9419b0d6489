use std::sync::Arc;
use std::time::Duration;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    notify::Mailer,
    ratelimit::SlidingWindow,
    storage::ObjectStorage,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub jwt: JwtService,
    pub playlist_limiter: Arc<SlidingWindow>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtService,
    ) -> Self {
        let playlist_limiter = Arc::new(SlidingWindow::new(
            config.playlist_rate_limit,
            Duration::from_secs(config.playlist_rate_window_secs),
        ));
        Self {
            pool,
            config: Arc::new(config),
            storage,
            mailer,
            jwt,
            playlist_limiter,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
