use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use safetyflash::{
    auth::jwt::JwtService,
    config::AppConfig,
    db, default_handlers,
    notify::{LogMailer, Mailer, SmtpMailer},
    state::AppState,
    storage::{ObjectStorage, S3Storage},
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        s3_bucket = %config.s3_bucket,
        smtp_enabled = config.smtp_host.is_some(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage::from_config(&config).await?);
    let mailer: Arc<dyn Mailer> = match SmtpMailer::from_config(&config) {
        Some(mailer) => Arc::new(mailer),
        None => Arc::new(LogMailer),
    };
    let jwt = JwtService::from_config(&config)?;

    let state = Arc::new(AppState::new(pool, config, storage, mailer, jwt));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
