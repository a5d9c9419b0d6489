use std::env;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use safetyflash::{
    auth::password,
    config::AppConfig,
    db,
    models::NewUser,
    schema::users,
    storage::{ObjectStorage, S3Storage, TEMP_PREFIX},
};

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("purge-temp") => purge_temp().await?,
        Some("seed-admin") => {
            let username = args.next().context("usage: maintenance seed-admin <username> <password>")?;
            let secret = args.next().context("usage: maintenance seed-admin <username> <password>")?;
            seed_admin(&username, &secret)?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\nUsage: maintenance purge-temp | seed-admin <username> <password>");
            std::process::exit(1);
        }
        None => {
            eprintln!("Usage: maintenance purge-temp | seed-admin <username> <password>");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Immediate temp-upload sweep, for operators who do not want to wait for
/// the probabilistic in-request trigger.
async fn purge_temp() -> Result<()> {
    let config = AppConfig::from_env()?;
    let storage = S3Storage::from_config(&config).await?;

    let objects = storage.list_objects(TEMP_PREFIX).await?;
    if objects.is_empty() {
        println!("No temp uploads found.");
        return Ok(());
    }

    let cutoff = Utc::now() - Duration::hours(24);
    let mut removed = 0usize;
    for object in &objects {
        let Some(last_modified) = object.last_modified else {
            continue;
        };
        if last_modified >= cutoff {
            continue;
        }
        if let Err(err) = storage.delete_object(&object.key).await {
            eprintln!("Failed to delete {}: {err}", object.key);
        } else {
            removed += 1;
        }
    }

    println!("Removed {removed} of {} temp uploads.", objects.len());
    Ok(())
}

fn seed_admin(username: &str, secret: &str) -> Result<()> {
    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: password::hash_password(secret)?,
        role: "admin".to_string(),
        full_name: username.to_string(),
        email: String::new(),
        lang: "en".to_string(),
        active: true,
    };

    diesel::insert_into(users::table)
        .values(&user)
        .execute(&mut conn)
        .context("failed to insert admin user")?;

    println!("Admin user {username} created with id {}.", user.id);
    Ok(())
}
