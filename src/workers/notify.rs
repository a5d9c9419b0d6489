use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    domain::workflow::FlashState,
    jobs::JOB_SEND_NOTIFICATION,
    models::{EmailLogEntry, Flash},
    notify::{body_for, EMAIL_STATUS_FAILED, EMAIL_STATUS_QUEUED, EMAIL_STATUS_SENT},
    schema::{email_log, flashes},
    state::AppState,
};

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct NotificationPayload {
    flash_id: Uuid,
    old_state: String,
    new_state: String,
}

pub struct SendNotificationJob;

impl SendNotificationJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for SendNotificationJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_NOTIFICATION
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: NotificationPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid notification payload: {err}"),
                }
            }
        };

        let (old_state, new_state) = match (
            FlashState::parse(&payload.old_state),
            FlashState::parse(&payload.new_state),
        ) {
            (Some(old), Some(new)) => (old, new),
            _ => {
                return JobExecution::Failed {
                    error: "notification payload carries unknown states".to_string(),
                }
            }
        };

        let state_clone = state.clone();
        let flash_id = payload.flash_id;
        let loaded = match task::spawn_blocking(move || load_pending(state_clone, flash_id)).await {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(err)) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err,
                }
            }
            Err(join_err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("worker panicked: {join_err}"),
                }
            }
        };

        let Some((flash, pending)) = loaded else {
            info!(job_id = %job.id, "flash gone; dropping notification");
            return JobExecution::Success;
        };
        if pending.is_empty() {
            return JobExecution::Success;
        }

        let body = body_for(&flash, old_state, new_state);
        for entry in pending {
            let outcome = state.mailer.send(&entry.recipient, &entry.subject, &body).await;
            let (status, error) = match outcome {
                Ok(()) => (EMAIL_STATUS_SENT, None),
                Err(err) => {
                    warn!(recipient = %entry.recipient, error = %err, "notification delivery failed");
                    (EMAIL_STATUS_FAILED, Some(err.to_string()))
                }
            };

            let state_clone = state.clone();
            let entry_id = entry.id;
            let updated = task::spawn_blocking(move || {
                mark_entry(state_clone, entry_id, status, error)
            })
            .await;
            match updated {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    return JobExecution::Retry {
                        delay: Duration::from_secs(30),
                        error: err,
                    }
                }
                Err(join_err) => {
                    return JobExecution::Retry {
                        delay: Duration::from_secs(60),
                        error: format!("worker panicked: {join_err}"),
                    }
                }
            }
        }

        JobExecution::Success
    }
}

type PendingDelivery = Option<(Flash, Vec<EmailLogEntry>)>;

fn load_pending(state: Arc<AppState>, flash_id: Uuid) -> Result<PendingDelivery, String> {
    let mut conn = state
        .db()
        .map_err(|_| "database pool exhausted".to_string())?;

    let flash: Option<Flash> = flashes::table
        .find(flash_id)
        .first(&mut conn)
        .optional()
        .map_err(|err| err.to_string())?;
    let Some(flash) = flash else {
        return Ok(None);
    };

    let pending: Vec<EmailLogEntry> = email_log::table
        .filter(email_log::flash_id.eq(flash_id))
        .filter(email_log::status.eq(EMAIL_STATUS_QUEUED))
        .order(email_log::created_at.asc())
        .load(&mut conn)
        .map_err(|err| err.to_string())?;

    Ok(Some((flash, pending)))
}

fn mark_entry(
    state: Arc<AppState>,
    entry_id: Uuid,
    status: &'static str,
    error: Option<String>,
) -> Result<(), String> {
    let mut conn = state
        .db()
        .map_err(|_| "database pool exhausted".to_string())?;
    diesel::update(email_log::table.find(entry_id))
        .set((
            email_log::status.eq(status),
            email_log::error.eq(error),
            email_log::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| err.to_string())?;
    Ok(())
}
