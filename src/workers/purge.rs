use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::{jobs::JOB_PURGE_TEMP_UPLOADS, state::AppState, storage::TEMP_PREFIX};

use super::{JobExecution, JobHandler};

const MAX_TEMP_AGE_HOURS: i64 = 24;

pub struct PurgeTempUploadsJob;

impl PurgeTempUploadsJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for PurgeTempUploadsJob {
    fn job_type(&self) -> &'static str {
        JOB_PURGE_TEMP_UPLOADS
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let objects = match state.storage.list_objects(TEMP_PREFIX).await {
            Ok(objects) => objects,
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("failed to list temp uploads: {err}"),
                }
            }
        };

        let cutoff = Utc::now() - chrono::Duration::hours(MAX_TEMP_AGE_HOURS);
        let mut removed = 0usize;
        for object in objects {
            let Some(last_modified) = object.last_modified else {
                continue;
            };
            if last_modified >= cutoff {
                continue;
            }
            match state.storage.delete_object(&object.key).await {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(key = %object.key, error = %err, "failed to purge temp upload");
                }
            }
        }

        info!(job_id = %job.id, removed, "temp upload sweep finished");
        JobExecution::Success
    }
}
