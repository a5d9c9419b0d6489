use std::{io::Cursor, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgba, RgbaImage};
use serde::Deserialize;
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    domain::workflow::PreviewStatus,
    jobs::JOB_RENDER_PREVIEW,
    models::Flash,
    schema::flashes,
    state::AppState,
    storage::PREVIEWS_PREFIX,
};

use super::{JobExecution, JobHandler};

const CARD_WIDTH: u32 = 1280;
const CARD_HEIGHT: u32 = 960;
const FRAME_THICKNESS: u32 = 28;

#[derive(Debug, Deserialize)]
struct PreviewPayload {
    flash_id: Uuid,
}

pub struct RenderPreviewJob;

impl RenderPreviewJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for RenderPreviewJob {
    fn job_type(&self) -> &'static str {
        JOB_RENDER_PREVIEW
    }

    async fn handle(&self, state: Arc<AppState>, job: crate::models::Job) -> JobExecution {
        let payload: PreviewPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid preview payload: {err}"),
                }
            }
        };

        let state_clone = state.clone();
        let flash = match task::spawn_blocking(move || load_flash(state_clone, payload.flash_id))
            .await
        {
            Ok(Ok(Some(flash))) => flash,
            Ok(Ok(None)) => {
                info!(job_id = %job.id, "flash gone or archived; skipping preview");
                return JobExecution::Success;
            }
            Ok(Err(err)) => {
                warn!(job_id = %job.id, error = %err, "preview job will retry");
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: err,
                };
            }
            Err(join_err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("worker panicked: {join_err}"),
                };
            }
        };

        let main_image = match &flash.image_key {
            Some(key) => match state.storage.get_object(key).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "preview image fetch failed; will retry");
                    return JobExecution::Retry {
                        delay: Duration::from_secs(30),
                        error: err.to_string(),
                    };
                }
            },
            None => None,
        };

        let flash_type = flash.flash_type.clone();
        let rendered = match task::spawn_blocking(move || {
            render_card(&flash_type, main_image.as_deref())
        })
        .await
        {
            Ok(Ok(png)) => png,
            Ok(Err(err)) => {
                let state_clone = state.clone();
                let flash_id = flash.id;
                let _ = task::spawn_blocking(move || {
                    mark_preview_status(state_clone, flash_id, PreviewStatus::Failed, None)
                })
                .await;
                return JobExecution::Failed { error: err };
            }
            Err(join_err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(60),
                    error: format!("render panicked: {join_err}"),
                };
            }
        };

        let preview_key = format!("{PREVIEWS_PREFIX}{}.png", Uuid::new_v4());
        if let Err(err) = state
            .storage
            .put_object(&preview_key, rendered, Some("image/png".to_string()))
            .await
        {
            warn!(job_id = %job.id, error = %err, "preview upload failed; will retry");
            return JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err.to_string(),
            };
        }

        // Drop the superseded preview object once the new one is live.
        if let Some(old_key) = flash.preview_key.clone() {
            if let Err(err) = state.storage.delete_object(&old_key).await {
                warn!(key = %old_key, error = %err, "failed to delete stale preview");
            }
        }

        let state_clone = state.clone();
        let flash_id = flash.id;
        match task::spawn_blocking(move || {
            mark_preview_status(
                state_clone,
                flash_id,
                PreviewStatus::Ready,
                Some(preview_key),
            )
        })
        .await
        {
            Ok(Ok(())) => JobExecution::Success,
            Ok(Err(err)) => JobExecution::Retry {
                delay: Duration::from_secs(30),
                error: err,
            },
            Err(join_err) => JobExecution::Retry {
                delay: Duration::from_secs(60),
                error: format!("worker panicked: {join_err}"),
            },
        }
    }
}

fn load_flash(state: Arc<AppState>, flash_id: Uuid) -> Result<Option<Flash>, String> {
    let mut conn = state
        .db()
        .map_err(|_| "database pool exhausted".to_string())?;
    let flash: Option<Flash> = flashes::table
        .find(flash_id)
        .first(&mut conn)
        .optional()
        .map_err(|err| err.to_string())?;
    Ok(flash.filter(|flash| !flash.is_archived))
}

fn mark_preview_status(
    state: Arc<AppState>,
    flash_id: Uuid,
    status: PreviewStatus,
    preview_key: Option<String>,
) -> Result<(), String> {
    let mut conn = state
        .db()
        .map_err(|_| "database pool exhausted".to_string())?;
    diesel::update(flashes::table.find(flash_id))
        .set((
            flashes::preview_status.eq(status.as_str()),
            preview_key.map(|key| flashes::preview_key.eq(key)),
            flashes::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| err.to_string())?;
    Ok(())
}

/// Composes the signage card: a white canvas with a type-coloured frame and
/// the main photo scaled into the remaining area.
fn render_card(flash_type: &str, main_image: Option<&[u8]>) -> Result<Vec<u8>, String> {
    let frame = frame_color(flash_type);
    let mut canvas = RgbaImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, frame);

    let inner = Rgba([255u8, 255, 255, 255]);
    for y in FRAME_THICKNESS..CARD_HEIGHT - FRAME_THICKNESS {
        for x in FRAME_THICKNESS..CARD_WIDTH - FRAME_THICKNESS {
            canvas.put_pixel(x, y, inner);
        }
    }

    if let Some(bytes) = main_image {
        let decoded = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|err| format!("failed to sniff image format: {err}"))?
            .decode()
            .map_err(|err| format!("failed to decode main image: {err}"))?;

        let max_w = CARD_WIDTH - FRAME_THICKNESS * 4;
        let max_h = CARD_HEIGHT - FRAME_THICKNESS * 4;
        let scaled = decoded.resize(max_w, max_h, imageops::FilterType::Triangle);
        let x = (CARD_WIDTH - scaled.width()) / 2;
        let y = (CARD_HEIGHT - scaled.height()) / 2;
        imageops::overlay(&mut canvas, &scaled.to_rgba8(), i64::from(x), i64::from(y));
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|err| format!("failed to encode preview: {err}"))?;
    Ok(out)
}

fn frame_color(flash_type: &str) -> Rgba<u8> {
    match flash_type {
        "red" => Rgba([192, 57, 43, 255]),
        "green" => Rgba([39, 174, 96, 255]),
        _ => Rgba([241, 196, 15, 255]),
    }
}
