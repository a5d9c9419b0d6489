use anyhow::Result;
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::json;
use uuid::Uuid;

use crate::approvals;
use crate::config::AppConfig;
use crate::domain::workflow::FlashState;
use crate::jobs::{enqueue_job, JOB_SEND_NOTIFICATION};
use crate::models::{Flash, NewEmailLogEntry};
use crate::schema::{email_log, users};

pub const EMAIL_STATUS_QUEUED: &str = "queued";
pub const EMAIL_STATUS_SENT: &str = "sent";
pub const EMAIL_STATUS_FAILED: &str = "failed";

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Async SMTP delivery. STARTTLS relay on the configured host; credentials
/// are optional for unauthenticated relays.
pub struct SmtpMailer {
    host: String,
    port: u16,
    from: String,
    user: Option<String>,
    password: Option<String>,
}

impl SmtpMailer {
    /// Returns `None` when `SMTP_HOST` is not configured, signalling that
    /// delivery should be replaced with a logging no-op.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config.smtp_host.as_ref().map(|host| Self {
            host: host.clone(),
            port: config.smtp_port,
            from: config.smtp_from.clone(),
            user: config.smtp_user.clone(),
            password: config.smtp_password.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?
            .port(self.port);
        if let (Some(user), Some(pass)) = (&self.user, &self.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        builder.build().send(email).await?;
        tracing::info!(to, subject, "notification email sent");
        Ok(())
    }
}

/// Stands in when no SMTP host is configured; deliveries are logged and
/// reported as sent.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
        tracing::info!(to, subject, "SMTP not configured; dropping notification");
        Ok(())
    }
}

pub fn subject_for(flash: &Flash, new_state: FlashState) -> String {
    let label = match new_state {
        FlashState::PendingSupervisor => "awaiting supervisor approval",
        FlashState::PendingReview => "awaiting safety review",
        FlashState::RequestInfo => "changes requested",
        FlashState::Published => "published",
        FlashState::Archived => "archived",
        FlashState::Draft => "returned to draft",
    };
    format!("[SafetyFlash] {}: {label}", flash.title)
}

pub fn body_for(flash: &Flash, old_state: FlashState, new_state: FlashState) -> String {
    format!(
        "Safety flash \"{}\" moved from {} to {}.\nSite: {}\n",
        flash.title,
        old_state,
        new_state,
        flash.site.as_deref().unwrap_or("-"),
    )
}

/// Recipients for a transition, by destination state: supervisor gate goes
/// to the selected approvers, the review queue to the safety team, and
/// everything returning to or leaving the author's hands to the creator.
pub fn transition_recipients(
    conn: &mut PgConnection,
    flash: &Flash,
    new_state: FlashState,
) -> Result<Vec<String>, diesel::result::Error> {
    let mut emails: Vec<String> = match new_state {
        FlashState::PendingSupervisor => {
            approvals::selected_approvers(conn, &flash.selected_approvers)?
                .into_iter()
                .map(|approver| approver.email)
                .collect()
        }
        FlashState::PendingReview => users::table
            .filter(users::role.eq("safety"))
            .filter(users::active.eq(true))
            .select(users::email)
            .load(conn)?,
        FlashState::RequestInfo
        | FlashState::Published
        | FlashState::Archived
        | FlashState::Draft => users::table
            .find(flash.created_by)
            .select(users::email)
            .load(conn)?,
    };
    emails.retain(|email| !email.trim().is_empty());
    emails.dedup();
    Ok(emails)
}

/// Records one `email_log` row per recipient (status `queued`) and enqueues
/// a single delivery job, all on the caller's transaction. Callers gate this
/// behind [`crate::domain::workflow::should_notify`].
pub fn queue_transition_notification(
    conn: &mut PgConnection,
    flash: &Flash,
    old_state: FlashState,
    new_state: FlashState,
) -> Result<usize, diesel::result::Error> {
    let recipients = transition_recipients(conn, flash, new_state)?;
    if recipients.is_empty() {
        return Ok(0);
    }

    let subject = subject_for(flash, new_state);
    let entries: Vec<NewEmailLogEntry> = recipients
        .iter()
        .map(|recipient| NewEmailLogEntry {
            id: Uuid::new_v4(),
            flash_id: flash.id,
            recipient: recipient.clone(),
            subject: subject.clone(),
            status: EMAIL_STATUS_QUEUED.to_string(),
        })
        .collect();

    diesel::insert_into(email_log::table)
        .values(&entries)
        .execute(conn)?;

    enqueue_job(
        conn,
        JOB_SEND_NOTIFICATION,
        json!({
            "flash_id": flash.id,
            "old_state": old_state.as_str(),
            "new_state": new_state.as_str(),
        }),
        None,
    )
    .map_err(|err| match err {
        crate::jobs::JobQueueError::Database(inner) => inner,
    })?;

    Ok(entries.len())
}
