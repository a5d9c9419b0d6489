mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct FlashDetail {
    ok: bool,
    flash: FlashInfo,
}

#[derive(Deserialize)]
struct FlashInfo {
    id: Uuid,
    state: String,
    title: String,
    site: Option<String>,
    lang: String,
    translation_group_id: Option<Uuid>,
    published_at: Option<String>,
    display_expires_at: Option<String>,
}

async fn parse_detail(response: hyper::Response<axum::body::Body>) -> Result<FlashDetail> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn create_flash(
    app: &TestApp,
    token: &str,
    title: &str,
    site: &str,
    approver_ids: &[Uuid],
    submission_type: &str,
) -> Result<FlashDetail> {
    let response = app
        .post_json(
            "/api/flashes",
            &json!({
                "title": title,
                "site": site,
                "approver_ids": approver_ids,
                "submission_type": submission_type,
            }),
            Some(token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    parse_detail(response).await
}

/// Walks a flash through safety review to published: no approvers, so
/// submission routes straight to pending_review.
async fn publish_flash(
    app: &TestApp,
    creator_token: &str,
    safety_token: &str,
    title: &str,
) -> Result<FlashDetail> {
    let detail = create_flash(app, creator_token, title, "Plant A", &[], "review").await?;
    assert_eq!(detail.flash.state, "pending_review");

    let response = app
        .post_json(
            &format!("/api/flashes/{}/review", detail.flash.id),
            &json!({ "approve": true }),
            Some(safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    parse_detail(response).await
}

#[tokio::test]
async fn submission_without_approvers_routes_to_review() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("safety", "pass1234", "safety", "safety@example.com")
        .await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let token = app.login_token("creator", "pass1234").await?;

    let detail = create_flash(
        &app,
        &token,
        "Forklift near miss",
        "Plant A",
        &[],
        "review",
    )
    .await?;
    assert!(detail.ok);
    assert_eq!(detail.flash.state, "pending_review");
    assert_eq!(detail.flash.site.as_deref(), Some("Plant A"));

    // Straight-to-review submission notifies the safety team.
    let emails = app.email_log_rows(detail.flash.id).await?;
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].recipient, "safety@example.com");
    assert_eq!(emails[0].status, "queued");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn submission_with_approvers_routes_to_supervisor_gate() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let sup_a = app
        .insert_user("sup-a", "pass1234", "employee", "sup-a@example.com")
        .await?;
    let sup_b = app
        .insert_user("sup-b", "pass1234", "employee", "sup-b@example.com")
        .await?;
    app.assign_supervisor(sup_a, Some("Plant A")).await?;
    app.assign_supervisor(sup_b, None).await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let token = app.login_token("creator", "pass1234").await?;

    let detail = create_flash(
        &app,
        &token,
        "Ladder incident",
        "Plant A",
        &[sup_a, sup_b],
        "review",
    )
    .await?;
    assert_eq!(detail.flash.state, "pending_supervisor");

    let mut approvers = app.approver_rows(detail.flash.id).await?;
    approvers.sort();
    let mut expected = vec![sup_a, sup_b];
    expected.sort();
    assert_eq!(approvers, expected);

    let emails = app.email_log_rows(detail.flash.id).await?;
    let mut recipients: Vec<_> = emails.iter().map(|e| e.recipient.as_str()).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["sup-a@example.com", "sup-b@example.com"]);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn supervisor_approval_forwards_to_safety_review() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let sup = app
        .insert_user("sup", "pass1234", "employee", "sup@example.com")
        .await?;
    app.assign_supervisor(sup, Some("Plant B")).await?;
    app.insert_user("safety", "pass1234", "safety", "safety@example.com")
        .await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let creator_token = app.login_token("creator", "pass1234").await?;
    let sup_token = app.login_token("sup", "pass1234").await?;
    let safety_token = app.login_token("safety", "pass1234").await?;

    let detail = create_flash(&app, &creator_token, "Spill", "Plant B", &[sup], "review").await?;
    assert_eq!(detail.flash.state, "pending_supervisor");

    let response = app
        .post_json(
            &format!("/api/flashes/{}/decision", detail.flash.id),
            &json!({ "approve": true }),
            Some(&sup_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let after = parse_detail(response).await?;
    assert_eq!(after.flash.state, "pending_review");

    let response = app
        .post_json(
            &format!("/api/flashes/{}/review", detail.flash.id),
            &json!({ "approve": true }),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let published = parse_detail(response).await?;
    assert_eq!(published.flash.state, "published");
    assert!(published.flash.published_at.is_some());
    assert!(published.flash.display_expires_at.is_some());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn supervisor_request_changes_returns_flash_to_author() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    let sup = app
        .insert_user("sup", "pass1234", "employee", "sup@example.com")
        .await?;
    app.assign_supervisor(sup, None).await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let creator_token = app.login_token("creator", "pass1234").await?;
    let sup_token = app.login_token("sup", "pass1234").await?;

    let detail = create_flash(&app, &creator_token, "Burn", "Plant A", &[sup], "review").await?;
    let response = app
        .post_json(
            &format!("/api/flashes/{}/decision", detail.flash.id),
            &json!({ "approve": false, "comment": "need photos" }),
            Some(&sup_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let after = parse_detail(response).await?;
    assert_eq!(after.flash.state, "request_info");

    // The author is told, and can resubmit from request_info.
    let emails = app.email_log_rows(detail.flash.id).await?;
    assert!(emails
        .iter()
        .any(|entry| entry.recipient == "creator@example.com"));

    let response = app
        .post_json(
            &format!("/api/flashes/{}/submit", detail.flash.id),
            &json!({ "approver_ids": [] }),
            Some(&creator_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let resubmitted = parse_detail(response).await?;
    assert_eq!(resubmitted.flash.state, "pending_review");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn plain_saves_preserve_state_and_send_nothing() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let token = app.login_token("creator", "pass1234").await?;

    let detail = create_flash(&app, &token, "Draft one", "Plant A", &[], "draft").await?;
    assert_eq!(detail.flash.state, "draft");
    assert!(app.email_log_rows(detail.flash.id).await?.is_empty());

    let response = app
        .patch_json(
            &format!("/api/flashes/{}", detail.flash.id),
            &json!({ "title": "Draft one, revised", "summary": "updated" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let after = parse_detail(response).await?;
    assert_eq!(after.flash.state, "draft");
    assert_eq!(after.flash.title, "Draft one, revised");

    // Same-state edit: still no notification.
    assert!(app.email_log_rows(detail.flash.id).await?.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn outsiders_cannot_mutate_a_flash() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    app.insert_user("rando", "pass1234", "communications", "rando@example.com")
        .await?;
    let creator_token = app.login_token("creator", "pass1234").await?;
    let rando_token = app.login_token("rando", "pass1234").await?;

    let detail = create_flash(&app, &creator_token, "Original", "Plant A", &[], "draft").await?;

    let response = app
        .patch_json(
            &format!("/api/flashes/{}", detail.flash.id),
            &json!({ "title": "Hijacked" }),
            Some(&rando_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let row = app.flash_row(detail.flash.id).await?;
    assert_eq!(row.title, "Original");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn illegal_transitions_are_conflicts() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("safety", "pass1234", "safety", "safety@example.com")
        .await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let creator_token = app.login_token("creator", "pass1234").await?;
    let safety_token = app.login_token("safety", "pass1234").await?;

    let detail = create_flash(&app, &creator_token, "Draft", "Plant A", &[], "draft").await?;

    // Review and supervisor decisions are not offered from draft.
    let response = app
        .post_json(
            &format!("/api/flashes/{}/review", detail.flash.id),
            &json!({ "approve": true }),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post_json(
            &format!("/api/flashes/{}/decision", detail.flash.id),
            &json!({ "approve": true }),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Archive requires published.
    let response = app
        .post_json(
            &format!("/api/flashes/{}/archive", detail.flash.id),
            &json!({}),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn archive_clears_heavy_fields_and_is_one_way() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("safety", "pass1234", "safety", "safety@example.com")
        .await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let creator_token = app.login_token("creator", "pass1234").await?;
    let safety_token = app.login_token("safety", "pass1234").await?;

    let published = publish_flash(&app, &creator_token, &safety_token, "To archive").await?;

    // Give it annotations so the archive has something to clear.
    let response = app
        .patch_json(
            &format!("/api/flashes/{}", published.flash.id),
            &json!({ "annotations_data": { "shapes": [1, 2, 3] } }),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(
            &format!("/api/flashes/{}/archive", published.flash.id),
            &json!({}),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let result: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(result["success"], true);

    let row = app.flash_row(published.flash.id).await?;
    assert!(row.is_archived);
    assert_eq!(row.state, "archived");
    assert!(row.annotations_data.is_none());
    assert!(row.grid_bitmap.is_none());
    assert_eq!(row.title, "To archive");

    // Archiving twice fails without further writes.
    let before = app.flash_row(published.flash.id).await?;
    let response = app
        .post_json(
            &format!("/api/flashes/{}/archive", published.flash.id),
            &json!({}),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let after = app.flash_row(published.flash.id).await?;
    assert_eq!(before.updated_at, after.updated_at);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn resend_email_requires_published_state() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("safety", "pass1234", "safety", "safety@example.com")
        .await?;
    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let creator_token = app.login_token("creator", "pass1234").await?;
    let safety_token = app.login_token("safety", "pass1234").await?;

    let draft = create_flash(&app, &creator_token, "Not yet", "Plant A", &[], "draft").await?;
    let response = app
        .post_json(
            &format!("/api/flashes/{}/resend-email", draft.flash.id),
            &json!({}),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_to_vec(response.into_body()).await?;
    let error: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(error["ok"], false);
    assert!(app.email_log_rows(draft.flash.id).await?.is_empty());

    let published = publish_flash(&app, &creator_token, &safety_token, "Sent twice").await?;
    let before = app.email_log_rows(published.flash.id).await?.len();
    let response = app
        .post_json(
            &format!("/api/flashes/{}/resend-email", published.flash.id),
            &json!({}),
            Some(&safety_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let after = app.email_log_rows(published.flash.id).await?.len();
    assert!(after > before);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn translation_children_stay_out_of_the_workflow() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let token = app.login_token("creator", "pass1234").await?;

    let root = create_flash(&app, &token, "Root notice", "Plant A", &[], "draft").await?;

    let response = app
        .post_json(
            &format!("/api/flashes/{}/translations", root.flash.id),
            &json!({ "lang": "fi" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let child = parse_detail(response).await?;
    assert_eq!(child.flash.lang, "fi");
    assert_eq!(child.flash.state, "draft");
    assert_eq!(child.flash.translation_group_id, Some(root.flash.id));

    // Same language again is a conflict.
    let response = app
        .post_json(
            &format!("/api/flashes/{}/translations", root.flash.id),
            &json!({ "lang": "fi" }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Children cannot be submitted and never notify.
    let response = app
        .post_json(
            &format!("/api/flashes/{}/submit", child.flash.id),
            &json!({ "approver_ids": [] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(app.email_log_rows(child.flash.id).await?.is_empty());

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn temp_image_names_are_strictly_validated() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let token = app.login_token("creator", "pass1234").await?;

    // Wrong prefix on temp delete.
    let response = app
        .delete("/api/images/temp/evil.png", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Encoded traversal attempt decodes to a path-bearing name.
    let response = app
        .delete("/api/images/temp/temp_..%2Fsecret", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Extra images demand the temp_extra_ prefix.
    let detail = create_flash(&app, &token, "Has images", "Plant A", &[], "draft").await?;
    let response = app
        .post_json(
            &format!("/api/flashes/{}/extra-images", detail.flash.id),
            &json!({ "images": [{ "filename": "temp_notextra.png" }] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // And a well-formed upload flows through.
    let upload = app
        .upload_temp_image("extra", "site-photo.png", b"png-bytes", &token)
        .await?;
    assert_eq!(upload.status(), StatusCode::CREATED);
    let body = body_to_vec(upload.into_body()).await?;
    let uploaded: serde_json::Value = serde_json::from_slice(&body)?;
    let filename = uploaded["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("temp_extra_"));

    let response = app
        .post_json(
            &format!("/api/flashes/{}/extra-images", detail.flash.id),
            &json!({ "images": [{ "filename": filename, "caption": "loading dock" }] }),
            Some(&token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let result: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(result["images"].as_array().unwrap().len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn editing_lease_is_advisory_and_admin_breakable() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("admin", "pass1234", "admin", "admin@example.com")
        .await?;
    app.insert_user("alice", "pass1234", "employee", "alice@example.com")
        .await?;
    app.insert_user("bob", "pass1234", "safety", "bob@example.com")
        .await?;
    let alice_token = app.login_token("alice", "pass1234").await?;
    let bob_token = app.login_token("bob", "pass1234").await?;
    let admin_token = app.login_token("admin", "pass1234").await?;

    let detail = create_flash(&app, &alice_token, "Locked", "Plant A", &[], "draft").await?;
    let lock_path = format!("/api/flashes/{}/lock", detail.flash.id);

    let response = app.put_json(&lock_path, &json!({}), Some(&alice_token)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    // A second writer sees the holder but is not blocked from saving.
    let response = app.put_json(&lock_path, &json!({}), Some(&bob_token)).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let response = app
        .patch_json(
            &format!("/api/flashes/{}", detail.flash.id),
            &json!({ "summary": "bob writes anyway" }),
            Some(&bob_token),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Only the holder or an admin may clear the lease.
    let response = app.delete(&lock_path, Some(&bob_token)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = app.delete(&lock_path, Some(&admin_token)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn preview_jobs_are_queued_for_new_flashes() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::new().await? else {
        return Ok(());
    };

    app.insert_user("creator", "pass1234", "employee", "creator@example.com")
        .await?;
    let token = app.login_token("creator", "pass1234").await?;

    let detail = create_flash(&app, &token, "Preview me", "Plant A", &[], "draft").await?;
    let jobs = app.jobs_by_type("render-preview").await?;
    assert!(jobs.iter().any(|job| {
        job.payload["flash_id"]
            .as_str()
            .and_then(|raw| raw.parse::<Uuid>().ok())
            == Some(detail.flash.id)
    }));

    let row = app.flash_row(detail.flash.id).await?;
    assert_eq!(row.preview_status, "queued");

    app.cleanup().await?;
    Ok(())
}
