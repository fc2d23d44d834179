mod common;

use chrono::{DateTime, Utc};
use serde_json::json;
use testcontainers::clients::Cli;
use uuid::Uuid;

use common::{mint_access_token, seed_user, setup, TestApp};

async fn open_direct(app: &TestApp, from: Uuid, to: Uuid) -> String {
    let res = reqwest::Client::new()
        .post(format!("{}/api/v1/conversations", app.base_url))
        .bearer_auth(mint_access_token(from, &app.jwt_secret))
        .json(&json!({ "peer_user_id": to }))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_success());
    let body: serde_json::Value = res.json().await.unwrap();
    body["conversation"]["id"].as_str().unwrap().to_string()
}

async fn send_text(
    app: &TestApp,
    conversation_id: &str,
    sender: Uuid,
    client_msg_id: &str,
    text: &str,
) -> (u16, serde_json::Value) {
    let res = reqwest::Client::new()
        .post(format!(
            "{}/api/v1/conversations/{conversation_id}/messages",
            app.base_url
        ))
        .bearer_auth(mint_access_token(sender, &app.jwt_secret))
        .json(&json!({ "client_msg_id": client_msg_id, "type": "text", "text": text }))
        .send()
        .await
        .unwrap();
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn append_is_idempotent_per_sender_and_token() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let conv = open_direct(app, alice, bob).await;

    let (status, body) = send_text(app, &conv, alice, "c-1", "hello").await;
    assert_eq!(status, 201);
    let first_id = body["message"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["message"]["text"], "hello");
    assert_eq!(body["message"]["type"], "text");

    // Byte-identical retry: same row, no duplicate.
    let (status, body) = send_text(app, &conv, alice, "c-1", "hello").await;
    assert_eq!(status, 200);
    assert_eq!(body["message"]["id"].as_str().unwrap(), first_id);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(rows, 1);

    // A fresh token appends normally.
    let (status, _) = send_text(app, &conv, alice, "c-2", "again").await;
    assert_eq!(status, 201);

    // The same token from a different sender is that sender's own namespace.
    let (status, _) = send_text(app, &conv, bob, "c-1", "mine too").await;
    assert_eq!(status, 201);
}

#[tokio::test]
async fn reusing_a_token_across_conversations_conflicts() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let carol = seed_user(&app.db, "carol").await;
    let conv_ab = open_direct(app, alice, bob).await;
    let conv_ac = open_direct(app, alice, carol).await;

    let (status, _) = send_text(app, &conv_ab, alice, "c-1", "hello bob").await;
    assert_eq!(status, 201);

    let (status, body) = send_text(app, &conv_ac, alice, "c-1", "hello carol").await;
    assert_eq!(status, 409);
    assert_eq!(body["code"], "conflict");

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn history_pages_newest_first_with_a_cursor() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let conv = open_direct(app, alice, bob).await;
    let client = reqwest::Client::new();
    let token = mint_access_token(alice, &app.jwt_secret);

    for i in 1..=12 {
        let (status, _) = send_text(app, &conv, alice, &format!("c-{i}"), &format!("m{i}")).await;
        assert_eq!(status, 201);
    }

    let url = format!("{}/api/v1/conversations/{conv}/messages", app.base_url);
    let res = client
        .get(&url)
        .query(&[("limit", "5")])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["text"], "m12");
    assert_eq!(items[4]["text"], "m8");
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    let res = client
        .get(&url)
        .query(&[("limit", "5"), ("before", cursor.as_str())])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["text"], "m7");
    assert_eq!(items[4]["text"], "m3");
    let cursor = body["next_cursor"].as_str().unwrap().to_string();

    // Final short page carries no cursor.
    let res = client
        .get(&url)
        .query(&[("limit", "5"), ("before", cursor.as_str())])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["text"], "m1");
    assert!(body["next_cursor"].is_null());

    let res = client
        .get(&url)
        .query(&[("before", "yesterday-ish")])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn membership_gates_history_and_sends() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let carol = seed_user(&app.db, "carol").await;
    let conv = open_direct(app, alice, bob).await;
    let client = reqwest::Client::new();

    // An outsider sees a 403 on an existing conversation.
    let res = client
        .get(format!(
            "{}/api/v1/conversations/{conv}/messages",
            app.base_url
        ))
        .bearer_auth(mint_access_token(carol, &app.jwt_secret))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "forbidden");

    let (status, body) = send_text(app, &conv, carol, "c-1", "let me in").await;
    assert_eq!(status, 403);
    assert_eq!(body["code"], "forbidden");

    // A conversation that does not exist is a 404 for everyone.
    let ghost = Uuid::new_v4();
    let res = client
        .get(format!(
            "{}/api/v1/conversations/{ghost}/messages",
            app.base_url
        ))
        .bearer_auth(mint_access_token(alice, &app.jwt_secret))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn append_validation_rejects_malformed_payloads() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let conv = open_direct(app, alice, bob).await;
    let client = reqwest::Client::new();
    let token = mint_access_token(alice, &app.jwt_secret);
    let url = format!("{}/api/v1/conversations/{conv}/messages", app.base_url);

    let cases = [
        (json!({ "type": "text", "text": "hi" }), "bad_request"),
        (json!({ "client_msg_id": "c-1", "text": "hi" }), "bad_request"),
        (json!({ "client_msg_id": "c-1", "type": "text" }), "bad_request"),
        (json!({ "client_msg_id": "c-1", "type": "video", "text": "x" }), "unsupported_type"),
        (
            json!({ "client_msg_id": "c-1", "type": "file", "file_url": "https://cdn/x.pdf" }),
            "bad_request",
        ),
    ];
    for (payload, code) in cases {
        let res = client
            .post(&url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400, "payload: {payload}");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["code"], code, "payload: {payload}");
    }

    // Attachment without optional mime/size is fine.
    let res = client
        .post(&url)
        .bearer_auth(&token)
        .json(&json!({
            "client_msg_id": "c-ok",
            "type": "image",
            "file_url": "https://cdn.example/p.png",
            "file_name": "p.png"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 201);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"]["type"], "image");
    assert!(body["message"]["text"].is_null());
}

#[tokio::test]
async fn read_watermark_updates_peer_messages_up_to_target() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let conv = open_direct(app, alice, bob).await;
    let client = reqwest::Client::new();

    send_text(app, &conv, bob, "b-1", "one").await;
    let (_, b2) = send_text(app, &conv, bob, "b-2", "two").await;
    send_text(app, &conv, bob, "b-3", "three").await;
    send_text(app, &conv, alice, "a-1", "mine").await;
    let m2 = b2["message"]["id"].as_str().unwrap();

    let read_at: DateTime<Utc> = "2026-08-21T10:00:00Z".parse().unwrap();
    let res = client
        .post(format!("{}/api/v1/conversations/{conv}/read", app.base_url))
        .bearer_auth(mint_access_token(alice, &app.jwt_secret))
        .json(&json!({ "last_read_message_id": m2, "read_at": read_at }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["updated"], 2);

    let stored: Vec<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
        "SELECT client_msg_id, read_at FROM messages ORDER BY created_at",
    )
    .fetch_all(&app.db)
    .await
    .unwrap();
    for (token, stamp) in &stored {
        match token.as_str() {
            "b-1" | "b-2" => assert_eq!(stamp, &Some(read_at), "{token}"),
            // Beyond the watermark, and the reader's own messages, stay put.
            "b-3" | "a-1" => assert!(stamp.is_none(), "{token}"),
            other => panic!("unexpected row {other}"),
        }
    }

    // Replaying the same watermark transitions nothing.
    let res = client
        .post(format!("{}/api/v1/conversations/{conv}/read", app.base_url))
        .bearer_auth(mint_access_token(alice, &app.jwt_secret))
        .json(&json!({ "last_read_message_id": m2 }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["updated"], 0);

    // A target from another conversation is rejected.
    let carol = seed_user(&app.db, "carol").await;
    let other = open_direct(app, alice, carol).await;
    let res = client
        .post(format!(
            "{}/api/v1/conversations/{other}/read",
            app.base_url
        ))
        .bearer_auth(mint_access_token(alice, &app.jwt_secret))
        .json(&json!({ "last_read_message_id": m2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn bodies_are_sealed_at_rest_and_open_on_the_wire() {
    let docker = Cli::default();
    let ctx = setup(&docker).await;
    let app = &ctx.app;
    let alice = seed_user(&app.db, "alice").await;
    let bob = seed_user(&app.db, "bob").await;
    let conv = open_direct(app, alice, bob).await;

    let (_, body) = send_text(app, &conv, alice, "c-1", "the crown jewels").await;
    assert_eq!(body["message"]["text"], "the crown jewels");
    let id: Uuid = body["message"]["id"].as_str().unwrap().parse().unwrap();

    let stored: String = sqlx::query_scalar("SELECT body FROM messages WHERE id = $1")
        .bind(id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_ne!(stored, "the crown jewels");
    assert!(!stored.contains("crown"));

    // Rows written before encryption was introduced read back verbatim.
    let legacy_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, sender_id, client_msg_id, kind, body) \
         VALUES ($1, $2, $3, 'legacy-1', 'text', 'plain old text')",
    )
    .bind(legacy_id)
    .bind(Uuid::parse_str(&conv).unwrap())
    .bind(bob)
    .execute(&app.db)
    .await
    .unwrap();

    let res = reqwest::Client::new()
        .get(format!(
            "{}/api/v1/conversations/{conv}/messages",
            app.base_url
        ))
        .bearer_auth(mint_access_token(alice, &app.jwt_secret))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    let legacy = items
        .iter()
        .find(|m| m["id"] == legacy_id.to_string())
        .unwrap();
    assert_eq!(legacy["text"], "plain old text");
}
