mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use relay_api::gateway::ServerEvent;

#[tokio::test]
async fn posted_message_is_stored_and_relayed() {
    let (app, state, store) = common::test_app();
    common::seed_users(store.as_ref(), 2).await;
    let server = TestServer::new(app).unwrap();
    let token = common::token_for(&state, 1);
    let mut receiver = state.hub.register(2);

    let resp = server
        .post("/chat/message")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&json!({"receiver_id": 2, "content": "over http"}))
        .await;
    resp.assert_status(StatusCode::CREATED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["sender_id"], 1);
    assert_eq!(body["type"], "text");
    assert_eq!(store.message_count(), 1);

    state.hub.connections().await;
    let mut relayed = None;
    while let Ok(frame) = receiver.outbound.try_recv() {
        if let ServerEvent::ChatMessage(m) = serde_json::from_str::<ServerEvent>(frame.as_str()).unwrap() {
            relayed = Some(m);
        }
    }
    let relayed = relayed.expect("chat message relayed");
    assert_eq!(relayed.id, body["id"].as_i64().unwrap());
    assert_eq!(relayed.content, "over http");
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let (app, state, store) = common::test_app();
    let server = TestServer::new(app).unwrap();
    let token = common::token_for(&state, 1);

    server
        .post("/chat/message")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&json!({"receiver_id": 2, "content": "  "}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(store.message_count(), 0);
}

#[tokio::test]
async fn message_to_unknown_user_is_404() {
    let (app, state, store) = common::test_app();
    common::seed_users(store.as_ref(), 1).await;
    let server = TestServer::new(app).unwrap();
    let token = common::token_for(&state, 1);

    let resp = server
        .post("/chat/message")
        .add_header(AUTHORIZATION, format!("Bearer {token}"))
        .json(&json!({"receiver_id": 42, "content": "hello?"}))
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["message"], "User not found");
    assert_eq!(store.message_count(), 0);
}

#[tokio::test]
async fn history_is_pairwise_and_marks_read() {
    let (app, state, store) = common::test_app();
    common::seed_users(store.as_ref(), 3).await;
    let server = TestServer::new(app).unwrap();
    let alice = common::token_for(&state, 1);
    let bob = common::token_for(&state, 2);
    let carol = common::token_for(&state, 3);

    for (token, receiver, content) in [
        (&alice, 2, "hi bob"),
        (&bob, 1, "hi alice"),
        (&carol, 1, "hi from carol"),
        (&alice, 2, "how are you"),
    ] {
        server
            .post("/chat/message")
            .add_header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&json!({"receiver_id": receiver, "content": content}))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let conversations: Vec<serde_json::Value> = server
        .get("/chat/conversations")
        .add_header(AUTHORIZATION, format!("Bearer {bob}"))
        .await
        .json();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0]["unread_count"], 3);
    assert_eq!(conversations[0]["last_message"]["content"], "how are you");

    let resp = server
        .get("/chat/history/1")
        .add_header(AUTHORIZATION, format!("Bearer {bob}"))
        .await;
    resp.assert_status_ok();
    let history: Vec<serde_json::Value> = resp.json();
    let contents: Vec<&str> = history.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["hi bob", "hi alice", "how are you"]);

    let conversations: Vec<serde_json::Value> = server
        .get("/chat/conversations")
        .add_header(AUTHORIZATION, format!("Bearer {bob}"))
        .await
        .json();
    assert_eq!(conversations[0]["unread_count"], 0);

    let alice_view: Vec<serde_json::Value> = server
        .get("/chat/conversations")
        .add_header(AUTHORIZATION, format!("Bearer {alice}"))
        .await
        .json();
    assert_eq!(alice_view.len(), 2);
}

#[tokio::test]
async fn chat_routes_require_a_token() {
    let (app, _state, _store) = common::test_app();
    let server = TestServer::new(app).unwrap();

    server
        .get("/chat/conversations")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/chat/message")
        .json(&json!({"receiver_id": 2, "content": "x"}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}
