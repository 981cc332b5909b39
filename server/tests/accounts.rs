//! Account lifecycle over the in-memory store:
//! register, activate, sign in, load profile, sign out

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::{call, services_with};
use kts_server::db::MemoryStore;
use kts_server::services::{
    activate, profile, register, signin, signout, Services, SESSIONS, USERS,
};
use kts_server::web::auth::resolve_session;
use kts_workflow::{DocumentStore, FailureKind, Reply, ReplyKind, Request, Selector};

async fn activation_token(store: &MemoryStore, email: &str) -> Option<String> {
    store
        .find_one(USERS, &Selector::new().eq("email", email))
        .await
        .unwrap()
        .and_then(|user| {
            user.get("activation_token")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

async fn reply_of<S, F, Fut>(service: F, services: &Services, request: Request) -> Reply
where
    F: FnOnce(Services, Request, kts_workflow::Responder) -> Fut,
    Fut: std::future::Future<Output = kts_workflow::Completion<S>>,
{
    call(service, services.clone(), request).await.1.unwrap()
}

#[tokio::test]
async fn test_account_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let (services, logger) = services_with(store.clone());

    // Register
    let reply = reply_of(
        register::register,
        &services,
        Request::new(json!({"email": " Ann@Example.com ", "phone": "555-0100"})),
    )
    .await;
    assert_eq!(reply.kind(), ReplyKind::Success);
    let user = reply.body();
    assert_eq!(user["email"], "ann@example.com");
    assert_eq!(user["activated"], false);
    assert!(user.get("activation_token").is_none());

    let duplicate = reply_of(
        register::register,
        &services,
        Request::new(json!({"email": "ann@example.com", "phone": "555-0101"})),
    )
    .await;
    assert_eq!(duplicate.body()["errfor"]["email"], "Email already registered");

    // Inactive accounts cannot sign in
    let early = reply_of(
        signin::signin,
        &services,
        Request::new(json!({"email": "ann@example.com", "passw": "secret1"})),
    )
    .await;
    assert_eq!(early.body()["errors"], json!([signin::INVALID_CREDENTIALS]));

    // Activate
    let token = activation_token(&store, "ann@example.com").await.unwrap();
    let credentials = json!({"username": "ann", "password": "secret1", "confirm": "secret1"});

    let wrong = reply_of(
        activate::activate,
        &services,
        Request::new(credentials.clone()).with_param("token", "not-a-token"),
    )
    .await;
    assert_eq!(
        wrong.body()["errors"],
        json!(["Invalid or expired activation token"])
    );

    let activated = reply_of(
        activate::activate,
        &services,
        Request::new(credentials.clone()).with_param("token", token.as_str()),
    )
    .await
    .body();
    assert_eq!(activated["username"], "ann");
    assert_eq!(activated["activated"], true);
    assert!(activated.get("password_hash").is_none());
    assert!(activated.get("salt").is_none());
    assert!(activation_token(&store, "ann@example.com").await.is_none());

    let reused = reply_of(
        activate::activate,
        &services,
        Request::new(credentials).with_param("token", token.as_str()),
    )
    .await;
    assert_eq!(reused.kind(), ReplyKind::Failure(FailureKind::Validation));

    // Sign in
    let bad_password = reply_of(
        signin::signin,
        &services,
        Request::new(json!({"email": "ann@example.com", "passw": "secret2"})),
    )
    .await;
    assert_eq!(bad_password.body()["errors"], json!([signin::INVALID_CREDENTIALS]));

    let session = reply_of(
        signin::signin,
        &services,
        Request::new(json!({"email": "ANN@example.com", "passw": "secret1"})),
    )
    .await
    .body();
    let session_token = session["token"].as_str().unwrap().to_string();
    assert_eq!(session["user"]["username"], "ann");
    assert!(session["user"].get("password_hash").is_none());

    // Profile through the resolved session
    let identity = resolve_session(&*store, &session_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(identity.email, "ann@example.com");
    assert_eq!(identity.username.as_deref(), Some("ann"));

    let me = reply_of(
        profile::profile,
        &services,
        Request::default().with_identity(identity.clone()),
    )
    .await
    .body();
    assert_eq!(me["_id"], session["user"]["_id"]);

    // Sign out closes the session
    let out = reply_of(
        signout::signout,
        &services,
        Request::default().with_identity(identity),
    )
    .await;
    assert_eq!(out.body(), json!({"signedOut": true}));
    assert!(resolve_session(&*store, &session_token)
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.count(SESSIONS).await, 0);

    assert!(logger.entries().is_empty());
}

#[tokio::test]
async fn test_register_validation() {
    let (services, _) = services_with(Arc::new(MemoryStore::new()));

    let reply = reply_of(register::register, &services, Request::new(json!({}))).await;
    assert_eq!(
        reply.body(),
        json!({"errfor": {"email": "Required", "phone": "Required"}, "errors": []})
    );

    let reply = reply_of(
        register::register,
        &services,
        Request::new(json!({"email": "nope", "phone": "1"})),
    )
    .await;
    assert_eq!(reply.body()["errfor"], json!({"email": "Invalid email"}));
}

#[tokio::test]
async fn test_profile_picture_is_saved() {
    let store = Arc::new(MemoryStore::new());
    let (services, _) = services_with(store.clone());

    let user = store
        .insert_one(USERS, common::doc(json!({"_id": "u1", "email": "u1@example.com"})))
        .await
        .unwrap();
    assert_eq!(user["_id"], "u1");

    let missing = reply_of(
        profile::upload_picture,
        &services,
        Request::new(json!({})).with_identity(common::identity("u1")),
    )
    .await;
    assert_eq!(missing.body()["errfor"], json!({"file": "No file uploaded"}));

    let file = json!({
        "originalFilename": "me.png",
        "filename": "abc.png",
        "name": "/static/profile_img/abc.png",
        "contentType": "image/png",
        "size": 3
    });
    let saved = reply_of(
        profile::upload_picture,
        &services,
        Request::new(json!({"file": file.clone()})).with_identity(common::identity("u1")),
    )
    .await
    .body();
    assert_eq!(saved["picture"], file);
}

#[tokio::test]
async fn test_protected_services_require_identity() {
    let (services, _) = services_with(Arc::new(MemoryStore::new()));

    for reply in [
        reply_of(profile::profile, &services, Request::default()).await,
        reply_of(signout::signout, &services, Request::default()).await,
    ] {
        assert_eq!(reply.body(), json!({"errfor": {}, "errors": ["Not signed in"]}));
    }
}

#[tokio::test]
async fn test_concurrent_registrations_store_one_account() {
    let store = Arc::new(MemoryStore::new());
    let (services, _) = services_with(store.clone());
    let request = || Request::new(json!({"email": "a@b.co", "phone": "555-0100"}));

    let (first, second) = tokio::join!(
        reply_of(register::register, &services, request()),
        reply_of(register::register, &services, request()),
    );

    let kinds = [first.kind(), second.kind()];
    assert_eq!(kinds.iter().filter(|k| **k == ReplyKind::Success).count(), 1);
    let loser = if first.kind() == ReplyKind::Success { second } else { first };
    assert_eq!(loser.body()["errfor"]["email"], "Email already registered");
    assert_eq!(store.count(USERS).await, 1);
}

#[tokio::test]
async fn test_signout_prunes_only_closed_sessions_of_the_caller() {
    let store = Arc::new(MemoryStore::new());
    let (services, _) = services_with(store.clone());
    for (token, user_id, active) in [
        ("session-u1", "u1", true),
        ("other-device", "u1", true),
        ("old", "u1", false),
        ("someone-else", "u2", false),
    ] {
        let session = json!({"token": token, "user_id": user_id, "active": active});
        store.insert_one(SESSIONS, common::doc(session)).await.unwrap();
    }

    let out = reply_of(
        signout::signout,
        &services,
        Request::default().with_identity(common::identity("u1")),
    )
    .await;
    assert_eq!(out.body(), json!({"signedOut": true}));

    let left: Vec<Value> = store
        .find(SESSIONS, &Selector::new())
        .await
        .unwrap()
        .into_iter()
        .map(|session| session["token"].clone())
        .collect();
    assert_eq!(left, vec![json!("other-device"), json!("someone-else")]);
}
