//! SQLite-backed store: persistence across reopen and service runs

mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::tempdir;

use common::{call, doc, identity, services_with};
use kts_server::db::Database;
use kts_server::services::{album, PAGES};
use kts_workflow::{DocumentStore, Selector, Update};

#[tokio::test]
async fn test_documents_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kts.db");

    {
        let db = Database::open_at(path.clone()).unwrap();
        db.insert_one(PAGES, doc(json!({"_id": "p1", "nameslug": "trip", "photos": []})))
            .await
            .unwrap();
        db.find_one_and_update(
            PAGES,
            &Selector::by_id("p1"),
            &Update::new().push("photos", json!({"_id": "ph1"})),
        )
        .await
        .unwrap();
    }

    let db = Database::open_at(path).unwrap();
    let page = db
        .find_one(PAGES, &Selector::new().eq("nameslug", "trip"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(page["photos"], json!([{"_id": "ph1"}]));
}

#[tokio::test]
async fn test_pull_and_null_selectors() {
    let dir = tempdir().unwrap();
    let db = Database::open_at(dir.path().join("kts.db")).unwrap();

    db.insert_one(
        PAGES,
        doc(json!({"_id": "p1", "photos": [{"_id": "a"}, {"_id": "b"}, "legacy"]})),
    )
    .await
    .unwrap();
    db.insert_one(PAGES, doc(json!({"_id": "p2", "deleted_at": "2026-01-01"})))
        .await
        .unwrap();

    let updated = db
        .find_one_and_update(
            PAGES,
            &Selector::by_id("p1"),
            &Update::new().pull("photos", Selector::new().eq("_id", "a")),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["photos"], json!([{"_id": "b"}, "legacy"]));

    // A null operand matches documents without the field
    let live = db
        .find(PAGES, &Selector::new().eq("deleted_at", serde_json::Value::Null))
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0]["_id"], "p1");
}

#[tokio::test]
async fn test_album_service_over_sqlite() {
    let dir = tempdir().unwrap();
    let db = Arc::new(Database::open_at(dir.path().join("kts.db")).unwrap());
    db.insert_one(
        PAGES,
        doc(json!({"_id": "p1", "nameslug": "trip", "owner": "u1", "albums": []})),
    )
    .await
    .unwrap();

    let (services, logger) = services_with(db.clone());
    let request = kts_workflow::Request::new(json!({"name": "Trip", "photos": ["a.jpg"]}))
        .with_param("nameslug", "trip")
        .with_identity(identity("u1"));
    let (_, reply) = call(album::create_album, services, request).await;

    assert_eq!(
        reply.unwrap().body()["albums"],
        json!([{"name": "Trip", "cover": "a.jpg", "photos": ["a.jpg"]}])
    );
    let stored = db.find_one(PAGES, &Selector::by_id("p1")).await.unwrap().unwrap();
    assert_eq!(stored["albums"][0]["name"], "Trip");
    assert!(logger.entries().is_empty());
}
