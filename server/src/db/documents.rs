//! `DocumentStore` over the SQLite `documents` table
//!
//! Bodies are stored as JSON text. Selector equalities on plain fields are
//! pushed into the query through `json_extract`, and every returned row is
//! matched again in process, in insertion order. Each call runs on the
//! blocking pool.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode, TransactionBehavior};
use serde_json::Value;
use uuid::Uuid;

use kts_workflow::{async_trait, Document, DocumentStore, Selector, StoreError, Update, ID_FIELD};

use super::Database;

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// A `UNIQUE (collection, id)` violation is a duplicate `_id`
fn insert_failed(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Duplicate {
            field: ID_FIELD.to_string(),
        },
        _ => backend(err),
    }
}

/// Field names that can be spliced into a `json_extract` path
fn is_plain_field(field: &str) -> bool {
    let mut chars = field.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `WHERE` clause narrowing `collection` to rows that can match `selector`.
///
/// The path is written as a literal so the expression indexes apply.
/// Arrays, objects and unusual field names are left to the in-process match.
fn where_clause(collection: &str, selector: &Selector) -> (String, Vec<SqlValue>) {
    let mut sql = String::from("collection = ?1");
    let mut params = vec![SqlValue::Text(collection.to_string())];

    for (field, value) in selector.fields() {
        if field == ID_FIELD {
            if let Value::String(id) = value {
                params.push(SqlValue::Text(id.clone()));
                sql.push_str(&format!(" AND id = ?{}", params.len()));
            }
            continue;
        }
        if !is_plain_field(field) {
            continue;
        }

        let extract = format!("json_extract(body, '$.{}')", field);
        let param = match value {
            Value::Null => {
                sql.push_str(&format!(" AND {} IS NULL", extract));
                continue;
            }
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::String(text) => SqlValue::Text(text.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None if n.is_f64() => match n.as_f64() {
                    Some(f) => SqlValue::Real(f),
                    None => continue,
                },
                None => continue,
            },
            Value::Array(_) | Value::Object(_) => continue,
        };
        params.push(param);
        sql.push_str(&format!(" AND {} = ?{}", extract, params.len()));
    }

    (sql, params)
}

/// Documents of `collection` matching `selector` with their row sequence
/// numbers, stopping after the first when `first_only`
fn select(
    conn: &Connection,
    collection: &str,
    selector: &Selector,
    first_only: bool,
) -> Result<Vec<(i64, Document)>, StoreError> {
    let (clause, params) = where_clause(collection, selector);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT seq, body FROM documents WHERE {} ORDER BY seq",
            clause
        ))
        .map_err(backend)?;
    let mut rows = stmt.query(params_from_iter(params)).map_err(backend)?;

    let mut documents = Vec::new();
    while let Some(row) = rows.next().map_err(backend)? {
        let seq: i64 = row.get(0).map_err(backend)?;
        let body: String = row.get(1).map_err(backend)?;
        let document: Document = serde_json::from_str(&body)?;
        if selector.matches(&document) {
            documents.push((seq, document));
            if first_only {
                break;
            }
        }
    }
    Ok(documents)
}

/// The `_id` of `document`, assigning a fresh one when missing
fn ensure_id(document: &mut Document) -> String {
    match document.get(ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            document.insert(ID_FIELD.to_string(), id.clone().into());
            id
        }
    }
}

impl Database {
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Backend("database mutex poisoned".to_string()))?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("database task failed: {}", e)))?
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: &Selector,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        let selector = selector.clone();
        let update = update.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(backend)?;
            let Some((seq, mut document)) = select(&tx, &collection, &selector, true)?.pop()
            else {
                return Ok(None);
            };

            update.apply(&mut document)?;
            tx.execute(
                "UPDATE documents SET body = ?1, updated_at = ?2 WHERE seq = ?3",
                (serde_json::to_string(&document)?, Utc::now().to_rfc3339(), seq),
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)?;

            Ok(Some(document))
        })
        .await
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        let selector = selector.clone();

        self.blocking(move |conn| {
            Ok(select(conn, &collection, &selector, true)?
                .pop()
                .map(|(_, document)| document))
        })
        .await
    }

    async fn find(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Vec<Document>, StoreError> {
        let collection = collection.to_string();
        let selector = selector.clone();

        self.blocking(move |conn| {
            Ok(select(conn, &collection, &selector, false)?
                .into_iter()
                .map(|(_, document)| document)
                .collect())
        })
        .await
    }

    async fn insert_unique(
        &self,
        collection: &str,
        mut document: Document,
        unique: &[&str],
    ) -> Result<Document, StoreError> {
        let collection = collection.to_string();
        let unique: Vec<String> = unique.iter().map(|field| field.to_string()).collect();

        self.blocking(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;

            for field in &unique {
                let Some(value) = document.get(field).filter(|v| !v.is_null()) else {
                    continue;
                };
                let taken = Selector::new().eq(field.as_str(), value.clone());
                if !select(&tx, &collection, &taken, true)?.is_empty() {
                    return Err(StoreError::Duplicate {
                        field: field.clone(),
                    });
                }
            }

            let id = ensure_id(&mut document);
            let now = Utc::now().to_rfc3339();
            tx.execute(
                r#"
                INSERT INTO documents (id, collection, body, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                (&id, &collection, serde_json::to_string(&document)?, &now, &now),
            )
            .map_err(insert_failed)?;
            tx.commit().map_err(backend)?;

            tracing::debug!(collection = %collection, id = %id, "document inserted");
            Ok(document)
        })
        .await
    }

    async fn delete_many(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        let selector = selector.clone();

        self.blocking(move |conn| {
            let tx = conn.transaction().map_err(backend)?;
            let matched = select(&tx, &collection, &selector, false)?;
            for (seq, _) in &matched {
                tx.execute("DELETE FROM documents WHERE seq = ?1", [seq])
                    .map_err(backend)?;
            }
            tx.commit().map_err(backend)?;

            tracing::debug!(collection = %collection, count = matched.len(), "documents deleted");
            Ok(matched.len())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn ids(db: &Database, selector: Selector) -> Vec<String> {
        db.find("sessions", &selector)
            .await
            .unwrap()
            .iter()
            .map(|d| d[ID_FIELD].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_insert_assigns_id() {
        let db = Database::open_in_memory().unwrap();
        let stored = db.insert_one("pages", doc(json!({"name": "a"}))).await.unwrap();

        let id = stored.get(ID_FIELD).and_then(|v| v.as_str()).unwrap().to_string();
        let found = db.find_one("pages", &Selector::by_id(id)).await.unwrap();
        assert_eq!(found, Some(stored));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_one("pages", doc(json!({"_id": "p1"}))).await.unwrap();

        let err = db
            .insert_one("pages", doc(json!({"_id": "p1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field } if field == "_id"));

        // Same id in another collection is fine
        db.insert_one("users", doc(json!({"_id": "p1"}))).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_of_missing_document_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        db.insert_one("pages", doc(json!({"_id": "p1", "n": 1}))).await.unwrap();

        let result = db
            .find_one_and_update("pages", &Selector::by_id("p2"), &Update::new().set("n", 2))
            .await
            .unwrap();
        assert!(result.is_none());

        let all = db.find("pages", &Selector::new()).await.unwrap();
        assert_eq!(all, vec![doc(json!({"_id": "p1", "n": 1}))]);
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.insert_one("pages", doc(json!({"_id": "p1", "photos": "oops"})))
            .await
            .unwrap();

        let update = Update::new().set("n", 1).push("photos", json!({"_id": "x"}));
        let err = db
            .find_one_and_update("pages", &Selector::by_id("p1"), &update)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAnArray { .. }));

        let page = db.find_one("pages", &Selector::by_id("p1")).await.unwrap().unwrap();
        assert!(page.get("n").is_none());
    }

    #[tokio::test]
    async fn test_unique_field_is_checked_in_the_insert() {
        let db = Database::open_in_memory().unwrap();
        db.insert_unique("pages", doc(json!({"nameslug": "beach"})), &["nameslug"])
            .await
            .unwrap();

        let err = db
            .insert_unique("pages", doc(json!({"nameslug": "beach"})), &["nameslug"])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field } if field == "nameslug"));

        // Uniqueness is per collection
        db.insert_unique("users", doc(json!({"nameslug": "beach"})), &["nameslug"])
            .await
            .unwrap();
        assert_eq!(db.find("pages", &Selector::new()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pushed_down_selectors_match_like_in_process() {
        let db = Database::open_in_memory().unwrap();
        let rows = [
            json!({"_id": "s1", "token": "t1", "active": true, "n": 1}),
            json!({"_id": "s2", "token": "t1", "active": false, "n": 1.5}),
            json!({"_id": "s3", "token": "t2", "active": true, "closed_at": null}),
            json!({"_id": "s4", "token": "t2", "active": 1, "tags": ["a"]}),
        ];
        for row in rows {
            db.insert_one("sessions", doc(row)).await.unwrap();
        }

        assert_eq!(ids(&db, Selector::new().eq("active", true)).await, ["s1", "s3"]);
        assert_eq!(ids(&db, Selector::new().eq("active", false)).await, ["s2"]);
        assert_eq!(ids(&db, Selector::new().eq("token", "t2")).await, ["s3", "s4"]);
        assert_eq!(ids(&db, Selector::new().eq("n", 1)).await, ["s1"]);
        assert_eq!(ids(&db, Selector::new().eq("n", 1.5)).await, ["s2"]);
        assert_eq!(
            ids(&db, Selector::new().eq("closed_at", Value::Null)).await,
            ["s1", "s2", "s3", "s4"]
        );
        assert_eq!(ids(&db, Selector::new().eq("tags", json!(["a"]))).await, ["s4"]);
        assert_eq!(ids(&db, Selector::by_id("s3").eq("token", "t2")).await, ["s3"]);
        assert!(ids(&db, Selector::by_id("s3").eq("token", "t1")).await.is_empty());
    }

    #[test]
    fn test_where_clause_skips_unusual_fields() {
        let selector = Selector::new()
            .eq("token", "t")
            .eq("a.b", "x")
            .eq("x')--", "y")
            .eq("tags", json!([]));
        let (sql, params) = where_clause("sessions", &selector);
        assert_eq!(sql, "collection = ?1 AND json_extract(body, '$.token') = ?2");
        assert_eq!(params.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let db = Database::open_in_memory().unwrap();
        for (id, active) in [("s1", true), ("s2", false), ("s3", false)] {
            let session = doc(json!({"_id": id, "user_id": "u1", "active": active}));
            db.insert_one("sessions", session).await.unwrap();
        }

        let closed = Selector::new().eq("user_id", "u1").eq("active", false);
        assert_eq!(db.delete_many("sessions", &closed).await.unwrap(), 2);

        let left = db.find("sessions", &Selector::new()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0][ID_FIELD], "s1");
    }
}
