//! Shared helpers for service tests

#![allow(dead_code)]

use std::error::Error;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use kts_server::services::Services;
use kts_workflow::{
    response_channel, Completion, Document, DocumentStore, Identity, Logger, Reply, Request,
    Responder, Selector, StoreError, Update,
};

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("test documents are objects")
}

pub fn identity(user_id: &str) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        email: format!("{}@example.com", user_id),
        username: Some(user_id.to_string()),
        session: format!("session-{}", user_id),
    }
}

/// Run one service to completion and collect its reply
pub async fn call<S, F, Fut>(
    service: F,
    services: Services,
    request: Request,
) -> (Completion<S>, Option<Reply>)
where
    F: FnOnce(Services, Request, Responder) -> Fut,
    Fut: Future<Output = Completion<S>>,
{
    let (responder, reply) = response_channel();
    let completion = service(services, request, responder).await;
    (completion, reply.await.ok())
}

/// Logger that keeps every `(message, error)` pair
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

impl Logger for RecordingLogger {
    fn error(&self, message: &str, err: &(dyn Error + 'static)) {
        self.entries
            .lock()
            .unwrap()
            .push((message.to_string(), err.to_string()));
    }
}

/// A store call as the service issued it
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    FindOneAndUpdate {
        collection: String,
        selector: Selector,
        update: Update,
    },
    FindOne {
        collection: String,
        selector: Selector,
    },
    Find {
        collection: String,
        selector: Selector,
    },
    InsertOne {
        collection: String,
        document: Document,
        unique: Vec<String>,
    },
    DeleteMany {
        collection: String,
        selector: Selector,
    },
}

type UpdateScript = Box<dyn Fn() -> Result<Option<Document>, StoreError> + Send + Sync>;

/// Store that records calls and answers updates from a script.
///
/// Reads find nothing and inserts echo the document back.
pub struct ScriptedStore {
    calls: Mutex<Vec<Call>>,
    update: UpdateScript,
}

impl ScriptedStore {
    pub fn new(
        update: impl Fn() -> Result<Option<Document>, StoreError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            update: Box::new(update),
        }
    }

    /// Updates succeed and return `document`
    pub fn returning(document: Document) -> Self {
        Self::new(move || Ok(Some(document.clone())))
    }

    /// Updates fail with a backend error carrying `message`
    pub fn failing(message: &'static str) -> Self {
        Self::new(move || Err(StoreError::Backend(message.to_string())))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn find_one_and_update(
        &self,
        collection: &str,
        selector: &Selector,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        self.record(Call::FindOneAndUpdate {
            collection: collection.to_string(),
            selector: selector.clone(),
            update: update.clone(),
        });
        (self.update)()
    }

    async fn find_one(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Option<Document>, StoreError> {
        self.record(Call::FindOne {
            collection: collection.to_string(),
            selector: selector.clone(),
        });
        Ok(None)
    }

    async fn find(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<Vec<Document>, StoreError> {
        self.record(Call::Find {
            collection: collection.to_string(),
            selector: selector.clone(),
        });
        Ok(Vec::new())
    }

    async fn insert_unique(
        &self,
        collection: &str,
        document: Document,
        unique: &[&str],
    ) -> Result<Document, StoreError> {
        self.record(Call::InsertOne {
            collection: collection.to_string(),
            document: document.clone(),
            unique: unique.iter().map(|field| field.to_string()).collect(),
        });
        Ok(document)
    }

    async fn delete_many(
        &self,
        collection: &str,
        selector: &Selector,
    ) -> Result<usize, StoreError> {
        self.record(Call::DeleteMany {
            collection: collection.to_string(),
            selector: selector.clone(),
        });
        Ok(0)
    }
}

/// Services over `store` with a recording logger
pub fn services_with(store: Arc<dyn DocumentStore>) -> (Services, Arc<RecordingLogger>) {
    let logger = Arc::new(RecordingLogger::default());
    (Services::new(store, logger.clone()), logger)
}
