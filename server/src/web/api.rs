//! REST API handlers
//!
//! Each handler turns the HTTP request into a [`Request`], runs the
//! matching service on its own task and renders whatever reply comes back
//! on the response channel.

use std::future::Future;

use axum::{
    extract::{
        multipart::{Multipart, MultipartError},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};

use kts_workflow::{
    response_channel, Completion, FailureKind, Reply, Request, Responder, StepId,
};

use super::auth::{CurrentUser, SignedIn};
use super::reply::{self, failure_response};
use super::state::AppState;
use crate::services::{activate, album, pages, photos, profile, register, signin, signout};
use crate::uploads::{page_folder, StoredFile, Uploads, PROFILE_FOLDER};

/// Multipart field carrying the uploaded file
const FILE_FIELD: &str = "file";

/// Run a service on its own task and wait for its reply.
///
/// `None` means the run ended without replying, so the channel was dropped.
pub async fn execute<S, F, Fut>(request: Request, service: F) -> Option<Reply>
where
    S: StepId,
    F: FnOnce(Request, Responder) -> Fut,
    Fut: Future<Output = Completion<S>> + Send + 'static,
{
    let (responder, reply) = response_channel();
    let run = tokio::spawn(service(request, responder));

    match reply.await {
        Ok(reply) => Some(reply),
        Err(_) => {
            match run.await {
                Ok(completion) => tracing::warn!(?completion, "service ended without a reply"),
                Err(e) => tracing::error!("service task failed: {}", e),
            }
            None
        }
    }
}

fn render(reply: Option<Reply>) -> Response {
    match reply {
        Some(reply) => reply::into_response(reply),
        None => reply::stalled(),
    }
}

async fn run<S, F, Fut>(request: Request, service: F) -> Response
where
    S: StepId,
    F: FnOnce(Request, Responder) -> Fut,
    Fut: Future<Output = Completion<S>> + Send + 'static,
{
    render(execute(request, service).await)
}

/// JSON body, or an empty object when absent or malformed
fn body_of(body: Option<Json<Value>>) -> Value {
    body.map(|Json(value)| value)
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn invalid_multipart(e: MultipartError) -> Response {
    tracing::warn!("Invalid multipart body: {}", e);
    failure_response(e.status(), FailureKind::Validation, e.body_text())
}

/// Read a multipart form: text fields become body fields and the first
/// non-empty `file` part is written to `folder`. A stored file is removed
/// again when the rest of the form cannot be read.
async fn read_upload(
    uploads: &Uploads,
    folder: &str,
    multipart: Multipart,
) -> Result<(Map<String, Value>, Option<StoredFile>), Response> {
    let mut stored = None;
    match read_fields(uploads, folder, multipart, &mut stored).await {
        Ok(fields) => Ok((fields, stored)),
        Err(response) => {
            if let Some(file) = &stored {
                uploads.discard(file).await;
            }
            Err(response)
        }
    }
}

async fn read_fields(
    uploads: &Uploads,
    folder: &str,
    mut multipart: Multipart,
    stored: &mut Option<StoredFile>,
) -> Result<Map<String, Value>, Response> {
    let mut fields = Map::new();

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        if name != FILE_FIELD {
            let text = field.text().await.map_err(invalid_multipart)?;
            fields.insert(name, Value::String(text));
            continue;
        }
        if stored.is_some() {
            continue;
        }

        let original = field.file_name().unwrap_or(FILE_FIELD).to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(invalid_multipart)?;
        if bytes.is_empty() {
            continue;
        }

        let file = uploads
            .save(folder, &original, content_type.as_deref(), &bytes)
            .await
            .map_err(|e| {
                tracing::error!("Failed to store upload: {}", e);
                failure_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    FailureKind::Operation,
                    "Cannot store upload",
                )
            })?;
        *stored = Some(file);
    }

    Ok(fields)
}

/// Run an upload service; the stored file is removed unless it succeeds
async fn run_upload<S, F, Fut>(
    uploads: &Uploads,
    mut fields: Map<String, Value>,
    stored: Option<StoredFile>,
    request: impl FnOnce(Value) -> Request,
    service: F,
) -> Response
where
    S: StepId,
    F: FnOnce(Request, Responder) -> Fut,
    Fut: Future<Output = Completion<S>> + Send + 'static,
{
    if let Some(file) = &stored {
        fields.insert(FILE_FIELD.to_string(), file.to_json());
    }

    let reply = execute(request(Value::Object(fields)), service).await;
    if let Some(file) = &stored {
        if !matches!(reply, Some(Reply::Success(_))) {
            uploads.discard(file).await;
        }
    }
    render(reply)
}

// ============================================================================
// Accounts
// ============================================================================

pub async fn register(State(state): State<AppState>, body: Option<Json<Value>>) -> Response {
    let services = state.services.clone();
    run(Request::new(body_of(body)), move |req, resp| {
        register::register(services, req, resp)
    })
    .await
}

pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let services = state.services.clone();
    let request = Request::new(body_of(body)).with_param("token", token);
    run(request, move |req, resp| activate::activate(services, req, resp)).await
}

pub async fn login(State(state): State<AppState>, body: Option<Json<Value>>) -> Response {
    let services = state.services.clone();
    run(Request::new(body_of(body)), move |req, resp| {
        signin::signin(services, req, resp)
    })
    .await
}

pub async fn logout(State(state): State<AppState>, SignedIn(identity): SignedIn) -> Response {
    let services = state.services.clone();
    let request = Request::default().with_identity(identity);
    run(request, move |req, resp| signout::signout(services, req, resp)).await
}

pub async fn get_profile(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
) -> Response {
    let services = state.services.clone();
    let request = Request::default().with_identity(identity);
    run(request, move |req, resp| profile::profile(services, req, resp)).await
}

pub async fn upload_profile_picture(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
    multipart: Multipart,
) -> Response {
    let (fields, stored) = match read_upload(&state.uploads, PROFILE_FOLDER, multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let services = state.services.clone();
    run_upload(
        &state.uploads,
        fields,
        stored,
        |body| Request::new(body).with_identity(identity),
        move |req, resp| profile::upload_picture(services, req, resp),
    )
    .await
}

// ============================================================================
// Pages
// ============================================================================

pub async fn create_page(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
    body: Option<Json<Value>>,
) -> Response {
    let services = state.services.clone();
    let request = Request::new(body_of(body)).with_identity(identity);
    run(request, move |req, resp| pages::create_page(services, req, resp)).await
}

pub async fn list_pages(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
) -> Response {
    let services = state.services.clone();
    let request = Request::default().with_identity(identity);
    run(request, move |req, resp| pages::list_pages(services, req, resp)).await
}

/// Public page lookup
pub async fn find_page(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    Path(nameslug): Path<String>,
) -> Response {
    let services = state.services.clone();
    let request = Request {
        identity,
        ..Request::default().with_param("nameslug", nameslug)
    };
    run(request, move |req, resp| pages::find_page(services, req, resp)).await
}

pub async fn page_photos(
    State(state): State<AppState>,
    Path(nameslug): Path<String>,
) -> Response {
    let services = state.services.clone();
    let request = Request::default().with_param("nameslug", nameslug);
    run(request, move |req, resp| pages::page_photos(services, req, resp)).await
}

pub async fn upload_page_photo(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
    Path(nameslug): Path<String>,
    multipart: Multipart,
) -> Response {
    let folder = page_folder(&nameslug);
    let (fields, stored) = match read_upload(&state.uploads, &folder, multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let services = state.services.clone();
    run_upload(
        &state.uploads,
        fields,
        stored,
        |body| {
            Request::new(body)
                .with_param("nameslug", nameslug)
                .with_identity(identity)
        },
        move |req, resp| photos::upload_photo(services, req, resp),
    )
    .await
}

pub async fn delete_page_photo(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
    Path((nameslug, photo_id)): Path<(String, String)>,
) -> Response {
    let services = state.services.clone();
    let request = Request::default()
        .with_param("nameslug", nameslug)
        .with_param("photoid", photo_id)
        .with_identity(identity);
    run(request, move |req, resp| photos::delete_photo(services, req, resp)).await
}

pub async fn create_album(
    State(state): State<AppState>,
    SignedIn(identity): SignedIn,
    Path(nameslug): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    let services = state.services.clone();
    let request = Request::new(body_of(body))
        .with_param("nameslug", nameslug)
        .with_identity(identity);
    run(request, move |req, resp| album::create_album(services, req, resp)).await
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub project: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        project: state.project_name.clone(),
    })
}
