//! Page photo upload and removal

use std::sync::Arc;

use serde_json::{json, Value};

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    Transition, Update, Workflow, WorkflowEngine, ID_FIELD,
};

use super::{collaborator_failed, require_identity, Services, PAGES, PAGE_NOT_FOUND};
use crate::security::new_token;

/// Fields copied from the uploaded file's metadata into a photo entry
const PHOTO_FIELDS: [&str; 5] = ["originalFilename", "filename", "name", "contentType", "size"];

/// Selects the page at `nameslug` if `owner` owns it
fn owned_page(nameslug: &str, owner: &str) -> Selector {
    Selector::new().eq("nameslug", nameslug).eq("owner", owner)
}

/// Target page plus the photo entry or photo id being changed
#[derive(Debug, Clone, Default)]
pub struct PhotoChange {
    pub nameslug: String,
    pub owner: String,
    pub photo: Value,
}

type PhotoFlow = Flow<PhotoChange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPhotoStep {
    Validate,
    Attach,
}

pub struct UploadPhoto {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

impl UploadPhoto {
    fn validate(&self, mut flow: PhotoFlow) -> Transition<UploadPhotoStep, PhotoChange> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };
        let Some(file) = flow
            .request()
            .field("file")
            .and_then(Value::as_object)
            .cloned()
        else {
            flow.set_field_error("file", "No file uploaded");
            return flow.respond();
        };

        let mut photo = serde_json::Map::new();
        photo.insert(ID_FIELD.to_string(), json!(new_token()));
        for field in PHOTO_FIELDS {
            photo.insert(field.to_string(), file.get(field).cloned().unwrap_or(Value::Null));
        }
        photo.insert("tags".to_string(), json!([]));

        flow.state = PhotoChange {
            nameslug: flow.request().param("nameslug").unwrap_or_default().to_string(),
            owner: identity.user_id,
            photo: Value::Object(photo),
        };
        flow.trigger(UploadPhotoStep::Attach)
    }

    async fn attach(&self, mut flow: PhotoFlow) -> Transition<UploadPhotoStep, PhotoChange> {
        let change = std::mem::take(&mut flow.state);
        let update = Update::new().push("photos", change.photo.clone());

        match self
            .store
            .find_one_and_update(PAGES, &owned_page(&change.nameslug, &change.owner), &update)
            .await
        {
            Ok(Some(_)) => {
                flow.set_result(change.photo);
                flow.respond()
            }
            Ok(None) => {
                flow.add_error(PAGE_NOT_FOUND);
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while saving photo",
                &e,
                "Cannot save photo",
            ),
        }
    }
}

#[async_trait]
impl Workflow for UploadPhoto {
    type Step = UploadPhotoStep;
    type State = PhotoChange;

    fn name(&self) -> &str {
        "upload_photo"
    }

    async fn step(
        &self,
        step: UploadPhotoStep,
        flow: PhotoFlow,
    ) -> Transition<UploadPhotoStep, PhotoChange> {
        match step {
            UploadPhotoStep::Validate => self.validate(flow),
            UploadPhotoStep::Attach => self.attach(flow).await,
        }
    }
}

/// `POST /pages/:nameslug/photos`; the uploaded file's metadata arrives as `file`
pub async fn upload_photo(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<UploadPhotoStep> {
    let workflow = UploadPhoto {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, PhotoChange::default(), responder)
        .with_logger(services.logger)
        .run(UploadPhotoStep::Validate)
        .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletePhotoStep {
    Validate,
    Detach,
}

pub struct DeletePhoto {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

impl DeletePhoto {
    fn validate(&self, mut flow: PhotoFlow) -> Transition<DeletePhotoStep, PhotoChange> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };
        let request = flow.request();
        let nameslug = request.param("nameslug").unwrap_or_default().to_string();
        let Some(photo_id) = request
            .param("photoid")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
        else {
            flow.add_error("Photo id required");
            return flow.respond();
        };

        flow.state = PhotoChange {
            nameslug,
            owner: identity.user_id,
            photo: Value::String(photo_id),
        };
        flow.trigger(DeletePhotoStep::Detach)
    }

    async fn detach(&self, mut flow: PhotoFlow) -> Transition<DeletePhotoStep, PhotoChange> {
        let change = std::mem::take(&mut flow.state);
        let update = Update::new().pull("photos", Selector::new().eq(ID_FIELD, change.photo));

        match self
            .store
            .find_one_and_update(PAGES, &owned_page(&change.nameslug, &change.owner), &update)
            .await
        {
            Ok(Some(mut page)) => {
                flow.set_result(page.remove("photos").unwrap_or_else(|| json!([])));
                flow.respond()
            }
            Ok(None) => {
                flow.add_error(PAGE_NOT_FOUND);
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while deleting photo",
                &e,
                "Cannot delete photo",
            ),
        }
    }
}

#[async_trait]
impl Workflow for DeletePhoto {
    type Step = DeletePhotoStep;
    type State = PhotoChange;

    fn name(&self) -> &str {
        "delete_photo"
    }

    async fn step(
        &self,
        step: DeletePhotoStep,
        flow: PhotoFlow,
    ) -> Transition<DeletePhotoStep, PhotoChange> {
        match step {
            DeletePhotoStep::Validate => self.validate(flow),
            DeletePhotoStep::Detach => self.detach(flow).await,
        }
    }
}

/// `DELETE /pages/:nameslug/photos/:photoid`; replies with the remaining photos
pub async fn delete_photo(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<DeletePhotoStep> {
    let workflow = DeletePhoto {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, PhotoChange::default(), responder)
        .with_logger(services.logger)
        .run(DeletePhotoStep::Validate)
        .await
}
