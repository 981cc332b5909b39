//! Profile lookup and profile picture upload

use std::sync::Arc;

use serde_json::Value;

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    Transition, Update, Workflow, WorkflowEngine,
};

use super::{collaborator_failed, filter_user, now, require_identity, Services, USERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileStep {
    Load,
}

pub struct Profile {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

impl Profile {
    async fn load(&self, mut flow: Flow<()>) -> Transition<ProfileStep, ()> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };

        match self.store.find_one(USERS, &Selector::by_id(identity.user_id)).await {
            Ok(Some(user)) => {
                flow.set_result(filter_user(user));
                flow.respond()
            }
            Ok(None) => {
                flow.add_error("Account not found");
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while loading profile",
                &e,
                "Cannot load profile",
            ),
        }
    }
}

#[async_trait]
impl Workflow for Profile {
    type Step = ProfileStep;
    type State = ();

    fn name(&self) -> &str {
        "profile"
    }

    async fn step(&self, step: ProfileStep, flow: Flow<()>) -> Transition<ProfileStep, ()> {
        match step {
            ProfileStep::Load => self.load(flow).await,
        }
    }
}

/// `GET /profile`
pub async fn profile(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<ProfileStep> {
    let workflow = Profile {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, (), responder)
        .with_logger(services.logger)
        .run(ProfileStep::Load)
        .await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureStep {
    Validate,
    Save,
}

#[derive(Debug, Clone, Default)]
pub struct PictureUpload {
    pub user_id: String,
    pub file: Value,
}

pub struct UploadPicture {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

type PictureFlow = Flow<PictureUpload>;

impl UploadPicture {
    fn validate(&self, mut flow: PictureFlow) -> Transition<PictureStep, PictureUpload> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };
        let Some(file) = flow.request().field("file").filter(|f| f.is_object()).cloned() else {
            flow.set_field_error("file", "No file uploaded");
            return flow.respond();
        };

        flow.state = PictureUpload {
            user_id: identity.user_id,
            file,
        };
        flow.trigger(PictureStep::Save)
    }

    async fn save(&self, mut flow: PictureFlow) -> Transition<PictureStep, PictureUpload> {
        let upload = std::mem::take(&mut flow.state);
        let update = Update::new()
            .set("picture", upload.file)
            .set("updated_at", now());

        match self
            .store
            .find_one_and_update(USERS, &Selector::by_id(upload.user_id), &update)
            .await
        {
            Ok(Some(user)) => {
                flow.set_result(filter_user(user));
                flow.respond()
            }
            Ok(None) => {
                flow.add_error("Account not found");
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while saving profile picture",
                &e,
                "Cannot save profile picture",
            ),
        }
    }
}

#[async_trait]
impl Workflow for UploadPicture {
    type Step = PictureStep;
    type State = PictureUpload;

    fn name(&self) -> &str {
        "upload_profile_picture"
    }

    async fn step(
        &self,
        step: PictureStep,
        flow: PictureFlow,
    ) -> Transition<PictureStep, PictureUpload> {
        match step {
            PictureStep::Validate => self.validate(flow),
            PictureStep::Save => self.save(flow).await,
        }
    }
}

/// `POST /profile/picture`; the uploaded file's metadata arrives as `file`
pub async fn upload_picture(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<PictureStep> {
    let workflow = UploadPicture {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, PictureUpload::default(), responder)
        .with_logger(services.logger)
        .run(PictureStep::Validate)
        .await
}
