//! Album creation on a page

use std::sync::Arc;

use serde_json::{json, Value};

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    Transition, Update, Workflow, WorkflowEngine,
};

use super::{collaborator_failed, require_identity, Services, PAGES, PAGE_NOT_FOUND, REQUIRED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlbumStep {
    ValidateAlbum,
    CreateAlbum,
}

/// Validated album input
#[derive(Debug, Clone)]
pub struct AlbumDraft {
    pub name: String,
    pub photos: Vec<Value>,
    pub owner: String,
    pub nameslug: String,
}

pub struct CreateAlbum {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

type AlbumFlow = Flow<Option<AlbumDraft>>;

impl CreateAlbum {
    fn validate(&self, mut flow: AlbumFlow) -> Transition<AlbumStep, Option<AlbumDraft>> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };

        let request = flow.request();
        let name = request.str_field("name").map(str::to_string);
        let photos = request
            .field("photos")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let nameslug = request.param("nameslug").unwrap_or_default().to_string();

        if name.is_none() {
            flow.set_field_error("name", REQUIRED);
        }
        if photos.is_empty() {
            flow.add_error("Cannot create empty album");
        }
        let Some(name) = name.filter(|_| !flow.has_errors()) else {
            return flow.respond();
        };

        flow.state = Some(AlbumDraft {
            name,
            photos,
            owner: identity.user_id,
            nameslug,
        });
        flow.trigger(AlbumStep::CreateAlbum)
    }

    async fn create(&self, mut flow: AlbumFlow) -> Transition<AlbumStep, Option<AlbumDraft>> {
        let Some(draft) = flow.state.take() else {
            flow.fail("Cannot create album");
            return flow.respond();
        };

        let selector = Selector::new()
            .eq("nameslug", draft.nameslug.as_str())
            .eq("owner", draft.owner.as_str());
        let update = Update::new().push(
            "albums",
            json!({
                "name": draft.name,
                "cover": draft.photos[0],
                "photos": draft.photos,
            }),
        );

        match self.store.find_one_and_update(PAGES, &selector, &update).await {
            Ok(Some(page)) => {
                flow.set_result(Value::Object(page));
                flow.respond()
            }
            Ok(None) => {
                flow.add_error(PAGE_NOT_FOUND);
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while saving album",
                &e,
                "Cannot create album",
            ),
        }
    }
}

#[async_trait]
impl Workflow for CreateAlbum {
    type Step = AlbumStep;
    type State = Option<AlbumDraft>;

    fn name(&self) -> &str {
        "create_album"
    }

    async fn step(
        &self,
        step: AlbumStep,
        flow: AlbumFlow,
    ) -> Transition<AlbumStep, Option<AlbumDraft>> {
        match step {
            AlbumStep::ValidateAlbum => self.validate(flow),
            AlbumStep::CreateAlbum => self.create(flow).await,
        }
    }
}

/// `POST /pages/:nameslug/albums` with `{ name, photos: [...] }`
pub async fn create_album(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<AlbumStep> {
    let workflow = CreateAlbum {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, None, responder)
        .with_logger(services.logger)
        .run(AlbumStep::ValidateAlbum)
        .await
}
