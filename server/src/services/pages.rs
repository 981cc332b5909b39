//! Pages: creation, listing and lookup

use std::sync::Arc;

use serde_json::{json, Value};

use kts_workflow::{
    async_trait, Completion, DocumentStore, Flow, Logger, Request, Responder, Selector,
    StoreError, Transition, Workflow, WorkflowEngine,
};

use super::{
    collaborator_failed, document, now, require_identity, Services, PAGES, PAGE_NOT_FOUND,
    REQUIRED,
};

/// URL-safe form of a page name: lowercase ASCII alphanumerics joined by `-`
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreatePageStep {
    Validate,
    CheckName,
    Create,
}

#[derive(Debug, Clone, Default)]
pub struct PageDraft {
    pub name: String,
    pub nameslug: String,
    pub address: String,
    pub description: Option<String>,
    pub owner: String,
}

pub struct CreatePage {
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

type PageFlow = Flow<PageDraft>;

impl CreatePage {
    fn validate(&self, mut flow: PageFlow) -> Transition<CreatePageStep, PageDraft> {
        let Some(identity) = require_identity(&mut flow) else {
            return flow.respond();
        };

        let request = flow.request();
        let name = request.str_field("name").map(|n| n.trim().to_string());
        let address = request.str_field("address").map(|a| a.trim().to_string());
        let description = request.str_field("description").map(str::to_string);

        let nameslug = name.as_deref().map(slugify).unwrap_or_default();
        match &name {
            None => flow.set_field_error("name", REQUIRED),
            Some(_) if nameslug.is_empty() => flow.set_field_error("name", "Invalid name"),
            Some(_) => {}
        }
        if address.is_none() {
            flow.set_field_error("address", REQUIRED);
        }
        if flow.has_errors() {
            return flow.respond();
        }

        flow.state = PageDraft {
            name: name.unwrap_or_default(),
            nameslug,
            address: address.unwrap_or_default(),
            description,
            owner: identity.user_id,
        };
        flow.trigger(CreatePageStep::CheckName)
    }

    async fn check_name(&self, mut flow: PageFlow) -> Transition<CreatePageStep, PageDraft> {
        let selector = Selector::new().eq("nameslug", flow.state.nameslug.as_str());
        match self.store.find_one(PAGES, &selector).await {
            Ok(Some(_)) => {
                flow.set_field_error("name", "Page name already taken");
                flow.respond()
            }
            Ok(None) => flow.trigger(CreatePageStep::Create),
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while checking page name",
                &e,
                "Cannot create page",
            ),
        }
    }

    async fn create(&self, mut flow: PageFlow) -> Transition<CreatePageStep, PageDraft> {
        let draft = std::mem::take(&mut flow.state);
        let page = document([
            ("name", json!(draft.name)),
            ("nameslug", json!(draft.nameslug)),
            ("address", json!(draft.address)),
            ("description", json!(draft.description)),
            ("owner", json!(draft.owner)),
            ("photos", json!([])),
            ("albums", json!([])),
            ("created_at", now()),
        ]);

        match self.store.insert_unique(PAGES, page, &["nameslug"]).await {
            Ok(page) => {
                flow.set_result(Value::Object(page));
                flow.respond()
            }
            Err(StoreError::Duplicate { .. }) => {
                flow.set_field_error("name", "Page name already taken");
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while creating page",
                &e,
                "Cannot create page",
            ),
        }
    }
}

#[async_trait]
impl Workflow for CreatePage {
    type Step = CreatePageStep;
    type State = PageDraft;

    fn name(&self) -> &str {
        "create_page"
    }

    async fn step(
        &self,
        step: CreatePageStep,
        flow: PageFlow,
    ) -> Transition<CreatePageStep, PageDraft> {
        match step {
            CreatePageStep::Validate => self.validate(flow),
            CreatePageStep::CheckName => self.check_name(flow).await,
            CreatePageStep::Create => self.create(flow).await,
        }
    }
}

/// `POST /pages` with `{ name, address, description? }`
pub async fn create_page(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<CreatePageStep> {
    let workflow = CreatePage {
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, PageDraft::default(), responder)
        .with_logger(services.logger)
        .run(CreatePageStep::Validate)
        .await
}

/// Which read a [`PageQuery`] serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageView {
    /// Pages owned by the caller
    Owned,
    /// One page by `nameslug`
    One,
    /// The `photos` array of one page
    Photos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageQueryStep {
    Load,
}

/// Single-step reads over the pages collection
pub struct PageQuery {
    view: PageView,
    store: Arc<dyn DocumentStore>,
    logger: Arc<dyn Logger>,
}

impl PageQuery {
    async fn load(&self, mut flow: Flow<()>) -> Transition<PageQueryStep, ()> {
        if self.view == PageView::Owned {
            let Some(identity) = require_identity(&mut flow) else {
                return flow.respond();
            };
            let selector = Selector::new().eq("owner", identity.user_id);
            return match self.store.find(PAGES, &selector).await {
                Ok(pages) => {
                    flow.set_result(Value::Array(pages.into_iter().map(Value::Object).collect()));
                    flow.respond()
                }
                Err(e) => collaborator_failed(
                    self.logger.as_ref(),
                    flow,
                    "Error while listing pages",
                    &e,
                    "Cannot list pages",
                ),
            };
        }

        let nameslug = flow.request().param("nameslug").unwrap_or_default().to_string();
        let selector = Selector::new().eq("nameslug", nameslug);
        match self.store.find_one(PAGES, &selector).await {
            Ok(Some(mut page)) => {
                let result = match self.view {
                    PageView::Photos => page.remove("photos").unwrap_or_else(|| json!([])),
                    _ => Value::Object(page),
                };
                flow.set_result(result);
                flow.respond()
            }
            Ok(None) => {
                flow.add_error(PAGE_NOT_FOUND);
                flow.respond()
            }
            Err(e) => collaborator_failed(
                self.logger.as_ref(),
                flow,
                "Error while loading page",
                &e,
                "Cannot load page",
            ),
        }
    }
}

#[async_trait]
impl Workflow for PageQuery {
    type Step = PageQueryStep;
    type State = ();

    fn name(&self) -> &str {
        match self.view {
            PageView::Owned => "list_pages",
            PageView::One => "find_page",
            PageView::Photos => "page_photos",
        }
    }

    async fn step(&self, step: PageQueryStep, flow: Flow<()>) -> Transition<PageQueryStep, ()> {
        match step {
            PageQueryStep::Load => self.load(flow).await,
        }
    }
}

async fn query(
    view: PageView,
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<PageQueryStep> {
    let workflow = PageQuery {
        view,
        store: services.store,
        logger: services.logger.clone(),
    };
    WorkflowEngine::new(workflow, request, (), responder)
        .with_logger(services.logger)
        .run(PageQueryStep::Load)
        .await
}

/// `GET /pages`
pub async fn list_pages(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<PageQueryStep> {
    query(PageView::Owned, services, request, responder).await
}

/// `GET /pages/:nameslug`
pub async fn find_page(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<PageQueryStep> {
    query(PageView::One, services, request, responder).await
}

/// `GET /pages/:nameslug/photos`
pub async fn page_photos(
    services: Services,
    request: Request,
    responder: Responder,
) -> Completion<PageQueryStep> {
    query(PageView::Photos, services, request, responder).await
}
