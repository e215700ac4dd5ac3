//! Generic CRUD dispatcher
//!
//! Every operation goes through the same steps, each with its own way out:
//!
//! 1. resolve the resource by name (404)
//! 2. evaluate the security rule (403, before any store access)
//! 3. check the resource exposes the capability (405)
//! 4. report input the transport could not decode (400)
//! 5. parse the identifier, for single-record operations (400)
//! 6. call the store
//!
//! [`Dispatcher::dispatch`] never fails: failures come back as a
//! [`DispatchResponse`] carrying a localized [`ProblemDetail`].

use crate::core::auth::{AuthContext, RequestContext, SecurityEvaluator};
use crate::core::capability::Capability;
use crate::core::error::{DispatchError, StoreError};
use crate::core::identifier::IdentifierValue;
use crate::core::problem::{APPLICATION_PROBLEM_JSON, ProblemDetail, ProblemMapper};
use crate::core::query::{ListResponse, PaginationMeta, QueryParams};
use crate::server::registry::{Registry, ResourceDescriptor};
use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Terminal state of one dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Denied,
    StoreFailed,
    NotFound,
    BadInput,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Denied => "denied",
            Outcome::StoreFailed => "store_failed",
            Outcome::NotFound => "not_found",
            Outcome::BadInput => "bad_input",
        })
    }
}

impl DispatchError {
    /// Terminal state this error puts the request in
    pub fn outcome(&self) -> Outcome {
        match self {
            DispatchError::ResourceNotFound { .. } | DispatchError::RecordNotFound { .. } => {
                Outcome::NotFound
            }
            DispatchError::BadIdentifier(_)
            | DispatchError::InvalidBody { .. }
            | DispatchError::InvalidRequest { .. }
            | DispatchError::CapabilityNotSupported { .. } => Outcome::BadInput,
            DispatchError::Forbidden { .. } => Outcome::Denied,
            DispatchError::Store { .. } => Outcome::StoreFailed,
        }
    }
}

/// Request input the transport could not decode
///
/// Carried on the request instead of being answered by the transport, so it
/// is only reported once the resource is known and the caller authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRejection {
    Query(String),
    Body(String),
}

/// An inbound operation, independent of the transport it arrived on
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub resource: String,
    pub capability: Capability,
    /// Raw identifier path segment
    pub id: Option<String>,
    pub body: Option<Value>,
    pub query: QueryParams,
    pub principal: AuthContext,
    pub metadata: HashMap<String, String>,
    /// Locale for problem messages; the dispatcher's default if `None`
    pub locale: Option<String>,
    pub rejection: Option<InputRejection>,
}

impl DispatchRequest {
    pub fn new(resource: &str, capability: Capability) -> Self {
        Self {
            resource: resource.to_string(),
            capability,
            id: None,
            body: None,
            query: QueryParams::default(),
            principal: AuthContext::Anonymous,
            metadata: HashMap::new(),
            locale: None,
            rejection: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn with_principal(mut self, principal: AuthContext) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = Some(locale.to_string());
        self
    }

    pub fn with_rejection(mut self, rejection: InputRejection) -> Self {
        self.rejection = Some(rejection);
        self
    }
}

/// Payload of a [`DispatchResponse`]
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchBody {
    Empty,
    Json(Value),
    Problem(ProblemDetail),
}

/// Status, payload and terminal state of a dispatched request
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    pub status: StatusCode,
    pub body: DispatchBody,
    pub outcome: Outcome,
}

impl DispatchResponse {
    /// The body as JSON (problems serialize to `{code, title, detail, status}`)
    pub fn json(&self) -> Value {
        match &self.body {
            DispatchBody::Empty => Value::Null,
            DispatchBody::Json(value) => value.clone(),
            DispatchBody::Problem(problem) => {
                serde_json::to_value(problem).unwrap_or(Value::Null)
            }
        }
    }

    pub fn problem(&self) -> Option<&ProblemDetail> {
        match &self.body {
            DispatchBody::Problem(problem) => Some(problem),
            _ => None,
        }
    }
}

impl IntoResponse for DispatchResponse {
    fn into_response(self) -> Response {
        match self.body {
            DispatchBody::Empty => self.status.into_response(),
            DispatchBody::Json(value) => (self.status, Json(value)).into_response(),
            DispatchBody::Problem(problem) => (
                self.status,
                [(header::CONTENT_TYPE, APPLICATION_PROBLEM_JSON)],
                Json(problem),
            )
                .into_response(),
        }
    }
}

/// Successful result of one operation
enum Success {
    Json(StatusCode, Value),
    NoContent,
}

/// Routes operations to resource stores
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    evaluator: SecurityEvaluator,
    problems: ProblemMapper,
    default_locale: String,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, evaluator: SecurityEvaluator, problems: ProblemMapper) -> Self {
        Self {
            registry,
            evaluator,
            problems,
            default_locale: "en".to_string(),
        }
    }

    pub fn with_default_locale(mut self, locale: &str) -> Self {
        self.default_locale = locale.to_string();
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn problems(&self) -> &ProblemMapper {
        &self.problems
    }

    /// Run one request to completion, mapping any failure to a problem
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchResponse {
        tracing::debug!(
            resource = %request.resource,
            capability = %request.capability,
            "Dispatching request"
        );

        match self.execute(&request).await {
            Ok(Success::Json(status, value)) => {
                tracing::debug!(
                    resource = %request.resource,
                    capability = %request.capability,
                    outcome = %Outcome::Succeeded,
                    "Request completed"
                );
                DispatchResponse {
                    status,
                    body: DispatchBody::Json(value),
                    outcome: Outcome::Succeeded,
                }
            }
            Ok(Success::NoContent) => DispatchResponse {
                status: StatusCode::NO_CONTENT,
                body: DispatchBody::Empty,
                outcome: Outcome::Succeeded,
            },
            Err(error) => {
                let outcome = error.outcome();
                match outcome {
                    Outcome::StoreFailed => tracing::error!(
                        resource = %request.resource,
                        capability = %request.capability,
                        error = %error,
                        "Store operation failed"
                    ),
                    // Denials are logged where the rule is evaluated
                    Outcome::Denied => {}
                    _ => tracing::debug!(
                        resource = %request.resource,
                        capability = %request.capability,
                        outcome = %outcome,
                        error = %error,
                        "Request rejected"
                    ),
                }

                let locale = request.locale.as_deref().unwrap_or(&self.default_locale);
                let problem = self.problems.to_problem(&error, locale);
                DispatchResponse {
                    status: problem.status_code(),
                    body: DispatchBody::Problem(problem),
                    outcome,
                }
            }
        }
    }

    /// List the records of a resource
    pub async fn list(
        &self,
        resource: &str,
        query: QueryParams,
        principal: &AuthContext,
    ) -> Result<ListResponse, DispatchError> {
        let request = DispatchRequest::new(resource, Capability::List)
            .with_query(query)
            .with_principal(principal.clone());
        let value = self.execute_json(&request).await?;
        serde_json::from_value(value).map_err(|e| DispatchError::Store {
            resource: resource.to_string(),
            source: StoreError::Serialization(e),
        })
    }

    /// Fetch one record
    pub async fn get_one(
        &self,
        resource: &str,
        raw_id: &str,
        principal: &AuthContext,
    ) -> Result<Value, DispatchError> {
        let request = DispatchRequest::new(resource, Capability::GetOne)
            .with_id(raw_id)
            .with_principal(principal.clone());
        self.execute_json(&request).await
    }

    /// Store a new record
    pub async fn create(
        &self,
        resource: &str,
        body: Value,
        principal: &AuthContext,
    ) -> Result<Value, DispatchError> {
        let request = DispatchRequest::new(resource, Capability::Create)
            .with_body(body)
            .with_principal(principal.clone());
        self.execute_json(&request).await
    }

    /// Merge fields onto an existing record
    pub async fn update(
        &self,
        resource: &str,
        raw_id: &str,
        body: Value,
        principal: &AuthContext,
    ) -> Result<Value, DispatchError> {
        let request = DispatchRequest::new(resource, Capability::Update)
            .with_id(raw_id)
            .with_body(body)
            .with_principal(principal.clone());
        self.execute_json(&request).await
    }

    /// Remove a record
    pub async fn delete(
        &self,
        resource: &str,
        raw_id: &str,
        principal: &AuthContext,
    ) -> Result<(), DispatchError> {
        let request = DispatchRequest::new(resource, Capability::Delete)
            .with_id(raw_id)
            .with_principal(principal.clone());
        self.execute(&request).await.map(|_| ())
    }

    async fn execute_json(&self, request: &DispatchRequest) -> Result<Value, DispatchError> {
        match self.execute(request).await? {
            Success::Json(_, value) => Ok(value),
            Success::NoContent => Ok(Value::Null),
        }
    }

    async fn execute(&self, request: &DispatchRequest) -> Result<Success, DispatchError> {
        let descriptor = self.registry.get(&request.resource).ok_or_else(|| {
            DispatchError::ResourceNotFound {
                resource: request.resource.clone(),
            }
        })?;
        let capability = request.capability;

        self.authorize(descriptor, request)?;

        if !descriptor.supports(capability) {
            return Err(DispatchError::CapabilityNotSupported {
                resource: descriptor.name().to_string(),
                capability,
            });
        }

        if let Some(rejection) = &request.rejection {
            return Err(match rejection {
                InputRejection::Query(message) => DispatchError::InvalidRequest {
                    message: message.clone(),
                },
                InputRejection::Body(message) => DispatchError::InvalidBody {
                    resource: descriptor.name().to_string(),
                    message: message.clone(),
                },
            });
        }

        let id = if capability.takes_identifier() {
            let raw = request.id.as_deref().unwrap_or_default();
            Some(descriptor.identifier().parse(raw)?)
        } else {
            None
        };

        match (capability, id) {
            (Capability::List, _) => self.list_records(descriptor, &request.query).await,
            (Capability::Create, _) => {
                let body = object_body(descriptor, request.body.as_ref())?;
                let created = descriptor
                    .store()
                    .create(Value::Object(body))
                    .await
                    .map_err(|e| store_error(descriptor, e))?;
                Ok(Success::Json(StatusCode::CREATED, created))
            }
            (Capability::GetOne, Some(id)) => {
                let record = descriptor
                    .store()
                    .find(&id)
                    .await
                    .map_err(|e| store_error(descriptor, e))?
                    .ok_or_else(|| not_found(descriptor, &id))?;
                Ok(Success::Json(StatusCode::OK, record))
            }
            (Capability::Update, Some(id)) => self.update_record(descriptor, &id, request).await,
            (Capability::Delete, Some(id)) => {
                let deleted = descriptor
                    .store()
                    .delete(&id)
                    .await
                    .map_err(|e| store_error(descriptor, e))?;
                if !deleted {
                    return Err(not_found(descriptor, &id));
                }
                Ok(Success::NoContent)
            }
            (_, None) => Err(DispatchError::InvalidBody {
                resource: descriptor.name().to_string(),
                message: format!("{} requires an identifier", capability),
            }),
        }
    }

    fn authorize(
        &self,
        descriptor: &ResourceDescriptor,
        request: &DispatchRequest,
    ) -> Result<(), DispatchError> {
        let context = RequestContext::new(
            request.principal.clone(),
            descriptor.name(),
            request.capability,
        )
        .with_metadata(request.metadata.clone());

        let decision = self.evaluator.evaluate(descriptor.security(), &context);
        if decision.allowed {
            return Ok(());
        }

        tracing::warn!(
            resource = %descriptor.name(),
            capability = %request.capability,
            rule = %decision.rule,
            tier = %decision.tier,
            "Access denied"
        );

        Err(DispatchError::Forbidden {
            resource: descriptor.name().to_string(),
            capability: request.capability,
            rule: decision.rule,
        })
    }

    async fn list_records(
        &self,
        descriptor: &ResourceDescriptor,
        query: &QueryParams,
    ) -> Result<Success, DispatchError> {
        let response = if descriptor.paged() {
            let page = descriptor
                .store()
                .list_page(query.page_request())
                .await
                .map_err(|e| store_error(descriptor, e))?;
            ListResponse {
                data: page.items,
                pagination: Some(PaginationMeta::new(query.page(), query.limit(), page.total)),
            }
        } else {
            let data = descriptor
                .store()
                .list()
                .await
                .map_err(|e| store_error(descriptor, e))?;
            ListResponse {
                data,
                pagination: None,
            }
        };

        let value = serde_json::to_value(response).map_err(|e| DispatchError::Store {
            resource: descriptor.name().to_string(),
            source: StoreError::Serialization(e),
        })?;
        Ok(Success::Json(StatusCode::OK, value))
    }

    async fn update_record(
        &self,
        descriptor: &ResourceDescriptor,
        id: &IdentifierValue,
        request: &DispatchRequest,
    ) -> Result<Success, DispatchError> {
        let changes = object_body(descriptor, request.body.as_ref())?;
        let store = descriptor.store();

        let existing = store
            .find(id)
            .await
            .map_err(|e| store_error(descriptor, e))?
            .ok_or_else(|| not_found(descriptor, id))?;

        let mut merged = match existing {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        merged.extend(changes);
        merged.insert(descriptor.id_field().to_string(), id.to_json());

        let updated = store
            .update(id, Value::Object(merged))
            .await
            .map_err(|e| store_error(descriptor, e))?
            .ok_or_else(|| not_found(descriptor, id))?;

        Ok(Success::Json(StatusCode::OK, updated))
    }
}

fn object_body(
    descriptor: &ResourceDescriptor,
    body: Option<&Value>,
) -> Result<Map<String, Value>, DispatchError> {
    match body {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(DispatchError::InvalidBody {
            resource: descriptor.name().to_string(),
            message: "expected a JSON object".to_string(),
        }),
        None => Err(DispatchError::InvalidBody {
            resource: descriptor.name().to_string(),
            message: "request body is missing".to_string(),
        }),
    }
}

fn not_found(descriptor: &ResourceDescriptor, id: &IdentifierValue) -> DispatchError {
    DispatchError::RecordNotFound {
        resource: descriptor.name().to_string(),
        id: id.format(),
    }
}

/// Give recognizable store conditions their client-facing meaning
fn store_error(descriptor: &ResourceDescriptor, error: StoreError) -> DispatchError {
    let resource = descriptor.name().to_string();
    match error {
        StoreError::NotFound { id } => DispatchError::RecordNotFound { resource, id },
        StoreError::InvalidRecord { message } => DispatchError::InvalidBody { resource, message },
        StoreError::Unsupported(capability) => {
            DispatchError::CapabilityNotSupported { resource, capability }
        }
        source => DispatchError::Store { resource, source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::auth::{SecurityRule, DENY_ALL};
    use crate::core::record::Record;
    use crate::discovery::{Component, Discovery, ExposeMarker, Modifier};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Note {
        #[serde(default)]
        id: i64,
        title: String,
        #[serde(default)]
        content: String,
    }

    impl Record for Note {
        type Id = i64;
    }

    fn dispatcher(component: Component) -> Dispatcher {
        let registry = Discovery::new(EngineConfig::default())
            .discover(&[component])
            .unwrap();
        Dispatcher::new(
            Arc::new(registry),
            SecurityEvaluator::new(SecurityRule::parse(DENY_ALL).unwrap()),
            ProblemMapper::default(),
        )
    }

    fn public_notes() -> Dispatcher {
        dispatcher(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("permit_all")))
    }

    #[tokio::test]
    async fn test_update_merges_and_pins_identifier() {
        let d = public_notes();
        let anon = AuthContext::Anonymous;
        d.create("note", json!({"title": "a", "content": "keep"}), &anon)
            .await
            .unwrap();

        let updated = d
            .update("note", "1", json!({"id": 7, "title": "b"}), &anon)
            .await
            .unwrap();
        assert_eq!(updated["id"], 1);
        assert_eq!(updated["title"], "b");
        assert_eq!(updated["content"], "keep");
    }

    #[tokio::test]
    async fn test_update_never_creates() {
        let d = public_notes();
        let err = d
            .update("note", "3", json!({"title": "b"}), &AuthContext::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RecordNotFound { .. }));
        assert_eq!(err.outcome(), Outcome::NotFound);
        let list = d
            .list("note", QueryParams::default(), &AuthContext::Anonymous)
            .await
            .unwrap();
        assert!(list.data.is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_object_body() {
        let d = public_notes();
        let response = d
            .dispatch(DispatchRequest::new("note", Capability::Create).with_body(json!([1])))
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.outcome, Outcome::BadInput);
        assert_eq!(response.problem().unwrap().code, "INVALID_BODY");

        let response = d.dispatch(DispatchRequest::new("note", Capability::Create)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_authorization_precedes_capability_check() {
        let d = dispatcher(
            Component::record::<Note>()
                .exposed_with(ExposeMarker::new().rule("deny_all"))
                .with_modifier(Modifier::ReadOnly),
        );
        for capability in [Capability::List, Capability::Create, Capability::Delete] {
            let response = d
                .dispatch(DispatchRequest::new("note", capability).with_id("1"))
                .await;
            assert_eq!(response.status, StatusCode::FORBIDDEN, "{}", capability);
            assert_eq!(response.outcome, Outcome::Denied);
            assert_eq!(response.problem().unwrap().code, "ACCESS_FORBIDDEN");
        }

        let d = dispatcher(
            Component::record::<Note>()
                .exposed_with(ExposeMarker::new().rule("permit_all"))
                .with_modifier(Modifier::ReadOnly),
        );
        let response = d
            .dispatch(DispatchRequest::new("note", Capability::Delete).with_id("1"))
            .await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.problem().unwrap().code, "CAPABILITY_NOT_SUPPORTED");
    }

    #[tokio::test]
    async fn test_rejected_input_is_reported_after_authorization() {
        let rejected = || {
            DispatchRequest::new("note", Capability::List)
                .with_rejection(InputRejection::Query("page: invalid digit found in string".into()))
        };

        let response = public_notes().dispatch(rejected()).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.outcome, Outcome::BadInput);
        assert_eq!(response.problem().unwrap().code, "INVALID_REQUEST");

        let denied = dispatcher(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("deny_all")));
        assert_eq!(denied.dispatch(rejected()).await.status, StatusCode::FORBIDDEN);

        let unknown = DispatchRequest::new("ghost", Capability::Create)
            .with_rejection(InputRejection::Body("expected value".into()));
        let response = public_notes().dispatch(unknown).await;
        assert_eq!(response.problem().unwrap().code, "RESOURCE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_problem_is_localized() {
        let d = public_notes();
        let response = d
            .dispatch(
                DispatchRequest::new("note", Capability::GetOne)
                    .with_id("9")
                    .with_locale("fr-CA"),
            )
            .await;
        let problem = response.problem().unwrap();
        assert_eq!(problem.code, "RECORD_NOT_FOUND");
        assert_eq!(problem.status, 404);
        assert!(problem.detail.contains('9'));
        assert_eq!(problem.title, "Enregistrement introuvable");
    }

    #[test]
    fn test_outcomes() {
        assert_eq!(
            DispatchError::ResourceNotFound {
                resource: "x".into()
            }
            .outcome(),
            Outcome::NotFound
        );
        assert_eq!(
            DispatchError::Store {
                resource: "x".into(),
                source: StoreError::Backend(anyhow::anyhow!("boom")),
            }
            .outcome(),
            Outcome::StoreFailed
        );
        assert_eq!(
            DispatchError::Forbidden {
                resource: "x".into(),
                capability: Capability::List,
                rule: "deny_all".into(),
            }
            .outcome(),
            Outcome::Denied
        );
    }
}
