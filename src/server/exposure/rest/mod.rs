//! REST API exposure
//!
//! Two generic routes serve every discovered resource:
//!
//! | Method   | Path               | Capability |
//! |----------|--------------------|------------|
//! | `GET`    | `/{resource}`      | list       |
//! | `POST`   | `/{resource}`      | create     |
//! | `GET`    | `/{resource}/{id}` | get_one    |
//! | `PUT`    | `/{resource}/{id}` | update     |
//! | `DELETE` | `/{resource}/{id}` | delete     |
//!
//! plus `/health`, `/healthz` and a route index at `GET /`. Handlers only
//! translate HTTP into [`DispatchRequest`]s; everything else is the
//! dispatcher's job.

use super::super::host::ServerHost;
use crate::core::auth::AuthContext;
use crate::core::capability::Capability;
use crate::core::error::DispatchError;
use crate::core::problem::negotiate_locale;
use crate::core::query::QueryParams;
use crate::server::dispatcher::{
    DispatchBody, DispatchRequest, DispatchResponse, InputRejection, Outcome,
};
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// Custom routes are merged after the generic ones; static paths such as
    /// `/login` take precedence over the `/{resource}` pattern.
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let resource_routes = Router::new()
            .route("/", get(route_index))
            .route("/{resource}", get(list).post(create))
            .route("/{resource}/{id}", get(get_one).put(update).delete(delete))
            .with_state(host);

        let mut app = Self::health_routes().merge(resource_routes);

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        Ok(app.layer(TraceLayer::new_for_http()))
    }

    /// Build health check routes
    fn health_routes() -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
    }

    /// Health check endpoint handler
    async fn health_check() -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "exposed"
        }))
    }
}

async fn route_index(State(host): State<Arc<ServerHost>>) -> Json<Value> {
    let resources: Vec<Value> = host
        .registry
        .iter()
        .map(|descriptor| {
            json!({
                "name": descriptor.name(),
                "record": descriptor.record().name(),
                "identifier": descriptor.identifier(),
                "capabilities": descriptor.capabilities().iter().collect::<Vec<_>>(),
                "paged": descriptor.paged(),
            })
        })
        .collect();

    let routes: Vec<Value> = host
        .registry
        .routes()
        .into_iter()
        .map(|route| {
            json!({
                "method": route.method.as_str(),
                "path": route.path,
                "resource": route.resource,
                "capability": route.capability,
            })
        })
        .collect();

    Json(json!({ "resources": resources, "routes": routes }))
}

async fn list(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<QueryParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    let Path(resource) = match path {
        Ok(path) => path,
        Err(rejection) => return reject_path(&host, &headers, rejection),
    };
    let request = DispatchRequest::new(&resource, Capability::List);
    let request = match query {
        Ok(Query(query)) => request.with_query(query),
        Err(rejection) => request.with_rejection(InputRejection::Query(rejection.body_text())),
    };
    run(&host, &headers, request).await
}

async fn get_one(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let Path((resource, id)) = match path {
        Ok(path) => path,
        Err(rejection) => return reject_path(&host, &headers, rejection),
    };
    let request = DispatchRequest::new(&resource, Capability::GetOne).with_id(&id);
    run(&host, &headers, request).await
}

async fn create(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Path(resource) = match path {
        Ok(path) => path,
        Err(rejection) => return reject_path(&host, &headers, rejection),
    };
    let request = with_body(DispatchRequest::new(&resource, Capability::Create), &body);
    run(&host, &headers, request).await
}

async fn update(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Path((resource, id)) = match path {
        Ok(path) => path,
        Err(rejection) => return reject_path(&host, &headers, rejection),
    };
    let request = with_body(
        DispatchRequest::new(&resource, Capability::Update).with_id(&id),
        &body,
    );
    run(&host, &headers, request).await
}

async fn delete(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<(String, String)>, PathRejection>,
    headers: HeaderMap,
) -> Response {
    let Path((resource, id)) = match path {
        Ok(path) => path,
        Err(rejection) => return reject_path(&host, &headers, rejection),
    };
    let request = DispatchRequest::new(&resource, Capability::Delete).with_id(&id);
    run(&host, &headers, request).await
}

/// Attach caller identity, metadata and locale, then dispatch
async fn run(host: &ServerHost, headers: &HeaderMap, request: DispatchRequest) -> Response {
    let principal = match host.auth_provider.extract_context(headers).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(error = %e, "Could not extract caller identity, treating as anonymous");
            AuthContext::Anonymous
        }
    };

    let request = request
        .with_principal(principal)
        .with_metadata(header_metadata(headers))
        .with_locale(&request_locale(host, headers));

    host.dispatcher.dispatch(request).await.into_response()
}

fn parse_body(body: &Bytes) -> Result<Value, InputRejection> {
    if body.is_empty() {
        return Err(InputRejection::Body("request body is missing".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| InputRejection::Body(e.to_string()))
}

fn with_body(request: DispatchRequest, body: &Bytes) -> DispatchRequest {
    match parse_body(body) {
        Ok(value) => request.with_body(value),
        Err(rejection) => request.with_rejection(rejection),
    }
}

/// Answer a request whose path segments could not be decoded
fn reject_path(host: &ServerHost, headers: &HeaderMap, rejection: PathRejection) -> Response {
    let error = DispatchError::InvalidRequest {
        message: rejection.body_text(),
    };
    tracing::debug!(error = %error, "Request rejected before dispatch");
    let problem = host
        .dispatcher
        .problems()
        .to_problem(&error, &request_locale(host, headers));
    DispatchResponse {
        status: problem.status_code(),
        body: DispatchBody::Problem(problem),
        outcome: Outcome::BadInput,
    }
    .into_response()
}

fn request_locale(host: &ServerHost, headers: &HeaderMap) -> String {
    let accept_language = headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok());
    negotiate_locale(accept_language, host.default_locale())
}

fn header_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_body() {
        assert_eq!(
            parse_body(&Bytes::from_static(b"{\"title\":\"a\"}")).unwrap(),
            json!({"title": "a"})
        );
        assert_eq!(
            parse_body(&Bytes::new()),
            Err(InputRejection::Body("request body is missing".to_string()))
        );
        assert!(matches!(
            parse_body(&Bytes::from_static(b"{oops")),
            Err(InputRejection::Body(_))
        ));
    }

    #[test]
    fn test_undecodable_body_travels_with_the_request() {
        let request = with_body(
            DispatchRequest::new("note", Capability::Create),
            &Bytes::from_static(b"[1,"),
        );
        assert!(request.body.is_none());
        assert!(matches!(request.rejection, Some(InputRejection::Body(_))));
    }

    #[test]
    fn test_header_metadata_uses_lowercase_names() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Tenant", HeaderValue::from_static("acme"));
        let metadata = header_metadata(&headers);
        assert_eq!(metadata.get("x-tenant").map(String::as_str), Some("acme"));
    }
}
