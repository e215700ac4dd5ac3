//! # Exposed
//!
//! Generic REST resources over discovered record types and repositories,
//! without hand-written controllers.
//!
//! ## Features
//!
//! - **Discovery**: register components, mark the ones to expose, get an
//!   immutable [`Registry`](server::Registry) of resource descriptors
//! - **Typed identifiers**: `i64`, `i32`, `Uuid` and `String` keys, parsed
//!   strictly from path segments
//! - **Security rules**: a small policy language (`authenticated`,
//!   `role:editor`, `admin_only || role:owner`, ...) with per-capability
//!   overrides and a fail-closed default
//! - **Generic CRUD dispatch**: list / get / create / update / delete against
//!   any [`ResourceStore`](core::store::ResourceStore)
//! - **Problem payloads**: every failure becomes a localized
//!   `{code, title, detail, status}` document
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exposed::prelude::*;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Note {
//!     #[serde(default)]
//!     id: i64,
//!     title: String,
//!     content: String,
//! }
//!
//! impl Record for Note {
//!     type Id = i64;
//! }
//!
//! ServerBuilder::new()
//!     .register(Component::record::<Note>().exposed_with(ExposeMarker::new().rule("permit_all")))
//!     .serve("127.0.0.1:3000")
//!     .await?;
//!
//! // GET /note, POST /note, GET|PUT|DELETE /note/{id}
//! ```

pub mod config;
pub mod core;
pub mod discovery;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{
            AuthContext, AuthPolicy, AuthProvider, NoAuthProvider, RequestContext,
            ResourceSecurity, SecurityEvaluator, SecurityRule, StaticAuthProvider,
        },
        capability::{Capability, CapabilitySet},
        error::{ConfigError, DispatchError, IdentifierError, StoreError},
        identifier::{IdentifierKind, IdentifierValue},
        problem::{IntoProblem, MessageBundle, MessageSource, ProblemDetail, ProblemMapper},
        query::{ListResponse, PaginationMeta, QueryParams},
        record::Record,
        store::{Page, PageRequest, Repository, ResourceStore},
    };

    // === Discovery ===
    pub use crate::discovery::{Component, Discovery, ExposeMarker, Modifier, SharedRegistry};

    // === Storage ===
    pub use crate::storage::InMemoryStore;

    // === Config ===
    pub use crate::config::{EngineConfig, ResourceOverride};

    // === Server ===
    pub use crate::server::{
        DispatchRequest, DispatchResponse, Dispatcher, Outcome, Registry, RestExposure,
        ServerBuilder, ServerHost,
    };

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;

    // === Axum ===
    pub use axum::{
        Router,
        extract::{Path, State},
        http::HeaderMap,
        routing::{delete, get, post, put},
    };
}
