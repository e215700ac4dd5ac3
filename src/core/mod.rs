//! Core module containing the engine's fundamental traits and types

pub mod auth;
pub mod capability;
pub mod error;
pub mod identifier;
pub mod naming;
pub mod problem;
pub mod query;
pub mod record;
pub mod store;

pub use auth::{
    AuthContext, AuthPolicy, AuthProvider, NoAuthProvider, RequestContext, ResourceSecurity,
    SecurityDecision, SecurityEvaluator, SecurityRule, StaticAuthProvider,
};
pub use capability::{Capability, CapabilitySet};
pub use error::{ConfigError, DispatchError, IdentifierError, StoreError};
pub use identifier::{IdentifierKind, IdentifierValue, Key};
pub use naming::ResourceNaming;
pub use problem::{IntoProblem, MessageBundle, MessageSource, ProblemDetail, ProblemMapper};
pub use record::{Record, RecordInfo, TypeInfo};
pub use store::{Page, PageRequest, Repository, RepositoryStore, ResourceStore};
