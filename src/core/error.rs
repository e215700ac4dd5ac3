//! Typed errors for discovery, identifier parsing, stores and dispatch
//!
//! # Error Categories
//!
//! - [`ConfigError`]: startup configuration errors, fatal, never recovered
//! - [`IdentifierError`]: malformed path identifiers (client input, 400)
//! - [`StoreError`]: failures reported by a backing store
//! - [`DispatchError`]: everything the dispatcher can surface for one request
//!
//! Every category implements [`IntoProblem`], so the problem mapper can turn
//! it into a localized `{code, title, detail, status}` payload.

use crate::core::capability::Capability;
use crate::core::identifier::IdentifierKind;
use crate::core::problem::{IntoProblem, ProblemDescriptor, catalog};
use thiserror::Error;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while loading configuration or discovering resources
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Two resources resolve to the same name
    #[error("duplicate resource name '{name}': declared by '{first}' and '{second}'")]
    DuplicateResourceName {
        name: String,
        first: String,
        second: String,
    },

    /// A component carries the resource marker but is neither a record nor a store
    #[error("unsupported tagged bean type: component '{component}' of type '{type_name}' is neither a record nor a repository")]
    UnsupportedTaggedType { component: String, type_name: String },

    /// The record's identifier type has no codec
    #[error("identifier type parsing not supported: '{type_name}' (resource '{resource}')")]
    UnsupportedIdentifierType { resource: String, type_name: String },

    /// Discovery found nothing to expose
    #[error("no configuration found: no exposed resources were discovered")]
    NoConfigurationFound,

    /// An explicit resource name is empty or malformed
    #[error("invalid resource name '{name}' on '{component}': {reason}")]
    InvalidResourceName {
        component: String,
        name: String,
        reason: String,
    },

    /// A security expression could not be parsed
    #[error("invalid security rule '{expression}': {reason}")]
    InvalidSecurityRule { expression: String, reason: String },

    /// A capability name in configuration is unknown
    #[error("unknown capability '{name}' in configuration of '{component}'")]
    UnknownCapability { component: String, name: String },

    /// Configuration file could not be read
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl IntoProblem for ConfigError {
    fn problem_descriptor(&self) -> &'static ProblemDescriptor {
        &catalog::CONFIGURATION_ERROR
    }
}

// =============================================================================
// Identifier Errors
// =============================================================================

/// Errors produced by the identifier codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The raw string does not parse as the declared kind
    #[error("malformed {kind} identifier '{raw}': {reason}")]
    Malformed {
        kind: IdentifierKind,
        raw: String,
        reason: String,
    },
}

impl IntoProblem for IdentifierError {
    fn problem_descriptor(&self) -> &'static ProblemDescriptor {
        &catalog::BAD_IDENTIFIER
    }

    fn problem_arguments(&self) -> Vec<(&'static str, String)> {
        match self {
            IdentifierError::Malformed { kind, raw, .. } => {
                vec![("kind", kind.to_string()), ("raw", raw.clone())]
            }
        }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Failures reported by a backing store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist
    #[error("record '{id}' not found")]
    NotFound { id: String },

    /// A record with the same identifier already exists
    #[error("record '{id}' already exists")]
    Conflict { id: String },

    /// The submitted record does not have the stored shape
    #[error("invalid record: {message}")]
    InvalidRecord { message: String },

    /// The store does not implement this capability
    #[error("store does not support {0}")]
    Unsupported(Capability),

    /// A record could not be converted to or from its stored shape
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl IntoProblem for StoreError {
    fn problem_descriptor(&self) -> &'static ProblemDescriptor {
        match self {
            StoreError::NotFound { .. } => &catalog::RECORD_NOT_FOUND,
            StoreError::Conflict { .. } => &catalog::RECORD_CONFLICT,
            StoreError::InvalidRecord { .. } => &catalog::INVALID_BODY,
            StoreError::Unsupported(_) => &catalog::CAPABILITY_NOT_SUPPORTED,
            StoreError::Serialization(_) => &catalog::STORE_FAILURE,
            StoreError::Backend(_) => &catalog::UNKNOWN_PROBLEM,
        }
    }

    fn problem_arguments(&self) -> Vec<(&'static str, String)> {
        match self {
            StoreError::NotFound { id } | StoreError::Conflict { id } => {
                vec![("id", id.clone())]
            }
            StoreError::InvalidRecord { message } => vec![("message", message.clone())],
            StoreError::Unsupported(capability) => vec![("capability", capability.to_string())],
            _ => vec![],
        }
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Everything a dispatched request can fail with
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No resource with this name is registered
    #[error("unknown resource '{resource}'")]
    ResourceNotFound { resource: String },

    /// The identifier does not resolve to a record
    #[error("{resource} '{id}' not found")]
    RecordNotFound { resource: String, id: String },

    /// The identifier failed to parse
    #[error(transparent)]
    BadIdentifier(#[from] IdentifierError),

    /// The security rule evaluated to false
    #[error("{capability} on '{resource}' denied by rule '{rule}'")]
    Forbidden {
        resource: String,
        capability: Capability,
        rule: String,
    },

    /// The resource does not expose this capability
    #[error("resource '{resource}' does not support {capability}")]
    CapabilityNotSupported {
        resource: String,
        capability: Capability,
    },

    /// The request body is unusable
    #[error("invalid request body for '{resource}': {message}")]
    InvalidBody { resource: String, message: String },

    /// The path or query string could not be read
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The backing store failed
    #[error("store failure on '{resource}': {source}")]
    Store {
        resource: String,
        #[source]
        source: StoreError,
    },
}

impl IntoProblem for DispatchError {
    fn problem_descriptor(&self) -> &'static ProblemDescriptor {
        match self {
            DispatchError::ResourceNotFound { .. } => &catalog::RESOURCE_NOT_FOUND,
            DispatchError::RecordNotFound { .. } => &catalog::RECORD_NOT_FOUND,
            DispatchError::BadIdentifier(e) => e.problem_descriptor(),
            DispatchError::Forbidden { .. } => &catalog::ACCESS_FORBIDDEN,
            DispatchError::CapabilityNotSupported { .. } => &catalog::CAPABILITY_NOT_SUPPORTED,
            DispatchError::InvalidBody { .. } => &catalog::INVALID_BODY,
            DispatchError::InvalidRequest { .. } => &catalog::INVALID_REQUEST,
            DispatchError::Store { source, .. } => source.problem_descriptor(),
        }
    }

    // The rule text stays out of the payload; it is only logged.
    fn problem_arguments(&self) -> Vec<(&'static str, String)> {
        match self {
            DispatchError::ResourceNotFound { resource } => vec![("resource", resource.clone())],
            DispatchError::RecordNotFound { resource, id } => {
                vec![("resource", resource.clone()), ("id", id.clone())]
            }
            DispatchError::BadIdentifier(e) => e.problem_arguments(),
            DispatchError::Forbidden {
                resource,
                capability,
                ..
            }
            | DispatchError::CapabilityNotSupported {
                resource,
                capability,
            } => vec![
                ("resource", resource.clone()),
                ("capability", capability.to_string()),
            ],
            DispatchError::InvalidBody { resource, message } => {
                vec![("resource", resource.clone()), ("message", message.clone())]
            }
            DispatchError::InvalidRequest { message } => vec![("message", message.clone())],
            DispatchError::Store { resource, source } => {
                let mut args = vec![("resource", resource.clone())];
                args.extend(source.problem_arguments());
                args
            }
        }
    }
}
