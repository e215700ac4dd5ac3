//! Structured problem responses
//!
//! A [`ProblemDescriptor`] is a static catalog entry (stable code, message
//! keys, status). A [`ProblemDetail`] is one failure rendered for one
//! request: the descriptor's code and status plus title and detail resolved
//! through a [`MessageSource`] for the caller's locale.
//!
//! Building a problem never fails. A missing message key is surfaced
//! verbatim and a template that cannot be rendered is returned raw.

use crate::core::error::{ConfigError, DispatchError, IdentifierError, StoreError};
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Content type of serialized problems
pub const APPLICATION_PROBLEM_JSON: &str = "application/problem+json";

/// Static catalog entry describing one kind of failure
#[derive(Debug, PartialEq, Eq)]
pub struct ProblemDescriptor {
    /// Stable machine-readable code
    pub code: &'static str,
    /// Message key of the short title
    pub title_key: &'static str,
    /// Message key of the detail template
    pub detail_key: &'static str,
    /// HTTP-equivalent status
    pub status: StatusCode,
}

/// The process-wide problem catalog
pub mod catalog {
    use super::ProblemDescriptor;
    use axum::http::StatusCode;

    pub static UNKNOWN_PROBLEM: ProblemDescriptor = ProblemDescriptor {
        code: "UNKNOWN_PROBLEM",
        title_key: "problem.unknown.title",
        detail_key: "problem.unknown.detail",
        status: StatusCode::INTERNAL_SERVER_ERROR,
    };

    pub static CONFIGURATION_ERROR: ProblemDescriptor = ProblemDescriptor {
        code: "CONFIGURATION_ERROR",
        title_key: "problem.configuration.title",
        detail_key: "problem.configuration.detail",
        status: StatusCode::INTERNAL_SERVER_ERROR,
    };

    pub static RESOURCE_NOT_FOUND: ProblemDescriptor = ProblemDescriptor {
        code: "RESOURCE_NOT_FOUND",
        title_key: "problem.resource_not_found.title",
        detail_key: "problem.resource_not_found.detail",
        status: StatusCode::NOT_FOUND,
    };

    pub static RECORD_NOT_FOUND: ProblemDescriptor = ProblemDescriptor {
        code: "RECORD_NOT_FOUND",
        title_key: "problem.record_not_found.title",
        detail_key: "problem.record_not_found.detail",
        status: StatusCode::NOT_FOUND,
    };

    pub static BAD_IDENTIFIER: ProblemDescriptor = ProblemDescriptor {
        code: "BAD_IDENTIFIER",
        title_key: "problem.bad_identifier.title",
        detail_key: "problem.bad_identifier.detail",
        status: StatusCode::BAD_REQUEST,
    };

    pub static INVALID_BODY: ProblemDescriptor = ProblemDescriptor {
        code: "INVALID_BODY",
        title_key: "problem.invalid_body.title",
        detail_key: "problem.invalid_body.detail",
        status: StatusCode::BAD_REQUEST,
    };

    pub static INVALID_REQUEST: ProblemDescriptor = ProblemDescriptor {
        code: "INVALID_REQUEST",
        title_key: "problem.invalid_request.title",
        detail_key: "problem.invalid_request.detail",
        status: StatusCode::BAD_REQUEST,
    };

    pub static ACCESS_FORBIDDEN: ProblemDescriptor = ProblemDescriptor {
        code: "ACCESS_FORBIDDEN",
        title_key: "problem.access_forbidden.title",
        detail_key: "problem.access_forbidden.detail",
        status: StatusCode::FORBIDDEN,
    };

    pub static CAPABILITY_NOT_SUPPORTED: ProblemDescriptor = ProblemDescriptor {
        code: "CAPABILITY_NOT_SUPPORTED",
        title_key: "problem.capability_not_supported.title",
        detail_key: "problem.capability_not_supported.detail",
        status: StatusCode::METHOD_NOT_ALLOWED,
    };

    pub static RECORD_CONFLICT: ProblemDescriptor = ProblemDescriptor {
        code: "RECORD_CONFLICT",
        title_key: "problem.record_conflict.title",
        detail_key: "problem.record_conflict.detail",
        status: StatusCode::CONFLICT,
    };

    pub static STORE_FAILURE: ProblemDescriptor = ProblemDescriptor {
        code: "STORE_FAILURE",
        title_key: "problem.store_failure.title",
        detail_key: "problem.store_failure.detail",
        status: StatusCode::INTERNAL_SERVER_ERROR,
    };
}

/// Errors that know which catalog entry describes them
pub trait IntoProblem {
    fn problem_descriptor(&self) -> &'static ProblemDescriptor;

    /// Named values interpolated into the title and detail templates
    fn problem_arguments(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Wire shape of a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetail {
    pub code: String,
    pub title: String,
    pub detail: String,
    pub status: u16,
}

impl ProblemDetail {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ProblemDetail {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
        );
        response
    }
}

// =============================================================================
// Message lookup
// =============================================================================

/// Locale-aware lookup of message templates
pub trait MessageSource: Send + Sync {
    /// Resolve `key` for `locale`, or `None` if no bundle defines it
    fn message(&self, key: &str, locale: &str) -> Option<String>;
}

const BUILTIN_MESSAGES: &str = include_str!("messages.yaml");

/// Message bundles loaded from YAML (`locale -> key -> template`)
///
/// Lookup falls back from the full tag (`fr-CA`) to its language (`fr`) and
/// finally to the default locale.
#[derive(Debug, Clone)]
pub struct MessageBundle {
    default_locale: String,
    messages: HashMap<String, HashMap<String, String>>,
}

impl MessageBundle {
    /// An empty bundle; every key resolves to itself
    pub fn empty(default_locale: &str) -> Self {
        Self {
            default_locale: normalize_locale(default_locale),
            messages: HashMap::new(),
        }
    }

    /// The English and French messages shipped with the crate
    pub fn builtin(default_locale: &str) -> Self {
        Self::empty(default_locale)
            .merged_yaml(BUILTIN_MESSAGES)
            .unwrap_or_else(|_| Self::empty(default_locale))
    }

    /// Parse a bundle from a YAML string
    pub fn from_yaml_str(yaml: &str, default_locale: &str) -> Result<Self, ConfigError> {
        Self::empty(default_locale).merged_yaml(yaml)
    }

    /// Overlay the messages of a YAML string on top of this bundle
    pub fn merged_yaml(mut self, yaml: &str) -> Result<Self, ConfigError> {
        let parsed: HashMap<String, HashMap<String, String>> = serde_yaml::from_str(yaml)?;
        for (locale, entries) in parsed {
            self.messages
                .entry(normalize_locale(&locale))
                .or_default()
                .extend(entries);
        }
        Ok(self)
    }

    /// Overlay the messages of a YAML file on top of this bundle
    pub fn merged_yaml_file(self, path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        self.merged_yaml(&content)
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&String> {
        self.messages.get(locale).and_then(|m| m.get(key))
    }
}

impl MessageSource for MessageBundle {
    fn message(&self, key: &str, locale: &str) -> Option<String> {
        let locale = normalize_locale(locale);
        let language = locale.split('-').next().unwrap_or(&locale);

        self.lookup(&locale, key)
            .or_else(|| self.lookup(language, key))
            .or_else(|| self.lookup(&self.default_locale, key))
            .cloned()
    }
}

fn normalize_locale(locale: &str) -> String {
    locale.trim().replace('_', "-").to_ascii_lowercase()
}

/// Pick the first language tag of an `Accept-Language` header value
pub fn negotiate_locale(accept_language: Option<&str>, default_locale: &str) -> String {
    accept_language
        .and_then(|value| value.split(',').next())
        .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
        .filter(|tag| !tag.is_empty() && *tag != "*")
        .map(normalize_locale)
        .unwrap_or_else(|| normalize_locale(default_locale))
}

// =============================================================================
// Mapper
// =============================================================================

/// Turns errors into localized [`ProblemDetail`]s
#[derive(Clone)]
pub struct ProblemMapper {
    messages: Arc<dyn MessageSource>,
}

impl ProblemMapper {
    pub fn new(messages: Arc<dyn MessageSource>) -> Self {
        Self { messages }
    }

    /// Render an error that carries its own descriptor
    pub fn to_problem<E: IntoProblem + ?Sized>(&self, error: &E, locale: &str) -> ProblemDetail {
        self.render(
            error.problem_descriptor(),
            &error.problem_arguments(),
            locale,
        )
    }

    /// Render any error, falling back to the catch-all descriptor
    ///
    /// Errors of this crate are recognized through downcasting; anything
    /// else becomes `UNKNOWN_PROBLEM`.
    pub fn to_problem_any(
        &self,
        error: &(dyn std::error::Error + 'static),
        locale: &str,
    ) -> ProblemDetail {
        if let Some(e) = error.downcast_ref::<DispatchError>() {
            self.to_problem(e, locale)
        } else if let Some(e) = error.downcast_ref::<StoreError>() {
            self.to_problem(e, locale)
        } else if let Some(e) = error.downcast_ref::<IdentifierError>() {
            self.to_problem(e, locale)
        } else if let Some(e) = error.downcast_ref::<ConfigError>() {
            self.to_problem(e, locale)
        } else {
            self.unknown(locale)
        }
    }

    /// Render an `anyhow::Error` (see [`to_problem_any`](Self::to_problem_any))
    pub fn to_problem_anyhow(&self, error: &anyhow::Error, locale: &str) -> ProblemDetail {
        let error: &(dyn std::error::Error + 'static) = error.as_ref();
        self.to_problem_any(error, locale)
    }

    /// The catch-all problem
    pub fn unknown(&self, locale: &str) -> ProblemDetail {
        self.render(&catalog::UNKNOWN_PROBLEM, &[], locale)
    }

    fn render(
        &self,
        descriptor: &'static ProblemDescriptor,
        arguments: &[(&'static str, String)],
        locale: &str,
    ) -> ProblemDetail {
        ProblemDetail {
            code: descriptor.code.to_string(),
            title: self.resolve(descriptor.title_key, arguments, locale),
            detail: self.resolve(descriptor.detail_key, arguments, locale),
            status: descriptor.status.as_u16(),
        }
    }

    fn resolve(&self, key: &str, arguments: &[(&'static str, String)], locale: &str) -> String {
        let Some(template) = self.messages.message(key, locale) else {
            return key.to_string();
        };

        if !template.contains("{{") {
            return template;
        }

        let mut context = tera::Context::new();
        for (name, value) in arguments {
            context.insert(*name, value);
        }

        match tera::Tera::one_off(&template, &context, false) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::debug!(key, error = %e, "problem template could not be rendered");
                template
            }
        }
    }
}

impl Default for ProblemMapper {
    fn default() -> Self {
        Self::new(Arc::new(MessageBundle::builtin("en")))
    }
}
