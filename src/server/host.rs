//! Server host for transport-agnostic API exposure
//!
//! The host holds everything a transport needs to serve the discovered
//! resources: the registry, the dispatcher, the principal extractor and the
//! configuration. Exposures only translate their protocol to
//! [`DispatchRequest`](super::dispatcher::DispatchRequest)s.

use crate::config::EngineConfig;
use crate::core::auth::{AuthProvider, SecurityEvaluator};
use crate::core::error::ConfigError;
use crate::core::problem::{MessageSource, ProblemMapper};
use crate::server::dispatcher::Dispatcher;
use crate::server::registry::Registry;
use std::sync::Arc;

/// Host context containing all engine state
///
/// # Example
///
/// ```rust,ignore
/// let host = ServerBuilder::new()
///     .register(Component::record::<Note>().exposed())
///     .build_host()?;
///
/// let rest_app = RestExposure::build_router(Arc::new(host), vec![])?;
/// ```
pub struct ServerHost {
    /// Engine configuration
    pub config: Arc<EngineConfig>,

    /// Discovered resources
    pub registry: Arc<Registry>,

    /// Generic CRUD dispatcher over the registry
    pub dispatcher: Arc<Dispatcher>,

    /// Extracts the caller's identity from request headers
    pub auth_provider: Arc<dyn AuthProvider>,
}

impl ServerHost {
    /// Build the host from builder components
    pub fn from_builder_components(
        config: EngineConfig,
        registry: Arc<Registry>,
        auth_provider: Arc<dyn AuthProvider>,
        messages: Arc<dyn MessageSource>,
    ) -> Result<Self, ConfigError> {
        let evaluator = SecurityEvaluator::new(config.default_security_rule()?);
        let dispatcher = Dispatcher::new(registry.clone(), evaluator, ProblemMapper::new(messages))
            .with_default_locale(&config.default_locale);

        Ok(Self {
            config: Arc::new(config),
            registry,
            dispatcher: Arc::new(dispatcher),
            auth_provider,
        })
    }

    /// Names of the exposed resources
    pub fn resource_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Whether there is anything to serve
    pub fn is_ready(&self) -> bool {
        !self.registry.is_empty()
    }

    pub fn default_locale(&self) -> &str {
        &self.config.default_locale
    }
}
