//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::RestExposure;
use super::host::ServerHost;
use crate::config::EngineConfig;
use crate::core::auth::{AuthProvider, NoAuthProvider};
use crate::core::error::ConfigError;
use crate::core::problem::MessageSource;
use crate::discovery::{Component, Discovery, SharedRegistry};
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Builder for creating HTTP servers over discovered resources
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(EngineConfig::from_yaml_file("config/engine.yaml")?)
///     .register(Component::record::<Note>().exposed())
///     .register(Component::repository(TaskRepository::default()).exposed())
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: EngineConfig,
    components: Vec<Component>,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    messages: Option<Arc<dyn MessageSource>>,
    shared_registry: Option<Arc<SharedRegistry>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            components: Vec::new(),
            auth_provider: None,
            messages: None,
            shared_registry: None,
            custom_routes: Vec::new(),
        }
    }

    /// Replace the engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the engine configuration from a YAML file
    pub fn with_config_file(self, path: &str) -> Result<Self, ConfigError> {
        let config = EngineConfig::from_yaml_file(path)?;
        Ok(self.with_config(config))
    }

    /// Register a host component for discovery
    pub fn register(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Register several components at once
    pub fn register_all(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    /// Set how callers are identified (anonymous by default)
    pub fn with_auth_provider(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth_provider = Some(Arc::new(provider));
        self
    }

    /// Use these messages for problem payloads instead of the configured bundle
    pub fn with_messages(mut self, messages: impl MessageSource + 'static) -> Self {
        self.messages = Some(Arc::new(messages));
        self
    }

    /// Publish the registry through a shared cell
    ///
    /// If the cell already holds a registry, it is reused and discovery does
    /// not run again.
    pub fn with_shared_registry(mut self, shared: Arc<SharedRegistry>) -> Self {
        self.shared_registry = Some(shared);
        self
    }

    /// Add custom routes to the server
    ///
    /// Use this to add routes that don't fit the CRUD pattern, such as
    /// authentication endpoints or webhooks.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use axum::{Router, routing::post};
    ///
    /// let auth_routes = Router::new().route("/login", post(login_handler));
    ///
    /// ServerBuilder::new()
    ///     .register(Component::record::<Note>().exposed())
    ///     .with_custom_routes(auth_routes)
    ///     .build()?;
    /// ```
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Run discovery and build the transport-agnostic host
    pub fn build_host(self) -> Result<ServerHost, ConfigError> {
        // Validate the global rule before scanning anything
        self.config.default_security_rule()?;

        let discovery = Discovery::new(self.config.clone());
        let registry = match &self.shared_registry {
            Some(shared) => shared.get_or_discover(&discovery, &self.components)?,
            None => Arc::new(discovery.discover(&self.components)?),
        };

        let messages: Arc<dyn MessageSource> = match self.messages {
            Some(messages) => messages,
            None => Arc::new(self.config.message_bundle()?),
        };

        let auth_provider = self
            .auth_provider
            .unwrap_or_else(|| Arc::new(NoAuthProvider));

        ServerHost::from_builder_components(self.config, registry, auth_provider, messages)
    }

    /// Build the final REST router
    ///
    /// Convenience for building the host and exposing it via REST.
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        RestExposure::build_router(host, custom_routes)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    ///
    /// # Example
    ///
    /// ```ignore
    /// ServerBuilder::new()
    ///     .register(Component::record::<Note>().exposed())
    ///     .serve("127.0.0.1:3000").await?;
    /// ```
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
