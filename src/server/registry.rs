//! Resource descriptors and the registry discovery publishes

use crate::core::auth::ResourceSecurity;
use crate::core::capability::{Capability, CapabilitySet};
use crate::core::error::ConfigError;
use crate::core::identifier::IdentifierKind;
use crate::core::record::TypeInfo;
use crate::core::store::ResourceStore;
use axum::http::Method;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Immutable description of one exposed resource
///
/// Built once by discovery; everything the dispatcher needs to serve the
/// resource is pinned here (identifier kind, capabilities, rules, store).
pub struct ResourceDescriptor {
    name: String,
    source: TypeInfo,
    record: TypeInfo,
    identifier: IdentifierKind,
    id_field: String,
    store: Arc<dyn ResourceStore>,
    capabilities: CapabilitySet,
    paged: bool,
    security: ResourceSecurity,
}

impl ResourceDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        source: TypeInfo,
        record: TypeInfo,
        identifier: IdentifierKind,
        id_field: String,
        store: Arc<dyn ResourceStore>,
        capabilities: CapabilitySet,
        security: ResourceSecurity,
    ) -> Self {
        let paged = store.supports_paging();
        Self {
            name,
            source,
            record,
            identifier,
            id_field,
            store,
            capabilities,
            paged,
            security,
        }
    }

    /// Unique resource name, also the first path segment
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The component that declared the resource
    pub fn source(&self) -> TypeInfo {
        self.source
    }

    /// Record type the resource serves
    pub fn record(&self) -> TypeInfo {
        self.record
    }

    pub fn identifier(&self) -> IdentifierKind {
        self.identifier
    }

    /// Name of the identifier field inside records
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Whether lists are served page by page
    pub fn paged(&self) -> bool {
        self.paged
    }

    pub fn security(&self) -> &ResourceSecurity {
        &self.security
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("source", &self.source.name())
            .field("record", &self.record.name())
            .field("identifier", &self.identifier)
            .field("id_field", &self.id_field)
            .field("capabilities", &self.capabilities)
            .field("paged", &self.paged)
            .finish_non_exhaustive()
    }
}

/// One method + path a transport should serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Method,
    /// `/<name>` or `/<name>/{id}`
    pub path: String,
    pub resource: String,
    pub capability: Capability,
}

/// Name to descriptor mapping, in discovery order
///
/// Read-only once published; share it as `Arc<Registry>`.
#[derive(Debug, Default)]
pub struct Registry {
    resources: IndexMap<String, Arc<ResourceDescriptor>>,
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor, rejecting a name that is already taken
    pub(crate) fn insert(&mut self, descriptor: ResourceDescriptor) -> Result<(), ConfigError> {
        if let Some(existing) = self.resources.get(descriptor.name()) {
            return Err(ConfigError::DuplicateResourceName {
                name: descriptor.name().to_string(),
                first: existing.source().name().to_string(),
                second: descriptor.source().name().to_string(),
            });
        }
        self.resources
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.resources.get(name)
    }

    /// Resource names in discovery order
    pub fn names(&self) -> Vec<&str> {
        self.resources.keys().map(|s| s.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDescriptor>> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every route the registered resources need, one per capability
    pub fn routes(&self) -> Vec<RouteDescriptor> {
        self.iter()
            .flat_map(|descriptor| {
                descriptor.capabilities().iter().map(move |capability| {
                    let path = if capability.takes_identifier() {
                        format!("/{}/{{id}}", descriptor.name())
                    } else {
                        format!("/{}", descriptor.name())
                    };
                    RouteDescriptor {
                        method: capability.method(),
                        path,
                        resource: descriptor.name().to_string(),
                        capability,
                    }
                })
            })
            .collect()
    }
}
