//! Discovery: turns the host's registered components into a [`Registry`]
//!
//! Discovery runs once at startup. Every failure is a [`ConfigError`] and
//! aborts the scan before anything is published:
//!
//! - a marked component that is neither a record nor a store
//! - a record whose identifier type has no codec
//! - a malformed name or security rule
//! - two resources with the same name
//! - an empty result, unless the configuration allows it

pub mod component;

pub use component::{Component, ExposeMarker, Modifier};

use crate::config::{EngineConfig, ResourceOverride};
use crate::core::auth::{ResourceSecurity, SecurityRule};
use crate::core::capability::CapabilitySet;
use crate::core::error::ConfigError;
use crate::core::naming::ResourceNaming;
use crate::core::record::RecordInfo;
use crate::core::store::ResourceStore;
use crate::server::registry::{Registry, ResourceDescriptor};
use component::{ComponentKind, ConventionStore};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Scans components against an [`EngineConfig`]
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    config: EngineConfig,
}

impl Discovery {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Build the registry for these components
    pub fn discover(&self, components: &[Component]) -> Result<Registry, ConfigError> {
        let components = dedup(components);
        let companions = companion_stores(&components);
        let mut registry = Registry::new();

        for component in components {
            let config_override = self.config.resource_override(&component.type_info);
            let exposed = component.marker.is_some()
                || config_override.is_some_and(|o| o.expose);
            if !exposed {
                continue;
            }

            let descriptor = self.describe(component, config_override, &companions)?;

            tracing::info!(
                resource = %descriptor.name(),
                component = %component.type_info.name(),
                identifier = %descriptor.identifier(),
                capabilities = ?descriptor.capabilities(),
                paged = descriptor.paged(),
                "Discovered resource"
            );

            registry.insert(descriptor)?;
        }

        if registry.is_empty() && !self.config.allow_empty_registry {
            return Err(ConfigError::NoConfigurationFound);
        }

        tracing::info!(resources = registry.len(), "Discovery complete");
        Ok(registry)
    }

    fn describe(
        &self,
        component: &Component,
        config_override: Option<&ResourceOverride>,
        companions: &HashMap<TypeId, Arc<dyn ResourceStore>>,
    ) -> Result<ResourceDescriptor, ConfigError> {
        let component_name = component.type_info.name();

        let (record, backing) = match &component.kind {
            ComponentKind::Record { record, fallback } => (*record, Backing::Convention(*fallback)),
            ComponentKind::Store { record, store } => (*record, Backing::Handle(store.clone())),
            ComponentKind::Other => {
                return Err(ConfigError::UnsupportedTaggedType {
                    component: component.type_info.short_name().to_string(),
                    type_name: component_name.to_string(),
                });
            }
        };

        let name = self.resource_name(component, config_override, &record)?;

        let identifier =
            record
                .identifier_kind()
                .ok_or_else(|| ConfigError::UnsupportedIdentifierType {
                    resource: name.clone(),
                    type_name: record.identifier.name().to_string(),
                })?;

        let store = match backing {
            Backing::Handle(store) => store,
            Backing::Convention(fallback) => match companions.get(&record.record.id()) {
                Some(store) => {
                    tracing::debug!(resource = %name, "Using companion store");
                    store.clone()
                }
                None => fallback(identifier),
            },
        };

        let capabilities = self.capabilities(component, config_override, store.capabilities())?;
        let security = self.security(component, config_override)?;

        Ok(ResourceDescriptor::new(
            name,
            component.type_info,
            record.record,
            identifier,
            record.id_field.to_string(),
            store,
            capabilities,
            security,
        ))
    }

    fn resource_name(
        &self,
        component: &Component,
        config_override: Option<&ResourceOverride>,
        record: &RecordInfo,
    ) -> Result<String, ConfigError> {
        let explicit = config_override
            .and_then(|o| o.name.as_deref())
            .or_else(|| component.marker.as_ref().and_then(|m| m.name.as_deref()));

        let name = match explicit {
            Some(name) => name.to_string(),
            None => ResourceNaming::snake_case(record.record.short_name()),
        };
        ResourceNaming::validate(component.type_info.name(), &name)?;
        Ok(name)
    }

    fn capabilities(
        &self,
        component: &Component,
        config_override: Option<&ResourceOverride>,
        supported: CapabilitySet,
    ) -> Result<CapabilitySet, ConfigError> {
        let mut capabilities = component
            .modifiers
            .iter()
            .fold(supported, |set, modifier| modifier.apply(set));

        if let Some(config_override) = config_override {
            if let Some(restriction) = config_override.capability_set(component.type_info.name())? {
                capabilities = capabilities.intersect(restriction);
            }
        }

        Ok(capabilities)
    }

    fn security(
        &self,
        component: &Component,
        config_override: Option<&ResourceOverride>,
    ) -> Result<ResourceSecurity, ConfigError> {
        let mut security = ResourceSecurity::default();

        let base = config_override
            .and_then(|o| o.rule.as_deref())
            .or_else(|| component.marker.as_ref().and_then(|m| m.rule.as_deref()));
        if let Some(expression) = base {
            security = security.with_base(SecurityRule::parse(expression)?);
        }

        if let Some(marker) = &component.marker {
            for (capability, expression) in &marker.rules {
                security = security.with_override(*capability, SecurityRule::parse(expression)?);
            }
        }
        if let Some(config_override) = config_override {
            for (capability, rule) in config_override.capability_rules(component.type_info.name())? {
                security = security.with_override(capability, rule);
            }
        }

        Ok(security)
    }
}

enum Backing {
    Convention(ConventionStore),
    Handle(Arc<dyn ResourceStore>),
}

/// Drop repeated registrations of the same component, keeping the first
fn dedup(components: &[Component]) -> Vec<&Component> {
    let mut unique: Vec<&Component> = Vec::with_capacity(components.len());
    for component in components {
        if unique.iter().any(|seen| seen.same_registration(component)) {
            tracing::debug!(
                component = %component.type_info.name(),
                "Component registered more than once, keeping the first registration"
            );
            continue;
        }
        unique.push(component);
    }
    unique
}

/// Store handles by record type, for record components to bind to
fn companion_stores(components: &[&Component]) -> HashMap<TypeId, Arc<dyn ResourceStore>> {
    let mut stores = HashMap::new();
    for component in components {
        if let ComponentKind::Store { record, store } = &component.kind {
            stores
                .entry(record.record.id())
                .or_insert_with(|| store.clone());
        }
    }
    stores
}

/// A registry published at most once
///
/// The first successful [`get_or_discover`](Self::get_or_discover) wins;
/// later calls return the same registry without scanning again.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    cell: OnceLock<Arc<Registry>>,
}

impl SharedRegistry {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// The published registry, if any
    pub fn get(&self) -> Option<Arc<Registry>> {
        self.cell.get().cloned()
    }

    pub fn get_or_discover(
        &self,
        discovery: &Discovery,
        components: &[Component],
    ) -> Result<Arc<Registry>, ConfigError> {
        if let Some(registry) = self.cell.get() {
            tracing::debug!("Registry already published, skipping discovery");
            return Ok(registry.clone());
        }

        let registry = Arc::new(discovery.discover(components)?);
        Ok(self.cell.get_or_init(|| registry).clone())
    }
}
