//! Configuration loading and management
//!
//! ```yaml
//! default_rule: deny_all
//! allow_empty_registry: false
//! default_locale: en
//! messages: config/messages.yaml
//! resources:
//!   app::model::Note:
//!     name: notes
//!     rule: authenticated
//!     rules:
//!       delete: admin_only
//!     capabilities: [list, get_one, create]
//! ```

use crate::core::auth::{DENY_ALL, SecurityRule};
use crate::core::capability::{Capability, CapabilitySet};
use crate::core::error::ConfigError;
use crate::core::problem::MessageBundle;
use crate::core::record::TypeInfo;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Per-resource settings applied on top of the component's markers
///
/// Entries are keyed by the component's Rust type name, either fully
/// qualified (`app::model::Note`) or short (`Note`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceOverride {
    /// Resource name (replaces the marker's or the derived one)
    #[serde(default)]
    pub name: Option<String>,

    /// Base security rule
    #[serde(default)]
    pub rule: Option<String>,

    /// Per-capability security rules (capability name -> rule)
    #[serde(default)]
    pub rules: BTreeMap<String, String>,

    /// Restricts the exposed capabilities to this list
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,

    /// Expose the component even though it carries no marker
    #[serde(default)]
    pub expose: bool,
}

impl ResourceOverride {
    /// Parsed capability restriction, if any
    pub fn capability_set(&self, component: &str) -> Result<Option<CapabilitySet>, ConfigError> {
        let Some(names) = &self.capabilities else {
            return Ok(None);
        };

        names
            .iter()
            .map(|name| parse_capability(component, name))
            .collect::<Result<CapabilitySet, _>>()
            .map(Some)
    }

    /// Parsed per-capability rules
    pub fn capability_rules(
        &self,
        component: &str,
    ) -> Result<Vec<(Capability, SecurityRule)>, ConfigError> {
        self.rules
            .iter()
            .map(|(name, expression)| {
                Ok((parse_capability(component, name)?, SecurityRule::parse(expression)?))
            })
            .collect()
    }
}

fn parse_capability(component: &str, name: &str) -> Result<Capability, ConfigError> {
    Capability::parse(name).ok_or_else(|| ConfigError::UnknownCapability {
        component: component.to_string(),
        name: name.to_string(),
    })
}

/// Engine-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Rule applied when a resource declares none for an operation
    #[serde(default = "default_rule")]
    pub default_rule: String,

    /// Accept a registry with no resources instead of failing
    #[serde(default)]
    pub allow_empty_registry: bool,

    /// Locale used when a request names none we have messages for
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Optional YAML message bundle overlaid on the built-in one
    #[serde(default)]
    pub messages: Option<String>,

    /// Per-resource overrides keyed by Rust type name
    #[serde(default)]
    pub resources: HashMap<String, ResourceOverride>,
}

fn default_rule() -> String {
    DENY_ALL.to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_rule: default_rule(),
            allow_empty_registry: false,
            default_locale: default_locale(),
            messages: None,
            resources: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Override for a component type, looked up by full then short name
    pub fn resource_override(&self, type_info: &TypeInfo) -> Option<&ResourceOverride> {
        self.resources
            .get(type_info.name())
            .or_else(|| self.resources.get(type_info.short_name()))
    }

    /// Parsed global default rule
    pub fn default_security_rule(&self) -> Result<SecurityRule, ConfigError> {
        SecurityRule::parse(&self.default_rule)
    }

    /// Built-in messages overlaid with the configured bundle, if any
    pub fn message_bundle(&self) -> Result<MessageBundle, ConfigError> {
        let bundle = MessageBundle::builtin(&self.default_locale);
        match &self.messages {
            Some(path) => bundle.merged_yaml_file(path),
            None => Ok(bundle),
        }
    }
}
