//! Registration input: host components and the markers they carry

use crate::core::capability::{Capability, CapabilitySet};
use crate::core::identifier::IdentifierKind;
use crate::core::record::{Record, RecordInfo, TypeInfo};
use crate::core::store::{Repository, RepositoryStore, ResourceStore};
use crate::storage::InMemoryStore;
use std::sync::Arc;

/// Primary marker: "expose this component as a resource"
///
/// ```rust,ignore
/// Component::record::<Note>().exposed_with(
///     ExposeMarker::new()
///         .named("notes")
///         .rule("authenticated")
///         .rule_for(Capability::Delete, "admin_only"),
/// )
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExposeMarker {
    pub(crate) name: Option<String>,
    pub(crate) rule: Option<String>,
    pub(crate) rules: Vec<(Capability, String)>,
}

impl ExposeMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit resource name
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Base security rule for every capability
    pub fn rule(mut self, expression: &str) -> Self {
        self.rule = Some(expression.to_string());
        self
    }

    /// Security rule for one capability, taking precedence over the base rule
    pub fn rule_for(mut self, capability: Capability, expression: &str) -> Self {
        self.rules.push((capability, expression.to_string()));
        self
    }
}

/// Secondary markers that narrow what a resource exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Only list and get_one
    ReadOnly,
    /// Drop one capability
    Exclude(Capability),
}

impl Modifier {
    pub(crate) fn apply(&self, capabilities: CapabilitySet) -> CapabilitySet {
        match self {
            Modifier::ReadOnly => capabilities.intersect(CapabilitySet::read_only()),
            Modifier::Exclude(capability) => capabilities.without(*capability),
        }
    }
}

/// Builds the store a record resource falls back to
pub(crate) type ConventionStore = fn(IdentifierKind) -> Arc<dyn ResourceStore>;

fn convention_store<R: Record>(kind: IdentifierKind) -> Arc<dyn ResourceStore> {
    Arc::new(InMemoryStore::new(kind, R::id_field()).conforming_to::<R>())
}

pub(crate) enum ComponentKind {
    /// A plain record type
    Record {
        record: RecordInfo,
        fallback: ConventionStore,
    },
    /// A store handle over a record type
    Store {
        record: RecordInfo,
        store: Arc<dyn ResourceStore>,
    },
    /// Anything else the host registered
    Other,
}

impl ComponentKind {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            ComponentKind::Record { .. } => "record",
            ComponentKind::Store { .. } => "store",
            ComponentKind::Other => "component",
        }
    }
}

/// One object registered by the host, with its markers
pub struct Component {
    pub(crate) type_info: TypeInfo,
    pub(crate) kind: ComponentKind,
    pub(crate) marker: Option<ExposeMarker>,
    pub(crate) modifiers: Vec<Modifier>,
}

impl Component {
    fn new(type_info: TypeInfo, kind: ComponentKind) -> Self {
        Self {
            type_info,
            kind,
            marker: None,
            modifiers: Vec::new(),
        }
    }

    /// A record type; exposed resources over it use a companion store
    /// registered for the same record, or an in-memory store
    pub fn record<R: Record>() -> Self {
        Self::new(
            TypeInfo::of::<R>(),
            ComponentKind::Record {
                record: RecordInfo::of::<R>(),
                fallback: convention_store::<R>,
            },
        )
    }

    /// A typed repository; its element type is the resource's record type
    pub fn repository<P: Repository>(repository: P) -> Self {
        Self::repository_arc(Arc::new(repository))
    }

    /// Same as [`repository`](Self::repository) for a shared handle
    pub fn repository_arc<P: Repository>(repository: Arc<P>) -> Self {
        Self::new(
            TypeInfo::of::<P>(),
            ComponentKind::Store {
                record: RecordInfo::of::<P::Record>(),
                store: Arc::new(RepositoryStore::new(repository)),
            },
        )
    }

    /// A JSON-level store serving records of type `R`
    pub fn store<R: Record, S: ResourceStore + 'static>(store: S) -> Self {
        Self::new(
            TypeInfo::of::<S>(),
            ComponentKind::Store {
                record: RecordInfo::of::<R>(),
                store: Arc::new(store),
            },
        )
    }

    /// Any other host component (services, clients, ...)
    pub fn other<T: ?Sized + 'static>() -> Self {
        Self::new(TypeInfo::of::<T>(), ComponentKind::Other)
    }

    /// Attach the primary marker with default settings
    pub fn exposed(self) -> Self {
        self.exposed_with(ExposeMarker::new())
    }

    /// Attach the primary marker
    pub fn exposed_with(mut self, marker: ExposeMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Attach a secondary marker
    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn is_marked(&self) -> bool {
        self.marker.is_some()
    }

    /// Same Rust type registered in the same role
    pub(crate) fn same_registration(&self, other: &Component) -> bool {
        self.type_info.id() == other.type_info.id() && self.kind.label() == other.kind.label()
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("type", &self.type_info.name())
            .field("kind", &self.kind.label())
            .field("marker", &self.marker)
            .field("modifiers", &self.modifiers)
            .finish()
    }
}
