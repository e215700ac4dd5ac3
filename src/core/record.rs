//! Record types and the runtime type information discovery works from

use crate::core::identifier::IdentifierKind;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::TypeId;

/// A data shape that can be exposed as a resource
///
/// Records travel through the dispatcher as JSON, so they only need to be
/// serializable. The identifier type is declared, not constrained: discovery
/// checks it against the supported identifier kinds and rejects the resource
/// if there is no codec for it.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct Note {
///     #[serde(default)]
///     id: i64,
///     title: String,
/// }
///
/// impl Record for Note {
///     type Id = i64;
/// }
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Declared identifier type
    type Id: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Name of the identifier field in the serialized record
    fn id_field() -> &'static str {
        "id"
    }
}

/// Rust type identity plus its printable name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name (e.g. `billing::model::Note`)
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment without generic arguments (e.g. `Note`)
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

/// What discovery knows about a record type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordInfo {
    pub record: TypeInfo,
    pub identifier: TypeInfo,
    pub id_field: &'static str,
}

impl RecordInfo {
    pub fn of<R: Record>() -> Self {
        Self {
            record: TypeInfo::of::<R>(),
            identifier: TypeInfo::of::<R::Id>(),
            id_field: R::id_field(),
        }
    }

    /// Identifier kind, or `None` if the declared type has no codec
    pub fn identifier_kind(&self) -> Option<IdentifierKind> {
        IdentifierKind::from_type_id(self.identifier.id())
    }
}
