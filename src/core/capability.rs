//! Capabilities a resource can expose and the sets built from them

use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One generic operation a resource may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    List,
    GetOne,
    Create,
    Update,
    Delete,
}

impl Capability {
    /// Every capability, in route order
    pub const ALL: [Capability; 5] = [
        Capability::List,
        Capability::GetOne,
        Capability::Create,
        Capability::Update,
        Capability::Delete,
    ];

    /// Stable name used in configuration files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::List => "list",
            Capability::GetOne => "get_one",
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
        }
    }

    /// Parse a capability name as written in configuration
    ///
    /// Accepts `get_one`, `getOne` and `get` for the single-record read.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "list" => Some(Capability::List),
            "get_one" | "getOne" | "get" => Some(Capability::GetOne),
            "create" => Some(Capability::Create),
            "update" => Some(Capability::Update),
            "delete" => Some(Capability::Delete),
            _ => None,
        }
    }

    /// HTTP method this capability is served under
    pub fn method(&self) -> Method {
        match self {
            Capability::List | Capability::GetOne => Method::GET,
            Capability::Create => Method::POST,
            Capability::Update => Method::PUT,
            Capability::Delete => Method::DELETE,
        }
    }

    /// Whether the capability addresses a single record by identifier
    pub fn takes_identifier(&self) -> bool {
        matches!(
            self,
            Capability::GetOne | Capability::Update | Capability::Delete
        )
    }

    /// Whether the capability only reads
    pub fn is_read(&self) -> bool {
        matches!(self, Capability::List | Capability::GetOne)
    }

    fn bit(&self) -> u8 {
        match self {
            Capability::List => 1,
            Capability::GetOne => 1 << 1,
            Capability::Create => 1 << 2,
            Capability::Update => 1 << 3,
            Capability::Delete => 1 << 4,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A small copyable set of capabilities
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// list + get_one + create + update + delete
    pub const fn crud() -> Self {
        Self(0b1_1111)
    }

    /// list + get_one
    pub const fn read_only() -> Self {
        Self(0b0_0011)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0 |= capability.bit();
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.0 &= !capability.bit();
        self
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn intersect(&self, other: CapabilitySet) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate the contained capabilities in route order
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(CapabilitySet::empty(), |set, c| set.with(c))
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud_contains_everything() {
        let set = CapabilitySet::crud();
        for cap in Capability::ALL {
            assert!(set.contains(cap), "{} missing", cap);
        }
    }

    #[test]
    fn test_read_only_set() {
        let set = CapabilitySet::read_only();
        assert!(set.contains(Capability::List));
        assert!(set.contains(Capability::GetOne));
        assert!(!set.contains(Capability::Create));
        assert!(!set.contains(Capability::Update));
        assert!(!set.contains(Capability::Delete));
    }

    #[test]
    fn test_with_without_intersect() {
        let set = CapabilitySet::empty()
            .with(Capability::Create)
            .with(Capability::Delete);
        assert_eq!(
            set.without(Capability::Delete).iter().collect::<Vec<_>>(),
            vec![Capability::Create]
        );
        assert!(set.intersect(CapabilitySet::read_only()).is_empty());
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Capability::parse("getOne"), Some(Capability::GetOne));
        assert_eq!(Capability::parse("get"), Some(Capability::GetOne));
        assert_eq!(Capability::parse("patch"), None);
    }

    #[test]
    fn test_methods() {
        assert_eq!(Capability::Create.method(), Method::POST);
        assert_eq!(Capability::Update.method(), Method::PUT);
        assert!(Capability::Delete.takes_identifier());
        assert!(!Capability::List.takes_identifier());
    }
}
