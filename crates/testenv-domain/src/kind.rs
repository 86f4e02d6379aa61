use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of resource kinds the engine knows how to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Key,
    Network,
    Vm,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Key => "key",
            ResourceKind::Network => "network",
            ResourceKind::Vm => "vm",
        }
    }

    /// The four kinds in the enumeration order BuildDAG adds nodes in.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Image,
        ResourceKind::Key,
        ResourceKind::Network,
        ResourceKind::Vm,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one declared resource. Equality and hashing use (kind, name)
/// only — `provider` is advisory metadata, not part of the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub provider: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        ResourceRef { kind, name: name.into(), provider: None }
    }

    pub fn with_provider(kind: ResourceKind, name: impl Into<String>, provider: Option<String>) -> Self {
        ResourceRef { kind, name: name.into(), provider }
    }
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name
    }
}

impl Eq for ResourceRef {}

impl std::hash::Hash for ResourceRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_ref_equality_ignores_provider() {
        let a = ResourceRef::with_provider(ResourceKind::Key, "k1", Some("local".into()));
        let b = ResourceRef::with_provider(ResourceKind::Key, "k1", Some("other".into()));
        assert_eq!(a, b);
    }

    #[test]
    fn resource_ref_inequality_on_kind() {
        let a = ResourceRef::new(ResourceKind::Key, "x");
        let b = ResourceRef::new(ResourceKind::Network, "x");
        assert_ne!(a, b);
    }
}
