use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key material the engine supports generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa,
    Ed25519,
    Ecdsa,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::Rsa => write!(f, "rsa"),
            KeyType::Ed25519 => write!(f, "ed25519"),
            KeyType::Ecdsa => write!(f, "ecdsa"),
        }
    }
}

/// A configured provider process, as declared in the spec map's `providers`
/// list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDecl {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// The first provider with `default: true` is used when a resource
    /// specifies no provider and the spec declares no `DefaultProvider`.
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDecl {
    pub name: String,
    pub provider: Option<String>,
    /// Source string handed to the (out-of-scope) image registry/cache; the
    /// engine never interprets it, only passes it through.
    pub source: String,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDecl {
    pub name: String,
    pub provider: Option<String>,
    pub key_type: KeyType,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDecl {
    pub name: String,
    pub provider: Option<String>,
    /// CIDR, possibly a template string at parse time.
    pub cidr: String,
    /// Literal name of another declared network this one attaches to, or a
    /// template reference — see the Dependency Graph & Scheduler rules for
    /// which contributes an edge.
    pub attach_to: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmDecl {
    pub name: String,
    pub provider: Option<String>,
    pub memory_mb: i64,
    pub vcpus: i64,
    /// Literal name of the declared network this VM attaches to, or a
    /// template reference.
    pub network: String,
    /// Usually a template reference into `.Keys.<name>.PublicKey`.
    pub ssh_authorized_keys: String,
    pub base_image: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The fully typed desired-state spec produced by the Parser from the
/// caller's untyped map.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestEnvSpec {
    #[serde(default)]
    pub providers: Vec<ProviderDecl>,
    pub default_provider: Option<String>,
    pub default_base_image: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageDecl>,
    #[serde(default)]
    pub keys: Vec<KeyDecl>,
    #[serde(default)]
    pub networks: Vec<NetworkDecl>,
    #[serde(default)]
    pub vms: Vec<VmDecl>,
}

impl TestEnvSpec {
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name.as_str())
    }

    pub fn default_provider_name(&self) -> Option<&str> {
        self.default_provider
            .as_deref()
            .or_else(|| self.providers.iter().find(|p| p.default).map(|p| p.name.as_str()))
    }
}
