use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Engine-to-caller input for a create request. `spec` is the untyped spec
/// map handed to the Parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInput {
    #[serde(rename = "testID")]
    pub test_id: String,
    pub stage: String,
    pub tmp_dir: String,
    pub root_dir: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub spec: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeleteInput {
    #[serde(rename = "testID")]
    pub test_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub managed_resources: Vec<String>,
}

/// Downstream artifact produced by a successful create, consumed by the
/// test runner. `files` values are relative to `tmp_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestEnvArtifact {
    #[serde(rename = "testID")]
    pub test_id: String,
    #[serde(default)]
    pub files: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub managed_resources: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl TestEnvArtifact {
    pub fn new(test_id: impl Into<String>) -> Self {
        TestEnvArtifact { test_id: test_id.into(), ..Default::default() }
    }

    /// Namespaced managed-resource URI of the form `testenv-vm://<kind>/<name>`.
    pub fn managed_resource_uri(kind: &str, name: &str) -> String {
        format!("testenv-vm://{kind}/{name}")
    }
}
