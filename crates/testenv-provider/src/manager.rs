use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use testenv_domain::{OperationResult, ProviderDecl};
use tokio::sync::RwLock;

use crate::client::{ProviderClient, ProviderRpc};
use crate::error::ProviderError;
use crate::protocol::ProviderCapabilities;

/// Registry of named provider clients. At most one client is ever
/// registered per name; starting an already-running name is a no-op.
/// Generic over [`ProviderRpc`] so executor tests can register an
/// in-memory fake instead of a real child process.
#[derive(Default)]
pub struct ProviderManager {
    clients: RwLock<HashMap<String, Arc<dyn ProviderRpc>>>,
    default_provider: RwLock<Option<String>>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns and registers the provider described by `decl`, unless one is
    /// already registered under that name.
    pub async fn start(&self, decl: &ProviderDecl) -> Result<(), ProviderError> {
        if self.clients.read().await.contains_key(&decl.name) {
            return Ok(());
        }
        let client = ProviderClient::start(&decl.command, &decl.args, &decl.env).await?;
        self.register(decl.name.clone(), Arc::new(client), decl.default).await;
        Ok(())
    }

    /// Registers an already-constructed client (real or fake) under `name`,
    /// unless one is already registered there.
    pub async fn register(&self, name: String, client: Arc<dyn ProviderRpc>, default: bool) {
        let mut guard = self.clients.write().await;
        if guard.contains_key(&name) {
            return;
        }
        guard.insert(name.clone(), client);
        drop(guard);
        if default {
            *self.default_provider.write().await = Some(name);
        }
    }

    pub async fn stop(&self, name: &str) -> Result<(), ProviderError> {
        let client = { self.clients.write().await.remove(name) };
        if let Some(client) = client {
            client.stop().await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<(), ProviderError> {
        let clients: Vec<Arc<dyn ProviderRpc>> = {
            let mut guard = self.clients.write().await;
            guard.drain().map(|(_, c)| c).collect()
        };
        for client in clients {
            client.stop().await?;
        }
        Ok(())
    }

    /// Routes a tool call to the named provider, after checking the
    /// provider actually advertised `tool` in its `provider_capabilities`
    /// response. `provider_capabilities` itself is always allowed through,
    /// since it is how capabilities are discovered in the first place.
    pub async fn call(&self, provider_name: &str, tool: &str, request: Value) -> Result<OperationResult, ProviderError> {
        let client = self.get(provider_name).await?;
        if tool != crate::protocol::CAPABILITIES_METHOD && !client.capabilities().tools.iter().any(|t| t == tool) {
            return Err(ProviderError::UnsupportedTool { provider: provider_name.to_string(), tool: tool.to_string() });
        }
        client.call(tool, request).await
    }

    pub async fn get_info(&self, name: &str) -> Result<ProviderCapabilities, ProviderError> {
        let client = self.get(name).await?;
        Ok(client.capabilities().clone())
    }

    pub async fn default_provider_name(&self) -> Option<String> {
        self.default_provider.read().await.clone()
    }

    async fn get(&self, name: &str) -> Result<Arc<dyn ProviderRpc>, ProviderError> {
        self.clients
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }
}
