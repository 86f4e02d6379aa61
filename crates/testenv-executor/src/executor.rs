use std::sync::Arc;

use chrono::Utc;
use testenv_domain::{
    resource_prefix, subnet_octet, CreateInput, DeleteInput, EnvironmentRecord, EnvironmentStatus,
    ErrorRecord, Operation, ResourceKind, ResourceRef, ResourceStatus, TemplateContext,
    TestEnvArtifact, TestEnvSpec,
};
use testenv_graph::build_dag;
use testenv_provider::ProviderManager;
use testenv_spec::{early_validate, parse, validate_rendered_network};
use testenv_store::StateStore;
use testenv_template::render;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::dispatch::{merge_into_context, resolve_provider, sub_spec, tool_for};
use crate::error::ExecutorError;

/// Shared mutable state a phase's resource tasks merge into under the
/// single Executor mutex.
type SharedState = Arc<Mutex<(EnvironmentRecord, TemplateContext)>>;

/// Drives ExecuteCreate/ExecuteDelete/Rollback against a Provider Manager
/// and a State Store, per environment.
pub struct Executor {
    store: Arc<dyn StateStore>,
    providers: Arc<ProviderManager>,
    config: EngineConfig,
}

impl Executor {
    pub fn new(store: Arc<dyn StateStore>, providers: Arc<ProviderManager>, config: EngineConfig) -> Self {
        Executor { store, providers, config }
    }

    pub async fn create(&self, input: CreateInput, cancel: CancellationToken) -> Result<TestEnvArtifact, ExecutorError> {
        let now = Utc::now();
        let spec = parse(&input.spec)?;
        // The registry itself is consulted during early validation only;
        // late validation re-checks concrete shape (e.g. rendered CIDRs)
        // per resource kind once the provider call is about to happen.
        let _templated_fields = early_validate(&spec)?;
        let graph = build_dag(&spec)?;
        let phases = testenv_graph::topological_phases(&graph);

        for decl in &spec.providers {
            self.providers.start(decl).await?;
        }

        let artifact_dir = format!("{}/{}", input.tmp_dir.trim_end_matches('/'), input.test_id);
        let mut record = EnvironmentRecord::new(input.test_id.clone(), input.stage.clone(), input.spec.clone(), artifact_dir, now);
        record.execution_plan = phases.clone();
        record.status = EnvironmentStatus::Creating;
        for phase in &phases {
            for reference in phase {
                record.upsert_pending(reference.clone(), now);
            }
        }
        self.store.save(&record).await?;

        let context = TemplateContext::new(input.env.clone(), spec.default_base_image.clone());
        let state: SharedState = Arc::new(Mutex::new((record, context)));

        let mut failure_count = 0usize;
        for phase in &phases {
            if phase.is_empty() {
                continue;
            }
            if cancel.is_cancelled() {
                self.cancel_phase(&state, phase, Utc::now()).await;
                failure_count += phase.len();
                break;
            }

            let context_snapshot = { state.lock().await.1.clone() };
            let mut tasks = Vec::with_capacity(phase.len());
            for reference in phase.clone() {
                let spec = spec.clone();
                let state = state.clone();
                let providers = self.providers.clone();
                let store = self.store.clone();
                let cancel = cancel.clone();
                let context_snapshot = context_snapshot.clone();
                let test_id = input.test_id.clone();
                let image_cache_dir = self.config.image_cache_dir.clone();
                tasks.push(tokio::spawn(async move {
                    create_one(reference, &spec, &context_snapshot, &state, &providers, &store, &cancel, &test_id, &image_cache_dir).await
                }));
            }

            let mut phase_failed = false;
            for task in tasks {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => phase_failed = true,
                    Err(join_err) => {
                        warn!(error = %join_err, "resource task panicked");
                        phase_failed = true;
                    }
                }
            }

            if phase_failed {
                failure_count += 1;
                break;
            }
        }

        let mut guard = state.lock().await;
        if failure_count > 0 {
            guard.0.status = EnvironmentStatus::Failed;
            guard.0.touch(Utc::now());
            self.store.save(&guard.0).await?;
            drop(guard);

            if self.config.cleanup_on_failure {
                if let Err(e) = self.rollback(&input.test_id).await {
                    warn!(error = %e, test_id = %input.test_id, "rollback after failed create also failed");
                }
            }
            return Err(ExecutorError::CreateFailed(failure_count));
        }

        guard.0.status = EnvironmentStatus::Ready;
        guard.0.touch(Utc::now());
        self.store.save(&guard.0).await?;
        let artifact = artifact_from(&guard.0, &input);
        Ok(artifact)
    }

    pub async fn delete(&self, input: DeleteInput, cancel: CancellationToken) -> Result<(), ExecutorError> {
        let Some(mut record) = self.store.load(&input.test_id).await? else {
            return Ok(());
        };
        record.status = EnvironmentStatus::Destroying;
        self.store.save(&record).await?;

        let errors = self
            .teardown(&mut record, &cancel, |status| !matches!(status, ResourceStatus::Destroyed))
            .await?;

        if errors.is_empty() {
            self.store.delete(&input.test_id).await?;
            Ok(())
        } else {
            record.status = EnvironmentStatus::Failed;
            record.errors.extend(errors.clone());
            record.touch(Utc::now());
            self.store.save(&record).await?;
            Err(ExecutorError::DeleteIncomplete(errors.len()))
        }
    }

    async fn rollback(&self, test_id: &str) -> Result<(), ExecutorError> {
        let Some(mut record) = self.store.load(test_id).await? else {
            return Ok(());
        };
        record.status = EnvironmentStatus::Destroying;
        self.store.save(&record).await?;

        let errors = self
            .teardown(&mut record, &CancellationToken::new(), |status| {
                matches!(status, ResourceStatus::Creating | ResourceStatus::Ready | ResourceStatus::Failed)
            })
            .await?;

        record.status = if errors.is_empty() { EnvironmentStatus::Destroyed } else { EnvironmentStatus::Failed };
        record.errors.extend(errors);
        record.touch(Utc::now());
        self.store.save(&record).await?;
        Ok(())
    }

    /// Shared teardown walk used by both `delete` and `rollback`: reverses
    /// the persisted execution plan and tears down eligible resources
    /// phase-by-phase, in parallel within a phase, saving progress after
    /// each phase.
    async fn teardown(
        &self,
        record: &mut EnvironmentRecord,
        cancel: &CancellationToken,
        eligible: impl Fn(ResourceStatus) -> bool,
    ) -> Result<Vec<ErrorRecord>, ExecutorError> {
        let mut errors = Vec::new();
        let mut reversed = record.execution_plan.clone();
        reversed.reverse();

        for phase in &reversed {
            if cancel.is_cancelled() {
                break;
            }
            let mut tasks = Vec::with_capacity(phase.len());
            for reference in phase.clone() {
                let Some(current) = record.resource(&reference) else { continue };
                if !eligible(current.status) {
                    continue;
                }
                let providers = self.providers.clone();
                let provider_name = current.provider.clone();
                tasks.push(tokio::spawn(async move { delete_one(reference, provider_name, &providers).await }));
            }

            for task in tasks {
                match task.await {
                    Ok(Ok(reference)) => {
                        if let Some(state) = record.resource_mut(&reference) {
                            state.mark_destroyed(Utc::now());
                        }
                    }
                    Ok(Err((reference, message))) => {
                        warn!(resource = %reference, error = %message, "teardown failed, continuing best-effort");
                        if let Some(state) = record.resource_mut(&reference) {
                            state.mark_failed(message.clone(), Utc::now());
                        }
                        errors.push(ErrorRecord { resource: reference, operation: Operation::Delete, message, timestamp: Utc::now() });
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "teardown task panicked");
                    }
                }
            }

            record.touch(Utc::now());
            self.store.save(record).await?;
        }

        Ok(errors)
    }

    async fn cancel_phase(&self, state: &SharedState, phase: &[ResourceRef], now: chrono::DateTime<Utc>) {
        let mut guard = state.lock().await;
        for reference in phase {
            if let Some(resource) = guard.0.resource_mut(reference) {
                resource.mark_failed("cancelled".to_string(), now);
            }
        }
    }
}

/// One resource's creation: render, late-validate, resolve provider, call
/// the provider (or resolve locally for images), then merge the outcome
/// into the shared record/context under the Executor mutex.
async fn create_one(
    reference: ResourceRef,
    spec: &TestEnvSpec,
    context: &TemplateContext,
    state: &SharedState,
    providers: &ProviderManager,
    store: &Arc<dyn StateStore>,
    cancel: &CancellationToken,
    test_id: &str,
    image_cache_dir: &std::path::Path,
) -> Result<(), ExecutorError> {
    let outcome = render_and_call(&reference, spec, context, providers, cancel, test_id, image_cache_dir).await;

    let mut guard = state.lock().await;
    let now = Utc::now();
    let result = match outcome {
        Ok((provider_name, resource_value)) => {
            merge_into_context(&mut guard.1, &reference, &resource_value);
            if let Some(resource_state) = guard.0.resource_mut(&reference) {
                let map = resource_value.as_object().cloned().unwrap_or_default();
                resource_state.mark_ready(provider_name.unwrap_or_default(), map, now);
            }
            Ok(())
        }
        Err(e) => {
            if let Some(resource_state) = guard.0.resource_mut(&reference) {
                resource_state.mark_failed(e.to_string(), now);
            }
            guard.0.errors.push(ErrorRecord { resource: reference.clone(), operation: Operation::Create, message: e.to_string(), timestamp: now });
            Err(e)
        }
    };
    guard.0.touch(now);
    store.save(&guard.0).await?;
    result
}

async fn render_and_call(
    reference: &ResourceRef,
    spec: &TestEnvSpec,
    context: &TemplateContext,
    providers: &ProviderManager,
    cancel: &CancellationToken,
    test_id: &str,
    image_cache_dir: &std::path::Path,
) -> Result<(Option<String>, serde_json::Value), ExecutorError> {
    if cancel.is_cancelled() {
        return Err(ExecutorError::Cancelled { reference: reference.clone() });
    }

    let Some((raw, provider_override)) = sub_spec(spec, reference) else {
        return Err(ExecutorError::MissingSubSpec(reference.clone()));
    };

    let mut rendered = render(&raw, context)?;

    if reference.kind == ResourceKind::Network {
        if let Some(cidr) = rendered.get("cidr").and_then(|v| v.as_str()) {
            validate_rendered_network(&reference.name, cidr)?;
        }
    }

    if let Some(obj) = rendered.as_object_mut() {
        obj.insert("resourcePrefix".to_string(), serde_json::json!(resource_prefix(test_id)));
        obj.insert("subnetOctet".to_string(), serde_json::json!(subnet_octet(test_id)));
    }

    if reference.kind == ResourceKind::Image {
        let source = rendered.get("source").and_then(|v| v.as_str()).unwrap_or_default();
        let local_path = image_cache_dir.join(source);
        let result = serde_json::json!({ "localPath": local_path.to_string_lossy() });
        return Ok((None, result));
    }

    let provider_name = resolve_provider(provider_override.as_deref(), spec).ok_or_else(|| ExecutorError::NoProvider(reference.clone()))?;
    let tool = tool_for(reference.kind, "create").expect("non-image kinds always have a create tool");

    info!(resource = %reference, provider = %provider_name, "provisioning resource");
    let result = providers.call(&provider_name, &tool, rendered).await?;
    if !result.success {
        let message = result.error.map(|e| e.message).unwrap_or_else(|| "provider returned failure with no error detail".to_string());
        return Err(ExecutorError::Provider(testenv_provider::ProviderError::Rpc { code: 0, message }));
    }
    Ok((Some(provider_name), result.resource.unwrap_or(serde_json::json!({}))))
}

async fn delete_one(reference: ResourceRef, provider_name: Option<String>, providers: &ProviderManager) -> Result<ResourceRef, (ResourceRef, String)> {
    if reference.kind == ResourceKind::Image {
        return Ok(reference);
    }
    let Some(provider_name) = provider_name else {
        return Ok(reference);
    };
    let tool = tool_for(reference.kind, "delete").expect("non-image kinds always have a delete tool");
    let params = serde_json::json!({ "name": reference.name });
    match providers.call(&provider_name, &tool, params).await {
        Ok(result) if result.success || result.is_not_found() => Ok(reference),
        Ok(result) => {
            let message = result.error.map(|e| e.message).unwrap_or_else(|| "delete failed with no error detail".to_string());
            Err((reference, message))
        }
        Err(e) => Err((reference, e.to_string())),
    }
}

fn artifact_from(record: &EnvironmentRecord, input: &CreateInput) -> TestEnvArtifact {
    let mut artifact = TestEnvArtifact::new(record.id.clone());
    artifact.metadata = input.metadata.clone();
    for resource in &record.resources {
        let uri = TestEnvArtifact::managed_resource_uri(resource.reference.kind.as_str(), &resource.reference.name);
        artifact.managed_resources.push(uri);

        for (field, value) in &resource.result {
            let key = format!("testenv-vm.{}.{}.{}", resource.reference.kind.as_str(), resource.reference.name, field);
            let stringified = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            artifact.metadata.insert(key, stringified);
        }
    }
    artifact
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};
    use testenv_domain::OperationResult;
    use testenv_provider::ProviderCapabilities;
    use testenv_store::FileStateStore;

    struct ScriptedProvider {
        capabilities: ProviderCapabilities,
        calls: AtomicI64,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl testenv_provider::client::ProviderRpc for ScriptedProvider {
        async fn call(&self, method: &str, params: serde_json::Value) -> Result<OperationResult, testenv_provider::ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.as_deref() == Some(method) {
                return Ok(OperationResult::err(testenv_domain::OperationError::new(testenv_domain::ErrorCode::ProviderError, "scripted failure")));
            }
            let name = params.get("name").cloned().unwrap_or(json!("unknown"));
            Ok(OperationResult::ok(json!({ "publicKey": "ssh-ed25519 AAAA", "interfaceName": "veth0", "cidr": params.get("cidr").cloned().unwrap_or(json!("10.0.0.1/24")), "ip": "10.0.0.5", "name": name })))
        }

        fn capabilities(&self) -> &ProviderCapabilities {
            &self.capabilities
        }

        async fn stop(&self) -> Result<(), testenv_provider::ProviderError> {
            Ok(())
        }
    }

    fn scripted(fail_on: Option<&str>) -> Arc<dyn testenv_provider::client::ProviderRpc> {
        Arc::new(ScriptedProvider {
            capabilities: ProviderCapabilities {
                tools: vec![
                    "key_create".into(),
                    "key_delete".into(),
                    "network_create".into(),
                    "network_delete".into(),
                    "vm_create".into(),
                    "vm_delete".into(),
                ],
                resource_kinds: vec!["key".into(), "network".into(), "vm".into()],
            },
            calls: AtomicI64::new(0),
            fail_on: fail_on.map(str::to_string),
        })
    }

    async fn executor_with(fail_on: Option<&str>, dir: &std::path::Path) -> Executor {
        let providers = Arc::new(ProviderManager::new());
        providers.register("local".into(), scripted(fail_on), true).await;
        let store = Arc::new(FileStateStore::new(dir));
        let config = EngineConfig::new(dir);
        Executor::new(store, providers, config)
    }

    fn sample_spec() -> serde_json::Value {
        json!({
            "providers": [{"name": "local", "command": "x", "default": true}],
            "keys": [{"name": "vm-ssh", "keyType": "ed25519"}],
            "networks": [{"name": "bridge", "cidr": "192.168.1.1/24"}],
            "vms": [{"name": "test-vm", "memoryMb": 1024, "vcpus": 1, "network": "bridge", "sshAuthorizedKeys": "{{ .Keys.vm-ssh.PublicKey }}"}],
        })
    }

    #[tokio::test]
    async fn create_succeeds_and_persists_ready_status() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(None, dir.path()).await;
        let input = CreateInput { test_id: "t1".into(), stage: "create".into(), tmp_dir: "/tmp".into(), root_dir: "/tmp".into(), metadata: Default::default(), env: Default::default(), spec: sample_spec() };
        let artifact = executor.create(input, CancellationToken::new()).await.unwrap();
        assert_eq!(artifact.test_id, "t1");
        assert_eq!(artifact.managed_resources.len(), 3);
        assert_eq!(artifact.metadata.get("testenv-vm.vm.test-vm.ip"), Some(&"10.0.0.5".to_string()));
    }

    #[tokio::test]
    async fn create_failure_rolls_back_and_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(Some("vm_create"), dir.path()).await;
        let input = CreateInput { test_id: "t2".into(), stage: "create".into(), tmp_dir: "/tmp".into(), root_dir: "/tmp".into(), metadata: Default::default(), env: Default::default(), spec: sample_spec() };
        let err = executor.create(input, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::CreateFailed(_)));
    }

    #[tokio::test]
    async fn delete_on_missing_environment_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(None, dir.path()).await;
        let input = DeleteInput { test_id: "does-not-exist".into(), ..Default::default() };
        executor.delete(input, CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn delete_after_create_removes_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let executor = executor_with(None, dir.path()).await;
        let create_input = CreateInput { test_id: "t3".into(), stage: "create".into(), tmp_dir: "/tmp".into(), root_dir: "/tmp".into(), metadata: Default::default(), env: Default::default(), spec: sample_spec() };
        executor.create(create_input, CancellationToken::new()).await.unwrap();

        let delete_input = DeleteInput { test_id: "t3".into(), ..Default::default() };
        executor.delete(delete_input, CancellationToken::new()).await.unwrap();

        let store = FileStateStore::new(dir.path());
        assert!(store.load("t3").await.unwrap().is_none());
    }
}
