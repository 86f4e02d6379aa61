use testenv_domain::{
    ImageContextEntry, KeyContextEntry, NetworkContextEntry, ResourceKind, ResourceRef,
    TemplateContext, TestEnvSpec, VmContextEntry,
};

/// Finds the declared sub-spec for `reference` and serialises it to a
/// `Value` the Renderer can walk, along with its declared provider
/// override (if any).
pub fn sub_spec(spec: &TestEnvSpec, reference: &ResourceRef) -> Option<(serde_json::Value, Option<String>)> {
    match reference.kind {
        ResourceKind::Image => spec
            .images
            .iter()
            .find(|d| d.name == reference.name)
            .map(|d| (serde_json::to_value(d).expect("image decl always serialises"), d.provider.clone())),
        ResourceKind::Key => spec
            .keys
            .iter()
            .find(|d| d.name == reference.name)
            .map(|d| (serde_json::to_value(d).expect("key decl always serialises"), d.provider.clone())),
        ResourceKind::Network => spec
            .networks
            .iter()
            .find(|d| d.name == reference.name)
            .map(|d| (serde_json::to_value(d).expect("network decl always serialises"), d.provider.clone())),
        ResourceKind::Vm => spec
            .vms
            .iter()
            .find(|d| d.name == reference.name)
            .map(|d| (serde_json::to_value(d).expect("vm decl always serialises"), d.provider.clone())),
    }
}

/// Resolves the provider name to use for a resource: its own declared
/// provider, then the spec's `defaultProvider`, then the first provider
/// declared `default: true`.
pub fn resolve_provider(resource_provider: Option<&str>, spec: &TestEnvSpec) -> Option<String> {
    resource_provider
        .map(str::to_string)
        .or_else(|| spec.default_provider_name().map(str::to_string))
}

/// The provider tool name for a create/delete/get/list call against
/// `kind`. Images never reach a provider — the well-known image
/// registry/cache is an external collaborator out of scope here, so image
/// resolution happens locally in the executor instead.
pub fn tool_for(kind: ResourceKind, action: &str) -> Option<String> {
    match kind {
        ResourceKind::Image => None,
        ResourceKind::Key => Some(testenv_provider::tool_method("key", action)),
        ResourceKind::Network => Some(testenv_provider::tool_method("network", action)),
        ResourceKind::Vm => Some(testenv_provider::tool_method("vm", action)),
    }
}

/// Merges a provider-returned (or, for images, locally-derived) resource
/// map into the in-memory [`TemplateContext`] so later phases can
/// reference it.
pub fn merge_into_context(ctx: &mut TemplateContext, reference: &ResourceRef, resource: &serde_json::Value) {
    match reference.kind {
        ResourceKind::Image => {
            let entry: ImageContextEntry = serde_json::from_value(resource.clone()).unwrap_or_default();
            ctx.images.insert(reference.name.clone(), entry);
        }
        ResourceKind::Key => {
            let entry: KeyContextEntry = serde_json::from_value(resource.clone()).unwrap_or_default();
            ctx.keys.insert(reference.name.clone(), entry);
        }
        ResourceKind::Network => {
            let entry: NetworkContextEntry = serde_json::from_value(resource.clone()).unwrap_or_default();
            ctx.networks.insert(reference.name.clone(), entry);
        }
        ResourceKind::Vm => {
            let entry: VmContextEntry = serde_json::from_value(resource.clone()).unwrap_or_default();
            ctx.vms.insert(reference.name.clone(), entry);
        }
    }
}
