use std::collections::HashMap;

use testenv_domain::{DomainError, ResourceKind, ResourceRef, TestEnvSpec};
use testenv_template::{parse_expr, TemplateReference};

use crate::error::SpecError;

/// One templated field found during early validation: the resource it
/// belongs to, a dotted JSON-pointer-style path within that resource's
/// decl, and the reference it resolves to once rendered.
#[derive(Debug, Clone)]
pub struct TemplatedField {
    pub field_path: String,
    pub reference: TemplateReference,
}

/// `resource -> every templated field found in its decl`, built once during
/// early validation and consulted by the Executor before each render.
pub type TemplatedFields = HashMap<ResourceRef, Vec<TemplatedField>>;

/// Structural checks that can run before any resource exists: at least one
/// provider, unique names within each kind, non-empty names, provider
/// references resolve, positive memory/vcpu counts, and every template
/// target names a declared resource of the matching kind. Returns the
/// templated-field registry the Executor consults later for late
/// validation.
pub fn early_validate(spec: &TestEnvSpec) -> Result<TemplatedFields, SpecError> {
    if spec.providers.is_empty() {
        return Err(SpecError::NoProvider);
    }

    let provider_names: Vec<&str> = spec.provider_names().collect();
    check_unique_names(spec)?;
    let declared = declared_refs(spec);

    check_provider_ref(ResourceKind::Image, "", spec.default_provider.as_deref(), &provider_names)?;

    for image in &spec.images {
        check_name(ResourceKind::Image, &image.name)?;
        check_provider_ref(ResourceKind::Image, &image.name, image.provider.as_deref(), &provider_names)?;
    }
    for key in &spec.keys {
        check_name(ResourceKind::Key, &key.name)?;
        check_provider_ref(ResourceKind::Key, &key.name, key.provider.as_deref(), &provider_names)?;
    }
    for network in &spec.networks {
        check_name(ResourceKind::Network, &network.name)?;
        check_provider_ref(ResourceKind::Network, &network.name, network.provider.as_deref(), &provider_names)?;
    }
    for vm in &spec.vms {
        check_name(ResourceKind::Vm, &vm.name)?;
        check_provider_ref(ResourceKind::Vm, &vm.name, vm.provider.as_deref(), &provider_names)?;
        if vm.memory_mb <= 0 {
            return Err(SpecError::NonPositive { name: vm.name.clone(), field: "memoryMb", value: vm.memory_mb });
        }
        if vm.vcpus <= 0 {
            return Err(SpecError::NonPositive { name: vm.name.clone(), field: "vcpus", value: vm.vcpus });
        }
    }

    let mut fields: TemplatedFields = HashMap::new();
    for image in &spec.images {
        let reference = ResourceRef::new(ResourceKind::Image, &image.name);
        let value = serde_json::to_value(image).expect("image decl always serialises");
        collect(&reference, &value, String::new(), &declared, &mut fields)?;
    }
    for key in &spec.keys {
        let reference = ResourceRef::new(ResourceKind::Key, &key.name);
        let value = serde_json::to_value(key).expect("key decl always serialises");
        collect(&reference, &value, String::new(), &declared, &mut fields)?;
    }
    for network in &spec.networks {
        let reference = ResourceRef::new(ResourceKind::Network, &network.name);
        let value = serde_json::to_value(network).expect("network decl always serialises");
        collect(&reference, &value, String::new(), &declared, &mut fields)?;
    }
    for vm in &spec.vms {
        let reference = ResourceRef::new(ResourceKind::Vm, &vm.name);
        let value = serde_json::to_value(vm).expect("vm decl always serialises");
        collect(&reference, &value, String::new(), &declared, &mut fields)?;
    }

    Ok(fields)
}

/// Re-validates a network's `cidr` once it holds a concrete (no longer
/// templated) value.
pub fn validate_rendered_network(name: &str, cidr: &str) -> Result<(), SpecError> {
    if parse_cidr(cidr).is_none() {
        return Err(SpecError::InvalidCidr { name: name.to_string(), cidr: cidr.to_string() });
    }
    Ok(())
}

fn parse_cidr(s: &str) -> Option<(std::net::Ipv4Addr, u8)> {
    let (addr, prefix) = s.split_once('/')?;
    let addr: std::net::Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

fn check_name(kind: ResourceKind, name: &str) -> Result<(), SpecError> {
    if name.trim().is_empty() {
        return Err(SpecError::EmptyName { kind, name: name.to_string() });
    }
    Ok(())
}

fn check_provider_ref(kind: ResourceKind, name: &str, provider: Option<&str>, declared: &[&str]) -> Result<(), SpecError> {
    if let Some(p) = provider {
        if !declared.contains(&p) {
            return Err(SpecError::UnknownProvider { kind, name: name.to_string(), provider: p.to_string() });
        }
    }
    Ok(())
}

/// Rejects a spec that declares the same (kind, name) pair twice. Names
/// are unique within a kind; this must run before any DAG or context work
/// since `ResourceRef` equality ignores `provider` and would otherwise
/// silently collapse duplicates into a single node.
fn check_unique_names(spec: &TestEnvSpec) -> Result<(), SpecError> {
    let mut seen = std::collections::HashSet::new();
    for i in &spec.images {
        let reference = ResourceRef::new(ResourceKind::Image, &i.name);
        if !seen.insert(reference) {
            return Err(DomainError::DuplicateResourceName { kind: ResourceKind::Image.as_str().to_string(), name: i.name.clone() }.into());
        }
    }
    for k in &spec.keys {
        let reference = ResourceRef::new(ResourceKind::Key, &k.name);
        if !seen.insert(reference) {
            return Err(DomainError::DuplicateResourceName { kind: ResourceKind::Key.as_str().to_string(), name: k.name.clone() }.into());
        }
    }
    for n in &spec.networks {
        let reference = ResourceRef::new(ResourceKind::Network, &n.name);
        if !seen.insert(reference) {
            return Err(DomainError::DuplicateResourceName { kind: ResourceKind::Network.as_str().to_string(), name: n.name.clone() }.into());
        }
    }
    for v in &spec.vms {
        let reference = ResourceRef::new(ResourceKind::Vm, &v.name);
        if !seen.insert(reference) {
            return Err(DomainError::DuplicateResourceName { kind: ResourceKind::Vm.as_str().to_string(), name: v.name.clone() }.into());
        }
    }
    Ok(())
}

fn declared_refs(spec: &TestEnvSpec) -> std::collections::HashSet<ResourceRef> {
    let mut out = std::collections::HashSet::new();
    for i in &spec.images {
        out.insert(ResourceRef::new(ResourceKind::Image, &i.name));
    }
    for k in &spec.keys {
        out.insert(ResourceRef::new(ResourceKind::Key, &k.name));
    }
    for n in &spec.networks {
        out.insert(ResourceRef::new(ResourceKind::Network, &n.name));
    }
    for v in &spec.vms {
        out.insert(ResourceRef::new(ResourceKind::Vm, &v.name));
    }
    out
}

fn collect(
    owner: &ResourceRef,
    value: &serde_json::Value,
    path: String,
    declared: &std::collections::HashSet<ResourceRef>,
    out: &mut TemplatedFields,
) -> Result<(), SpecError> {
    match value {
        serde_json::Value::String(s) => {
            for span in template_spans(s) {
                let Some(reference) = parse_expr(&span) else { continue };
                if let (Some(kind), Some(name)) = (reference.resource_kind(), reference.resource_name()) {
                    let target = ResourceRef::new(kind, name);
                    if !declared.contains(&target) {
                        return Err(SpecError::UndeclaredTemplateTarget {
                            kind: owner.kind,
                            name: owner.name.clone(),
                            field_path: path.clone(),
                            target_kind: kind,
                            target_name: name.to_string(),
                        });
                    }
                }
                out.entry(owner.clone()).or_default().push(TemplatedField { field_path: path.clone(), reference });
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect(owner, item, format!("{path}[{i}]"), declared, out)?;
            }
            Ok(())
        }
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let child_path = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                collect(owner, v, child_path, declared, out)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Finds every `{{ ... }}` span in `s` and returns its trimmed inner text.
fn template_spans(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        out.push(after[..end].trim().to_string());
        rest = &after[end + 2..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use testenv_domain::{KeyDecl, KeyType, NetworkDecl, ProviderDecl, VmDecl};

    fn base_spec() -> TestEnvSpec {
        TestEnvSpec {
            providers: vec![ProviderDecl { name: "local".into(), command: "p".into(), args: vec![], env: Default::default(), default: true }],
            ..Default::default()
        }
    }

    #[test]
    fn rejects_spec_with_no_providers() {
        let spec = TestEnvSpec::default();
        assert!(matches!(early_validate(&spec), Err(SpecError::NoProvider)));
    }

    #[test]
    fn rejects_non_positive_memory() {
        let mut spec = base_spec();
        spec.vms.push(VmDecl {
            name: "vm1".into(),
            provider: None,
            memory_mb: 0,
            vcpus: 1,
            network: "net".into(),
            ssh_authorized_keys: String::new(),
            base_image: None,
            extra: Default::default(),
        });
        assert!(matches!(early_validate(&spec), Err(SpecError::NonPositive { .. })));
    }

    #[test]
    fn rejects_duplicate_name_within_a_kind() {
        let mut spec = base_spec();
        for _ in 0..2 {
            spec.keys.push(KeyDecl { name: "dup".into(), provider: None, key_type: KeyType::Ed25519, extra: Default::default() });
        }
        assert!(matches!(early_validate(&spec), Err(SpecError::Domain(DomainError::DuplicateResourceName { .. }))));
    }

    #[test]
    fn collects_templated_fields_and_rejects_undeclared_targets() {
        let mut spec = base_spec();
        spec.keys.push(KeyDecl { name: "vm-ssh".into(), provider: None, key_type: KeyType::Ed25519, extra: Default::default() });
        spec.networks.push(NetworkDecl {
            name: "bridge".into(),
            provider: None,
            cidr: "10.0.0.1/24".into(),
            attach_to: None,
            extra: Default::default(),
        });
        spec.vms.push(VmDecl {
            name: "vm1".into(),
            provider: None,
            memory_mb: 1024,
            vcpus: 1,
            network: "bridge".into(),
            ssh_authorized_keys: "{{ .Keys.vm-ssh.PublicKey }}".into(),
            base_image: None,
            extra: Default::default(),
        });
        let fields = early_validate(&spec).unwrap();
        let vm_ref = ResourceRef::new(ResourceKind::Vm, "vm1");
        assert_eq!(fields[&vm_ref].len(), 1);
        assert_eq!(fields[&vm_ref][0].field_path, "sshAuthorizedKeys");
    }

    #[test]
    fn undeclared_template_target_is_an_error() {
        let mut spec = base_spec();
        spec.vms.push(VmDecl {
            name: "vm1".into(),
            provider: None,
            memory_mb: 1024,
            vcpus: 1,
            network: "bridge".into(),
            ssh_authorized_keys: "{{ .Keys.nope.PublicKey }}".into(),
            base_image: None,
            extra: Default::default(),
        });
        let err = early_validate(&spec).unwrap_err();
        assert!(matches!(err, SpecError::UndeclaredTemplateTarget { .. }));
    }

    #[test]
    fn rendered_cidr_must_parse() {
        assert!(validate_rendered_network("n", "10.0.0.1/24").is_ok());
        assert!(validate_rendered_network("n", "not-a-cidr").is_err());
    }
}
