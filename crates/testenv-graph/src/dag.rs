use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use testenv_domain::{ResourceKind, ResourceRef, TestEnvSpec};
use testenv_template::extract_template_refs;

use crate::error::GraphError;

/// One declared resource plus a reference to its spec, generic enough to
/// feed `extract_template_refs` regardless of kind.
struct Declared<'a> {
    reference: ResourceRef,
    literal_deps: Vec<ResourceRef>,
    template_refs_source: TemplateSource<'a>,
}

enum TemplateSource<'a> {
    Image(&'a testenv_domain::ImageDecl),
    Key(&'a testenv_domain::KeyDecl),
    Network(&'a testenv_domain::NetworkDecl),
    Vm(&'a testenv_domain::VmDecl),
}

fn is_literal(field: &str) -> bool {
    !field.contains("{{")
}

fn collect_declared(spec: &TestEnvSpec) -> Vec<Declared<'_>> {
    let mut out = Vec::new();
    for image in &spec.images {
        out.push(Declared {
            reference: ResourceRef::new(ResourceKind::Image, &image.name),
            literal_deps: Vec::new(),
            template_refs_source: TemplateSource::Image(image),
        });
    }
    for key in &spec.keys {
        out.push(Declared {
            reference: ResourceRef::new(ResourceKind::Key, &key.name),
            literal_deps: Vec::new(),
            template_refs_source: TemplateSource::Key(key),
        });
    }
    for network in &spec.networks {
        let mut literal_deps = Vec::new();
        if let Some(attach_to) = &network.attach_to {
            if is_literal(attach_to) {
                literal_deps.push(ResourceRef::new(ResourceKind::Network, attach_to.clone()));
            }
        }
        out.push(Declared {
            reference: ResourceRef::new(ResourceKind::Network, &network.name),
            literal_deps,
            template_refs_source: TemplateSource::Network(network),
        });
    }
    for vm in &spec.vms {
        let mut literal_deps = Vec::new();
        if is_literal(&vm.network) {
            literal_deps.push(ResourceRef::new(ResourceKind::Network, vm.network.clone()));
        }
        out.push(Declared {
            reference: ResourceRef::new(ResourceKind::Vm, &vm.name),
            literal_deps,
            template_refs_source: TemplateSource::Vm(vm),
        });
    }
    out
}

/// Builds the dependency DAG: one node per declared resource (images, keys,
/// networks, vms, in that enumeration order), with outgoing edges
/// installed from every template reference plus the literal cross-resource
/// fields (`network.attachTo`, `vm.network`). Runs tri-colour DFS cycle
/// detection before returning.
pub fn build_dag(spec: &TestEnvSpec) -> Result<DiGraph<ResourceRef, ()>, GraphError> {
    let declared = collect_declared(spec);
    let mut graph: DiGraph<ResourceRef, ()> = DiGraph::new();
    let mut nodes: HashMap<ResourceRef, NodeIndex> = HashMap::new();
    for d in &declared {
        let idx = graph.add_node(d.reference.clone());
        nodes.insert(d.reference.clone(), idx);
    }

    let mut installed_edges: std::collections::HashSet<(NodeIndex, NodeIndex)> = std::collections::HashSet::new();

    for d in &declared {
        let from_idx = nodes[&d.reference];

        let mut targets = d.literal_deps.clone();
        let template_refs = match d.template_refs_source {
            TemplateSource::Image(v) => extract_template_refs(v).expect("image decl always serialises"),
            TemplateSource::Key(v) => extract_template_refs(v).expect("key decl always serialises"),
            TemplateSource::Network(v) => extract_template_refs(v).expect("network decl always serialises"),
            TemplateSource::Vm(v) => extract_template_refs(v).expect("vm decl always serialises"),
        };
        for tref in &template_refs {
            if let (Some(kind), Some(name)) = (tref.resource_kind(), tref.resource_name()) {
                targets.push(ResourceRef::new(kind, name));
            }
        }

        for target in targets {
            let Some(&to_idx) = nodes.get(&target) else {
                return Err(GraphError::UndeclaredResource { from: d.reference.clone(), to: target });
            };
            if from_idx == to_idx {
                continue;
            }
            if installed_edges.insert((from_idx, to_idx)) {
                graph.add_edge(from_idx, to_idx, ());
            }
        }
    }

    detect_cycle(&graph)?;
    Ok(graph)
}

/// DFS with tri-state colouring (white/grey/black). A back-edge into a
/// grey node means a cycle.
fn detect_cycle(graph: &DiGraph<ResourceRef, ()>) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let mut colors: HashMap<NodeIndex, Color> = graph.node_indices().map(|i| (i, Color::White)).collect();

    fn visit(
        graph: &DiGraph<ResourceRef, ()>,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
    ) -> Result<(), GraphError> {
        colors.insert(node, Color::Grey);
        for neighbor in graph.neighbors(node) {
            match colors[&neighbor] {
                Color::White => visit(graph, neighbor, colors)?,
                Color::Grey => return Err(GraphError::CycleDetected(graph[neighbor].clone())),
                Color::Black => {}
            }
        }
        colors.insert(node, Color::Black);
        Ok(())
    }

    for node in graph.node_indices() {
        if colors[&node] == Color::White {
            visit(graph, node, &mut colors)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testenv_domain::{KeyDecl, KeyType, NetworkDecl, VmDecl};

    fn spec_with_key_network_vm() -> TestEnvSpec {
        TestEnvSpec {
            keys: vec![KeyDecl { name: "vm-ssh".into(), provider: None, key_type: KeyType::Ed25519, extra: Default::default() }],
            networks: vec![NetworkDecl {
                name: "bridge".into(),
                provider: None,
                cidr: "192.168.100.1/24".into(),
                attach_to: None,
                extra: Default::default(),
            }],
            vms: vec![VmDecl {
                name: "test-vm".into(),
                provider: None,
                memory_mb: 2048,
                vcpus: 2,
                network: "bridge".into(),
                ssh_authorized_keys: "{{ .Keys.vm-ssh.PublicKey }}".into(),
                base_image: None,
                extra: Default::default(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn builds_graph_with_expected_edges() {
        let spec = spec_with_key_network_vm();
        let graph = build_dag(&spec).unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2); // vm -> network (literal), vm -> key (template)
    }

    #[test]
    fn undeclared_reference_is_structural_error() {
        let mut spec = spec_with_key_network_vm();
        spec.vms[0].network = "missing-network".into();
        let err = build_dag(&spec).unwrap_err();
        assert!(matches!(err, GraphError::UndeclaredResource { .. }));
    }

    #[test]
    fn mutual_attach_to_is_a_cycle() {
        let mut spec = TestEnvSpec::default();
        spec.networks.push(NetworkDecl {
            name: "n1".into(),
            provider: None,
            cidr: "10.0.1.1/24".into(),
            attach_to: Some("n2".into()),
            extra: Default::default(),
        });
        spec.networks.push(NetworkDecl {
            name: "n2".into(),
            provider: None,
            cidr: "10.0.2.1/24".into(),
            attach_to: Some("n1".into()),
            extra: Default::default(),
        });
        let err = build_dag(&spec).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected(_)));
    }

    #[test]
    fn duplicate_edge_is_a_no_op() {
        let mut spec = TestEnvSpec::default();
        spec.keys.push(KeyDecl { name: "k1".into(), provider: None, key_type: KeyType::Rsa, extra: Default::default() });
        let mut extra = serde_json::Map::new();
        extra.insert("comment".into(), serde_json::json!("{{ .Keys.k1.PublicKey }}"));
        spec.networks.push(NetworkDecl {
            name: "n1".into(),
            provider: None,
            cidr: "{{ .Keys.k1.PublicKey }}".into(),
            attach_to: None,
            extra,
        });
        // Both `cidr` and `extra.comment` reference key k1 — one edge, not two.
        let graph = build_dag(&spec).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }
}
