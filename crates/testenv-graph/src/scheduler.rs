use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use testenv_domain::{ExecutionPlan, ResourceRef};

/// Produces execution phases via Kahn's algorithm. A node is ready once
/// every resource it depends on (its outgoing edges in the dependency
/// graph built by [`crate::dag::build_dag`]) has already been placed in an
/// earlier phase. Each step collects every currently-ready node into one
/// phase, then "removes" them by decrementing the remaining-dependency
/// count of whichever nodes pointed at them.
///
/// Assumes `graph` is acyclic — callers run this only after
/// [`crate::dag::build_dag`] has returned successfully.
pub fn topological_phases(graph: &DiGraph<ResourceRef, ()>) -> ExecutionPlan {
    let mut remaining: HashMap<NodeIndex, usize> =
        graph.node_indices().map(|n| (n, graph.neighbors(n).count())).collect();

    let mut done: HashSet<NodeIndex> = HashSet::new();
    let mut phases: ExecutionPlan = Vec::new();

    while done.len() < graph.node_count() {
        let ready: Vec<NodeIndex> =
            remaining.iter().filter(|(n, &count)| count == 0 && !done.contains(n)).map(|(n, _)| *n).collect();

        if ready.is_empty() {
            // Acyclic precondition violated by the caller; stop rather than loop forever.
            break;
        }

        let mut phase: Vec<ResourceRef> = ready.iter().map(|&n| graph[n].clone()).collect();
        phase.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        phases.push(phase);

        for &n in &ready {
            done.insert(n);
            remaining.remove(&n);
        }
        for &n in &ready {
            for dependent in graph.neighbors_directed(n, petgraph::Direction::Incoming) {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                }
            }
        }
    }

    phases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::build_dag;
    use testenv_domain::{KeyDecl, KeyType, NetworkDecl, ResourceKind, TestEnvSpec, VmDecl};

    #[test]
    fn single_resource_is_one_phase() {
        let mut spec = TestEnvSpec::default();
        spec.keys.push(KeyDecl { name: "k1".into(), provider: None, key_type: KeyType::Ed25519, extra: Default::default() });
        let graph = build_dag(&spec).unwrap();
        let phases = topological_phases(&graph);
        assert_eq!(phases, vec![vec![ResourceRef::new(ResourceKind::Key, "k1")]]);
    }

    #[test]
    fn independent_resources_share_a_phase() {
        let mut spec = TestEnvSpec::default();
        for name in ["k1", "k2", "k3"] {
            spec.keys.push(KeyDecl { name: name.into(), provider: None, key_type: KeyType::Ed25519, extra: Default::default() });
        }
        let graph = build_dag(&spec).unwrap();
        let phases = topological_phases(&graph);
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].len(), 3);
    }

    #[test]
    fn dependency_forces_later_phase() {
        let mut spec = TestEnvSpec::default();
        spec.keys.push(KeyDecl { name: "vm-ssh".into(), provider: None, key_type: KeyType::Ed25519, extra: Default::default() });
        spec.networks.push(NetworkDecl {
            name: "bridge".into(),
            provider: None,
            cidr: "192.168.100.1/24".into(),
            attach_to: None,
            extra: Default::default(),
        });
        spec.vms.push(VmDecl {
            name: "test-vm".into(),
            provider: None,
            memory_mb: 2048,
            vcpus: 2,
            network: "bridge".into(),
            ssh_authorized_keys: "{{ .Keys.vm-ssh.PublicKey }}".into(),
            base_image: None,
            extra: Default::default(),
        });
        let graph = build_dag(&spec).unwrap();
        let phases = topological_phases(&graph);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].len(), 2); // key + network, order unspecified
        assert_eq!(phases[1], vec![ResourceRef::new(ResourceKind::Vm, "test-vm")]);
    }

    #[test]
    fn empty_graph_yields_empty_phase_list() {
        let spec = TestEnvSpec::default();
        let graph = build_dag(&spec).unwrap();
        assert!(topological_phases(&graph).is_empty());
    }
}
