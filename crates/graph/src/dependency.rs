use std::collections::{BTreeSet, HashMap, VecDeque};

use hive_core::{AlgorithmId, AlgorithmNode, ConfigurationError, DataKey};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

/// Per-slot view the graph needs to answer readiness questions.
///
/// Implemented by the scheduler over one slot's execution states.
pub trait ReadinessView {
    /// Whether `key` has been produced in this slot.
    fn is_available(&self, key: &DataKey) -> bool;

    /// Whether the node is still waiting for its inputs in this slot.
    fn is_not_ready(&self, id: AlgorithmId) -> bool;
}

/// Summary numbers for startup logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub keys: usize,
    pub roots: usize,
    /// Number of nodes on the longest dependency chain.
    pub depth: usize,
}

/// Data-flow graph over the configured algorithm nodes.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<AlgorithmNode>,
    index: HashMap<String, AlgorithmId>,
    /// Key → its single producer, in declaration order.
    producers: IndexMap<DataKey, AlgorithmId>,
    /// Key → consumers sorted by id.
    consumers: IndexMap<DataKey, Vec<AlgorithmId>>,
    upstream: Vec<Vec<AlgorithmId>>,
    downstream: Vec<Vec<AlgorithmId>>,
    roots: Vec<AlgorithmId>,
    topo_order: Vec<AlgorithmId>,
}

impl DependencyGraph {
    /// Build the graph, enforcing one producer per key, a producer for
    /// every input, and acyclicity.
    pub fn build(nodes: Vec<AlgorithmNode>) -> Result<Self, ConfigurationError> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), AlgorithmId(i)).is_some() {
                return Err(ConfigurationError::DuplicateAlgorithm(node.name.clone()));
            }
        }

        let mut producers: IndexMap<DataKey, AlgorithmId> = IndexMap::new();
        for (i, node) in nodes.iter().enumerate() {
            for key in &node.outputs {
                if let Some(&first) = producers.get(key) {
                    return Err(ConfigurationError::AmbiguousProducer {
                        key: key.clone(),
                        first: nodes[first.index()].name.clone(),
                        second: node.name.clone(),
                    });
                }
                producers.insert(key.clone(), AlgorithmId(i));
            }
        }

        let mut consumers: IndexMap<DataKey, Vec<AlgorithmId>> = IndexMap::new();
        let mut upstream_sets = vec![BTreeSet::new(); nodes.len()];
        let mut downstream_sets = vec![BTreeSet::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            let id = AlgorithmId(i);
            for key in &node.inputs {
                let producer = producers.get(key).copied().ok_or_else(|| {
                    ConfigurationError::MissingProducer {
                        algorithm: node.name.clone(),
                        key: key.clone(),
                    }
                })?;
                let list = consumers.entry(key.clone()).or_default();
                if list.last() != Some(&id) {
                    list.push(id);
                }
                upstream_sets[i].insert(producer);
                downstream_sets[producer.index()].insert(id);
            }
        }

        let upstream: Vec<Vec<AlgorithmId>> = upstream_sets
            .into_iter()
            .map(|s| s.into_iter().collect())
            .collect();
        let downstream: Vec<Vec<AlgorithmId>> = downstream_sets
            .into_iter()
            .map(|s| s.into_iter().collect())
            .collect();

        let topo_order = topological_sort(&nodes, &upstream, &downstream)?;
        let roots = (0..nodes.len())
            .filter(|&i| nodes[i].inputs.is_empty())
            .map(AlgorithmId)
            .collect();

        let graph = Self {
            nodes,
            index,
            producers,
            consumers,
            upstream,
            downstream,
            roots,
            topo_order,
        };
        debug!(stats = ?graph.stats(), "dependency graph built");
        Ok(graph)
    }

    // ── Lookup ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[AlgorithmNode] {
        &self.nodes
    }

    /// # Panics
    ///
    /// If `id` was not issued by this graph.
    pub fn node(&self, id: AlgorithmId) -> &AlgorithmNode {
        &self.nodes[id.index()]
    }

    pub fn name(&self, id: AlgorithmId) -> &str {
        &self.nodes[id.index()].name
    }

    pub fn id_of(&self, name: &str) -> Option<AlgorithmId> {
        self.index.get(name).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = AlgorithmId> + '_ {
        (0..self.nodes.len()).map(AlgorithmId)
    }

    pub fn producer_of(&self, key: &DataKey) -> Option<AlgorithmId> {
        self.producers.get(key).copied()
    }

    pub fn consumers_of(&self, key: &DataKey) -> &[AlgorithmId] {
        self.consumers.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct producers of the node's inputs.
    pub fn upstream(&self, id: AlgorithmId) -> &[AlgorithmId] {
        &self.upstream[id.index()]
    }

    /// Direct consumers of the node's outputs.
    pub fn downstream(&self, id: AlgorithmId) -> &[AlgorithmId] {
        &self.downstream[id.index()]
    }

    /// Nodes without inputs; ready as soon as an event is admitted.
    pub fn roots(&self) -> &[AlgorithmId] {
        &self.roots
    }

    /// Producers always precede their consumers.
    pub fn topological_order(&self) -> &[AlgorithmId] {
        &self.topo_order
    }

    pub(crate) fn producers(&self) -> &IndexMap<DataKey, AlgorithmId> {
        &self.producers
    }

    // ── Readiness ───────────────────────────────────────────────────

    /// Consumers of `produced` that are still `NotReady` in the slot and
    /// now have every input available, in ascending id order.
    ///
    /// Only consumers of this one key are examined.
    pub fn ready_consumers(&self, produced: &DataKey, view: &dyn ReadinessView) -> Vec<AlgorithmId> {
        self.consumers_of(produced)
            .iter()
            .copied()
            .filter(|&id| view.is_not_ready(id) && self.inputs_available(id, view))
            .collect()
    }

    /// Whether every declared input of the node is available in the view.
    pub fn inputs_available(&self, id: AlgorithmId, view: &dyn ReadinessView) -> bool {
        self.nodes[id.index()]
            .inputs
            .iter()
            .all(|key| view.is_available(key))
    }

    /// Every node reachable downstream of `id`, excluding `id`, sorted.
    pub fn downstream_closure(&self, id: AlgorithmId) -> Vec<AlgorithmId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<AlgorithmId> = self.downstream(id).iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(self.downstream(next).iter().copied());
            }
        }
        seen.into_iter().collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut depth = vec![0usize; self.nodes.len()];
        for &id in &self.topo_order {
            let d = self
                .upstream(id)
                .iter()
                .map(|u| depth[u.index()])
                .max()
                .unwrap_or(0);
            depth[id.index()] = d + 1;
        }
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.downstream.iter().map(Vec::len).sum(),
            keys: self.producers.len(),
            roots: self.roots.len(),
            depth: depth.into_iter().max().unwrap_or(0),
        }
    }
}

/// Kahn's algorithm over the node edges. Ties resolve in id order so the
/// result is stable for a given declaration order.
fn topological_sort(
    nodes: &[AlgorithmNode],
    upstream: &[Vec<AlgorithmId>],
    downstream: &[Vec<AlgorithmId>],
) -> Result<Vec<AlgorithmId>, ConfigurationError> {
    let mut in_degree: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut queue: VecDeque<AlgorithmId> = (0..nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .map(AlgorithmId)
        .collect();

    let mut sorted = Vec::with_capacity(nodes.len());
    while let Some(node) = queue.pop_front() {
        sorted.push(node);
        for &dep in &downstream[node.index()] {
            in_degree[dep.index()] -= 1;
            if in_degree[dep.index()] == 0 {
                queue.push_back(dep);
            }
        }
    }

    if sorted.len() != nodes.len() {
        let remaining = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg > 0)
            .map(|(i, _)| nodes[i].name.clone())
            .collect();
        return Err(ConfigurationError::Cycle(remaining));
    }

    Ok(sorted)
}
