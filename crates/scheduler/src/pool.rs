//! Algorithm instance manager.
//!
//! Hands out instances honoring each node's [`ResourceClass`] and the
//! named resources it declares. Requests that cannot be served are queued
//! in one FIFO instead of blocking a thread; every `release` returns the
//! queued requests it may have unblocked so the caller can retry them.

use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hive_core::{
    AlgorithmId, AlgorithmNode, HiveError, HiveResult, ResourceClass, SchedulerConfig,
};
use hive_graph::DependencyGraph;
use tracing::{debug, info, warn};

use crate::task::{Algorithm, AlgorithmRegistry};

/// A concrete instance checked out of the pool for one execution.
///
/// Not `Clone`: the only way to hand it back is [`ResourcePool::release`].
pub struct AlgorithmInstance {
    pub(crate) node: AlgorithmId,
    pub(crate) slot: usize,
    pub(crate) index: usize,
    pub(crate) algorithm: Arc<dyn Algorithm>,
}

impl AlgorithmInstance {
    pub fn node(&self) -> AlgorithmId {
        self.node
    }

    /// Slot the instance was acquired for.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Which clone of the node this is (always 0 for single-instance classes).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn algorithm(&self) -> &dyn Algorithm {
        self.algorithm.as_ref()
    }
}

impl fmt::Debug for AlgorithmInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmInstance")
            .field("node", &self.node)
            .field("slot", &self.slot)
            .field("index", &self.index)
            .finish()
    }
}

/// Result of an [`acquire`](ResourcePool::acquire) attempt.
#[derive(Debug)]
pub enum Acquisition {
    Granted(AlgorithmInstance),
    /// No instance or resource available; the request waits in the queue.
    Queued,
}

struct NodeEntry {
    name: String,
    class: ResourceClass,
    capacity: usize,
    instances: Vec<Arc<dyn Algorithm>>,
    /// Indices of idle instances; the last one is handed out next.
    idle: Vec<usize>,
    busy: usize,
    resources: Vec<usize>,
    misses: u64,
}

struct PoolState {
    nodes: Vec<NodeEntry>,
    resource_names: Vec<String>,
    /// Execution currently holding each named resource.
    resource_holders: Vec<Option<(AlgorithmId, usize)>>,
    waiting: VecDeque<(AlgorithmId, usize)>,
    peak_waiting: usize,
    finalized: bool,
}

/// Owns every algorithm instance and all exclusivity locks.
pub struct ResourcePool {
    state: Mutex<PoolState>,
    definitions: Vec<AlgorithmNode>,
    registry: AlgorithmRegistry,
    lazy_clone_creation: bool,
    count_instance_misses: bool,
}

impl ResourcePool {
    /// Create and initialize instances for every node of the graph.
    ///
    /// Cloneable nodes get all their clones up front unless lazy clone
    /// creation is enabled, in which case they start with one.
    pub fn new(
        graph: &DependencyGraph,
        registry: &AlgorithmRegistry,
        config: &SchedulerConfig,
    ) -> HiveResult<Self> {
        let mut resource_index: HashMap<String, usize> = HashMap::new();
        let mut resource_names: Vec<String> = Vec::new();
        let mut nodes = Vec::with_capacity(graph.len());

        for node in graph.nodes() {
            let capacity = node.instance_capacity();
            if node.max_clones > capacity {
                match node.resource_class {
                    ResourceClass::Exclusive => warn!(
                        algorithm = %node.name,
                        max_clones = node.max_clones,
                        "exclusive algorithm limited to a single instance"
                    ),
                    _ => info!(
                        algorithm = %node.name,
                        "max_clones ignored, reentrant algorithms share one instance"
                    ),
                }
            }
            let initial = if config.lazy_clone_creation
                && node.resource_class == ResourceClass::CloneableNonReentrant
            {
                1
            } else {
                capacity
            };

            let mut instances = Vec::with_capacity(capacity);
            for _ in 0..initial {
                instances.push(create_instance(registry, node)?);
            }

            let mut resources = Vec::with_capacity(node.resources.len());
            for name in &node.resources {
                let idx = match resource_index.get(name) {
                    Some(&idx) => idx,
                    None => {
                        resource_names.push(name.clone());
                        resource_index.insert(name.clone(), resource_names.len() - 1);
                        resource_names.len() - 1
                    }
                };
                if !resources.contains(&idx) {
                    resources.push(idx);
                }
            }

            nodes.push(NodeEntry {
                name: node.name.clone(),
                class: node.resource_class,
                capacity,
                idle: (0..instances.len()).rev().collect(),
                instances,
                busy: 0,
                resources,
                misses: 0,
            });
        }

        info!(
            algorithms = nodes.len(),
            instances = nodes.iter().map(|n| n.instances.len()).sum::<usize>(),
            resources = resource_names.len(),
            lazy = config.lazy_clone_creation,
            "resource pool ready"
        );

        Ok(Self {
            state: Mutex::new(PoolState {
                nodes,
                resource_holders: vec![None; resource_names.len()],
                resource_names,
                waiting: VecDeque::new(),
                peak_waiting: 0,
                finalized: false,
            }),
            definitions: graph.nodes().to_vec(),
            registry: registry.clone(),
            lazy_clone_creation: config.lazy_clone_creation,
            count_instance_misses: config.count_instance_misses,
        })
    }

    // ── Acquire / release ───────────────────────────────────────────

    /// Check out an instance of `id` for an execution in `slot`.
    ///
    /// Never blocks: when no instance or named resource is free the
    /// request is queued and `Acquisition::Queued` is returned.
    pub fn acquire(&self, id: AlgorithmId, slot: usize) -> HiveResult<Acquisition> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let entry = st
            .nodes
            .get_mut(id.index())
            .ok_or_else(|| HiveError::UnknownAlgorithm(id.to_string()))?;

        let resources_free = entry
            .resources
            .iter()
            .all(|&r| st.resource_holders[r].is_none());
        if !resources_free {
            enqueue(st, id, slot);
            return Ok(Acquisition::Queued);
        }

        let index = match entry.class {
            ResourceClass::Reentrant => Some(0),
            ResourceClass::CloneableNonReentrant | ResourceClass::Exclusive => {
                match entry.idle.pop() {
                    Some(index) => Some(index),
                    None if self.lazy_clone_creation && entry.instances.len() < entry.capacity => {
                        match create_instance(&self.registry, &self.definitions[id.index()]) {
                            Ok(instance) => {
                                entry.instances.push(instance);
                                debug!(
                                    algorithm = %entry.name,
                                    clones = entry.instances.len(),
                                    "created clone on demand"
                                );
                                Some(entry.instances.len() - 1)
                            }
                            Err(e) => {
                                warn!(error = %e, algorithm = %entry.name, "clone creation failed, capping clones");
                                entry.capacity = entry.instances.len();
                                None
                            }
                        }
                    }
                    None => None,
                }
            }
        };

        let Some(index) = index else {
            enqueue(st, id, slot);
            return Ok(Acquisition::Queued);
        };

        entry.busy += 1;
        let algorithm = Arc::clone(&entry.instances[index]);
        for &r in &entry.resources {
            st.resource_holders[r] = Some((id, slot));
        }

        Ok(Acquisition::Granted(AlgorithmInstance {
            node: id,
            slot,
            index,
            algorithm,
        }))
    }

    /// Return an instance and the resources it held.
    ///
    /// Returns the queued `(node, slot)` requests that wait on this node or
    /// on one of its resources, in queue order. They are removed from the
    /// queue; requests that still cannot be served are re-queued by the
    /// next `acquire`.
    pub fn release(&self, instance: AlgorithmInstance) -> HiveResult<Vec<(AlgorithmId, usize)>> {
        let mut guard = self.lock();
        let st = &mut *guard;
        let id = instance.node;
        let entry = st
            .nodes
            .get_mut(id.index())
            .ok_or_else(|| HiveError::UnknownAlgorithm(id.to_string()))?;

        if entry.busy == 0 {
            return Err(HiveError::DoubleRelease(entry.name.clone()));
        }
        if entry.class != ResourceClass::Reentrant {
            if entry.idle.contains(&instance.index) {
                return Err(HiveError::DoubleRelease(entry.name.clone()));
            }
            entry.idle.push(instance.index);
        }
        entry.busy -= 1;

        let released: Vec<usize> = entry.resources.clone();
        for &r in &released {
            if st.resource_holders[r] == Some((id, instance.slot)) {
                st.resource_holders[r] = None;
            }
        }
        drop(instance);

        let nodes = &st.nodes;
        let mut woken = Vec::new();
        st.waiting.retain(|&(waiter, slot)| {
            let affected = waiter == id
                || nodes[waiter.index()]
                    .resources
                    .iter()
                    .any(|r| released.contains(r));
            if affected {
                woken.push((waiter, slot));
            }
            !affected
        });
        Ok(woken)
    }

    /// Drop queued requests belonging to `slot`.
    pub fn discard_waiters(&self, slot: usize) -> usize {
        let mut st = self.lock();
        let before = st.waiting.len();
        st.waiting.retain(|&(_, s)| s != slot);
        before - st.waiting.len()
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Finalize every instance. Fails if any instance is still checked out.
    ///
    /// Idempotent: a second call does nothing.
    pub fn finalize(&self) -> HiveResult<()> {
        let mut st = self.lock();
        if st.finalized {
            return Ok(());
        }
        if let Some(entry) = st.nodes.iter().find(|n| n.busy > 0) {
            return Err(HiveError::InstanceInUse(entry.name.clone()));
        }

        let mut first_error = None;
        for entry in &mut st.nodes {
            for instance in &mut entry.instances {
                let Some(algorithm) = Arc::get_mut(instance) else {
                    return Err(HiveError::InstanceInUse(entry.name.clone()));
                };
                if let Err(e) = algorithm.finalize() {
                    warn!(algorithm = %entry.name, error = %e, "finalize failed");
                    first_error.get_or_insert(HiveError::AlgorithmFinalization {
                        algorithm: entry.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        st.finalized = true;
        drop(st);

        if self.count_instance_misses {
            let parade = self.dump_instance_misses();
            if !parade.is_empty() {
                info!("{parade}");
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn queue_depth(&self) -> usize {
        self.lock().waiting.len()
    }

    pub fn peak_queue_depth(&self) -> usize {
        self.lock().peak_waiting
    }

    pub fn is_queued(&self, id: AlgorithmId, slot: usize) -> bool {
        self.lock().waiting.contains(&(id, slot))
    }

    /// Executions of the node currently checked out.
    pub fn busy(&self, id: AlgorithmId) -> usize {
        self.lock().nodes.get(id.index()).map_or(0, |n| n.busy)
    }

    /// Instances created so far for the node.
    pub fn instances_created(&self, id: AlgorithmId) -> usize {
        self.lock().nodes.get(id.index()).map_or(0, |n| n.instances.len())
    }

    pub fn capacity(&self, id: AlgorithmId) -> usize {
        self.lock().nodes.get(id.index()).map_or(0, |n| n.capacity)
    }

    /// Node currently holding the named resource.
    pub fn resource_holder(&self, resource: &str) -> Option<AlgorithmId> {
        let st = self.lock();
        let idx = st.resource_names.iter().position(|r| r == resource)?;
        st.resource_holders[idx].map(|(id, _)| id)
    }

    /// Acquire attempts that had to queue, per algorithm, most first.
    pub fn instance_misses(&self) -> Vec<(String, u64)> {
        let st = self.lock();
        let mut misses: Vec<(String, u64)> = st
            .nodes
            .iter()
            .filter(|n| n.misses > 0)
            .map(|n| (n.name.clone(), n.misses))
            .collect();
        misses.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        misses
    }

    /// The instance-miss table, or an empty string when nothing missed.
    pub fn dump_instance_misses(&self) -> String {
        let misses = self.instance_misses();
        if misses.is_empty() {
            return String::new();
        }
        let width = misses.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        let mut out = String::from("Hit parade of algorithm instance misses:\n");
        for (name, count) in misses {
            let _ = writeln!(out, "  {name:<width$}  {count}");
        }
        out
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn enqueue(st: &mut PoolState, id: AlgorithmId, slot: usize) {
    st.nodes[id.index()].misses += 1;
    if !st.waiting.contains(&(id, slot)) {
        st.waiting.push_back((id, slot));
        st.peak_waiting = st.peak_waiting.max(st.waiting.len());
    }
}

fn create_instance(
    registry: &AlgorithmRegistry,
    node: &AlgorithmNode,
) -> HiveResult<Arc<dyn Algorithm>> {
    let mut algorithm = registry.create(node)?;
    algorithm
        .initialize()
        .map_err(|e| HiveError::AlgorithmInitialization {
            algorithm: node.name.clone(),
            reason: e.to_string(),
        })?;
    Ok(Arc::from(algorithm))
}
