use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::DataKey;

/// Index of an algorithm node in declaration order.
///
/// Stable for the lifetime of a dependency graph and used as the
/// tie-break when several nodes become ready at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlgorithmId(pub usize);

impl AlgorithmId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How instances of an algorithm may be shared between concurrent executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// One shared instance serves any number of concurrent executions.
    #[default]
    Reentrant,
    /// A bounded set of clones; each clone runs one execution at a time.
    #[serde(rename = "cloneable", alias = "cloneable_non_reentrant")]
    CloneableNonReentrant,
    /// A single instance; at most one execution system-wide.
    Exclusive,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reentrant => "reentrant",
            Self::CloneableNonReentrant => "cloneable",
            Self::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one unit of computation and its data dependencies.
///
/// Deserialized from a `[[algorithm]]` table:
///
/// ```toml
/// [[algorithm]]
/// name = "Tracker"
/// type = "cpu_cruncher"
/// inputs = ["/Event/Hits"]
/// outputs = ["/Event/Tracks"]
/// resource_class = "cloneable"
/// max_clones = 4
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmNode {
    pub name: String,

    /// Factory key used to instantiate the algorithm. Defaults to `name`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub algorithm_type: Option<String>,

    #[serde(default)]
    pub inputs: Vec<DataKey>,

    #[serde(default)]
    pub outputs: Vec<DataKey>,

    #[serde(default)]
    pub resource_class: ResourceClass,

    /// Upper bound on clones for `cloneable` algorithms.
    #[serde(default = "default_max_clones")]
    pub max_clones: usize,

    /// Named resources this algorithm holds while executing. Algorithms
    /// sharing a resource name never execute concurrently.
    #[serde(default)]
    pub resources: Vec<String>,

    /// Free-form parameters handed to the algorithm factory.
    #[serde(default)]
    pub params: toml::Table,
}

fn default_max_clones() -> usize {
    1
}

impl AlgorithmNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algorithm_type: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            resource_class: ResourceClass::default(),
            max_clones: default_max_clones(),
            resources: Vec::new(),
            params: toml::Table::new(),
        }
    }

    pub fn with_type(mut self, algorithm_type: impl Into<String>) -> Self {
        self.algorithm_type = Some(algorithm_type.into());
        self
    }

    pub fn with_inputs<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<DataKey>,
    {
        self.inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<DataKey>,
    {
        self.outputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_class(mut self, class: ResourceClass) -> Self {
        self.resource_class = class;
        self
    }

    pub fn with_max_clones(mut self, max_clones: usize) -> Self {
        self.max_clones = max_clones;
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Factory key: the explicit `type`, or the node name.
    pub fn type_name(&self) -> &str {
        self.algorithm_type.as_deref().unwrap_or(&self.name)
    }

    /// Number of instances the resource pool may hold for this node.
    pub fn instance_capacity(&self) -> usize {
        match self.resource_class {
            ResourceClass::CloneableNonReentrant => self.max_clones.max(1),
            ResourceClass::Reentrant | ResourceClass::Exclusive => 1,
        }
    }

    pub fn produces(&self, key: &DataKey) -> bool {
        self.outputs.contains(key)
    }

    pub fn consumes(&self, key: &DataKey) -> bool {
        self.inputs.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_node_with_defaults() {
        let node: AlgorithmNode = toml::from_str(
            r#"
name = "Producer"
outputs = ["/Event/A"]
"#,
        )
        .unwrap();
        assert_eq!(node.name, "Producer");
        assert_eq!(node.type_name(), "Producer");
        assert!(node.inputs.is_empty());
        assert_eq!(node.outputs, vec![DataKey::from("/Event/A")]);
        assert_eq!(node.resource_class, ResourceClass::Reentrant);
        assert_eq!(node.max_clones, 1);
        assert!(node.resources.is_empty());
    }

    #[test]
    fn parse_cloneable_node() {
        let node: AlgorithmNode = toml::from_str(
            r#"
name = "Fitter"
type = "cpu_cruncher"
inputs = ["/Event/Tracks"]
resource_class = "cloneable"
max_clones = 3
resources = ["gpu"]

[params]
avg_runtime_ms = 5
"#,
        )
        .unwrap();
        assert_eq!(node.type_name(), "cpu_cruncher");
        assert_eq!(node.resource_class, ResourceClass::CloneableNonReentrant);
        assert_eq!(node.instance_capacity(), 3);
        assert_eq!(node.resources, vec!["gpu".to_string()]);
        assert_eq!(node.params["avg_runtime_ms"].as_integer(), Some(5));
    }

    #[test]
    fn long_cloneable_alias_accepted() {
        let node: AlgorithmNode = toml::from_str(
            r#"
name = "X"
resource_class = "cloneable_non_reentrant"
"#,
        )
        .unwrap();
        assert_eq!(node.resource_class, ResourceClass::CloneableNonReentrant);
    }

    #[test]
    fn capacity_ignores_max_clones_for_single_instance_classes() {
        let reentrant = AlgorithmNode::new("R").with_max_clones(8);
        let exclusive = AlgorithmNode::new("E")
            .with_class(ResourceClass::Exclusive)
            .with_max_clones(8);
        assert_eq!(reentrant.instance_capacity(), 1);
        assert_eq!(exclusive.instance_capacity(), 1);
    }

    #[test]
    fn builder_sets_keys() {
        let node = AlgorithmNode::new("B")
            .with_inputs(["a", "b"])
            .with_outputs(["c"])
            .with_param("fail", true);
        assert!(node.consumes(&DataKey::from("a")));
        assert!(node.produces(&DataKey::from("c")));
        assert!(!node.produces(&DataKey::from("a")));
        assert_eq!(node.params["fail"].as_bool(), Some(true));
    }
}
