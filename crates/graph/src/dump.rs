use std::fmt::Write;

use crate::dependency::DependencyGraph;

impl DependencyGraph {
    /// Human-readable data flow: every key with its producer and consumers.
    pub fn dump_data_flow(&self) -> String {
        let mut out = String::from("==================== Data Dependencies ====================\n");
        for (key, &producer) in self.producers() {
            let consumers: Vec<&str> = self
                .consumers_of(key)
                .iter()
                .map(|&id| self.name(id))
                .collect();
            let _ = writeln!(
                out,
                "  {key}\n      produced by: {}\n      consumed by: {}",
                self.name(producer),
                if consumers.is_empty() {
                    "(none)".to_string()
                } else {
                    consumers.join(", ")
                }
            );
        }
        for &id in self.roots() {
            if self.node(id).outputs.is_empty() {
                let _ = writeln!(out, "  (no data) {}", self.name(id));
            }
        }
        out
    }

    /// Graphviz rendering with algorithm boxes and key ellipses.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph data_flow {\n  rankdir=LR;\n");
        for node in self.nodes() {
            let _ = writeln!(
                out,
                "  \"{}\" [shape=box, label=\"{}\\n[{}]\"];",
                node.name, node.name, node.resource_class
            );
        }
        for (key, &producer) in self.producers() {
            let _ = writeln!(out, "  \"{key}\" [shape=ellipse];");
            let _ = writeln!(out, "  \"{}\" -> \"{key}\";", self.name(producer));
            for &consumer in self.consumers_of(key) {
                let _ = writeln!(out, "  \"{key}\" -> \"{}\";", self.name(consumer));
            }
        }
        out.push_str("}\n");
        out
    }
}
