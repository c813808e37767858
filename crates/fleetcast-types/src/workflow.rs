//! The workflow data model: a DAG of nodes serialized as a mapping from
//! node id to `{class_type, inputs}`.
//!
//! The dispatcher treats a [`Workflow`] as an opaque blob except at the
//! paths declared by a prompt template, so it is backed directly by a
//! JSON object rather than a typed graph: a template's dotted path can reach
//! arbitrarily deep into a node's `inputs` (or anywhere else a backend's
//! custom node shape puts its fields) without this crate knowing the shape
//! in advance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque node identifier, stable across the lifetime of a workflow.
pub type NodeId = String;

/// A value bound to a node input: either a literal scalar/JSON value or a
/// reference to another node's output slot. Only used at node-construction
/// time for ergonomics; once written into a [`Workflow`] both forms are
/// plain JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// `[upstream-node-id, output-slot-index]`.
    Reference(NodeId, u32),
    /// Any scalar or nested JSON value.
    Scalar(Value),
}

impl InputValue {
    pub fn into_json(self) -> Value {
        match self {
            InputValue::Reference(node_id, slot) => Value::Array(vec![
                Value::String(node_id),
                Value::Number(slot.into()),
            ]),
            InputValue::Scalar(v) => v,
        }
    }
}

/// A convenience builder for one node record, converted to JSON on
/// [`Workflow::insert`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowNode {
    pub class_type: Option<String>,
    pub inputs: Vec<(String, InputValue)>,
}

impl WorkflowNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: Some(class_type.into()),
            inputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: InputValue) -> Self {
        self.inputs.push((name.into(), value));
        self
    }

    fn into_json(self) -> Value {
        let mut inputs = Map::new();
        for (name, value) in self.inputs {
            inputs.insert(name, value.into_json());
        }
        let mut node = Map::new();
        if let Some(class_type) = self.class_type {
            node.insert("class_type".to_string(), Value::String(class_type));
        }
        node.insert("inputs".to_string(), Value::Object(inputs));
        Value::Object(node)
    }
}

/// A mapping from node id to node record, backed by a JSON object so that
/// template path writes can reach any depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow(pub Map<String, Value>);

impl Workflow {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, node_id: &str) -> Option<&Value> {
        self.0.get(node_id)
    }

    pub fn insert(&mut self, node_id: impl Into<String>, node: WorkflowNode) {
        self.0.insert(node_id.into(), node.into_json());
    }

    pub fn insert_raw(&mut self, node_id: impl Into<String>, node: Value) {
        self.0.insert(node_id.into(), node);
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.0.contains_key(node_id)
    }

    /// View the whole workflow as a single JSON value, the representation
    /// template path writes operate over.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Deep clone, mirroring the source's reliance on a host structured
    /// clone: `Workflow` and its contents are plain owned JSON data, so
    /// `.clone()` already performs a full recursive copy. Kept as a
    /// separately named method so template code documents its intent at
    /// each copy-on-write boundary rather than relying on an implicit
    /// derive.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_clone_is_independent() {
        let mut wf = Workflow::new();
        wf.insert("4", WorkflowNode::new("CheckpointLoader"));

        let mut clone = wf.deep_clone();
        if let Some(Value::Object(node)) = clone.0.get_mut("4") {
            node.insert("inputs".into(), serde_json::json!({"ckpt_name": "a"}));
        }

        assert_eq!(
            wf.get("4").unwrap()["inputs"],
            serde_json::json!({})
        );
        assert_eq!(
            clone.get("4").unwrap()["inputs"],
            serde_json::json!({"ckpt_name": "a"})
        );
    }

    #[test]
    fn node_builder_serializes_reference_as_tuple() {
        let mut wf = Workflow::new();
        wf.insert(
            "9",
            WorkflowNode::new("SaveImage")
                .with_input("images", InputValue::Reference("8".into(), 0)),
        );
        assert_eq!(wf.get("9").unwrap()["inputs"]["images"], serde_json::json!(["8", 0]));
    }
}
