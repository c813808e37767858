use std::collections::BTreeMap;

use serde_json::Value;

/// The assembled declared outputs of a successfully finished call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub outputs: BTreeMap<String, Value>,
}

impl Outcome {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }
}
