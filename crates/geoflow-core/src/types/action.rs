//! PlannedAction type definition

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw action parameters: name -> literal or `Result_N` reference.
pub type Params = serde_json::Map<String, Value>;

/// One operation requested by the planner, before any reference is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Operation name, looked up in the operation registry
    #[serde(alias = "operation", alias = "tool")]
    pub action: String,
    /// Raw parameters as produced by the planner
    #[serde(default, alias = "parameters", alias = "args")]
    pub params: Params,
}

impl PlannedAction {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_planned_action_accepts_operation_alias() {
        let action: PlannedAction = serde_json::from_value(json!({
            "operation": "buffer_layer",
            "parameters": {"layer_name": "Layer 1", "distance": "500"}
        }))
        .expect("action");
        assert_eq!(action.action, "buffer_layer");
        assert_eq!(action.params.get("distance"), Some(&json!("500")));
    }

    #[test]
    fn test_planned_action_params_default_to_empty() {
        let action: PlannedAction =
            serde_json::from_value(json!({"action": "dissolve"})).expect("action");
        assert!(action.params.is_empty());
    }
}
