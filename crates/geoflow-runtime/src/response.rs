//! Request and response shapes of one orchestration

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use geoflow_core::types::{PlannedAction, StepResult, StepStatus};

/// A user query plus optional caller context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub query: String,
    #[serde(default)]
    pub context: Value,
}

impl OrchestrationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// One entry of `results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub action: String,
    pub status: StepStatus,
    pub message: String,
    /// Produced layer identifier, or the text of a scalar result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geojson: Option<Value>,
    /// 1-based position of the action in the plan
    pub step: usize,
}

impl From<&StepResult> for StepReport {
    fn from(result: &StepResult) -> Self {
        Self {
            action: result.action.clone(),
            status: result.status,
            message: result.message.clone(),
            result: result
                .layer_id
                .as_ref()
                .map(ToString::to_string)
                .or_else(|| result.output.clone()),
            geojson: result.geojson.clone(),
            step: result.step,
        }
    }
}

/// Geometry of one layer-producing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeojsonStep {
    pub layer_name: String,
    pub action: String,
    pub geometry: Value,
}

/// Aggregate answer to one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    pub status: ResponseStatus,
    pub message: String,
    /// Planned operation names, in plan order
    pub actions: Vec<String>,
    /// Step reports, in plan order
    pub results: Vec<StepReport>,
    /// Layers created by this request, in creation order
    pub intermediate_layers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub geojson_steps: BTreeMap<String, GeojsonStep>,
    /// Geometry of the highest-numbered step that produced one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geojson: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl OrchestrationResponse {
    /// Assemble the response from a finished run.
    ///
    /// `results` may come in completion order; reports are emitted in plan
    /// order while `intermediate_layers` keeps creation order.
    pub fn from_results(message: impl Into<String>, actions: &[PlannedAction], results: &[StepResult]) -> Self {
        let intermediate_layers = results
            .iter()
            .filter_map(|r| r.layer_id.as_ref().map(ToString::to_string))
            .collect();

        let mut ordered: Vec<&StepResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.step);

        let mut geojson_steps = BTreeMap::new();
        let mut last_geometry: Option<Value> = None;
        for result in &ordered {
            if let (Some(layer_id), Some(geometry)) = (&result.layer_id, &result.geojson) {
                geojson_steps.insert(
                    format!("step_{}", result.step),
                    GeojsonStep {
                        layer_name: layer_id.to_string(),
                        action: result.action.clone(),
                        geometry: geometry.clone(),
                    },
                );
                last_geometry = Some(geometry.clone());
            }
        }

        let mut message = message.into();
        if message.trim().is_empty() {
            message = summarize(results);
        }

        Self {
            status: ResponseStatus::Success,
            message,
            actions: actions.iter().map(|a| a.action.clone()).collect(),
            results: ordered.into_iter().map(StepReport::from).collect(),
            intermediate_layers,
            geojson_steps,
            geojson: last_geometry,
            session_id: None,
        }
    }

    /// Top-level failure; `actions` are whatever was planned before it.
    pub fn error(message: impl Into<String>, actions: &[PlannedAction]) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
            actions: actions.iter().map(|a| a.action.clone()).collect(),
            results: Vec::new(),
            intermediate_layers: Vec::new(),
            geojson_steps: BTreeMap::new(),
            geojson: None,
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

fn summarize(results: &[StepResult]) -> String {
    if results.is_empty() {
        return "No operations were needed.".to_string();
    }
    let executed = results.iter().filter(|r| r.status.is_success()).count();
    format!("Executed {} of {} step(s).", executed, results.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoflow_core::types::LayerId;
    use serde_json::json;

    fn layer_result(step: usize, layer: &str, geometry: Value) -> StepResult {
        StepResult::executed_layer(
            step,
            LayerId::placeholder(step),
            "buffer_layer",
            LayerId::from(layer),
            Some(geometry),
            format!("buffer_layer produced {}", layer),
        )
    }

    #[test]
    fn test_reports_follow_plan_order_and_last_geometry_wins() {
        let actions = vec![
            PlannedAction::new("buffer_layer"),
            PlannedAction::new("buffer_layer"),
            PlannedAction::new("calculate_area"),
        ];
        // Step 2 completed first (forward reference from step 1).
        let results = vec![
            layer_result(2, "Layer 2", json!({"n": 2})),
            layer_result(1, "Layer 3", json!({"n": 1})),
            StepResult::executed_value(3, LayerId::placeholder(3), "calculate_area", "12.5", "ok"),
        ];

        let response = OrchestrationResponse::from_results("done", &actions, &results);

        assert!(response.is_success());
        assert_eq!(response.actions, vec!["buffer_layer", "buffer_layer", "calculate_area"]);
        let steps: Vec<usize> = response.results.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert_eq!(response.results[0].result.as_deref(), Some("Layer 3"));
        assert_eq!(response.results[2].result.as_deref(), Some("12.5"));
        assert!(response.results[2].geojson.is_none());
        assert_eq!(response.intermediate_layers, vec!["Layer 2", "Layer 3"]);
        assert_eq!(response.geojson_steps["step_1"].layer_name, "Layer 3");
        assert_eq!(response.geojson, Some(json!({"n": 2})));
    }

    #[test]
    fn test_empty_plan_serializes_without_optional_fields() {
        let response = OrchestrationResponse::from_results("", &[], &[]);
        let value = serde_json::to_value(&response).expect("serialize");

        assert_eq!(value["status"], json!("success"));
        assert_eq!(value["message"], json!("No operations were needed."));
        assert_eq!(value["results"], json!([]));
        assert!(value.get("geojson_steps").is_none());
        assert!(value.get("geojson").is_none());
    }

    #[test]
    fn test_error_response() {
        let response = OrchestrationResponse::error("planner unavailable", &[]).with_session_id("s-1");
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["status"], json!("error"));
        assert_eq!(value["session_id"], json!("s-1"));
        assert!(!response.is_success());
    }

    #[test]
    fn test_step_report_status_serializes_snake_case() {
        let report = StepReport::from(&StepResult::failed(
            4,
            LayerId::placeholder(4),
            "clip",
            StepStatus::ParameterMissing,
            "missing required parameter(s) for 'clip': mask_name",
        ));
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["status"], json!("parameter_missing"));
        assert_eq!(value["step"], json!(4));
        assert!(value.get("result").is_none());
    }
}
