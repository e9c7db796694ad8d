//! Fixed-plan planner
//!
//! Replays the same action list for every query. Used for scripted runs
//! (`geoflow exec`) and for tests that must not depend on a language model.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use geoflow_core::planner::{PlanError, Planner, PlannerContext, PlannerOutput};
use geoflow_core::types::PlannedAction;

/// Parse a plan document.
///
/// Accepts either `{"message": ..., "actions": [...]}` or a bare action array.
pub fn parse_plan_json(text: &str) -> Result<PlannerOutput, PlanError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| PlanError::Generation(format!("Invalid plan JSON: {}", e)))?;
    let output = match value {
        Value::Array(_) => {
            let actions: Vec<PlannedAction> = serde_json::from_value(value)
                .map_err(|e| PlanError::Generation(format!("Invalid action list: {}", e)))?;
            PlannerOutput::new(String::new(), actions)
        }
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| PlanError::Generation(format!("Invalid plan JSON: {}", e)))?,
        other => {
            return Err(PlanError::Generation(format!(
                "plan must be an object or an array, got {}",
                other
            )))
        }
    };
    Ok(output)
}

/// Planner that always answers with the same output
#[derive(Debug, Clone)]
pub struct StaticPlanner {
    output: PlannerOutput,
}

impl StaticPlanner {
    pub fn new(output: PlannerOutput) -> Self {
        Self { output }
    }

    pub fn from_actions(actions: Vec<PlannedAction>) -> Self {
        Self::new(PlannerOutput::new(String::new(), actions))
    }

    /// Load a plan document from disk
    pub fn from_file(path: &Path) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PlanError::Internal(format!("cannot read plan file {}: {}", path.display(), e))
        })?;
        Ok(Self::new(parse_plan_json(&text)?))
    }

    pub fn output(&self) -> &PlannerOutput {
        &self.output
    }
}

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, query: &str, context: &PlannerContext) -> Result<PlannerOutput, PlanError> {
        tracing::debug!(
            query_len = query.len(),
            action_count = self.output.actions.len(),
            result_base = context.result_base,
            "static planner replaying plan"
        );
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_plan_object_and_array() {
        let object = parse_plan_json(
            r#"{"message":"ok","actions":[{"action":"dissolve","params":{"layer_name":"Layer 1"}}]}"#,
        )
        .expect("object plan");
        assert_eq!(object.message, "ok");
        assert_eq!(object.actions[0].action, "dissolve");

        let array = parse_plan_json(r#"[{"operation":"simplify","args":{"tolerance":"2"}}]"#)
            .expect("array plan");
        assert!(array.message.is_empty());
        assert_eq!(array.actions[0].action, "simplify");
        assert_eq!(array.actions[0].params["tolerance"], json!("2"));

        let answer = parse_plan_json(r#"{"message":"There are 3 layers."}"#).expect("answer");
        assert!(answer.actions.is_empty());
    }

    #[test]
    fn test_parse_plan_rejects_scalars_and_garbage() {
        assert!(matches!(parse_plan_json("42"), Err(PlanError::Generation(_))));
        assert!(matches!(parse_plan_json("{"), Err(PlanError::Generation(_))));
        assert!(matches!(
            parse_plan_json(r#"[{"params":{}}]"#),
            Err(PlanError::Generation(_))
        ));
    }

    #[test]
    fn test_static_planner_from_file_replays_plan() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(br#"[{"action":"buffer_layer","params":{"layer_name":"Layer 1","distance":10}}]"#)
            .expect("write plan");

        let planner = StaticPlanner::from_file(file.path()).expect("load plan");
        let context = PlannerContext::default();
        let first = tokio_test::block_on(planner.plan("anything", &context)).expect("plan");
        let second = tokio_test::block_on(planner.plan("something else", &context)).expect("plan");

        assert_eq!(first, second);
        assert_eq!(first.actions.len(), 1);
        assert_eq!(first.actions[0].params["distance"], json!(10));
    }

    #[test]
    fn test_static_planner_missing_file() {
        let err = StaticPlanner::from_file(Path::new("/nonexistent/plan.json")).unwrap_err();
        assert!(matches!(err, PlanError::Internal(_)));
    }
}
