//! StepResult type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LayerId;

/// Outcome class of one executed (or abandoned) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Executed,
    Error,
    ParameterMissing,
    UnknownAction,
    /// The step never became executable (self reference, unknown reference
    /// or dependency cycle)
    UnresolvedDependency,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Executed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::Error => "error",
            Self::ParameterMissing => "parameter_missing",
            Self::UnknownAction => "unknown_action",
            Self::UnresolvedDependency => "unresolved_dependency",
        }
    }
}

/// Immutable record of one step's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 1-based position of the action in the planned list
    pub step: usize,
    /// Placeholder the step's output was known by before execution
    pub node_id: LayerId,
    /// Operation name as requested
    pub action: String,
    pub status: StepStatus,
    /// Human-readable outcome
    pub message: String,
    /// Permanent identifier of the produced layer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<LayerId>,
    /// Textual representation of a non-layer result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// GeoJSON FeatureCollection of the produced layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geojson: Option<Value>,
}

impl StepResult {
    /// A step that produced a new stored layer
    pub fn executed_layer(
        step: usize,
        node_id: LayerId,
        action: impl Into<String>,
        layer_id: LayerId,
        geojson: Option<Value>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step,
            node_id,
            action: action.into(),
            status: StepStatus::Executed,
            message: message.into(),
            layer_id: Some(layer_id),
            output: None,
            geojson,
        }
    }

    /// A step that produced a scalar or other non-layer value
    pub fn executed_value(
        step: usize,
        node_id: LayerId,
        action: impl Into<String>,
        output: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step,
            node_id,
            action: action.into(),
            status: StepStatus::Executed,
            message: message.into(),
            layer_id: None,
            output: Some(output.into()),
            geojson: None,
        }
    }

    /// A step that finished without a result
    pub fn failed(
        step: usize,
        node_id: LayerId,
        action: impl Into<String>,
        status: StepStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step,
            node_id,
            action: action.into(),
            status,
            message: message.into(),
            layer_id: None,
            output: None,
            geojson: None,
        }
    }
}
