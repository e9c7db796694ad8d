//! Planner module
//!
//! The Planner is responsible for:
//! - Understanding the user's geospatial goal
//! - Selecting operations from the catalog
//! - Wiring later actions to earlier outputs via `Result_N` placeholders
//!
//! The Planner does NOT handle:
//! - Reference resolution
//! - Execution order
//! - Error recovery

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::operation::OperationMeta;
use crate::types::{LayerId, LayerSummary, PlannedAction};

/// Planner errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Failed to generate plan: {0}")]
    Generation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Planner trait - turns a user query into an ordered action list
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, query: &str, context: &PlannerContext) -> Result<PlannerOutput, PlanError>;
}

/// Context provided to the planner
#[derive(Debug, Clone, Default)]
pub struct PlannerContext {
    /// Available operations and their parameter contracts
    pub operations: Vec<OperationMeta>,
    /// Layers currently in the store
    pub layers: Vec<LayerSummary>,
    /// Index of the first placeholder: action `i` (0-based) is `Result_{base + i}`
    pub result_base: usize,
    /// Caller-supplied context (e.g. what the map client currently shows)
    pub request_context: Value,
}

impl PlannerContext {
    pub fn new(operations: Vec<OperationMeta>, layers: Vec<LayerSummary>, result_base: usize) -> Self {
        Self {
            operations,
            layers,
            result_base,
            request_context: Value::Null,
        }
    }

    pub fn with_request_context(mut self, request_context: Value) -> Self {
        self.request_context = request_context;
        self
    }

    /// Get operation by name
    pub fn get_operation(&self, name: &str) -> Option<&OperationMeta> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Placeholder the `position`-th (0-based) action's output goes by
    pub fn placeholder_for(&self, position: usize) -> LayerId {
        LayerId::placeholder(self.result_base + position)
    }
}

/// Planner output: an answer plus the actions that implement it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerOutput {
    /// Explanation for the user; the whole answer when `actions` is empty
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub actions: Vec<PlannedAction>,
}

impl PlannerOutput {
    pub fn new(message: impl Into<String>, actions: Vec<PlannedAction>) -> Self {
        Self {
            message: message.into(),
            actions,
        }
    }

    /// A purely informational answer
    pub fn answer(message: impl Into<String>) -> Self {
        Self::new(message, Vec::new())
    }
}
