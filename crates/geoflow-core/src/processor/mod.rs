//! Action processor
//!
//! Drives the [`DependencyTracker`] wave by wave, invokes operations from the
//! [`OperationRegistry`], materializes produced layers into the
//! [`LayerStore`] and records one [`StepResult`] per node.
//!
//! Step-level failures never abort the batch: the failing node is completed
//! without a value and later independent steps still run.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::operation::{GeometryOperation, OperationError, OperationOutput, OperationRegistry};
use crate::store::{LayerStore, StoreError};
use crate::tracker::{DependencyTracker, OperationNode, UnresolvedReason};
use crate::types::{LayerId, Params, PlannedAction, StepResult, StepStatus};

const MAX_LOG_TEXT_CHARS: usize = 2_000;

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Step-level failures, each mapped onto a [`StepStatus`]
#[derive(Debug, Error)]
pub enum StepError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("missing required parameter(s) for '{action}': {}", .missing.join(", "))]
    MissingParameter { action: String, missing: Vec<String> },

    #[error("unresolved dependency: {0}")]
    UnresolvedDependency(UnresolvedReason),

    #[error("{0}")]
    OperationFailed(#[from] OperationError),
}

impl StepError {
    pub fn status(&self) -> StepStatus {
        match self {
            Self::UnknownOperation(_) => StepStatus::UnknownAction,
            Self::MissingParameter { .. } => StepStatus::ParameterMissing,
            Self::UnresolvedDependency(_) => StepStatus::UnresolvedDependency,
            Self::OperationFailed(_) => StepStatus::Error,
        }
    }
}

/// The action processor - executes one batch of planned actions
pub struct ActionProcessor {
    registry: Arc<OperationRegistry>,
    store: Arc<dyn LayerStore>,
    /// Emit a step result for nodes that never became executable
    report_unresolved: bool,
}

impl ActionProcessor {
    pub fn new(registry: Arc<OperationRegistry>, store: Arc<dyn LayerStore>) -> Self {
        Self {
            registry,
            store,
            report_unresolved: true,
        }
    }

    /// Toggle reporting of never-executable nodes. When off they are dropped
    /// silently.
    pub fn with_unresolved_reporting(mut self, report_unresolved: bool) -> Self {
        self.report_unresolved = report_unresolved;
        self
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn LayerStore> {
        &self.store
    }

    /// Process actions with placeholders based on the current store size.
    pub fn process(&self, actions: &[PlannedAction]) -> Result<Vec<StepResult>, StoreError> {
        let base = self.store.len()?;
        Ok(self.process_from(actions, base))
    }

    /// Process actions; action `i` (0-based) is known as `Result_{base + i}`.
    ///
    /// Results come back in completion order: wave by wave, registration
    /// order within a wave, followed by unresolved nodes.
    pub fn process_from(&self, actions: &[PlannedAction], base: usize) -> Vec<StepResult> {
        let mut tracker = DependencyTracker::new();
        for (position, action) in actions.iter().enumerate() {
            tracker.register(
                LayerId::placeholder(base + position),
                position + 1,
                action.action.clone(),
                action.params.clone(),
            );
        }

        let mut results = Vec::with_capacity(actions.len());
        let mut wave_index = 0usize;
        loop {
            let wave = tracker.executable_nodes();
            if wave.is_empty() {
                break;
            }
            wave_index += 1;
            tracing::debug!(
                wave = wave_index,
                nodes = wave.len(),
                "executing wave"
            );
            for node in wave {
                results.push(self.execute_node(&mut tracker, &node));
            }
        }

        let unresolved = tracker.abandon_unresolved();
        for item in unresolved {
            tracing::warn!(
                step = item.node.step,
                node_id = %item.node.id,
                action = %item.node.action,
                reason = %item.reason,
                "step can never execute"
            );
            if self.report_unresolved {
                let error = StepError::UnresolvedDependency(item.reason);
                results.push(StepResult::failed(
                    item.node.step,
                    item.node.id,
                    item.node.action,
                    error.status(),
                    error.to_string(),
                ));
            }
        }

        results
    }

    fn execute_node(&self, tracker: &mut DependencyTracker, node: &OperationNode) -> StepResult {
        tracing::info!(
            step = node.step,
            node_id = %node.id,
            action = %node.action,
            "step execution started"
        );

        let Some(operation) = self.registry.get(&node.action) else {
            return self.fail(tracker, node, StepError::UnknownOperation(node.action.clone()));
        };

        let params = tracker.resolve(&node.params);
        let missing = missing_required(operation.as_ref(), &params);
        if !missing.is_empty() {
            return self.fail(
                tracker,
                node,
                StepError::MissingParameter {
                    action: node.action.clone(),
                    missing,
                },
            );
        }

        match operation.invoke(&params, self.store.as_ref()) {
            Ok(OperationOutput::Layer(layer)) => {
                let feature_count = layer.len();
                let geojson = match layer.to_geojson() {
                    Ok(payload) => Some(payload),
                    Err(err) => {
                        tracing::warn!(
                            step = node.step,
                            action = %node.action,
                            error = %err,
                            "geometry payload unavailable"
                        );
                        None
                    }
                };
                let layer_id = match self.store.put(layer) {
                    Ok(id) => id,
                    Err(err) => return self.fail(tracker, node, OperationError::from(err).into()),
                };
                tracker.register_alias(node.id.clone(), layer_id.clone());
                tracker.complete(node.id.as_str(), Some(Value::String(layer_id.to_string())));
                tracing::info!(
                    step = node.step,
                    node_id = %node.id,
                    action = %node.action,
                    layer = %layer_id,
                    features = feature_count,
                    "step execution completed"
                );
                let message = format!(
                    "{} produced {} ({} feature{})",
                    node.action,
                    layer_id,
                    feature_count,
                    if feature_count == 1 { "" } else { "s" }
                );
                StepResult::executed_layer(
                    node.step,
                    node.id.clone(),
                    node.action.clone(),
                    layer_id,
                    geojson,
                    message,
                )
            }
            Ok(OperationOutput::Value(value)) => {
                let text = match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                tracker.complete(node.id.as_str(), Some(value));
                tracing::info!(
                    step = node.step,
                    node_id = %node.id,
                    action = %node.action,
                    output = %truncate_for_log(&text, MAX_LOG_TEXT_CHARS),
                    "step execution completed"
                );
                let message = format!("{} returned {}", node.action, text);
                StepResult::executed_value(
                    node.step,
                    node.id.clone(),
                    node.action.clone(),
                    text,
                    message,
                )
            }
            Err(err) => self.fail(tracker, node, err.into()),
        }
    }

    /// Finish the node without a value so dependents are released.
    fn fail(&self, tracker: &mut DependencyTracker, node: &OperationNode, error: StepError) -> StepResult {
        tracker.complete(node.id.as_str(), None);
        let message = error.to_string();
        tracing::error!(
            step = node.step,
            node_id = %node.id,
            action = %node.action,
            status = error.status().as_str(),
            error = %truncate_for_log(&message, MAX_LOG_TEXT_CHARS),
            "step execution failed"
        );
        StepResult::failed(
            node.step,
            node.id.clone(),
            node.action.clone(),
            error.status(),
            message,
        )
    }
}

fn missing_required(operation: &dyn GeometryOperation, params: &Params) -> Vec<String> {
    operation
        .required_params()
        .iter()
        .filter(|name| matches!(params.get(**name), None | Some(Value::Null)))
        .map(|name| name.to_string())
        .collect()
}
