//! Planner factory for building the configured planner.

use std::sync::Arc;

use thiserror::Error;

use geoflow_config::{ApiKeyError, GeoflowConfig, PlannerMode};
use geoflow_core::planner::{PlanError, Planner};

use crate::llm::{HttpLlmClient, HttpLlmClientConfig, LlmError, LlmPlanner, LlmPlannerConfig};
use crate::static_plan::StaticPlanner;

/// Errors that can occur when building a planner.
#[derive(Debug, Error)]
pub enum PlannerBuildError {
    #[error("missing API key: {0}")]
    ApiKey(#[from] ApiKeyError),
    #[error("llm client error: {0}")]
    Client(#[from] LlmError),
    #[error("static plan error: {0}")]
    StaticPlan(#[from] PlanError),
    #[error("planner.actions_file is required in static mode")]
    MissingActionsFile,
}

/// Build the planner selected by `planner.mode`.
pub fn build_planner(config: &GeoflowConfig) -> Result<Arc<dyn Planner>, PlannerBuildError> {
    match config.planner.mode {
        PlannerMode::Static => {
            let path = config
                .planner
                .actions_file
                .as_ref()
                .ok_or(PlannerBuildError::MissingActionsFile)?;
            let planner = StaticPlanner::from_file(path)?;
            tracing::info!(
                path = %path.display(),
                actions = planner.output().actions.len(),
                "static planner loaded"
            );
            Ok(Arc::new(planner))
        }
        PlannerMode::Llm => {
            let api_key = config.providers.resolve_api_key()?;
            let client = HttpLlmClient::new(HttpLlmClientConfig {
                endpoint: config.providers.endpoint.clone(),
                api_key: Some(api_key),
                timeout_secs: config.providers.timeout_secs,
                ..HttpLlmClientConfig::default()
            })?;
            let mut planner_config = LlmPlannerConfig {
                model: config.planner.model.clone(),
                temperature: config.planner.temperature,
                ..LlmPlannerConfig::default()
            };
            if let Some(prompt) = &config.planner.system_prompt {
                planner_config.system_prompt = prompt.clone();
            }
            tracing::info!(
                model = %planner_config.model,
                endpoint = %config.providers.endpoint,
                "llm planner configured"
            );
            Ok(Arc::new(LlmPlanner::new(client, planner_config)))
        }
    }
}
