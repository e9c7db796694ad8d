//! Planner implementations for geoflow.
//!
//! This crate provides:
//! - `LlmPlanner` over any `LlmClient` (OpenAI-compatible HTTP or mock)
//! - `StaticPlanner`, replaying a fixed action list
//!
//! Use `build_planner` to create the configured planner.

mod factory;
mod llm;
mod static_plan;

pub use factory::{build_planner, PlannerBuildError};
pub use llm::{
    HttpLlmClient, HttpLlmClientConfig, LlmClient, LlmError, LlmPlanner, LlmPlannerConfig,
    LlmRequest, MockLlmClient,
};
pub use static_plan::{parse_plan_json, StaticPlanner};
