//! Orchestration Session - one request, start to finish
//!
//! `Start → Planning → Executing → Aggregating → Done`, with `Failed`
//! reachable from every non-terminal state. A planner that returns no
//! actions goes straight from `Planning` to `Aggregating`.
//!
//! Step-level failures never fail the session; only planner failures,
//! store faults and malformed requests do.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use geoflow_core::operation::OperationRegistry;
use geoflow_core::planner::{PlanError, Planner, PlannerContext};
use geoflow_core::processor::ActionProcessor;
use geoflow_core::store::{LayerStore, StoreError};
use geoflow_core::types::PlannedAction;

use crate::response::{OrchestrationRequest, OrchestrationResponse};

/// Session identifier
pub type SessionId = String;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Start,
    Planning,
    Executing,
    Aggregating,
    Done,
    Failed,
}

impl SessionState {
    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Start, Planning)
            | (Planning, Executing)
            | (Planning, Aggregating)
            | (Executing, Aggregating)
            | (Aggregating, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// One recorded state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
}

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("planner error: {0}")]
    Planner(#[from] PlanError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

/// Per-request state machine wiring planner, processor and store
pub struct OrchestrationSession {
    id: SessionId,
    state: SessionState,
    transitions: Vec<StateTransition>,
    planner: Arc<dyn Planner>,
    processor: ActionProcessor,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl OrchestrationSession {
    pub fn new(
        planner: Arc<dyn Planner>,
        registry: Arc<OperationRegistry>,
        store: Arc<dyn LayerStore>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Start,
            transitions: Vec::new(),
            planner,
            processor: ActionProcessor::new(registry, store),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Toggle reporting of steps whose dependencies can never be satisfied
    pub fn with_unresolved_reporting(mut self, report_unresolved: bool) -> Self {
        self.processor = self.processor.with_unresolved_reporting(report_unresolved);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn store(&self) -> &Arc<dyn LayerStore> {
        self.processor.store()
    }

    /// Run the request to completion.
    ///
    /// Session-level failures come back as a `status: error` response; the
    /// session itself ends in `Failed`.
    pub async fn run(&mut self, request: &OrchestrationRequest) -> OrchestrationResponse {
        let mut planned: Vec<PlannedAction> = Vec::new();
        let response = match self.drive(request, &mut planned).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(session_id = %self.id, error = %err, "session failed");
                if !self.state.is_terminal() {
                    let _ = self.transition(SessionState::Failed);
                }
                OrchestrationResponse::error(err.to_string(), &planned)
            }
        };
        response.with_session_id(self.id.clone())
    }

    async fn drive(
        &mut self,
        request: &OrchestrationRequest,
        planned: &mut Vec<PlannedAction>,
    ) -> Result<OrchestrationResponse, SessionError> {
        if request.query.trim().is_empty() {
            return Err(SessionError::InvalidRequest("query must not be empty".to_string()));
        }

        self.transition(SessionState::Planning)?;
        let store = self.processor.store().clone();
        let result_base = store.len()?;
        let context = PlannerContext::new(
            self.processor.registry().catalog(),
            store.summaries()?,
            result_base,
        )
        .with_request_context(request.context.clone());
        let output = self.planner.plan(&request.query, &context).await?;
        planned.clone_from(&output.actions);
        tracing::info!(
            session_id = %self.id,
            action_count = output.actions.len(),
            result_base,
            "session plan ready"
        );

        let results = if output.actions.is_empty() {
            Vec::new()
        } else {
            self.transition(SessionState::Executing)?;
            self.processor.process_from(&output.actions, result_base)
        };

        self.transition(SessionState::Aggregating)?;
        let response = OrchestrationResponse::from_results(output.message, &output.actions, &results);
        self.transition(SessionState::Done)?;
        tracing::info!(
            session_id = %self.id,
            steps = results.len(),
            executed = results.iter().filter(|r| r.status.is_success()).count(),
            layers = response.intermediate_layers.len(),
            "session completed"
        );
        Ok(response)
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        tracing::debug!(
            session_id = %self.id,
            from = ?self.state,
            to = ?next,
            "session state transition"
        );
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at: now,
        });
        self.state = next;
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geoflow_core::planner::PlannerOutput;
    use geoflow_core::types::{Crs, Feature, Layer, StepStatus};
    use geoflow_planners::StaticPlanner;
    use geoflow_stores::InMemoryLayerStore;
    use geo_types::point;
    use serde_json::json;
    use std::sync::Mutex;

    struct UnavailablePlanner;

    #[async_trait]
    impl Planner for UnavailablePlanner {
        async fn plan(&self, _query: &str, _context: &PlannerContext) -> Result<PlannerOutput, PlanError> {
            Err(PlanError::LlmError("connection refused".to_string()))
        }
    }

    /// Records the context it was planned with.
    struct CapturingPlanner {
        seen: Mutex<Option<PlannerContext>>,
    }

    #[async_trait]
    impl Planner for CapturingPlanner {
        async fn plan(&self, _query: &str, context: &PlannerContext) -> Result<PlannerOutput, PlanError> {
            if let Ok(mut seen) = self.seen.lock() {
                *seen = Some(context.clone());
            }
            Ok(PlannerOutput::answer("Two layers are loaded."))
        }
    }

    fn store() -> Arc<InMemoryLayerStore> {
        Arc::new(InMemoryLayerStore::with_layers(vec![Layer::new(
            vec![Feature::new(point!(x: 0.0, y: 0.0))],
            Crs::web_mercator(),
        )]))
    }

    fn session(planner: Arc<dyn Planner>, store: Arc<InMemoryLayerStore>) -> OrchestrationSession {
        OrchestrationSession::new(planner, Arc::new(geoflow_ops::builtin_registry()), store)
    }

    fn states(session: &OrchestrationSession) -> Vec<SessionState> {
        session.transitions().iter().map(|t| t.to).collect()
    }

    #[test]
    fn test_full_run_walks_every_state() {
        let planner = Arc::new(StaticPlanner::from_actions(vec![PlannedAction::new("buffer_layer")
            .with_param("layer_name", "Layer 1")
            .with_param("distance", 10)]));
        let mut session = session(planner, store());

        let response = tokio_test::block_on(session.run(&OrchestrationRequest::new("buffer")));

        assert!(response.is_success());
        assert_eq!(response.session_id.as_deref(), Some(session.id()));
        assert_eq!(response.results[0].status, StepStatus::Executed);
        assert_eq!(
            states(&session),
            vec![
                SessionState::Planning,
                SessionState::Executing,
                SessionState::Aggregating,
                SessionState::Done
            ]
        );
        assert!(session.ended_at().is_some());
    }

    #[test]
    fn test_informational_answer_skips_execution() {
        let planner = Arc::new(CapturingPlanner {
            seen: Mutex::new(None),
        });
        let mut session = session(planner.clone(), store());
        let request = OrchestrationRequest::new("what is loaded?").with_context(json!({"zoom": 12}));

        let response = tokio_test::block_on(session.run(&request));

        assert!(response.is_success());
        assert_eq!(response.message, "Two layers are loaded.");
        assert!(response.results.is_empty());
        assert_eq!(
            states(&session),
            vec![SessionState::Planning, SessionState::Aggregating, SessionState::Done]
        );

        let seen = planner.seen.lock().unwrap();
        let context = seen.as_ref().expect("planner called");
        assert_eq!(context.result_base, 1);
        assert_eq!(context.layers.len(), 1);
        assert!(context.get_operation("buffer_layer").is_some());
        assert_eq!(context.request_context, json!({"zoom": 12}));
    }

    #[test]
    fn test_planner_failure_fails_session() {
        let base = store();
        let mut session = session(Arc::new(UnavailablePlanner), base.clone());

        let response = tokio_test::block_on(session.run(&OrchestrationRequest::new("buffer")));

        assert!(!response.is_success());
        assert!(response.message.contains("connection refused"));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(base.len().unwrap(), 1);
    }

    #[test]
    fn test_empty_query_is_rejected() {
        let mut session = session(Arc::new(UnavailablePlanner), store());
        let response = tokio_test::block_on(session.run(&OrchestrationRequest::new("  ")));

        assert!(!response.is_success());
        assert!(response.message.contains("query must not be empty"));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(states(&session), vec![SessionState::Failed]);
    }

    #[test]
    fn test_session_runs_only_once() {
        let planner = Arc::new(StaticPlanner::from_actions(Vec::new()));
        let mut session = session(planner, store());

        let first = tokio_test::block_on(session.run(&OrchestrationRequest::new("q")));
        assert!(first.is_success());
        let second = tokio_test::block_on(session.run(&OrchestrationRequest::new("q")));
        assert!(!second.is_success());
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn test_transition_table() {
        assert!(SessionState::Start.can_transition_to(SessionState::Planning));
        assert!(SessionState::Planning.can_transition_to(SessionState::Aggregating));
        assert!(SessionState::Executing.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Start.can_transition_to(SessionState::Executing));
        assert!(!SessionState::Done.can_transition_to(SessionState::Failed));
        assert!(!SessionState::Failed.can_transition_to(SessionState::Planning));
    }
}
