//! Orchestrator - hands every request its own session
//!
//! Owns the long-lived pieces (planner, operation registry, base store) and
//! decides which store a new session works on.

use std::sync::Arc;

use geoflow_config::StoreScope;
use geoflow_core::operation::OperationRegistry;
use geoflow_core::planner::Planner;
use geoflow_core::store::{LayerStore, StoreError};
use geoflow_stores::InMemoryLayerStore;

use crate::response::{OrchestrationRequest, OrchestrationResponse};
use crate::session::OrchestrationSession;

/// Orchestrator configuration
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub store_scope: StoreScope,
    pub report_unresolved: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            store_scope: StoreScope::Session,
            report_unresolved: true,
        }
    }
}

/// Orchestrator - wires planner + registry + store for each request
pub struct Orchestrator {
    pub planner: Arc<dyn Planner>,
    pub registry: Arc<OperationRegistry>,
    base_store: Arc<InMemoryLayerStore>,
    pub config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        registry: Arc<OperationRegistry>,
        base_store: Arc<InMemoryLayerStore>,
    ) -> Self {
        Self::with_config(planner, registry, base_store, OrchestratorConfig::default())
    }

    pub fn with_config(
        planner: Arc<dyn Planner>,
        registry: Arc<OperationRegistry>,
        base_store: Arc<InMemoryLayerStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            planner,
            registry,
            base_store,
            config,
        }
    }

    /// Same registry, store and config; different planner.
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = planner;
        self
    }

    /// Layers visible to new sessions
    pub fn base_store(&self) -> &Arc<InMemoryLayerStore> {
        &self.base_store
    }

    /// Store for a new session: a fork of the base store, or the base store
    /// itself when sessions share one.
    pub fn session_store(&self) -> Result<Arc<dyn LayerStore>, StoreError> {
        match self.config.store_scope {
            StoreScope::Session => Ok(Arc::new(self.base_store.fork()?)),
            StoreScope::Shared => Ok(self.base_store.clone()),
        }
    }

    /// Create a session without running it
    pub fn session(&self) -> Result<OrchestrationSession, StoreError> {
        let store = self.session_store()?;
        Ok(
            OrchestrationSession::new(self.planner.clone(), self.registry.clone(), store)
                .with_unresolved_reporting(self.config.report_unresolved),
        )
    }

    /// Handle one request end-to-end (plan → execute → aggregate)
    pub async fn handle(&self, request: &OrchestrationRequest) -> OrchestrationResponse {
        let mut session = match self.session() {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(error = %err, "cannot create session store");
                return OrchestrationResponse::error(format!("store error: {}", err), &[]);
            }
        };
        tracing::info!(
            session_id = %session.id(),
            scope = ?self.config.store_scope,
            query_len = request.query.len(),
            "session started"
        );
        session.run(request).await
    }
}
