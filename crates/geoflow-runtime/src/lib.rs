//! # Geoflow Runtime
//!
//! Turns a user query into executed geometry operations:
//!
//! - [`OrchestrationSession`]: one request through plan, execute and aggregate
//! - [`Orchestrator`]: hands each request a session and a store
//! - [`RuntimeApp`]: builds everything from a `geoflow.yaml`

pub mod bootstrap;
pub mod orchestrator;
pub mod response;
pub mod session;

pub use bootstrap::{init_tracing_if_needed, load_layers, BootstrapError, RuntimeApp};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use response::{
    GeojsonStep, OrchestrationRequest, OrchestrationResponse, ResponseStatus, StepReport,
};
pub use session::{OrchestrationSession, SessionError, SessionId, SessionState, StateTransition};
