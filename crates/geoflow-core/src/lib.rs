//! # Geoflow Core
//!
//! Core abstractions and deterministic logic for geoflow.
//!
//! This crate contains:
//! - Layer / Feature / Crs / PlannedAction / StepResult definitions
//! - LayerStore / GeometryOperation / Planner abstractions
//! - Dependency tracking and wave-by-wave step execution
//!
//! This crate does NOT care about:
//! - How layers are loaded from disk
//! - How a user query becomes a list of actions
//! - How geometry math is performed
//! - How the response is delivered

pub mod operation;
pub mod planner;
pub mod processor;
pub mod store;
pub mod tracker;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::operation::{
        GeometryOperation, OperationError, OperationMeta, OperationOutput, OperationRegistry,
        RegistryError,
    };
    pub use crate::planner::{PlanError, Planner, PlannerContext, PlannerOutput};
    pub use crate::processor::{ActionProcessor, StepError};
    pub use crate::store::{LayerStore, StoreError};
    pub use crate::tracker::{DependencyTracker, NodeStatus, OperationNode, UnresolvedReason};
    pub use crate::types::{
        Crs, Feature, Layer, LayerError, LayerId, LayerSummary, Params, PlannedAction,
        StepResult, StepStatus,
    };
}

// Re-export key types at crate root
pub use operation::{GeometryOperation, OperationOutput, OperationRegistry};
pub use planner::{Planner, PlannerContext, PlannerOutput};
pub use processor::ActionProcessor;
pub use store::{LayerStore, StoreError};
pub use tracker::DependencyTracker;
pub use types::{Crs, Feature, Layer, LayerId, Params, PlannedAction, StepResult, StepStatus};
