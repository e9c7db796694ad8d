//! Core type definitions for geoflow
//!
//! - Layer: immutable vector dataset (features + CRS)
//! - LayerId: store key or `Result_N` placeholder
//! - PlannedAction: one requested operation with raw parameters
//! - StepResult: outcome of executing one action

mod action;
mod layer;
mod layer_id;
mod step;

pub use action::{Params, PlannedAction};
pub use layer::{Crs, Feature, Layer, LayerError, LayerSummary, Properties};
pub use layer_id::{placeholder_index, LayerId};
pub use step::{StepResult, StepStatus};
