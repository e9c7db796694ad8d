//! Parameter accessors shared by operation implementations.
//!
//! Planner output is loosely typed: numbers frequently arrive as strings.

use std::sync::Arc;

use serde_json::Value;

use super::OperationError;
use crate::store::LayerStore;
use crate::types::{Layer, Params};

/// Required string parameter
pub fn param_str<'a>(params: &'a Params, name: &str) -> Result<&'a str, OperationError> {
    match params.get(name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(OperationError::invalid_parameter(name, "empty string")),
        Some(other) => Err(OperationError::invalid_parameter(
            name,
            format!("expected string, got {}", other),
        )),
        None => Err(OperationError::invalid_parameter(name, "missing")),
    }
}

/// Optional string parameter; `null` counts as absent
pub fn param_str_opt<'a>(params: &'a Params, name: &str) -> Result<Option<&'a str>, OperationError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => param_str(params, name).map(Some),
    }
}

/// Required finite number, accepting numeric strings
pub fn param_f64(params: &Params, name: &str) -> Result<f64, OperationError> {
    let value = match params.get(name) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
        None => return Err(OperationError::invalid_parameter(name, "missing")),
    };
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(OperationError::invalid_parameter(
            name,
            "expected a finite number",
        )),
    }
}

/// Required layer-identifier parameter, fetched from the store
pub fn param_layer(
    params: &Params,
    name: &str,
    store: &dyn LayerStore,
) -> Result<Arc<Layer>, OperationError> {
    let id = param_str(params, name)?;
    Ok(store.get(id)?)
}
