//! Dependency tracker
//!
//! Builds and resolves the execution graph for one batch of planned actions.
//! A node depends on every `Result_N` placeholder found among its raw
//! parameter values. Resolution is breadth-first: each call to
//! [`DependencyTracker::executable_nodes`] yields one wave.
//!
//! Completion, not success, satisfies a dependency edge. A node that
//! finished without a value still unblocks its dependents; those see the
//! reference dropped from their parameters and fail on the missing value.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde_json::Value;

use crate::types::{placeholder_index, LayerId, Params};

/// Node status in the dependency graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Registered, not yet run
    Pending,
    /// Finished, with or without a value
    Completed,
    /// Abandoned: can never become executable
    Failed,
}

/// One registered action with its derived dependencies
#[derive(Debug, Clone)]
pub struct OperationNode {
    /// Placeholder identifier (`Result_N`)
    pub id: LayerId,
    /// 1-based position in the planned list
    pub step: usize,
    pub action: String,
    pub params: Params,
    /// Placeholders referenced by `params`, in first-seen order. Fixed at
    /// registration.
    pub dependencies: Vec<LayerId>,
    pub status: NodeStatus,
}

/// Why a pending node can never run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The node references its own output
    SelfReference,
    /// The node references a placeholder no node in the batch produces
    UnknownReference(LayerId),
    /// The node sits on a dependency cycle (path starts and ends at the node)
    Cycle(Vec<LayerId>),
    /// The node waits on another node that can never run
    BlockedBy(LayerId),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfReference => write!(f, "step references its own result"),
            Self::UnknownReference(id) => {
                write!(f, "'{}' is not produced by any step in this request", id)
            }
            Self::Cycle(path) => {
                let path: Vec<&str> = path.iter().map(LayerId::as_str).collect();
                write!(f, "dependency cycle {}", path.join(" -> "))
            }
            Self::BlockedBy(id) => write!(f, "waits on '{}', which can never run", id),
        }
    }
}

/// A node left pending when resolution stopped
#[derive(Debug, Clone)]
pub struct UnresolvedNode {
    pub node: OperationNode,
    pub reason: UnresolvedReason,
}

/// Dependency graph for one batch of actions
#[derive(Debug, Default)]
pub struct DependencyTracker {
    /// Nodes in registration order
    nodes: Vec<OperationNode>,
    index: HashMap<LayerId, usize>,
    /// Completed-results mapping; `None` marks a finished node without value
    results: HashMap<LayerId, Option<Value>>,
    /// Placeholder -> permanent store identifier
    aliases: HashMap<LayerId, LayerId>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node and record its dependencies. Never fails: values that do
    /// not match the placeholder pattern are plain literals, and a repeated
    /// `node_id` is ignored.
    pub fn register(
        &mut self,
        node_id: impl Into<LayerId>,
        step: usize,
        action: impl Into<String>,
        params: Params,
    ) {
        let id = node_id.into();
        if self.index.contains_key(&id) {
            tracing::warn!(node_id = %id, "duplicate node registration ignored");
            return;
        }
        let dependencies = extract_dependencies(&params);
        tracing::debug!(
            node_id = %id,
            step = step,
            dependencies = ?dependencies,
            "node registered"
        );
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(OperationNode {
            id,
            step,
            action: action.into(),
            params,
            dependencies,
            status: NodeStatus::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&OperationNode> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node(node_id).map(|node| node.status)
    }

    /// One wave: pending nodes whose dependencies have all completed, in
    /// registration order.
    pub fn executable_nodes(&self) -> Vec<OperationNode> {
        self.nodes
            .iter()
            .filter(|node| node.status == NodeStatus::Pending)
            .filter(|node| {
                node.dependencies
                    .iter()
                    .all(|dep| self.results.contains_key(dep))
            })
            .cloned()
            .collect()
    }

    /// Mark a node finished and record its value (absent for failures).
    pub fn complete(&mut self, node_id: &str, value: Option<Value>) {
        let Some(&i) = self.index.get(node_id) else {
            tracing::warn!(node_id = %node_id, "complete called for unknown node");
            return;
        };
        let node = &mut self.nodes[i];
        node.status = NodeStatus::Completed;
        self.results.insert(node.id.clone(), value);
    }

    /// Remember that a placeholder's output now lives under `permanent`.
    pub fn register_alias(&mut self, placeholder: impl Into<LayerId>, permanent: impl Into<LayerId>) {
        self.aliases.insert(placeholder.into(), permanent.into());
    }

    /// Substitute completed references in `params`.
    ///
    /// Aliased placeholders become the permanent layer identifier; other
    /// completed placeholders become their stored value. A reference to a
    /// node that finished without a value drops the whole parameter, including
    /// when it sits inside an array, so the operation's required-parameter
    /// check reports it. Everything else passes through.
    pub fn resolve(&self, params: &Params) -> Params {
        params
            .iter()
            .filter_map(|(name, value)| {
                self.resolve_value(value)
                    .map(|resolved| (name.clone(), resolved))
            })
            .collect()
    }

    fn resolve_value(&self, value: &Value) -> Option<Value> {
        match value {
            Value::String(s) => match self.results.get(s.as_str()) {
                Some(stored) => match self.aliases.get(s.as_str()) {
                    Some(alias) => Some(Value::String(alias.to_string())),
                    None => stored.clone(),
                },
                None => Some(value.clone()),
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            other => Some(other.clone()),
        }
    }

    /// True once no node is pending
    pub fn is_settled(&self) -> bool {
        self.nodes
            .iter()
            .all(|node| node.status != NodeStatus::Pending)
    }

    /// Diagnose every pending node. Only meaningful once
    /// [`executable_nodes`](Self::executable_nodes) returns an empty wave.
    pub fn unresolved(&self) -> Vec<UnresolvedNode> {
        self.nodes
            .iter()
            .filter(|node| node.status == NodeStatus::Pending)
            .map(|node| UnresolvedNode {
                node: node.clone(),
                reason: self.diagnose(node),
            })
            .collect()
    }

    /// Diagnose pending nodes and mark them failed.
    pub fn abandon_unresolved(&mut self) -> Vec<UnresolvedNode> {
        let unresolved = self.unresolved();
        for item in &unresolved {
            if let Some(&i) = self.index.get(&item.node.id) {
                self.nodes[i].status = NodeStatus::Failed;
            }
        }
        unresolved
    }

    fn diagnose(&self, node: &OperationNode) -> UnresolvedReason {
        if node.dependencies.contains(&node.id) {
            return UnresolvedReason::SelfReference;
        }
        let waiting: Vec<&LayerId> = node
            .dependencies
            .iter()
            .filter(|dep| !self.results.contains_key(*dep))
            .collect();
        if let Some(unknown) = waiting.iter().find(|dep| !self.index.contains_key(**dep)) {
            return UnresolvedReason::UnknownReference((*unknown).clone());
        }
        if let Some(path) = self.cycle_through(&node.id) {
            return UnresolvedReason::Cycle(path);
        }
        match waiting.first() {
            Some(dep) => UnresolvedReason::BlockedBy((*dep).clone()),
            None => UnresolvedReason::BlockedBy(node.id.clone()),
        }
    }

    /// Path `start -> ... -> start` along unfinished dependency edges, if any.
    fn cycle_through(&self, start: &LayerId) -> Option<Vec<LayerId>> {
        let mut stack: Vec<(LayerId, Vec<LayerId>)> = vec![(start.clone(), vec![start.clone()])];
        let mut visited: HashSet<LayerId> = HashSet::new();
        while let Some((current, path)) = stack.pop() {
            let Some(node) = self.node(current.as_str()) else {
                continue;
            };
            for dep in &node.dependencies {
                if self.results.contains_key(dep) {
                    continue;
                }
                if dep == start {
                    let mut cycle = path.clone();
                    cycle.push(start.clone());
                    return Some(cycle);
                }
                if visited.insert(dep.clone()) {
                    let mut next = path.clone();
                    next.push(dep.clone());
                    stack.push((dep.clone(), next));
                }
            }
        }
        None
    }
}

fn extract_dependencies(params: &Params) -> Vec<LayerId> {
    let mut found = Vec::new();
    for value in params.values() {
        collect_placeholders(value, &mut found);
    }
    found
}

fn collect_placeholders(value: &Value, found: &mut Vec<LayerId>) {
    match value {
        Value::String(s) if placeholder_index(s).is_some() => {
            let id = LayerId::new(s.clone());
            if !found.contains(&id) {
                found.push(id);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_placeholders(item, found);
            }
        }
        _ => {}
    }
}
