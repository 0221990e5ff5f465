use crate::NodeId;
use thiserror::Error;

/// Conditions the engine recovers from locally. None of them are fatal to a host;
/// they are surfaced so callers and tests can tell what was degraded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    #[error("Malformed node under {parent:?}: missing identifiable id")]
    MalformedNode { parent: Option<NodeId> },
    #[error("Fetch for node {id} failed: {reason}")]
    FetchFailure { id: NodeId, reason: String },
    #[error("No position computed for node {0}")]
    MissingPosition(NodeId),
    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
}

/// Failure reported by the relationship-fetch collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Instance {0} not found")]
    NotFound(NodeId),
}

impl FetchError {
    pub fn into_topology_error(self, id: NodeId) -> TopologyError {
        TopologyError::FetchFailure {
            id,
            reason: self.to_string(),
        }
    }
}
