use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod lookup;
pub mod raw;

pub use error::{FetchError, TopologyError};
pub use lookup::{AssociationType, LookupTable, ModelInfo, UNRESOLVED_LABEL};
pub use raw::{RawChildNode, TopologyPayload, WireId, WireNode};

/// Stable instance id of an asset.
///
/// The relationship service hands out integer ids, but the engine treats them as
/// opaque strings so that hosts with other id schemes can reuse it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nodes without an identifiable id are never materialized.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Render-facing edge id, `"{source}->{target}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    pub fn between(source: &NodeId, target: &NodeId) -> Self {
        Self(format!("{}->{}", source, target))
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which relationship tree of the focal asset a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The `src` tree. Laid out towards negative x.
    #[serde(rename = "src", alias = "upstream")]
    Upstream,
    /// The `dst` tree. Laid out towards positive x.
    #[serde(rename = "dst", alias = "downstream")]
    Downstream,
}

impl Side {
    /// Horizontal sign pointing away from the root.
    pub fn direction(self) -> f32 {
        match self {
            Side::Upstream => -1.0,
            Side::Downstream => 1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Upstream => write!(f, "src"),
            Side::Downstream => write!(f, "dst"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Plain parent -> child relationship.
    #[default]
    Single,
    /// An ancestor re-appearing as a descendant.
    Bidirectional,
}
