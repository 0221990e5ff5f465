//! Boundary shapes for relationship trees.
//!
//! [`WireNode`] mirrors what the relationship service sends: every field is
//! optional and ids may be integers or strings. [`RawChildNode`] is the closed
//! shape the engine works with; conversion drops entries that can't be
//! identified instead of carrying optional fields through the layout passes.

use crate::{NodeId, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Int(i64),
    Str(String),
}

impl WireId {
    fn into_node_id(self) -> Option<NodeId> {
        let id = match self {
            WireId::Int(value) => NodeId(value.to_string()),
            WireId::Str(value) => NodeId(value.trim().to_string()),
        };
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireNode {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub inst_name: Option<String>,
    #[serde(default)]
    pub ip_addr: Option<String>,
    #[serde(default)]
    pub has_more: Option<bool>,
    #[serde(default)]
    pub asst_id: Option<String>,
    #[serde(default)]
    pub model_asst_id: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<WireNode>>,
}

/// A validated relationship-tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChildNode {
    pub id: NodeId,
    pub model_id: String,
    pub inst_name: String,
    #[serde(default)]
    pub has_more: bool,
    /// Association type of the edge from the parent (`asst_id`).
    #[serde(default)]
    pub association_type_id: Option<String>,
    /// Model-level association id of the edge from the parent (`model_asst_id`).
    #[serde(default)]
    pub model_association_id: Option<String>,
    #[serde(default)]
    pub children: Vec<RawChildNode>,
}

impl RawChildNode {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            inst_name: id.clone(),
            id: NodeId(id),
            model_id: model_id.into(),
            has_more: false,
            association_type_id: None,
            model_association_id: None,
            children: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.inst_name = name.into();
        self
    }

    pub fn with_association(mut self, assoc_id: impl Into<String>) -> Self {
        self.association_type_id = Some(assoc_id.into());
        self
    }

    pub fn with_more(mut self, has_more: bool) -> Self {
        self.has_more = has_more;
        self
    }

    pub fn with_children(mut self, children: Vec<RawChildNode>) -> Self {
        self.children = children;
        self
    }

    /// Validate a wire node. Returns `None` when the node has no usable id; its
    /// subtree is dropped with it. `dropped` counts every discarded entry.
    pub fn from_wire(wire: WireNode, dropped: &mut usize) -> Option<Self> {
        Self::from_wire_under(wire, None, dropped)
    }

    fn from_wire_under(
        wire: WireNode,
        parent: Option<&NodeId>,
        dropped: &mut usize,
    ) -> Option<Self> {
        let Some(id) = wire.id.and_then(WireId::into_node_id) else {
            *dropped += 1;
            tracing::debug!(parent = ?parent, "Dropping relationship node without id");
            return None;
        };

        if parent == Some(&id) {
            *dropped += 1;
            tracing::debug!("Dropping self-referencing relationship {}", id);
            return None;
        }

        let inst_name = wire
            .inst_name
            .filter(|name| !name.is_empty())
            .or(wire.ip_addr)
            .unwrap_or_else(|| id.0.clone());

        let children = wire
            .children
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| Self::from_wire_under(child, Some(&id), dropped))
            .collect();

        Some(Self {
            model_id: wire.model_id.unwrap_or_default(),
            inst_name,
            has_more: wire.has_more.unwrap_or(false),
            association_type_id: wire.asst_id,
            model_association_id: wire.model_asst_id,
            children,
            id,
        })
    }
}

/// The `{src_result, dst_result}` envelope returned by the topology endpoints.
///
/// The service answers `{}` for a side with no relationships, which deserializes
/// into an id-less [`WireNode`] and validates to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyPayload {
    #[serde(default, alias = "srcResult")]
    pub src_result: Option<WireNode>,
    #[serde(default, alias = "dstResult")]
    pub dst_result: Option<WireNode>,
}

impl TopologyPayload {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate both trees. Returns `(src, dst, dropped_count)`.
    pub fn into_trees(self) -> (Option<RawChildNode>, Option<RawChildNode>, usize) {
        let mut dropped = 0;
        let src = self
            .src_result
            .and_then(|wire| RawChildNode::from_wire(wire, &mut dropped));
        let dst = self
            .dst_result
            .and_then(|wire| RawChildNode::from_wire(wire, &mut dropped));
        (src, dst, dropped)
    }

    /// Children of the tree rooted at the expanded node on `side`.
    pub fn into_children(self, side: Side) -> Vec<RawChildNode> {
        let wire = match side {
            Side::Upstream => self.src_result,
            Side::Downstream => self.dst_result,
        };
        let mut dropped = 0;
        let children = wire
            .and_then(|wire| RawChildNode::from_wire(wire, &mut dropped))
            .map(|root| root.children)
            .unwrap_or_default();
        if dropped > 0 {
            tracing::debug!("Dropped {} malformed nodes from expansion payload", dropped);
        }
        children
    }
}
