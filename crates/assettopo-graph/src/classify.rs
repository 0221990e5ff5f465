use crate::graph::GraphContext;
use assettopo_core::{EdgeKind, NodeId};

/// How to connect an expanding node to a child id that is already materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeClassification {
    /// The child is an ancestor of the expanding node.
    Bidirectional,
    /// The child already has an edge from the expanding node.
    Skip,
    /// Reuse the existing node through a new plain edge.
    Single,
}

impl EdgeClassification {
    pub fn edge_kind(self) -> Option<EdgeKind> {
        match self {
            EdgeClassification::Bidirectional => Some(EdgeKind::Bidirectional),
            EdgeClassification::Single => Some(EdgeKind::Single),
            EdgeClassification::Skip => None,
        }
    }
}

/// Classify the `parent -> child` edge discovered while expanding `parent`.
/// Only live (non-pruned) edges are considered.
pub fn classify(ctx: &GraphContext, parent: &NodeId, child: &NodeId) -> EdgeClassification {
    if ctx.is_ancestor(child, parent) {
        return EdgeClassification::Bidirectional;
    }
    if ctx.predecessors(child).contains(parent) {
        return EdgeClassification::Skip;
    }
    EdgeClassification::Single
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeState, NodeState};
    use assettopo_core::{RawChildNode, Side};

    fn chain(ids: &[&str]) -> GraphContext {
        let mut ctx = GraphContext::new();
        for (level, id) in ids.iter().enumerate() {
            let raw = RawChildNode::new(*id, "host");
            ctx.add_node(NodeState::from_raw(&raw, Side::Downstream, level as u32 + 1, None));
        }
        for pair in ids.windows(2) {
            ctx.add_edge(EdgeState::new(
                &NodeId::from(pair[0]),
                &NodeId::from(pair[1]),
                EdgeKind::Single,
                Side::Downstream,
            ));
        }
        ctx
    }

    #[test]
    fn test_grandparent_is_bidirectional() {
        let ctx = chain(&["r", "a", "b", "n"]);
        assert_eq!(
            classify(&ctx, &NodeId::from("n"), &NodeId::from("a")),
            EdgeClassification::Bidirectional
        );
    }

    #[test]
    fn test_existing_edge_is_skipped() {
        let ctx = chain(&["r", "a", "b"]);
        assert_eq!(
            classify(&ctx, &NodeId::from("a"), &NodeId::from("b")),
            EdgeClassification::Skip
        );
    }

    #[test]
    fn test_unrelated_node_is_reused() {
        let mut ctx = chain(&["r", "a", "b"]);
        ctx.add_node(NodeState::from_raw(&RawChildNode::new("x", "host"), Side::Downstream, 2, None));
        let classification = classify(&ctx, &NodeId::from("b"), &NodeId::from("x"));
        assert_eq!(classification, EdgeClassification::Single);
        assert_eq!(classification.edge_kind(), Some(EdgeKind::Single));
    }
}
