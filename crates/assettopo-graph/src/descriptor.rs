use crate::graph::{EdgeState, EdgeStatus, GraphContext, NodeState, Vec2};
use assettopo_core::{EdgeId, EdgeKind, LookupTable, NodeId, Side, TopologyError};
use serde::{Deserialize, Serialize};

/// Which side of a node an edge or control attaches to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSide {
    Left,
    Right,
    Top,
    Bottom,
}

impl AnchorSide {
    /// The side facing away from the root for nodes of `side`.
    pub fn away_from_root(side: Side) -> Self {
        match side {
            Side::Upstream => AnchorSide::Left,
            Side::Downstream => AnchorSide::Right,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            AnchorSide::Left => AnchorSide::Right,
            AnchorSide::Right => AnchorSide::Left,
            AnchorSide::Top => AnchorSide::Bottom,
            AnchorSide::Bottom => AnchorSide::Top,
        }
    }
}

/// Render-facing projection of a [`NodeState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub label: String,
    pub model_id: String,
    pub model_name: String,
    pub icon: Option<String>,
    pub side: Side,
    pub level: u32,
    pub position: Vec2,
    pub visible: bool,
    /// Root emphasis styling.
    pub emphasis: bool,
    /// Where the expand control sits, if the node offers one.
    pub expand_affordance: Option<AnchorSide>,
    /// Sides currently showing their children.
    pub expanded: Vec<Side>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub label: String,
    pub model_association_id: Option<String>,
    pub source_anchor: AnchorSide,
    pub target_anchor: AnchorSide,
    pub visible: bool,
}

pub fn node_descriptor(
    ctx: &GraphContext,
    node: &NodeState,
    lookup: &LookupTable,
) -> Result<NodeDescriptor, TopologyError> {
    let position = ctx
        .position(&node.id)
        .ok_or_else(|| TopologyError::MissingPosition(node.id.clone()))?;
    let root = node.is_root();
    let expand_affordance =
        (!root && node.can_expand()).then(|| AnchorSide::away_from_root(node.side));

    Ok(NodeDescriptor {
        id: node.id.clone(),
        label: node.inst_name.clone(),
        model_id: node.model_id.clone(),
        model_name: lookup.resolve_model_name(&node.model_id).to_string(),
        icon: lookup.resolve_model_icon(&node.model_id).map(str::to_string),
        side: node.side,
        level: node.level,
        position,
        visible: node.visible,
        emphasis: root,
        expand_affordance,
        expanded: node.expanded.clone(),
    })
}

/// Anchors keep lines off the expand controls: a tree edge leaves its source on
/// the away side and enters the target on the facing side, a bidirectional
/// edge loops over the top of both nodes.
pub fn edge_descriptor(
    ctx: &GraphContext,
    edge: &EdgeState,
    lookup: &LookupTable,
) -> Result<EdgeDescriptor, TopologyError> {
    let endpoint = |id: &NodeId| {
        ctx.node(id)
            .filter(|_| ctx.position(id).is_some())
            .ok_or_else(|| TopologyError::MissingPosition(id.clone()))
    };
    let source = endpoint(&edge.source)?;
    let target = endpoint(&edge.target)?;

    let (source_anchor, target_anchor) = match edge.kind {
        EdgeKind::Single => {
            let away = AnchorSide::away_from_root(edge.side);
            (away, away.opposite())
        }
        EdgeKind::Bidirectional => (AnchorSide::Top, AnchorSide::Top),
    };

    Ok(EdgeDescriptor {
        id: edge.id.clone(),
        source: edge.source.clone(),
        target: edge.target.clone(),
        kind: edge.kind,
        label: lookup
            .resolve_association_name(edge.association_type_id.as_deref())
            .to_string(),
        model_association_id: edge.model_association_id.clone(),
        source_anchor,
        target_anchor,
        visible: edge.status == EdgeStatus::Visible && source.visible && target.visible,
    })
}

/// Descriptors for the whole context, in materialization order. Pruned edges
/// and nodes without a position are left out.
pub fn describe(ctx: &GraphContext, lookup: &LookupTable) -> (Vec<NodeDescriptor>, Vec<EdgeDescriptor>) {
    let nodes = describe_nodes(ctx, ctx.nodes(), lookup);
    let edges = describe_edges(ctx, ctx.edges().filter(|edge| edge.is_present()), lookup);
    (nodes, edges)
}

pub fn describe_nodes<'a>(
    ctx: &GraphContext,
    nodes: impl IntoIterator<Item = &'a NodeState>,
    lookup: &LookupTable,
) -> Vec<NodeDescriptor> {
    nodes
        .into_iter()
        .filter_map(|node| match node_descriptor(ctx, node, lookup) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::debug!("Omitting node descriptor: {}", e);
                None
            }
        })
        .collect()
}

pub fn describe_edges<'a>(
    ctx: &GraphContext,
    edges: impl IntoIterator<Item = &'a EdgeState>,
    lookup: &LookupTable,
) -> Vec<EdgeDescriptor> {
    edges
        .into_iter()
        .filter_map(|edge| match edge_descriptor(ctx, edge, lookup) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                tracing::debug!("Omitting edge descriptor {}: {}", edge.id, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assettopo_core::{AssociationType, ModelInfo, RawChildNode, UNRESOLVED_LABEL};

    fn context() -> GraphContext {
        let mut ctx = GraphContext::new();
        let mut root = NodeState::from_raw(&RawChildNode::new("r", "host"), Side::Upstream, 1, None);
        root.visible = true;
        root.set_expanded(Side::Upstream, true);
        ctx.set_root(root);

        let raw = RawChildNode::new("a", "mysql").with_association("run").with_more(true);
        let mut a = NodeState::from_raw(&raw, Side::Upstream, 2, Some(NodeId::from("r")));
        a.visible = true;
        ctx.add_node(a);
        ctx.set_position(&NodeId::from("a"), Vec2::new(-260.0, 0.0));
        let idx = ctx
            .add_edge(EdgeState::new(&NodeId::from("r"), &NodeId::from("a"), EdgeKind::Single, Side::Upstream).with_association(&raw))
            .unwrap();
        ctx[idx].status = EdgeStatus::Visible;
        ctx
    }

    fn lookup() -> LookupTable {
        LookupTable::from_association_types(vec![AssociationType {
            asst_id: "run".to_string(),
            asst_name: "runs on".to_string(),
        }])
        .with_models(vec![ModelInfo {
            model_id: "mysql".to_string(),
            model_name: "MySQL".to_string(),
            icon: Some("cc-mysql".to_string()),
        }])
    }

    #[test]
    fn test_root_has_emphasis_and_no_affordance() {
        let ctx = context();
        let (nodes, _) = describe(&ctx, &lookup());
        let root = &nodes[0];
        assert!(root.emphasis);
        assert_eq!(root.expand_affordance, None);
        assert_eq!(root.position, Vec2::new(0.0, 0.0));
        assert_eq!(root.model_name, UNRESOLVED_LABEL);
    }

    #[test]
    fn test_upstream_node_offers_left_affordance() {
        let ctx = context();
        let (nodes, edges) = describe(&ctx, &lookup());
        let a = &nodes[1];
        assert_eq!(a.expand_affordance, Some(AnchorSide::Left));
        assert_eq!(a.model_name, "MySQL");
        assert_eq!(a.icon.as_deref(), Some("cc-mysql"));

        let edge = &edges[0];
        assert_eq!(edge.label, "runs on");
        assert_eq!(edge.source_anchor, AnchorSide::Left);
        assert_eq!(edge.target_anchor, AnchorSide::Right);
        assert!(edge.visible);
    }

    #[test]
    fn test_missing_position_omits_node_and_edge() {
        let mut ctx = context();
        let raw = RawChildNode::new("b", "host");
        ctx.add_node(NodeState::from_raw(&raw, Side::Upstream, 3, Some(NodeId::from("a"))));
        ctx.add_edge(EdgeState::new(&NodeId::from("a"), &NodeId::from("b"), EdgeKind::Single, Side::Upstream));

        let (nodes, edges) = describe(&ctx, &lookup());
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);
        assert!(matches!(
            node_descriptor(&ctx, ctx.node(&NodeId::from("b")).unwrap(), &lookup()),
            Err(TopologyError::MissingPosition(_))
        ));
    }

    #[test]
    fn test_unresolved_association_uses_placeholder() {
        let ctx = context();
        let (_, edges) = describe(&ctx, &LookupTable::new());
        assert_eq!(edges[0].label, UNRESOLVED_LABEL);
    }
}
