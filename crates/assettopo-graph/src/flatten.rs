use crate::config::LayoutConfig;
use crate::graph::{EdgeIndex, EdgeState, EdgeStatus, GraphContext, NodeState};
use assettopo_core::{EdgeKind, NodeId, RawChildNode, Side, TopologyError};

/// What one flatten pass added to the graph context.
#[derive(Debug, Default)]
pub struct FlattenReport {
    pub added_nodes: Vec<NodeId>,
    pub added_edges: Vec<EdgeIndex>,
    /// Nodes omitted with their subtree.
    pub skipped: Vec<TopologyError>,
}

/// Second walk over a side tree. Materializes every node that got a position
/// into the [`GraphContext`] and emits one edge per parent/child occurrence.
///
/// Ids that are already materialized (a diamond, a repeat across sides) only
/// contribute an edge; when the repeated id is on the current ancestor path the
/// edge is bidirectional.
pub struct GraphFlattener<'a> {
    config: &'a LayoutConfig,
}

struct PathEntry<'t> {
    id: &'t NodeId,
    parent: Option<usize>,
    level: u32,
}

impl<'a> GraphFlattener<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self { config }
    }

    /// Flatten the `children` of `root_id`, which must already be in `ctx`.
    pub fn flatten(
        &self,
        ctx: &mut GraphContext,
        root_id: &NodeId,
        children: &[RawChildNode],
        side: Side,
    ) -> FlattenReport {
        let mut report = FlattenReport::default();
        let Some(root_level) = ctx.node(root_id).map(|root| root.level) else {
            report.skipped.push(TopologyError::UnknownNode(root_id.clone()));
            return report;
        };

        let mut path = vec![PathEntry {
            id: root_id,
            parent: None,
            level: root_level,
        }];
        let mut stack: Vec<(&RawChildNode, usize)> =
            children.iter().rev().map(|child| (child, 0)).collect();

        while let Some((raw, parent_slot)) = stack.pop() {
            let parent_id = path[parent_slot].id;
            if raw.id.is_empty() {
                tracing::debug!(parent = %parent_id, "Skipping node without id and its subtree");
                report.skipped.push(TopologyError::MalformedNode {
                    parent: Some(parent_id.clone()),
                });
                continue;
            }
            if &raw.id == parent_id {
                continue;
            }

            if ctx.contains(&raw.id) {
                let kind = if Self::on_path(&path, parent_slot, &raw.id) {
                    EdgeKind::Bidirectional
                } else {
                    EdgeKind::Single
                };
                if let Some(edge) = self.link(ctx, parent_id, raw, kind, side) {
                    report.added_edges.push(edge);
                }
                continue;
            }

            if ctx.position(&raw.id).is_none() {
                tracing::debug!("No position computed for {}, omitting it", raw.id);
                report
                    .skipped
                    .push(TopologyError::MissingPosition(raw.id.clone()));
                continue;
            }

            let level = path[parent_slot].level + 1;
            let mut state = NodeState::from_raw(raw, side, level, Some(parent_id.clone()));
            state.visible = level <= self.config.expansion_depth;
            state.set_expanded(side, level < self.config.expansion_depth && !raw.children.is_empty());
            ctx.add_node(state);
            report.added_nodes.push(raw.id.clone());

            if let Some(edge) = self.link(ctx, parent_id, raw, EdgeKind::Single, side) {
                report.added_edges.push(edge);
            }

            let slot = path.len();
            path.push(PathEntry {
                id: &raw.id,
                parent: Some(parent_slot),
                level,
            });
            stack.extend(raw.children.iter().rev().map(|child| (child, slot)));
        }

        report
    }

    fn link(
        &self,
        ctx: &mut GraphContext,
        source: &NodeId,
        child: &RawChildNode,
        kind: EdgeKind,
        side: Side,
    ) -> Option<EdgeIndex> {
        let idx = ctx.add_edge(EdgeState::new(source, &child.id, kind, side).with_association(child))?;
        let source_expanded = ctx
            .node(source)
            .is_some_and(|node| node.is_expanded(side) && node.visible);
        let target_visible = ctx.node(&child.id).is_some_and(|node| node.visible);
        if source_expanded && target_visible {
            ctx[idx].status = EdgeStatus::Visible;
        }
        Some(idx)
    }

    fn on_path(path: &[PathEntry<'_>], from: usize, id: &NodeId) -> bool {
        let mut cursor = Some(from);
        while let Some(slot) = cursor {
            if path[slot].id == id {
                return true;
            }
            cursor = path[slot].parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levels::LevelCollector;
    use crate::position::PositionCalculator;
    use std::collections::HashSet;

    fn leaf(id: &str) -> RawChildNode {
        RawChildNode::new(id, "host")
    }

    fn build(tree: &RawChildNode, config: &LayoutConfig) -> (GraphContext, FlattenReport) {
        let mut ctx = GraphContext::new();
        let mut root = NodeState::from_raw(tree, Side::Downstream, 1, None);
        root.visible = true;
        root.set_expanded(Side::Downstream, true);
        ctx.set_root(root);

        let levels = LevelCollector::collect_children(&tree.id, &tree.children, &mut HashSet::new());
        PositionCalculator::new(config).compute(&levels, Side::Downstream, ctx.positions_mut());
        let report = GraphFlattener::new(config).flatten(&mut ctx, &tree.id, &tree.children, Side::Downstream);
        (ctx, report)
    }

    #[test]
    fn test_initial_visibility_follows_expansion_depth() {
        let config = LayoutConfig::default();
        let tree = leaf("r").with_children(vec![leaf("a").with_children(vec![
            leaf("b").with_children(vec![leaf("c")]),
        ])]);

        let (ctx, report) = build(&tree, &config);

        assert_eq!(report.added_nodes.len(), 3);
        let a = ctx.node(&NodeId::from("a")).unwrap();
        let b = ctx.node(&NodeId::from("b")).unwrap();
        let c = ctx.node(&NodeId::from("c")).unwrap();
        assert!(a.visible && a.is_expanded(Side::Downstream));
        assert!(b.visible && !b.is_expanded(Side::Downstream));
        assert!(!c.visible);
        assert_eq!(c.level, 4);

        let bc = ctx.edge_between(&b.id, &c.id).unwrap();
        assert_eq!(ctx[bc].status, EdgeStatus::Hidden);
        let ab = ctx.edge_between(&a.id, &b.id).unwrap();
        assert_eq!(ctx[ab].status, EdgeStatus::Visible);
    }

    #[test]
    fn test_diamond_materializes_shared_child_once() {
        let config = LayoutConfig::default();
        let tree = leaf("r").with_children(vec![
            leaf("a").with_children(vec![leaf("c").with_association("run")]),
            leaf("b").with_children(vec![leaf("c").with_association("connect")]),
        ]);

        let (ctx, _) = build(&tree, &config);

        assert_eq!(ctx.node_count(), 4);
        assert_eq!(ctx.predecessors(&NodeId::from("c")).len(), 2);
        let bc = ctx.edge_between(&NodeId::from("b"), &NodeId::from("c")).unwrap();
        assert_eq!(ctx[bc].kind, EdgeKind::Single);
        assert_eq!(ctx[bc].association_type_id.as_deref(), Some("connect"));
    }

    #[test]
    fn test_ancestor_repeat_becomes_bidirectional() {
        let config = LayoutConfig::default();
        let tree = leaf("r").with_children(vec![leaf("a").with_children(vec![leaf("r")])]);

        let (ctx, _) = build(&tree, &config);

        assert_eq!(ctx.node_count(), 2);
        let back = ctx.edge_between(&NodeId::from("a"), &NodeId::from("r")).unwrap();
        assert_eq!(ctx[back].kind, EdgeKind::Bidirectional);
    }

    #[test]
    fn test_empty_ids_are_reported_and_skipped() {
        let config = LayoutConfig::default();
        let tree = leaf("r").with_children(vec![
            leaf("").with_children(vec![leaf("orphan")]),
            leaf("a"),
        ]);

        let (ctx, report) = build(&tree, &config);

        assert!(!ctx.contains(&NodeId::from("orphan")));
        assert_eq!(report.added_nodes, vec![NodeId::from("a")]);
        assert!(matches!(
            report.skipped.as_slice(),
            [TopologyError::MalformedNode { .. }]
        ));
    }

    #[test]
    fn test_node_without_position_is_omitted() {
        let config = LayoutConfig::default();
        let tree = leaf("r").with_children(vec![leaf("a").with_children(vec![leaf("a1")])]);
        let mut ctx = GraphContext::new();
        let mut root = NodeState::from_raw(&tree, Side::Downstream, 1, None);
        root.set_expanded(Side::Downstream, true);
        ctx.set_root(root);

        let report = GraphFlattener::new(&config).flatten(&mut ctx, &tree.id, &tree.children, Side::Downstream);

        assert_eq!(ctx.node_count(), 1);
        assert_eq!(ctx.edge_count(), 0);
        assert_eq!(
            report.skipped,
            vec![TopologyError::MissingPosition(NodeId::from("a"))]
        );
    }
}
