use crate::graph::{EdgeIndex, EdgeStatus, GraphContext};
use assettopo_core::{NodeId, Side, TopologyError};
use std::collections::HashSet;

/// State changes made by one collapse or expand, for the render surface.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VisibilityDelta {
    pub shown_nodes: Vec<NodeId>,
    pub hidden_nodes: Vec<NodeId>,
    pub shown_edges: Vec<EdgeIndex>,
    pub hidden_edges: Vec<EdgeIndex>,
    /// Edges removed from the live graph; the surface drops them.
    pub pruned_edges: Vec<EdgeIndex>,
    /// Previously pruned edges put back; the surface has to re-add them.
    pub restored_edges: Vec<EdgeIndex>,
}

impl VisibilityDelta {
    pub fn is_empty(&self) -> bool {
        self.shown_nodes.is_empty()
            && self.hidden_nodes.is_empty()
            && self.shown_edges.is_empty()
            && self.hidden_edges.is_empty()
            && self.pruned_edges.is_empty()
            && self.restored_edges.is_empty()
    }
}

/// Show/hide cascades over one side of a node's subtree.
pub struct VisibilityPropagator {
    restore_pruned_edges: bool,
}

impl VisibilityPropagator {
    pub fn new(restore_pruned_edges: bool) -> Self {
        Self {
            restore_pruned_edges,
        }
    }

    /// Collapse `id` on `side`.
    ///
    /// A descendant that still has a visible incoming edge from some other
    /// visible node stays visible, and only the edge from the collapsing parent
    /// is pruned. Otherwise the edge and the descendant are hidden and the walk
    /// continues below it. Back-references (children at the same or a lower
    /// level) only lose their edge.
    pub fn collapse(
        &self,
        ctx: &mut GraphContext,
        id: &NodeId,
        side: Side,
    ) -> Result<VisibilityDelta, TopologyError> {
        let node = ctx
            .node_mut(id)
            .ok_or_else(|| TopologyError::UnknownNode(id.clone()))?;
        node.set_expanded(side, false);

        let mut delta = VisibilityDelta::default();
        let mut visited: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut stack = vec![id.clone()];

        while let Some(current) = stack.pop() {
            let Some(level) = ctx.node(&current).map(|node| node.level) else {
                continue;
            };
            let children: Vec<(EdgeIndex, NodeId)> = ctx
                .outgoing_edges(&current)
                .filter(|(_, edge)| edge.side == side)
                .map(|(idx, edge)| (idx, edge.target.clone()))
                .collect();

            for (edge_idx, child) in children {
                let Some(child_level) = ctx.node(&child).map(|node| node.level) else {
                    continue;
                };

                if child_level <= level {
                    Self::hide_edge(ctx, edge_idx, &mut delta);
                    continue;
                }

                if Self::other_visible_parents(ctx, &child, edge_idx) > 0 {
                    tracing::debug!("{} stays reachable, pruning edge {}", child, ctx[edge_idx].id);
                    ctx[edge_idx].status = EdgeStatus::Pruned;
                    delta.pruned_edges.push(edge_idx);
                    continue;
                }

                Self::hide_edge(ctx, edge_idx, &mut delta);
                if let Some(node) = ctx.node_mut(&child)
                    && node.visible
                {
                    node.visible = false;
                    delta.hidden_nodes.push(child.clone());
                }
                if visited.insert(child.clone()) {
                    stack.push(child);
                }
            }
        }

        Ok(delta)
    }

    /// Expand `id` on `side`: every known descendant becomes visible again.
    /// The walk only continues below descendants that were themselves expanded.
    /// Edges pruned by an earlier collapse stay pruned unless
    /// `restore_pruned_edges` is set.
    pub fn expand(
        &self,
        ctx: &mut GraphContext,
        id: &NodeId,
        side: Side,
    ) -> Result<VisibilityDelta, TopologyError> {
        let node = ctx
            .node_mut(id)
            .ok_or_else(|| TopologyError::UnknownNode(id.clone()))?;
        node.set_expanded(side, true);

        let mut delta = VisibilityDelta::default();
        let mut visited: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut stack = vec![id.clone()];

        while let Some(current) = stack.pop() {
            let Some(level) = ctx.node(&current).map(|node| node.level) else {
                continue;
            };
            let children: Vec<(EdgeIndex, NodeId, EdgeStatus)> = ctx
                .all_outgoing_edges(&current)
                .filter(|(_, edge)| edge.side == side)
                .map(|(idx, edge)| (idx, edge.target.clone(), edge.status))
                .collect();

            for (edge_idx, child, status) in children {
                let Some((child_level, child_visible, child_expanded)) = ctx
                    .node(&child)
                    .map(|node| (node.level, node.visible, node.is_expanded(side)))
                else {
                    continue;
                };

                let edge_live = match status {
                    EdgeStatus::Pruned if self.restore_pruned_edges => {
                        ctx[edge_idx].status = EdgeStatus::Hidden;
                        delta.restored_edges.push(edge_idx);
                        true
                    }
                    EdgeStatus::Pruned => false,
                    _ => true,
                };

                if child_level <= level {
                    if edge_live && child_visible {
                        Self::show_edge(ctx, edge_idx, &mut delta);
                    }
                    continue;
                }

                if edge_live {
                    Self::show_edge(ctx, edge_idx, &mut delta);
                }
                if !child_visible {
                    if let Some(node) = ctx.node_mut(&child) {
                        node.visible = true;
                    }
                    delta.shown_nodes.push(child.clone());
                }
                if child_expanded && visited.insert(child.clone()) {
                    stack.push(child);
                }
            }
        }

        Ok(delta)
    }

    fn other_visible_parents(ctx: &GraphContext, child: &NodeId, except: EdgeIndex) -> usize {
        ctx.incoming_edges(child)
            .filter(|(idx, edge)| {
                *idx != except
                    && edge.status == EdgeStatus::Visible
                    && ctx.node(&edge.source).is_some_and(|source| source.visible)
            })
            .count()
    }

    fn hide_edge(ctx: &mut GraphContext, idx: EdgeIndex, delta: &mut VisibilityDelta) {
        if ctx[idx].status == EdgeStatus::Visible {
            ctx[idx].status = EdgeStatus::Hidden;
            delta.hidden_edges.push(idx);
        }
    }

    fn show_edge(ctx: &mut GraphContext, idx: EdgeIndex, delta: &mut VisibilityDelta) {
        if ctx[idx].status == EdgeStatus::Hidden {
            ctx[idx].status = EdgeStatus::Visible;
            delta.shown_edges.push(idx);
        }
    }
}
