use crate::classify::{EdgeClassification, classify};
use crate::config::LayoutConfig;
use crate::graph::{EdgeIndex, EdgeState, GraphContext, NodeState};
use crate::position::PositionCalculator;
use crate::visibility::{VisibilityDelta, VisibilityPropagator};
use assettopo_core::{
    EdgeKind, FetchError, NodeId, RawChildNode, Side, TopologyError, TopologyPayload,
};
use assettopo_events::telemetry::{CommandTrace, TopologyCommand};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;

/// Arguments of one `fetch_more` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub model_id: String,
    pub inst_id: NodeId,
    /// Current live-graph neighbors of the node. The service leaves them out
    /// of the response.
    pub parent_ids: Vec<NodeId>,
    pub side: Side,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub children: Vec<RawChildNode>,
}

impl FetchResponse {
    /// The expand endpoint answers with a topology payload rooted at the
    /// expanded node; its children on `side` are the new relationships.
    pub fn from_payload(payload: TopologyPayload, side: Side) -> Self {
        Self {
            children: payload.into_children(side),
        }
    }
}

/// The relationship-fetch collaborator.
pub trait RelationshipFetcher {
    fn fetch_more(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpandOutcome {
    Expanded {
        added_nodes: usize,
        added_edges: usize,
        shown_nodes: usize,
    },
    AlreadyExpanded,
    /// A fetch for this node is outstanding.
    InFlight,
    NotVisible,
    UnknownNode,
    /// The node stays collapsed and can be expanded again.
    FetchFailed(TopologyError),
    /// The view was reloaded while the fetch was outstanding.
    Discarded,
}

/// An expansion waiting for its fetch.
#[derive(Debug, Clone)]
pub struct PendingExpansion {
    pub request: FetchRequest,
    pub generation: u64,
    /// Opened when the fetch was planned; closed by whoever merges it.
    pub trace: CommandTrace,
}

impl PendingExpansion {
    pub fn node_id(&self) -> &NodeId {
        &self.request.inst_id
    }
}

#[derive(Debug)]
pub enum ExpandPlan {
    /// Everything needed is already in the graph context. Carries the side
    /// to reveal.
    Local(Side),
    Fetch(PendingExpansion),
    Rejected(ExpandOutcome),
}

/// Graph changes made by one expansion.
#[derive(Debug, Default)]
pub struct ExpansionResult {
    pub added_nodes: Vec<NodeId>,
    pub added_edges: Vec<EdgeIndex>,
    pub delta: VisibilityDelta,
    pub skipped: Vec<TopologyError>,
}

impl ExpansionResult {
    pub fn outcome(&self) -> ExpandOutcome {
        ExpandOutcome::Expanded {
            added_nodes: self.added_nodes.len(),
            added_edges: self.added_edges.len(),
            shown_nodes: self.delta.shown_nodes.len(),
        }
    }
}

pub struct ExpansionController<'a> {
    config: &'a LayoutConfig,
}

impl<'a> ExpansionController<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self { config }
    }

    /// Decide how to expand `id` on `side`. Only the root has children on both
    /// sides; any other node expands on its own side. A fetch plan marks the
    /// node in flight; a rejected plan leaves the context untouched.
    pub fn plan(
        &self,
        ctx: &mut GraphContext,
        id: &NodeId,
        side: Side,
    ) -> ExpandPlan {
        let generation = ctx.generation();
        let neighbors = ctx.neighbors(id);
        let Some(node) = ctx.node_mut(id) else {
            return ExpandPlan::Rejected(ExpandOutcome::UnknownNode);
        };
        if node.in_flight {
            return ExpandPlan::Rejected(ExpandOutcome::InFlight);
        }
        let side = node.expansion_side(side);
        if node.is_expanded(side) {
            return ExpandPlan::Rejected(ExpandOutcome::AlreadyExpanded);
        }
        if !node.visible {
            return ExpandPlan::Rejected(ExpandOutcome::NotVisible);
        }

        let needs_fetch =
            node.has_more && !node.fetched && node.level >= self.config.expansion_depth;
        if !needs_fetch {
            return ExpandPlan::Local(side);
        }

        node.in_flight = true;
        ExpandPlan::Fetch(PendingExpansion {
            request: FetchRequest {
                model_id: node.model_id.clone(),
                inst_id: id.clone(),
                parent_ids: neighbors,
                side,
            },
            generation,
            trace: CommandTrace::for_node(TopologyCommand::ExpandNode, id, side),
        })
    }

    /// Expand using only data already delivered: embedded children still
    /// waiting to be materialized, then the show cascade.
    pub fn expand_local(
        &self,
        ctx: &mut GraphContext,
        id: &NodeId,
        side: Side,
    ) -> Result<ExpansionResult, TopologyError> {
        let mut result = ExpansionResult::default();
        let pending = ctx
            .node_mut(id)
            .map(|node| std::mem::take(&mut node.pending_children))
            .ok_or_else(|| TopologyError::UnknownNode(id.clone()))?;
        self.materialize(ctx, id, pending, &mut result);
        self.reveal(ctx, id, side, &mut result)?;
        Ok(result)
    }

    /// Merge a finished fetch. On failure the node stays collapsed and the
    /// context is otherwise unchanged. If the node was hidden in the meantime
    /// the children are merged hidden and the node stays collapsed.
    pub fn complete(
        &self,
        ctx: &mut GraphContext,
        pending: &PendingExpansion,
        response: Result<FetchResponse, FetchError>,
    ) -> Result<ExpansionResult, ExpandOutcome> {
        let id = pending.node_id();
        if pending.generation != ctx.generation() {
            tracing::warn!(
                "Discarding expansion of {} from a previous load (generation {} != {})",
                id,
                pending.generation,
                ctx.generation()
            );
            return Err(ExpandOutcome::Discarded);
        }
        let Some(node) = ctx.node_mut(id) else {
            return Err(ExpandOutcome::UnknownNode);
        };
        node.in_flight = false;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let error = e.into_topology_error(id.clone());
                tracing::warn!("{}", error);
                return Err(ExpandOutcome::FetchFailed(error));
            }
        };

        node.fetched = true;
        node.has_more = false;
        let visible = node.visible;
        let mut children = std::mem::take(&mut node.pending_children);
        children.extend(response.children);

        let mut result = ExpansionResult::default();
        self.materialize(ctx, id, children, &mut result);
        if !visible {
            // An ancestor collapsed while the fetch was outstanding.
            tracing::debug!("{} was hidden during its fetch, keeping it collapsed", id);
            return Ok(result);
        }
        self.reveal(ctx, id, pending.request.side, &mut result)
            .map_err(|_| ExpandOutcome::UnknownNode)?;
        Ok(result)
    }

    /// Merge `children` under `parent`. New ids become hidden nodes one level
    /// deeper, stacked around the parent; known ids are connected according
    /// to [`classify`].
    pub fn materialize(
        &self,
        ctx: &mut GraphContext,
        parent: &NodeId,
        children: Vec<RawChildNode>,
        result: &mut ExpansionResult,
    ) {
        let Some((level, side)) = ctx.node(parent).map(|node| (node.level, node.side)) else {
            return;
        };

        let mut batch_ids: HashSet<NodeId> = HashSet::new();
        let mut fresh: Vec<RawChildNode> = Vec::new();
        for child in children {
            if child.id.is_empty() {
                tracing::debug!("Skipping fetched child of {} without id", parent);
                result.skipped.push(TopologyError::MalformedNode {
                    parent: Some(parent.clone()),
                });
                continue;
            }
            if &child.id == parent {
                tracing::debug!("Skipping self-referencing child of {}", parent);
                continue;
            }
            if !batch_ids.insert(child.id.clone()) {
                continue;
            }
            if ctx.contains(&child.id) {
                self.connect_existing(ctx, parent, &child, side, result);
            } else {
                fresh.push(child);
            }
        }

        if fresh.is_empty() {
            return;
        }
        let Some(parent_position) = ctx.position(parent) else {
            tracing::debug!("No position for {}, dropping {} fetched children", parent, fresh.len());
            result
                .skipped
                .push(TopologyError::MissingPosition(parent.clone()));
            return;
        };
        let ids: Vec<NodeId> = fresh.iter().map(|child| child.id.clone()).collect();
        PositionCalculator::new(self.config).place_children(
            parent_position,
            side,
            &ids,
            ctx.positions_mut(),
        );

        for mut child in fresh {
            let mut state = NodeState::from_raw(&child, side, level + 1, Some(parent.clone()));
            state.pending_children = std::mem::take(&mut child.children);
            ctx.add_node(state);
            result.added_nodes.push(child.id.clone());
            if let Some(edge) =
                ctx.add_edge(EdgeState::new(parent, &child.id, EdgeKind::Single, side).with_association(&child))
            {
                result.added_edges.push(edge);
            }
        }
    }

    fn connect_existing(
        &self,
        ctx: &mut GraphContext,
        parent: &NodeId,
        child: &RawChildNode,
        side: Side,
        result: &mut ExpansionResult,
    ) {
        let classification = classify(ctx, parent, &child.id);
        let Some(kind) = classification.edge_kind() else {
            return;
        };
        tracing::debug!("Reusing {} under {} as {:?}", child.id, parent, kind);
        if let Some(edge) =
            ctx.add_edge(EdgeState::new(parent, &child.id, kind, side).with_association(child))
        {
            result.added_edges.push(edge);
        }
        let parent_visible = ctx.node(parent).is_some_and(|node| node.visible);
        if classification == EdgeClassification::Single
            && parent_visible
            && let Some(node) = ctx.node_mut(&child.id)
            && !node.visible
        {
            node.visible = true;
            result.delta.shown_nodes.push(child.id.clone());
        }
    }

    fn reveal(
        &self,
        ctx: &mut GraphContext,
        id: &NodeId,
        side: Side,
        result: &mut ExpansionResult,
    ) -> Result<(), TopologyError> {
        let delta = VisibilityPropagator::new(self.config.restore_pruned_edges).expand(ctx, id, side)?;
        result.delta.shown_nodes.extend(delta.shown_nodes);
        result.delta.hidden_nodes.extend(delta.hidden_nodes);
        result.delta.shown_edges.extend(delta.shown_edges);
        result.delta.hidden_edges.extend(delta.hidden_edges);
        result.delta.pruned_edges.extend(delta.pruned_edges);
        result.delta.restored_edges.extend(delta.restored_edges);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeStatus, Vec2};

    /// r(1) -> a(2) -> b(3), all visible, b collapsed with more to fetch.
    fn context() -> GraphContext {
        let mut ctx = GraphContext::new();
        let chain = [("r", 1), ("a", 2), ("b", 3)];
        for (i, (id, level)) in chain.iter().enumerate() {
            let raw = RawChildNode::new(*id, "host").with_more(*id == "b");
            let parent = (i > 0).then(|| NodeId::from(chain[i - 1].0));
            let mut state = NodeState::from_raw(&raw, Side::Downstream, *level, parent);
            state.visible = true;
            state.set_expanded(Side::Downstream, *id != "b");
            ctx.add_node(state);
            ctx.set_position(&NodeId::from(*id), Vec2::new(260.0 * i as f32, 0.0));
        }
        for pair in chain.windows(2) {
            let idx = ctx
                .add_edge(EdgeState::new(
                    &NodeId::from(pair[0].0),
                    &NodeId::from(pair[1].0),
                    EdgeKind::Single,
                    Side::Downstream,
                ))
                .unwrap();
            ctx[idx].status = EdgeStatus::Visible;
        }
        ctx
    }

    fn fetch_plan(ctx: &mut GraphContext, config: &LayoutConfig, id: &str) -> PendingExpansion {
        match ExpansionController::new(config).plan(ctx, &NodeId::from(id), Side::Downstream) {
            ExpandPlan::Fetch(pending) => pending,
            other => panic!("expected a fetch plan, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_requests_fetch_with_neighbors() {
        let config = LayoutConfig::default();
        let mut ctx = context();

        let pending = fetch_plan(&mut ctx, &config, "b");

        assert_eq!(pending.request.inst_id, NodeId::from("b"));
        assert_eq!(pending.request.parent_ids, vec![NodeId::from("a")]);
        assert!(ctx.node(&NodeId::from("b")).unwrap().in_flight);
        assert!(matches!(
            ExpansionController::new(&config).plan(&mut ctx, &NodeId::from("b"), Side::Downstream),
            ExpandPlan::Rejected(ExpandOutcome::InFlight)
        ));
    }

    #[test]
    fn test_plan_guards() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let controller = ExpansionController::new(&config);

        assert!(matches!(
            controller.plan(&mut ctx, &NodeId::from("a"), Side::Downstream),
            ExpandPlan::Rejected(ExpandOutcome::AlreadyExpanded)
        ));
        assert!(matches!(
            controller.plan(&mut ctx, &NodeId::from("404"), Side::Downstream),
            ExpandPlan::Rejected(ExpandOutcome::UnknownNode)
        ));
    }

    #[test]
    fn test_complete_materializes_new_children_around_parent() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let pending = fetch_plan(&mut ctx, &config, "b");
        let response = FetchResponse {
            children: vec![
                RawChildNode::new("c1", "mysql").with_association("run"),
                RawChildNode::new("c2", "mysql"),
                RawChildNode::new("", "mysql"),
                RawChildNode::new("b", "host"),
            ],
        };

        let result = ExpansionController::new(&config)
            .complete(&mut ctx, &pending, Ok(response))
            .unwrap();

        assert_eq!(result.added_nodes, vec![NodeId::from("c1"), NodeId::from("c2")]);
        assert_eq!(result.skipped.len(), 1);
        let b = ctx.node(&NodeId::from("b")).unwrap();
        assert!(b.is_expanded(Side::Downstream) && b.fetched && !b.in_flight && !b.has_more);

        let c1 = ctx.node(&NodeId::from("c1")).unwrap();
        assert_eq!(c1.level, 4);
        assert!(c1.visible);
        let gap = config.vertical_gap(config.child_node_vertical_gap, 2);
        assert_eq!(ctx.position(&c1.id), Some(Vec2::new(780.0, -gap / 2.0)));
        let edge = ctx.edge_between(&NodeId::from("b"), &NodeId::from("c1")).unwrap();
        assert_eq!(ctx[edge].status, EdgeStatus::Visible);
        assert_eq!(ctx[edge].association_type_id.as_deref(), Some("run"));
    }

    #[test]
    fn test_complete_links_grandparent_bidirectionally() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let pending = fetch_plan(&mut ctx, &config, "b");

        ExpansionController::new(&config)
            .complete(
                &mut ctx,
                &pending,
                Ok(FetchResponse {
                    children: vec![RawChildNode::new("r", "host")],
                }),
            )
            .unwrap();

        assert_eq!(ctx.node_count(), 3);
        let back = ctx.edge_between(&NodeId::from("b"), &NodeId::from("r")).unwrap();
        assert_eq!(ctx[back].kind, EdgeKind::Bidirectional);
        assert_eq!(ctx[back].status, EdgeStatus::Visible);
    }

    #[test]
    fn test_failed_fetch_leaves_node_collapsed() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let pending = fetch_plan(&mut ctx, &config, "b");

        let outcome = ExpansionController::new(&config)
            .complete(
                &mut ctx,
                &pending,
                Err(FetchError::Transport("connection reset".to_string())),
            )
            .unwrap_err();

        assert!(matches!(outcome, ExpandOutcome::FetchFailed(TopologyError::FetchFailure { .. })));
        let b = ctx.node(&NodeId::from("b")).unwrap();
        assert!(!b.is_expanded(Side::Downstream) && !b.in_flight && !b.fetched && b.has_more);
        assert_eq!(ctx.node_count(), 3);
    }

    #[test]
    fn test_completion_for_hidden_node_stays_collapsed() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let pending = fetch_plan(&mut ctx, &config, "b");
        ctx.node_mut(&NodeId::from("b")).unwrap().visible = false;
        let controller = ExpansionController::new(&config);

        let result = controller
            .complete(
                &mut ctx,
                &pending,
                Ok(FetchResponse {
                    children: vec![RawChildNode::new("c1", "mysql"), RawChildNode::new("a", "host")],
                }),
            )
            .unwrap();

        assert_eq!(result.added_nodes, vec![NodeId::from("c1")]);
        assert!(result.delta.shown_nodes.is_empty());
        let b = ctx.node(&NodeId::from("b")).unwrap();
        assert!(!b.is_expanded(Side::Downstream) && !b.in_flight && b.fetched);
        assert!(!ctx.node(&NodeId::from("c1")).unwrap().visible);
        let edge = ctx.edge_between(&NodeId::from("b"), &NodeId::from("c1")).unwrap();
        assert_eq!(ctx[edge].status, EdgeStatus::Hidden);

        ctx.node_mut(&NodeId::from("b")).unwrap().visible = true;
        assert!(matches!(
            controller.plan(&mut ctx, &NodeId::from("b"), Side::Downstream),
            ExpandPlan::Local(Side::Downstream)
        ));
        controller
            .expand_local(&mut ctx, &NodeId::from("b"), Side::Downstream)
            .unwrap();
        assert!(ctx.node(&NodeId::from("c1")).unwrap().visible);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let pending = fetch_plan(&mut ctx, &config, "b");
        ctx.reset();

        let outcome = ExpansionController::new(&config)
            .complete(&mut ctx, &pending, Ok(FetchResponse::default()))
            .unwrap_err();

        assert_eq!(outcome, ExpandOutcome::Discarded);
        assert_eq!(ctx.node_count(), 0);
    }

    #[test]
    fn test_expand_local_materializes_pending_children() {
        let config = LayoutConfig::default();
        let mut ctx = context();
        let b = ctx.node_mut(&NodeId::from("b")).unwrap();
        b.has_more = false;
        b.pending_children = vec![RawChildNode::new("p", "host")];

        let controller = ExpansionController::new(&config);
        assert!(matches!(
            controller.plan(&mut ctx, &NodeId::from("b"), Side::Upstream),
            ExpandPlan::Local(Side::Downstream)
        ));
        let result = controller
            .expand_local(&mut ctx, &NodeId::from("b"), Side::Downstream)
            .unwrap();

        assert_eq!(result.added_nodes, vec![NodeId::from("p")]);
        assert!(ctx.node(&NodeId::from("p")).unwrap().visible);
        assert!(ctx.node(&NodeId::from("b")).unwrap().pending_children.is_empty());
    }
}
