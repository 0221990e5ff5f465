use crate::config::LayoutConfig;
use crate::descriptor::{EdgeDescriptor, NodeDescriptor, describe, describe_edges, describe_nodes};
use crate::expansion::{
    ExpandOutcome, ExpandPlan, ExpansionController, ExpansionResult, FetchResponse,
    PendingExpansion, RelationshipFetcher,
};
use crate::flatten::GraphFlattener;
use crate::graph::{EdgeIndex, GraphContext, NodeState};
use crate::levels::LevelCollector;
use crate::position::PositionCalculator;
use crate::surface::{ElementId, RenderSurface, SurfaceBatch};
use crate::visibility::{VisibilityDelta, VisibilityPropagator};
use assettopo_core::{
    FetchError, LookupTable, NodeId, RawChildNode, Side, TopologyError, TopologyPayload,
};
use assettopo_events::telemetry::{CommandCounts, CommandTrace, TopologyCommand};
use assettopo_events::{Event, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialLayout {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<EdgeDescriptor>,
}

/// Lay out a topology payload without keeping any state. Repeated calls with
/// the same input give the same descriptors.
pub fn compute_initial_layout(
    src: Option<&RawChildNode>,
    dst: Option<&RawChildNode>,
    lookup: &LookupTable,
    config: &LayoutConfig,
) -> InitialLayout {
    let mut ctx = GraphContext::new();
    build_graph(&mut ctx, src, dst, config);
    let (nodes, edges) = describe(&ctx, lookup);
    InitialLayout { nodes, edges }
}

/// Populate `ctx` from the two side trees of the focal asset.
///
/// Both trees are rooted at the focal asset, so they share one visual root:
/// the src root when present. Each side is collected, positioned and
/// flattened in turn, upstream first, with one `seen` set so an id repeated
/// across sides keeps the level and position of its first occurrence.
fn build_graph(
    ctx: &mut GraphContext,
    src: Option<&RawChildNode>,
    dst: Option<&RawChildNode>,
    config: &LayoutConfig,
) -> Vec<TopologyError> {
    let (root, root_side) = match (src, dst) {
        (Some(src), _) => (src, Side::Upstream),
        (None, Some(dst)) => (dst, Side::Downstream),
        (None, None) => return Vec::new(),
    };
    if root.id.is_empty() {
        tracing::debug!("Topology root has no identifiable id, nothing to lay out");
        return vec![TopologyError::MalformedNode { parent: None }];
    }
    if let (Some(src), Some(dst)) = (src, dst)
        && src.id != dst.id
    {
        tracing::warn!(
            "src root {} and dst root {} differ, using {}",
            src.id,
            dst.id,
            src.id
        );
    }

    let sides: Vec<(&RawChildNode, Side)> = [(src, Side::Upstream), (dst, Side::Downstream)]
        .into_iter()
        .filter_map(|(tree, side)| tree.map(|tree| (tree, side)))
        .collect();

    let mut state = NodeState::from_raw(root, root_side, 1, None);
    state.visible = true;
    state.has_more = sides.iter().any(|(tree, _)| tree.has_more);
    for (tree, side) in &sides {
        state.set_expanded(*side, config.expansion_depth > 1 && !tree.children.is_empty());
    }
    ctx.set_root(state);

    let root_id = root.id.clone();
    let mut seen = HashSet::new();
    let mut skipped = Vec::new();
    for (tree, side) in sides {
        let levels = LevelCollector::collect_children(&root_id, &tree.children, &mut seen);
        PositionCalculator::new(config).compute(&levels, side, ctx.positions_mut());
        let report = GraphFlattener::new(config).flatten(ctx, &root_id, &tree.children, side);
        tracing::debug!(
            "Flattened {} side: {} nodes, {} edges",
            side,
            report.added_nodes.len(),
            report.added_edges.len()
        );
        skipped.extend(report.skipped);
    }
    skipped
}

/// Whether `begin_expand` finished the expansion or the caller has to fetch.
#[derive(Debug)]
pub enum ExpandStep {
    Done(ExpandOutcome),
    Fetch(PendingExpansion),
}

type ActivationHandler = Box<dyn FnMut(&NodeId)>;

/// One interactive topology view: the live graph plus the collaborators that
/// display it.
pub struct TopologyView {
    ctx: GraphContext,
    config: LayoutConfig,
    lookup: LookupTable,
    events: Option<EventBus>,
    on_activate: Option<ActivationHandler>,
}

impl TopologyView {
    pub fn new(config: LayoutConfig, lookup: LookupTable) -> Self {
        Self {
            ctx: GraphContext::new(),
            config,
            lookup,
            events: None,
            on_activate: None,
        }
    }

    /// Publish engine notifications on `bus`.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn set_activation_handler(&mut self, handler: impl FnMut(&NodeId) + 'static) {
        self.on_activate = Some(Box::new(handler));
    }

    pub fn context(&self) -> &GraphContext {
        &self.ctx
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn descriptors(&self) -> InitialLayout {
        let (nodes, edges) = describe(&self.ctx, &self.lookup);
        InitialLayout { nodes, edges }
    }

    /// Replace the whole graph. Expansions still in flight are discarded when
    /// they complete.
    pub fn load(
        &mut self,
        src: Option<&RawChildNode>,
        dst: Option<&RawChildNode>,
        surface: &mut dyn RenderSurface,
    ) -> Vec<TopologyError> {
        let trace = CommandTrace::start(TopologyCommand::LoadTopology);
        self.ctx.reset();
        let skipped = build_graph(&mut self.ctx, src, dst, &self.config);
        let layout = self.descriptors();
        let (node_count, edge_count) = (layout.nodes.len(), layout.edges.len());
        SurfaceBatch {
            nodes: layout.nodes,
            edges: layout.edges,
            ..Default::default()
        }
        .apply(surface);

        trace.succeeded(CommandCounts {
            nodes: node_count,
            edges: edge_count,
        });
        self.publish(Event::TopologyLoaded {
            node_count,
            edge_count,
        });
        skipped
    }

    /// Validate a wire payload and load it.
    pub fn load_payload(
        &mut self,
        payload: TopologyPayload,
        surface: &mut dyn RenderSurface,
    ) -> Vec<TopologyError> {
        let (src, dst, dropped) = payload.into_trees();
        if dropped > 0 {
            tracing::debug!("Dropped {} malformed relationship nodes", dropped);
        }
        self.load(src.as_ref(), dst.as_ref(), surface)
    }

    /// Start expanding `id`. Local expansions are applied to `surface`
    /// immediately; otherwise the caller fetches and calls
    /// [`TopologyView::complete_expand`].
    pub fn begin_expand(
        &mut self,
        id: &NodeId,
        side: Side,
        surface: &mut dyn RenderSurface,
    ) -> ExpandStep {
        let controller = ExpansionController::new(&self.config);
        match controller.plan(&mut self.ctx, id, side) {
            ExpandPlan::Rejected(outcome) => {
                tracing::debug!("Expand of {} rejected: {:?}", id, outcome);
                ExpandStep::Done(outcome)
            }
            ExpandPlan::Fetch(pending) => {
                tracing::debug!(
                    "Fetching {} with {} neighbors",
                    id,
                    pending.request.parent_ids.len()
                );
                ExpandStep::Fetch(pending)
            }
            ExpandPlan::Local(side) => {
                let trace = CommandTrace::for_node(TopologyCommand::ExpandNode, id, side);
                match controller.expand_local(&mut self.ctx, id, side) {
                    Ok(result) => ExpandStep::Done(self.finish_expand(id, result, trace, surface)),
                    Err(e) => {
                        trace.failed(&e);
                        ExpandStep::Done(ExpandOutcome::UnknownNode)
                    }
                }
            }
        }
    }

    /// Merge the fetch started by [`TopologyView::begin_expand`].
    pub fn complete_expand(
        &mut self,
        pending: PendingExpansion,
        response: Result<FetchResponse, FetchError>,
        surface: &mut dyn RenderSurface,
    ) -> ExpandOutcome {
        let id = pending.node_id().clone();
        let result =
            ExpansionController::new(&self.config).complete(&mut self.ctx, &pending, response);
        match result {
            Ok(result) => self.finish_expand(&id, result, pending.trace, surface),
            Err(ExpandOutcome::FetchFailed(error)) => {
                pending.trace.failed(&error);
                self.publish(Event::ExpansionFailed {
                    id,
                    error: error.to_string(),
                });
                ExpandOutcome::FetchFailed(error)
            }
            Err(outcome) => {
                pending.trace.abandoned(&format!("{:?}", outcome));
                outcome
            }
        }
    }

    /// Expand `id`, fetching through `fetcher` when the node's children are
    /// not known yet.
    pub async fn expand<F: RelationshipFetcher>(
        &mut self,
        id: &NodeId,
        side: Side,
        fetcher: &F,
        surface: &mut dyn RenderSurface,
    ) -> ExpandOutcome {
        match self.begin_expand(id, side, surface) {
            ExpandStep::Done(outcome) => outcome,
            ExpandStep::Fetch(pending) => {
                let response = fetcher.fetch_more(&pending.request).await;
                self.complete_expand(pending, response, surface)
            }
        }
    }

    /// Collapse `id` on `side`. Collapsing a side that is already collapsed
    /// does nothing.
    pub fn collapse(
        &mut self,
        id: &NodeId,
        side: Side,
        surface: &mut dyn RenderSurface,
    ) -> Result<(), TopologyError> {
        let node = self
            .ctx
            .node(id)
            .ok_or_else(|| TopologyError::UnknownNode(id.clone()))?;
        let side = node.expansion_side(side);
        if !node.is_expanded(side) {
            return Ok(());
        }

        let trace = CommandTrace::for_node(TopologyCommand::CollapseNode, id, side);
        let delta = VisibilityPropagator::new(self.config.restore_pruned_edges)
            .collapse(&mut self.ctx, id, side)?;
        self.delta_batch(&[], &[], &delta).apply(surface);

        trace.succeeded(CommandCounts {
            nodes: delta.hidden_nodes.len(),
            edges: delta.hidden_edges.len() + delta.pruned_edges.len(),
        });
        self.publish(Event::NodeCollapsed {
            id: id.clone(),
            side,
        });
        Ok(())
    }

    /// React to a surface event. Expand clicks toggle the node.
    pub async fn handle_event<F: RelationshipFetcher>(
        &mut self,
        event: &Event,
        fetcher: &F,
        surface: &mut dyn RenderSurface,
    ) -> Option<ExpandOutcome> {
        match event {
            Event::NodeExpandClicked { id, side } => {
                let expanded = self
                    .ctx
                    .node(id)
                    .is_some_and(|node| node.is_expanded(node.expansion_side(*side)));
                if expanded {
                    self.collapse_logged(id, *side, surface);
                    None
                } else {
                    Some(self.expand(id, *side, fetcher, surface).await)
                }
            }
            Event::NodeCollapseClicked { id, side } => {
                self.collapse_logged(id, *side, surface);
                None
            }
            Event::NodeActivated { id } => {
                match self.on_activate.as_mut() {
                    Some(handler) => handler(id),
                    None => tracing::debug!("No activation handler for {}", id),
                }
                None
            }
            _ => None,
        }
    }

    fn collapse_logged(&mut self, id: &NodeId, side: Side, surface: &mut dyn RenderSurface) {
        if let Err(e) = self.collapse(id, side, surface) {
            tracing::debug!("Ignoring collapse: {}", e);
        }
    }

    fn finish_expand(
        &self,
        id: &NodeId,
        result: ExpansionResult,
        trace: CommandTrace,
        surface: &mut dyn RenderSurface,
    ) -> ExpandOutcome {
        for skipped in &result.skipped {
            tracing::debug!("Expansion of {} skipped: {}", id, skipped);
        }
        self.delta_batch(&result.added_nodes, &result.added_edges, &result.delta)
            .apply(surface);
        trace.succeeded(CommandCounts {
            nodes: result.added_nodes.len(),
            edges: result.added_edges.len(),
        });
        let outcome = result.outcome();
        self.publish(Event::ExpansionCompleted {
            id: id.clone(),
            added_nodes: result.added_nodes.len(),
            added_edges: result.added_edges.len(),
        });
        outcome
    }

    /// One surface batch for newly materialized elements plus visibility
    /// changes. New elements are described in their final state, so they don't
    /// also need a show.
    fn delta_batch(
        &self,
        added_nodes: &[NodeId],
        added_edges: &[EdgeIndex],
        delta: &VisibilityDelta,
    ) -> SurfaceBatch {
        let new_nodes: HashSet<&NodeId> = added_nodes.iter().collect();
        let mut new_edges: Vec<EdgeIndex> = added_edges.to_vec();
        new_edges.extend(delta.restored_edges.iter().copied());
        let new_edge_set: HashSet<EdgeIndex> = new_edges.iter().copied().collect();

        let edge_id = |idx: &EdgeIndex| ElementId::Edge(self.ctx[*idx].id.clone());

        let show = delta
            .shown_nodes
            .iter()
            .filter(|id| !new_nodes.contains(id))
            .map(|id| ElementId::Node(id.clone()))
            .chain(
                delta
                    .shown_edges
                    .iter()
                    .filter(|idx| !new_edge_set.contains(*idx))
                    .map(edge_id),
            )
            .collect();
        let hide = delta
            .hidden_nodes
            .iter()
            .map(|id| ElementId::Node(id.clone()))
            .chain(delta.hidden_edges.iter().map(edge_id))
            .collect();

        SurfaceBatch {
            nodes: describe_nodes(
                &self.ctx,
                added_nodes.iter().filter_map(|id| self.ctx.node(id)),
                &self.lookup,
            ),
            edges: describe_edges(
                &self.ctx,
                new_edges.iter().map(|idx| &self.ctx[*idx]),
                &self.lookup,
            ),
            removed_edges: delta
                .pruned_edges
                .iter()
                .map(|idx| self.ctx[*idx].id.clone())
                .collect(),
            show,
            hide,
        }
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
