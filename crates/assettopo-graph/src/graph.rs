use assettopo_core::{EdgeId, EdgeKind, NodeId, RawChildNode, Side};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeIndex(pub usize);

impl fmt::Display for EdgeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Node id -> canvas position. Entries are never overwritten once assigned.
pub type PositionMap = HashMap<NodeId, Vec2>;

/// Engine-owned state of one materialized relationship node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,
    pub model_id: String,
    pub inst_name: String,
    /// The root takes the side of the first tree it was loaded from.
    pub side: Side,
    /// Tree depth, root = 1.
    pub level: u32,
    /// Tree parent at first materialization.
    pub parent: Option<NodeId>,
    pub association_type_id: Option<String>,
    pub model_association_id: Option<String>,
    /// More descendants exist server-side.
    pub has_more: bool,
    /// Sides whose children are shown. Only the root can list both.
    pub expanded: Vec<Side>,
    pub visible: bool,
    /// An expansion fetch already succeeded for this node.
    pub fetched: bool,
    /// An expansion fetch is outstanding for this node.
    pub in_flight: bool,
    /// Known children in tree/fetch order, including reused nodes.
    pub children: Vec<NodeId>,
    /// Embedded children delivered with a fetch but not yet materialized.
    #[serde(skip)]
    pub pending_children: Vec<RawChildNode>,
}

impl NodeState {
    pub fn from_raw(raw: &RawChildNode, side: Side, level: u32, parent: Option<NodeId>) -> Self {
        Self {
            id: raw.id.clone(),
            model_id: raw.model_id.clone(),
            inst_name: raw.inst_name.clone(),
            side,
            level,
            parent,
            association_type_id: raw.association_type_id.clone(),
            model_association_id: raw.model_association_id.clone(),
            has_more: raw.has_more,
            expanded: Vec::new(),
            visible: false,
            fetched: false,
            in_flight: false,
            children: Vec::new(),
            pending_children: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.level == 1
    }

    /// The side an expand or collapse of this node acts on. Only the root has
    /// children on both sides; every other node keeps to its own.
    pub fn expansion_side(&self, requested: Side) -> Side {
        if self.is_root() { requested } else { self.side }
    }

    pub fn is_expanded(&self, side: Side) -> bool {
        self.expanded.contains(&side)
    }

    pub fn set_expanded(&mut self, side: Side, expanded: bool) {
        if !expanded {
            self.expanded.retain(|s| *s != side);
        } else if !self.is_expanded(side) {
            self.expanded.push(side);
        }
    }

    /// Whether the node should offer an expand control.
    pub fn can_expand(&self) -> bool {
        !self.children.is_empty() || !self.pending_children.is_empty() || self.has_more
    }

    fn push_child(&mut self, child: &NodeId) {
        if !self.children.contains(child) {
            self.children.push(child.clone());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    Visible,
    Hidden,
    /// Removed from the live graph by a collapse. Pruned edges don't count as
    /// incoming edges and are not rendered.
    Pruned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    /// Direction of the subtree this edge belongs to.
    pub side: Side,
    pub association_type_id: Option<String>,
    pub model_association_id: Option<String>,
    pub status: EdgeStatus,
}

impl EdgeState {
    pub fn new(source: &NodeId, target: &NodeId, kind: EdgeKind, side: Side) -> Self {
        Self {
            id: EdgeId::between(source, target),
            source: source.clone(),
            target: target.clone(),
            kind,
            side,
            association_type_id: None,
            model_association_id: None,
            status: EdgeStatus::Hidden,
        }
    }

    /// Label the edge with the association carried by the child record.
    pub fn with_association(mut self, child: &RawChildNode) -> Self {
        self.association_type_id = child.association_type_id.clone();
        self.model_association_id = child.model_association_id.clone();
        self
    }

    pub fn is_present(&self) -> bool {
        self.status != EdgeStatus::Pruned
    }
}

/// The live topology graph of one view: node arena, edges and positions.
#[derive(Debug, Default)]
pub struct GraphContext {
    nodes: Vec<NodeState>,
    edges: Vec<EdgeState>,
    node_map: HashMap<NodeId, NodeIndex>,
    edge_map: HashMap<(NodeId, NodeId), EdgeIndex>,
    incoming: HashMap<NodeId, Vec<EdgeIndex>>,
    outgoing: HashMap<NodeId, Vec<EdgeIndex>>,
    positions: PositionMap,
    root: Option<NodeId>,
    generation: u64,
}

impl GraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all graph state. Fetches started before the reset are discarded on
    /// completion.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::default();
        self.generation = generation;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn root(&self) -> Option<&NodeId> {
        self.root.as_ref()
    }

    /// Materialize the focal node. It is pinned at the origin.
    pub fn set_root(&mut self, state: NodeState) {
        self.root = Some(state.id.clone());
        self.set_position(&state.id, Vec2::default());
        self.add_node(state);
    }

    /// Materialize a node. Returns `None` if the id already exists; nodes are
    /// deduplicated by identity.
    pub fn add_node(&mut self, state: NodeState) -> Option<NodeIndex> {
        if self.node_map.contains_key(&state.id) {
            return None;
        }
        let idx = NodeIndex(self.nodes.len());
        self.node_map.insert(state.id.clone(), idx);
        self.nodes.push(state);
        Some(idx)
    }

    /// Add an edge and record the target as a known child of the source.
    /// Duplicate source/target pairs and edges with missing endpoints are dropped.
    pub fn add_edge(&mut self, edge: EdgeState) -> Option<EdgeIndex> {
        let key = (edge.source.clone(), edge.target.clone());
        if self.edge_map.contains_key(&key) {
            tracing::debug!("Edge {} already exists", edge.id);
            return None;
        }
        if !self.node_map.contains_key(&edge.source) || !self.node_map.contains_key(&edge.target)
        {
            tracing::warn!(
                "Dropping edge {} because an endpoint is missing from the graph context",
                edge.id
            );
            return None;
        }

        let idx = EdgeIndex(self.edges.len());
        self.incoming.entry(edge.target.clone()).or_default().push(idx);
        self.outgoing.entry(edge.source.clone()).or_default().push(idx);
        if let Some(source) = self.node_mut(&edge.source) {
            source.push_child(&key.1);
        }
        self.edge_map.insert(key, idx);
        self.edges.push(edge);
        Some(idx)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeState> {
        self.node_map.get(id).map(|&idx| &self.nodes[idx.0])
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeState> {
        self.node_map.get(id).map(|&idx| &mut self.nodes[idx.0])
    }

    pub fn edge_between(&self, source: &NodeId, target: &NodeId) -> Option<EdgeIndex> {
        self.edge_map
            .get(&(source.clone(), target.clone()))
            .copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeState> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges into `id` that are still part of the live graph.
    pub fn incoming_edges(&self, id: &NodeId) -> impl Iterator<Item = (EdgeIndex, &EdgeState)> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&idx| (idx, &self.edges[idx.0]))
            .filter(|(_, edge)| edge.is_present())
    }

    pub fn outgoing_edges(&self, id: &NodeId) -> impl Iterator<Item = (EdgeIndex, &EdgeState)> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&idx| (idx, &self.edges[idx.0]))
            .filter(|(_, edge)| edge.is_present())
    }

    /// Every edge out of `id`, pruned ones included.
    pub fn all_outgoing_edges(&self, id: &NodeId) -> impl Iterator<Item = (EdgeIndex, &EdgeState)> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&idx| (idx, &self.edges[idx.0]))
    }

    /// Sources of the live incoming edges of `id`.
    pub fn predecessors(&self, id: &NodeId) -> Vec<NodeId> {
        self.incoming_edges(id)
            .map(|(_, edge)| edge.source.clone())
            .collect()
    }

    /// Predecessors followed by successors, without duplicates.
    pub fn neighbors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.incoming_edges(id)
            .map(|(_, edge)| edge.source.clone())
            .chain(self.outgoing_edges(id).map(|(_, edge)| edge.target.clone()))
            .filter(|neighbor| seen.insert(neighbor.clone()))
            .collect()
    }

    /// Whether `candidate` reaches `of` through live edges.
    pub fn is_ancestor(&self, candidate: &NodeId, of: &NodeId) -> bool {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        queue.push_back(of);

        while let Some(current) = queue.pop_front() {
            for (_, edge) in self.incoming_edges(current) {
                if &edge.source == candidate {
                    return true;
                }
                if visited.insert(&edge.source) {
                    queue.push_back(&edge.source);
                }
            }
        }
        false
    }

    pub fn positions(&self) -> &PositionMap {
        &self.positions
    }

    pub fn position(&self, id: &NodeId) -> Option<Vec2> {
        self.positions.get(id).copied()
    }

    /// Record a position unless one already exists. Returns whether it was stored.
    pub fn set_position(&mut self, id: &NodeId, position: Vec2) -> bool {
        if self.positions.contains_key(id) {
            return false;
        }
        self.positions.insert(id.clone(), position);
        true
    }

    /// Layout passes insert through the map directly; they never overwrite.
    pub(crate) fn positions_mut(&mut self) -> &mut PositionMap {
        &mut self.positions
    }
}

impl Index<NodeIndex> for GraphContext {
    type Output = NodeState;
    fn index(&self, index: NodeIndex) -> &Self::Output {
        &self.nodes[index.0]
    }
}

impl IndexMut<NodeIndex> for GraphContext {
    fn index_mut(&mut self, index: NodeIndex) -> &mut Self::Output {
        &mut self.nodes[index.0]
    }
}

impl Index<EdgeIndex> for GraphContext {
    type Output = EdgeState;
    fn index(&self, index: EdgeIndex) -> &Self::Output {
        &self.edges[index.0]
    }
}

impl IndexMut<EdgeIndex> for GraphContext {
    fn index_mut(&mut self, index: EdgeIndex) -> &mut Self::Output {
        &mut self.edges[index.0]
    }
}
