use crate::descriptor::{EdgeDescriptor, NodeDescriptor};
use assettopo_core::{EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementId {
    Node(NodeId),
    Edge(EdgeId),
}

/// The interactive canvas the engine drives. Implementations own rendering;
/// the engine only hands over descriptors and visibility changes.
pub trait RenderSurface {
    fn add_nodes(&mut self, nodes: Vec<NodeDescriptor>);
    fn add_edges(&mut self, edges: Vec<EdgeDescriptor>);
    fn remove_edges(&mut self, edges: Vec<EdgeId>);
    fn show(&mut self, id: &ElementId);
    fn hide(&mut self, id: &ElementId);
    /// Suspend redraws until the matching [`RenderSurface::unfreeze`].
    fn freeze(&mut self);
    fn unfreeze(&mut self);
}

/// Changes for one engine operation, applied to a surface under a single
/// freeze/unfreeze pair.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SurfaceBatch {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<EdgeDescriptor>,
    pub removed_edges: Vec<EdgeId>,
    pub show: Vec<ElementId>,
    pub hide: Vec<ElementId>,
}

impl SurfaceBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.removed_edges.is_empty()
            && self.show.is_empty()
            && self.hide.is_empty()
    }

    pub fn apply(self, surface: &mut dyn RenderSurface) {
        if self.is_empty() {
            return;
        }
        surface.freeze();
        if !self.nodes.is_empty() {
            surface.add_nodes(self.nodes);
        }
        if !self.edges.is_empty() {
            surface.add_edges(self.edges);
        }
        if !self.removed_edges.is_empty() {
            surface.remove_edges(self.removed_edges);
        }
        for id in &self.show {
            surface.show(id);
        }
        for id in &self.hide {
            surface.hide(id);
        }
        surface.unfreeze();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceOp {
    Freeze,
    Unfreeze,
    AddNodes(usize),
    AddEdges(usize),
    RemoveEdges(usize),
    Show(ElementId),
    Hide(ElementId),
}

/// In-memory surface that keeps the last descriptor per element and logs every
/// call. Used by the CLI and by tests.
#[derive(Debug, Default, Serialize)]
pub struct RecordingSurface {
    pub nodes: BTreeMap<NodeId, NodeDescriptor>,
    pub edges: BTreeMap<EdgeId, EdgeDescriptor>,
    pub ops: Vec<SurfaceOp>,
    /// Completed freeze/unfreeze pairs.
    pub batches: usize,
    /// Mutations issued while the surface was not frozen.
    pub unbatched: usize,
    #[serde(skip)]
    frozen: bool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self, id: &ElementId) -> bool {
        match id {
            ElementId::Node(id) => self.nodes.get(id).is_some_and(|node| node.visible),
            ElementId::Edge(id) => self.edges.get(id).is_some_and(|edge| edge.visible),
        }
    }

    pub fn visible_nodes(&self) -> Vec<&NodeId> {
        self.nodes
            .values()
            .filter(|node| node.visible)
            .map(|node| &node.id)
            .collect()
    }

    fn record(&mut self, op: SurfaceOp) {
        if !self.frozen {
            self.unbatched += 1;
        }
        self.ops.push(op);
    }

    fn set_visible(&mut self, id: &ElementId, visible: bool) {
        match id {
            ElementId::Node(id) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.visible = visible;
                }
            }
            ElementId::Edge(id) => {
                if let Some(edge) = self.edges.get_mut(id) {
                    edge.visible = visible;
                }
            }
        }
    }
}

impl RenderSurface for RecordingSurface {
    fn add_nodes(&mut self, nodes: Vec<NodeDescriptor>) {
        self.record(SurfaceOp::AddNodes(nodes.len()));
        for node in nodes {
            self.nodes.insert(node.id.clone(), node);
        }
    }

    fn add_edges(&mut self, edges: Vec<EdgeDescriptor>) {
        self.record(SurfaceOp::AddEdges(edges.len()));
        for edge in edges {
            self.edges.insert(edge.id.clone(), edge);
        }
    }

    fn remove_edges(&mut self, edges: Vec<EdgeId>) {
        self.record(SurfaceOp::RemoveEdges(edges.len()));
        for id in edges {
            self.edges.remove(&id);
        }
    }

    fn show(&mut self, id: &ElementId) {
        self.record(SurfaceOp::Show(id.clone()));
        self.set_visible(id, true);
    }

    fn hide(&mut self, id: &ElementId) {
        self.record(SurfaceOp::Hide(id.clone()));
        self.set_visible(id, false);
    }

    fn freeze(&mut self) {
        self.ops.push(SurfaceOp::Freeze);
        self.frozen = true;
    }

    fn unfreeze(&mut self) {
        self.ops.push(SurfaceOp::Unfreeze);
        if self.frozen {
            self.batches += 1;
        }
        self.frozen = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::AnchorSide;
    use crate::graph::Vec2;
    use assettopo_core::{EdgeKind, Side};

    fn node(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::from(id),
            label: id.to_string(),
            model_id: "host".to_string(),
            model_name: "--".to_string(),
            icon: None,
            side: Side::Downstream,
            level: 2,
            position: Vec2::default(),
            visible: true,
            emphasis: false,
            expand_affordance: Some(AnchorSide::Right),
            expanded: Vec::new(),
        }
    }

    #[test]
    fn test_batch_is_wrapped_in_one_freeze() {
        let mut surface = RecordingSurface::new();
        let edge = EdgeDescriptor {
            id: EdgeId::between(&NodeId::from("a"), &NodeId::from("b")),
            source: NodeId::from("a"),
            target: NodeId::from("b"),
            kind: EdgeKind::Single,
            label: "--".to_string(),
            model_association_id: None,
            source_anchor: AnchorSide::Right,
            target_anchor: AnchorSide::Left,
            visible: true,
        };
        let batch = SurfaceBatch {
            nodes: vec![node("a"), node("b")],
            edges: vec![edge],
            hide: vec![ElementId::Node(NodeId::from("b"))],
            ..Default::default()
        };

        batch.apply(&mut surface);

        assert_eq!(surface.batches, 1);
        assert_eq!(surface.unbatched, 0);
        assert_eq!(surface.ops.first(), Some(&SurfaceOp::Freeze));
        assert_eq!(surface.ops.last(), Some(&SurfaceOp::Unfreeze));
        assert!(!surface.is_visible(&ElementId::Node(NodeId::from("b"))));
        assert_eq!(surface.visible_nodes(), vec![&NodeId::from("a")]);
    }

    #[test]
    fn test_empty_batch_does_not_touch_surface() {
        let mut surface = RecordingSurface::new();
        SurfaceBatch::default().apply(&mut surface);
        assert!(surface.ops.is_empty());
    }
}
