use assettopo_core::{NodeId, RawChildNode};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelEntry {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
}

/// Level -> nodes in depth-first visit order. The order is the top-to-bottom
/// order of the level on the canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelIndex {
    levels: BTreeMap<u32, Vec<LevelEntry>>,
}

impl LevelIndex {
    pub fn get(&self, level: u32) -> &[LevelEntry] {
        self.levels.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn max_level(&self) -> u32 {
        self.levels.keys().next_back().copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[LevelEntry])> {
        self.levels.iter().map(|(level, entries)| (*level, entries.as_slice()))
    }

    /// Total number of recorded nodes.
    pub fn len(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn push(&mut self, level: u32, id: NodeId, parent_id: Option<NodeId>) {
        self.levels
            .entry(level)
            .or_default()
            .push(LevelEntry { id, parent_id });
    }
}

/// Depth-first walk recording the level and tree parent of every node.
pub struct LevelCollector;

impl LevelCollector {
    /// Collect a standalone tree.
    pub fn collect(tree: &RawChildNode) -> LevelIndex {
        let mut seen = HashSet::new();
        Self::collect_children(&tree.id, &tree.children, &mut seen)
    }

    /// Collect the children of `root_id`, with `root_id` recorded at level 1.
    ///
    /// Nodes with an empty id are skipped together with their subtree. Ids
    /// already in `seen` (a repeat within the tree, or a node collected from the
    /// other side of the focal asset) are skipped the same way: the first
    /// occurrence owns the level. Sharing `seen` across calls keeps one level per
    /// id across both trees.
    pub fn collect_children(
        root_id: &NodeId,
        children: &[RawChildNode],
        seen: &mut HashSet<NodeId>,
    ) -> LevelIndex {
        let mut index = LevelIndex::default();
        if root_id.is_empty() {
            tracing::debug!("Root without identifiable id, nothing to collect");
            return index;
        }
        index.push(1, root_id.clone(), None);
        seen.insert(root_id.clone());

        let mut stack: Vec<(&RawChildNode, &NodeId, u32)> = children
            .iter()
            .rev()
            .map(|child| (child, root_id, 2))
            .collect();

        while let Some((node, parent_id, level)) = stack.pop() {
            if node.id.is_empty() {
                tracing::debug!(parent = %parent_id, "Skipping node without id and its subtree");
                continue;
            }
            if !seen.insert(node.id.clone()) {
                continue;
            }

            index.push(level, node.id.clone(), Some(parent_id.clone()));
            stack.extend(
                node.children
                    .iter()
                    .rev()
                    .map(|child| (child, &node.id, level + 1)),
            );
        }

        index
    }
}
