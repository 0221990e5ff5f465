use crate::config::LayoutConfig;
use crate::graph::{PositionMap, Vec2};
use crate::levels::{LevelEntry, LevelIndex};
use assettopo_core::{NodeId, Side};

/// Assigns canvas coordinates per level.
///
/// Each level is either one centered column, or, when it is sparse relative
/// to the level before it, a set of per-parent clusters centered on each
/// parent's y. Clustering keeps a heavy branch from pushing the children of
/// sparse branches away from their parents.
pub struct PositionCalculator<'a> {
    config: &'a LayoutConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelMode {
    Column,
    PerParent,
}

impl<'a> PositionCalculator<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self { config }
    }

    /// Lay out every level of one side. Ids that already have a position keep it.
    pub fn compute(&self, levels: &LevelIndex, side: Side, positions: &mut PositionMap) {
        if let Some(root) = levels.get(1).first() {
            positions.entry(root.id.clone()).or_default();
        }

        for level in 2..=levels.max_level() {
            let entries = levels.get(level);
            if entries.is_empty() {
                continue;
            }
            let gap = self.config.vertical_gap(self.config.base_gap, entries.len());
            let mode = self.level_mode(levels, level);

            let ys = match mode {
                LevelMode::Column => Self::column_ys(entries.len(), gap),
                LevelMode::PerParent => self.clustered_ys(entries, gap, positions),
            };
            let column_x = side.direction() * self.config.horizontal_gap * (level - 1) as f32;

            for (entry, y) in entries.iter().zip(ys) {
                let x = match mode {
                    LevelMode::Column => column_x,
                    LevelMode::PerParent => self.clustered_x(entry, side, level, positions),
                };
                positions
                    .entry(entry.id.clone())
                    .or_insert_with(|| Vec2::new(x, y));
            }
        }
    }

    pub fn level_mode(&self, levels: &LevelIndex, level: u32) -> LevelMode {
        let count = levels.get(level).len();
        let previous = levels.get(level.saturating_sub(1)).len().max(1);
        let ratio = count as f32 / previous as f32;
        if level > 2 && ratio < self.config.density_threshold {
            LevelMode::PerParent
        } else {
            LevelMode::Column
        }
    }

    /// Stack `children` around `parent`, one level further from the root. Used for
    /// nodes materialized by an expansion. Returns the ids that got a position.
    pub fn place_children(
        &self,
        parent: Vec2,
        side: Side,
        children: &[NodeId],
        positions: &mut PositionMap,
    ) -> Vec<NodeId> {
        let gap = self
            .config
            .vertical_gap(self.config.child_node_vertical_gap, children.len());
        let x = parent.x + side.direction() * self.config.horizontal_gap;

        Self::column_ys(children.len(), gap)
            .into_iter()
            .zip(children)
            .filter_map(|(offset, id)| {
                if positions.contains_key(id) {
                    return None;
                }
                positions.insert(id.clone(), Vec2::new(x, parent.y + offset));
                Some(id.clone())
            })
            .collect()
    }

    fn column_ys(count: usize, gap: f32) -> Vec<f32> {
        let center = (count as f32 - 1.0) / 2.0;
        (0..count).map(|i| (i as f32 - center) * gap).collect()
    }

    fn clustered_ys(&self, entries: &[LevelEntry], gap: f32, positions: &PositionMap) -> Vec<f32> {
        let mut ys = vec![0.0; entries.len()];

        // Children of one parent are contiguous in depth-first order, but group by
        // parent anyway so a malformed index still clusters correctly.
        let mut groups: Vec<(Option<&NodeId>, Vec<usize>)> = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let parent = entry.parent_id.as_ref();
            match groups.iter_mut().find(|(p, _)| *p == parent) {
                Some((_, members)) => members.push(i),
                None => groups.push((parent, vec![i])),
            }
        }

        for (parent, members) in &groups {
            let anchor_y = parent
                .and_then(|p| positions.get(p))
                .map(|pos| pos.y)
                .unwrap_or(0.0);
            for (offset, &i) in Self::column_ys(members.len(), gap).iter().zip(members) {
                ys[i] = anchor_y + offset;
            }
        }

        // Neighboring clusters may overlap; push later nodes down until every
        // node is at least `gap` below the previous one.
        for i in 1..ys.len() {
            let floor = ys[i - 1] + gap;
            if ys[i] < floor {
                ys[i] = floor;
            }
        }
        ys
    }

    fn clustered_x(&self, entry: &LevelEntry, side: Side, level: u32, positions: &PositionMap) -> f32 {
        let step = side.direction() * self.config.horizontal_gap;
        match entry.parent_id.as_ref().and_then(|p| positions.get(p)) {
            Some(parent) => parent.x + step,
            None => step * (level - 1) as f32,
        }
    }
}
