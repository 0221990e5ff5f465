use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Spacing and expansion knobs for the topology layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Vertical gap before density scaling (`base_gap / sqrt(count)`).
    pub base_gap: f32,
    /// Lower bound of the vertical gap. Keeps nodes from overlapping.
    pub min_gap: f32,
    /// Upper bound of the vertical gap. Keeps sparse levels compact.
    pub max_gap: f32,
    /// Distance between two adjacent levels.
    pub horizontal_gap: f32,
    /// Levels whose `count / previous_count` is below this are laid out per parent.
    pub density_threshold: f32,
    /// Deepest level shown initially; expanding at or beyond it fetches.
    pub expansion_depth: u32,
    /// Base vertical gap for children materialized by an expansion fetch.
    pub child_node_vertical_gap: f32,
    /// Whether re-expanding a node restores edges pruned by an earlier collapse.
    pub restore_pruned_edges: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            base_gap: 240.0,
            min_gap: 40.0,
            max_gap: 120.0,
            horizontal_gap: 260.0,
            density_threshold: 2.0,
            expansion_depth: 3,
            child_node_vertical_gap: 160.0,
            restore_pruned_edges: false,
        }
    }
}

impl LayoutConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("assettopo").join("layout.json"))
    }

    /// Load from the user config directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            tracing::info!("No config directory available, using default layout config");
            return Self::default();
        };
        if !path.exists() {
            tracing::info!("Layout config {:?} not found, using defaults", path);
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load layout config: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading layout config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing layout config {}", path.display()))?;
        Ok(config.validate())
    }

    /// Repair values that would break the layout invariants.
    pub fn validate(mut self) -> Self {
        if self.min_gap <= 0.0 {
            tracing::warn!("min_gap must be positive, got {}", self.min_gap);
            self.min_gap = Self::default().min_gap;
        }
        if self.max_gap < self.min_gap {
            tracing::warn!(
                "max_gap {} is below min_gap {}, swapping",
                self.max_gap,
                self.min_gap
            );
            std::mem::swap(&mut self.max_gap, &mut self.min_gap);
        }
        if self.expansion_depth == 0 {
            self.expansion_depth = 1;
        }
        self
    }

    /// Adaptive vertical gap for a column of `count` nodes.
    pub fn vertical_gap(&self, base: f32, count: usize) -> f32 {
        let count = count.max(1) as f32;
        (base / count.sqrt()).clamp(self.min_gap, self.max_gap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_gap_shrinks_and_is_bounded() {
        let config = LayoutConfig::default();
        assert_eq!(config.vertical_gap(config.base_gap, 1), config.max_gap);
        assert_eq!(config.vertical_gap(config.base_gap, 16), 60.0);
        assert_eq!(config.vertical_gap(config.base_gap, 400), config.min_gap);
        assert_eq!(config.vertical_gap(config.base_gap, 0), config.max_gap);
    }

    #[test]
    fn test_load_from_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, r#"{"expansion_depth": 4, "restore_pruned_edges": true}"#).unwrap();

        let config = LayoutConfig::load_from(&path).unwrap();
        assert_eq!(config.expansion_depth, 4);
        assert!(config.restore_pruned_edges);
        assert_eq!(config.base_gap, LayoutConfig::default().base_gap);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, "not json").unwrap();

        let err = LayoutConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing layout config"));
    }

    #[test]
    fn test_validate_swaps_inverted_bounds() {
        let config = LayoutConfig {
            min_gap: 100.0,
            max_gap: 50.0,
            expansion_depth: 0,
            ..Default::default()
        }
        .validate();
        assert_eq!(config.min_gap, 50.0);
        assert_eq!(config.max_gap, 100.0);
        assert_eq!(config.expansion_depth, 1);
    }
}
