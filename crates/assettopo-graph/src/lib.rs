pub mod classify;
pub mod config;
pub mod descriptor;
pub mod expansion;
pub mod flatten;
pub mod graph;
pub mod levels;
pub mod position;
pub mod surface;
pub mod view;
pub mod visibility;

pub use classify::{EdgeClassification, classify};
pub use config::LayoutConfig;
pub use descriptor::{AnchorSide, EdgeDescriptor, NodeDescriptor, describe};
pub use expansion::{
    ExpandOutcome, ExpandPlan, ExpansionController, ExpansionResult, FetchRequest, FetchResponse,
    PendingExpansion, RelationshipFetcher,
};
pub use flatten::{FlattenReport, GraphFlattener};
pub use graph::{
    EdgeIndex, EdgeState, EdgeStatus, GraphContext, NodeIndex, NodeState, PositionMap, Vec2,
};
pub use levels::{LevelCollector, LevelEntry, LevelIndex};
pub use position::{LevelMode, PositionCalculator};
pub use surface::{ElementId, RecordingSurface, RenderSurface, SurfaceBatch, SurfaceOp};
pub use view::{ExpandStep, InitialLayout, TopologyView, compute_initial_layout};
pub use visibility::{VisibilityDelta, VisibilityPropagator};
