//! Lifecycle logs for the commands a topology view runs.
//!
//! A [`CommandTrace`] is opened when a command starts and consumed by exactly
//! one of [`CommandTrace::succeeded`], [`CommandTrace::failed`] or
//! [`CommandTrace::abandoned`]. Expansion traces travel with the pending fetch,
//! so the outcome line carries the same correlation id as the start line.

use assettopo_core::{NodeId, Side};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TELEMETRY_TARGET: &str = "assettopo::telemetry";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TopologyCommand {
    LoadTopology,
    ExpandNode,
    CollapseNode,
}

impl fmt::Display for TopologyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadTopology => write!(f, "load_topology"),
            Self::ExpandNode => write!(f, "expand_node"),
            Self::CollapseNode => write!(f, "collapse_node"),
        }
    }
}

/// Graph elements touched by a finished command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCounts {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone)]
pub struct CommandTrace {
    command: TopologyCommand,
    correlation_id: String,
    node: Option<NodeId>,
    side: Option<Side>,
    started: Instant,
}

impl CommandTrace {
    /// Open a trace for a command on the whole view.
    pub fn start(command: TopologyCommand) -> Self {
        Self::open(command, None, None)
    }

    /// Open a trace for a command on one side of `node`.
    pub fn for_node(command: TopologyCommand, node: &NodeId, side: Side) -> Self {
        Self::open(command, Some(node.clone()), Some(side))
    }

    fn open(command: TopologyCommand, node: Option<NodeId>, side: Option<Side>) -> Self {
        let trace = Self {
            command,
            correlation_id: Uuid::new_v4().to_string(),
            node,
            side,
            started: Instant::now(),
        };
        info!(
            target: TELEMETRY_TARGET,
            command = %trace.command,
            correlation_id = %trace.correlation_id,
            node = ?trace.node,
            side = ?trace.side,
            "command_start"
        );
        trace
    }

    pub fn command(&self) -> TopologyCommand {
        self.command
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn node(&self) -> Option<&NodeId> {
        self.node.as_ref()
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn succeeded(self, counts: CommandCounts) {
        info!(
            target: TELEMETRY_TARGET,
            command = %self.command,
            correlation_id = %self.correlation_id,
            node = ?self.node,
            side = ?self.side,
            nodes = counts.nodes,
            edges = counts.edges,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "command_success"
        );
    }

    /// Topology failures are recoverable, so they log at `warn`.
    pub fn failed(self, reason: &dyn fmt::Display) {
        warn!(
            target: TELEMETRY_TARGET,
            command = %self.command,
            correlation_id = %self.correlation_id,
            node = ?self.node,
            side = ?self.side,
            error = %reason,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "command_failure"
        );
    }

    /// The command was superseded, e.g. by a reload while its fetch was out.
    pub fn abandoned(self, reason: &dyn fmt::Display) {
        debug!(
            target: TELEMETRY_TARGET,
            command = %self.command,
            correlation_id = %self.correlation_id,
            node = ?self.node,
            reason = %reason,
            "command_abandoned"
        );
    }
}
