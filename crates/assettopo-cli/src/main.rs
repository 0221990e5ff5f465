use anyhow::{Context, Result, bail};
use assettopo_core::{
    AssociationType, FetchError, LookupTable, ModelInfo, NodeId, Side, TopologyPayload,
};
use assettopo_events::{Event, EventBus};
use assettopo_graph::{
    ExpandOutcome, FetchRequest, FetchResponse, InitialLayout, LayoutConfig, RecordingSurface,
    RelationshipFetcher, TopologyView, compute_initial_layout,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(author, version, about = "Asset relationship topology layout", long_about = None)]
struct Args {
    /// Layout config (JSON). Defaults to the user config directory.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Model and association display names (JSON)
    #[arg(short, long, global = true)]
    lookup: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the initial layout of a topology payload
    Layout {
        /// `{src_result, dst_result}` payload
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Replay expand/collapse actions and print the resulting surface
    Expand {
        #[arg(short, long)]
        input: PathBuf,

        /// Node id -> expand payload, answering fetches
        #[arg(short, long)]
        responses: PathBuf,

        /// `expand:<id>[:src|dst]` or `collapse:<id>[:src|dst]`, applied in order
        #[arg(short, long = "action", required = true)]
        actions: Vec<Action>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Expand(NodeId, Side),
    Collapse(NodeId, Side),
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let verb = parts.next().unwrap_or_default();
        let Some(id) = parts.next().filter(|id| !id.is_empty()) else {
            bail!("action {:?} is missing a node id", s);
        };
        let side = match parts.next() {
            None | Some("dst") => Side::Downstream,
            Some("src") => Side::Upstream,
            Some(other) => bail!("unknown side {:?}, expected src or dst", other),
        };
        match verb {
            "expand" => Ok(Action::Expand(NodeId::from(id), side)),
            "collapse" => Ok(Action::Collapse(NodeId::from(id), side)),
            other => bail!("unknown action {:?}, expected expand or collapse", other),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LookupFile {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    associations: Vec<AssociationType>,
}

/// Answers expand requests from a JSON map of node id -> expand payload.
struct FileFetcher {
    responses: HashMap<String, TopologyPayload>,
}

impl RelationshipFetcher for FileFetcher {
    async fn fetch_more(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let payload = self
            .responses
            .get(request.inst_id.as_str())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(request.inst_id.clone()))?;
        Ok(FetchResponse::from_payload(payload, request.side))
    }
}

#[derive(Serialize)]
struct ReplayReport {
    outcomes: Vec<String>,
    events: Vec<Event>,
    surface: RecordingSurface,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {} {}", what, path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {} {}", what, path.display()))
}

fn load_config(path: Option<&Path>) -> Result<LayoutConfig> {
    match path {
        Some(path) => LayoutConfig::load_from(path),
        None => Ok(LayoutConfig::load()),
    }
}

fn load_lookup(path: Option<&Path>) -> Result<LookupTable> {
    let file: LookupFile = match path {
        Some(path) => read_json(path, "lookup table")?,
        None => LookupFile::default(),
    };
    Ok(LookupTable::from_association_types(file.associations).with_models(file.models))
}

fn layout(input: &Path, lookup: &LookupTable, config: &LayoutConfig) -> Result<InitialLayout> {
    let payload: TopologyPayload = read_json(input, "topology payload")?;
    let (src, dst, dropped) = payload.into_trees();
    if dropped > 0 {
        tracing::info!("Dropped {} malformed relationship nodes", dropped);
    }
    Ok(compute_initial_layout(
        src.as_ref(),
        dst.as_ref(),
        lookup,
        config,
    ))
}

async fn replay(
    input: &Path,
    responses: &Path,
    actions: &[Action],
    lookup: LookupTable,
    config: LayoutConfig,
) -> Result<ReplayReport> {
    let payload: TopologyPayload = read_json(input, "topology payload")?;
    let fetcher = FileFetcher {
        responses: read_json(responses, "expand responses")?,
    };
    let bus = EventBus::new();
    let mut view = TopologyView::new(config, lookup).with_event_bus(bus.clone());
    let mut surface = RecordingSurface::new();
    view.load_payload(payload, &mut surface);

    let mut outcomes = Vec::with_capacity(actions.len());
    for action in actions {
        let outcome = match action {
            Action::Expand(id, side) => {
                match view.expand(id, *side, &fetcher, &mut surface).await {
                    ExpandOutcome::FetchFailed(e) => format!("expand {}: failed: {}", id, e),
                    outcome => format!("expand {}: {:?}", id, outcome),
                }
            }
            Action::Collapse(id, side) => match view.collapse(id, *side, &mut surface) {
                Ok(()) => format!("collapse {}: ok", id),
                Err(e) => format!("collapse {}: {}", id, e),
            },
        };
        outcomes.push(outcome);
    }

    Ok(ReplayReport {
        outcomes,
        events: bus.drain(),
        surface,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let lookup = load_lookup(args.lookup.as_deref())?;

    let output = match &args.command {
        Command::Layout { input } => serde_json::to_string_pretty(&layout(input, &lookup, &config)?)?,
        Command::Expand {
            input,
            responses,
            actions,
        } => serde_json::to_string_pretty(&replay(input, responses, actions, lookup, config).await?)?,
    };
    println!("{}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "src_result": {},
        "dst_result": {"_id": 1, "model_id": "host", "inst_name": "web-1", "children": [
            {"_id": 2, "model_id": "switch", "asst_id": "connect", "children": [
                {"_id": 3, "model_id": "router", "asst_id": "connect", "has_more": true}
            ]}
        ]}
    }"#;

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            "expand:3".parse::<Action>().unwrap(),
            Action::Expand(NodeId::from("3"), Side::Downstream)
        );
        assert_eq!(
            "collapse:9:src".parse::<Action>().unwrap(),
            Action::Collapse(NodeId::from("9"), Side::Upstream)
        );
        assert!("expand".parse::<Action>().is_err());
        assert!("expand:3:left".parse::<Action>().is_err());
        assert!("toggle:3".parse::<Action>().is_err());
    }

    #[test]
    fn test_layout_reads_payload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("payload.json");
        fs::write(&input, PAYLOAD)?;

        let layout = layout(&input, &LookupTable::new(), &LayoutConfig::default())?;

        assert_eq!(layout.nodes.len(), 3);
        assert_eq!(layout.edges.len(), 2);
        assert_eq!(layout.nodes[0].label, "web-1");
        Ok(())
    }

    #[tokio::test]
    async fn test_replay_expands_from_response_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("payload.json");
        let responses = dir.path().join("responses.json");
        fs::write(&input, PAYLOAD)?;
        fs::write(
            &responses,
            r#"{"3": {"src_result": {}, "dst_result": {"_id": 3, "children": [{"_id": 4, "model_id": "host"}]}}}"#,
        )?;

        let report = replay(
            &input,
            &responses,
            &[Action::Expand(NodeId::from("3"), Side::Downstream)],
            LookupTable::new(),
            LayoutConfig::default(),
        )
        .await?;

        assert!(report.surface.nodes.contains_key(&NodeId::from("4")));
        assert!(matches!(
            report.events.last(),
            Some(Event::ExpansionCompleted { added_nodes: 1, .. })
        ));
        Ok(())
    }
}
