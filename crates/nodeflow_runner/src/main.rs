// SPDX-License-Identifier: MIT OR Apache-2.0
//! Nodeflow runner
//!
//! Loads a graph snapshot (or builds a small demo graph), then drives
//! execution passes while feeding the `Input` parameter and logging the
//! `Output` parameter.
//!
//! ```text
//! nodeflow [GRAPH.ron] [--settings SETTINGS.ron] [--passes N]
//! ```

use nodeflow_graph::asset::AssetError;
use nodeflow_graph::nodes::{FloatNode, ParameterNode};
use nodeflow_graph::settings::SettingsError;
use nodeflow_graph::{
    builtin_registry, ConnectionError, ConversionRegistry, ExposedParameter, Graph, GraphAsset, GraphSettings,
    PortValue, SharedGraph,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_PASSES: u32 = 5;

#[derive(Debug, Default)]
struct Options {
    graph: Option<PathBuf>,
    settings: Option<PathBuf>,
    passes: Option<u32>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, RunnerError> {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--settings" => {
                    let path = args.next().ok_or(RunnerError::MissingValue("--settings"))?;
                    options.settings = Some(PathBuf::from(path));
                }
                "--passes" => {
                    let count = args.next().ok_or(RunnerError::MissingValue("--passes"))?;
                    options.passes = Some(count.parse().map_err(|_| RunnerError::InvalidPasses(count))?);
                }
                _ if arg.starts_with("--") => return Err(RunnerError::UnknownFlag(arg)),
                _ => options.graph = Some(PathBuf::from(arg)),
            }
        }
        Ok(options)
    }
}

fn load_settings(options: &Options) -> Result<GraphSettings, RunnerError> {
    match &options.settings {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| RunnerError::Io(path.clone(), e))?;
            Ok(GraphSettings::from_ron(&text)?)
        }
        None => Ok(GraphSettings::default()),
    }
}

fn load_graph(options: &Options, settings: GraphSettings) -> Result<Graph, RunnerError> {
    let Some(path) = &options.graph else {
        return demo_graph(settings);
    };

    let text = std::fs::read_to_string(path).map_err(|e| RunnerError::Io(path.clone(), e))?;
    let asset = GraphAsset::from_ron(&text)?;
    let (graph, report) = Graph::from_asset(&asset, &builtin_registry(), Arc::new(ConversionRegistry::standard()), settings);
    if !report.is_clean() {
        tracing::warn!(
            "Loaded '{}' with {} skipped nodes and {} pruned edges",
            graph.name,
            report.skipped_nodes.len(),
            report.pruned_edges.len()
        );
    }
    Ok(graph)
}

/// `Input` -> Float -> `Output`
fn demo_graph(settings: GraphSettings) -> Result<Graph, RunnerError> {
    let mut graph = Graph::new("demo").with_settings(settings);
    graph.add_parameter(ExposedParameter::new("Input", PortValue::Float(0.0)));
    graph.add_parameter(ExposedParameter::new("Output", PortValue::Float(0.0)));

    let get = graph.add_node(ParameterNode::get("Input"));
    let pass = graph.add_node(FloatNode::default());
    let set = graph.add_node(ParameterNode::set("Output"));
    graph.connect(get, 0, pass, 0)?;
    graph.connect(pass, 0, set, 0)?;
    Ok(graph)
}

fn run(options: Options) -> Result<(), RunnerError> {
    let settings = load_settings(&options)?;
    let graph = SharedGraph::new(load_graph(&options, settings)?);
    let passes = options.passes.unwrap_or(DEFAULT_PASSES);

    let has_input = graph.read(|g| g.parameter("Input").is_some());
    for pass in 0..passes {
        if has_input {
            if let Err(e) = graph.set_parameter_value("Input", pass as f32) {
                tracing::warn!("Cannot feed Input: {e}");
            }
        }

        let report = graph.run();
        for node in &report.failed {
            tracing::warn!("Node {:?} failed during pass {}", node, pass);
        }

        match graph.get_parameter_value("Output") {
            Some(value) => tracing::info!("Pass {}: Output = {:?}", pass, value),
            None => tracing::info!("Pass {}: processed {} nodes", pass, report.processed.len()),
        }
    }

    Ok(())
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nodeflow=info,nodeflow_graph=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting nodeflow runner v{}", env!("CARGO_PKG_VERSION"));

    let result = Options::parse(std::env::args().skip(1)).and_then(run);
    if let Err(e) = result {
        tracing::error!("Runner failed: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug, Error)]
enum RunnerError {
    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    #[error("Invalid pass count: {0}")]
    InvalidPasses(String),

    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Cannot build demo graph: {0}")]
    Connection(#[from] ConnectionError),
}
