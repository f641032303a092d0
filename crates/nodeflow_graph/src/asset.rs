// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph snapshots: a serializable description of nodes, edges and
//! parameters, and the load path that rebuilds a live graph from it.

use crate::conversion::ConversionRegistry;
use crate::edge::{Edge, EdgeId};
use crate::graph::Graph;
use crate::node::{NodeId, NodeRegistry};
use crate::parameter::ExposedParameter;
use crate::port::PortKey;
use crate::settings::GraphSettings;
use crate::value::PortValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Snapshot errors
#[derive(Debug, Error)]
pub enum AssetError {
    /// RON parse error
    #[error("Invalid graph asset: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON write error
    #[error("Failed to write graph asset: {0}")]
    Write(#[from] ron::Error),
}

/// Saved node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node ID
    pub id: NodeId,
    /// Registered kind
    pub kind: String,
    /// Custom display name
    #[serde(default)]
    pub custom_name: Option<String>,
    /// Containing stack
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Contained nodes
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Field values by key
    #[serde(default)]
    pub fields: IndexMap<String, PortValue>,
}

/// Saved edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Edge ID
    pub id: EdgeId,
    /// Node owning the output port
    pub output_node: NodeId,
    /// Output port key
    pub output_port: PortKey,
    /// Node owning the input port
    pub input_node: NodeId,
    /// Input port key
    pub input_port: PortKey,
}

impl From<&Edge> for EdgeRecord {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id,
            output_node: edge.output_node,
            output_port: edge.output_port.clone(),
            input_node: edge.input_node,
            input_port: edge.input_port.clone(),
        }
    }
}

impl EdgeRecord {
    fn to_edge(&self) -> Edge {
        Edge {
            id: self.id,
            output_node: self.output_node,
            output_port: self.output_port.clone(),
            input_node: self.input_node,
            input_port: self.input_port.clone(),
            output_edge_index: 0,
            input_edge_index: 0,
        }
    }
}

/// Serializable graph snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAsset {
    /// Graph name
    pub name: String,
    /// Nodes, in graph order
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    /// Edges, in graph order
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    /// Exposed parameters
    #[serde(default)]
    pub parameters: Vec<ExposedParameter>,
}

impl GraphAsset {
    /// Parse a snapshot from RON
    pub fn from_ron(text: &str) -> Result<Self, AssetError> {
        Ok(ron::from_str(text)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, AssetError> {
        Ok(ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?)
    }
}

/// What had to be dropped or repaired while loading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Nodes of unknown kind, with that kind
    pub skipped_nodes: Vec<(NodeId, String)>,
    /// Edges whose endpoints could not be found
    pub pruned_edges: Vec<EdgeId>,
    /// Nodes whose saved parent disagreed with their container
    pub fixed_parents: Vec<NodeId>,
    /// Children listed by a container but missing from the graph
    pub dropped_children: Vec<NodeId>,
}

impl LoadReport {
    /// Whether the snapshot loaded without repairs
    pub fn is_clean(&self) -> bool {
        self.skipped_nodes.is_empty()
            && self.pruned_edges.is_empty()
            && self.fixed_parents.is_empty()
            && self.dropped_children.is_empty()
    }
}

impl Graph {
    /// Capture the graph as a snapshot
    pub fn to_asset(&self) -> GraphAsset {
        let nodes = self
            .nodes
            .values()
            .map(|node| {
                let fields = node
                    .behavior()
                    .map(|behavior| {
                        node.field_table()
                            .iter()
                            .filter_map(|f| Some((f.key.to_string(), behavior.field_value(f.key)?)))
                            .collect()
                    })
                    .unwrap_or_default();
                NodeRecord {
                    id: node.id(),
                    kind: node.kind().to_string(),
                    custom_name: node.custom_name.clone(),
                    parent: node.parent(),
                    children: node.children().to_vec(),
                    fields,
                }
            })
            .collect();

        GraphAsset {
            name: self.name.clone(),
            nodes,
            edges: self.edges.values().map(EdgeRecord::from).collect(),
            parameters: self.parameters.iter().cloned().collect(),
        }
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// Unknown node kinds are skipped. Edges are attached once the nodes
    /// whose ports follow their edges have been reconciled; edges that
    /// still have no endpoint are pruned.
    pub fn from_asset(
        asset: &GraphAsset,
        registry: &NodeRegistry,
        conversions: Arc<ConversionRegistry>,
        settings: GraphSettings,
    ) -> (Graph, LoadReport) {
        let mut graph = Graph::with_conversions(asset.name.clone(), conversions).with_settings(settings);
        let mut report = LoadReport::default();

        for parameter in &asset.parameters {
            graph.parameters.insert(parameter.clone());
        }

        for record in &asset.nodes {
            let Some(mut behavior) = registry.create_node(&record.kind) else {
                tracing::warn!("Skipping node {:?} of unknown kind '{}'", record.id, record.kind);
                report.skipped_nodes.push((record.id, record.kind.clone()));
                continue;
            };
            for (key, value) in &record.fields {
                if !behavior.set_field_value(key, value.clone()) {
                    tracing::debug!("{} ignored saved field '{}'", record.kind, key);
                }
            }
            let id = graph.insert_node(record.id, behavior);
            if let Some(node) = graph.nodes.get_mut(&id) {
                node.custom_name = record.custom_name.clone();
            }
        }

        graph.restore_stacks(asset, &mut report);

        let mut pending: Vec<&EdgeRecord> = asset.edges.iter().collect();
        loop {
            let before = pending.len();
            pending.retain(|record| graph.attach_edge(record.to_edge()).is_err());
            let progressed = pending.len() != before;

            // Ports of shape-following nodes may only appear once their edges exist
            let reshaped = graph.refresh_shape_following();
            if pending.is_empty() || !(progressed || reshaped) {
                break;
            }
        }

        for record in pending {
            tracing::warn!(
                "Pruning edge {:?}: {:?} -> {:?} has no matching ports",
                record.id,
                record.output_node,
                record.input_node
            );
            report.pruned_edges.push(record.id);
        }

        if !report.is_clean() {
            tracing::warn!(
                "Loaded '{}' with repairs: {} node(s) skipped, {} edge(s) pruned",
                asset.name,
                report.skipped_nodes.len(),
                report.pruned_edges.len()
            );
        }
        (graph, report)
    }

    /// Reconcile every node whose ports follow its edges, returning whether any changed
    fn refresh_shape_following(&mut self) -> bool {
        let ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.behavior().is_some_and(|b| b.follows_edge_shape()))
            .map(|n| n.id())
            .collect();
        let mut changed = false;
        for id in ids {
            changed |= matches!(self.update_ports(id), Ok(true));
        }
        changed
    }

    fn restore_stacks(&mut self, asset: &GraphAsset, report: &mut LoadReport) {
        for record in &asset.nodes {
            if !self.nodes.get(&record.id).is_some_and(|n| n.is_container()) {
                continue;
            }
            for child in &record.children {
                if !self.nodes.contains_key(child) || *child == record.id {
                    tracing::warn!("Stack {:?} lists missing child {:?}, dropping it", record.id, child);
                    report.dropped_children.push(*child);
                    continue;
                }
                if let Err(e) = self.add_to_stack(record.id, *child, None) {
                    tracing::warn!("Could not restore child {:?} of {:?}: {}", child, record.id, e);
                    report.dropped_children.push(*child);
                }
            }
        }

        for record in &asset.nodes {
            let Some(node) = self.nodes.get(&record.id) else {
                continue;
            };
            if node.parent() != record.parent {
                tracing::warn!(
                    "Node {:?} was saved with parent {:?} but belongs to {:?}",
                    record.id,
                    record.parent,
                    node.parent()
                );
                report.fixed_parents.push(record.id);
            }
        }
    }
}
