// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed dataflow graph engine.
//!
//! Processing nodes are connected by typed ports; values flow along the
//! edges when the graph runs.
//!
//! ## Architecture
//!
//! - Nodes implement the [`Node`] capability trait and are owned by a [`Graph`]
//! - Ports are reconciled from each node's field table or port generators
//! - Edges are validated against a shared [`ConversionRegistry`]
//! - Execution pulls values through edges in compute order
//! - Exposed parameters bridge host values in and out of the graph
//! - Snapshots are saved and loaded as RON

pub mod asset;
pub mod context;
pub mod conversion;
pub mod edge;
pub mod evaluation;
pub mod events;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod parameter;
pub mod port;
mod reconcile;
pub mod settings;
pub mod shared;
pub mod traversal;
pub mod value;

pub use asset::{GraphAsset, LoadReport};
pub use context::{GraphView, NodeContext, ProcessContext};
pub use conversion::{ConversionProvider, ConversionRegistry, StandardConversions};
pub use edge::{Edge, EdgeId};
pub use evaluation::RunReport;
pub use events::GraphEvent;
pub use graph::{ConnectionError, Graph, GraphError};
pub use node::{FieldDecl, GraphNode, Node, NodeError, NodeId, NodeMessageKind, NodeRegistry, ProcessState};
pub use nodes::builtin_registry;
pub use parameter::{ExposedParameter, ParameterError};
pub use port::{Port, PortDescriptor, PortDirection, PortKey};
pub use settings::GraphSettings;
pub use shared::SharedGraph;
pub use value::{PortType, PortValue};
