// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph notifications.
//!
//! Events are pushed over `mpsc` channels to whoever subscribed (an editor
//! view, a logger). No behavior of the engine depends on listeners.

use crate::edge::EdgeId;
use crate::node::{NodeId, NodeMessageKind};
use std::sync::mpsc;

/// Notification emitted by a [`Graph`](crate::Graph)
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A node was added and initialized
    NodeAdded(NodeId),
    /// A node was removed
    NodeRemoved(NodeId),
    /// An edge was connected
    EdgeConnected {
        /// Edge ID
        edge: EdgeId,
        /// Node owning the output port
        output_node: NodeId,
        /// Node owning the input port
        input_node: NodeId,
    },
    /// An edge was disconnected
    EdgeDisconnected {
        /// Edge ID
        edge: EdgeId,
        /// Node owning the output port
        output_node: NodeId,
        /// Node owning the input port
        input_node: NodeId,
    },
    /// The port set of a node changed
    PortsUpdated(NodeId),
    /// A node finished its processing hook
    NodeProcessed(NodeId),
    /// A message was added on a node
    MessageAdded {
        /// Node carrying the message
        node: NodeId,
        /// Message text
        message: String,
        /// Severity
        kind: NodeMessageKind,
    },
    /// A message was removed from a node
    MessageRemoved {
        /// Node carrying the message
        node: NodeId,
        /// Message text
        message: String,
    },
    /// An exposed parameter was added, replaced, removed or written
    ParameterChanged(String),
}

/// Fan-out of events to subscribers
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::Sender<GraphEvent>>,
}

impl EventBus {
    /// Subscribe to all future events
    pub fn subscribe(&mut self) -> mpsc::Receiver<GraphEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    /// Deliver an event, dropping subscribers whose receiver is gone
    pub fn emit(&mut self, event: GraphEvent) {
        tracing::trace!("Graph event: {:?}", event);
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_receivers_are_pruned() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        let node = NodeId::new();
        bus.emit(GraphEvent::NodeAdded(node));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().ok(), Some(GraphEvent::NodeAdded(node)));
    }
}
