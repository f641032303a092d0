// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thread-safe graph handle.

use crate::evaluation::RunReport;
use crate::graph::Graph;
use crate::parameter::ParameterError;
use crate::value::PortValue;
use parking_lot::Mutex;
use std::sync::Arc;

/// Graph shared between threads; every edit and pass holds the lock
#[derive(Clone)]
pub struct SharedGraph {
    inner: Arc<Mutex<Graph>>,
}

impl SharedGraph {
    /// Wrap a graph
    pub fn new(graph: Graph) -> Self {
        Self {
            inner: Arc::new(Mutex::new(graph)),
        }
    }

    /// Run `f` with exclusive access to the graph
    pub fn edit<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Run `f` with the graph locked for reading
    pub fn read<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.inner.lock())
    }

    /// Run an execution pass
    pub fn run(&self) -> RunReport {
        self.inner.lock().run()
    }

    /// Write an exposed parameter
    pub fn set_parameter_value(&self, name: &str, value: impl Into<PortValue>) -> Result<(), ParameterError> {
        self.inner.lock().set_parameter_value(name, value)
    }

    /// Read an exposed parameter
    pub fn get_parameter_value(&self, name: &str) -> Option<PortValue> {
        self.inner.lock().get_parameter_value(name).cloned()
    }
}

impl From<Graph> for SharedGraph {
    fn from(graph: Graph) -> Self {
        Self::new(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{FloatNode, ParameterNode};
    use crate::parameter::ExposedParameter;
    use std::thread;

    #[test]
    fn test_passes_from_several_threads() {
        let mut graph = Graph::new("shared");
        graph.add_parameter(ExposedParameter::new("Input", PortValue::Float(0.0)));
        graph.add_parameter(ExposedParameter::new("Output", PortValue::Float(0.0)));
        let get = graph.add_node(ParameterNode::get("Input"));
        let pass = graph.add_node(FloatNode::default());
        let set = graph.add_node(ParameterNode::set("Output"));
        graph.connect(get, 0, pass, 0).unwrap();
        graph.connect(pass, 0, set, 0).unwrap();

        let shared = SharedGraph::new(graph);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared.edit(|g| {
                        g.set_parameter_value("Input", i as f32).unwrap();
                        g.run();
                        g.get_parameter_value("Output").cloned()
                    })
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), Some(PortValue::Float(i as f32)));
        }
        assert_eq!(shared.read(|g| g.node_count()), 3);
    }
}
