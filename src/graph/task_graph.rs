//! The internal graph structure of one frame epoch.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::Result;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex};
use petgraph::{Directed, Graph, Incoming, Outgoing};

use crate::dispatch::command::ResourceBarrier;
use crate::sync::fence::GpuFence;

/// A dispatch recorded in the current epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchNode {
    /// Fence signaled by the dispatch
    pub fence: GpuFence,
    /// Name of the dispatched shader
    pub shader: String,
    /// Debug label, if one was set
    pub label: Option<String>,
}

/// Represents a node in a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A dispatch node
    Dispatch(DispatchNode),
    /// A barrier node
    Barrier(ResourceBarrier),
}

/// Dependency graph of the dispatches recorded in one frame epoch. Edges point from producer to consumer,
/// through a barrier node where the scheduler recorded one. Edge weights are resource ids.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    pub(crate) graph: Graph<Node, u64, Directed>,
    dispatches: HashMap<GpuFence, NodeIndex>,
}

impl DependencyGraph {
    /// Create an empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_dispatch(&mut self, fence: GpuFence, shader: &str, label: Option<&str>) -> NodeIndex {
        let node = self.graph.add_node(Node::Dispatch(DispatchNode {
            fence,
            shader: shader.to_owned(),
            label: label.map(str::to_owned),
        }));
        self.dispatches.insert(fence, node);
        node
    }

    /// Add a barrier between `producers` and the dispatch signaling `consumer`.
    pub(crate) fn add_barrier(&mut self, barrier: ResourceBarrier, producers: &[GpuFence], consumer: GpuFence) {
        let Some(&consumer) = self.dispatches.get(&consumer) else {
            return;
        };
        let resource = barrier.resource.id();
        let node = self.graph.add_node(Node::Barrier(barrier));
        for producer in producers {
            if let Some(&producer) = self.dispatches.get(producer) {
                self.graph.update_edge(producer, node, resource);
            }
        }
        self.graph.update_edge(node, consumer, resource);
    }

    /// Add a direct dependency that needs no barrier, e.g. a second reader of an already visible write.
    pub(crate) fn add_dependency(&mut self, producer: GpuFence, consumer: GpuFence, resource: u64) {
        if let (Some(&producer), Some(&consumer)) = (self.dispatches.get(&producer), self.dispatches.get(&consumer)) {
            self.graph.update_edge(producer, consumer, resource);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.graph.clear();
        self.dispatches.clear();
    }

    /// Number of dispatch nodes
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.len()
    }

    /// Number of barrier nodes
    pub fn barrier_count(&self) -> usize {
        self.graph.node_weights().filter(|node| matches!(node, Node::Barrier(_))).count()
    }

    /// All barriers, in recording order.
    pub fn barriers(&self) -> impl Iterator<Item = &ResourceBarrier> {
        self.graph.node_weights().filter_map(|node| match node {
            Node::Barrier(barrier) => Some(barrier),
            _ => None,
        })
    }

    /// Dispatches the dispatch signaling `fence` directly depends on, with or without a barrier in between.
    pub fn dependencies_of(&self, fence: GpuFence) -> Vec<GpuFence> {
        let Some(&node) = self.dispatches.get(&fence) else {
            return vec![];
        };
        let mut deps = Vec::new();
        for parent in self.graph.neighbors_directed(node, Incoming) {
            match &self.graph[parent] {
                Node::Dispatch(dispatch) => deps.push(dispatch.fence),
                Node::Barrier(_) => {
                    deps.extend(self.graph.neighbors_directed(parent, Incoming).filter_map(|p| match &self.graph[p] {
                        Node::Dispatch(dispatch) => Some(dispatch.fence),
                        Node::Barrier(_) => None,
                    }))
                }
            }
        }
        deps.sort();
        deps.dedup();
        deps
    }

    /// Returns true if the dispatch signaling `consumer` transitively depends on `producer`.
    pub fn depends_on(&self, consumer: GpuFence, producer: GpuFence) -> bool {
        match (self.dispatches.get(&producer), self.dispatches.get(&consumer)) {
            (Some(&producer), Some(&consumer)) if producer != consumer => {
                petgraph::algo::has_path_connecting(&self.graph, producer, consumer, None)
            }
            _ => false,
        }
    }

    /// Dispatches with no dependencies in this epoch.
    pub fn independent_dispatches(&self) -> Vec<GpuFence> {
        let mut fences = self
            .dispatches
            .iter()
            .filter(|(_, &node)| self.graph.edges_directed(node, Incoming).next().is_none())
            .map(|(fence, _)| *fence)
            .collect::<Vec<_>>();
        fences.sort();
        fences
    }

    /// Dispatches nothing else in this epoch depends on.
    pub fn sinks(&self) -> Vec<GpuFence> {
        let mut fences = self
            .dispatches
            .iter()
            .filter(|(_, &node)| self.graph.edges_directed(node, Outgoing).next().is_none())
            .map(|(fence, _)| *fence)
            .collect::<Vec<_>>();
        fences.sort();
        fences
    }

    fn get_edge_attributes(_: &Graph<Node, u64>, _: EdgeReference<u64>) -> String {
        String::from("")
    }

    fn get_node_attributes(_: &Graph<Node, u64>, node: (NodeIndex, &Node)) -> String {
        match node.1 {
            Node::Dispatch(_) => String::from("fillcolor = \"#5e6df7\""),
            Node::Barrier(_) => String::from("fillcolor = \"#f75e70\" shape=box"),
        }
    }
}

/// Trait that is implemented for the dependency graph to help with debugging and visualizing the graph.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

impl GraphViz for DependencyGraph {
    fn dot(&self) -> Result<String> {
        Ok(format!(
            "{}",
            Dot::with_attr_getters(&self.graph, &[], &Self::get_edge_attributes, &Self::get_node_attributes)
        ))
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Dispatch(dispatch) => match &dispatch.label {
                Some(label) => f.write_fmt(format_args!("{} ({})\n{}", label, dispatch.shader, dispatch.fence)),
                None => f.write_fmt(format_args!("{}\n{}", dispatch.shader, dispatch.fence)),
            },
            Node::Barrier(barrier) => f.write_fmt(format_args!(
                "resource {}\n({:?} => {:?})",
                barrier.resource.id(),
                barrier.src_access,
                barrier.dst_access
            )),
        }
    }
}
