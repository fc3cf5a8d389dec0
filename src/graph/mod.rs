//! The scheduler records every dispatch of a frame epoch into a [`DependencyGraph`]. Dispatches are nodes, and every
//! barrier the scheduler inserted shows up as a barrier node between the producing and consuming dispatches.
//! The graph is purely informational, the recorded command stream is the source of truth.
//!
//! Through the [`GraphViz`] trait, it's possible to export a graphviz-compatible dot file to display the graph.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use deimos::prelude::*;
//!
//! let device = Arc::new(HeadlessDevice::new());
//! let mut ctx = ComputeContext::new(ContextSettings::default(), device.clone());
//! ctx.on_frame_begin().unwrap();
//! // ... submit dispatches
//! let dot = ctx.scheduler().graph().dot().unwrap();
//! assert!(dot.starts_with("digraph"));
//! ```

pub mod task_graph;

pub use task_graph::{DependencyGraph, DispatchNode, GraphViz, Node};
