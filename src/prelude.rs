//! Re-exports the most commonly used types and traits.
//!
//! ```
//! use deimos::prelude::*;
//! ```

pub use crate::core::app_info::*;
pub use crate::core::device::{Device, DeviceLimits, DeviceRef, RawPipeline};
pub use crate::core::error::{BindingError, DeviceError, DispatchError, Error, FrameError, PipelineError, ReadbackError};
pub use crate::core::headless::{HeadlessDevice, Kernel, KernelContext};

pub use crate::sync::fence::*;

pub use crate::binding::*;

pub use crate::pipeline::cache::PipelineCache;
pub use crate::pipeline::hash::*;
pub use crate::pipeline::shader::{ShaderCreateInfo, ShaderHandle};
pub use crate::pipeline::source_map::ShaderSourceMap;
pub use crate::pipeline::PipelineState;

pub use crate::dispatch::*;

pub use crate::graph::{DependencyGraph, GraphViz};

pub use crate::readback::*;

pub use crate::frame::{FrameGraphAdapter, FrameReport, HostFrameEvent};

pub use crate::context::{initialize, ComputeContext};
