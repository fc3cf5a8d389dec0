//! Scheduling of compute dispatches.
//!
//! A [`DispatchRequest`] pairs a [`PipelineState`](crate::PipelineState) with concrete resources and a
//! [`DispatchExtent`]. The [`DispatchScheduler`] validates the extent, records barriers where a dispatch has to wait
//! for an earlier one, and returns the [`GpuFence`](crate::GpuFence) that signals its completion.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use deimos::prelude::*;
//!
//! let device = Arc::new(HeadlessDevice::new());
//! let mut ctx = ComputeContext::new(ContextSettings::default(), device.clone());
//!
//! let interface = ShaderInterface::builder()
//!     .slot(0, ResourceKind::Buffer, Access::Write)
//!     .build();
//! let shader = ctx.register_shader(ShaderCreateInfo::from_bytecode("fill", vec![1, 2, 3, 4], interface.clone()));
//! let output = device.allocate(&ResourceDesc::buffer("output", 256)).unwrap();
//! let bindings = BindingSet::new().buffer(0, output, Access::Write);
//! let layout = ResourceBindingTable::validate(&interface, bindings.bindings()).unwrap();
//! let pipeline = ctx.get_or_create(shader, &layout).unwrap();
//!
//! ctx.on_frame_begin().unwrap();
//! let request = DispatchRequest::new(&pipeline, bindings, WorkGroupCount::new(4, 1, 1))
//!     .unwrap()
//!     .label("fill output");
//! let fence = ctx.submit(request).unwrap();
//! let report = ctx.on_frame_end().unwrap();
//! assert_eq!(report.dispatches, 1);
//! assert_eq!(fence, GpuFence::new(1));
//! ```

pub mod command;
pub(crate) mod hazard;
pub mod request;
pub mod scheduler;

pub use command::{Command, CommandBatch, DispatchCommand, ResourceBarrier};
pub use request::{DispatchExtent, DispatchPriority, DispatchRequest, WorkGroupCount};
pub use scheduler::{DispatchScheduler, EpochStats};
