//! Compute dispatch and GPU/CPU synchronization core for real-time renderers.
//!
//! Deimos sits between a rendering host and its GPU device. It validates the resources a compute shader expects,
//! caches pipeline state, records dispatches into the frame's command stream with automatic barriers, and brings
//! results back into host memory without ever stalling the render thread.
//!
//! To get started, the easiest way is to simply
//! ```
//! // Import types under a namespace.
//! use deimos::prelude as dm;
//!
//! // Or, if you dont care about using the types under a namespace
//! use deimos::prelude::*;
//! ```
//!
//! # Example
//!
//! The host implements the [`Device`] trait over its graphics API. For testing, and for this example, the
//! [`HeadlessDevice`] runs CPU kernels instead.
//! ```
//! use std::sync::{Arc, Mutex};
//! use deimos::prelude::*;
//!
//! let device = Arc::new(HeadlessDevice::new());
//! device.register_kernel("invert", |ctx| {
//!     let inverted = ctx.read(0).unwrap().iter().map(|v| 255 - v).collect::<Vec<_>>();
//!     ctx.write(0, &inverted);
//! });
//! let settings = ContextBuilder::new().name("invert colours").build();
//! let mut ctx = deimos::initialize(settings, device.clone()).unwrap();
//! ```
//! Describe the resources the shader expects, and validate concrete resources against it.
//! ```
//! # use std::sync::{Arc, Mutex};
//! # use deimos::prelude::*;
//! # let device = Arc::new(HeadlessDevice::new());
//! # device.register_kernel("invert", |ctx| {
//! #     let inverted = ctx.read(0).unwrap().iter().map(|v| 255 - v).collect::<Vec<_>>();
//! #     ctx.write(0, &inverted);
//! # });
//! # let mut ctx = deimos::initialize(ContextSettings::default(), device.clone()).unwrap();
//! let interface = ShaderInterface::builder()
//!     .slot(0, ResourceKind::Texture, Access::ReadWrite)
//!     .build();
//! let shader = ctx.register_shader(ShaderCreateInfo::from_bytecode("invert", vec![0xde, 0xad], interface.clone())
//!     .with_group_size([8, 8, 1]));
//! let image = device.allocate(&ResourceDesc::texture("scene colour", 4).with_data(vec![0, 64, 128, 255])).unwrap();
//! let bindings = BindingSet::new().texture(0, image, Access::ReadWrite);
//! let layout = ResourceBindingTable::validate(&interface, bindings.bindings()).unwrap();
//! let pipeline = ctx.get_or_create(shader, &layout).unwrap();
//!
//! // Record the dispatch in this frame, and ask for the result once it completed.
//! ctx.on_frame_begin().unwrap();
//! let groups = WorkGroupCount::for_threads([2, 2, 1], pipeline.group_size());
//! let fence = ctx.submit(DispatchRequest::new(&pipeline, bindings, groups).unwrap()).unwrap();
//! let result = Arc::new(Mutex::new(Vec::new()));
//! let sink = result.clone();
//! ctx.request_readback(fence, image, 4, move |data| *sink.lock().unwrap() = data).unwrap();
//! ctx.on_frame_end().unwrap();
//!
//! // The device has not executed anything yet. Once it has, the next frame delivers the data.
//! device.advance_all();
//! ctx.on_frame_begin().unwrap();
//! ctx.on_frame_end().unwrap();
//! assert_eq!(*result.lock().unwrap(), vec![255, 191, 127, 0]);
//! ctx.release(&pipeline).unwrap();
//! ```
//! For further example code, check out the following modules
//! - [`binding`] for shader interfaces and binding validation.
//! - [`pipeline`] for pipeline creation and caching.
//! - [`dispatch`] for recording dispatches.
//! - [`readback`] for getting results back to the host.
//! - [`graph`] for inspecting the dependencies between dispatches.
//! - [`sync`] for fences and deferred destruction.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod binding;
pub mod context;
pub mod core;
pub mod dispatch;
pub mod frame;
pub mod graph;
pub mod pipeline;
pub mod readback;
pub mod sync;
pub mod util;
