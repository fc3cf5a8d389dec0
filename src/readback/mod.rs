//! Asynchronous transfer of GPU results into host memory.
//!
//! A readback names the fence of the dispatch that produces the data, the resource to copy from, and how many bytes
//! are needed. Nothing blocks: the [`ReadbackManager`] is polled at the end of every frame, and delivers the data once
//! the device reports the fence as retired. Results arrive either through a callback, or through a
//! [`ReadbackFuture`].
//!
//! # Example
//! ```
//! use std::sync::{Arc, Mutex};
//! use deimos::prelude::*;
//!
//! let device = Arc::new(HeadlessDevice::new());
//! let mut ctx = ComputeContext::new(ContextSettings::default(), device.clone());
//! let buffer = device.allocate(&ResourceDesc::buffer("result", 4).with_data(vec![1, 2, 3, 4])).unwrap();
//!
//! let received = Arc::new(Mutex::new(None));
//! let sink = received.clone();
//! ctx.request_readback(GpuFence::ZERO, buffer, 4, move |data| {
//!     *sink.lock().unwrap() = Some(data);
//! }).unwrap();
//!
//! ctx.on_frame_begin().unwrap();
//! ctx.on_frame_end().unwrap();
//! assert_eq!(received.lock().unwrap().as_deref(), Some([1u8, 2, 3, 4].as_slice()));
//! ```

pub mod manager;
pub mod slot;

pub use manager::{PollReport, ReadbackManager};
pub use slot::{Cancellation, ReadbackCallback, ReadbackFuture, ReadbackHandle};
