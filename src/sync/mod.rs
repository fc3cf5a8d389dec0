//! The sync module provides the CPU-GPU synchronization primitives of deimos.
//!
//! - The [`fence`] module exposes [`GpuFence`](fence::GpuFence), a point on the device timeline.
//! - The [`deferred_delete`] module provides a queue that keeps objects alive until the fence that last used them
//! has retired.

pub mod deferred_delete;
pub mod fence;
