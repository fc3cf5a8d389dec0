//! The host device boundary.
//!
//! deimos never talks to a graphics API directly. Everything it needs from the rendering host goes through the
//! [`Device`] trait: resource allocation, pipeline compilation from bytecode, batch submission, and the retired
//! fence counter. A simulated implementation is available as [`HeadlessDevice`](crate::HeadlessDevice).

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::binding::{BindingLayout, ResourceDesc, ResourceHandle};
use crate::core::error::DeviceError;
use crate::dispatch::command::CommandBatch;
use crate::pipeline::shader::ShaderCreateInfo;
use crate::sync::fence::GpuFence;

/// Limits reported by the device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum number of work groups per dispatch on each axis.
    pub max_workgroup_count: [u32; 3],
}

impl Default for DeviceLimits {
    /// The minimum limits every compute capable device supports.
    fn default() -> Self {
        Self {
            max_workgroup_count: [65535, 65535, 65535],
        }
    }
}

/// Opaque handle to a pipeline object compiled by the device.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct RawPipeline(pub u64);

impl Display for RawPipeline {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Interface the rendering host implements to run deimos on its device and command stream.
///
/// All methods are called from the submission thread only. Implementations are expected to be cheap to call,
/// in particular [`Device::submit()`] and [`Device::retired_fence()`] must never block on GPU completion.
pub trait Device: Send + Sync {
    /// Get the device limits.
    fn limits(&self) -> DeviceLimits;

    /// Allocate a new GPU resource.
    fn allocate(&self, desc: &ResourceDesc) -> Result<ResourceHandle, DeviceError>;

    /// Free a GPU resource. The caller guarantees no pending work uses it.
    fn free(&self, resource: ResourceHandle);

    /// Compile a compute pipeline for a shader and binding layout.
    /// # Errors
    /// Any error is reported to the caller of [`PipelineCache::get_or_create()`](crate::PipelineCache::get_or_create)
    /// as [`PipelineError::CompileFailed`](crate::PipelineError::CompileFailed).
    fn compile_pipeline(&self, shader: &ShaderCreateInfo, layout: &BindingLayout) -> Result<RawPipeline>;

    /// Destroy a pipeline object. Only called once no pending work references it.
    fn destroy_pipeline(&self, pipeline: RawPipeline);

    /// Submit a batch of commands. Must not block on GPU execution.
    /// Every [`Command::Signal`](crate::Command::Signal) in the batch advances the retired counter once
    /// all commands before it have completed.
    fn submit(&self, batch: &CommandBatch) -> Result<(), DeviceError>;

    /// Get the most recently retired fence value. A device lost is discovered through this call.
    fn retired_fence(&self) -> Result<GpuFence, DeviceError>;

    /// Block the calling thread until `fence` retires, or `timeout` passes.
    /// Returns `Ok(false)` on timeout.
    fn wait_for_fence(&self, fence: GpuFence, timeout: Duration) -> Result<bool, DeviceError>;

    /// Copy the first `size` bytes of a resource into host memory.
    /// Only called after all work writing to the resource has retired.
    fn read_back(&self, resource: ResourceHandle, size: u64) -> Result<Vec<u8>, DeviceError>;
}

/// Shared reference to the host device.
pub type DeviceRef = Arc<dyn Device>;
