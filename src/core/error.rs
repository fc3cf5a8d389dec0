//! Exposes the deimos error types

use thiserror::Error;

use crate::binding::{Access, ResourceKind};
use crate::pipeline::shader::ShaderHandle;
use crate::sync::fence::GpuFence;

/// Failure reported by the host device while submitting or executing work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device was lost. Any work that was in flight has unspecified results.
    #[error("Device lost.")]
    Lost,
    /// The device ran out of memory while accepting a submission.
    #[error("Device out of memory.")]
    OutOfMemory,
    /// A resource handle was not recognized by the device.
    #[error("Unknown resource `{0}`.")]
    UnknownResource(u64),
    /// Backend specific failure.
    #[error("Device error: `{0}`")]
    Other(String),
}

/// Returned from [`ResourceBindingTable::validate()`](crate::ResourceBindingTable::validate) when candidate bindings
/// do not satisfy a shader interface. Bindings are never coerced, so the caller has to fix the layout and retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The shader declares a slot that has no candidate binding.
    #[error("Shader slot {0} has no binding.")]
    MissingSlot(u32),
    /// The bound resource is of a different kind than the shader declares.
    #[error("Slot {slot} expects a {expected:?} resource, but a {found:?} was bound.")]
    KindMismatch {
        /// Slot index
        slot: u32,
        /// Kind declared by the shader interface
        expected: ResourceKind,
        /// Kind of the bound resource
        found: ResourceKind,
    },
    /// The bound access does not grant what the shader needs.
    #[error("Slot {slot} is declared as {declared:?}, but was bound with {requested:?} access.")]
    AccessViolation {
        /// Slot index
        slot: u32,
        /// Access declared by the shader interface
        declared: Access,
        /// Access requested by the binding
        requested: Access,
    },
    /// A binding targets a slot that the shader does not declare.
    #[error("Slot {0} is not declared by the shader.")]
    UnexpectedSlot(u32),
    /// The same slot was bound twice.
    #[error("Slot {0} was bound more than once.")]
    DuplicateSlot(u32),
}

/// Errors that can occur while obtaining pipeline state from the [`PipelineCache`](crate::PipelineCache).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The device failed to compile the pipeline. The cache does not retry.
    #[error("Pipeline compilation failed: {0}")]
    CompileFailed(String),
    /// The shader handle is not registered, or was invalidated.
    #[error("Shader {0:?} is not registered in the pipeline cache.")]
    UnknownShader(ShaderHandle),
    /// The binding layout was not produced from this shader's interface.
    #[error("Binding layout does not match the interface of shader `{0}`.")]
    LayoutMismatch(String),
    /// [`PipelineCache::release()`](crate::PipelineCache::release) was called more often than the state was obtained.
    #[error("Pipeline state released more often than it was acquired.")]
    NotReferenced,
}

/// Errors returned from the dispatch scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A work group count is zero or exceeds the device limit. Nothing was recorded.
    #[error("Work group count {count} on axis {axis} is outside of [1, {max}].")]
    InvalidExtent {
        /// Axis index, 0 = X, 1 = Y, 2 = Z.
        axis: usize,
        /// Requested group count
        count: u32,
        /// Largest allowed group count on this axis
        max: u32,
    },
    /// The indirect argument resource is not a buffer, or the offset is misaligned.
    #[error("Invalid indirect dispatch arguments: {0}")]
    InvalidIndirectArgs(&'static str),
    /// Submission failed on the device. Every pending request of the frame batch was rejected.
    #[error("Device failure, {rejected} pending dispatches rejected: {cause}")]
    DeviceFailure {
        /// Underlying device error
        cause: DeviceError,
        /// Number of dispatches that were rejected
        rejected: usize,
    },
    /// Dispatches can only be submitted between `on_frame_begin()` and `on_frame_end()`.
    #[error("No frame epoch is active.")]
    NoActiveFrame,
    /// The bindings of the request do not satisfy the pipeline layout.
    #[error(transparent)]
    Binding(#[from] BindingError),
}

/// Errors related to readback requests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadbackError {
    /// Readbacks of zero bytes are not allowed.
    #[error("Readback of zero bytes requested.")]
    ZeroSize,
    /// The fence belongs to a batch that was rejected after a device failure. It will never retire.
    #[error("Fence {0:?} belongs to a rejected batch.")]
    Rejected(GpuFence),
    /// Blocking readback did not complete in time.
    #[error("Timed out waiting for fence {0:?}.")]
    Timeout(GpuFence),
    /// The readback was cancelled before it completed.
    #[error("Readback cancelled.")]
    Cancelled,
    /// Device error while copying data back to the host.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors related to the frame timeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// `on_frame_begin()` was called while a frame was already active.
    #[error("Frame {0} is already active.")]
    AlreadyActive(u64),
    /// `on_frame_end()` was called without a matching `on_frame_begin()`.
    #[error("No frame is active.")]
    NotActive,
    /// Dispatch failure reported at the end of the frame.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Binding validation failed.
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// Pipeline creation failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Dispatch scheduling failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Readback failed.
    #[error(transparent)]
    Readback(#[from] ReadbackError),
    /// Frame timeline misuse.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Host device error.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// Virtual shader path has no directory mapping.
    #[error("No shader directory mapped for `{0}`")]
    UnmappedShaderPath(String),
    /// Virtual shader directories must be absolute, e.g. `/MyShaders`.
    #[error("Invalid virtual shader directory `{0}`")]
    InvalidShaderDirectory(String),
}
