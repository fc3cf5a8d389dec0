//! The pipeline module mainly exposes the [`PipelineCache`](crate::PipelineCache) struct. It owns every registered
//! compute shader and every compiled [`PipelineState`], and makes sure a pipeline is never destroyed while
//! dispatches using it are still in flight.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use deimos::prelude::*;
//!
//! let device = Arc::new(HeadlessDevice::new());
//! let mut cache = PipelineCache::new(device.clone());
//!
//! let interface = ShaderInterface::builder()
//!     .slot(0, ResourceKind::Buffer, Access::ReadWrite)
//!     .build();
//! // Bytecode is supplied by the host, usually loaded through a `ShaderSourceMap`.
//! let shader = cache.register_shader(ShaderCreateInfo::from_bytecode("double", vec![0x03, 0x02, 0x23, 0x07], interface.clone()));
//!
//! let buffer = device.allocate(&ResourceDesc::buffer("data", 64)).unwrap();
//! let bindings = BindingSet::new().buffer(0, buffer, Access::ReadWrite);
//! let layout = ResourceBindingTable::validate(&interface, bindings.bindings()).unwrap();
//!
//! let first = cache.get_or_create(shader, &layout).unwrap();
//! let second = cache.get_or_create(shader, &layout).unwrap();
//! assert!(PipelineState::ptr_eq(&first, &second));
//! assert_eq!(first.ref_count(), 2);
//! ```
//! # Correct usage
//! Every successful [`PipelineCache::get_or_create()`](crate::PipelineCache::get_or_create) must eventually be matched by a
//! [`PipelineCache::release()`](crate::PipelineCache::release). Unreferenced pipelines are kept around for a few frames,
//! and destroyed once the last fence that used them has retired.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::binding::BindingLayout;
use crate::core::device::RawPipeline;
use crate::core::error::PipelineError;
use crate::pipeline::hash::PipelineKey;
use crate::pipeline::shader::ShaderHandle;
use crate::sync::fence::GpuFence;

pub mod cache;
pub mod hash;
pub mod shader;
pub mod source_map;

#[derive(Debug)]
struct PipelineInner {
    id: u64,
    key: PipelineKey,
    name: String,
    layout: BindingLayout,
    group_size: [u32; 3],
    raw: RawPipeline,
    refs: AtomicU32,
    last_fence: AtomicU64,
}

/// A compiled compute pipeline, shared by every dispatch that uses the same shader and binding layout.
/// Cloning a pipeline state does not change its reference count, only the cache does that.
#[derive(Debug, Clone)]
pub struct PipelineState {
    inner: Arc<PipelineInner>,
}

impl PipelineState {
    pub(crate) fn new(
        id: u64,
        key: PipelineKey,
        name: String,
        layout: BindingLayout,
        group_size: [u32; 3],
        raw: RawPipeline,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                id,
                key,
                name,
                layout,
                group_size,
                raw,
                refs: AtomicU32::new(1),
                last_fence: AtomicU64::new(GpuFence::ZERO.value()),
            }),
        }
    }

    /// Returns true if both states refer to the same pipeline object.
    pub fn ptr_eq(lhs: &PipelineState, rhs: &PipelineState) -> bool {
        Arc::ptr_eq(&lhs.inner, &rhs.inner)
    }

    /// Unique id of this pipeline state within its cache
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The shader this pipeline was built from
    pub fn shader(&self) -> ShaderHandle {
        self.inner.key.shader()
    }

    /// Name of the shader this pipeline was built from
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The binding layout this pipeline was built for
    pub fn layout(&self) -> &BindingLayout {
        &self.inner.layout
    }

    /// Threads per work group of the shader
    pub fn group_size(&self) -> [u32; 3] {
        self.inner.group_size
    }

    /// Get the device pipeline object.
    pub fn raw(&self) -> RawPipeline {
        self.inner.raw
    }

    /// Current reference count, as tracked by the cache.
    pub fn ref_count(&self) -> u32 {
        self.inner.refs.load(Ordering::Acquire)
    }

    /// Last fence signaled by a dispatch that used this pipeline.
    pub fn last_fence(&self) -> GpuFence {
        GpuFence::new(self.inner.last_fence.load(Ordering::Acquire))
    }

    pub(crate) fn key(&self) -> &PipelineKey {
        &self.inner.key
    }

    pub(crate) fn acquire(&self) {
        self.inner.refs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release(&self) -> Result<u32, PipelineError> {
        self.inner
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| refs.checked_sub(1))
            .map(|previous| previous - 1)
            .map_err(|_| PipelineError::NotReferenced)
    }

    /// Record that a dispatch signaling `fence` uses this pipeline.
    pub(crate) fn mark_in_flight(&self, fence: GpuFence) {
        self.inner.last_fence.fetch_max(fence.value(), Ordering::AcqRel);
    }

    /// Returns true if no reference is held and no dispatch using it is in flight.
    pub(crate) fn is_idle(&self, retired: GpuFence) -> bool {
        self.ref_count() == 0 && self.last_fence().is_retired(retired)
    }
}
