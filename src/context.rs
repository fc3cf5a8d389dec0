//! The [`ComputeContext`] ties all components together over one [`Device`](crate::Device).

use std::sync::Arc;

use anyhow::Result;
use static_assertions::assert_impl_all;

use crate::binding::{BindingLayout, ResourceHandle};
use crate::core::app_info::ContextSettings;
use crate::core::device::{Device, DeviceRef};
use crate::core::error::{DispatchError, FrameError, PipelineError, ReadbackError};
use crate::dispatch::{DispatchRequest, DispatchScheduler};
use crate::frame::{FrameGraphAdapter, FrameReport, HostFrameEvent};
use crate::pipeline::cache::PipelineCache;
use crate::pipeline::shader::{ShaderCreateInfo, ShaderHandle};
use crate::pipeline::PipelineState;
use crate::readback::{Cancellation, ReadbackFuture, ReadbackHandle, ReadbackManager};
use crate::sync::fence::GpuFence;

/// Owns the pipeline cache, dispatch scheduler, readback manager and frame adapter of one device.
///
/// The context is used from a single submission thread. It is `Send`, so it can be created at startup and moved onto
/// the render thread.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ComputeContext {
    #[derivative(Debug = "ignore")]
    device: DeviceRef,
    settings: ContextSettings,
    cache: PipelineCache,
    scheduler: DispatchScheduler,
    readback: ReadbackManager,
    frames: FrameGraphAdapter,
}

assert_impl_all!(ComputeContext: Send);
assert_impl_all!(PipelineState: Send, Sync);

impl ComputeContext {
    /// Create a context over a device.
    pub fn new(settings: ContextSettings, device: DeviceRef) -> Self {
        let cache = PipelineCache::with_time_to_live(device.clone(), settings.pipeline_time_to_live);
        let scheduler = DispatchScheduler::new(device.clone(), &settings);
        let readback = ReadbackManager::new(device.clone(), settings.sync_readback_timeout);
        Self {
            device,
            settings,
            cache,
            scheduler,
            readback,
            frames: FrameGraphAdapter::new(),
        }
    }

    /// The device this context runs on
    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    /// Settings the context was created with
    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    /// Access the pipeline cache
    pub fn pipelines(&mut self) -> &mut PipelineCache {
        &mut self.cache
    }

    /// Access the dispatch scheduler
    pub fn scheduler(&self) -> &DispatchScheduler {
        &self.scheduler
    }

    /// Access the readback manager
    pub fn readbacks(&mut self) -> &mut ReadbackManager {
        &mut self.readback
    }

    /// See [`PipelineCache::register_shader()`]
    pub fn register_shader(&mut self, info: ShaderCreateInfo) -> ShaderHandle {
        self.cache.register_shader(info)
    }

    /// See [`PipelineCache::get_or_create()`]
    pub fn get_or_create(&mut self, shader: ShaderHandle, layout: &BindingLayout) -> Result<PipelineState, PipelineError> {
        self.cache.get_or_create(shader, layout)
    }

    /// See [`PipelineCache::release()`]
    pub fn release(&mut self, pipeline: &PipelineState) -> Result<(), PipelineError> {
        self.cache.release(pipeline)
    }

    /// See [`DispatchScheduler::submit()`]
    pub fn submit(&mut self, request: DispatchRequest) -> Result<GpuFence, DispatchError> {
        self.scheduler.submit(request)
    }

    /// Submit recorded dispatches without ending the frame. See [`DispatchScheduler::flush()`]
    pub fn flush(&mut self) -> Result<usize, DispatchError> {
        let result = self.scheduler.flush();
        for range in self.scheduler.take_rejected() {
            self.readback.reject(range);
        }
        result
    }

    /// See [`ReadbackManager::request_readback()`]
    pub fn request_readback(
        &mut self,
        fence: GpuFence,
        source: ResourceHandle,
        size: u64,
        callback: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> Result<ReadbackHandle, ReadbackError> {
        self.readback.request_readback(fence, source, size, callback)
    }

    /// See [`ReadbackManager::request_readback_future()`]
    pub fn request_readback_future(&mut self, fence: GpuFence, source: ResourceHandle, size: u64) -> Result<ReadbackFuture, ReadbackError> {
        self.readback.request_readback_future(fence, source, size)
    }

    /// See [`ReadbackManager::cancel()`]
    pub fn cancel_readback(&mut self, handle: ReadbackHandle) -> Cancellation {
        self.readback.cancel(handle)
    }

    /// Blocking readback. Submits pending work first if `fence` was not handed to the device yet, then stalls the
    /// calling thread until the fence retires or the configured timeout passes.
    pub fn read_sync(&mut self, fence: GpuFence, source: ResourceHandle, size: u64) -> Result<Vec<u8>, ReadbackError> {
        if self.scheduler.pending_dispatches() > 0 {
            if let Err(e) = self.flush() {
                warn!("Flush before blocking readback failed: {}", e);
            }
        }
        self.readback.read_sync(fence, source, size)
    }

    /// See [`FrameGraphAdapter::on_frame_begin()`]
    pub fn on_frame_begin(&mut self) -> Result<u64, FrameError> {
        self.frames.on_frame_begin(&mut self.scheduler)
    }

    /// See [`FrameGraphAdapter::on_frame_end()`]
    pub fn on_frame_end(&mut self) -> Result<FrameReport, FrameError> {
        self.frames.on_frame_end(&mut self.scheduler, &mut self.cache, &mut self.readback)
    }

    /// See [`FrameGraphAdapter::on_host_event()`]
    pub fn on_host_event(&mut self, event: HostFrameEvent) -> Result<Option<FrameReport>, FrameError> {
        self.frames.on_host_event(event, &mut self.scheduler, &mut self.cache, &mut self.readback)
    }
}

/// Initialize a compute context on a host device. Checks that the device reports usable limits.
/// # Example
/// ```
/// use std::sync::Arc;
/// use deimos::prelude::*;
///
/// let settings = ContextBuilder::new().name("compute").build();
/// let ctx = deimos::initialize(settings, Arc::new(HeadlessDevice::new())).unwrap();
/// assert!(ctx.scheduler().epoch().is_none());
/// ```
pub fn initialize(settings: ContextSettings, device: Arc<dyn Device>) -> Result<ComputeContext> {
    let limits = device.limits();
    if let Some(axis) = limits.max_workgroup_count.iter().position(|&max| max == 0) {
        anyhow::bail!("device reports a work group limit of zero on axis {axis}");
    }
    if settings.max_workgroups.map_or(false, |max| max.contains(&0)) {
        anyhow::bail!("max_workgroups override must be at least one on every axis");
    }
    info!(
        "Initialized compute context `{}` (max work groups {:?}, pipeline time to live {} frames)",
        settings.name, limits.max_workgroup_count, settings.pipeline_time_to_live
    );
    Ok(ComputeContext::new(settings, device))
}
