use std::collections::HashMap;

use crate::binding::BindingLayout;
use crate::core::device::DeviceRef;
use crate::core::error::PipelineError;
use crate::pipeline::hash::PipelineKey;
use crate::pipeline::shader::{ShaderCreateInfo, ShaderHandle};
use crate::pipeline::PipelineState;
use crate::sync::deferred_delete::DeletionQueue;
use crate::sync::fence::GpuFence;

/// Number of frames an unreferenced pipeline stays in the cache before it is destroyed.
pub const DEFAULT_PIPELINE_TIME_TO_LIVE: u32 = 8;

#[derive(Debug)]
struct PipelineEntry {
    state: PipelineState,
    ttl: u32,
}

/// The main pipeline cache struct. This stores all registered shaders and the pipelines compiled from them.
///
/// Lookups are keyed on a content hash of `(shader, layout)`, so obtaining an existing pipeline is O(1). A hit returns the
/// shared [`PipelineState`] and increments its reference count, a miss compiles a new pipeline through the
/// [`Device`](crate::Device). Compilation failures are never retried by the cache.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineCache {
    #[derivative(Debug = "ignore")]
    device: DeviceRef,
    shaders: HashMap<ShaderHandle, ShaderCreateInfo>,
    shader_ids: HashMap<u64, ShaderHandle>,
    pipelines: HashMap<PipelineKey, PipelineEntry>,
    deferred_delete: DeletionQueue<PipelineState>,
    next_shader: u64,
    next_pipeline: u64,
    time_to_live: u32,
}

impl PipelineCache {
    /// Create a new empty pipeline cache.
    pub fn new(device: DeviceRef) -> Self {
        Self::with_time_to_live(device, DEFAULT_PIPELINE_TIME_TO_LIVE)
    }

    /// Create a new empty pipeline cache that keeps unreferenced pipelines alive for `time_to_live` frames.
    pub fn with_time_to_live(device: DeviceRef, time_to_live: u32) -> Self {
        Self {
            device,
            shaders: HashMap::new(),
            shader_ids: HashMap::new(),
            pipelines: HashMap::new(),
            deferred_delete: DeletionQueue::new(),
            next_shader: 1,
            next_pipeline: 1,
            time_to_live: time_to_live.max(1),
        }
    }

    /// Register a compute shader. Registering the same shader twice returns the same handle.
    pub fn register_shader(&mut self, info: ShaderCreateInfo) -> ShaderHandle {
        let identity = info.identity_hash();
        if let Some(handle) = self.shader_ids.get(&identity) {
            return *handle;
        }
        let handle = ShaderHandle(self.next_shader);
        self.next_shader += 1;
        debug!("Registered shader `{}` as {:?} ({} bytes)", info.name(), handle, info.code().len());
        self.shader_ids.insert(identity, handle);
        self.shaders.insert(handle, info);
        handle
    }

    /// Get the create info of a registered shader.
    pub fn shader_info(&self, shader: ShaderHandle) -> Option<&ShaderCreateInfo> {
        self.shaders.get(&shader)
    }

    /// Obtain the pipeline for a shader and layout, compiling it if needed.
    /// The reference count of the returned state is incremented by one. Release it with [`PipelineCache::release()`].
    /// # Errors
    /// - [`PipelineError::UnknownShader`] if the shader is not registered or was invalidated.
    /// - [`PipelineError::LayoutMismatch`] if the layout was not validated against this shader's interface.
    /// - [`PipelineError::CompileFailed`] if the device failed to compile the pipeline.
    pub fn get_or_create(&mut self, shader: ShaderHandle, layout: &BindingLayout) -> Result<PipelineState, PipelineError> {
        let info = self.shaders.get(&shader).ok_or(PipelineError::UnknownShader(shader))?;
        if !layout.matches(info.interface()) {
            return Err(PipelineError::LayoutMismatch(info.name().to_string()));
        }

        let key = PipelineKey::new(shader, layout);
        if let Some(entry) = self.pipelines.get_mut(&key) {
            debug_assert_eq!(entry.state.layout(), layout, "pipeline key collision");
            entry.ttl = self.time_to_live;
            entry.state.acquire();
            return Ok(entry.state.clone());
        }

        let raw = self
            .device
            .compile_pipeline(info, layout)
            .map_err(|e| PipelineError::CompileFailed(format!("{e:#}")))?;
        let state = PipelineState::new(
            self.next_pipeline,
            key,
            info.name().to_string(),
            layout.clone(),
            info.group_size(),
            raw,
        );
        self.next_pipeline += 1;
        #[cfg(feature = "log-objects")]
        trace!("Created new pipeline {} for shader `{}`", raw, info.name());
        self.pipelines.insert(
            key,
            PipelineEntry {
                state: state.clone(),
                ttl: self.time_to_live,
            },
        );
        Ok(state)
    }

    /// Release a reference obtained from [`PipelineCache::get_or_create()`]. The pipeline is not destroyed
    /// before its reference count is zero and its last dispatch has retired.
    /// # Errors
    /// Fails with [`PipelineError::NotReferenced`] if the state was released more often than it was obtained.
    pub fn release(&mut self, state: &PipelineState) -> Result<(), PipelineError> {
        let remaining = state.release().map_err(|e| {
            warn!("Pipeline {} for shader `{}` released more often than acquired", state.raw(), state.name());
            e
        })?;
        if remaining == 0 {
            debug!("Pipeline {} for shader `{}` is no longer referenced", state.raw(), state.name());
        }
        Ok(())
    }

    /// Invalidate a shader and every pipeline built from it. In-flight pipelines are queued for destruction and
    /// are destroyed once unreferenced and retired. Holders of an invalidated state may keep dispatching with it,
    /// every such dispatch delays its destruction until it retired. The shader has to be registered again before it can be used.
    /// Returns the number of pipelines that were invalidated.
    pub fn invalidate_shader(&mut self, shader: ShaderHandle) -> usize {
        if self.shaders.remove(&shader).is_none() {
            return 0;
        }
        self.shader_ids.retain(|_, handle| *handle != shader);
        let keys = self
            .pipelines
            .keys()
            .filter(|key| key.shader() == shader)
            .copied()
            .collect::<Vec<_>>();
        for key in &keys {
            if let Some(entry) = self.pipelines.remove(key) {
                let fence = entry.state.last_fence();
                self.deferred_delete.push(entry.state, fence);
            }
        }
        debug!("Invalidated shader {:?} and {} pipelines", shader, keys.len());
        keys.len()
    }

    /// Number of live pipelines in the lookup table.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether the lookup table is empty.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Number of invalidated pipelines waiting for destruction.
    pub fn pending_destruction(&self) -> usize {
        self.deferred_delete.len()
    }

    /// Advance the cache to the next frame, destroying pipelines that are unreferenced, whose last dispatch
    /// retired, and that were either invalidated or unused for the configured number of frames.
    /// Returns the number of destroyed pipelines.
    pub(crate) fn collect(&mut self, retired: GpuFence) -> usize {
        // The queued fence is only a lower bound, dispatches recorded after invalidation move the live one.
        let mut destroyed = self.deferred_delete.drain_retired(retired, |state| state.is_idle(retired));

        let time_to_live = self.time_to_live;
        let mut expired = Vec::new();
        for (key, entry) in self.pipelines.iter_mut() {
            if entry.state.ref_count() > 0 {
                entry.ttl = time_to_live;
                continue;
            }
            entry.ttl = entry.ttl.saturating_sub(1);
            if entry.ttl == 0 && entry.state.is_idle(retired) {
                expired.push(*key);
            }
        }
        for key in expired {
            if let Some(entry) = self.pipelines.remove(&key) {
                destroyed.push(entry.state);
            }
        }

        let count = destroyed.len();
        for state in destroyed {
            self.destroy(state);
        }
        count
    }

    fn destroy(&self, state: PipelineState) {
        debug_assert_eq!(state.key().shader(), state.shader());
        #[cfg(feature = "log-objects")]
        trace!("Destroying pipeline {} for shader `{}`", state.raw(), state.name());
        self.device.destroy_pipeline(state.raw());
    }
}

impl Drop for PipelineCache {
    /// Destroys every remaining pipeline. The host must make sure the device is idle before dropping the cache.
    fn drop(&mut self) {
        let queued = self.deferred_delete.drain_retired(GpuFence::new(u64::MAX), |_| true);
        let cached = self.pipelines.drain().map(|(_, entry)| entry.state).collect::<Vec<_>>();
        for state in queued.into_iter().chain(cached) {
            self.destroy(state);
        }
    }
}
