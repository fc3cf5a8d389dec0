//! Simulated device for running compute passes without a GPU.
//!
//! [`HeadlessDevice`] executes dispatches with CPU kernels registered per shader name. Nothing runs on its own: work
//! is queued on submission and only executes when the owner advances the timeline with [`HeadlessDevice::advance()`],
//! or when a blocking wait needs it. This makes the timing of fence retirement fully deterministic in tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::binding::{Binding, BindingLayout, ResourceDesc, ResourceHandle, ResourceKind};
use crate::core::device::{Device, DeviceLimits, RawPipeline};
use crate::core::error::DeviceError;
use crate::dispatch::command::{Command, CommandBatch, DispatchCommand};
use crate::dispatch::request::DispatchExtent;
use crate::pipeline::shader::ShaderCreateInfo;
use crate::sync::fence::GpuFence;

/// A CPU implementation of a compute shader.
pub type Kernel = Box<dyn Fn(&mut KernelContext) + Send + Sync>;

#[derive(Debug)]
struct StoredResource {
    kind: ResourceKind,
    data: Vec<u8>,
}

/// Resources and group counts visible to a [`Kernel`] while it runs.
pub struct KernelContext<'a> {
    groups: [u32; 3],
    bindings: &'a [Binding],
    resources: &'a mut HashMap<u64, StoredResource>,
}

impl<'a> KernelContext<'a> {
    /// Number of work groups dispatched on each axis
    pub fn groups(&self) -> [u32; 3] {
        self.groups
    }

    /// Resource bound to a slot
    pub fn resource(&self, slot: u32) -> Option<ResourceHandle> {
        self.bindings.iter().find(|binding| binding.slot == slot).map(|binding| binding.resource)
    }

    /// Contents of the resource bound to a slot
    pub fn read(&self, slot: u32) -> Option<&[u8]> {
        let resource = self.resource(slot)?;
        self.resources.get(&resource.id()).map(|stored| stored.data.as_slice())
    }

    /// Overwrite the start of the resource bound to a slot. Data past the end of the resource is discarded.
    /// Returns false if the slot is not bound.
    pub fn write(&mut self, slot: u32, data: &[u8]) -> bool {
        let Some(resource) = self.resource(slot) else {
            return false;
        };
        match self.resources.get_mut(&resource.id()) {
            Some(stored) => {
                let len = data.len().min(stored.data.len());
                stored.data[..len].copy_from_slice(&data[..len]);
                true
            }
            None => false,
        }
    }
}

#[derive(Derivative, Default)]
#[derivative(Debug)]
struct State {
    next_id: u64,
    resources: HashMap<u64, StoredResource>,
    pipelines: HashMap<u64, String>,
    #[derivative(Debug = "ignore")]
    kernels: HashMap<String, Kernel>,
    queue: VecDeque<Command>,
    executed: Vec<Command>,
    batches: Vec<CommandBatch>,
    retired: GpuFence,
    last_signal: GpuFence,
    lost: bool,
    fail_next_submit: Option<DeviceError>,
    failing_shaders: HashSet<String>,
    pipelines_created: usize,
    pipelines_destroyed: usize,
    stale_pipeline_uses: usize,
    copies: usize,
}

impl State {
    fn check_lost(&self) -> Result<(), DeviceError> {
        match self.lost {
            true => Err(DeviceError::Lost),
            false => Ok(()),
        }
    }

    /// Execute queued commands until `signals` fences retired or the queue is empty.
    fn run(&mut self, mut signals: usize) {
        while signals > 0 {
            let Some(command) = self.queue.pop_front() else {
                break;
            };
            match &command {
                Command::Dispatch(dispatch) => self.execute(dispatch),
                Command::Signal(fence) => {
                    self.retired = *fence;
                    signals -= 1;
                }
                _ => {}
            }
            self.executed.push(command);
        }
    }

    fn execute(&mut self, dispatch: &DispatchCommand) {
        let Some(shader) = self.pipelines.get(&dispatch.pipeline.0).cloned() else {
            error!("Headless device executed destroyed pipeline {}", dispatch.pipeline);
            self.stale_pipeline_uses += 1;
            return;
        };
        let groups = match dispatch.extent {
            DispatchExtent::Direct(groups) => groups.as_array(),
            DispatchExtent::Indirect { args, offset } => self.indirect_groups(args, offset),
        };
        let Self { kernels, resources, .. } = self;
        if let Some(kernel) = kernels.get(&shader) {
            let mut ctx = KernelContext {
                groups,
                bindings: &dispatch.bindings,
                resources,
            };
            kernel(&mut ctx);
        }
    }

    fn indirect_groups(&self, args: ResourceHandle, offset: u64) -> [u32; 3] {
        let mut groups = [0u32; 3];
        if let Some(stored) = self.resources.get(&args.id()) {
            for (axis, count) in groups.iter_mut().enumerate() {
                let start = offset as usize + axis * 4;
                if let Some(bytes) = stored.data.get(start..start + 4) {
                    *count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                }
            }
        }
        groups
    }

    fn pending_signals(&self) -> usize {
        self.queue.iter().filter(|cmd| matches!(cmd, Command::Signal(_))).count()
    }
}

/// An in-process [`Device`] that runs dispatches with CPU kernels on a manually advanced timeline.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use deimos::prelude::*;
///
/// let device = Arc::new(HeadlessDevice::new());
/// device.register_kernel("double", |ctx| {
///     let doubled = ctx.read(0).unwrap().iter().map(|v| v * 2).collect::<Vec<_>>();
///     ctx.write(0, &doubled);
/// });
/// let buffer = device.allocate(&ResourceDesc::buffer("values", 4).with_data(vec![1, 2, 3, 4])).unwrap();
/// assert_eq!(device.resource_data(buffer).unwrap(), vec![1, 2, 3, 4]);
/// ```
#[derive(Debug)]
pub struct HeadlessDevice {
    limits: DeviceLimits,
    state: Mutex<State>,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Create a headless device with default limits.
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits::default())
    }

    /// Create a headless device with custom limits.
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(State {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the CPU implementation of a shader, by shader name.
    pub fn register_kernel(&self, shader: impl Into<String>, kernel: impl Fn(&mut KernelContext) + Send + Sync + 'static) {
        self.state().kernels.insert(shader.into(), Box::new(kernel));
    }

    /// Execute queued work until `signals` more fences retired. Returns the retired fence.
    pub fn advance(&self, signals: usize) -> GpuFence {
        let mut state = self.state();
        state.run(signals);
        state.retired
    }

    /// Execute all queued work. Returns the retired fence.
    pub fn advance_all(&self) -> GpuFence {
        let mut state = self.state();
        let signals = state.pending_signals();
        state.run(signals);
        state.retired
    }

    /// Highest fence value submitted so far.
    pub fn last_submitted(&self) -> GpuFence {
        self.state().last_signal
    }

    /// Commands executed so far, in execution order.
    pub fn executed_commands(&self) -> Vec<Command> {
        self.state().executed.clone()
    }

    /// Number of commands waiting for execution.
    pub fn queued_commands(&self) -> usize {
        self.state().queue.len()
    }

    /// Every batch accepted by [`Device::submit()`].
    pub fn submitted_batches(&self) -> Vec<CommandBatch> {
        self.state().batches.clone()
    }

    /// Make the next submission fail with `error`.
    pub fn fail_next_submit(&self, error: DeviceError) {
        self.state().fail_next_submit = Some(error);
    }

    /// Simulate a device lost. Every following call fails with [`DeviceError::Lost`].
    pub fn lose_device(&self) {
        warn!("Headless device lost");
        self.state().lost = true;
    }

    /// Make compilation of pipelines for this shader fail.
    pub fn fail_compile(&self, shader: impl Into<String>) {
        self.state().failing_shaders.insert(shader.into());
    }

    /// Number of pipelines compiled so far.
    pub fn pipelines_created(&self) -> usize {
        self.state().pipelines_created
    }

    /// Number of pipelines destroyed so far.
    pub fn pipelines_destroyed(&self) -> usize {
        self.state().pipelines_destroyed
    }

    /// Number of dispatches that executed with a pipeline that was already destroyed. Always zero unless pipelines
    /// are destroyed while in flight.
    pub fn stale_pipeline_uses(&self) -> usize {
        self.state().stale_pipeline_uses
    }

    /// Number of host copies made through [`Device::read_back()`].
    pub fn host_copies(&self) -> usize {
        self.state().copies
    }

    /// Current contents of a resource, without going through the timeline.
    pub fn resource_data(&self, resource: ResourceHandle) -> Option<Vec<u8>> {
        self.state().resources.get(&resource.id()).map(|stored| stored.data.clone())
    }

    /// Overwrite the start of a resource from the host.
    pub fn upload(&self, resource: ResourceHandle, data: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state();
        let stored = state
            .resources
            .get_mut(&resource.id())
            .ok_or(DeviceError::UnknownResource(resource.id()))?;
        let len = data.len().min(stored.data.len());
        stored.data[..len].copy_from_slice(&data[..len]);
        Ok(())
    }
}

impl Device for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn allocate(&self, desc: &ResourceDesc) -> Result<ResourceHandle, DeviceError> {
        let mut state = self.state();
        state.check_lost()?;
        let id = state.next_id;
        state.next_id += 1;
        let mut data = desc.initial_data.clone().unwrap_or_default();
        data.resize(desc.size as usize, 0);
        state.resources.insert(
            id,
            StoredResource {
                kind: desc.kind,
                data,
            },
        );
        #[cfg(feature = "log-objects")]
        trace!("Allocated {:?} `{}` ({} bytes) as resource {}", desc.kind, desc.name, desc.size, id);
        Ok(ResourceHandle::from_raw(id, desc.kind, desc.size))
    }

    fn free(&self, resource: ResourceHandle) {
        if let Some(stored) = self.state().resources.remove(&resource.id()) {
            debug_assert_eq!(stored.kind, resource.kind());
        }
    }

    fn compile_pipeline(&self, shader: &ShaderCreateInfo, layout: &BindingLayout) -> Result<RawPipeline> {
        let mut state = self.state();
        if state.lost {
            bail!(DeviceError::Lost);
        }
        if shader.code().is_empty() {
            bail!("shader `{}` has no bytecode", shader.name());
        }
        if state.failing_shaders.contains(shader.name()) {
            return Err(anyhow!("simulated compile error in `{}`", shader.name()).context(format!("{} binding slots", layout.len())));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.pipelines.insert(id, shader.name().to_owned());
        state.pipelines_created += 1;
        Ok(RawPipeline(id))
    }

    fn destroy_pipeline(&self, pipeline: RawPipeline) {
        let mut state = self.state();
        if state.pipelines.remove(&pipeline.0).is_some() {
            state.pipelines_destroyed += 1;
        }
    }

    fn submit(&self, batch: &CommandBatch) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check_lost()?;
        if let Some(error) = state.fail_next_submit.take() {
            return Err(error);
        }
        for command in batch.commands() {
            if let Command::Dispatch(dispatch) = command {
                if let Some(binding) = dispatch.bindings.iter().find(|b| !state.resources.contains_key(&b.resource.id())) {
                    return Err(DeviceError::UnknownResource(binding.resource.id()));
                }
            }
        }
        if let Some(last) = batch.signals().last() {
            state.last_signal = last;
        }
        state.queue.extend(batch.commands().iter().cloned());
        state.batches.push(batch.clone());
        Ok(())
    }

    fn retired_fence(&self) -> Result<GpuFence, DeviceError> {
        let state = self.state();
        state.check_lost()?;
        Ok(state.retired)
    }

    fn wait_for_fence(&self, fence: GpuFence, _timeout: Duration) -> Result<bool, DeviceError> {
        let mut state = self.state();
        state.check_lost()?;
        // Nothing else can submit while we hold the lock, a fence that was never submitted can't retire in time.
        if fence > state.last_signal {
            return Ok(fence.is_retired(state.retired));
        }
        while !fence.is_retired(state.retired) && !state.queue.is_empty() {
            state.run(1);
        }
        Ok(fence.is_retired(state.retired))
    }

    fn read_back(&self, resource: ResourceHandle, size: u64) -> Result<Vec<u8>, DeviceError> {
        let mut state = self.state();
        state.check_lost()?;
        let stored = state
            .resources
            .get(&resource.id())
            .ok_or(DeviceError::UnknownResource(resource.id()))?;
        let len = (size as usize).min(stored.data.len());
        let data = stored.data[..len].to_vec();
        state.copies += 1;
        Ok(data)
    }
}
