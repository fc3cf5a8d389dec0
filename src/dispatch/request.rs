use crate::binding::{Binding, BindingSet, ResourceHandle};
use crate::core::error::BindingError;
use crate::pipeline::PipelineState;
use crate::util::align::div_ceil;

/// Number of work groups on each axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct WorkGroupCount {
    /// Groups along X
    pub x: u32,
    /// Groups along Y
    pub y: u32,
    /// Groups along Z
    pub z: u32,
}

impl WorkGroupCount {
    /// Create a group count from explicit values.
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self {
            x,
            y,
            z,
        }
    }

    /// Number of groups needed to cover `threads` threads with groups of `group_size` threads, rounding up.
    /// A zero group size on an axis is treated as one.
    /// # Example
    /// ```
    /// # use deimos::*;
    /// // A 1920x1080 viewport with 16x16 thread groups
    /// let groups = WorkGroupCount::for_threads([1920, 1080, 1], [16, 16, 1]);
    /// assert_eq!(groups, WorkGroupCount::new(120, 68, 1));
    /// ```
    pub fn for_threads(threads: [u32; 3], group_size: [u32; 3]) -> Self {
        let axis = |i: usize| div_ceil(threads[i], group_size[i].max(1));
        Self::new(axis(0), axis(1), axis(2))
    }

    /// Group counts as an array, `[x, y, z]`.
    pub fn as_array(&self) -> [u32; 3] {
        [self.x, self.y, self.z]
    }

    /// Total number of groups.
    pub fn total(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

impl From<[u32; 3]> for WorkGroupCount {
    fn from(value: [u32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

/// How many work groups a dispatch runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DispatchExtent {
    /// Group counts known on the host
    Direct(WorkGroupCount),
    /// Group counts read by the device from three consecutive `u32` values in a buffer, starting at `offset` bytes.
    Indirect {
        /// Buffer holding the arguments
        args: ResourceHandle,
        /// Byte offset of the arguments, must be 4-byte aligned
        offset: u64,
    },
}

impl From<WorkGroupCount> for DispatchExtent {
    fn from(value: WorkGroupCount) -> Self {
        DispatchExtent::Direct(value)
    }
}

impl From<[u32; 3]> for DispatchExtent {
    fn from(value: [u32; 3]) -> Self {
        DispatchExtent::Direct(value.into())
    }
}

/// Scheduling hint forwarded to the device, e.g. to route work to an async compute queue.
/// The scheduler never reorders dispatches based on priority.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DispatchPriority {
    /// Background work
    Low,
    /// Regular frame work
    #[default]
    Normal,
    /// Latency sensitive work
    High,
}

/// A single compute dispatch, consumed by [`DispatchScheduler::submit()`](crate::DispatchScheduler::submit).
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pipeline: PipelineState,
    bindings: Vec<Binding>,
    extent: DispatchExtent,
    priority: DispatchPriority,
    label: Option<String>,
}

impl DispatchRequest {
    /// Create a dispatch request. The bindings are checked against the layout of the pipeline.
    /// # Errors
    /// Fails with a [`BindingError`] if the bindings do not satisfy the pipeline layout.
    pub fn new(pipeline: &PipelineState, bindings: BindingSet, extent: impl Into<DispatchExtent>) -> Result<Self, BindingError> {
        pipeline.layout().check(bindings.bindings())?;
        let mut bindings = bindings.into_inner();
        bindings.sort_by_key(|binding| binding.slot);
        Ok(Self {
            pipeline: pipeline.clone(),
            bindings,
            extent: extent.into(),
            priority: DispatchPriority::default(),
            label: None,
        })
    }

    /// Set the scheduling hint.
    pub fn priority(mut self, priority: DispatchPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set a debug label. Shows up in debug label commands and in the dependency graph.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The pipeline to dispatch
    pub fn pipeline(&self) -> &PipelineState {
        &self.pipeline
    }

    /// Bound resources, sorted by slot
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Work group counts
    pub fn extent(&self) -> &DispatchExtent {
        &self.extent
    }

    /// Debug label, if any
    pub fn debug_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Scheduling hint
    pub fn dispatch_priority(&self) -> DispatchPriority {
        self.priority
    }

    pub(crate) fn into_parts(self) -> (PipelineState, Vec<Binding>, DispatchExtent, DispatchPriority, Option<String>) {
        (self.pipeline, self.bindings, self.extent, self.priority, self.label)
    }
}
