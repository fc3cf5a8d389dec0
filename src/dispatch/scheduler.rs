use std::ops::RangeInclusive;

use crate::binding::{Access, ResourceKind};
use crate::core::app_info::ContextSettings;
use crate::core::device::{DeviceLimits, DeviceRef};
use crate::core::error::{DeviceError, DispatchError};
use crate::dispatch::command::{Command, CommandBatch, DispatchCommand};
use crate::dispatch::hazard::{merge_accesses, HazardTracker};
use crate::dispatch::request::{DispatchExtent, DispatchRequest};
use crate::graph::DependencyGraph;
use crate::pipeline::PipelineState;
use crate::sync::fence::{FenceTimeline, GpuFence};
use crate::util::align::is_aligned;

/// Indirect dispatch arguments must be aligned to this many bytes.
pub const INDIRECT_ARGS_ALIGNMENT: u64 = 4;
/// Size of the indirect dispatch arguments, three `u32` group counts.
pub const INDIRECT_ARGS_SIZE: u64 = 12;

/// Counters for one frame epoch.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct EpochStats {
    /// Dispatches recorded
    pub dispatches: usize,
    /// Barriers inserted
    pub barriers: usize,
}

#[derive(Debug)]
struct PendingDispatch {
    pipeline: PipelineState,
    fence: GpuFence,
}

/// Records dispatches into the command stream of the current frame epoch.
///
/// Dispatches execute in submission order. The scheduler tracks which resources each pending dispatch reads and writes,
/// and records a barrier whenever a dispatch has to wait for an earlier one (read-after-write, write-after-write
/// or write-after-read). Recorded commands are handed to the device in one batch when the frame ends, or on an
/// explicit [`DispatchScheduler::flush()`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DispatchScheduler {
    #[derivative(Debug = "ignore")]
    device: DeviceRef,
    limits: DeviceLimits,
    debug_markers: bool,
    timeline: FenceTimeline,
    hazards: HazardTracker,
    graph: DependencyGraph,
    batch: CommandBatch,
    pending: Vec<PendingDispatch>,
    epoch: Option<u64>,
    failure: Option<DeviceError>,
    rejected: Vec<RangeInclusive<GpuFence>>,
    stats: EpochStats,
}

impl DispatchScheduler {
    /// Create a scheduler over a device. The work group limit is the smaller of the device limit and
    /// [`ContextSettings::max_workgroups`].
    pub fn new(device: DeviceRef, settings: &ContextSettings) -> Self {
        let mut limits = device.limits();
        if let Some(max) = settings.max_workgroups {
            for (limit, max) in limits.max_workgroup_count.iter_mut().zip(max) {
                *limit = (*limit).min(max);
            }
        }
        Self {
            device,
            limits,
            debug_markers: cfg!(feature = "debug-markers") && settings.debug_markers,
            timeline: FenceTimeline::new(),
            hazards: HazardTracker::new(),
            graph: DependencyGraph::new(),
            batch: CommandBatch::default(),
            pending: vec![],
            epoch: None,
            failure: None,
            rejected: vec![],
            stats: EpochStats::default(),
        }
    }

    /// Effective limits used to validate dispatch extents.
    pub fn limits(&self) -> DeviceLimits {
        self.limits
    }

    /// The active epoch, if any.
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Dependency graph of the active epoch, or of the last finished one.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Counters of the active epoch, or of the last finished one.
    pub fn stats(&self) -> EpochStats {
        self.stats
    }

    /// Number of dispatches recorded but not yet handed to the device.
    pub fn pending_dispatches(&self) -> usize {
        self.pending.len()
    }

    /// The most recently allocated fence.
    pub fn last_fence(&self) -> GpuFence {
        self.timeline.last_allocated()
    }

    /// Validate a dispatch request and record it, returning the fence its completion signals.
    /// # Errors
    /// - [`DispatchError::NoActiveFrame`] if no frame epoch is active.
    /// - [`DispatchError::DeviceFailure`] if a submission already failed in this epoch.
    /// - [`DispatchError::InvalidExtent`] if a group count is zero or exceeds the limit. Nothing is recorded.
    /// - [`DispatchError::InvalidIndirectArgs`] if the indirect argument resource is unusable.
    pub fn submit(&mut self, request: DispatchRequest) -> Result<GpuFence, DispatchError> {
        if self.epoch.is_none() {
            return Err(DispatchError::NoActiveFrame);
        }
        if let Some(cause) = &self.failure {
            return Err(DispatchError::DeviceFailure {
                cause: cause.clone(),
                rejected: 1,
            });
        }
        self.validate_extent(request.extent())?;

        let (pipeline, bindings, extent, priority, label) = request.into_parts();
        let fence = self.timeline.allocate();
        self.graph.add_dispatch(fence, pipeline.name(), label.as_deref());

        let labelled = match &label {
            Some(label) if self.debug_markers => {
                self.batch.push(Command::BeginLabel(label.clone()));
                true
            }
            _ => false,
        };

        let indirect = match extent {
            DispatchExtent::Indirect { args, .. } => Some((args, Access::Read)),
            DispatchExtent::Direct(_) => None,
        };
        let accesses = merge_accesses(
            bindings
                .iter()
                .map(|binding| (binding.resource, binding.access))
                .chain(indirect),
        );
        for (resource, access) in accesses {
            let record = self.hazards.record(resource, access, fence);
            match record.barrier {
                Some(barrier) => {
                    self.graph.add_barrier(barrier, &record.producers, fence);
                    self.batch.push(Command::Barrier(barrier));
                    self.stats.barriers += 1;
                }
                None => {
                    for producer in record.producers {
                        self.graph.add_dependency(producer, fence, resource.id());
                    }
                }
            }
        }

        self.batch.push(Command::Dispatch(DispatchCommand {
            pipeline: pipeline.raw(),
            bindings,
            extent,
            priority,
        }));
        if labelled {
            self.batch.push(Command::EndLabel);
        }
        self.batch.push(Command::Signal(fence));
        self.stats.dispatches += 1;
        #[cfg(feature = "log-objects")]
        trace!("Recorded dispatch of `{}` signaling {}", pipeline.name(), fence);
        self.pending.push(PendingDispatch {
            pipeline,
            fence,
        });
        Ok(fence)
    }

    /// Hand all recorded commands to the device. Returns the number of dispatches submitted.
    /// # Errors
    /// If the device rejects the batch, every pending dispatch in it is rejected and
    /// [`DispatchError::DeviceFailure`] is returned. Nothing is replayed, and further submits in this epoch fail.
    pub fn flush(&mut self) -> Result<usize, DispatchError> {
        if self.batch.is_empty() {
            return Ok(0);
        }
        let epoch = self.batch.epoch();
        let batch = std::mem::replace(&mut self.batch, CommandBatch::new(epoch));
        let pending = std::mem::take(&mut self.pending);
        match self.device.submit(&batch) {
            Ok(()) => {
                for dispatch in &pending {
                    dispatch.pipeline.mark_in_flight(dispatch.fence);
                }
                debug!("Submitted {} dispatches in epoch {}", pending.len(), epoch);
                Ok(pending.len())
            }
            Err(cause) => {
                let rejected = pending.len();
                if let (Some(first), Some(last)) = (pending.first(), pending.last()) {
                    self.rejected.push(first.fence..=last.fence);
                }
                error!("Device rejected batch of epoch {}, {} dispatches dropped: {}", epoch, rejected, cause);
                self.hazards.reset();
                self.failure = Some(cause.clone());
                Err(DispatchError::DeviceFailure {
                    cause,
                    rejected,
                })
            }
        }
    }

    pub(crate) fn begin_epoch(&mut self, epoch: u64) {
        self.epoch = Some(epoch);
        self.failure = None;
        self.batch = CommandBatch::new(epoch);
        self.hazards.reset();
        self.graph.clear();
        self.stats = EpochStats::default();
    }

    /// Close the active epoch with a frame boundary and submit everything recorded in it.
    pub(crate) fn end_epoch(&mut self) -> Result<EpochStats, DispatchError> {
        let Some(epoch) = self.epoch.take() else {
            return Err(DispatchError::NoActiveFrame);
        };
        self.hazards.reset();
        if let Some(cause) = self.failure.take() {
            self.batch = CommandBatch::new(epoch);
            self.pending.clear();
            return Err(DispatchError::DeviceFailure {
                cause,
                rejected: 0,
            });
        }
        self.batch.push(Command::FrameBoundary(epoch));
        self.flush()?;
        Ok(self.stats)
    }

    /// Fence ranges of batches the device rejected since the last call.
    pub(crate) fn take_rejected(&mut self) -> Vec<RangeInclusive<GpuFence>> {
        std::mem::take(&mut self.rejected)
    }

    fn validate_extent(&self, extent: &DispatchExtent) -> Result<(), DispatchError> {
        match extent {
            DispatchExtent::Direct(groups) => {
                for (axis, (&count, &max)) in groups.as_array().iter().zip(&self.limits.max_workgroup_count).enumerate() {
                    if count == 0 || count > max {
                        return Err(DispatchError::InvalidExtent {
                            axis,
                            count,
                            max,
                        });
                    }
                }
                Ok(())
            }
            DispatchExtent::Indirect { args, offset } => {
                if args.kind() != ResourceKind::Buffer {
                    return Err(DispatchError::InvalidIndirectArgs("argument resource is not a buffer"));
                }
                if !is_aligned(*offset, INDIRECT_ARGS_ALIGNMENT) {
                    return Err(DispatchError::InvalidIndirectArgs("argument offset is not 4-byte aligned"));
                }
                if offset.saturating_add(INDIRECT_ARGS_SIZE) > args.size() {
                    return Err(DispatchError::InvalidIndirectArgs("arguments exceed the buffer size"));
                }
                Ok(())
            }
        }
    }
}
