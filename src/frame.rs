//! Translation of the host's frame timeline into scheduler epochs.
//!
//! The host render thread calls [`FrameGraphAdapter::on_frame_begin()`] before recording any compute work of a frame,
//! and [`FrameGraphAdapter::on_frame_end()`] after. Ending a frame submits the recorded batch, polls readbacks and
//! collects unused pipelines, in that order. This is the only place readbacks are polled.

use crate::core::error::{DispatchError, FrameError};
use crate::dispatch::DispatchScheduler;
use crate::pipeline::cache::PipelineCache;
use crate::readback::ReadbackManager;
use crate::sync::fence::GpuFence;

/// Frame timeline events emitted by the host render thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HostFrameEvent {
    /// The host started recording a frame
    FrameStart,
    /// The host finished recording a frame
    FrameEnd,
}

/// Summary of one finished frame.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Epoch of the frame
    pub epoch: u64,
    /// Dispatches submitted in this frame
    pub dispatches: usize,
    /// Barriers inserted in this frame
    pub barriers: usize,
    /// Retired fence observed while polling readbacks
    pub retired: GpuFence,
    /// Readbacks delivered at the end of this frame
    pub readbacks_fulfilled: usize,
    /// Readbacks dropped because a host copy failed
    pub readbacks_failed: usize,
    /// Pipelines destroyed at the end of this frame
    pub pipelines_destroyed: usize,
}

/// Drives the scheduler, readback manager and pipeline cache from host frame events.
#[derive(Debug, Default)]
pub struct FrameGraphAdapter {
    next_epoch: u64,
    active: Option<u64>,
}

impl FrameGraphAdapter {
    /// Create an adapter. The first frame has epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active epoch, if a frame is being recorded.
    pub fn active_epoch(&self) -> Option<u64> {
        self.active
    }

    /// Number of frames started so far.
    pub fn frames_started(&self) -> u64 {
        self.next_epoch
    }

    /// Start a new ordering epoch. Returns the epoch number.
    /// # Errors
    /// Fails with [`FrameError::AlreadyActive`] if the previous frame was not ended.
    pub fn on_frame_begin(&mut self, scheduler: &mut DispatchScheduler) -> Result<u64, FrameError> {
        if let Some(epoch) = self.active {
            return Err(FrameError::AlreadyActive(epoch));
        }
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.active = Some(epoch);
        scheduler.begin_epoch(epoch);
        Ok(epoch)
    }

    /// End the active epoch: submit the batch, poll readbacks, then collect pipelines.
    /// # Errors
    /// - [`FrameError::NotActive`] if no frame is active.
    /// - [`FrameError::Dispatch`] with [`DispatchError::DeviceFailure`] if the device rejected the batch or failed
    ///   while polling. Readbacks waiting on the rejected batch are dropped and never called.
    pub fn on_frame_end(
        &mut self,
        scheduler: &mut DispatchScheduler,
        cache: &mut PipelineCache,
        readback: &mut ReadbackManager,
    ) -> Result<FrameReport, FrameError> {
        let epoch = self.active.take().ok_or(FrameError::NotActive)?;
        let submitted = scheduler.end_epoch();
        for range in scheduler.take_rejected() {
            readback.reject(range);
        }

        let mut report = FrameReport {
            epoch,
            ..Default::default()
        };
        match readback.poll() {
            Ok(poll) => {
                report.retired = poll.retired;
                report.readbacks_fulfilled = poll.fulfilled;
                report.readbacks_failed = poll.failed;
                report.pipelines_destroyed = cache.collect(poll.retired);
            }
            Err(cause) => {
                error!("Polling readbacks at the end of frame {} failed: {}", epoch, cause);
                submitted?;
                return Err(DispatchError::DeviceFailure {
                    cause,
                    rejected: 0,
                }
                .into());
            }
        }

        let stats = submitted?;
        report.dispatches = stats.dispatches;
        report.barriers = stats.barriers;
        debug!(
            "Frame {} finished: {} dispatches, {} barriers, {} readbacks, {} pipelines destroyed",
            epoch, report.dispatches, report.barriers, report.readbacks_fulfilled, report.pipelines_destroyed
        );
        Ok(report)
    }

    /// Forward a host frame event. Returns the frame report for [`HostFrameEvent::FrameEnd`].
    pub fn on_host_event(
        &mut self,
        event: HostFrameEvent,
        scheduler: &mut DispatchScheduler,
        cache: &mut PipelineCache,
        readback: &mut ReadbackManager,
    ) -> Result<Option<FrameReport>, FrameError> {
        match event {
            HostFrameEvent::FrameStart => self.on_frame_begin(scheduler).map(|_| None),
            HostFrameEvent::FrameEnd => self.on_frame_end(scheduler, cache, readback).map(Some),
        }
    }
}
