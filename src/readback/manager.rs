use std::ops::RangeInclusive;
use std::time::Duration;

use futures::channel::oneshot;
use multimap::MultiMap;

use crate::binding::ResourceHandle;
use crate::core::device::DeviceRef;
use crate::core::error::{DeviceError, ReadbackError};
use crate::readback::slot::{Cancellation, Completion, ReadbackFuture, ReadbackHandle, ReadbackSlot};
use crate::sync::fence::GpuFence;

/// Result of one polling pass.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Retired fence value observed by this pass
    pub retired: GpuFence,
    /// Readbacks whose data was delivered
    pub fulfilled: usize,
    /// Number of host copies made. Readbacks of the same resource at the same fence share one copy.
    pub copies: usize,
    /// Readbacks dropped because the host copy failed
    pub failed: usize,
}

/// Moves GPU results into host memory once the dispatches producing them retired.
///
/// Requests are grouped by fence. Polling reads the device's retired counter once, and fulfills every request whose
/// fence is at or below it. Requests sharing a fence and a source resource share one host copy, each request still
/// receives its own prefix of the data. Callbacks run on the thread that polls, exactly once.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ReadbackManager {
    #[derivative(Debug = "ignore")]
    device: DeviceRef,
    slots: MultiMap<u64, ReadbackSlot>,
    next_handle: u64,
    last_retired: GpuFence,
    rejected: Vec<RangeInclusive<GpuFence>>,
    sync_timeout: Duration,
}

impl ReadbackManager {
    /// Create a new readback manager. `sync_timeout` bounds [`ReadbackManager::read_sync()`].
    pub fn new(device: DeviceRef, sync_timeout: Duration) -> Self {
        Self {
            device,
            slots: MultiMap::new(),
            next_handle: 1,
            last_retired: GpuFence::ZERO,
            rejected: vec![],
            sync_timeout,
        }
    }

    /// Request the first `size` bytes of `source` once `fence` retired. The callback runs during the first poll that
    /// observes the fence as retired, never earlier.
    ///
    /// If the host copy fails, the callback is dropped without being called. The failure is logged and counted in
    /// [`FrameReport::readbacks_failed`](crate::FrameReport::readbacks_failed). Use
    /// [`ReadbackManager::request_readback_future()`] to receive the [`ReadbackError::Device`] instead.
    /// # Errors
    /// - [`ReadbackError::ZeroSize`] if `size` is zero.
    /// - [`ReadbackError::Rejected`] if the fence belongs to a batch the device rejected.
    pub fn request_readback(
        &mut self,
        fence: GpuFence,
        source: ResourceHandle,
        size: u64,
        callback: impl FnOnce(Vec<u8>) + Send + 'static,
    ) -> Result<ReadbackHandle, ReadbackError> {
        self.insert(fence, source, size, Completion::Callback(Box::new(callback)))
    }

    /// Same as [`ReadbackManager::request_readback()`], but delivers the data through a future.
    /// The future resolves to an error if the readback is cancelled, its batch is rejected, or the host copy fails.
    pub fn request_readback_future(
        &mut self,
        fence: GpuFence,
        source: ResourceHandle,
        size: u64,
    ) -> Result<ReadbackFuture, ReadbackError> {
        let (sender, receiver) = oneshot::channel();
        let handle = self.insert(fence, source, size, Completion::Channel(sender))?;
        Ok(ReadbackFuture::new(handle, receiver))
    }

    fn insert(&mut self, fence: GpuFence, source: ResourceHandle, size: u64, completion: Completion) -> Result<ReadbackHandle, ReadbackError> {
        if size == 0 {
            return Err(ReadbackError::ZeroSize);
        }
        if self.is_rejected(fence) {
            return Err(ReadbackError::Rejected(fence));
        }
        let handle = ReadbackHandle(self.next_handle);
        self.next_handle += 1;
        self.slots.insert(
            fence.value(),
            ReadbackSlot {
                handle,
                fence,
                source,
                size,
                completion,
            },
        );
        Ok(handle)
    }

    /// Cancel a pending readback. Only honored while its fence has not retired.
    pub fn cancel(&mut self, handle: ReadbackHandle) -> Cancellation {
        let Some(fence) = self.find(handle) else {
            warn!("Cancelling unknown readback {:?}", handle);
            return Cancellation::Unknown;
        };
        let retired = self.device.retired_fence().unwrap_or_else(|e| {
            warn!("Could not query retired fence while cancelling readback: {}", e);
            self.last_retired
        });
        if fence.is_retired(retired) {
            return Cancellation::AlreadyRetired;
        }
        if let Some(slot) = self.take(fence, handle) {
            slot.fail(ReadbackError::Cancelled);
        }
        Cancellation::Cancelled
    }

    /// Whether the readback is still waiting for its fence.
    pub fn is_pending(&self, handle: ReadbackHandle) -> bool {
        self.find(handle).is_some()
    }

    /// Number of pending readbacks.
    pub fn pending_count(&self) -> usize {
        self.slots.iter_all().map(|(_, slots)| slots.len()).sum()
    }

    /// Retired fence value observed by the most recent poll.
    pub fn last_retired(&self) -> GpuFence {
        self.last_retired
    }

    /// Block until `fence` retires, then copy `size` bytes of `source` to the host.
    /// # Errors
    /// - [`ReadbackError::Timeout`] if the fence did not retire within the configured timeout.
    /// - [`ReadbackError::Rejected`] if the fence belongs to a rejected batch.
    pub fn read_sync(&mut self, fence: GpuFence, source: ResourceHandle, size: u64) -> Result<Vec<u8>, ReadbackError> {
        if size == 0 {
            return Err(ReadbackError::ZeroSize);
        }
        if self.is_rejected(fence) {
            return Err(ReadbackError::Rejected(fence));
        }
        if !self.device.wait_for_fence(fence, self.sync_timeout)? {
            return Err(ReadbackError::Timeout(fence));
        }
        Ok(self.device.read_back(source, size)?)
    }

    /// Fulfill every readback whose fence retired.
    pub(crate) fn poll(&mut self) -> Result<PollReport, DeviceError> {
        let retired = self.device.retired_fence()?;
        self.last_retired = retired;
        let mut report = PollReport {
            retired,
            ..Default::default()
        };

        let mut ready = self
            .slots
            .keys()
            .copied()
            .filter(|&value| GpuFence::new(value).is_retired(retired))
            .collect::<Vec<_>>();
        ready.sort_unstable();

        for value in ready {
            let Some(mut slots) = self.slots.remove(&value) else {
                continue;
            };
            slots.sort_by_key(|slot| slot.handle);
            let mut sources: Vec<ResourceHandle> = Vec::new();
            for slot in &slots {
                if !sources.iter().any(|source| source.id() == slot.source.id()) {
                    sources.push(slot.source);
                }
            }

            for source in sources {
                let (group, rest): (Vec<_>, Vec<_>) = slots.into_iter().partition(|slot| slot.source.id() == source.id());
                slots = rest;
                let size = group.iter().map(|slot| slot.size).max().unwrap_or_default();
                report.copies += 1;
                match self.device.read_back(source, size) {
                    Ok(data) => {
                        for slot in group {
                            let len = (slot.size as usize).min(data.len());
                            slot.fulfill(data[..len].to_vec());
                            report.fulfilled += 1;
                        }
                    }
                    Err(e) => {
                        error!("Readback of resource {} at fence {} failed: {}", source.id(), value, e);
                        report.failed += group.len();
                        for slot in group {
                            slot.fail(ReadbackError::Device(e.clone()));
                        }
                    }
                }
            }
        }
        if report.fulfilled > 0 {
            debug!("Fulfilled {} readbacks with {} copies, retired fence {}", report.fulfilled, report.copies, retired);
        }
        Ok(report)
    }

    /// Drop every readback waiting on a fence in `fences`. Their fences will never retire.
    /// Returns the number of dropped readbacks.
    pub(crate) fn reject(&mut self, fences: RangeInclusive<GpuFence>) -> usize {
        let keys = self
            .slots
            .keys()
            .copied()
            .filter(|value| fences.contains(&GpuFence::new(*value)))
            .collect::<Vec<_>>();
        let mut dropped = 0;
        for key in keys {
            for slot in self.slots.remove(&key).unwrap_or_default() {
                slot.fail(ReadbackError::Rejected(GpuFence::new(key)));
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!("Dropped {} readbacks waiting on rejected fences {}..={}", dropped, fences.start(), fences.end());
        }
        self.insert_rejected(fences);
        dropped
    }

    /// Fence ranges of rejected batches, sorted and merged. Consecutive failures collapse into one range.
    pub fn rejected_ranges(&self) -> &[RangeInclusive<GpuFence>] {
        &self.rejected
    }

    // Ranges stay sorted by start, disjoint and non-adjacent.
    fn insert_rejected(&mut self, fences: RangeInclusive<GpuFence>) {
        let (mut start, mut end) = fences.into_inner();
        let first = self.rejected.partition_point(|range| range.end().next() < start);
        let last = self.rejected.partition_point(|range| *range.start() <= end.next());
        for range in &self.rejected[first..last] {
            start = start.min(*range.start());
            end = end.max(*range.end());
        }
        self.rejected.splice(first..last, [start..=end]);
    }

    fn is_rejected(&self, fence: GpuFence) -> bool {
        let index = self.rejected.partition_point(|range| *range.end() < fence);
        self.rejected.get(index).map_or(false, |range| range.contains(&fence))
    }

    fn find(&self, handle: ReadbackHandle) -> Option<GpuFence> {
        self.slots
            .iter_all()
            .find(|(_, slots)| slots.iter().any(|slot| slot.handle == handle))
            .map(|(value, _)| GpuFence::new(*value))
    }

    fn take(&mut self, fence: GpuFence, handle: ReadbackHandle) -> Option<ReadbackSlot> {
        let slots = self.slots.get_vec_mut(&fence.value())?;
        let index = slots.iter().position(|slot| slot.handle == handle)?;
        let slot = slots.remove(index);
        if slots.is_empty() {
            self.slots.remove(&fence.value());
        }
        Some(slot)
    }
}
