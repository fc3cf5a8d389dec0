//! GPU timeline fences.
//!
//! A [`GpuFence`] is a value on a single, monotonically increasing device timeline. The scheduler hands out the
//! value a batch will signal, but only the device backend ever advances the retired counter. Consumers compare
//! values against [`Device::retired_fence()`](crate::Device::retired_fence) to find out whether work completed.

use std::fmt::{Display, Formatter};

/// Point on the device timeline. Fences order by value, a larger value always completes later.
#[derive(Debug, Default, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GpuFence(u64);

impl GpuFence {
    /// Value of the timeline before any work was submitted. This fence is always retired.
    pub const ZERO: GpuFence = GpuFence(0);

    /// Create a fence from a raw timeline value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw timeline value.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The fence value directly after this one.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true if `retired` is at or past this fence.
    pub fn is_retired(&self, retired: GpuFence) -> bool {
        retired.0 >= self.0
    }
}

impl Display for GpuFence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out fence values for one device timeline.
#[derive(Debug)]
pub(crate) struct FenceTimeline {
    next: GpuFence,
}

impl FenceTimeline {
    pub fn new() -> Self {
        Self {
            next: GpuFence::ZERO.next(),
        }
    }

    /// Allocate the next fence value.
    pub fn allocate(&mut self) -> GpuFence {
        let fence = self.next;
        self.next = self.next.next();
        fence
    }

    /// The most recently allocated value, or [`GpuFence::ZERO`] if nothing was allocated yet.
    pub fn last_allocated(&self) -> GpuFence {
        GpuFence(self.next.0 - 1)
    }
}
