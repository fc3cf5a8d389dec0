//! Per-resource hazard tracking within one frame epoch.

use std::collections::HashMap;

use crate::binding::{Access, ResourceHandle};
use crate::dispatch::command::ResourceBarrier;
use crate::sync::fence::GpuFence;

#[derive(Debug, Default)]
struct ResourceState {
    // Last dispatch that wrote the resource, with its access
    writer: Option<(GpuFence, Access)>,
    // Dispatches that read the resource since the last write
    readers: Vec<GpuFence>,
    // A barrier already made the last write visible to readers
    write_visible: bool,
}

/// Result of recording one resource access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccessRecord {
    /// Barrier required before the access, if any
    pub barrier: Option<ResourceBarrier>,
    /// Earlier dispatches the access depends on
    pub producers: Vec<GpuFence>,
}

/// Tracks the pending accesses to every resource of the current epoch, and decides where barriers are needed.
/// Read-after-write, write-after-write and write-after-read need a barrier, read-after-read does not.
#[derive(Debug, Default)]
pub(crate) struct HazardTracker {
    resources: HashMap<u64, ResourceState>,
}

/// Merge all accesses of one dispatch to the same resource, keeping the first-seen order.
pub(crate) fn merge_accesses(accesses: impl IntoIterator<Item = (ResourceHandle, Access)>) -> Vec<(ResourceHandle, Access)> {
    let mut merged: Vec<(ResourceHandle, Access)> = Vec::new();
    for (resource, access) in accesses {
        match merged.iter_mut().find(|(r, _)| r.id() == resource.id()) {
            Some((_, existing)) => *existing = combine(*existing, access),
            None => merged.push((resource, access)),
        }
    }
    merged
}

fn combine(lhs: Access, rhs: Access) -> Access {
    match (lhs.reads() || rhs.reads(), lhs.writes() || rhs.writes()) {
        (true, true) => Access::ReadWrite,
        (false, true) => Access::Write,
        _ => Access::Read,
    }
}

impl HazardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the dispatch signaling `fence` accesses `resource`.
    pub fn record(&mut self, resource: ResourceHandle, access: Access, fence: GpuFence) -> AccessRecord {
        let state = self.resources.entry(resource.id()).or_default();
        if access.writes() {
            let mut producers = state.readers.clone();
            let src_access = if state.readers.is_empty() {
                state.writer.map(|(_, access)| access)
            } else {
                Some(Access::Read)
            };
            if let Some((writer, _)) = state.writer {
                if !producers.contains(&writer) {
                    producers.insert(0, writer);
                }
            }
            state.writer = Some((fence, access));
            state.readers.clear();
            state.write_visible = false;
            AccessRecord {
                barrier: src_access.map(|src_access| ResourceBarrier {
                    resource,
                    src_access,
                    dst_access: access,
                }),
                producers,
            }
        } else {
            let barrier = match state.writer {
                Some((_, src_access)) if !state.write_visible => {
                    state.write_visible = true;
                    Some(ResourceBarrier {
                        resource,
                        src_access,
                        dst_access: access,
                    })
                }
                _ => None,
            };
            state.readers.push(fence);
            AccessRecord {
                barrier,
                producers: state.writer.iter().map(|(writer, _)| *writer).collect(),
            }
        }
    }

    /// Forget all tracked accesses. Called at frame boundaries, which act as full barriers.
    pub fn reset(&mut self) {
        self.resources.clear();
    }

    pub fn tracked_resources(&self) -> usize {
        self.resources.len()
    }
}
