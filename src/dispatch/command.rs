//! Commands recorded by the scheduler and handed to the device.

use crate::binding::{Access, Binding, ResourceHandle};
use crate::core::device::RawPipeline;
use crate::dispatch::request::{DispatchExtent, DispatchPriority};
use crate::sync::fence::GpuFence;

/// Execution and memory dependency on a single resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourceBarrier {
    /// Resource the barrier applies to
    pub resource: ResourceHandle,
    /// Access of the earlier dispatches
    pub src_access: Access,
    /// Access of the dispatch waiting on the barrier
    pub dst_access: Access,
}

/// A recorded compute dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCommand {
    /// Pipeline to bind
    pub pipeline: RawPipeline,
    /// Resources to bind, sorted by slot
    pub bindings: Vec<Binding>,
    /// Work group counts
    pub extent: DispatchExtent,
    /// Scheduling hint for the device. Never changes the recorded order.
    pub priority: DispatchPriority,
}

/// A single command in a [`CommandBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a debug label region
    BeginLabel(String),
    /// Close the innermost debug label region
    EndLabel,
    /// Wait for earlier accesses to a resource before continuing
    Barrier(ResourceBarrier),
    /// Run a compute dispatch
    Dispatch(DispatchCommand),
    /// Advance the retired fence counter to this value once all previous commands completed
    Signal(GpuFence),
    /// End of a frame epoch. Acts as a full barrier.
    FrameBoundary(u64),
}

/// Commands of one submission, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    epoch: u64,
    commands: Vec<Command>,
}

impl CommandBatch {
    pub(crate) fn new(epoch: u64) -> Self {
        Self {
            epoch,
            commands: vec![],
        }
    }

    pub(crate) fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Frame epoch the commands were recorded in
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// All commands in recording order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the batch holds no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of dispatch commands
    pub fn dispatch_count(&self) -> usize {
        self.commands.iter().filter(|cmd| matches!(cmd, Command::Dispatch(_))).count()
    }

    /// Every fence signaled by this batch, ascending.
    pub fn signals(&self) -> impl Iterator<Item = GpuFence> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::Signal(fence) => Some(*fence),
            _ => None,
        })
    }
}
