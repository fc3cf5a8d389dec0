use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::FutureExt;

use crate::binding::ResourceHandle;
use crate::core::error::ReadbackError;
use crate::sync::fence::GpuFence;

/// Completion callback of a readback. Receives exactly the requested number of bytes.
pub type ReadbackCallback = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;

/// Identifies a pending readback, used to cancel it.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReadbackHandle(pub(crate) u64);

/// Outcome of [`ReadbackManager::cancel()`](crate::ReadbackManager::cancel).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cancellation {
    /// The readback was removed, its callback will never run.
    Cancelled,
    /// The fence already retired. Cancelling is a no-op and the callback still fires.
    AlreadyRetired,
    /// The handle does not refer to a pending readback, e.g. because it was already fulfilled.
    Unknown,
}

pub(crate) enum Completion {
    Callback(ReadbackCallback),
    Channel(oneshot::Sender<Result<Vec<u8>, ReadbackError>>),
}

/// A pending transfer of GPU data into host memory.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct ReadbackSlot {
    pub handle: ReadbackHandle,
    pub fence: GpuFence,
    pub source: ResourceHandle,
    pub size: u64,
    #[derivative(Debug = "ignore")]
    pub completion: Completion,
}

impl ReadbackSlot {
    /// Deliver the data. Consumes the slot, so a slot completes at most once.
    pub fn fulfill(self, data: Vec<u8>) {
        match self.completion {
            Completion::Callback(callback) => callback(data),
            Completion::Channel(sender) => {
                // The receiver may have been dropped, in that case there is nobody left to notify.
                let _ = sender.send(Ok(data));
            }
        }
    }

    /// Drop the slot without delivering data.
    pub fn fail(self, error: ReadbackError) {
        if let Completion::Channel(sender) = self.completion {
            let _ = sender.send(Err(error));
        }
    }
}

/// Resolves to the bytes of a readback once its fence retired and the frame it was requested in was polled.
///
/// The future does not drive any work by itself, the data is delivered by
/// [`ComputeContext::on_frame_end()`](crate::ComputeContext::on_frame_end).
#[derive(Debug)]
pub struct ReadbackFuture {
    handle: ReadbackHandle,
    receiver: oneshot::Receiver<Result<Vec<u8>, ReadbackError>>,
}

impl ReadbackFuture {
    pub(crate) fn new(handle: ReadbackHandle, receiver: oneshot::Receiver<Result<Vec<u8>, ReadbackError>>) -> Self {
        Self {
            handle,
            receiver,
        }
    }

    /// Handle of the underlying readback, can be used to cancel it.
    pub fn handle(&self) -> ReadbackHandle {
        self.handle
    }

    /// Returns the result if it is available, without blocking.
    pub fn try_take(&mut self) -> Option<Result<Vec<u8>, ReadbackError>> {
        match self.receiver.try_recv() {
            Ok(result) => result,
            Err(oneshot::Canceled) => Some(Err(ReadbackError::Cancelled)),
        }
    }
}

impl Future for ReadbackFuture {
    type Output = Result<Vec<u8>, ReadbackError>;

    fn poll(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(ctx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(ReadbackError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}
