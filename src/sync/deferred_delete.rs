use crate::sync::fence::GpuFence;

#[derive(Debug)]
struct Item<T> {
    value: T,
    // Last fence that may still use the value
    fence: GpuFence,
}

/// Holds values until the device has retired the last fence that used them.
#[derive(Debug)]
pub struct DeletionQueue<T> {
    items: Vec<Item<T>>,
}

impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self {
            items: vec![],
        }
    }
}

impl<T> DeletionQueue<T> {
    pub fn new() -> DeletionQueue<T> {
        Self::default()
    }

    /// Pushes a value onto the deletion queue.
    /// Note that this moves out of the parameter so that you can't access an object after
    /// it is pushed.
    pub fn push(&mut self, value: T, fence: GpuFence) {
        self.items.push(Item {
            value,
            fence,
        });
    }

    /// Remove every value whose fence has retired and is accepted by `ready`.
    /// Values that are not ready yet stay in the queue.
    pub fn drain_retired<F: FnMut(&T) -> bool>(&mut self, retired: GpuFence, mut ready: F) -> Vec<T> {
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|item| item.fence.is_retired(retired) && ready(&item.value));
        self.items = pending;
        done.into_iter().map(|item| item.value).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
