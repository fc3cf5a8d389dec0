//! Exposes all structs needed to store initialization parameters.

use std::time::Duration;

use crate::pipeline::cache::DEFAULT_PIPELINE_TIME_TO_LIVE;

/// Context settings used to initialize the deimos [`ComputeContext`](crate::ComputeContext).
#[derive(Debug, Clone)]
pub struct ContextSettings {
    /// Context name. Used in log output only.
    pub name: String,
    /// Optional per-axis limit on work group counts. The effective limit is the smaller of this and the device limit.
    pub max_workgroups: Option<[u32; 3]>,
    /// Number of frames an unreferenced pipeline stays cached before it is destroyed.
    pub pipeline_time_to_live: u32,
    /// How long [`ComputeContext::read_sync()`](crate::ComputeContext::read_sync) may block before giving up.
    pub sync_readback_timeout: Duration,
    /// Wrap labelled dispatches in debug label commands. Only has an effect with the `debug-markers` feature.
    pub debug_markers: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            name: String::from(""),
            max_workgroups: None,
            pipeline_time_to_live: DEFAULT_PIPELINE_TIME_TO_LIVE,
            sync_readback_timeout: Duration::from_secs(2),
            debug_markers: true,
        }
    }
}

/// The context builder is a convenience struct to easily create [`ContextSettings`](crate::ContextSettings).
///
/// For information about each of the fields, see [`ContextSettings`](crate::ContextSettings)
/// # Example
/// ```
/// # use deimos::*;
/// use std::time::Duration;
///
/// let settings = ContextBuilder::new()
///     .name("Colour replace pass")
///     .max_workgroups([1024, 1024, 64])
///     .pipeline_time_to_live(4)
///     .sync_readback_timeout(Duration::from_millis(500))
///     .build();
/// assert_eq!(settings.pipeline_time_to_live, 4);
/// ```
#[derive(Debug, Default)]
pub struct ContextBuilder {
    inner: ContextSettings,
}

impl ContextBuilder {
    /// Create a new context builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the context name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    /// Tighten the device work group count limit.
    pub fn max_workgroups(mut self, max: [u32; 3]) -> Self {
        self.inner.max_workgroups = Some(max);
        self
    }

    /// Number of frames unreferenced pipelines stay cached.
    pub fn pipeline_time_to_live(mut self, frames: u32) -> Self {
        self.inner.pipeline_time_to_live = frames;
        self
    }

    /// Timeout for blocking readbacks.
    pub fn sync_readback_timeout(mut self, timeout: Duration) -> Self {
        self.inner.sync_readback_timeout = timeout;
        self
    }

    /// Enable or disable debug label commands.
    pub fn debug_markers(mut self, enabled: bool) -> Self {
        self.inner.debug_markers = enabled;
        self
    }

    /// Build the resulting context settings.
    pub fn build(self) -> ContextSettings {
        self.inner
    }
}
