use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::binding::BindingLayout;
use crate::pipeline::shader::ShaderHandle;

/// Cache key of a pipeline state: the shader identity plus a content hash of the binding layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PipelineKey {
    shader: ShaderHandle,
    layout_hash: u64,
}

impl PipelineKey {
    /// Compute the key for a shader and layout.
    pub fn new(shader: ShaderHandle, layout: &BindingLayout) -> Self {
        let mut hasher = DefaultHasher::new();
        layout.hash(&mut hasher);
        Self {
            shader,
            layout_hash: hasher.finish(),
        }
    }

    /// The shader this key belongs to
    pub fn shader(&self) -> ShaderHandle {
        self.shader
    }
}

impl Hash for PipelineKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.shader.0);
        state.write_u64(self.layout_hash)
    }
}
