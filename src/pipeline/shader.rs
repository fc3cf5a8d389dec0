use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::binding::ShaderInterface;

/// Opaque identifier of a compute shader registered in the [`PipelineCache`](crate::PipelineCache).
/// Handles are never reused, an invalidated shader keeps its handle forever.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShaderHandle(pub(crate) u64);

impl ShaderHandle {
    /// Get the raw handle value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Info required to register a compute shader. Use [`ShaderCreateInfo::from_bytecode`] to construct this.
#[derive(Debug, Clone)]
pub struct ShaderCreateInfo {
    name: String,
    code: Vec<u8>,
    code_hash: u64,
    interface: ShaderInterface,
    group_size: [u32; 3],
}

impl ShaderCreateInfo {
    /// Load a compiled shader blob supplied by the host into a shader create info structure.
    pub fn from_bytecode(name: impl Into<String>, code: Vec<u8>, interface: ShaderInterface) -> Self {
        let mut hasher = DefaultHasher::new();
        code.hash(&mut hasher);
        Self {
            name: name.into(),
            code,
            code_hash: hasher.finish(),
            interface,
            group_size: [1, 1, 1],
        }
    }

    /// Set the number of threads per work group, as declared in the shader source.
    /// Used by [`WorkGroupCount::for_threads`](crate::WorkGroupCount::for_threads).
    pub fn with_group_size(mut self, group_size: [u32; 3]) -> Self {
        self.group_size = group_size;
        self
    }

    /// Shader name, used for debugging and by the host to find the entry point.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw bytecode
    pub fn code(&self) -> &[u8] {
        self.code.as_slice()
    }

    /// Hash of the bytecode
    pub fn code_hash(&self) -> u64 {
        self.code_hash
    }

    /// Resources the shader expects
    pub fn interface(&self) -> &ShaderInterface {
        &self.interface
    }

    /// Threads per work group
    pub fn group_size(&self) -> [u32; 3] {
        self.group_size
    }

    /// Two create infos describe the same shader if name, code and interface are equal.
    pub(crate) fn identity_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.name.hash(&mut hasher);
        hasher.write_u64(self.code_hash);
        self.interface.hash(&mut hasher);
        self.group_size.hash(&mut hasher);
        hasher.finish()
    }
}
