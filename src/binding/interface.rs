//! Shader interface description format.

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

/// Kind of resource a shader slot expects.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Structured or raw buffer
    Buffer,
    /// Storage or sampled texture
    Texture,
    /// Sampler state
    Sampler,
    /// Constant (uniform) data
    Constant,
}

impl ResourceKind {
    /// Samplers and constants can never be written by a compute shader.
    pub fn is_read_only(&self) -> bool {
        matches!(self, ResourceKind::Sampler | ResourceKind::Constant)
    }
}

/// How a shader accesses a slot.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    /// Shader only reads the resource
    Read,
    /// Shader only writes the resource
    Write,
    /// Shader reads and writes the resource
    ReadWrite,
}

impl Access {
    /// Whether this access reads the resource
    pub fn reads(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    /// Whether this access writes the resource
    pub fn writes(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }

    /// Returns true if `self` grants everything `required` needs.
    pub fn grants(&self, required: Access) -> bool {
        (!required.reads() || self.reads()) && (!required.writes() || self.writes())
    }
}

/// A single slot declared by a shader.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct SlotDecl {
    /// Slot index
    pub slot: u32,
    /// Expected resource kind
    pub kind: ResourceKind,
    /// Access the shader performs on the slot
    pub access: Access,
}

/// Describes the resources a compute shader expects, ordered by slot index.
///
/// # Example
/// ```
/// use deimos::prelude::*;
///
/// let interface = ShaderInterface::builder()
///     .slot(0, ResourceKind::Buffer, Access::Read)
///     .slot(1, ResourceKind::Buffer, Access::Write)
///     .slot(2, ResourceKind::Constant, Access::Read)
///     .build();
/// assert_eq!(interface.len(), 3);
/// ```
#[derive(Debug, Default, Clone, Hash, PartialEq, Eq)]
pub struct ShaderInterface {
    slots: Vec<SlotDecl>,
}

impl ShaderInterface {
    /// Create an interface from a list of slot declarations. Declarations are sorted by slot.
    /// If a slot is declared more than once, the last declaration wins.
    pub fn new(slots: impl IntoIterator<Item = SlotDecl>) -> Self {
        let mut decls: Vec<SlotDecl> = Vec::new();
        for decl in slots {
            match decls.iter_mut().find(|d| d.slot == decl.slot) {
                Some(existing) => *existing = decl,
                None => decls.push(decl),
            }
        }
        decls.sort_by_key(|d| d.slot);
        Self {
            slots: decls,
        }
    }

    /// Start building an interface.
    pub fn builder() -> ShaderInterfaceBuilder {
        ShaderInterfaceBuilder {
            slots: vec![],
        }
    }

    /// Slot declarations in ascending slot order.
    pub fn slots(&self) -> &[SlotDecl] {
        &self.slots
    }

    /// Look up the declaration for a slot.
    pub fn slot(&self, slot: u32) -> Option<&SlotDecl> {
        self.slots.iter().find(|d| d.slot == slot)
    }

    /// Number of declared slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the interface declares no slots at all
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Content hash of the interface, used to tie binding layouts to shaders.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Builder for [`ShaderInterface`].
#[derive(Debug)]
pub struct ShaderInterfaceBuilder {
    slots: Vec<SlotDecl>,
}

impl ShaderInterfaceBuilder {
    /// Declare a slot.
    pub fn slot(mut self, slot: u32, kind: ResourceKind, access: Access) -> Self {
        self.slots.push(SlotDecl {
            slot,
            kind,
            access,
        });
        self
    }

    /// Build the interface.
    pub fn build(self) -> ShaderInterface {
        ShaderInterface::new(self.slots)
    }
}
