use crate::binding::ResourceKind;

/// Handle to a GPU resource allocated by the host through [`Device::allocate()`](crate::Device::allocate).
/// The core never dereferences it, it is only used to track hazards and to name resources in commands.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ResourceHandle {
    id: u64,
    kind: ResourceKind,
    size: u64,
}

impl ResourceHandle {
    /// Wrap a raw host resource id. Only device implementations should need to call this.
    pub fn from_raw(id: u64, kind: ResourceKind, size: u64) -> Self {
        Self {
            id,
            kind,
            size,
        }
    }

    /// Raw host resource id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Kind of the resource
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Size of the resource in bytes. For textures this is the size of the backing memory.
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Description of a resource to allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDesc {
    /// Name shown in debuggers
    pub name: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Size in bytes
    pub size: u64,
    /// Optional initial contents. Must not be larger than `size`.
    pub initial_data: Option<Vec<u8>>,
}

impl ResourceDesc {
    /// Describe a buffer of `size` bytes.
    pub fn buffer(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Buffer,
            size,
            initial_data: None,
        }
    }

    /// Describe a texture backed by `size` bytes of memory.
    pub fn texture(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Texture,
            size,
            initial_data: None,
        }
    }

    /// Describe a constant buffer holding `data`.
    pub fn constant(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Constant,
            size: data.len() as u64,
            initial_data: Some(data),
        }
    }

    /// Describe a sampler object.
    pub fn sampler(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ResourceKind::Sampler,
            size: 0,
            initial_data: None,
        }
    }

    /// Upload `data` into the resource on creation.
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.initial_data = Some(data);
        self
    }
}
