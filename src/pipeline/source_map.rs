//! Virtual shader directories.
//!
//! Hosts usually ship compiled shader blobs next to their plugin or game binary. A [`ShaderSourceMap`] maps virtual
//! directories such as `/PluginShaders` to directories on disk, so shaders can be referenced by a stable virtual path.
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//!
//! let mut map = ShaderSourceMap::new();
//! map.add_mapping("/PluginShaders", "/opt/plugin/shaders").unwrap();
//! let path = map.resolve("/PluginShaders/Private/ColourReplace.spv").unwrap();
//! assert_eq!(path, std::path::PathBuf::from("/opt/plugin/shaders/Private/ColourReplace.spv"));
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::Error;

/// Maps virtual shader directories to directories on disk.
#[derive(Debug, Default, Clone)]
pub struct ShaderSourceMap {
    mappings: BTreeMap<String, PathBuf>,
}

impl ShaderSourceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a virtual directory to a directory on disk. Virtual directories must start with `/`.
    /// An existing mapping is never replaced, in that case this returns `Ok(false)`.
    pub fn add_mapping(&mut self, virtual_dir: impl Into<String>, dir: impl Into<PathBuf>) -> Result<bool, Error> {
        let virtual_dir = virtual_dir.into();
        let trimmed = virtual_dir.trim_end_matches('/');
        if !virtual_dir.starts_with('/') || trimmed.is_empty() || trimmed.contains("//") {
            return Err(Error::InvalidShaderDirectory(virtual_dir));
        }
        if self.mappings.contains_key(trimmed) {
            return Ok(false);
        }
        let dir = dir.into();
        debug!("Mapped shader directory {} to {}", trimmed, dir.display());
        self.mappings.insert(trimmed.to_owned(), dir);
        Ok(true)
    }

    /// Whether a virtual directory is mapped.
    pub fn contains(&self, virtual_dir: &str) -> bool {
        self.mappings.contains_key(virtual_dir.trim_end_matches('/'))
    }

    /// Resolve a virtual path to a path on disk. The longest mapped directory wins.
    pub fn resolve(&self, virtual_path: &str) -> Option<PathBuf> {
        self.mappings
            .iter()
            .filter_map(|(prefix, dir)| {
                let rest = virtual_path.strip_prefix(prefix.as_str())?;
                if rest.is_empty() {
                    Some((prefix.len(), dir.clone()))
                } else {
                    rest.strip_prefix('/').map(|rest| (prefix.len(), dir.join(rest)))
                }
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, path)| path)
    }

    /// Read a shader blob from a virtual path.
    pub fn load(&self, virtual_path: &str) -> Result<Vec<u8>> {
        let path = self
            .resolve(virtual_path)
            .ok_or_else(|| Error::UnmappedShaderPath(virtual_path.to_owned()))?;
        read_blob(&path).with_context(|| format!("loading shader `{virtual_path}`"))
    }
}

fn read_blob(path: &Path) -> Result<Vec<u8>> {
    let code = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    #[cfg(feature = "log-objects")]
    trace!("Loaded {} bytes of shader code from {}", code.len(), path.display());
    Ok(code)
}
