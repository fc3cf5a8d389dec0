//! Shader resource bindings.
//!
//! A compute shader declares its inputs and outputs through a [`ShaderInterface`]: an ordered list of slots,
//! each with a [`ResourceKind`] and an [`Access`]. Before a pipeline can be built, the host proposes concrete resources
//! for each slot using a [`BindingSet`], and [`ResourceBindingTable::validate()`] turns them into a [`BindingLayout`].
//!
//! # Example
//! ```
//! use deimos::prelude::*;
//!
//! let interface = ShaderInterface::builder()
//!     .slot(0, ResourceKind::Texture, Access::ReadWrite)
//!     .slot(1, ResourceKind::Buffer, Access::Read)
//!     .build();
//!
//! let scene_color = ResourceHandle::from_raw(1, ResourceKind::Texture, 4096);
//! let replacements = ResourceHandle::from_raw(2, ResourceKind::Buffer, 96);
//! let bindings = BindingSet::new()
//!     .texture(0, scene_color, Access::ReadWrite)
//!     .buffer(1, replacements, Access::Read);
//!
//! let layout = ResourceBindingTable::validate(&interface, bindings.bindings()).unwrap();
//! assert!(layout.matches(&interface));
//! ```

pub mod interface;
pub mod resource;
pub mod table;

pub use interface::{Access, ResourceKind, ShaderInterface, ShaderInterfaceBuilder, SlotDecl};
pub use resource::{ResourceDesc, ResourceHandle};
pub use table::{Binding, BindingLayout, BindingSet, ResourceBindingTable};
