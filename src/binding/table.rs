//! Validation of candidate bindings against a shader interface.

use std::collections::HashSet;

use crate::binding::{Access, ResourceHandle, ResourceKind, ShaderInterface, SlotDecl};
use crate::core::error::BindingError;

/// A resource bound to a shader slot with the access the host permits.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct Binding {
    /// Slot index
    pub slot: u32,
    /// Bound resource
    pub resource: ResourceHandle,
    /// Access the host permits on this resource
    pub access: Access,
}

/// Builder for a set of candidate bindings.
///
/// # Example
/// ```
/// use deimos::prelude::*;
///
/// let input = ResourceHandle::from_raw(1, ResourceKind::Buffer, 64);
/// let output = ResourceHandle::from_raw(2, ResourceKind::Buffer, 64);
/// let bindings = BindingSet::new()
///     .buffer(0, input, Access::Read)
///     .buffer(1, output, Access::ReadWrite);
/// assert_eq!(bindings.len(), 2);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BindingSet {
    bindings: Vec<Binding>,
}

impl BindingSet {
    /// Create an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind any resource to a slot.
    pub fn bind(mut self, slot: u32, resource: ResourceHandle, access: Access) -> Self {
        self.bindings.push(Binding {
            slot,
            resource,
            access,
        });
        self
    }

    /// Bind a buffer to a slot. Debug builds assert the resource is a buffer, use [`BindingSet::bind()`] to
    /// propose a resource of any kind and leave the check to validation.
    pub fn buffer(self, slot: u32, resource: ResourceHandle, access: Access) -> Self {
        debug_assert_eq!(resource.kind(), ResourceKind::Buffer, "slot {slot} bound as buffer");
        self.bind(slot, resource, access)
    }

    /// Bind a texture to a slot.
    pub fn texture(self, slot: u32, resource: ResourceHandle, access: Access) -> Self {
        debug_assert_eq!(resource.kind(), ResourceKind::Texture, "slot {slot} bound as texture");
        self.bind(slot, resource, access)
    }

    /// Bind a sampler to a slot. Samplers are always read-only.
    pub fn sampler(self, slot: u32, resource: ResourceHandle) -> Self {
        debug_assert_eq!(resource.kind(), ResourceKind::Sampler, "slot {slot} bound as sampler");
        self.bind(slot, resource, Access::Read)
    }

    /// Bind constant data to a slot. Constants are always read-only.
    pub fn constant(self, slot: u32, resource: ResourceHandle) -> Self {
        debug_assert_eq!(resource.kind(), ResourceKind::Constant, "slot {slot} bound as constant");
        self.bind(slot, resource, Access::Read)
    }

    /// All bindings in insertion order
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Number of bindings in the set
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn into_inner(self) -> Vec<Binding> {
        self.bindings
    }
}

/// Ordered `(slot, kind, access)` triples a pipeline is built for. Produced by
/// [`ResourceBindingTable::validate()`], so it always matches the interface it was validated against.
/// This is a plain value type, it can be cloned and shared freely.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct BindingLayout {
    slots: Vec<SlotDecl>,
    interface_hash: u64,
}

impl BindingLayout {
    /// The validated slots, in ascending slot order. Access is the access declared by the shader.
    pub fn slots(&self) -> &[SlotDecl] {
        &self.slots
    }

    /// Number of slots in the layout
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the layout has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true if this layout was produced from `interface`.
    pub fn matches(&self, interface: &ShaderInterface) -> bool {
        self.interface_hash == interface.content_hash() && self.slots.as_slice() == interface.slots()
    }

    /// Check concrete bindings against this layout, with the same rules as [`ResourceBindingTable::validate()`].
    pub fn check(&self, bindings: &[Binding]) -> Result<(), BindingError> {
        check_bindings(&self.slots, bindings)
    }
}

/// Validates candidate bindings against a [`ShaderInterface`].
///
/// Validation never coerces: a binding either satisfies its slot exactly (same kind, sufficient access), or
/// an error naming the first offending slot is returned. Checks always run in the same order, first duplicate slots,
/// then every declared slot in ascending order, then bindings to undeclared slots. Identical inputs
/// therefore always produce identical results.
///
/// # Example
/// ```
/// use deimos::prelude::*;
///
/// let interface = ShaderInterface::builder()
///     .slot(0, ResourceKind::Buffer, Access::Read)
///     .slot(1, ResourceKind::Buffer, Access::Write)
///     .build();
/// let input = ResourceHandle::from_raw(1, ResourceKind::Buffer, 64);
/// let output = ResourceHandle::from_raw(2, ResourceKind::Buffer, 64);
/// let bindings = BindingSet::new()
///     .buffer(0, input, Access::Read)
///     .buffer(1, output, Access::Read);
/// let result = ResourceBindingTable::validate(&interface, bindings.bindings());
/// assert!(matches!(result, Err(BindingError::AccessViolation { slot: 1, .. })));
/// ```
#[derive(Debug)]
pub struct ResourceBindingTable;

impl ResourceBindingTable {
    /// Validate `candidates` against `interface`, producing the binding layout a pipeline can be built for.
    /// # Errors
    /// - [`BindingError::DuplicateSlot`] if a slot is bound twice.
    /// - [`BindingError::MissingSlot`] if a declared slot has no binding.
    /// - [`BindingError::KindMismatch`] if a bound resource has the wrong kind.
    /// - [`BindingError::AccessViolation`] if a binding does not grant the declared access.
    /// - [`BindingError::UnexpectedSlot`] if a binding targets an undeclared slot.
    pub fn validate(interface: &ShaderInterface, candidates: &[Binding]) -> Result<BindingLayout, BindingError> {
        check_bindings(interface.slots(), candidates)?;
        Ok(BindingLayout {
            slots: interface.slots().to_vec(),
            interface_hash: interface.content_hash(),
        })
    }
}

fn check_bindings(declared: &[SlotDecl], candidates: &[Binding]) -> Result<(), BindingError> {
    let mut seen = HashSet::new();
    let mut duplicates = candidates
        .iter()
        .filter(|binding| !seen.insert(binding.slot))
        .map(|binding| binding.slot)
        .collect::<Vec<_>>();
    duplicates.sort_unstable();
    if let Some(&slot) = duplicates.first() {
        return Err(BindingError::DuplicateSlot(slot));
    }

    for decl in declared {
        let binding = candidates
            .iter()
            .find(|binding| binding.slot == decl.slot)
            .ok_or(BindingError::MissingSlot(decl.slot))?;
        check_slot(decl, binding)?;
    }

    let mut unexpected = candidates
        .iter()
        .filter(|binding| !declared.iter().any(|decl| decl.slot == binding.slot))
        .map(|binding| binding.slot)
        .collect::<Vec<_>>();
    unexpected.sort_unstable();
    match unexpected.first() {
        Some(&slot) => Err(BindingError::UnexpectedSlot(slot)),
        None => Ok(()),
    }
}

fn check_slot(decl: &SlotDecl, binding: &Binding) -> Result<(), BindingError> {
    let found = binding.resource.kind();
    if found != decl.kind {
        return Err(BindingError::KindMismatch {
            slot: decl.slot,
            expected: decl.kind,
            found,
        });
    }
    let read_only_violation = decl.kind.is_read_only() && (binding.access.writes() || decl.access.writes());
    if read_only_violation || !binding.access.grants(decl.access) {
        return Err(BindingError::AccessViolation {
            slot: decl.slot,
            declared: decl.access,
            requested: binding.access,
        });
    }
    Ok(())
}
