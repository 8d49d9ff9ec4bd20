//! Resource registry (spec §4.2).
//!
//! Gives every registered resource a handle that survives replacement but
//! reliably detects staleness: a slot table of `{resource, generation, id,
//! alive}`, keyed either by a stable [`ResourceIdentifier`] or by a raw
//! pointer for anonymous/ephemeral registrations.

use std::collections::HashMap;

use crate::identifier::ResourceIdentifier;

pub type SlotIndex = u32;
pub type Generation = u32;

/// Sentinel slot index meaning "this handle carries its raw pointer
/// directly and bypasses the registry on resolve."
const EPHEMERAL_SLOT: SlotIndex = SlotIndex::MAX;

/// A handle into the registry. Encodes enough to detect staleness without
/// consulting the registry (generation mismatch) and, for ephemeral
/// handles, to resolve without a slot lookup at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryHandle {
    slot_index: SlotIndex,
    generation: Generation,
    pub global_resource_id: u64,
    pub num_mips: u32,
    pub array_size: u32,
    ephemeral_ptr: Option<usize>,
}

impl RegistryHandle {
    /// A generation-0 handle resolves to null unconditionally; used for
    /// "unknown identifier" lookups that the caller allows to fail.
    pub fn invalid() -> Self {
        Self {
            slot_index: 0,
            generation: 0,
            global_resource_id: 0,
            num_mips: 0,
            array_size: 0,
            ephemeral_ptr: None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_ptr.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.generation != 0 || self.ephemeral_ptr.is_some()
    }
}

struct Slot<R> {
    resource: Option<R>,
    generation: Generation,
    id: Option<ResourceIdentifier>,
    global_resource_id: u64,
    num_mips: u32,
    array_size: u32,
}

/// Generation-stamped slot table mapping stable identifiers and raw
/// pointers to opaque handles.
pub struct ResourceRegistry<R> {
    slots: Vec<Slot<R>>,
    by_identifier: HashMap<ResourceIdentifier, SlotIndex>,
    by_pointer: HashMap<usize, RegistryHandle>,
}

impl<R> Default for ResourceRegistry<R> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            by_identifier: HashMap::new(),
            by_pointer: HashMap::new(),
        }
    }
}

impl<R> ResourceRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a stable key, returning its slot index (creating an empty
    /// slot if this is the first time `id` is seen).
    pub fn intern_key(&mut self, id: &ResourceIdentifier) -> SlotIndex {
        if let Some(&idx) = self.by_identifier.get(id) {
            return idx;
        }
        let idx = self.push_empty_slot(Some(id.clone()));
        self.by_identifier.insert(id.clone(), idx);
        idx
    }

    fn push_empty_slot(&mut self, id: Option<ResourceIdentifier>) -> SlotIndex {
        let idx = self.slots.len() as SlotIndex;
        self.slots.push(Slot {
            resource: None,
            generation: 1,
            id,
            global_resource_id: 0,
            num_mips: 0,
            array_size: 0,
        });
        idx
    }

    /// Register or replace the resource at `id`'s slot. Bumps the slot
    /// generation (invalidating previously minted handles) and removes any
    /// stale pointer->handle reverse-map entry for the old resource.
    pub fn register_or_update(
        &mut self,
        id: &ResourceIdentifier,
        resource: R,
        global_resource_id: u64,
        num_mips: u32,
        array_size: u32,
    ) -> RegistryHandle {
        let idx = self.intern_key(id);
        let slot = &mut self.slots[idx as usize];
        slot.generation += 1;
        slot.resource = Some(resource);
        slot.global_resource_id = global_resource_id;
        slot.num_mips = num_mips;
        slot.array_size = array_size;
        self.by_pointer.retain(|_, h| h.slot_index != idx);
        RegistryHandle {
            slot_index: idx,
            generation: slot.generation,
            global_resource_id,
            num_mips,
            array_size,
            ephemeral_ptr: None,
        }
    }

    /// Register a resource with no stable identifier (anonymous). Each call
    /// gets its own fresh slot, so two anonymous registrations of the same
    /// pointer return distinct handles.
    pub fn register_anonymous(
        &mut self,
        resource: R,
        global_resource_id: u64,
        num_mips: u32,
        array_size: u32,
    ) -> RegistryHandle {
        let idx = self.push_empty_slot(None);
        let slot = &mut self.slots[idx as usize];
        slot.generation += 1;
        slot.resource = Some(resource);
        slot.global_resource_id = global_resource_id;
        slot.num_mips = num_mips;
        slot.array_size = array_size;
        RegistryHandle {
            slot_index: idx,
            generation: slot.generation,
            global_resource_id,
            num_mips,
            array_size,
            ephemeral_ptr: None,
        }
    }

    /// Mint a handle that carries `ptr` directly and bypasses the registry
    /// on resolve. Used for resources whose lifetime is pinned elsewhere.
    pub fn register_ephemeral(
        &mut self,
        ptr: usize,
        global_resource_id: u64,
        num_mips: u32,
        array_size: u32,
    ) -> RegistryHandle {
        let handle = RegistryHandle {
            slot_index: EPHEMERAL_SLOT,
            generation: 1,
            global_resource_id,
            num_mips,
            array_size,
            ephemeral_ptr: Some(ptr),
        };
        self.by_pointer.insert(ptr, handle);
        handle
    }

    /// `MakeHandle` for a known id: returns a handle valid for the current
    /// generation, or `RegistryHandle::invalid()` if `id` isn't registered.
    pub fn make_handle(&self, id: &ResourceIdentifier) -> RegistryHandle {
        match self.by_identifier.get(id) {
            Some(&idx) => {
                let slot = &self.slots[idx as usize];
                RegistryHandle {
                    slot_index: idx,
                    generation: slot.generation,
                    global_resource_id: slot.global_resource_id,
                    num_mips: slot.num_mips,
                    array_size: slot.array_size,
                    ephemeral_ptr: None,
                }
            }
            None => RegistryHandle::invalid(),
        }
    }

    /// Resolve a handle to its resource. Returns `None` for a stale handle
    /// (generation mismatch) without touching the ephemeral path.
    pub fn resolve(&self, handle: RegistryHandle) -> Option<&R> {
        if handle.slot_index == EPHEMERAL_SLOT {
            return None; // ephemeral handles carry the pointer, not a slot.
        }
        let slot = self.slots.get(handle.slot_index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.resource.as_ref()
    }

    pub fn resolve_mut(&mut self, handle: RegistryHandle) -> Option<&mut R> {
        if handle.slot_index == EPHEMERAL_SLOT {
            return None;
        }
        let slot = self.slots.get_mut(handle.slot_index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.resource.as_mut()
    }

    pub fn is_ephemeral_handle_known(&self, handle: RegistryHandle) -> bool {
        handle
            .ephemeral_ptr
            .is_some_and(|p| self.by_pointer.contains_key(&p))
    }
}

/// Restricted view over a registry: resolves only identifiers that match
/// the pass's declared namespace allow-list.
pub struct ResourceRegistryView<'a, R> {
    registry: &'a ResourceRegistry<R>,
    allowed: crate::identifier::ResourceGroup,
}

impl<'a, R> ResourceRegistryView<'a, R> {
    pub fn new(registry: &'a ResourceRegistry<R>, allowed: crate::identifier::ResourceGroup) -> Self {
        Self { registry, allowed }
    }

    /// `RequestShared`: resolves `id` through the view, failing if `id` is
    /// not in the caller's declared allow-list.
    pub fn request_shared(&self, id: &ResourceIdentifier) -> crate::error::Result<&R> {
        if !self.allowed.allows(id) {
            return Err(crate::error::GraphError::AccessViolation(id.clone()));
        }
        let handle = self.registry.make_handle(id);
        if !handle.is_valid() {
            return Err(crate::error::GraphError::UnknownResourceIdentifier(
                id.clone(),
            ));
        }
        self.registry
            .resolve(handle)
            .ok_or(crate::error::GraphError::InvalidHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_after_replace_old_handle_is_null() {
        let mut reg: ResourceRegistry<u32> = ResourceRegistry::new();
        let id = ResourceIdentifier::parse("Builtin::A");
        let h1 = reg.register_or_update(&id, 1, 100, 1, 1);
        assert_eq!(reg.resolve(h1), Some(&1));

        let h2 = reg.register_or_update(&id, 2, 101, 1, 1);
        assert_eq!(reg.resolve(h1), None, "stale handle must resolve to null");
        assert_eq!(reg.resolve(h2), Some(&2));
    }

    #[test]
    fn anonymous_registrations_get_distinct_slots() {
        let mut reg: ResourceRegistry<u32> = ResourceRegistry::new();
        let h1 = reg.register_anonymous(7, 1, 1, 1);
        let h2 = reg.register_anonymous(7, 1, 1, 1);
        assert_ne!(h1, h2);
        assert_eq!(reg.resolve(h1), Some(&7));
        assert_eq!(reg.resolve(h2), Some(&7));
    }

    #[test]
    fn unknown_identifier_yields_invalid_handle() {
        let reg: ResourceRegistry<u32> = ResourceRegistry::new();
        let handle = reg.make_handle(&ResourceIdentifier::parse("Nope::Here"));
        assert!(!handle.is_valid());
        assert!(reg.resolve(handle).is_none());
    }

    #[test]
    fn view_denies_access_outside_allow_list() {
        let mut reg: ResourceRegistry<u32> = ResourceRegistry::new();
        let allowed_id = ResourceIdentifier::parse("Builtin::GBuffer::Normals");
        let denied_id = ResourceIdentifier::parse("Builtin::Shadow::Map");
        reg.register_or_update(&allowed_id, 1, 1, 1, 1);
        reg.register_or_update(&denied_id, 2, 2, 1, 1);

        let group = crate::identifier::ResourceGroup::new()
            .with(ResourceIdentifier::parse("Builtin::GBuffer"));
        let view = ResourceRegistryView::new(&reg, group);

        assert!(view.request_shared(&allowed_id).is_ok());
        assert!(matches!(
            view.request_shared(&denied_id),
            Err(crate::error::GraphError::AccessViolation(_))
        ));
    }
}
