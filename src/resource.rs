//! Resource model (spec §3 "Resource", §9 "Deep inheritance").
//!
//! The original hierarchy (`Resource` / `GloballyIndexedResource` /
//! `PixelBuffer` / `Buffer`) collapses here to one tagged enum with
//! capability queries, rather than a trait-object hierarchy: the scheduler
//! core only ever needs `{kind, id, mips, array_size, backing-present?,
//! state-tracker, alias-allowed?, heap-type-or-N/A, size-bytes-or-N/A}`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::state::{ResourceState, SymbolicTracker};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh process-wide unique resource id.
pub fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapType {
    Default,
    Upload,
    Readback,
}

/// Device-visible clear value; narrow enough to be backend-agnostic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u8 },
}

#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub mip_levels: u32,
    pub array_size: u32,
    pub is_cubemap: bool,
    pub clear_value: Option<ClearValue>,
    pub allow_alias: bool,
    pub alias_pool_hint: Option<u64>,
    /// Opt-in idle-dematerialization threshold (spec §4.8 step 6): `None`
    /// means this texture is never dematerialized for being idle.
    pub dematerialize_after_idle_frames: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub size_bytes: u64,
    pub heap_type: HeapType,
    pub is_uav: bool,
    pub allow_alias: bool,
    pub alias_pool_hint: Option<u64>,
}

/// A resource's variant-specific description. Collapses the
/// texture/buffer/dynamic-wrapper split while keeping each variant's fields
/// concrete (spec §3's "Resource (abstract)").
#[derive(Debug, Clone)]
pub enum ResourceKind {
    Texture(TextureDesc),
    Buffer(BufferDesc),
    /// Forwards all calls to a swappable inner resource; `inner_id` tracks
    /// whichever resource it currently wraps (its own id may therefore
    /// change to the inner's id across frames).
    Dynamic { inner_id: u64 },
}

/// A registered resource: globally unique id, display name, dimensions,
/// optional backing storage presence, and (for non-dynamic resources) a
/// symbolic state tracker.
///
/// The tracker "exists only when materialized for non-textures, always
/// present otherwise" per spec §3 — modeled here as `tracker: Option<..>`
/// that the materializer populates.
pub struct Resource {
    pub id: u64,
    pub name: String,
    pub kind: ResourceKind,
    pub backing_present: bool,
    tracker: Option<SymbolicTracker>,
}

impl Resource {
    pub fn new_texture(name: impl Into<String>, desc: TextureDesc) -> Self {
        Self {
            id: next_resource_id(),
            name: name.into(),
            kind: ResourceKind::Texture(desc),
            backing_present: false,
            tracker: None,
        }
    }

    pub fn new_buffer(name: impl Into<String>, desc: BufferDesc) -> Self {
        Self {
            id: next_resource_id(),
            name: name.into(),
            kind: ResourceKind::Buffer(desc),
            backing_present: false,
            tracker: None,
        }
    }

    pub fn new_dynamic(name: impl Into<String>, inner_id: u64) -> Self {
        Self {
            id: next_resource_id(),
            name: name.into(),
            kind: ResourceKind::Dynamic { inner_id },
            backing_present: false,
            tracker: None,
        }
    }

    pub fn mip_count(&self) -> u32 {
        match &self.kind {
            ResourceKind::Texture(t) => t.mip_levels,
            ResourceKind::Buffer(_) => 1,
            ResourceKind::Dynamic { .. } => 1,
        }
    }

    pub fn array_size(&self) -> u32 {
        match &self.kind {
            ResourceKind::Texture(t) => t.array_size,
            ResourceKind::Buffer(_) => 1,
            ResourceKind::Dynamic { .. } => 1,
        }
    }

    pub fn allow_alias(&self) -> bool {
        match &self.kind {
            ResourceKind::Texture(t) => t.allow_alias,
            ResourceKind::Buffer(b) => b.allow_alias,
            ResourceKind::Dynamic { .. } => false,
        }
    }

    pub fn dematerialize_after_idle_frames(&self) -> Option<u32> {
        match &self.kind {
            ResourceKind::Texture(t) => t.dematerialize_after_idle_frames,
            _ => None,
        }
    }

    pub fn alias_pool_hint(&self) -> Option<u64> {
        match &self.kind {
            ResourceKind::Texture(t) => t.alias_pool_hint,
            ResourceKind::Buffer(b) => b.alias_pool_hint,
            ResourceKind::Dynamic { .. } => None,
        }
    }

    /// Device-local heap for buffers (texture heaps are always considered
    /// device-local for aliasing purposes); `None` means "not a buffer".
    pub fn is_device_local_buffer(&self) -> bool {
        matches!(
            &self.kind,
            ResourceKind::Buffer(b) if b.heap_type == HeapType::Default
        )
    }

    pub fn size_bytes(&self) -> Option<u64> {
        match &self.kind {
            ResourceKind::Buffer(b) => Some(b.size_bytes),
            _ => None,
        }
    }

    pub fn tracker(&self) -> Option<&SymbolicTracker> {
        self.tracker.as_ref()
    }

    pub fn tracker_mut(&mut self) -> Option<&mut SymbolicTracker> {
        self.tracker.as_mut()
    }

    /// Materialize (or re-materialize) the state tracker, e.g. on first
    /// allocation or after an alias placement change.
    pub fn materialize_tracker(&mut self, initial: ResourceState) {
        self.tracker = Some(SymbolicTracker::new(
            self.mip_count(),
            self.array_size(),
            initial,
        ));
        self.backing_present = true;
    }

    pub fn dematerialize(&mut self) {
        self.tracker = None;
        self.backing_present = false;
    }
}
