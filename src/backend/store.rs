//! Backing storage mapping scheduler resource ids to real `wgpu` objects
//! (spec §6's `Device`/`Allocator` need somewhere to put what they create).
//!
//! Adapted from the teacher's per-type `wgpu`-object registry, keyed
//! directly by the scheduler's `u64` resource id instead of a typed handle.

use std::collections::HashMap;

/// Registry mapping resource ids to actual `wgpu` objects.
pub struct BackingStore {
    buffers: HashMap<u64, wgpu::Buffer>,
    textures: HashMap<u64, wgpu::Texture>,
}

impl BackingStore {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    /// Register a buffer resource. Replaces and drops any existing buffer
    /// under the same id.
    pub fn register_buffer(&mut self, id: u64, buffer: wgpu::Buffer) {
        self.buffers.insert(id, buffer);
    }

    pub fn buffer(&self, id: u64) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id)
    }

    pub fn remove_buffer(&mut self, id: u64) -> Option<wgpu::Buffer> {
        self.buffers.remove(&id)
    }

    /// Register a texture resource. Replaces and drops any existing
    /// texture under the same id.
    pub fn register_texture(&mut self, id: u64, texture: wgpu::Texture) {
        self.textures.insert(id, texture);
    }

    pub fn texture(&self, id: u64) -> Option<&wgpu::Texture> {
        self.textures.get(&id)
    }

    pub fn remove_texture(&mut self, id: u64) -> Option<wgpu::Texture> {
        self.textures.remove(&id)
    }

    pub fn is_buffer(&self, id: u64) -> bool {
        self.buffers.contains_key(&id)
    }

    pub fn is_texture(&self, id: u64) -> bool {
        self.textures.contains_key(&id)
    }

    /// Drop whichever resource is registered under `id`, checking both
    /// maps since the caller may not know which kind it was.
    pub fn remove_by_id(&mut self, id: u64) -> bool {
        self.buffers.remove(&id).is_some() || self.textures.remove(&id).is_some()
    }

    pub fn clear_all(&mut self) {
        self.buffers.clear();
        self.textures.clear();
    }

    pub fn resource_count(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }
}

impl Default for BackingStore {
    fn default() -> Self {
        Self::new()
    }
}
