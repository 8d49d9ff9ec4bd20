//! Concrete backend(s) for the narrow GPU abstraction in
//! [`crate::executor`]. Gated behind the `wgpu-backend` feature so the
//! scheduler core stays usable without pulling in a graphics API.

#[cfg(feature = "wgpu-backend")]
mod store;
#[cfg(feature = "wgpu-backend")]
mod wgpu_device;

#[cfg(feature = "wgpu-backend")]
pub use store::BackingStore;
#[cfg(feature = "wgpu-backend")]
pub use wgpu_device::{BackendError, WgpuAllocator, WgpuBackend, WgpuCommandList, WgpuDevice, WgpuQueue, WgpuTimeline};
