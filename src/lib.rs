//! General-purpose render graph scheduler.
//!
//! Subresource state tracking ([`state`]), per-frame pass merging
//! ([`merger`]), dependency batching ([`graph`], [`batch`]), transient
//! memory aliasing ([`alias`]), and the narrow GPU abstraction the replay
//! loop runs against ([`executor`]) compose into [`compile::FrameGraph`],
//! the crate's entry point.
//!
//! A concrete `wgpu` backend lives behind the `wgpu-backend` feature (see
//! [`backend`]); the scheduler core itself has no graphics API dependency.

pub mod alias;
pub mod batch;
#[cfg(feature = "wgpu-backend")]
pub mod backend;
pub mod compile;
pub mod debug_snapshot;
pub mod error;
pub mod executor;
pub mod graph;
pub mod identifier;
pub mod immediate;
pub mod merger;
pub mod pass;
pub mod queue;
pub mod range;
pub mod registry;
pub mod resource;
pub mod settings;
pub mod state;

pub use compile::{CompiledFrame, FrameGraph};
pub use error::{GraphError, Result};
