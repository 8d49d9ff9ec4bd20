//! Error taxonomy for the render graph scheduler (spec §7).

use crate::identifier::ResourceIdentifier;

/// Everything that can go wrong while compiling or executing a frame.
///
/// Compile failures unwind the frame and leave the graph in the
/// "not compiled" state; callers may retry next frame after fixing
/// declarations. Execute failures unwind similarly; already-submitted GPU
/// work is not revoked.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("handle is stale or was never registered")]
    InvalidHandle,

    #[error("unknown resource identifier: {0}")]
    UnknownResourceIdentifier(ResourceIdentifier),

    #[error("access to '{0}' denied: not in the caller's declared identifier allow-list")]
    AccessViolation(ResourceIdentifier),

    #[error("cycle detected in dependency graph")]
    CyclicDependency,

    #[error(
        "conflicting transitions for resource {resource_id} in batch {batch_index} phase {phase:?}"
    )]
    ConflictingTransitions {
        resource_id: u64,
        batch_index: usize,
        phase: crate::batch::TransitionPhase,
    },

    #[error("aliased resource {resource_id} first used as a read; alias activation requires a write-first use")]
    AliasFirstUseIsRead { resource_id: u64 },

    #[error("alias packing failed for pool {pool_id}: required {required_bytes} bytes exceed any feasible placement")]
    AliasPackingFailure { pool_id: u64, required_bytes: u64 },

    #[error("immediate bytecode state conflict on resource {resource_id}: {existing:?} vs {requested:?}")]
    ImmediateStateConflict {
        resource_id: u64,
        existing: crate::state::ResourceState,
        requested: crate::state::ResourceState,
    },

    #[error("resource {resource_id} backing generation changed between compile and execute")]
    BackingGenerationMismatch { resource_id: u64 },

    #[error("missing immediate dispatch thunk for opcode {opcode}")]
    MissingDispatchThunk { opcode: u8 },

    #[error("structural merge: duplicate pass name '{0}'")]
    DuplicatePassName(String),

    #[error("truncated or malformed immediate bytecode stream")]
    MalformedBytecode,

    #[error("unknown immediate bytecode opcode {0}")]
    UnknownOpcode(u8),
}

pub type Result<T> = std::result::Result<T, GraphError>;
