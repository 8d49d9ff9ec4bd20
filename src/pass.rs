//! Pass declaration model (spec §4.3) and pass authoring surface (spec §6).

use crate::identifier::ResourceGroup;
use crate::immediate::ImmediateRecorder;
use crate::queue::QueueKind;
use crate::range::RangeSpec;
use crate::state::ResourceState;

/// Which phase(s) of the frame a pass participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMask {
    None,
    Immediate,
    Retained,
    Both,
}

impl RunMask {
    pub fn includes_immediate(self) -> bool {
        matches!(self, RunMask::Immediate | RunMask::Both)
    }
    pub fn includes_retained(self) -> bool {
        matches!(self, RunMask::Retained | RunMask::Both)
    }
}

/// `{handle, range, desired state}` — one declared access by a pass.
#[derive(Debug, Clone)]
pub struct ResourceRequirement {
    pub resource_id: u64,
    pub range: RangeSpec,
    pub state: ResourceState,
}

impl ResourceRequirement {
    pub fn new(resource_id: u64, range: RangeSpec, state: ResourceState) -> Self {
        Self {
            resource_id,
            range,
            state,
        }
    }
}

/// A post-pass exit transition: advances the compile tracker without
/// emitting a batch-level barrier (the pass itself handles it internally).
#[derive(Debug, Clone)]
pub struct InternalTransition {
    pub resource_id: u64,
    pub exit_state: ResourceState,
}

/// Execution context handed to a retained pass body. Narrow on purpose —
/// the concrete command-recording surface lives behind
/// [`crate::executor::CommandList`] (spec §6, "external GPU abstraction").
pub trait ExecuteContext {
    fn command_list(&mut self) -> &mut dyn crate::executor::CommandList;
}

/// A fence an [`Pass::execute`] body signals externally (e.g. a readback
/// completion fence) and wants the executor to register as a queue signal
/// after the pass.
#[derive(Debug, Clone, Copy)]
pub struct ExternalSignal {
    pub queue: QueueKind,
    pub value: u64,
}

/// User-authored unit of GPU work. Declares its resource usage statically
/// (for retained work) and may additionally record immediate-mode bytecode
/// at compile time.
pub trait Pass: Send + Sync {
    fn name(&self) -> &str;

    /// Namespace allow-list this pass may resolve identifiers from.
    fn declared_identifiers(&self) -> &ResourceGroup;

    fn requirements(&self) -> &[ResourceRequirement];

    fn internal_transitions(&self) -> &[InternalTransition] {
        &[]
    }

    fn queue(&self) -> QueueKind {
        QueueKind::Graphics
    }

    /// Used for statistics only (spec §4.7, "geometry pipeline queries").
    fn is_geometry_pass(&self) -> bool {
        false
    }

    fn run_mask(&self) -> RunMask {
        RunMask::Retained
    }

    /// Record simple op bytecode and accumulate touched subresource
    /// rectangles at compile time (spec §4.3). Default: no immediate work.
    fn execute_immediate(&self, _recorder: &mut ImmediateRecorder) {}

    /// Record actual GPU commands at runtime. Returns any externally
    /// signaled fences to be added as queue signals after this pass.
    fn execute(&self, _ctx: &mut dyn ExecuteContext) -> Vec<ExternalSignal> {
        Vec::new()
    }
}

/// Declarative, backend-agnostic builder for [`ResourceRequirement`]s.
/// The fluent `With…` methods the original system exposes (shader
/// resource, render target, depth read/write, constant buffer, UAV, copy
/// source/dest, indirect args) are syntactic convenience over this record
/// (spec §9 "Builder pattern") — callers may also push requirements
/// directly.
#[derive(Debug, Clone, Default)]
pub struct PassDeclBuilder {
    requirements: Vec<ResourceRequirement>,
    internal_transitions: Vec<InternalTransition>,
}

impl PassDeclBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shader_resource(mut self, resource_id: u64, range: RangeSpec) -> Self {
        self.requirements.push(ResourceRequirement::new(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::SHADER_READ,
                crate::state::Layout::ShaderResource,
                crate::state::Sync::NONE,
            ),
        ));
        self
    }

    pub fn with_render_target(mut self, resource_id: u64, range: RangeSpec) -> Self {
        self.requirements.push(ResourceRequirement::new(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::RENDER_TARGET,
                crate::state::Layout::RenderTarget,
                crate::state::Sync::NONE,
            ),
        ));
        self
    }

    pub fn with_depth_write(mut self, resource_id: u64, range: RangeSpec) -> Self {
        self.requirements.push(ResourceRequirement::new(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::DEPTH_WRITE,
                crate::state::Layout::DepthStencil,
                crate::state::Sync::NONE,
            ),
        ));
        self
    }

    pub fn with_uav(mut self, resource_id: u64, range: RangeSpec) -> Self {
        self.requirements.push(ResourceRequirement::new(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::UAV,
                crate::state::Layout::UnorderedAccess,
                crate::state::Sync::NONE,
            ),
        ));
        self
    }

    pub fn with_copy_source(mut self, resource_id: u64, range: RangeSpec) -> Self {
        self.requirements.push(ResourceRequirement::new(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::COPY_SOURCE,
                crate::state::Layout::CopySource,
                crate::state::Sync::NONE,
            ),
        ));
        self
    }

    pub fn with_copy_dest(mut self, resource_id: u64, range: RangeSpec) -> Self {
        self.requirements.push(ResourceRequirement::new(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::COPY_DEST,
                crate::state::Layout::CopyDest,
                crate::state::Sync::NONE,
            ),
        ));
        self
    }

    pub fn with_internal_transition(mut self, resource_id: u64, exit_state: ResourceState) -> Self {
        self.internal_transitions.push(InternalTransition {
            resource_id,
            exit_state,
        });
        self
    }

    pub fn build(self) -> (Vec<ResourceRequirement>, Vec<InternalTransition>) {
        (self.requirements, self.internal_transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_requirements_and_internal_transitions() {
        let (reqs, internals) = PassDeclBuilder::new()
            .with_shader_resource(1, RangeSpec::all())
            .with_render_target(2, RangeSpec::mip(0))
            .with_internal_transition(2, ResourceState::COMMON)
            .build();
        assert_eq!(reqs.len(), 2);
        assert_eq!(internals.len(), 1);
        assert_eq!(internals[0].resource_id, 2);
    }
}
