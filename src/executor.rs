//! GPU abstraction contract and the per-frame replay loop (spec §6, §4.7).
//!
//! The traits here are narrow on purpose: the scheduler core only ever
//! needs to submit command lists, signal/wait timeline fences, and query
//! allocation info. Concrete backends (see [`crate::backend`]) implement
//! them against a real graphics API.

use crate::batch::{PassBatch, SignalPhase, WaitPhase};
use crate::error::Result;
use crate::immediate::{replay, ClearPayload, CopyBufferRegionPayload, CopyTextureRegionPayload, OpCode};
use crate::pass::{ExecuteContext, ExternalSignal, Pass, RunMask};
use crate::queue::QueueKind;
use crate::state::ResourceTransition;

/// Translate one decoded bytecode op into the matching [`CommandList`] call.
fn dispatch_to_command_list(op: OpCode, payload: &[u8], list: &mut dyn CommandList) -> Result<()> {
    match op {
        OpCode::CopyBufferRegion => {
            let p: CopyBufferRegionPayload = *bytemuck::from_bytes(payload);
            list.copy_buffer_region(p.src_resource_id, p.src_offset, p.dst_resource_id, p.dst_offset, p.size);
        }
        OpCode::CopyTextureRegion | OpCode::CopyTextureToBuffer | OpCode::CopyBufferToTexture => {
            let p: CopyTextureRegionPayload = *bytemuck::from_bytes(payload);
            list.copy_texture_region(p.src_resource_id, p.dst_resource_id, p.dst_mip, p.dst_slice);
        }
        OpCode::ClearRenderTargetView => {
            let p: ClearPayload = *bytemuck::from_bytes(payload);
            list.clear_render_target_view(p.resource_id, p.values);
        }
        OpCode::ClearDepthStencilView => {
            let p: ClearPayload = *bytemuck::from_bytes(payload);
            list.clear_depth_stencil_view(p.resource_id, p.values[0], p.values[1] as u8);
        }
        OpCode::ClearUavFloat => {
            let p: ClearPayload = *bytemuck::from_bytes(payload);
            list.clear_uav_float(p.resource_id, p.values);
        }
        OpCode::ClearUavUint => {
            let p: ClearPayload = *bytemuck::from_bytes(payload);
            list.clear_uav_uint(
                p.resource_id,
                [p.values[0] as u32, p.values[1] as u32, p.values[2] as u32, p.values[3] as u32],
            );
        }
    }
    Ok(())
}

/// Device-level factory operations (spec §6 "Device").
pub trait Device {
    fn create_command_list(&self, queue: QueueKind) -> Box<dyn CommandList>;
    fn query_allocation_info(&self, desc: &AllocationQuery) -> AllocationInfo;
}

#[derive(Debug, Clone)]
pub struct AllocationQuery {
    pub size_bytes: u64,
    pub is_texture: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct AllocationInfo {
    pub size_bytes: u64,
    pub alignment: u64,
}

/// Per-queue command recording surface (spec §6 "CommandList").
pub trait CommandList {
    fn begin(&mut self);
    fn end(&mut self);
    fn barriers(&mut self, transitions: &[ResourceTransition]);
    fn copy_buffer_region(&mut self, src: u64, src_offset: u64, dst: u64, dst_offset: u64, size: u64);
    fn copy_texture_region(&mut self, src: u64, dst: u64, mip: u32, slice: u32);
    fn clear_render_target_view(&mut self, resource_id: u64, color: [f32; 4]);
    fn clear_depth_stencil_view(&mut self, resource_id: u64, depth: f32, stencil: u8);
    fn clear_uav_float(&mut self, resource_id: u64, value: [f32; 4]);
    fn clear_uav_uint(&mut self, resource_id: u64, value: [u32; 4]);
    fn push_constants(&mut self, stage: u32, space: u32, slot: u32, offset: u32, data: &[u8]);
    /// Backend-specific downcast hook: lets a concrete [`crate::backend`]
    /// queue resolve a boxed `CommandList` back to its own type to pull out
    /// whatever post-recording artifact it needs (e.g. a finished command
    /// buffer) ahead of submission.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// A submittable queue with timeline signal/wait (spec §6 "Queue").
pub trait Queue {
    fn submit(&mut self, lists: Vec<Box<dyn CommandList>>);
    fn signal(&mut self, timeline: &dyn Timeline, value: u64);
    fn wait(&mut self, timeline: &dyn Timeline, value: u64);
}

/// A monotonic fence (spec §6 "Timeline").
pub trait Timeline {
    fn completed_value(&self) -> u64;
}

/// Resource/memory creation surface (spec §6 "Allocator").
pub trait Allocator {
    fn create_resource(&mut self, desc: &AllocationQuery) -> u64;
    fn create_aliasing_resource(&mut self, backing_alloc: u64, offset: u64, desc: &AllocationQuery) -> u64;
    fn build_stats_string(&self) -> String;
}

/// Dispatches a queued pass's immediate bytecode and/or retained body
/// against an open command list.
pub struct PassExecutor<'a> {
    pub device: &'a dyn Device,
}

struct CommandListExecuteContext<'a> {
    list: &'a mut dyn CommandList,
}

impl<'a> ExecuteContext for CommandListExecuteContext<'a> {
    fn command_list(&mut self) -> &mut dyn CommandList {
        self.list
    }
}

impl<'a> PassExecutor<'a> {
    /// Run one queued pass: replay immediate bytecode if its run mask
    /// includes `Immediate`, then invoke the retained body if it includes
    /// `Retained`. Returns any externally signaled fences the pass wants
    /// registered as queue signals.
    #[tracing::instrument(level = "trace", skip_all, fields(pass = pass.name()))]
    pub fn execute_pass(
        &self,
        pass: &dyn Pass,
        bytecode: &[u8],
        list: &mut dyn CommandList,
    ) -> Result<Vec<ExternalSignal>> {
        if pass.run_mask().includes_immediate() {
            replay(bytecode, |op, payload| dispatch_to_command_list(op, payload, &mut *list))?;
        }
        let mut signals = Vec::new();
        if pass.run_mask().includes_retained() {
            let mut ctx = CommandListExecuteContext { list };
            signals = pass.execute(&mut ctx);
        }
        Ok(signals)
    }
}

/// The frame-scoped context the replay loop needs beyond the batch list
/// itself: the device that mints command lists, a submittable `Queue` and
/// its `Timeline` per queue kind in use this frame, and the per-frame fence
/// offset added to each batch's preassigned values.
pub struct FrameExecutionContext<'a> {
    pub device: &'a dyn Device,
    pub queues: std::collections::HashMap<QueueKind, &'a mut dyn Queue>,
    pub timelines: std::collections::HashMap<QueueKind, &'a dyn Timeline>,
    pub fence_offset: u64,
}

/// Replays one frame's batch list in the subphase order spec §4.7 defines:
/// for each batch, copy first, then compute, then graphics; within a
/// queue, pre-transitions, waits, signal-after-transitions, passes,
/// post-transitions, signal-after-completion — each subphase skipped when
/// empty.
#[tracing::instrument(level = "debug", skip_all)]
pub fn replay_frame<'a>(
    batches: &[PassBatch],
    pass_bytecode: &std::collections::HashMap<usize, Vec<u8>>,
    passes: &std::collections::HashMap<usize, &dyn Pass>,
    ctx: &mut FrameExecutionContext<'a>,
) -> Result<()> {
    const QUEUE_ORDER: [QueueKind; 3] = [QueueKind::Copy, QueueKind::Compute, QueueKind::Graphics];

    for (batch_index, batch) in batches.iter().enumerate() {
        for &queue in &QUEUE_ORDER {
            run_queue_subphases(batch, batch_index, queue, pass_bytecode, passes, ctx)?;
        }
    }
    Ok(())
}

fn run_queue_subphases<'a>(
    batch: &PassBatch,
    batch_index: usize,
    queue: QueueKind,
    pass_bytecode: &std::collections::HashMap<usize, Vec<u8>>,
    passes: &std::collections::HashMap<usize, &dyn Pass>,
    ctx: &mut FrameExecutionContext<'a>,
) -> Result<()> {
    if !ctx.queues.contains_key(&queue) {
        return Ok(());
    }

    let mut list = ctx.device.create_command_list(queue);
    list.begin();

    if let Some(transitions) = batch
        .transitions
        .get(&(crate::batch::TransitionPhase::BeforePasses, queue))
    {
        if !transitions.is_empty() {
            list.barriers(transitions);
        }
    }

    for (phase, dst) in [
        (WaitPhase::BeforeTransitions, queue),
        (WaitPhase::BeforeExecution, queue),
    ] {
        for &src in &QueueKind::ALL {
            if batch
                .queue_wait_enabled
                .get(&(phase, dst, src))
                .copied()
                .unwrap_or(false)
            {
                if let Some(&fence) = batch.queue_wait_fence_value.get(&(phase, dst, src)) {
                    if let (Some(queue_ref), Some(&timeline)) = (ctx.queues.get_mut(&dst), ctx.timelines.get(&src)) {
                        let value = fence + ctx.fence_offset;
                        tracing::trace!(?phase, ?dst, ?src, value, "wait");
                        queue_ref.wait(timeline, value);
                    }
                }
            }
        }
    }

    if batch
        .queue_signal_enabled
        .get(&(SignalPhase::AfterTransitions, queue))
        .copied()
        .unwrap_or(false)
    {
        let fence = batch
            .queue_signal_fence_value
            .get(&(SignalPhase::AfterTransitions, queue))
            .copied()
            .unwrap_or(0);
        if let (Some(queue_ref), Some(&timeline)) = (ctx.queues.get_mut(&queue), ctx.timelines.get(&queue)) {
            let value = fence + ctx.fence_offset;
            tracing::trace!(batch_index, ?queue, value, "signal AfterTransitions");
            queue_ref.signal(timeline, value);
        }
    }

    if let Some(pass_indices) = batch.passes.get(&queue) {
        for &pass_index in pass_indices {
            let Some(&pass) = passes.get(&pass_index) else {
                continue;
            };
            let empty = Vec::new();
            let bytecode = pass_bytecode.get(&pass_index).unwrap_or(&empty);
            let executor = PassExecutor { device: ctx.device };
            let _signals = executor.execute_pass(pass, bytecode, &mut *list)?;
        }
    }

    if let Some(transitions) = batch
        .transitions
        .get(&(crate::batch::TransitionPhase::AfterPasses, queue))
    {
        if !transitions.is_empty() {
            list.barriers(transitions);
        }
    }

    list.end();
    if let Some(queue_ref) = ctx.queues.get_mut(&queue) {
        queue_ref.submit(vec![list]);
    }

    if batch
        .queue_signal_enabled
        .get(&(SignalPhase::AfterCompletion, queue))
        .copied()
        .unwrap_or(false)
    {
        let fence = batch
            .queue_signal_fence_value
            .get(&(SignalPhase::AfterCompletion, queue))
            .copied()
            .unwrap_or(0);
        if let (Some(queue_ref), Some(&timeline)) = (ctx.queues.get_mut(&queue), ctx.timelines.get(&queue)) {
            let value = fence + ctx.fence_offset;
            tracing::trace!(batch_index, ?queue, value, "signal AfterCompletion");
            queue_ref.signal(timeline, value);
        }
    }

    Ok(())
}

/// Placeholder device used where the replay loop needs a `&dyn Device`
/// only to satisfy `PassExecutor`'s shape; the loop itself never calls
/// allocation-info queries mid-replay.
struct NullDevice;
impl Device for NullDevice {
    fn create_command_list(&self, _queue: QueueKind) -> Box<dyn CommandList> {
        unimplemented!("NullDevice never creates command lists")
    }
    fn query_allocation_info(&self, desc: &AllocationQuery) -> AllocationInfo {
        AllocationInfo {
            size_bytes: desc.size_bytes,
            alignment: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::immediate::ImmediateRecorder;

    struct RecordingList {
        cleared: Vec<u64>,
        barrier_count: usize,
    }

    impl CommandList for RecordingList {
        fn begin(&mut self) {}
        fn end(&mut self) {}
        fn barriers(&mut self, transitions: &[ResourceTransition]) {
            self.barrier_count += transitions.len();
        }
        fn copy_buffer_region(&mut self, _: u64, _: u64, _: u64, _: u64, _: u64) {}
        fn copy_texture_region(&mut self, _: u64, _: u64, _: u32, _: u32) {}
        fn clear_render_target_view(&mut self, resource_id: u64, _: [f32; 4]) {
            self.cleared.push(resource_id);
        }
        fn clear_depth_stencil_view(&mut self, _: u64, _: f32, _: u8) {}
        fn clear_uav_float(&mut self, _: u64, _: [f32; 4]) {}
        fn clear_uav_uint(&mut self, _: u64, _: [u32; 4]) {}
        fn push_constants(&mut self, _: u32, _: u32, _: u32, _: u32, _: &[u8]) {}
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    struct NullPass;
    impl Pass for NullPass {
        fn name(&self) -> &str {
            "null"
        }
        fn declared_identifiers(&self) -> &crate::identifier::ResourceGroup {
            static EMPTY: std::sync::OnceLock<crate::identifier::ResourceGroup> =
                std::sync::OnceLock::new();
            EMPTY.get_or_init(crate::identifier::ResourceGroup::new)
        }
        fn requirements(&self) -> &[crate::pass::ResourceRequirement] {
            &[]
        }
        fn run_mask(&self) -> RunMask {
            RunMask::Immediate
        }
    }

    #[test]
    fn immediate_bytecode_replays_against_the_command_list() {
        let mut recorder = ImmediateRecorder::new();
        recorder
            .clear_render_target_view(42, crate::range::SubresourceRange::full(1, 1), (1, 1), [0.0; 4])
            .unwrap();
        let (bytecode, _requirements) = recorder.finalize();

        let mut list = RecordingList {
            cleared: Vec::new(),
            barrier_count: 0,
        };
        let pass = NullPass;
        let executor = PassExecutor { device: &NullDevice };
        executor.execute_pass(&pass, &bytecode, &mut list).unwrap();
        assert_eq!(list.cleared, vec![42]);
    }
}
