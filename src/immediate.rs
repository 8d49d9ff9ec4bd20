//! Immediate recorder (spec §4.3).
//!
//! Records a compact bytecode stream of simple GPU ops at compile time
//! while accumulating which subresource rectangles each op touched, then
//! compresses the touched rectangles into a minimal [`ResourceRequirement`]
//! list on [`ImmediateRecorder::finalize`].

use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::pass::ResourceRequirement;
use crate::range::SubresourceRange;
use crate::state::ResourceState;

/// Bytecode opcodes. Each is followed by a naturally-aligned POD payload;
/// the reader aligns reads to `align_of::<T>()` for the payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    CopyBufferRegion = 1,
    CopyTextureRegion = 2,
    ClearRenderTargetView = 3,
    ClearDepthStencilView = 4,
    ClearUavFloat = 5,
    ClearUavUint = 6,
    CopyTextureToBuffer = 7,
    CopyBufferToTexture = 8,
}

impl OpCode {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            1 => OpCode::CopyBufferRegion,
            2 => OpCode::CopyTextureRegion,
            3 => OpCode::ClearRenderTargetView,
            4 => OpCode::ClearDepthStencilView,
            5 => OpCode::ClearUavFloat,
            6 => OpCode::ClearUavUint,
            7 => OpCode::CopyTextureToBuffer,
            8 => OpCode::CopyBufferToTexture,
            other => return Err(GraphError::UnknownOpcode(other)),
        })
    }
}

#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CopyBufferRegionPayload {
    pub src_resource_id: u64,
    pub dst_resource_id: u64,
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct CopyTextureRegionPayload {
    pub src_resource_id: u64,
    pub dst_resource_id: u64,
    pub src_mip: u32,
    pub src_slice: u32,
    pub dst_mip: u32,
    pub dst_slice: u32,
}

#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ClearPayload {
    pub resource_id: u64,
    pub mip: u32,
    pub slice: u32,
    pub values: [f32; 4],
}

/// Append an opcode tag and a POD payload to `buf`, padding `buf` up to the
/// payload's natural alignment first.
fn write_op<T: bytemuck::Pod>(buf: &mut Vec<u8>, op: OpCode, payload: &T) {
    buf.push(op as u8);
    let align = std::mem::align_of::<T>();
    while buf.len() % align != 0 {
        buf.push(0);
    }
    buf.extend_from_slice(bytemuck::bytes_of(payload));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SliceInterval {
    start: u32,
    end: u32,
}

impl SliceInterval {
    fn touches_or_overlaps(&self, other: &SliceInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
    fn union(&self, other: &SliceInterval) -> SliceInterval {
        SliceInterval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Per-resource touched-rectangle accumulator. All ops on one resource must
/// share one [`ResourceState`]: conflicting states fail because the
/// recorder cannot insert internal barriers mid-bytecode.
struct AccessAccumulator {
    state: ResourceState,
    total_mips: u32,
    total_slices: u32,
    per_mip: Vec<Vec<SliceInterval>>,
}

impl AccessAccumulator {
    fn new(state: ResourceState, total_mips: u32, total_slices: u32) -> Self {
        Self {
            state,
            total_mips,
            total_slices,
            per_mip: vec![Vec::new(); total_mips.max(1) as usize],
        }
    }

    fn mark(&mut self, range: SubresourceRange) {
        for mip in range.first_mip..range.mip_end() {
            let list = &mut self.per_mip[mip as usize];
            let new = SliceInterval {
                start: range.first_slice,
                end: range.slice_end().saturating_sub(1).max(range.first_slice),
            };
            Self::insert_interval(list, new);
        }
    }

    fn insert_interval(list: &mut Vec<SliceInterval>, new: SliceInterval) {
        let mut merged = new;
        list.retain(|existing| {
            if merged.touches_or_overlaps(existing) {
                merged = merged.union(existing);
                false
            } else {
                true
            }
        });
        list.push(merged);
        list.sort_by_key(|iv| iv.start);
    }
}

/// Records immediate bytecode and tracks touched subresource rectangles per
/// resource for later compression into minimal [`ResourceRequirement`]s.
#[derive(Default)]
pub struct ImmediateRecorder {
    bytecode: Vec<u8>,
    accumulators: HashMap<u64, AccessAccumulator>,
    /// Ephemeral resources kept alive for the bytecode's lifetime.
    keep_alive: Vec<Box<dyn std::any::Any + Send + Sync>>,
}

impl ImmediateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin an ephemeral resource (e.g. a staging buffer) for the frame's
    /// lifetime of the bytecode.
    pub fn keep_alive(&mut self, value: Box<dyn std::any::Any + Send + Sync>) {
        self.keep_alive.push(value);
    }

    fn touch(
        &mut self,
        resource_id: u64,
        range: SubresourceRange,
        state: ResourceState,
        total_mips: u32,
        total_slices: u32,
    ) -> Result<()> {
        let acc = self
            .accumulators
            .entry(resource_id)
            .or_insert_with(|| AccessAccumulator::new(state, total_mips, total_slices));
        if acc.state != state {
            return Err(GraphError::ImmediateStateConflict {
                resource_id,
                existing: acc.state.clone(),
                requested: state,
            });
        }
        acc.mark(range);
        Ok(())
    }

    pub fn copy_buffer_region(
        &mut self,
        src: u64,
        dst: u64,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.touch(
            src,
            SubresourceRange::full(1, 1),
            ResourceState::new(
                crate::state::Access::COPY_SOURCE,
                crate::state::Layout::CopySource,
                crate::state::Sync::NONE,
            ),
            1,
            1,
        )?;
        self.touch(
            dst,
            SubresourceRange::full(1, 1),
            ResourceState::new(
                crate::state::Access::COPY_DEST,
                crate::state::Layout::CopyDest,
                crate::state::Sync::NONE,
            ),
            1,
            1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::CopyBufferRegion,
            &CopyBufferRegionPayload {
                src_resource_id: src,
                dst_resource_id: dst,
                src_offset,
                dst_offset,
                size,
            },
        );
        Ok(())
    }

    pub fn copy_texture_region(
        &mut self,
        src: u64,
        src_range: SubresourceRange,
        src_total: (u32, u32),
        dst: u64,
        dst_range: SubresourceRange,
        dst_total: (u32, u32),
    ) -> Result<()> {
        self.touch(
            src,
            src_range,
            ResourceState::new(
                crate::state::Access::COPY_SOURCE,
                crate::state::Layout::CopySource,
                crate::state::Sync::NONE,
            ),
            src_total.0,
            src_total.1,
        )?;
        self.touch(
            dst,
            dst_range,
            ResourceState::new(
                crate::state::Access::COPY_DEST,
                crate::state::Layout::CopyDest,
                crate::state::Sync::NONE,
            ),
            dst_total.0,
            dst_total.1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::CopyTextureRegion,
            &CopyTextureRegionPayload {
                src_resource_id: src,
                dst_resource_id: dst,
                src_mip: src_range.first_mip,
                src_slice: src_range.first_slice,
                dst_mip: dst_range.first_mip,
                dst_slice: dst_range.first_slice,
            },
        );
        Ok(())
    }

    pub fn clear_render_target_view(
        &mut self,
        resource_id: u64,
        range: SubresourceRange,
        total: (u32, u32),
        color: [f32; 4],
    ) -> Result<()> {
        self.touch(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::RENDER_TARGET,
                crate::state::Layout::RenderTarget,
                crate::state::Sync::NONE,
            ),
            total.0,
            total.1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::ClearRenderTargetView,
            &ClearPayload {
                resource_id,
                mip: range.first_mip,
                slice: range.first_slice,
                values: color,
            },
        );
        Ok(())
    }

    pub fn clear_uav_float(
        &mut self,
        resource_id: u64,
        range: SubresourceRange,
        total: (u32, u32),
        values: [f32; 4],
    ) -> Result<()> {
        self.touch(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::UAV,
                crate::state::Layout::UnorderedAccess,
                crate::state::Sync::NONE,
            ),
            total.0,
            total.1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::ClearUavFloat,
            &ClearPayload {
                resource_id,
                mip: range.first_mip,
                slice: range.first_slice,
                values,
            },
        );
        Ok(())
    }

    pub fn clear_depth_stencil_view(
        &mut self,
        resource_id: u64,
        range: SubresourceRange,
        total: (u32, u32),
        depth: f32,
        stencil: u8,
    ) -> Result<()> {
        self.touch(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::DEPTH_WRITE,
                crate::state::Layout::DepthStencil,
                crate::state::Sync::NONE,
            ),
            total.0,
            total.1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::ClearDepthStencilView,
            &ClearPayload {
                resource_id,
                mip: range.first_mip,
                slice: range.first_slice,
                values: [depth, stencil as f32, 0.0, 0.0],
            },
        );
        Ok(())
    }

    pub fn clear_uav_uint(
        &mut self,
        resource_id: u64,
        range: SubresourceRange,
        total: (u32, u32),
        values: [u32; 4],
    ) -> Result<()> {
        self.touch(
            resource_id,
            range,
            ResourceState::new(
                crate::state::Access::UAV,
                crate::state::Layout::UnorderedAccess,
                crate::state::Sync::NONE,
            ),
            total.0,
            total.1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::ClearUavUint,
            &ClearPayload {
                resource_id,
                mip: range.first_mip,
                slice: range.first_slice,
                values: [values[0] as f32, values[1] as f32, values[2] as f32, values[3] as f32],
            },
        );
        Ok(())
    }

    /// Texture-to-buffer copy (e.g. a readback staging copy). The
    /// destination buffer has no mip/slice structure, so the payload's
    /// `dst_mip`/`dst_slice` are left at zero.
    pub fn copy_texture_to_buffer(
        &mut self,
        src: u64,
        src_range: SubresourceRange,
        src_total: (u32, u32),
        dst: u64,
    ) -> Result<()> {
        self.touch(
            src,
            src_range,
            ResourceState::new(
                crate::state::Access::COPY_SOURCE,
                crate::state::Layout::CopySource,
                crate::state::Sync::NONE,
            ),
            src_total.0,
            src_total.1,
        )?;
        self.touch(
            dst,
            SubresourceRange::full(1, 1),
            ResourceState::new(
                crate::state::Access::COPY_DEST,
                crate::state::Layout::CopyDest,
                crate::state::Sync::NONE,
            ),
            1,
            1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::CopyTextureToBuffer,
            &CopyTextureRegionPayload {
                src_resource_id: src,
                dst_resource_id: dst,
                src_mip: src_range.first_mip,
                src_slice: src_range.first_slice,
                dst_mip: 0,
                dst_slice: 0,
            },
        );
        Ok(())
    }

    /// Buffer-to-texture copy (e.g. an upload from a staging buffer). The
    /// source buffer has no mip/slice structure, so the payload's
    /// `src_mip`/`src_slice` are left at zero.
    pub fn copy_buffer_to_texture(
        &mut self,
        src: u64,
        dst: u64,
        dst_range: SubresourceRange,
        dst_total: (u32, u32),
    ) -> Result<()> {
        self.touch(
            src,
            SubresourceRange::full(1, 1),
            ResourceState::new(
                crate::state::Access::COPY_SOURCE,
                crate::state::Layout::CopySource,
                crate::state::Sync::NONE,
            ),
            1,
            1,
        )?;
        self.touch(
            dst,
            dst_range,
            ResourceState::new(
                crate::state::Access::COPY_DEST,
                crate::state::Layout::CopyDest,
                crate::state::Sync::NONE,
            ),
            dst_total.0,
            dst_total.1,
        )?;
        write_op(
            &mut self.bytecode,
            OpCode::CopyBufferToTexture,
            &CopyTextureRegionPayload {
                src_resource_id: src,
                dst_resource_id: dst,
                src_mip: 0,
                src_slice: 0,
                dst_mip: dst_range.first_mip,
                dst_slice: dst_range.first_slice,
            },
        );
        Ok(())
    }

    /// Compress accumulated touched rectangles into minimal requirements and
    /// hand back `(bytecode, requirements)`.
    pub fn finalize(self) -> (Vec<u8>, Vec<ResourceRequirement>) {
        let mut requirements = Vec::new();
        for (resource_id, acc) in self.accumulators {
            for rect in compress_rectangles(&acc.per_mip) {
                requirements.push(ResourceRequirement::new(
                    resource_id,
                    crate::range::RangeSpec {
                        mip_lower: crate::range::Bound::Exact(rect.first_mip),
                        mip_upper: crate::range::Bound::Exact(rect.mip_end().saturating_sub(1)),
                        slice_lower: crate::range::Bound::Exact(rect.first_slice),
                        slice_upper: crate::range::Bound::Exact(rect.slice_end().saturating_sub(1)),
                    },
                    acc.state.clone(),
                ));
            }
        }
        (self.bytecode, requirements)
    }

    pub fn bytecode_len(&self) -> usize {
        self.bytecode.len()
    }
}

/// Extend identical per-mip slice-interval sets across consecutive mips
/// into open rectangles, closing them when the next mip's interval set
/// differs, then iteratively merge the resulting rectangles along either
/// axis until no more merges apply.
fn compress_rectangles(per_mip: &[Vec<SliceInterval>]) -> Vec<SubresourceRange> {
    let mut rects = Vec::new();
    let mut group_start: Option<(u32, Vec<SliceInterval>)> = None;

    for (mip, intervals) in per_mip.iter().enumerate() {
        let mip = mip as u32;
        match &group_start {
            Some((_, current)) if current == intervals => {}
            _ => {
                if let Some((start_mip, prev_intervals)) = group_start.take() {
                    close_group(&mut rects, start_mip, mip, &prev_intervals);
                }
                if !intervals.is_empty() {
                    group_start = Some((mip, intervals.clone()));
                }
            }
        }
    }
    if let Some((start_mip, prev_intervals)) = group_start {
        close_group(&mut rects, start_mip, per_mip.len() as u32, &prev_intervals);
    }

    loop {
        let mut changed = false;
        'outer: for i in 0..rects.len() {
            for j in (i + 1)..rects.len() {
                if let Some(merged) = rects[i].try_merge(&rects[j]) {
                    rects[i] = merged;
                    rects.remove(j);
                    changed = true;
                    break 'outer;
                }
            }
        }
        if !changed {
            break;
        }
    }
    rects
}

fn close_group(
    rects: &mut Vec<SubresourceRange>,
    start_mip: u32,
    end_mip: u32,
    intervals: &[SliceInterval],
) {
    for iv in intervals {
        rects.push(SubresourceRange {
            first_mip: start_mip,
            mip_count: end_mip - start_mip,
            first_slice: iv.start,
            slice_count: iv.end - iv.start + 1,
        });
    }
}

/// Replay a bytecode stream, dispatching each op through `dispatch`.
/// Returns [`GraphError::MissingDispatchThunk`] if `dispatch` reports an
/// opcode it cannot handle.
pub fn replay(bytes: &[u8], mut dispatch: impl FnMut(OpCode, &[u8]) -> Result<()>) -> Result<()> {
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        let op_byte = bytes[cursor];
        let op = OpCode::from_u8(op_byte)?;
        let payload_start = cursor + 1;
        let (size, align) = match op {
            OpCode::CopyBufferRegion => (
                std::mem::size_of::<CopyBufferRegionPayload>(),
                std::mem::align_of::<CopyBufferRegionPayload>(),
            ),
            OpCode::CopyTextureRegion
            | OpCode::CopyTextureToBuffer
            | OpCode::CopyBufferToTexture => (
                std::mem::size_of::<CopyTextureRegionPayload>(),
                std::mem::align_of::<CopyTextureRegionPayload>(),
            ),
            OpCode::ClearRenderTargetView
            | OpCode::ClearDepthStencilView
            | OpCode::ClearUavFloat
            | OpCode::ClearUavUint => (
                std::mem::size_of::<ClearPayload>(),
                std::mem::align_of::<ClearPayload>(),
            ),
        };
        let mut aligned_start = payload_start;
        while aligned_start % align != 0 {
            aligned_start += 1;
        }
        let end = aligned_start
            .checked_add(size)
            .ok_or(GraphError::MalformedBytecode)?;
        let payload = bytes.get(aligned_start..end).ok_or(GraphError::MalformedBytecode)?;
        dispatch(op, payload)?;
        cursor = end;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_states_on_same_resource_fail() {
        let mut rec = ImmediateRecorder::new();
        rec.clear_render_target_view(1, SubresourceRange::full(1, 1), (1, 1), [0.0; 4])
            .unwrap();
        let err = rec.clear_uav_float(1, SubresourceRange::full(1, 1), (1, 1), [0.0; 4]);
        assert!(matches!(
            err,
            Err(GraphError::ImmediateStateConflict { .. })
        ));
    }

    #[test]
    fn finalize_merges_full_coverage_into_one_requirement() {
        let mut rec = ImmediateRecorder::new();
        rec.clear_render_target_view(
            1,
            SubresourceRange {
                first_mip: 0,
                mip_count: 1,
                first_slice: 0,
                slice_count: 1,
            },
            (1, 2),
            [1.0; 4],
        )
        .unwrap();
        rec.clear_render_target_view(
            1,
            SubresourceRange {
                first_mip: 0,
                mip_count: 1,
                first_slice: 1,
                slice_count: 1,
            },
            (1, 2),
            [1.0; 4],
        )
        .unwrap();
        let (_, reqs) = rec.finalize();
        assert_eq!(reqs.len(), 1);
    }

    #[test]
    fn bytecode_roundtrips_through_replay() {
        let mut rec = ImmediateRecorder::new();
        rec.copy_buffer_region(1, 2, 0, 16, 64).unwrap();
        let (bytes, _) = rec.finalize();
        let mut seen = 0;
        replay(&bytes, |op, payload| {
            assert_eq!(op, OpCode::CopyBufferRegion);
            let p: CopyBufferRegionPayload = *bytemuck::from_bytes(payload);
            assert_eq!(p.size, 64);
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 1);
    }

    #[test]
    fn replay_rejects_unknown_opcode() {
        let bytes = vec![200u8];
        let err = replay(&bytes, |_, _| Ok(()));
        assert!(matches!(err, Err(GraphError::UnknownOpcode(200))));
    }
}
