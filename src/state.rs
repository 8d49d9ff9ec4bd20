//! Subresource state tracker (spec §4.1).
//!
//! A `SymbolicTracker` owns a tiling of one resource's `(mip, slice)`
//! rectangle by `Segment`s carrying a `ResourceState`. `Apply` produces the
//! minimal set of transitions needed to bring a rectangle to a new state and
//! leaves the tracker's tiling consistent; `WouldModify` answers the same
//! question without mutating.

use bitflags::bitflags;

use crate::range::SubresourceRange;

bitflags! {
    /// GPU access bits. Equality of `ResourceState` ignores `sync` (state
    /// identity is access+layout; sync is recomputed per consumer queue).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        const NONE          = 0;
        const READ          = 1 << 0;
        const WRITE         = 1 << 1;
        const COPY_SOURCE   = 1 << 2;
        const COPY_DEST     = 1 << 3;
        const RENDER_TARGET = 1 << 4;
        const DEPTH_READ    = 1 << 5;
        const DEPTH_WRITE   = 1 << 6;
        const SHADER_READ   = 1 << 7;
        const UAV           = 1 << 8;
        const INDIRECT_ARGS = 1 << 9;
        const CONSTANT      = 1 << 10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sync: u32 {
        const NONE     = 0;
        const GRAPHICS = 1 << 0;
        const COMPUTE  = 1 << 1;
        const COPY     = 1 << 2;
        const ALL      = Self::GRAPHICS.bits() | Self::COMPUTE.bits() | Self::COPY.bits();
    }
}

/// A resource layout, mirroring the narrow set a GPU barrier cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    #[default]
    Common,
    RenderTarget,
    DepthStencil,
    ShaderResource,
    UnorderedAccess,
    CopySource,
    CopyDest,
    Present,
    /// Contents are unspecified; required before a discard-style alias
    /// activation transition (spec §4.6 "Alias activation barrier").
    Undefined,
}

/// `{access, layout, sync}` triple. Equality ignores `sync`.
#[derive(Debug, Clone, Copy)]
pub struct ResourceState {
    pub access: Access,
    pub layout: Layout,
    pub sync: Sync,
}

impl ResourceState {
    pub const COMMON: ResourceState = ResourceState {
        access: Access::NONE,
        layout: Layout::Common,
        sync: Sync::NONE,
    };

    pub fn new(access: Access, layout: Layout, sync: Sync) -> Self {
        Self {
            access,
            layout,
            sync,
        }
    }

    /// Alias-activation target: contents undefined, no access, no sync.
    pub fn undefined() -> Self {
        Self {
            access: Access::NONE,
            layout: Layout::Undefined,
            sync: Sync::NONE,
        }
    }

    pub fn is_uav(&self) -> bool {
        self.access.contains(Access::UAV)
    }

    pub fn is_write(&self) -> bool {
        self.access.intersects(
            Access::WRITE
                | Access::RENDER_TARGET
                | Access::DEPTH_WRITE
                | Access::UAV
                | Access::COPY_DEST,
        )
    }
}

impl PartialEq for ResourceState {
    fn eq(&self, other: &Self) -> bool {
        self.access == other.access && self.layout == other.layout
    }
}
impl Eq for ResourceState {}

/// A barrier-worthy change from one state to another over a specific
/// subresource range, optionally with `discard` for alias activation.
#[derive(Debug, Clone)]
pub struct ResourceTransition {
    pub resource_id: u64,
    pub range: SubresourceRange,
    pub prev_access: Access,
    pub new_access: Access,
    pub prev_layout: Layout,
    pub new_layout: Layout,
    pub prev_sync: Sync,
    pub new_sync: Sync,
    pub discard: bool,
}

/// A `RangeSpec`-resolved rectangle plus the state it currently holds.
#[derive(Debug, Clone)]
pub struct Segment {
    pub range: SubresourceRange,
    pub state: ResourceState,
}

/// Per-resource symbolic map from subresource rectangles to states. The
/// segment list always exactly tiles the full `(total_mips, total_slices)`
/// rectangle; segments never overlap after `apply`.
#[derive(Debug, Clone)]
pub struct SymbolicTracker {
    total_mips: u32,
    total_slices: u32,
    segments: Vec<Segment>,
}

impl SymbolicTracker {
    /// A fresh tracker, tiled by a single `Common` segment (spec §8:
    /// "starting from full-range Common/Common/All").
    pub fn new(total_mips: u32, total_slices: u32, initial: ResourceState) -> Self {
        let full = SubresourceRange::full(total_mips, total_slices);
        Self {
            total_mips,
            total_slices,
            segments: if full.is_empty() {
                Vec::new()
            } else {
                vec![Segment {
                    range: full,
                    state: initial,
                }]
            },
        }
    }

    pub fn total_mips(&self) -> u32 {
        self.total_mips
    }

    pub fn total_slices(&self) -> u32 {
        self.total_slices
    }

    /// True iff any segment overlapping `want` differs in state from
    /// `new_state`.
    pub fn would_modify(&self, want: SubresourceRange, new_state: &ResourceState) -> bool {
        self.segments
            .iter()
            .any(|seg| seg.range.overlaps(&want) && seg.state != *new_state)
    }

    /// Bring `want` to `new_state`, emitting the minimal set of transitions
    /// and leaving the tiling consistent. Returns the resource id tagged on
    /// each emitted transition as `resource_id`.
    pub fn apply(
        &mut self,
        resource_id: u64,
        want: SubresourceRange,
        new_state: ResourceState,
        out_transitions: &mut Vec<ResourceTransition>,
    ) {
        if want.is_empty() {
            return;
        }

        let mut next_segments = Vec::with_capacity(self.segments.len() + 4);

        for seg in self.segments.drain(..) {
            let inter = seg.range.intersect(&want);
            if inter.is_empty() {
                next_segments.push(seg);
                continue;
            }

            if seg.state != new_state {
                out_transitions.push(ResourceTransition {
                    resource_id,
                    range: inter,
                    prev_access: seg.state.access,
                    new_access: new_state.access,
                    prev_layout: seg.state.layout,
                    new_layout: new_state.layout,
                    prev_sync: seg.state.sync,
                    new_sync: new_state.sync,
                    discard: false,
                });
            }

            for remainder in seg.range.subtract(&inter) {
                next_segments.push(Segment {
                    range: remainder,
                    state: seg.state.clone(),
                });
            }
        }

        next_segments.push(Segment {
            range: want,
            state: new_state,
        });

        self.segments = Self::merge_sweep(next_segments);
    }

    /// Sort segments in `(slice_lower, slice_upper, mip_lower, mip_upper)`
    /// order and repeatedly merge adjacent-or-overlapping same-state
    /// segments until no more merges apply.
    fn merge_sweep(mut segments: Vec<Segment>) -> Vec<Segment> {
        segments.retain(|s| !s.range.is_empty());
        loop {
            segments.sort_by_key(|s| s.range.sort_key());
            let mut merged = Vec::with_capacity(segments.len());
            let mut changed = false;
            let mut iter = segments.into_iter();
            if let Some(first) = iter.next() {
                merged.push(first);
                for seg in iter {
                    let last = merged.last().unwrap();
                    if last.state == seg.state {
                        if let Some(union) = last.range.try_merge(&seg.range) {
                            let last_mut = merged.last_mut().unwrap();
                            last_mut.range = union;
                            changed = true;
                            continue;
                        }
                    }
                    merged.push(seg);
                }
            }
            segments = merged;
            if !changed {
                return segments;
            }
        }
    }

    /// The current segment list, optionally omitting segments matching
    /// `skip_state` (per `include_skip`).
    pub fn flatten(&self, skip_state: Option<&ResourceState>, include_skip: bool) -> Vec<Segment> {
        self.segments
            .iter()
            .filter(|seg| match skip_state {
                Some(skip) => include_skip || seg.state != *skip,
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srv() -> ResourceState {
        ResourceState::new(Access::SHADER_READ, Layout::ShaderResource, Sync::GRAPHICS)
    }
    fn rtv() -> ResourceState {
        ResourceState::new(
            Access::RENDER_TARGET,
            Layout::RenderTarget,
            Sync::GRAPHICS,
        )
    }

    #[test]
    fn tiling_law_full_cover_no_overlap() {
        let mut t = SymbolicTracker::new(4, 2, ResourceState::COMMON);
        let mut out = Vec::new();
        t.apply(
            1,
            SubresourceRange {
                first_mip: 0,
                mip_count: 1,
                first_slice: 0,
                slice_count: 1,
            },
            rtv(),
            &mut out,
        );
        t.apply(
            1,
            SubresourceRange {
                first_mip: 1,
                mip_count: 3,
                first_slice: 0,
                slice_count: 2,
            },
            srv(),
            &mut out,
        );

        let segs = t.flatten(None, true);
        let mut covered = 0u32;
        for a in &segs {
            covered += a.range.mip_count * a.range.slice_count;
            for b in &segs {
                if std::ptr::eq(a, b) {
                    continue;
                }
                assert!(!a.range.overlaps(&b.range), "segments must not overlap");
            }
        }
        assert_eq!(covered, 4 * 2);
    }

    #[test]
    fn transition_minimality_no_op_emits_nothing() {
        let mut t = SymbolicTracker::new(4, 1, srv());
        let mut out = Vec::new();
        t.apply(1, SubresourceRange::full(4, 1), srv(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn idempotence_second_apply_emits_nothing() {
        let mut t = SymbolicTracker::new(4, 1, ResourceState::COMMON);
        let mut out = Vec::new();
        t.apply(1, SubresourceRange::full(4, 1), rtv(), &mut out);
        assert_eq!(out.len(), 1);
        out.clear();
        t.apply(1, SubresourceRange::full(4, 1), rtv(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn would_modify_reflects_pending_transition() {
        let t = SymbolicTracker::new(4, 1, ResourceState::COMMON);
        assert!(t.would_modify(SubresourceRange::full(4, 1), &rtv()));
        assert!(!t.would_modify(SubresourceRange::full(4, 1), &ResourceState::COMMON));
    }

    #[test]
    fn merge_law_adjacent_applies_collapse_to_single_segment() {
        let mut t = SymbolicTracker::new(1, 4, ResourceState::COMMON);
        let mut out = Vec::new();
        t.apply(
            1,
            SubresourceRange {
                first_mip: 0,
                mip_count: 1,
                first_slice: 0,
                slice_count: 2,
            },
            rtv(),
            &mut out,
        );
        t.apply(
            1,
            SubresourceRange {
                first_mip: 0,
                mip_count: 1,
                first_slice: 2,
                slice_count: 2,
            },
            rtv(),
            &mut out,
        );
        let segs = t.flatten(None, true);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].range, SubresourceRange::full(1, 4));
    }

    #[test]
    fn split_into_strips_on_partial_apply() {
        let mut t = SymbolicTracker::new(4, 1, ResourceState::COMMON);
        let mut out = Vec::new();
        t.apply(
            1,
            SubresourceRange {
                first_mip: 1,
                mip_count: 1,
                first_slice: 0,
                slice_count: 1,
            },
            rtv(),
            &mut out,
        );
        assert_eq!(out.len(), 1);
        let segs = t.flatten(None, true);
        assert_eq!(segs.len(), 3);
    }
}
