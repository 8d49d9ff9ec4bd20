//! Transient memory aliasing subsystem (spec §4.6).
//!
//! Candidate collection, auto-assignment scoring, first-use validation,
//! greedy sweep-line / beam-search packing, persistent pool lifecycle, and
//! cross-queue alias fences.

use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::queue::QueueKind;
use crate::settings::{AutoAliasMode, AutoAliasPackingStrategy, Settings};

/// One resource considered for aliasing this frame.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub resource_id: u64,
    pub pool_id: Option<u64>,
    pub size_bytes: u64,
    pub alignment: u64,
    pub first_use: u32,
    pub last_use: u32,
    pub first_use_is_write: bool,
    pub max_node_criticality: u32,
    pub is_materialized_at_compile: bool,
    pub manual_pool_assigned: bool,
}

/// `(poolId, startByte, endByte)` — where a resource lives this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasPlacementRange {
    pub pool_id: u64,
    pub start_byte: u64,
    pub end_byte: u64,
}

impl AliasPlacementRange {
    pub fn overlaps(&self, other: &AliasPlacementRange) -> bool {
        self.pool_id == other.pool_id
            && self.start_byte < other.end_byte
            && other.start_byte < self.end_byte
    }
}

/// Reason a candidate was excluded from auto-aliasing, recorded in the
/// debug snapshot (spec §6 "per-reason exclusion counts").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ExclusionReason {
    ModeOff,
    BelowThreshold,
    NotAliasable,
}

/// Score a candidate for auto-assignment under `mode`; `None` excludes it.
/// `benefit_mb` approximates the byte savings from reuse; `criticality` and
/// `materialized_at_compile` are penalized per spec §4.6.
pub fn score_candidate(
    mode: AutoAliasMode,
    benefit_mb: f32,
    criticality: u32,
    materialized_at_compile: bool,
) -> Option<f32> {
    let (threshold, criticality_weight) = match mode {
        AutoAliasMode::Off => return None,
        AutoAliasMode::Conservative => (1.0, 0.25),
        AutoAliasMode::Balanced => (0.25, 0.1),
        AutoAliasMode::Aggressive => (-0.5, 0.02),
    };
    let materialized_penalty = if materialized_at_compile { 0.5 } else { 0.0 };
    let score = benefit_mb
        - criticality_weight * criticality as f32
        - materialized_penalty;
    if score >= threshold {
        Some(score)
    } else {
        None
    }
}

/// Assign candidates with no manual pool hint to the single implicit global
/// pool when their score clears the mode's threshold.
pub fn auto_assign(
    mode: AutoAliasMode,
    candidates: &mut [Candidate],
    global_pool_id: u64,
) -> HashMap<u64, ExclusionReason> {
    let mut excluded = HashMap::new();
    for c in candidates.iter_mut() {
        if c.manual_pool_assigned {
            continue;
        }
        if mode == AutoAliasMode::Off {
            excluded.insert(c.resource_id, ExclusionReason::ModeOff);
            continue;
        }
        let benefit_mb = c.size_bytes as f32 / (1024.0 * 1024.0);
        match score_candidate(mode, benefit_mb, c.max_node_criticality, c.is_materialized_at_compile) {
            Some(_) => c.pool_id = Some(global_pool_id),
            None => {
                excluded.insert(c.resource_id, ExclusionReason::BelowThreshold);
            }
        }
    }
    excluded
}

/// Every aliased candidate's first use must be a write (or `Common`); a
/// first-use read has no mechanism to populate defined contents.
pub fn validate_first_use(candidates: &[Candidate]) -> Result<()> {
    for c in candidates {
        if c.pool_id.is_some() && !c.first_use_is_write {
            return Err(GraphError::AliasFirstUseIsRead {
                resource_id: c.resource_id,
            });
        }
    }
    Ok(())
}

/// A byte-range placement produced by packing, before pool-lifecycle
/// bookkeeping is applied.
#[derive(Debug, Clone)]
pub struct Placement {
    pub resource_id: u64,
    pub range: AliasPlacementRange,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Sort order for greedy packing: `(firstUse asc, sizeBytes desc, lastUse
/// asc, id asc)`.
fn sort_key(c: &Candidate) -> (u32, std::cmp::Reverse<u64>, u32, u64) {
    (c.first_use, std::cmp::Reverse(c.size_bytes), c.last_use, c.resource_id)
}

#[derive(Clone, Copy)]
struct ActiveRange {
    resource_id: u64,
    start: u64,
    end: u64,
    last_use: u32,
}

/// Greedy sweep-line packer (spec §4.6 "Greedy sweep-line"). Returns
/// placements plus the pool's final heap size in bytes.
pub fn pack_greedy_sweep_line(pool_id: u64, candidates: &[Candidate]) -> (Vec<Placement>, u64) {
    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by_key(|c| sort_key(c));

    let mut active: Vec<ActiveRange> = Vec::new();
    let mut heap_end: u64 = 0;
    let mut placements = Vec::with_capacity(sorted.len());

    for c in sorted {
        active.retain(|a| a.last_use >= c.first_use);

        let mut free_ranges: Vec<(u64, u64)> = Vec::new();
        let mut occupied: Vec<(u64, u64)> = active.iter().map(|a| (a.start, a.end)).collect();
        occupied.sort();
        let mut cursor = 0u64;
        for (start, end) in &occupied {
            if *start > cursor {
                free_ranges.push((cursor, *start));
            }
            cursor = cursor.max(*end);
        }
        free_ranges.push((cursor, u64::MAX));

        let mut best: Option<(u64, u64)> = None;
        for &(start, limit) in &free_ranges {
            let aligned_start = align_up(start, c.alignment.max(1));
            if aligned_start >= limit {
                continue;
            }
            let available = if limit == u64::MAX {
                u64::MAX
            } else {
                limit - aligned_start
            };
            if available < c.size_bytes {
                continue;
            }
            let slack = if limit == u64::MAX {
                u64::MAX
            } else {
                available - c.size_bytes
            };
            match best {
                Some((_, best_slack)) if best_slack <= slack => {}
                _ => best = Some((aligned_start, slack)),
            }
        }

        let placed_start = best.map(|(s, _)| s).unwrap_or_else(|| align_up(heap_end, c.alignment.max(1)));
        let placed_end = placed_start + c.size_bytes;
        heap_end = heap_end.max(placed_end);

        active.push(ActiveRange {
            resource_id: c.resource_id,
            start: placed_start,
            end: placed_end,
            last_use: c.last_use,
        });
        placements.push(Placement {
            resource_id: c.resource_id,
            range: AliasPlacementRange {
                pool_id,
                start_byte: placed_start,
                end_byte: placed_end,
            },
        });
    }

    (placements, heap_end)
}

#[derive(Clone)]
struct BeamState {
    active: Vec<ActiveRange>,
    heap_end: u64,
    placements: Vec<Placement>,
}

/// Beam search packer (spec §4.6 "Beam search"): warm-starts from greedy,
/// explores alternative start offsets per candidate with a bounded beam,
/// and falls back to the greedy plan if it does not finish cleanly.
pub fn pack_beam_search(
    pool_id: u64,
    candidates: &[Candidate],
    settings: &Settings,
) -> (Vec<Placement>, u64) {
    let mut sorted: Vec<&Candidate> = candidates.iter().collect();
    sorted.sort_by_key(|c| sort_key(c));

    let (greedy_placements, greedy_heap_end) = pack_greedy_sweep_line(pool_id, candidates);

    let initial = BeamState {
        active: Vec::new(),
        heap_end: 0,
        placements: Vec::new(),
    };
    let mut beam = vec![initial];

    for c in &sorted {
        let mut next_states: Vec<BeamState> = Vec::new();

        for state in &beam {
            let mut active: Vec<ActiveRange> = state
                .active
                .iter()
                .copied()
                .filter(|a| a.last_use >= c.first_use)
                .collect();

            let mut starts: Vec<u64> = vec![0];
            for a in &active {
                starts.push(a.end);
            }
            starts.sort_unstable();
            starts.dedup();
            starts.truncate(settings.starts_per_state.max(1));

            for &start in &starts {
                let aligned_start = align_up(start, c.alignment.max(1));
                let overlaps = active
                    .iter()
                    .any(|a| aligned_start < a.end && a.start < aligned_start + c.size_bytes);
                if overlaps {
                    continue;
                }
                let mut new_active = active.clone();
                new_active.push(ActiveRange {
                    resource_id: c.resource_id,
                    start: aligned_start,
                    end: aligned_start + c.size_bytes,
                    last_use: c.last_use,
                });
                let mut new_placements = state.placements.clone();
                new_placements.push(Placement {
                    resource_id: c.resource_id,
                    range: AliasPlacementRange {
                        pool_id,
                        start_byte: aligned_start,
                        end_byte: aligned_start + c.size_bytes,
                    },
                });
                next_states.push(BeamState {
                    heap_end: state.heap_end.max(aligned_start + c.size_bytes),
                    active: new_active,
                    placements: new_placements,
                });
            }
            active.clear();
        }

        if next_states.is_empty() {
            // Beam search failed to extend; fall back to the greedy plan.
            return (greedy_placements, greedy_heap_end);
        }

        next_states.sort_by_key(|s| s.heap_end);
        next_states.truncate(settings.beam_width.max(1));
        beam = next_states;
    }

    match beam.into_iter().min_by_key(|s| s.heap_end) {
        Some(best) if best.placements.len() == sorted.len() => (best.placements, best.heap_end),
        _ => (greedy_placements, greedy_heap_end),
    }
}

pub fn pack(
    pool_id: u64,
    candidates: &[Candidate],
    strategy: AutoAliasPackingStrategy,
    settings: &Settings,
) -> (Vec<Placement>, u64) {
    match strategy {
        AutoAliasPackingStrategy::GreedySweepLine => pack_greedy_sweep_line(pool_id, candidates),
        AutoAliasPackingStrategy::BranchAndBound => pack_beam_search(pool_id, candidates, settings),
    }
}

/// Persistent per-pool allocation state, surviving across frames (spec §3
/// "PersistentAliasPoolState").
#[derive(Debug, Clone)]
pub struct PersistentAliasPoolState {
    pub pool_id: u64,
    pub capacity_bytes: u64,
    pub alignment: u64,
    pub generation: u32,
    pub last_used_frame: u64,
    pub used_this_frame: bool,
}

impl PersistentAliasPoolState {
    pub fn new(pool_id: u64) -> Self {
        Self {
            pool_id,
            capacity_bytes: 0,
            alignment: 1,
            generation: 0,
            last_used_frame: 0,
            used_this_frame: false,
        }
    }

    /// Apply this frame's packing result: grow (with headroom) or shrink,
    /// bumping `generation` on any capacity/alignment change. Returns
    /// `true` if the allocation changed (callers must dematerialize and
    /// mark "activation pending" for resources whose placement signature
    /// no longer matches).
    pub fn reconcile(
        &mut self,
        required_bytes: u64,
        required_alignment: u64,
        strategy_changed: bool,
        growth_headroom: f32,
        current_frame: u64,
    ) -> bool {
        self.last_used_frame = current_frame;
        self.used_this_frame = true;

        let needs_grow = required_bytes > self.capacity_bytes || required_alignment > self.alignment;
        let needs_shrink = strategy_changed && self.capacity_bytes > required_bytes;

        if needs_grow {
            let grown = (required_bytes as f32 * growth_headroom.max(1.0)).ceil() as u64;
            self.capacity_bytes = grown.max(required_bytes);
            self.alignment = self.alignment.max(required_alignment);
            self.generation += 1;
            true
        } else if needs_shrink {
            self.capacity_bytes = required_bytes;
            self.generation += 1;
            true
        } else {
            false
        }
    }

    /// True if this pool has gone `retire_idle_frames` frames without use
    /// and should be retired (resources dematerialized, allocation freed).
    pub fn should_retire(&self, current_frame: u64, retire_idle_frames: u32) -> bool {
        !self.used_this_frame
            && current_frame.saturating_sub(self.last_used_frame) >= retire_idle_frames as u64
    }
}

/// Tracks, per resource, the placement signature last materialized
/// against, so pool reconciliation can detect when a resource needs an
/// alias-activation (discard) barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementSignature {
    pub pool_id: u64,
    pub start_byte: u64,
    pub end_byte: u64,
    pub pool_generation: u32,
}

/// Cross-queue "last owners" bookkeeping for one pool: which resource
/// currently occupies which byte range, and on which queues it was used
/// this frame.
#[derive(Debug, Clone)]
pub struct PoolOwner {
    pub resource_id: u64,
    pub range: AliasPlacementRange,
    pub uses_render: bool,
    pub uses_compute: bool,
}

/// A cross-queue alias fence the batcher must honor: the owner batch must
/// signal `AfterCompletion`, and the new owner's batch must wait
/// `BeforeTransitions` (spec §4.6 "Cross-queue alias fences").
#[derive(Debug, Clone, Copy)]
pub struct AliasFenceRequirement {
    pub signal_batch_index: usize,
    pub signal_queue: QueueKind,
    pub wait_batch_index: usize,
}

/// Walk `owners` (this frame's prior owners) against `new_owner`; for any
/// overlapping byte range whose queue usage crosses (prev render vs. new
/// compute, or vice versa), emit a fence requirement and update `owners`
/// to reflect the new owner.
pub fn cross_queue_alias_fences(
    owners: &mut Vec<PoolOwner>,
    new_owner: PoolOwner,
    new_owner_batch_index: usize,
    owner_batch_index_of: impl Fn(u64) -> Option<usize>,
) -> Vec<AliasFenceRequirement> {
    let mut fences = Vec::new();
    for prev in owners.iter() {
        if !prev.range.overlaps(&new_owner.range) {
            continue;
        }
        let crosses = (prev.uses_render && new_owner.uses_compute)
            || (prev.uses_compute && new_owner.uses_render);
        if !crosses {
            continue;
        }
        if let Some(signal_batch_index) = owner_batch_index_of(prev.resource_id) {
            let signal_queue = if prev.uses_render {
                QueueKind::Graphics
            } else {
                QueueKind::Compute
            };
            fences.push(AliasFenceRequirement {
                signal_batch_index,
                signal_queue,
                wait_batch_index: new_owner_batch_index,
            });
        }
    }
    owners.retain(|p| !p.range.overlaps(&new_owner.range));
    owners.push(new_owner);
    fences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: u64, size: u64, first_use: u32, last_use: u32) -> Candidate {
        Candidate {
            resource_id: id,
            pool_id: None,
            size_bytes: size,
            alignment: 256,
            first_use,
            last_use,
            first_use_is_write: true,
            max_node_criticality: 0,
            is_materialized_at_compile: false,
            manual_pool_assigned: false,
        }
    }

    #[test]
    fn disjoint_lifetimes_reuse_the_same_bytes() {
        let candidates = vec![cand(1, 1024, 0, 1), cand(2, 1024, 2, 3)];
        let (placements, heap_end) = pack_greedy_sweep_line(0, &candidates);
        assert_eq!(placements.len(), 2);
        assert_eq!(heap_end, 1024);
        assert_eq!(placements[0].range.start_byte, placements[1].range.start_byte);
    }

    #[test]
    fn overlapping_lifetimes_do_not_share_bytes() {
        let candidates = vec![cand(1, 1024, 0, 3), cand(2, 1024, 1, 4)];
        let (placements, heap_end) = pack_greedy_sweep_line(0, &candidates);
        assert!(!placements[0].range.overlaps(&placements[1].range));
        assert_eq!(heap_end, 2048);
    }

    #[test]
    fn first_use_read_is_rejected() {
        let mut c = cand(1, 1024, 0, 1);
        c.pool_id = Some(7);
        c.first_use_is_write = false;
        assert!(matches!(
            validate_first_use(&[c]),
            Err(GraphError::AliasFirstUseIsRead { .. })
        ));
    }

    #[test]
    fn off_mode_excludes_everything() {
        let mut candidates = vec![cand(1, 1024 * 1024, 0, 1)];
        let excluded = auto_assign(AutoAliasMode::Off, &mut candidates, 99);
        assert_eq!(excluded.len(), 1);
        assert!(candidates[0].pool_id.is_none());
    }

    #[test]
    fn aggressive_mode_admits_small_resources_conservative_does_not() {
        assert!(score_candidate(AutoAliasMode::Aggressive, 0.1, 0, false).is_some());
        assert!(score_candidate(AutoAliasMode::Conservative, 0.1, 0, false).is_none());
    }

    #[test]
    fn pool_grows_with_headroom_and_bumps_generation() {
        let mut pool = PersistentAliasPoolState::new(1);
        let changed = pool.reconcile(1000, 256, false, 1.5, 1);
        assert!(changed);
        assert_eq!(pool.capacity_bytes, 1500);
        assert_eq!(pool.generation, 1);
    }

    #[test]
    fn pool_retires_after_idle_threshold() {
        let mut pool = PersistentAliasPoolState::new(1);
        pool.reconcile(100, 1, false, 1.5, 1);
        pool.used_this_frame = false;
        assert!(!pool.should_retire(5, 120));
        assert!(pool.should_retire(200, 120));
    }

    #[test]
    fn cross_queue_fence_emitted_when_usage_crosses_queues() {
        let mut owners = vec![PoolOwner {
            resource_id: 1,
            range: AliasPlacementRange {
                pool_id: 0,
                start_byte: 0,
                end_byte: 1024,
            },
            uses_render: true,
            uses_compute: false,
        }];
        let new_owner = PoolOwner {
            resource_id: 2,
            range: AliasPlacementRange {
                pool_id: 0,
                start_byte: 0,
                end_byte: 1024,
            },
            uses_render: false,
            uses_compute: true,
        };
        let fences = cross_queue_alias_fences(&mut owners, new_owner, 3, |id| if id == 1 { Some(0) } else { None });
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].wait_batch_index, 3);
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].resource_id, 2);
    }
}
