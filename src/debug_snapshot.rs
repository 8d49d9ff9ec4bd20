//! Read-only debug snapshot (spec §6 "Debug snapshot").
//!
//! Plain, serializable bookkeeping the aliasing subsystem fills in as it
//! runs. Carries the data a live inspector would render without building
//! the inspector itself (SPEC_FULL.md §11).

use std::collections::HashMap;

use serde::Serialize;

use crate::alias::{AliasPlacementRange, ExclusionReason};
use crate::settings::{AutoAliasMode, AutoAliasPackingStrategy};

/// One resource's placement within a pool, for the inspector's rectangle
/// view. `overlaps_byte_range` is set by the caller when a later placement
/// is found to collide with an earlier one already in the snapshot (a bug
/// indicator, not an expected state).
#[derive(Debug, Clone, Serialize)]
pub struct PlacementRect {
    pub resource_id: u64,
    pub pool_id: u64,
    pub start_byte: u64,
    pub end_byte: u64,
    pub overlaps_byte_range: bool,
}

impl PlacementRect {
    pub fn from_range(resource_id: u64, range: AliasPlacementRange, overlaps_byte_range: bool) -> Self {
        Self {
            resource_id,
            pool_id: range.pool_id,
            start_byte: range.start_byte,
            end_byte: range.end_byte,
            overlaps_byte_range,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExclusionReasonCount {
    pub reason: ExclusionReason,
    pub count: usize,
}

/// Byte accounting the aliasing subsystem reports (spec §6: "candidate/
/// auto/pooled/independent/saved byte totals").
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ByteTotals {
    pub candidate_bytes: u64,
    pub auto_bytes: u64,
    pub pooled_bytes: u64,
    pub independent_bytes: u64,
    pub saved_bytes: u64,
}

/// A full per-frame aliasing snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub mode: AutoAliasMode,
    pub packing_strategy: AutoAliasPackingStrategy,
    pub candidates_seen: usize,
    pub manually_assigned: usize,
    pub auto_assigned: usize,
    pub excluded: usize,
    pub byte_totals: ByteTotals,
    pub exclusion_counts: Vec<ExclusionReasonCount>,
    pub placements: Vec<PlacementRect>,
}

/// Accumulates a [`DebugSnapshot`] over the course of one compile pass.
pub struct DebugSnapshotBuilder {
    mode: AutoAliasMode,
    packing_strategy: AutoAliasPackingStrategy,
    candidates_seen: usize,
    manually_assigned: usize,
    auto_assigned: usize,
    byte_totals: ByteTotals,
    exclusion_counts: HashMap<ExclusionReason, usize>,
    placements: Vec<PlacementRect>,
}

impl DebugSnapshotBuilder {
    pub fn new(mode: AutoAliasMode, packing_strategy: AutoAliasPackingStrategy) -> Self {
        Self {
            mode,
            packing_strategy,
            candidates_seen: 0,
            manually_assigned: 0,
            auto_assigned: 0,
            byte_totals: ByteTotals::default(),
            exclusion_counts: HashMap::new(),
            placements: Vec::new(),
        }
    }

    pub fn record_candidate(&mut self, size_bytes: u64, manually_assigned: bool) {
        self.candidates_seen += 1;
        self.byte_totals.candidate_bytes += size_bytes;
        if manually_assigned {
            self.manually_assigned += 1;
        }
    }

    pub fn record_auto_assigned(&mut self, size_bytes: u64) {
        self.auto_assigned += 1;
        self.byte_totals.auto_bytes += size_bytes;
    }

    pub fn record_excluded(&mut self, reason: ExclusionReason) {
        *self.exclusion_counts.entry(reason).or_insert(0) += 1;
    }

    pub fn record_pooled_bytes(&mut self, pool_heap_bytes: u64, independent_bytes: u64, raw_candidate_bytes: u64) {
        self.byte_totals.pooled_bytes += pool_heap_bytes;
        self.byte_totals.independent_bytes += independent_bytes;
        self.byte_totals.saved_bytes += raw_candidate_bytes.saturating_sub(pool_heap_bytes);
    }

    pub fn push_placement(&mut self, resource_id: u64, range: AliasPlacementRange) {
        let overlaps = self
            .placements
            .iter()
            .any(|existing| existing.pool_id == range.pool_id && overlaps_bytes(existing, &range));
        self.placements
            .push(PlacementRect::from_range(resource_id, range, overlaps));
    }

    pub fn build(self) -> DebugSnapshot {
        let excluded = self.exclusion_counts.values().sum();
        let mut exclusion_counts: Vec<ExclusionReasonCount> = self
            .exclusion_counts
            .into_iter()
            .map(|(reason, count)| ExclusionReasonCount { reason, count })
            .collect();
        exclusion_counts.sort_by_key(|e| e.count);
        DebugSnapshot {
            mode: self.mode,
            packing_strategy: self.packing_strategy,
            candidates_seen: self.candidates_seen,
            manually_assigned: self.manually_assigned,
            auto_assigned: self.auto_assigned,
            excluded,
            byte_totals: self.byte_totals,
            exclusion_counts,
            placements: self.placements,
        }
    }
}

fn overlaps_bytes(existing: &PlacementRect, range: &AliasPlacementRange) -> bool {
    existing.start_byte < range.end_byte && range.start_byte < existing.end_byte
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_counts_tally_per_reason() {
        let mut b = DebugSnapshotBuilder::new(AutoAliasMode::Balanced, AutoAliasPackingStrategy::GreedySweepLine);
        b.record_excluded(ExclusionReason::BelowThreshold);
        b.record_excluded(ExclusionReason::BelowThreshold);
        b.record_excluded(ExclusionReason::ModeOff);
        let snap = b.build();
        assert_eq!(snap.excluded, 3);
        assert_eq!(snap.exclusion_counts.len(), 2);
    }

    #[test]
    fn overlapping_placements_in_same_pool_are_flagged() {
        let mut b = DebugSnapshotBuilder::new(AutoAliasMode::Balanced, AutoAliasPackingStrategy::GreedySweepLine);
        b.push_placement(
            1,
            AliasPlacementRange {
                pool_id: 0,
                start_byte: 0,
                end_byte: 100,
            },
        );
        b.push_placement(
            2,
            AliasPlacementRange {
                pool_id: 0,
                start_byte: 50,
                end_byte: 150,
            },
        );
        let snap = b.build();
        assert!(!snap.placements[0].overlaps_byte_range);
        assert!(snap.placements[1].overlaps_byte_range);
    }

    #[test]
    fn byte_totals_track_savings() {
        let mut b = DebugSnapshotBuilder::new(AutoAliasMode::Balanced, AutoAliasPackingStrategy::GreedySweepLine);
        b.record_pooled_bytes(1024, 0, 4096);
        let snap = b.build();
        assert_eq!(snap.byte_totals.pooled_bytes, 1024);
        assert_eq!(snap.byte_totals.saved_bytes, 3072);
    }
}
