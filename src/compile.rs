//! Frame compile pipeline (spec §4.8): ties the structural merger,
//! immediate recorder, dependency graph builder, aliasing subsystem, and
//! batcher into one per-frame pass, persisting fences, alias pool state,
//! and idle-frame counters across frames the way the spec's
//! `RenderGraph::CompileFrame` does.

use std::collections::{HashMap, HashSet};

use crate::alias::{
    self, AliasPlacementRange, Candidate as AliasCandidate, ExclusionReason, PersistentAliasPoolState,
    Placement, PoolOwner,
};
use crate::batch::{
    Batcher, Candidate as BatchCandidate, InternalTransition as BatchInternalTransition, PassBatch,
    Requirement as BatchRequirement, SignalPhase, TransitionPhase,
};
use crate::debug_snapshot::{DebugSnapshot, DebugSnapshotBuilder};
use crate::error::{GraphError, Result};
use crate::executor::{AllocationQuery, Device};
use crate::graph::{AccessKind, DependencyGraphBuilder, Node};
use crate::immediate::ImmediateRecorder;
use crate::merger::{InsertPoint, StructuralMerger};
use crate::pass::{InternalTransition as PassInternalTransition, Pass, ResourceRequirement, RunMask};
use crate::queue::QueueKind;
use crate::range::RangeSpec;
use crate::resource::Resource;
use crate::settings::Settings;
use crate::state::ResourceState;

const GLOBAL_ALIAS_POOL: u64 = 0;

/// One entry in the merged, per-frame pass list. A pass whose immediate and
/// retained requirements conflict is split into two entries sharing the
/// same `registry_index` (spec §4.8 step 3).
struct FramePassEntry {
    registry_index: usize,
    run_mask: RunMask,
    requirements: Vec<ResourceRequirement>,
    internal_transitions: Vec<PassInternalTransition>,
    queue: QueueKind,
    original_order: usize,
}

/// Output of one [`FrameGraph::compile_frame`] call: everything
/// [`crate::executor::replay_frame`] needs to execute the frame, plus the
/// debug snapshot.
pub struct CompiledFrame {
    pub batches: Vec<PassBatch>,
    pub pass_bytecode: HashMap<usize, Vec<u8>>,
    frame_pass_registry_index: HashMap<usize, usize>,
    pub debug_snapshot: DebugSnapshot,
}

impl CompiledFrame {
    /// `frame_pass_index` is the key used in [`PassBatch::passes`] and
    /// `pass_bytecode`; resolve it back to the registered pass object.
    pub fn pass_registry_index(&self, frame_pass_index: usize) -> Option<usize> {
        self.frame_pass_registry_index.get(&frame_pass_index).copied()
    }
}

/// Persistent, cross-frame scheduler state: the merged pass list, the
/// resource table, fence counters, alias pool lifecycle, and idle-frame
/// bookkeeping. One [`FrameGraph`] lives for the application's lifetime and
/// [`compile_frame`](Self::compile_frame) is called once per frame.
pub struct FrameGraph {
    passes: Vec<Box<dyn Pass>>,
    name_to_index: HashMap<String, usize>,
    base_order: Vec<String>,
    externals: Vec<(String, Option<String>, InsertPoint)>,
    resources: HashMap<u64, Resource>,
    settings: Settings,
    batcher: Batcher,
    alias_pool_states: HashMap<u64, PersistentAliasPoolState>,
    idle_frame_counts: HashMap<u64, u32>,
    cross_frame_producer: HashMap<u64, (QueueKind, u64)>,
    frame_index: u64,
}

impl FrameGraph {
    pub fn new(settings: Settings) -> Self {
        Self {
            passes: Vec::new(),
            name_to_index: HashMap::new(),
            base_order: Vec::new(),
            externals: Vec::new(),
            resources: HashMap::new(),
            settings,
            batcher: Batcher::new(),
            alias_pool_states: HashMap::new(),
            idle_frame_counts: HashMap::new(),
            cross_frame_producer: HashMap::new(),
            frame_index: 0,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Add a pass to the stable base order (spec §4.4 "base pass list").
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        let name = pass.name().to_string();
        let idx = self.passes.len();
        self.passes.push(pass);
        self.name_to_index.insert(name.clone(), idx);
        self.base_order.push(name);
    }

    /// Add a per-frame extension's contribution (spec §4.4 "extension
    /// contributions"), ordered against the base list via `insert_point`.
    pub fn add_external_pass(
        &mut self,
        pass: Box<dyn Pass>,
        extension: Option<String>,
        insert_point: InsertPoint,
    ) {
        let name = pass.name().to_string();
        let idx = self.passes.len();
        self.passes.push(pass);
        self.name_to_index.insert(name.clone(), idx);
        self.externals.push((name, extension, insert_point));
    }

    pub fn register_resource(&mut self, resource: Resource) -> u64 {
        let id = resource.id;
        self.resources.insert(id, resource);
        id
    }

    pub fn resource(&self, id: u64) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn resource_mut(&mut self, id: u64) -> Option<&mut Resource> {
        self.resources.get_mut(&id)
    }

    fn resolve_range(&self, resource_id: u64, spec: &RangeSpec) -> crate::range::SubresourceRange {
        match self.resources.get(&resource_id) {
            Some(r) => spec.resolve(r.mip_count(), r.array_size()),
            None => spec.resolve(1, 1),
        }
    }

    /// Run the full per-frame compile pipeline (spec §4.8).
    #[tracing::instrument(level = "debug", skip_all, fields(frame = self.frame_index + 1))]
    pub fn compile_frame(&mut self, device: &dyn Device) -> Result<CompiledFrame> {
        self.frame_index += 1;

        // Step 4 (partial): structural merge of base + per-frame extensions
        // into one ordered pass-name list.
        let mut merger = StructuralMerger::new();
        merger.set_base(self.base_order.clone());
        for (name, extension, insert_point) in &self.externals {
            merger.add_external(name.clone(), extension.clone(), insert_point.clone());
        }
        let order = merger.merge()?;

        // Steps 2-3: build per-frame pass entries, recording immediate
        // bytecode and splitting passes whose immediate/retained
        // requirements conflict.
        let mut frame_entries: Vec<FramePassEntry> = Vec::with_capacity(order.len());
        let mut pass_bytecode: HashMap<usize, Vec<u8>> = HashMap::new();
        let mut frame_pass_registry_index: HashMap<usize, usize> = HashMap::new();

        for (original_order, name) in order.iter().enumerate() {
            let registry_index = *self
                .name_to_index
                .get(name)
                .expect("merger only ever emits registered pass names");
            let pass = self.passes[registry_index].as_ref();
            let queue = pass.queue().resolve(self.settings.use_async_compute);

            let mut recorder = ImmediateRecorder::new();
            pass.execute_immediate(&mut recorder);
            let (bytecode, immediate_reqs) = recorder.finalize();
            let retained_reqs = pass.requirements().to_vec();

            let conflict = !immediate_reqs.is_empty()
                && !retained_reqs.is_empty()
                && immediate_reqs.iter().any(|ir| {
                    retained_reqs.iter().any(|rr| {
                        rr.resource_id == ir.resource_id
                            && ir.state != rr.state
                            && self
                                .resolve_range(rr.resource_id, &rr.range)
                                .overlaps(&self.resolve_range(ir.resource_id, &ir.range))
                    })
                });

            if conflict {
                let imm_index = frame_entries.len();
                frame_entries.push(FramePassEntry {
                    registry_index,
                    run_mask: RunMask::Immediate,
                    requirements: immediate_reqs,
                    internal_transitions: Vec::new(),
                    queue,
                    original_order,
                });
                frame_pass_registry_index.insert(imm_index, registry_index);
                pass_bytecode.insert(imm_index, bytecode);

                let ret_index = frame_entries.len();
                frame_entries.push(FramePassEntry {
                    registry_index,
                    run_mask: RunMask::Retained,
                    requirements: retained_reqs,
                    internal_transitions: pass.internal_transitions().to_vec(),
                    queue,
                    original_order,
                });
                frame_pass_registry_index.insert(ret_index, registry_index);
            } else {
                let mut requirements = retained_reqs;
                requirements.extend(immediate_reqs);
                let idx = frame_entries.len();
                frame_entries.push(FramePassEntry {
                    registry_index,
                    run_mask: pass.run_mask(),
                    requirements,
                    internal_transitions: pass.internal_transitions().to_vec(),
                    queue,
                    original_order,
                });
                frame_pass_registry_index.insert(idx, registry_index);
                pass_bytecode.insert(idx, bytecode);
            }
        }

        // Step 6: union of referenced resource ids, then idle-frame /
        // dematerialization bookkeeping.
        let mut used_ids: HashSet<u64> = HashSet::new();
        for entry in &frame_entries {
            for req in &entry.requirements {
                used_ids.insert(req.resource_id);
            }
            for it in &entry.internal_transitions {
                used_ids.insert(it.resource_id);
            }
        }
        self.tick_idle_frames(&used_ids);

        // Step 7: build nodes, derive the DAG, topologically sort, compute
        // criticality.
        let mut graph = DependencyGraphBuilder::new();
        for (i, entry) in frame_entries.iter().enumerate() {
            let mut node = Node::new(i, entry.queue, entry.original_order);
            for req in &entry.requirements {
                let kind = if req.state.is_write() {
                    AccessKind::Write
                } else {
                    AccessKind::Read
                };
                node.record_access(req.resource_id, kind, req.state.is_uav());
            }
            for it in &entry.internal_transitions {
                node.record_access(it.resource_id, AccessKind::Write, false);
            }
            graph.push_node(node);
        }
        graph.derive_access_edges();
        let topo = graph.topological_sort()?;
        graph.compute_criticality(&topo);

        // Step 8: AutoAssignAliasingPools + BuildAliasPlanAfterDag.
        let mut snapshot = DebugSnapshotBuilder::new(
            self.settings.auto_alias_mode,
            self.settings.auto_alias_packing_strategy,
        );
        let (placements, alias_candidates) =
            self.build_alias_plan(&graph, &topo, &frame_entries, device, &mut snapshot)?;

        // Step 9: materialize anything still unmaterialized.
        self.materialize_unmaterialized(&used_ids, &placements);

        // Step 10: snapshot compiled-resource generations — tracked
        // implicitly via each resource's `backing_present`/tracker state,
        // which the batcher's admission test reads fresh every frame.

        // Step 11: AutoScheduleAndBuildBatches.
        let batch_candidates = self.build_batch_candidates(&graph, &frame_entries);
        let mut batches = self.batcher.build_batches(&graph, &batch_candidates)?;

        // Step 12: ApplyAliasQueueSynchronization.
        self.apply_alias_queue_synchronization(&mut batches, &graph, &topo, &alias_candidates, &batch_candidates);

        // Step 13: cross-frame start-of-frame waits.
        self.apply_cross_frame_waits(&mut batches, &batch_candidates);
        self.record_cross_frame_producers(&batches, &batch_candidates);

        // Step 14 is performed inside `Batcher::build_batches` itself
        // (redundant-wait stripping runs before cross-frame waits are
        // added, so run it once more now that those are in place).
        Self::strip_redundant_start_of_frame_waits(&mut batches);

        // Step 15: debug-mode conflict validation.
        if self.settings.debug_validate_batches {
            Self::validate_no_conflicting_transitions(&batches)?;
        }

        Ok(CompiledFrame {
            batches,
            pass_bytecode,
            frame_pass_registry_index,
            debug_snapshot: snapshot.build(),
        })
    }

    /// Lend out `{frame pass index -> &dyn Pass}` for
    /// [`crate::executor::replay_frame`], resolved through `compiled`'s
    /// registry-index map.
    pub fn pass_map<'a>(&'a self, compiled: &CompiledFrame) -> HashMap<usize, &'a dyn Pass> {
        compiled
            .frame_pass_registry_index
            .iter()
            .map(|(&frame_idx, &registry_idx)| (frame_idx, self.passes[registry_idx].as_ref()))
            .collect()
    }

    fn tick_idle_frames(&mut self, used_ids: &HashSet<u64>) {
        for (&id, count) in self.idle_frame_counts.iter_mut() {
            if used_ids.contains(&id) {
                *count = 0;
            } else {
                *count += 1;
            }
        }
        for &id in used_ids {
            self.idle_frame_counts.entry(id).or_insert(0);
        }

        let mut to_dematerialize = Vec::new();
        for (&id, resource) in self.resources.iter() {
            if used_ids.contains(&id) {
                continue;
            }
            if let Some(threshold) = resource.dematerialize_after_idle_frames() {
                let idle = self.idle_frame_counts.get(&id).copied().unwrap_or(0);
                if idle >= threshold && resource.backing_present {
                    to_dematerialize.push(id);
                }
            }
        }
        for id in to_dematerialize {
            if let Some(r) = self.resources.get_mut(&id) {
                r.dematerialize();
            }
        }
    }

    /// Candidate collection, scoring/auto-assignment, first-use validation,
    /// per-pool packing, and persistent pool reconciliation (spec §4.6).
    fn build_alias_plan(
        &mut self,
        graph: &DependencyGraphBuilder,
        topo: &[usize],
        frame_entries: &[FramePassEntry],
        device: &dyn Device,
        snapshot: &mut DebugSnapshotBuilder,
    ) -> Result<(HashMap<u64, AliasPlacementRange>, Vec<AliasCandidate>)> {
        let rank_of: HashMap<usize, usize> =
            topo.iter().enumerate().map(|(rank, &node_idx)| (node_idx, rank)).collect();

        let mut candidates: HashMap<u64, AliasCandidate> = HashMap::new();
        for &node_idx in topo {
            let node = &graph.nodes()[node_idx];
            let rank = rank_of[&node_idx] as u32;
            let entry = &frame_entries[node.pass_index];
            for req in &entry.requirements {
                let Some(resource) = self.resources.get(&req.resource_id) else {
                    continue;
                };
                if !resource.allow_alias() {
                    continue;
                }
                if matches!(resource.kind, crate::resource::ResourceKind::Buffer(_))
                    && !resource.is_device_local_buffer()
                {
                    continue;
                }
                let is_write = req.state.is_write();
                candidates
                    .entry(req.resource_id)
                    .and_modify(|c| {
                        c.last_use = rank;
                        c.max_node_criticality = c.max_node_criticality.max(node.criticality);
                    })
                    .or_insert_with(|| {
                        let alloc = device.query_allocation_info(&AllocationQuery {
                            size_bytes: resource.size_bytes().unwrap_or(0),
                            is_texture: matches!(resource.kind, crate::resource::ResourceKind::Texture(_)),
                        });
                        AliasCandidate {
                            resource_id: req.resource_id,
                            pool_id: resource.alias_pool_hint(),
                            size_bytes: alloc.size_bytes,
                            alignment: alloc.alignment,
                            first_use: rank,
                            last_use: rank,
                            first_use_is_write: is_write,
                            max_node_criticality: node.criticality,
                            is_materialized_at_compile: resource.backing_present,
                            manual_pool_assigned: resource.alias_pool_hint().is_some(),
                        }
                    });
            }
        }

        let mut candidates_vec: Vec<AliasCandidate> = candidates.into_values().collect();
        let excluded = alias::auto_assign(self.settings.auto_alias_mode, &mut candidates_vec, GLOBAL_ALIAS_POOL);
        alias::validate_first_use(&candidates_vec)?;

        for c in &candidates_vec {
            snapshot.record_candidate(c.size_bytes, c.manual_pool_assigned);
            if c.pool_id.is_some() && !c.manual_pool_assigned {
                snapshot.record_auto_assigned(c.size_bytes);
            }
        }
        for &reason in excluded.values() {
            snapshot.record_excluded(reason);
        }

        let mut pools: HashMap<u64, Vec<AliasCandidate>> = HashMap::new();
        for c in &candidates_vec {
            if let Some(pool_id) = c.pool_id {
                pools.entry(pool_id).or_default().push(c.clone());
            }
        }

        let mut placements: HashMap<u64, AliasPlacementRange> = HashMap::new();
        for (&pool_id, pool_candidates) in &pools {
            let raw_total: u64 = pool_candidates.iter().map(|c| c.size_bytes).sum();
            let (placed, heap_bytes) =
                alias::pack(pool_id, pool_candidates, self.settings.auto_alias_packing_strategy, &self.settings);
            snapshot.record_pooled_bytes(heap_bytes, 0, raw_total);

            for p in &placed {
                placements.insert(p.resource_id, p.range);
                snapshot.push_placement(p.resource_id, p.range);
            }

            let pool_alignment = pool_candidates.iter().map(|c| c.alignment).max().unwrap_or(1);
            let state = self
                .alias_pool_states
                .entry(pool_id)
                .or_insert_with(|| PersistentAliasPoolState::new(pool_id));
            state.reconcile(
                heap_bytes,
                pool_alignment,
                false,
                self.settings.auto_alias_pool_growth_headroom,
                self.frame_index,
            );
        }

        let retire_threshold = self.settings.auto_alias_pool_retire_idle_frames;
        let frame_index = self.frame_index;
        self.alias_pool_states
            .retain(|_, state| !state.should_retire(frame_index, retire_threshold));
        for state in self.alias_pool_states.values_mut() {
            if !pools.contains_key(&state.pool_id) {
                state.used_this_frame = false;
            }
        }

        Ok((placements, candidates_vec))
    }

    fn materialize_unmaterialized(
        &mut self,
        used_ids: &HashSet<u64>,
        placements: &HashMap<u64, AliasPlacementRange>,
    ) {
        for &id in used_ids {
            let Some(resource) = self.resources.get_mut(&id) else {
                continue;
            };
            if resource.tracker().is_some() {
                continue;
            }
            let initial = if placements.contains_key(&id) {
                ResourceState::undefined()
            } else {
                ResourceState::COMMON
            };
            resource.materialize_tracker(initial);
        }
    }

    fn build_batch_candidates(
        &self,
        graph: &DependencyGraphBuilder,
        frame_entries: &[FramePassEntry],
    ) -> HashMap<usize, BatchCandidate> {
        let mut out = HashMap::with_capacity(graph.nodes().len());
        for node_idx in 0..graph.nodes().len() {
            let node = &graph.nodes()[node_idx];
            let entry = &frame_entries[node.pass_index];
            let requirements: Vec<BatchRequirement> = entry
                .requirements
                .iter()
                .map(|r| BatchRequirement {
                    resource_id: r.resource_id,
                    range: self.resolve_range(r.resource_id, &r.range),
                    state: r.state.clone(),
                    is_uav: r.state.is_uav(),
                })
                .collect();
            let internal_transitions: Vec<BatchInternalTransition> = entry
                .internal_transitions
                .iter()
                .map(|it| BatchInternalTransition {
                    resource_id: it.resource_id,
                    exit_state: it.exit_state.clone(),
                })
                .collect();
            out.insert(
                node_idx,
                BatchCandidate {
                    node_index: node_idx,
                    pass_index: node.pass_index,
                    queue: node.queue_kind,
                    original_order: node.original_order,
                    criticality: node.criticality,
                    requirements,
                    internal_transitions,
                },
            );
        }
        out
    }

    /// Cross-queue alias fences (spec §4.6): walk each pool's placements in
    /// first-use order, emitting a signal/wait pair wherever a byte range's
    /// ownership crosses from a render touch to a compute touch or back.
    fn apply_alias_queue_synchronization(
        &self,
        batches: &mut [PassBatch],
        graph: &DependencyGraphBuilder,
        topo: &[usize],
        alias_candidates: &[AliasCandidate],
        batch_candidates: &HashMap<usize, BatchCandidate>,
    ) {
        let mut node_to_batch: HashMap<usize, usize> = HashMap::new();
        for (batch_index, batch) in batches.iter().enumerate() {
            for pass_indices in batch.passes.values() {
                for &node_idx in pass_indices {
                    node_to_batch.insert(node_idx, batch_index);
                }
            }
        }

        // Last batch (by index) whose passes touch each resource, used to
        // resolve "which batch currently owns this resource" for the
        // previous pool owner in a fence pair.
        let mut last_batch_for_resource: HashMap<u64, usize> = HashMap::new();
        for bc in batch_candidates.values() {
            let Some(&batch_index) = node_to_batch.get(&bc.node_index) else {
                continue;
            };
            for req in &bc.requirements {
                last_batch_for_resource
                    .entry(req.resource_id)
                    .and_modify(|b| *b = (*b).max(batch_index))
                    .or_insert(batch_index);
            }
        }

        let mut by_pool: HashMap<u64, Vec<&AliasCandidate>> = HashMap::new();
        for c in alias_candidates {
            if let Some(pool_id) = c.pool_id {
                by_pool.entry(pool_id).or_default().push(c);
            }
        }

        for candidates in by_pool.values_mut() {
            candidates.sort_by_key(|c| c.first_use);
            let mut owners: Vec<PoolOwner> = Vec::new();
            for c in candidates.iter() {
                let Some(&last_node) = topo.get(c.last_use as usize) else {
                    continue;
                };
                let queue = graph.nodes()[last_node].queue_kind;
                let Some(&wait_batch_index) = node_to_batch.get(&last_node) else {
                    continue;
                };
                let range = AliasPlacementRange {
                    pool_id: c.pool_id.unwrap_or(GLOBAL_ALIAS_POOL),
                    start_byte: 0,
                    end_byte: c.size_bytes,
                };
                let new_owner = PoolOwner {
                    resource_id: c.resource_id,
                    range,
                    uses_render: queue == QueueKind::Graphics,
                    uses_compute: queue == QueueKind::Compute,
                };
                let fences = alias::cross_queue_alias_fences(&mut owners, new_owner, wait_batch_index, |resource_id| {
                    last_batch_for_resource.get(&resource_id).copied()
                });
                for req in fences {
                    batches[req.signal_batch_index].enable_alias_signal(req.signal_queue);
                    let fence = *batches[req.signal_batch_index]
                        .queue_signal_fence_value
                        .get(&(SignalPhase::AfterCompletion, req.signal_queue))
                        .unwrap_or(&0);
                    batches[req.wait_batch_index].add_start_of_frame_wait(queue, req.signal_queue, fence);
                }
            }
        }
    }

    fn apply_cross_frame_waits(&self, batches: &mut [PassBatch], candidates: &HashMap<usize, BatchCandidate>) {
        let mut resolved: HashSet<u64> = HashSet::new();
        for batch in batches.iter_mut() {
            let passes = batch.passes.clone();
            for (&queue, pass_indices) in &passes {
                for &pass_index in pass_indices {
                    let Some(cand) = candidates.get(&pass_index) else {
                        continue;
                    };
                    for req in &cand.requirements {
                        if resolved.contains(&req.resource_id) {
                            continue;
                        }
                        if let Some(&(prev_queue, prev_fence)) = self.cross_frame_producer.get(&req.resource_id) {
                            if prev_queue != queue {
                                batch.add_start_of_frame_wait(queue, prev_queue, prev_fence);
                            }
                        }
                        resolved.insert(req.resource_id);
                    }
                }
            }
        }
    }

    fn record_cross_frame_producers(&mut self, batches: &[PassBatch], candidates: &HashMap<usize, BatchCandidate>) {
        let mut last_touch: HashMap<u64, (usize, QueueKind)> = HashMap::new();
        for (batch_index, batch) in batches.iter().enumerate() {
            for (&queue, pass_indices) in &batch.passes {
                for &pass_index in pass_indices {
                    let Some(cand) = candidates.get(&pass_index) else {
                        continue;
                    };
                    for req in &cand.requirements {
                        last_touch.insert(req.resource_id, (batch_index, queue));
                    }
                }
            }
        }
        for (resource_id, (batch_index, queue)) in last_touch {
            let fence = batches[batch_index]
                .queue_signal_fence_value
                .get(&(SignalPhase::AfterCompletion, queue))
                .copied()
                .unwrap_or(0);
            self.cross_frame_producer.insert(resource_id, (queue, fence));
        }
    }

    /// Re-run redundant-wait stripping for the `BeforeTransitions` phase
    /// after cross-frame/alias waits have been added on top of the
    /// batcher's own intra-frame ones (spec §4.8 step 14).
    fn strip_redundant_start_of_frame_waits(batches: &mut [PassBatch]) {
        let mut running_max: HashMap<(QueueKind, QueueKind), u64> = HashMap::new();
        for batch in batches.iter_mut() {
            let keys: Vec<_> = batch
                .queue_wait_enabled
                .keys()
                .copied()
                .filter(|&(phase, _, _)| phase == crate::batch::WaitPhase::BeforeTransitions)
                .collect();
            for key @ (_, dst, src) in keys {
                let fence = batch.queue_wait_fence_value[&key];
                let max_so_far = running_max.entry((dst, src)).or_insert(0);
                if fence <= *max_so_far {
                    batch.queue_wait_enabled.remove(&key);
                    batch.queue_wait_fence_value.remove(&key);
                } else {
                    *max_so_far = fence;
                }
            }
        }
    }

    fn validate_no_conflicting_transitions(batches: &[PassBatch]) -> Result<()> {
        for (batch_index, batch) in batches.iter().enumerate() {
            for (&(phase, _queue), transitions) in &batch.transitions {
                for i in 0..transitions.len() {
                    for j in (i + 1)..transitions.len() {
                        let a = &transitions[i];
                        let b = &transitions[j];
                        if a.resource_id == b.resource_id
                            && a.range.overlaps(&b.range)
                            && (a.new_access != b.new_access || a.new_layout != b.new_layout)
                        {
                            return Err(GraphError::ConflictingTransitions {
                                resource_id: a.resource_id,
                                batch_index,
                                phase,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AllocationInfo;
    use crate::identifier::ResourceGroup;
    use crate::pass::PassDeclBuilder;
    use crate::range::RangeSpec;
    use crate::resource::{BufferDesc, HeapType};
    use crate::state::{Access, Layout, Sync};

    struct TestDevice;
    impl Device for TestDevice {
        fn create_command_list(&self, _queue: QueueKind) -> Box<dyn crate::executor::CommandList> {
            unimplemented!()
        }
        fn query_allocation_info(&self, desc: &AllocationQuery) -> AllocationInfo {
            AllocationInfo {
                size_bytes: desc.size_bytes,
                alignment: 256,
            }
        }
    }

    struct SingleResourcePass {
        name: String,
        resource_id: u64,
        identifiers: ResourceGroup,
        requirements: Vec<ResourceRequirement>,
    }

    impl Pass for SingleResourcePass {
        fn name(&self) -> &str {
            &self.name
        }
        fn declared_identifiers(&self) -> &ResourceGroup {
            &self.identifiers
        }
        fn requirements(&self) -> &[ResourceRequirement] {
            &self.requirements
        }
    }

    fn srv_pass(name: &str, resource_id: u64) -> Box<dyn Pass> {
        let (requirements, _) = PassDeclBuilder::new()
            .with_shader_resource(resource_id, RangeSpec::all())
            .build();
        Box::new(SingleResourcePass {
            name: name.to_string(),
            resource_id,
            identifiers: ResourceGroup::new(),
            requirements,
        })
    }

    fn rtv_pass(name: &str, resource_id: u64) -> Box<dyn Pass> {
        let (requirements, _) = PassDeclBuilder::new()
            .with_render_target(resource_id, RangeSpec::all())
            .build();
        Box::new(SingleResourcePass {
            name: name.to_string(),
            resource_id,
            identifiers: ResourceGroup::new(),
            requirements,
        })
    }

    #[test]
    fn single_pass_graphics_read_compiles_to_one_batch() {
        let mut fg = FrameGraph::new(Settings::default());
        let id = fg.register_resource(Resource::new_buffer(
            "buf",
            BufferDesc {
                size_bytes: 1024,
                heap_type: HeapType::Default,
                is_uav: false,
                allow_alias: false,
                alias_pool_hint: None,
            },
        ));
        fg.add_pass(srv_pass("read", id));
        let compiled = fg.compile_frame(&TestDevice).unwrap();
        assert_eq!(compiled.batches.len(), 1);
    }

    #[test]
    fn producer_consumer_cross_queue_gets_sync() {
        let mut fg = FrameGraph::new(Settings::default());
        let id = fg.register_resource(Resource::new_buffer(
            "buf",
            BufferDesc {
                size_bytes: 1024,
                heap_type: HeapType::Default,
                is_uav: false,
                allow_alias: false,
                alias_pool_hint: None,
            },
        ));

        let (uav_reqs, _) = PassDeclBuilder::new().with_uav(id, RangeSpec::all()).build();
        struct ComputePass {
            reqs: Vec<ResourceRequirement>,
            identifiers: ResourceGroup,
        }
        impl Pass for ComputePass {
            fn name(&self) -> &str {
                "produce"
            }
            fn declared_identifiers(&self) -> &ResourceGroup {
                &self.identifiers
            }
            fn requirements(&self) -> &[ResourceRequirement] {
                &self.reqs
            }
            fn queue(&self) -> QueueKind {
                QueueKind::Compute
            }
        }
        fg.add_pass(Box::new(ComputePass {
            reqs: uav_reqs,
            identifiers: ResourceGroup::new(),
        }));
        fg.add_pass(srv_pass("consume", id));

        let compiled = fg.compile_frame(&TestDevice).unwrap();
        assert!(compiled.batches.len() >= 1);
    }

    #[test]
    fn aliasing_reuses_bytes_for_disjoint_lifetime_resources() {
        let mut settings = Settings::default();
        settings.auto_alias_mode = crate::settings::AutoAliasMode::Aggressive;
        let mut fg = FrameGraph::new(settings);

        let a = fg.register_resource(Resource::new_buffer(
            "a",
            BufferDesc {
                size_bytes: 4096,
                heap_type: HeapType::Default,
                is_uav: false,
                allow_alias: true,
                alias_pool_hint: None,
            },
        ));
        let b = fg.register_resource(Resource::new_buffer(
            "b",
            BufferDesc {
                size_bytes: 4096,
                heap_type: HeapType::Default,
                is_uav: false,
                allow_alias: true,
                alias_pool_hint: None,
            },
        ));
        fg.add_pass(rtv_pass("write_a", a));
        fg.add_pass(srv_pass("read_a", a));
        fg.add_pass(rtv_pass("write_b", b));
        fg.add_pass(srv_pass("read_b", b));

        let compiled = fg.compile_frame(&TestDevice).unwrap();
        assert!(compiled.debug_snapshot.auto_assigned >= 1);
    }

    #[test]
    fn duplicate_pass_name_surfaces_as_compile_error() {
        let mut fg = FrameGraph::new(Settings::default());
        let id = fg.register_resource(Resource::new_buffer(
            "buf",
            BufferDesc {
                size_bytes: 16,
                heap_type: HeapType::Default,
                is_uav: false,
                allow_alias: false,
                alias_pool_hint: None,
            },
        ));
        fg.add_pass(srv_pass("dup", id));
        fg.add_pass(srv_pass("dup", id));
        assert!(matches!(
            fg.compile_frame(&TestDevice),
            Err(GraphError::DuplicatePassName(_))
        ));
    }
}
