//! Black-box scenario tests against the public `FrameGraph` API (spec §8
//! "End-to-end scenarios"), placed under `tests/` the way sibling crates in
//! the retrieval pack structure their integration suites.

use rendergraph::batch::{TransitionPhase, WaitPhase};
use rendergraph::executor::{AllocationInfo, AllocationQuery, Device};
use rendergraph::identifier::ResourceGroup;
use rendergraph::pass::{InternalTransition, Pass, PassDeclBuilder, ResourceRequirement, RunMask};
use rendergraph::queue::QueueKind;
use rendergraph::range::RangeSpec;
use rendergraph::resource::{BufferDesc, HeapType, Resource, TextureDesc};
use rendergraph::settings::{AutoAliasMode, Settings};
use rendergraph::state::{Access, Layout, ResourceState, Sync};
use rendergraph::FrameGraph;

struct TestDevice;
impl Device for TestDevice {
    fn create_command_list(&self, _queue: QueueKind) -> Box<dyn rendergraph::executor::CommandList> {
        unimplemented!("scenario tests never replay a frame, only compile it")
    }
    fn query_allocation_info(&self, desc: &AllocationQuery) -> AllocationInfo {
        AllocationInfo {
            size_bytes: desc.size_bytes,
            alignment: 256,
        }
    }
}

struct DeclaredPass {
    name: String,
    identifiers: ResourceGroup,
    requirements: Vec<ResourceRequirement>,
    internal_transitions: Vec<InternalTransition>,
    queue: QueueKind,
    run_mask: RunMask,
}

impl DeclaredPass {
    fn new(name: &str, requirements: Vec<ResourceRequirement>) -> Self {
        Self {
            name: name.to_string(),
            identifiers: ResourceGroup::new(),
            requirements,
            internal_transitions: Vec::new(),
            queue: QueueKind::Graphics,
            run_mask: RunMask::Retained,
        }
    }

    fn on_queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    fn with_internal(mut self, t: InternalTransition) -> Self {
        self.internal_transitions.push(t);
        self
    }
}

impl Pass for DeclaredPass {
    fn name(&self) -> &str {
        &self.name
    }
    fn declared_identifiers(&self) -> &ResourceGroup {
        &self.identifiers
    }
    fn requirements(&self) -> &[ResourceRequirement] {
        &self.requirements
    }
    fn internal_transitions(&self) -> &[InternalTransition] {
        &self.internal_transitions
    }
    fn queue(&self) -> QueueKind {
        self.queue
    }
    fn run_mask(&self) -> RunMask {
        self.run_mask
    }
}

fn buffer(fg: &mut FrameGraph, size_bytes: u64, allow_alias: bool) -> u64 {
    fg.register_resource(Resource::new_buffer(
        "buf",
        BufferDesc {
            size_bytes,
            heap_type: HeapType::Default,
            is_uav: false,
            allow_alias,
            alias_pool_hint: None,
        },
    ))
}

fn texture(fg: &mut FrameGraph, allow_alias: bool) -> u64 {
    fg.register_resource(Resource::new_texture(
        "tex",
        TextureDesc {
            mip_levels: 1,
            array_size: 1,
            is_cubemap: false,
            clear_value: None,
            allow_alias,
            alias_pool_hint: None,
            dematerialize_after_idle_frames: None,
        },
    ))
}

/// Scenario 1: one pass declares `SRV(X)`. One batch, one entry, no
/// signals/waits; X ends in shader-resource state.
#[test]
fn single_pass_graphics_read() {
    let mut fg = FrameGraph::new(Settings::default());
    let x = buffer(&mut fg, 1024, false);
    let (reqs, _) = PassDeclBuilder::new().with_shader_resource(x, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("read_x", reqs)));

    let compiled = fg.compile_frame(&TestDevice).unwrap();
    assert_eq!(compiled.batches.len(), 1);
    let batch = &compiled.batches[0];
    assert_eq!(batch.passes.get(&QueueKind::Graphics).map(Vec::len), Some(1));
    assert!(batch.queue_signal_enabled.values().all(|&v| !v));
    assert!(batch.queue_wait_enabled.values().all(|&v| !v));

    let resource = fg.resource(x).unwrap();
    let segs = resource.tracker().unwrap().flatten(None, true);
    assert!(segs.iter().all(|s| s.state.access.contains(Access::SHADER_READ)));
}

/// Scenario 2: compute pass A writes `UAV(Y)`, graphics pass B reads
/// `SRV(Y)`. Two batches; B waits on A's completion fence before its
/// pre-transition.
#[test]
fn producer_consumer_cross_queue() {
    let mut fg = FrameGraph::new(Settings::default());
    let y = buffer(&mut fg, 1024, false);

    let (uav_reqs, _) = PassDeclBuilder::new().with_uav(y, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("produce_y", uav_reqs).on_queue(QueueKind::Compute)));

    let (srv_reqs, _) = PassDeclBuilder::new().with_shader_resource(y, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("consume_y", srv_reqs)));

    let compiled = fg.compile_frame(&TestDevice).unwrap();
    assert_eq!(compiled.batches.len(), 2);
    assert!(compiled.batches[0].passes.contains_key(&QueueKind::Compute));
    assert!(compiled.batches[1].passes.contains_key(&QueueKind::Graphics));

    let waits_on_compute = compiled.batches[1]
        .queue_wait_enabled
        .get(&(WaitPhase::BeforeTransitions, QueueKind::Graphics, QueueKind::Compute))
        .copied()
        .unwrap_or(false);
    assert!(waits_on_compute, "consumer batch must wait on the producer's completion fence");

    let pre_transitions = compiled.batches[1]
        .transitions
        .get(&(TransitionPhase::BeforePasses, QueueKind::Graphics));
    assert!(pre_transitions.is_some_and(|ts| ts.iter().any(|t| t.resource_id == y)));
}

/// Scenario 3: two same-size textures, lifetime-disjoint, both alias-
/// eligible, no manual pool. Expect them to share bytes (T2 placed where
/// T1 was).
#[test]
fn aliasing_identical_size_disjoint_lifetime() {
    let mut settings = Settings::default();
    settings.auto_alias_mode = AutoAliasMode::Aggressive;
    let mut fg = FrameGraph::new(settings);

    let t1 = texture(&mut fg, true);
    let t2 = texture(&mut fg, true);

    let (rtv1, _) = PassDeclBuilder::new().with_render_target(t1, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("write_t1", rtv1)));
    let (srv1, _) = PassDeclBuilder::new().with_shader_resource(t1, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("read_t1", srv1)));
    let (rtv2, _) = PassDeclBuilder::new().with_render_target(t2, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("write_t2", rtv2)));
    let (srv2, _) = PassDeclBuilder::new().with_shader_resource(t2, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("read_t2", srv2)));

    let compiled = fg.compile_frame(&TestDevice).unwrap();
    assert!(compiled.debug_snapshot.auto_assigned >= 2, "both textures should be auto-assigned to a pool");

    let t1_placement = compiled.debug_snapshot.placements.iter().find(|p| p.resource_id == t1);
    let t2_placement = compiled.debug_snapshot.placements.iter().find(|p| p.resource_id == t2);
    if let (Some(a), Some(b)) = (t1_placement, t2_placement) {
        assert_eq!(a.start_byte, b.start_byte, "disjoint-lifetime same-size resources should share the same offset");
    }
}

/// Scenario 4: graphics pass A and compute pass B both UAV-write the same
/// resource with no dependency beyond the write. Admission must reject
/// packing them into one batch.
#[test]
fn uav_cross_queue_same_resource_splits_batches() {
    let mut fg = FrameGraph::new(Settings::default());
    let z = buffer(&mut fg, 1024, false);

    let (uav_a, _) = PassDeclBuilder::new().with_uav(z, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("a_writes_z", uav_a)));

    let (uav_b, _) = PassDeclBuilder::new().with_uav(z, RangeSpec::all()).build();
    fg.add_pass(Box::new(DeclaredPass::new("b_writes_z", uav_b).on_queue(QueueKind::Compute)));

    let compiled = fg.compile_frame(&TestDevice).unwrap();
    assert_eq!(compiled.batches.len(), 2, "conflicting UAV writers on different queues must not share a batch");
}

/// Scenario 5: pass P declares an internal exit transition for R. No
/// batch-level pre/post transition is emitted for R at P; R is recorded in
/// `internally_transitioned_resources`.
#[test]
fn internal_exit_transition_has_no_batch_level_barrier() {
    let mut fg = FrameGraph::new(Settings::default());
    let r = buffer(&mut fg, 1024, false);

    let srv_state = ResourceState::new(Access::SHADER_READ, Layout::ShaderResource, Sync::NONE);
    let (reqs, _) = PassDeclBuilder::new().with_copy_dest(r, RangeSpec::all()).build();
    fg.add_pass(Box::new(
        DeclaredPass::new("p_touches_r", reqs).with_internal(InternalTransition {
            resource_id: r,
            exit_state: srv_state.clone(),
        }),
    ));

    let compiled = fg.compile_frame(&TestDevice).unwrap();
    let batch = &compiled.batches[0];
    assert!(batch.internally_transitioned_resources.contains(&r));

    let resource = fg.resource(r).unwrap();
    let segs = resource.tracker().unwrap().flatten(None, true);
    assert!(segs.iter().all(|s| s.state == srv_state));
}

/// Scenario 6: pass P's immediate work writes R as CopyDest over one range
/// while its retained requirement needs R as SRV over a disjoint-state
/// range on the same resource. Expect the pass to split into an
/// `Immediate`-only entry and a `Retained`-only entry, each scheduled
/// without conflicting transitions.
#[test]
fn split_on_immediate_vs_retained_conflict() {
    struct SplittingPass {
        identifiers: ResourceGroup,
        requirements: Vec<ResourceRequirement>,
        resource_id: u64,
    }
    impl Pass for SplittingPass {
        fn name(&self) -> &str {
            "split_pass"
        }
        fn declared_identifiers(&self) -> &ResourceGroup {
            &self.identifiers
        }
        fn requirements(&self) -> &[ResourceRequirement] {
            &self.requirements
        }
        fn run_mask(&self) -> RunMask {
            RunMask::Both
        }
        fn execute_immediate(&self, recorder: &mut rendergraph::immediate::ImmediateRecorder) {
            recorder
                .clear_render_target_view(
                    self.resource_id,
                    rendergraph::range::SubresourceRange::full(1, 1),
                    (1, 1),
                    [0.0; 4],
                )
                .unwrap();
        }
    }

    let mut fg = FrameGraph::new(Settings::default());
    let r = buffer(&mut fg, 1024, false);
    let (reqs, _) = PassDeclBuilder::new().with_shader_resource(r, RangeSpec::all()).build();

    fg.add_pass(Box::new(SplittingPass {
        identifiers: ResourceGroup::new(),
        requirements: reqs,
        resource_id: r,
    }));

    let compiled = fg.compile_frame(&TestDevice);
    assert!(compiled.is_ok(), "split passes must compile without conflicting transitions: {compiled:?}");
}
