use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rex_map::{Layer, LayerFilter, LayerKind, Map, MapFrame};
use rex_model::{
    ColorLayerModel, ElevationModel, GpuResource, HeightField, PixelFormat, TerrainTileModel,
};
use rex_runtime::{
    ApplyOutcome, EngineContext, FrameStamp, Progress, Request, RequestState, TerrainEngine,
    TileDataRequest,
};
use rex_scene::{GpuCompiler, SafeRef, Scene, TileListener, TileNode};
use rex_tile::TileKey;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Build,
    CancelMidway,
    Retry,
    Nothing,
}

struct MockEngine {
    behavior: Mutex<Behavior>,
    with_elevation: bool,
    calls: AtomicUsize,
}

impl MockEngine {
    fn new(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            with_elevation: true,
            calls: AtomicUsize::new(0),
        }
    }

    fn imagery_only() -> Self {
        Self {
            with_elevation: false,
            ..Self::new(Behavior::Build)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TerrainEngine for MockEngine {
    fn create_tile_model(
        &self,
        frame: &MapFrame,
        key: &TileKey,
        _filter: &LayerFilter,
        progress: Option<&dyn Progress>,
    ) -> Option<TerrainTileModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut model = TerrainTileModel::new(*key, frame.revision());
        if self.with_elevation {
            model.elevation = Some(ElevationModel::new(
                1,
                key,
                HeightField::from_samples(2, 2, vec![0.0, 1.0, 2.0, 3.0]),
            ));
        }
        model.color_layers.push(ColorLayerModel {
            layer: 2,
            name: "imagery".into(),
            opacity: 1.0,
            texture: GpuResource::texture("imagery", 1, 1, PixelFormat::Rgba8, vec![9; 4]),
        });
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::Build => {}
            Behavior::Nothing => return None,
            Behavior::CancelMidway => {
                if let Some(p) = progress {
                    p.cancel();
                    if p.is_canceled() {
                        return None;
                    }
                }
            }
            Behavior::Retry => {
                if let Some(p) = progress {
                    p.set_needs_retry();
                }
            }
        }
        Some(model)
    }
}

#[derive(Default)]
struct RecordingListener {
    merged: Mutex<Vec<TileKey>>,
}

impl TileListener for RecordingListener {
    fn on_tile_merged(&self, key: &TileKey, _model: &TerrainTileModel) {
        self.merged.lock().unwrap().push(*key);
    }
}

#[derive(Default)]
struct CountingCompiler {
    compiled: Vec<u64>,
}

impl GpuCompiler for CountingCompiler {
    fn compile(&mut self, resource: &GpuResource) {
        self.compiled.push(resource.id().0);
    }
}

struct Fixture {
    map: Arc<Map>,
    engine: Arc<MockEngine>,
    ctx: EngineContext,
    scene: Scene,
}

fn fixture(engine: MockEngine) -> Fixture {
    let map = Arc::new(Map::new(
        "test",
        vec![
            Layer::new(1, "dem", LayerKind::Elevation),
            Layer::new(2, "imagery", LayerKind::Image),
        ],
    ));
    let engine = Arc::new(engine);
    let ctx = EngineContext::new(map.clone(), engine.clone());
    Fixture {
        map,
        engine,
        ctx,
        scene: Scene::new(),
    }
}

fn running(req: &TileDataRequest) {
    assert!(req.transition(RequestState::Idle, RequestState::Running));
}

const KEY: TileKey = TileKey::new(3, 5, 2);

#[test]
fn invoke_then_apply_merges_once() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);

    req.invoke();
    assert!(req.has_model());
    assert_eq!(req.model_revision(), Some(fx.map.data_model_revision()));

    let out = req.apply(&fx.ctx, &FrameStamp::new(7, 0.1));
    assert_eq!(out, ApplyOutcome::Merged);
    assert!(!node.is_dirty());
    assert!(!req.has_model());
    assert_eq!(node.merge_count(), 1);
    assert_eq!(req.last_applied_frame(), 7);

    // nothing left to merge
    node.set_dirty(true);
    assert_eq!(req.apply(&fx.ctx, &FrameStamp::new(8, 0.2)), ApplyOutcome::NoData);
    assert!(node.is_dirty());
    assert_eq!(node.merge_count(), 1);
}

#[test]
fn expired_tile_at_invoke_does_nothing() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    drop(node);
    fx.scene.remove(&KEY);

    req.invoke();
    assert_eq!(fx.engine.calls(), 0);
    assert!(!req.has_model());
    assert_eq!(req.state(), RequestState::Running);
}

#[test]
fn expired_engine_at_invoke_does_nothing() {
    let map = Arc::new(Map::new("test", vec![Layer::new(1, "dem", LayerKind::Elevation)]));
    let node = Arc::new(TileNode::new(KEY));
    let engine: Arc<dyn TerrainEngine> = Arc::new(MockEngine::new(Behavior::Build));
    let handle = SafeRef::new(&engine);
    drop(engine);

    let req = TileDataRequest::with_handles(KEY, SafeRef::new(&node), handle, &map);
    running(&req);
    req.invoke();
    assert!(!req.has_model());
    assert_eq!(req.state(), RequestState::Running);
    assert!(node.is_dirty());
}

#[test]
fn dropped_map_invalidates_frame() {
    let fx = fixture(MockEngine::new(Behavior::Build));
    let node = Arc::new(TileNode::new(KEY));
    let engine: Arc<dyn TerrainEngine> = fx.engine.clone();
    let orphan = Arc::new(Map::new("gone", Vec::new()));
    let req = TileDataRequest::with_handles(KEY, SafeRef::new(&node), SafeRef::new(&engine), &orphan);
    drop(orphan);
    running(&req);

    req.invoke();
    assert_eq!(fx.engine.calls(), 0);
    assert!(!req.has_model());
}

#[test]
fn stale_snapshot_is_dropped_without_merging() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    // advance to revision 5
    for enabled in [false, true, false, true] {
        fx.map.set_layer_enabled(2, enabled);
    }
    assert_eq!(fx.map.data_model_revision(), 5);

    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    assert_eq!(req.model_revision(), Some(5));

    fx.map.set_layer_enabled(2, false);
    assert_eq!(fx.map.data_model_revision(), 6);

    assert!(req.create_precompile(&fx.ctx).is_none());
    let out = req.apply(&fx.ctx, &FrameStamp::new(1, 0.0));
    assert_eq!(out, ApplyOutcome::Stale);
    assert!(node.is_dirty());
    assert_eq!(node.merge_count(), 0);
    assert!(!req.has_model());
}

#[test]
fn resync_after_edit_builds_current_revision() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    fx.map.set_layer_enabled(1, false);

    running(&req);
    req.invoke();
    assert_eq!(req.model_revision(), Some(2));
    assert_eq!(req.apply(&fx.ctx, &FrameStamp::default()), ApplyOutcome::Merged);
    assert_eq!(node.surface().revision, 2);
}

#[test]
fn tile_removed_between_invoke_and_apply() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    assert!(req.has_model());

    drop(node);
    assert!(fx.scene.remove(&KEY).is_some());
    assert_eq!(req.apply(&fx.ctx, &FrameStamp::new(2, 0.0)), ApplyOutcome::TileExpired);
    assert!(!req.has_model());
}

#[test]
fn canceled_mid_build_goes_idle() {
    let mut fx = fixture(MockEngine::new(Behavior::CancelMidway));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    assert_eq!(req.state(), RequestState::Idle);
    assert!(!req.has_model());
    assert!(node.is_dirty());
}

#[test]
fn retry_flag_discards_partial_result() {
    let mut fx = fixture(MockEngine::new(Behavior::Retry));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    assert_eq!(req.state(), RequestState::Idle);
    assert!(!req.has_model());

    // the source recovers; the next attempt succeeds
    *fx.engine.behavior.lock().unwrap() = Behavior::Build;
    running(&req);
    req.invoke();
    assert!(req.has_model());
    assert_eq!(req.state(), RequestState::Running);
}

#[test]
fn request_going_idle_cancels_the_build() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    // never marked running: the token reports canceled on first poll
    req.invoke();
    assert!(!req.has_model());
    assert_eq!(req.state(), RequestState::Idle);
}

#[test]
fn mandatory_request_ignores_cancel_and_retry() {
    let mut fx = fixture(MockEngine::new(Behavior::Retry));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx).with_cancel(false);
    assert!(!req.enable_cancel());
    running(&req);
    req.invoke();
    assert!(req.has_model());
    assert_eq!(req.state(), RequestState::Running);
}

#[test]
fn engine_returning_nothing_leaves_no_snapshot() {
    let mut fx = fixture(MockEngine::new(Behavior::Nothing));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    assert_eq!(fx.engine.calls(), 1);
    assert!(!req.has_model());
    assert_eq!(req.apply(&fx.ctx, &FrameStamp::default()), ApplyOutcome::NoData);
    assert!(node.is_dirty());
}

#[test]
fn precompile_visits_each_resource_once() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    assert!(req.create_precompile(&fx.ctx).is_none());

    running(&req);
    req.invoke();
    let adapter = req.create_precompile(&fx.ctx).expect("current snapshot");
    assert_eq!(adapter.key(), KEY);
    let mut compiler = CountingCompiler::default();
    adapter.accept(&mut compiler);
    assert_eq!(compiler.compiled.len(), 2);
    compiler.compiled.sort();
    compiler.compiled.dedup();
    assert_eq!(compiler.compiled.len(), 2);

    // precompiling does not consume the snapshot
    assert!(req.has_model());
    assert_eq!(req.apply(&fx.ctx, &FrameStamp::default()), ApplyOutcome::Merged);
}

#[test]
fn listener_hears_only_elevation_merges() {
    let listener = Arc::new(RecordingListener::default());

    let mut fx = fixture(MockEngine::new(Behavior::Build));
    fx.ctx.add_listener(listener.clone());
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    req.apply(&fx.ctx, &FrameStamp::default());
    assert_eq!(*listener.merged.lock().unwrap(), vec![KEY]);

    let mut flat = fixture(MockEngine::imagery_only());
    flat.ctx.add_listener(listener.clone());
    let other = TileKey::new(3, 4, 2);
    let node = flat.scene.insert(other);
    let req = TileDataRequest::new(&node, &flat.ctx);
    running(&req);
    req.invoke();
    assert_eq!(req.apply(&flat.ctx, &FrameStamp::default()), ApplyOutcome::Merged);
    assert!(!node.is_dirty());
    assert_eq!(listener.merged.lock().unwrap().len(), 1);
}

#[test]
fn discard_drops_snapshot() {
    let mut fx = fixture(MockEngine::new(Behavior::Build));
    let node = fx.scene.insert(KEY);
    let req = TileDataRequest::new(&node, &fx.ctx);
    running(&req);
    req.invoke();
    req.discard();
    assert!(!req.has_model());
    assert!(req.create_precompile(&fx.ctx).is_none());
}
