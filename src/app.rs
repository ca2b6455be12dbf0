use std::error::Error;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use rex_engine::ProceduralEngine;
use rex_geom::Vec2;
use rex_map::{LayerKind, Map};
use rex_model::TerrainTileModel;
use rex_runtime::{
    EngineContext, FrameStamp, Loader, Request, RequestState, TileDataRequest, UpdateReport,
};
use rex_scene::{GpuCompiler, Scene, TileListener};
use rex_tile::TileKey;

use crate::compiler::CountingCompiler;
use crate::config::PagerConfig;
use crate::event::{Event, EventQueue, MapChangeCause};
use crate::watcher::MapWatcher;

/// Forwards elevation merges from the update step into the event queue.
struct MergeForwarder {
    tx: Sender<(TileKey, u64)>,
}

impl TileListener for MergeForwarder {
    fn on_tile_merged(&self, key: &TileKey, model: &TerrainTileModel) {
        let _ = self.tx.send((*key, model.revision()));
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PagerStats {
    pub frames: u64,
    pub submitted: u64,
    pub resubmitted: u64,
    pub canceled: u64,
    pub merged: u64,
    pub stale: u64,
    pub expired: u64,
    pub discarded: u64,
    pub empty: u64,
    pub elevation_merges: u64,
    pub map_changes: u64,
}

impl PagerStats {
    fn absorb(&mut self, r: &UpdateReport) {
        self.merged += r.merged as u64;
        self.stale += r.stale as u64;
        self.expired += r.tile_expired as u64;
        self.discarded += r.discarded as u64;
        self.empty += r.no_data as u64;
    }
}

/// Headless paging loop: moves a camera, keeps the tiles around it loaded,
/// and merges finished requests once per frame.
pub struct Pager {
    cfg: PagerConfig,
    map: Arc<Map>,
    engine: Arc<ProceduralEngine>,
    ctx: EngineContext,
    scene: Scene,
    loader: Loader,
    requests: HashMap<TileKey, Arc<TileDataRequest>>,
    roots: HashSet<TileKey>,
    queue: EventQueue,
    compiler: CountingCompiler,
    merged_rx: Receiver<(TileKey, u64)>,
    watcher: Option<MapWatcher>,
    edit_at_frame: Option<u64>,
    camera: Vec2,
    center: Option<TileKey>,
    frame: u64,
    started: Instant,
    pub stats: PagerStats,
}

impl Pager {
    pub fn new(cfg: PagerConfig, map: Arc<Map>) -> Result<Self, Box<dyn Error>> {
        cfg.validate()?;
        let engine = Arc::new(ProceduralEngine::new(cfg.engine_config()));
        let (tx, merged_rx) = mpsc::channel();
        let mut ctx = EngineContext::new(map.clone(), engine.clone());
        ctx.add_listener(Arc::new(MergeForwarder { tx }));
        let loader = Loader::new(&cfg.loader_config())?;
        let camera = cfg.camera_start();
        Ok(Self {
            cfg,
            map,
            engine,
            ctx,
            scene: Scene::new(),
            loader,
            requests: HashMap::new(),
            roots: HashSet::new(),
            queue: EventQueue::new(),
            compiler: CountingCompiler::new(),
            merged_rx,
            watcher: None,
            edit_at_frame: None,
            camera,
            center: None,
            frame: 0,
            started: Instant::now(),
            stats: PagerStats::default(),
        })
    }

    pub fn with_watcher(mut self, watcher: MapWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    /// Toggles the last image layer when `frame` is reached.
    pub fn with_edit_at_frame(mut self, frame: Option<u64>) -> Self {
        self.edit_at_frame = frame;
        self
    }

    pub fn run(&mut self) {
        if self.cfg.view.keep_roots {
            self.load_roots();
        }
        let budget = Duration::from_millis(self.cfg.frame_ms);
        for _ in 0..self.cfg.frames {
            let t0 = Instant::now();
            self.step();
            let spent = t0.elapsed();
            if spent < budget {
                thread::sleep(budget - spent);
            }
        }
        self.log_summary();
    }

    /// Root tiles ride the mandatory lane and stay for the whole run.
    pub fn load_roots(&mut self) {
        for x in 0..2 {
            let key = TileKey::new(0, x, 0);
            let node = self.scene.insert(key);
            let req = Arc::new(TileDataRequest::new(&node, &self.ctx).with_cancel(false));
            if self.loader.submit(req.clone()) {
                self.stats.submitted += 1;
            }
            self.requests.insert(key, req);
            self.roots.insert(key);
        }
    }

    pub fn step(&mut self) {
        self.frame += 1;
        self.stats.frames += 1;

        if let Some(w) = &self.watcher {
            if let Some(revision) = w.poll(&self.map) {
                self.queue.emit_now(Event::MapChanged {
                    revision,
                    cause: MapChangeCause::HotReload,
                });
            }
        }
        if self.edit_at_frame == Some(self.frame) {
            self.scripted_edit();
        }
        for (key, revision) in self.merged_rx.try_iter() {
            self.queue.emit_now(Event::TileMerged { key, revision });
        }
        self.move_camera();

        while let Some(env) = self.queue.pop_ready() {
            log::trace!(target: "events", "#{} @{} {:?}", env.id, env.tick, env.kind);
            self.handle_event(env.kind);
        }

        self.requeue_dirty();

        let stamp = FrameStamp::new(self.frame, self.started.elapsed().as_secs_f64());
        let compiler = self
            .cfg
            .loader
            .precompile
            .then_some(&mut self.compiler as &mut dyn GpuCompiler);
        let report = self.loader.update(&self.ctx, &stamp, compiler);
        self.stats.absorb(&report);
        self.queue.advance_tick();
    }

    fn move_camera(&mut self) {
        let v = self.cfg.camera_velocity();
        let mut lon = self.camera.x + v.x;
        // wrap longitude into [-180, 180)
        lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
        let lat = (self.camera.y + v.y).clamp(-89.999, 89.999);
        self.camera = Vec2::new(lon, lat);

        let Some(center) = TileKey::containing(self.cfg.view.lod, self.camera) else {
            return;
        };
        if self.center != Some(center) {
            self.center = Some(center);
            self.queue.emit_now(Event::ViewCenterChanged { center });
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::ViewCenterChanged { center } => self.handle_view_center_changed(center),
            Event::EnsureTileLoaded { key } => self.handle_ensure_tile_loaded(key),
            Event::EnsureTileUnloaded { key } => self.handle_ensure_tile_unloaded(key),
            Event::MapChanged { revision, cause } => {
                self.stats.map_changes += 1;
                log::info!(
                    target: "events",
                    "map changed ({:?}) -> rev {}; {} tiles dirty",
                    cause,
                    revision,
                    self.scene.len()
                );
                for key in self.scene.keys().collect::<Vec<_>>() {
                    if let Some(node) = self.scene.get(&key) {
                        node.set_dirty(true);
                    }
                }
            }
            Event::TileMerged { key, revision } => {
                self.stats.elevation_merges += 1;
                log::trace!(target: "events", "tile {} merged at rev {}", key, revision);
            }
        }
    }

    fn handle_view_center_changed(&mut self, center: TileKey) {
        let desired: HashSet<TileKey> = ring_keys(center, self.cfg.view.radius)
            .into_iter()
            .collect();
        log::debug!(
            target: "events",
            "view center {} ({} tiles wanted)",
            center,
            desired.len()
        );
        for key in self.scene.keys().collect::<Vec<_>>() {
            if !self.roots.contains(&key) && !desired.contains(&key) {
                self.queue.emit_now(Event::EnsureTileUnloaded { key });
            }
        }
        for key in desired {
            if !self.scene.contains(&key) {
                self.queue.emit_now(Event::EnsureTileLoaded { key });
            }
        }
    }

    fn handle_ensure_tile_loaded(&mut self, key: TileKey) {
        if self.scene.contains(&key) {
            return;
        }
        let node = self.scene.insert(key);
        let req = Arc::new(TileDataRequest::new(&node, &self.ctx));
        req.set_priority(self.priority_of(&key));
        if self.loader.submit(req.clone()) {
            self.stats.submitted += 1;
        }
        self.requests.insert(key, req);
    }

    fn handle_ensure_tile_unloaded(&mut self, key: TileKey) {
        if let Some(req) = self.requests.remove(&key) {
            if !req.is_idle() {
                self.stats.canceled += 1;
            }
            let req: Arc<dyn Request> = req;
            self.loader.cancel(&req);
        }
        self.scene.remove(&key);
    }

    /// Dirty tiles whose request went idle (retry, cancel or stale drop)
    /// are issued again.
    fn requeue_dirty(&mut self) {
        for key in self.scene.dirty_keys() {
            let Some(req) = self.requests.get(&key) else {
                continue;
            };
            if req.state() != RequestState::Idle {
                continue;
            }
            req.set_priority(self.priority_of(&key));
            if self.loader.submit(req.clone()) {
                self.stats.resubmitted += 1;
            }
        }
    }

    /// Tiles nearer the view center load first.
    fn priority_of(&self, key: &TileKey) -> f32 {
        match self.center {
            Some(center) => -(center.ring_distance(key) as f32),
            None => 0.0,
        }
    }

    fn scripted_edit(&mut self) {
        let layers = self.map.layers();
        let Some(layer) = layers
            .layers
            .iter()
            .rev()
            .find(|l| l.kind == LayerKind::Image)
        else {
            log::warn!("edit at frame {}: map has no image layer", self.frame);
            return;
        };
        let enabled = !layer.enabled;
        if self.map.set_layer_enabled(layer.uid, enabled) {
            let revision = self.map.data_model_revision();
            log::info!(
                "edit at frame {}: layer {} enabled={}",
                self.frame,
                layer.name,
                enabled
            );
            self.queue.emit_now(Event::MapChanged {
                revision,
                cause: MapChangeCause::ScriptedEdit,
            });
        }
    }

    pub fn log_summary(&self) {
        let s = &self.stats;
        let e = self.engine.stats();
        let c = self.engine.cache().stats();
        let l = self.loader.stats();
        log::info!(
            "pager: frames={} tiles={} submitted={} resubmitted={} canceled={} map_changes={}",
            s.frames,
            self.scene.len(),
            s.submitted,
            s.resubmitted,
            s.canceled,
            s.map_changes
        );
        log::info!(
            "merge: merged={} stale={} expired={} discarded={} empty={} elevation_events={}",
            s.merged,
            s.stale,
            s.expired,
            s.discarded,
            s.empty,
            s.elevation_merges
        );
        log::info!(
            "engine: models={} empty={} retries={} canceled={} cache hits={} misses={} evictions={}",
            e.models,
            e.empty,
            e.retries,
            e.canceled,
            c.hits,
            c.misses,
            c.evictions
        );
        log::info!(
            "gpu: uploads={} bytes={} duplicates={}; loader skipped={} backlog={} events pending={}",
            self.compiler.uploads(),
            self.compiler.bytes(),
            self.compiler.duplicates(),
            l.skipped,
            l.awaiting_merge,
            self.queue.pending()
        );
    }
}

/// Keys within `radius` rings of `center` on its level. Longitude wraps;
/// rows stop at the poles.
pub fn ring_keys(center: TileKey, radius: u32) -> Vec<TileKey> {
    let (w, h) = TileKey::tiles_at(center.lod);
    let r = i64::from(radius);
    let mut out = Vec::new();
    for dy in -r..=r {
        let y = i64::from(center.y) + dy;
        if y < 0 || y >= i64::from(h) {
            continue;
        }
        for dx in -r..=r {
            let x = (i64::from(center.x) + dx).rem_euclid(i64::from(w));
            out.push(TileKey::new(center.lod, x as u32, y as u32));
        }
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rex_map::Layer;

    #[test]
    fn rings_wrap_and_stop_at_poles() {
        let keys = ring_keys(TileKey::new(2, 0, 0), 1);
        // rows 0..=1 (no row -1), columns 7, 0, 1
        assert_eq!(keys.len(), 6);
        assert!(keys.contains(&TileKey::new(2, 7, 1)));
        // radius larger than the level collapses to every tile once
        assert_eq!(ring_keys(TileKey::new(0, 0, 0), 3).len(), 2);
    }

    fn pager_with(layers: Vec<Layer>) -> Pager {
        let mut cfg = PagerConfig::default();
        cfg.frame_ms = 0;
        cfg.view.lod = 3;
        cfg.view.radius = 1;
        cfg.loader.background_workers = 2;
        cfg.engine.tile_size = 5;
        Pager::new(cfg, Arc::new(Map::new("t", layers))).unwrap()
    }

    fn test_pager() -> Pager {
        pager_with(vec![
            Layer::new(1, "dem", LayerKind::Elevation),
            Layer::new(2, "imagery", LayerKind::Image),
        ])
    }

    fn settle(p: &mut Pager) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            p.step();
            if p.scene.dirty_keys().is_empty() && p.loader.is_quiet() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn pages_in_tiles_around_camera() {
        let mut p = test_pager();
        p.cfg.view.velocity = [0.0, 0.0];
        p.load_roots();
        settle(&mut p);
        // 3x3 ring plus two roots
        assert_eq!(p.scene.len(), 11);
        assert!(p.scene.dirty_keys().is_empty());
        assert_eq!(p.stats.merged, 11);
        assert_eq!(p.compiler.uploads(), 22);
        assert_eq!(p.compiler.duplicates(), 0);
    }

    #[test]
    fn scripted_edit_reloads_every_tile() {
        let mut p = test_pager();
        p.cfg.view.velocity = [0.0, 0.0];
        settle(&mut p);
        let before = p.stats.merged;
        assert_eq!(before, 9);

        p.edit_at_frame = Some(p.frame + 1);
        settle(&mut p);
        assert_eq!(p.map.data_model_revision(), 2);
        assert_eq!(p.stats.map_changes, 1);
        assert_eq!(p.stats.merged, before + 9);
        for key in p.scene.keys() {
            let node = p.scene.get(&key).unwrap();
            assert_eq!(node.surface().revision, 2);
        }
    }

    #[test]
    fn uncovered_tiles_settle_without_data() {
        let mut p = pager_with(vec![
            Layer::new(1, "dem", LayerKind::Elevation).with_lod_range(0, 1),
            Layer::new(2, "imagery", LayerKind::Image).with_lod_range(0, 1),
        ]);
        p.cfg.view.velocity = [0.0, 0.0];
        settle(&mut p);
        assert!(p.scene.dirty_keys().is_empty());
        assert_eq!(p.stats.merged, 9);

        for _ in 0..20 {
            p.step();
        }
        assert_eq!(p.stats.submitted, 9);
        assert_eq!(p.stats.resubmitted, 0);
        assert_eq!(p.engine.stats().empty, 9);
        for key in p.scene.keys() {
            let surface = p.scene.get(&key).unwrap().surface();
            assert!(surface.elevation.is_none());
            assert!(surface.color.is_empty());
            assert_eq!(surface.revision, 1);
        }
    }

    #[test]
    fn moving_camera_unloads_trailing_tiles() {
        let mut p = test_pager();
        // one lod-3 tile (22.5 degrees) per frame eastwards
        p.cfg.view.velocity = [22.5, 0.0];
        for _ in 0..4 {
            p.step();
        }
        assert_eq!(p.scene.len(), 9);
        assert!(p.stats.submitted > 9);
        let center = p.center.unwrap();
        for key in p.scene.keys() {
            assert!(ring_keys(center, 1).contains(&key));
        }
    }
}
