use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rex_map::{LayerFilter, Map, MapFrame};
use rex_model::TerrainTileModel;
use rex_scene::{PrecompileAdapter, SafeRef, TileNode};
use rex_tile::TileKey;

use crate::engine::{EngineContext, FrameStamp, TerrainEngine};
use crate::progress::{Progress, RequestProgress};
use crate::state::{RequestState, StateCell};

/// What a merge attempt did with its snapshot. None of these are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApplyOutcome {
    /// No snapshot was waiting.
    NoData,
    /// Built against an older map revision; dropped.
    Stale,
    /// The target tile left the scene; dropped.
    TileExpired,
    Merged,
}

/// A unit of paged work: built off-thread by `invoke`, merged on the
/// render thread by `apply`.
pub trait Request: Send + Sync {
    fn key(&self) -> TileKey;
    fn name(&self) -> &str;
    fn state(&self) -> RequestState;
    fn set_state(&self, state: RequestState);
    /// Atomic `from -> to`; false if the state was not `from`.
    fn transition(&self, from: RequestState, to: RequestState) -> bool;
    fn priority(&self) -> f32;
    fn enable_cancel(&self) -> bool;
    fn invoke(&self);
    fn apply(&self, ctx: &EngineContext, stamp: &FrameStamp) -> ApplyOutcome;
    fn create_precompile(&self, ctx: &EngineContext) -> Option<PrecompileAdapter>;
    /// Drops any built-but-unmerged result.
    fn discard(&self);

    #[inline]
    fn is_idle(&self) -> bool {
        self.state() == RequestState::Idle
    }
}

/// Loads all data for one tile and merges it into the tile's node.
pub struct TileDataRequest {
    key: TileKey,
    name: String,
    tile: SafeRef<TileNode>,
    engine: SafeRef<dyn TerrainEngine>,
    frame: Mutex<MapFrame>,
    filter: LayerFilter,
    enable_cancel: bool,
    priority: AtomicU32,
    state: StateCell,
    model: Mutex<Option<Arc<TerrainTileModel>>>,
    last_frame: AtomicU64,
}

impl TileDataRequest {
    pub fn new(tile: &Arc<TileNode>, ctx: &EngineContext) -> Self {
        Self::with_handles(tile.key(), SafeRef::new(tile), ctx.engine(), ctx.map())
    }

    pub fn with_handles(
        key: TileKey,
        tile: SafeRef<TileNode>,
        engine: SafeRef<dyn TerrainEngine>,
        map: &Arc<Map>,
    ) -> Self {
        Self {
            key,
            name: key.to_string(),
            tile,
            engine,
            frame: Mutex::new(MapFrame::new(map)),
            filter: LayerFilter::all(),
            enable_cancel: true,
            priority: AtomicU32::new(0f32.to_bits()),
            state: StateCell::new(RequestState::Idle),
            model: Mutex::new(None),
            last_frame: AtomicU64::new(0),
        }
    }

    pub fn with_filter(mut self, filter: LayerFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Mandatory loads (e.g. root tiles) run to completion regardless of state.
    pub fn with_cancel(mut self, enable: bool) -> Self {
        self.enable_cancel = enable;
        self
    }

    pub fn set_priority(&self, priority: f32) {
        self.priority.store(priority.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn filter(&self) -> &LayerFilter {
        &self.filter
    }

    #[inline]
    pub fn has_model(&self) -> bool {
        self.model_slot().is_some()
    }

    /// Revision of the snapshot waiting to be merged.
    pub fn model_revision(&self) -> Option<u64> {
        self.model_slot().as_ref().map(|m| m.revision())
    }

    /// Frame number of the last `apply` that found a snapshot (0 if none yet).
    #[inline]
    pub fn last_applied_frame(&self) -> u64 {
        self.last_frame.load(Ordering::Relaxed)
    }

    fn model_slot(&self) -> MutexGuard<'_, Option<Arc<TerrainTileModel>>> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Request for TileDataRequest {
    #[inline]
    fn key(&self) -> TileKey {
        self.key
    }

    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn state(&self) -> RequestState {
        self.state.load()
    }

    #[inline]
    fn set_state(&self, state: RequestState) {
        self.state.store(state);
    }

    #[inline]
    fn transition(&self, from: RequestState, to: RequestState) -> bool {
        self.state.transition(from, to)
    }

    #[inline]
    fn priority(&self) -> f32 {
        f32::from_bits(self.priority.load(Ordering::Relaxed))
    }

    #[inline]
    fn enable_cancel(&self) -> bool {
        self.enable_cancel
    }

    // Worker thread. Scene objects are reached only through weak handles.
    fn invoke(&self) {
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        if !frame.is_valid() {
            log::debug!("request {}: map is gone", self.name);
            return;
        }
        let Some(tile) = self.tile.lock() else {
            log::debug!("request {}: tile expired before load", self.name);
            return;
        };
        let Some(engine) = self.engine.lock() else {
            log::debug!("request {}: engine expired before load", self.name);
            return;
        };

        if frame.needs_sync() {
            frame.sync();
        }

        let progress = self
            .enable_cancel
            .then(|| RequestProgress::new(&self.state));

        let model = engine.create_tile_model(
            &frame,
            &tile.key(),
            &self.filter,
            progress.as_ref().map(|p| p as &dyn Progress),
        );
        drop(tile);
        drop(engine);

        if let Some(p) = &progress {
            if p.is_canceled() || p.needs_retry() {
                log::debug!(
                    "request {}: {} (rev {})",
                    self.name,
                    if p.needs_retry() { "needs retry" } else { "canceled" },
                    frame.revision()
                );
                *self.model_slot() = None;
                self.state.store(RequestState::Idle);
                return;
            }
        }

        // Mandatory builds have no token; a cancel only shows up here.
        if self.state.load() == RequestState::Idle {
            log::debug!("request {}: canceled during build, result dropped", self.name);
            *self.model_slot() = None;
            return;
        }

        *self.model_slot() = model.map(Arc::new);
    }

    // Render thread.
    fn apply(&self, ctx: &EngineContext, stamp: &FrameStamp) -> ApplyOutcome {
        let Some(model) = self.model_slot().take() else {
            return ApplyOutcome::NoData;
        };
        self.last_frame.store(stamp.frame_number, Ordering::Relaxed);

        let live = ctx.map().data_model_revision();
        if model.revision() != live {
            log::info!(
                "apply {} ignored: built at rev {}, map is at rev {}",
                self.name,
                model.revision(),
                live
            );
            return ApplyOutcome::Stale;
        }

        let Some(tile) = self.tile.lock() else {
            log::debug!("apply {} failed; tile node disappeared", self.name);
            return ApplyOutcome::TileExpired;
        };

        tile.merge(&model, ctx.render_bindings());
        tile.set_dirty(false);
        if model.has_elevation() {
            ctx.notify_tile_merged(&model);
        }
        log::debug!("apply {} rev={} frame={}", self.name, live, stamp.frame_number);
        ApplyOutcome::Merged
    }

    fn create_precompile(&self, ctx: &EngineContext) -> Option<PrecompileAdapter> {
        let slot = self.model_slot();
        let model = slot.as_ref()?;
        if model.revision() != ctx.map().data_model_revision() {
            return None;
        }
        Some(PrecompileAdapter::new(Arc::clone(model)))
    }

    fn discard(&self) {
        self.model_slot().take();
    }
}
