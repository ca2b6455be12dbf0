use std::sync::Arc;

use rex_map::{LayerFilter, Map, MapFrame};
use rex_model::{RenderBindings, TerrainTileModel};
use rex_scene::{SafeRef, TileListener};
use rex_tile::TileKey;

use crate::progress::Progress;

/// Builds tile data models. Called from worker threads; may block for as
/// long as its sources take, polling `progress` between steps.
pub trait TerrainEngine: Send + Sync {
    /// Returns a model tagged with `frame.revision()`, empty when no layer
    /// applies to the tile. `None` means the build was abandoned.
    fn create_tile_model(
        &self,
        frame: &MapFrame,
        key: &TileKey,
        filter: &LayerFilter,
        progress: Option<&dyn Progress>,
    ) -> Option<TerrainTileModel>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameStamp {
    pub frame_number: u64,
    pub reference_time: f64,
}

impl FrameStamp {
    pub fn new(frame_number: u64, reference_time: f64) -> Self {
        Self {
            frame_number,
            reference_time,
        }
    }
}

/// Render-thread state shared by every request of one terrain engine.
/// Only the update step receives it; background code never touches it.
pub struct EngineContext {
    map: Arc<Map>,
    engine: Arc<dyn TerrainEngine>,
    bindings: RenderBindings,
    listeners: Vec<Arc<dyn TileListener>>,
}

impl EngineContext {
    pub fn new(map: Arc<Map>, engine: Arc<dyn TerrainEngine>) -> Self {
        Self {
            map,
            engine,
            bindings: RenderBindings::default(),
            listeners: Vec::new(),
        }
    }

    pub fn with_bindings(mut self, bindings: RenderBindings) -> Self {
        self.bindings = bindings;
        self
    }

    #[inline]
    pub fn map(&self) -> &Arc<Map> {
        &self.map
    }

    #[inline]
    pub fn engine(&self) -> SafeRef<dyn TerrainEngine> {
        SafeRef::new(&self.engine)
    }

    #[inline]
    pub fn render_bindings(&self) -> &RenderBindings {
        &self.bindings
    }

    pub fn add_listener(&mut self, listener: Arc<dyn TileListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn notify_tile_merged(&self, model: &TerrainTileModel) {
        let key = model.key();
        for l in &self.listeners {
            l.on_tile_merged(&key, model);
        }
    }
}
