use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use rex_map::{Layer, LayerFilter, LayerKind, LayerUid, MapFrame, SourceParams};
use rex_model::{
    ColorLayerModel, ElevationModel, GpuResource, HeightField, PixelFormat, TerrainTileModel,
};
use rex_runtime::{Progress, TerrainEngine};
use rex_tile::TileKey;

use crate::heightfield_cache::{CachedHeights, HeightfieldCache};
use crate::sampler_pool::SamplerPool;

const LATENCY_SLICE: Duration = Duration::from_millis(5);

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Samples per tile edge. Neighbours share their edge samples.
    pub tile_size: usize,
    pub cache_capacity: usize,
    pub max_samplers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tile_size: 17,
            cache_capacity: 256,
            max_samplers: 8,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub models: u64,
    pub empty: u64,
    pub canceled: u64,
    pub retries: u64,
}

enum Fetch<T> {
    Ready(T),
    Canceled,
    Failed,
}

/// Synthesises elevation and imagery from noise. Stands in for real tile
/// sources: `latency_ms` sleeps (cancelable) and `fail_every` injects
/// transient failures.
pub struct ProceduralEngine {
    cfg: EngineConfig,
    samplers: SamplerPool,
    cache: HeightfieldCache,
    attempts: Mutex<HashMap<LayerUid, u32>>,
    models: AtomicU64,
    empty: AtomicU64,
    canceled: AtomicU64,
    retries: AtomicU64,
}

impl ProceduralEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let samplers = SamplerPool::new(cfg.max_samplers);
        let cache = HeightfieldCache::new(cfg.cache_capacity);
        Self {
            cfg,
            samplers,
            cache,
            attempts: Mutex::new(HashMap::new()),
            models: AtomicU64::new(0),
            empty: AtomicU64::new(0),
            canceled: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            models: self.models.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            canceled: self.canceled.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn cache(&self) -> &HeightfieldCache {
        &self.cache
    }

    /// Simulated source round trip. `Failed` on every `fail_every`-th call
    /// for the layer.
    fn fetch(&self, layer: &Layer, progress: Option<&dyn Progress>) -> Fetch<()> {
        let src = &layer.source;
        if src.latency_ms > 0 {
            let until = Instant::now() + Duration::from_millis(u64::from(src.latency_ms));
            loop {
                if is_canceled(progress) {
                    return Fetch::Canceled;
                }
                let now = Instant::now();
                if now >= until {
                    break;
                }
                thread::sleep(LATENCY_SLICE.min(until - now));
            }
        }
        if src.fail_every > 0 {
            let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
            let n = attempts.entry(layer.uid).or_insert(0);
            *n += 1;
            if *n % src.fail_every == 0 {
                return Fetch::Failed;
            }
        }
        Fetch::Ready(())
    }

    /// Samples the noise over the tile extent, one row at a time.
    fn sample_heights(
        &self,
        key: &TileKey,
        params: &SourceParams,
        progress: Option<&dyn Progress>,
    ) -> Option<HeightField> {
        let n = self.cfg.tile_size.max(2);
        let extent = key.extent();
        let step = 1.0 / (n - 1) as f64;
        let sampler = self.samplers.acquire(params);
        let mut hf = HeightField::new(n, n);
        for row in 0..n {
            if is_canceled(progress) {
                return None;
            }
            // row 0 is the north edge
            let v = 1.0 - row as f64 * step;
            for col in 0..n {
                let p = extent.lerp(col as f64 * step, v);
                let h = sampler.sample(p.x, p.y) * params.amplitude;
                hf.set(col, row, h);
            }
        }
        Some(hf)
    }

    fn build_elevation(
        &self,
        frame: &MapFrame,
        key: &TileKey,
        layer: &Layer,
        progress: Option<&dyn Progress>,
    ) -> Fetch<HeightField> {
        if let Some(hit) = self.cache.get(*key, layer.uid, frame.revision()) {
            return Fetch::Ready(hit.heights.clone());
        }
        match self.fetch(layer, progress) {
            Fetch::Ready(()) => {}
            Fetch::Canceled => return Fetch::Canceled,
            Fetch::Failed => return Fetch::Failed,
        }
        let Some(heights) = self.sample_heights(key, &layer.source, progress) else {
            return Fetch::Canceled;
        };
        self.cache.insert(Arc::new(CachedHeights {
            key: *key,
            layer: layer.uid,
            revision: frame.revision(),
            heights: heights.clone(),
        }));
        Fetch::Ready(heights)
    }

    fn build_imagery(
        &self,
        key: &TileKey,
        layer: &Layer,
        terrain: Option<&HeightField>,
        progress: Option<&dyn Progress>,
    ) -> Fetch<ColorLayerModel> {
        match self.fetch(layer, progress) {
            Fetch::Ready(()) => {}
            Fetch::Canceled => return Fetch::Canceled,
            Fetch::Failed => return Fetch::Failed,
        }
        // imagery without terrain is shaded from the layer's own noise
        let own;
        let heights = match terrain {
            Some(hf) => hf,
            None => match self.sample_heights(key, &layer.source, progress) {
                Some(hf) => {
                    own = hf;
                    &own
                }
                None => return Fetch::Canceled,
            },
        };
        let pixels = shade(heights, layer.source.seed);
        let texture = GpuResource::texture(
            format!("{} {}", layer.name, key),
            heights.width as u32,
            heights.height as u32,
            PixelFormat::Rgba8,
            pixels,
        );
        Fetch::Ready(ColorLayerModel {
            layer: layer.uid,
            name: layer.name.clone(),
            opacity: layer.opacity,
            texture,
        })
    }

    fn fail(&self, key: &TileKey, layer: &Layer, progress: Option<&dyn Progress>) {
        match progress {
            Some(p) => {
                p.set_needs_retry();
                p.set_message(&format!("layer {} unavailable", layer.name));
                self.retries.fetch_add(1, Ordering::Relaxed);
            }
            None => log::warn!(
                target: "engine",
                "tile {}: layer {} failed with nobody to retry; skipped",
                key,
                layer.name
            ),
        }
    }
}

impl Default for ProceduralEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[inline]
fn is_canceled(progress: Option<&dyn Progress>) -> bool {
    progress.is_some_and(|p| p.is_canceled())
}

/// Hypsometric tint with a simple slope shade, RGBA8.
fn shade(hf: &HeightField, seed: i32) -> Vec<u8> {
    let (lo, hi) = hf.range().unwrap_or((0.0, 0.0));
    let span = (hi - lo).max(f32::EPSILON);
    let tint = (seed.rem_euclid(32)) as u8;
    let mut out = Vec::with_capacity(hf.width * hf.height * 4);
    for y in 0..hf.height {
        for x in 0..hf.width {
            let h = hf.samples[hf.idx(x, y)];
            let east = hf.get(x + 1, y).unwrap_or(h);
            let light = (0.75 + (h - east) / span).clamp(0.3, 1.0);
            let t = (h - lo) / span;
            let (r, g, b) = if h < 0.0 {
                (20.0, 60.0 + 80.0 * t, 140.0 + 80.0 * t)
            } else if t < 0.6 {
                (60.0 + 120.0 * t, 140.0 + 60.0 * t, 60.0)
            } else {
                (170.0 + 80.0 * t, 170.0 + 80.0 * t, 160.0 + 90.0 * t)
            };
            out.push((r * light) as u8 ^ tint);
            out.push((g * light) as u8);
            out.push((b * light) as u8);
            out.push(255);
        }
    }
    out
}

impl TerrainEngine for ProceduralEngine {
    fn create_tile_model(
        &self,
        frame: &MapFrame,
        key: &TileKey,
        filter: &LayerFilter,
        progress: Option<&dyn Progress>,
    ) -> Option<TerrainTileModel> {
        let mut model = TerrainTileModel::new(*key, frame.revision());

        let dem = frame
            .layers_of(LayerKind::Elevation)
            .find(|l| l.covers(key.lod) && filter.accepts(l));
        let mut terrain = None;
        if let Some(layer) = dem {
            match self.build_elevation(frame, key, layer, progress) {
                Fetch::Ready(hf) => terrain = Some(hf),
                Fetch::Failed => self.fail(key, layer, progress),
                Fetch::Canceled => {
                    self.canceled.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        for layer in frame
            .layers_of(LayerKind::Image)
            .filter(|l| l.covers(key.lod) && filter.accepts(l))
        {
            match self.build_imagery(key, layer, terrain.as_ref(), progress) {
                Fetch::Ready(c) => model.color_layers.push(c),
                Fetch::Failed => self.fail(key, layer, progress),
                Fetch::Canceled => {
                    self.canceled.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        if let (Some(layer), Some(hf)) = (dem, terrain) {
            model.elevation = Some(ElevationModel::new(layer.uid, key, hf));
        }

        // An empty model still clears the tile's dirty flag once merged.
        if model.is_empty() {
            self.empty.fetch_add(1, Ordering::Relaxed);
            log::trace!(target: "engine", "tile {} rev {}: no layers", key, frame.revision());
            return Some(model);
        }
        self.models.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            target: "engine",
            "tile {} rev {}: {} resources, {} bytes",
            key,
            frame.revision(),
            model.resource_count(),
            model.byte_len()
        );
        Some(model)
    }
}
