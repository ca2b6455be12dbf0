use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock};

use rex_model::{BindingUsage, GpuResource, RenderBindings, TerrainTileModel};
use rex_tile::TileKey;

#[derive(Clone, Debug)]
pub struct BoundTexture {
    pub unit: u32,
    pub sampler: String,
    pub layer: u32,
    pub resource: GpuResource,
}

/// Renderable content of a tile, replaced piecewise by merges.
#[derive(Clone, Debug, Default)]
pub struct TileSurface {
    pub revision: u64,
    pub elevation: Option<BoundTexture>,
    pub color: Vec<BoundTexture>,
    pub height_range: (f32, f32),
}

pub struct TileNode {
    key: TileKey,
    dirty: AtomicBool,
    surface: RwLock<TileSurface>,
    merges: AtomicU32,
}

impl TileNode {
    /// New nodes start dirty: they need data.
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            dirty: AtomicBool::new(true),
            surface: RwLock::new(TileSurface::default()),
            merges: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn key(&self) -> TileKey {
        self.key
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    #[inline]
    pub fn merge_count(&self) -> u32 {
        self.merges.load(Ordering::Relaxed)
    }

    pub fn surface(&self) -> TileSurface {
        self.surface
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Installs the model's textures at the units `bindings` names. Color
    /// layers replace any earlier texture from the same layer; layers with
    /// no binding slot are skipped.
    pub fn merge(&self, model: &TerrainTileModel, bindings: &RenderBindings) {
        let mut surface = self.surface.write().unwrap_or_else(PoisonError::into_inner);
        if let (Some(elev), Some(slot)) = (&model.elevation, bindings.get(BindingUsage::Elevation)) {
            surface.elevation = Some(BoundTexture {
                unit: slot.unit,
                sampler: slot.sampler_name.clone(),
                layer: elev.layer,
                resource: elev.texture.clone(),
            });
            surface.height_range = (elev.min_height, elev.max_height);
        }
        if let Some(slot) = bindings.get(BindingUsage::Color) {
            for c in &model.color_layers {
                let bound = BoundTexture {
                    unit: slot.unit,
                    sampler: slot.sampler_name.clone(),
                    layer: c.layer,
                    resource: c.texture.clone(),
                };
                match surface.color.iter_mut().find(|b| b.layer == c.layer) {
                    Some(existing) => *existing = bound,
                    None => surface.color.push(bound),
                }
            }
        }
        surface.revision = model.revision();
        self.merges.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "tile {} merged rev={} color_layers={}",
            self.key,
            model.revision(),
            surface.color.len()
        );
    }
}
