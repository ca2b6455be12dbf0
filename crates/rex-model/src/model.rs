use rex_map::LayerUid;
use rex_tile::TileKey;

use crate::heightfield::HeightField;
use crate::resource::{GpuResource, PixelFormat};

#[derive(Clone, Debug)]
pub struct ElevationModel {
    pub layer: LayerUid,
    pub heightfield: HeightField,
    pub min_height: f32,
    pub max_height: f32,
    pub texture: GpuResource,
}

impl ElevationModel {
    pub fn new(layer: LayerUid, key: &TileKey, heightfield: HeightField) -> Self {
        let (min_height, max_height) = heightfield.range().unwrap_or((0.0, 0.0));
        let texture = GpuResource::texture(
            format!("elevation {} {}", layer, key),
            heightfield.width as u32,
            heightfield.height as u32,
            PixelFormat::R32F,
            heightfield.to_le_bytes(),
        );
        Self {
            layer,
            heightfield,
            min_height,
            max_height,
            texture,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColorLayerModel {
    pub layer: LayerUid,
    pub name: String,
    pub opacity: f32,
    pub texture: GpuResource,
}

/// Everything one tile needs to render, tagged with the map revision it
/// was assembled against. Built once off-thread, consumed once on merge.
#[derive(Clone, Debug)]
pub struct TerrainTileModel {
    key: TileKey,
    revision: u64,
    pub elevation: Option<ElevationModel>,
    pub color_layers: Vec<ColorLayerModel>,
    pub shared: Vec<GpuResource>,
}

impl TerrainTileModel {
    pub fn new(key: TileKey, revision: u64) -> Self {
        Self {
            key,
            revision,
            elevation: None,
            color_layers: Vec::new(),
            shared: Vec::new(),
        }
    }

    #[inline]
    pub fn key(&self) -> TileKey {
        self.key
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    pub fn has_elevation(&self) -> bool {
        self.elevation.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.elevation.is_none() && self.color_layers.is_empty() && self.shared.is_empty()
    }

    /// Visits each GPU resource once: elevation, color layers, then shared buffers.
    pub fn for_each_resource(&self, mut f: impl FnMut(&GpuResource)) {
        if let Some(e) = &self.elevation {
            f(&e.texture);
        }
        for c in &self.color_layers {
            f(&c.texture);
        }
        for r in &self.shared {
            f(r);
        }
    }

    pub fn resource_count(&self) -> usize {
        let mut n = 0;
        self.for_each_resource(|_| n += 1);
        n
    }

    pub fn byte_len(&self) -> usize {
        let mut n = 0;
        self.for_each_resource(|r| n += r.byte_len());
        n
    }
}
