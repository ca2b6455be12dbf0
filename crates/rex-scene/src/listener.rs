use rex_model::TerrainTileModel;
use rex_tile::TileKey;

/// Observer fired on the render thread after a tile merge that carried
/// elevation. Tiles may arrive in any order.
pub trait TileListener: Send + Sync {
    fn on_tile_merged(&self, key: &TileKey, model: &TerrainTileModel);
}
