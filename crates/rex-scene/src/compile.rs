use std::sync::Arc;

use rex_model::{GpuResource, TerrainTileModel};
use rex_tile::TileKey;

/// Render-thread GPU resource compiler.
pub trait GpuCompiler {
    /// Uploads/compiles one resource.
    fn compile(&mut self, resource: &GpuResource);

    /// Compiles every resource of the adapter's snapshot, once each.
    fn precompile(&mut self, adapter: &PrecompileAdapter) {
        adapter.model().for_each_resource(|r| self.compile(r));
    }
}

/// Short-lived handle that lets a [`GpuCompiler`] front-load the uploads of
/// a pending snapshot before it is merged. Holds the snapshot strongly, so
/// drop it after one compile pass.
pub struct PrecompileAdapter {
    model: Arc<TerrainTileModel>,
}

impl PrecompileAdapter {
    pub fn new(model: Arc<TerrainTileModel>) -> Self {
        Self { model }
    }

    #[inline]
    pub fn model(&self) -> &TerrainTileModel {
        &self.model
    }

    #[inline]
    pub fn key(&self) -> TileKey {
        self.model.key()
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.model.revision()
    }

    pub fn accept(&self, compiler: &mut dyn GpuCompiler) {
        compiler.precompile(self);
    }
}
