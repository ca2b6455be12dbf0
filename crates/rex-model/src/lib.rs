//! Per-tile data-model snapshots and the GPU resources they carry.
#![forbid(unsafe_code)]

pub mod bindings;
pub mod heightfield;
pub mod model;
pub mod resource;

pub use bindings::{BindingUsage, RenderBindings, SamplerBinding};
pub use heightfield::HeightField;
pub use model::{ColorLayerModel, ElevationModel, TerrainTileModel};
pub use resource::{GpuResource, PixelFormat, ResourceId, ResourceKind};
