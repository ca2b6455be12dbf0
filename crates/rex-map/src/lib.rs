//! Shared map configuration, versioned frames, and layer filters.
#![forbid(unsafe_code)]

pub mod config;
pub mod filter;
pub mod frame;
pub mod layer;
pub mod map;

pub use config::{ConfigError, MapConfig, load_map_config};
pub use filter::LayerFilter;
pub use frame::MapFrame;
pub use layer::{Layer, LayerKind, LayerUid, SourceParams};
pub use map::{Map, MapLayers};
