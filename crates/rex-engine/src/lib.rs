//! Procedural terrain engine: noise heightfields and shaded imagery per tile.
#![forbid(unsafe_code)]

pub mod heightfield_cache;
mod procedural;
pub mod sampler_pool;

pub use heightfield_cache::{CachedHeights, HeightfieldCache, HeightfieldCacheStats};
pub use procedural::{EngineConfig, EngineStats, ProceduralEngine};
pub use sampler_pool::{PooledSampler, Sampler, SamplerPool};
