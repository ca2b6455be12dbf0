//! Render-side scene state: tile nodes, weak handles, GPU pre-compilation.
#![forbid(unsafe_code)]

mod compile;
mod handle;
mod listener;
mod node;
mod scene;

pub use compile::{GpuCompiler, PrecompileAdapter};
pub use handle::SafeRef;
pub use listener::TileListener;
pub use node::{BoundTexture, TileNode, TileSurface};
pub use scene::Scene;
