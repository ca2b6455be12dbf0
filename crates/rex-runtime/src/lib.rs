//! Tile data requests and the paging worker pool that runs them.
#![forbid(unsafe_code)]

mod engine;
mod loader;
mod progress;
mod request;
mod state;

pub use engine::{EngineContext, FrameStamp, TerrainEngine};
pub use loader::{Lane, Loader, LoaderConfig, LoaderStats, RequestRef, UpdateReport};
pub use progress::{Progress, ProgressToken, RequestProgress};
pub use request::{ApplyOutcome, Request, TileDataRequest};
pub use state::RequestState;
