use serde::{Deserialize, Serialize};

pub type LayerUid = u32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Elevation,
    Image,
}

/// Parameters handed to whatever produces this layer's tiles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    #[serde(default)]
    pub seed: i32,
    #[serde(default = "d_frequency")]
    pub frequency: f32,
    #[serde(default = "d_amplitude")]
    pub amplitude: f32,
    /// Simulated fetch time per tile.
    #[serde(default)]
    pub latency_ms: u32,
    /// Every n-th fetch reports a transient failure (0 disables).
    #[serde(default)]
    pub fail_every: u32,
}

fn d_frequency() -> f32 {
    0.02
}

fn d_amplitude() -> f32 {
    1.0
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            seed: 0,
            frequency: d_frequency(),
            amplitude: d_amplitude(),
            latency_ms: 0,
            fail_every: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub uid: LayerUid,
    pub name: String,
    pub kind: LayerKind,
    pub min_lod: u32,
    pub max_lod: u32,
    pub enabled: bool,
    pub opacity: f32,
    pub source: SourceParams,
}

impl Layer {
    pub fn new(uid: LayerUid, name: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            uid,
            name: name.into(),
            kind,
            min_lod: 0,
            max_lod: rex_tile::MAX_LOD,
            enabled: true,
            opacity: 1.0,
            source: SourceParams::default(),
        }
    }

    pub fn with_lod_range(mut self, min_lod: u32, max_lod: u32) -> Self {
        self.min_lod = min_lod;
        self.max_lod = max_lod;
        self
    }

    pub fn with_source(mut self, source: SourceParams) -> Self {
        self.source = source;
        self
    }

    /// Enabled and has data at `lod`.
    #[inline]
    pub fn covers(&self, lod: u32) -> bool {
        self.enabled && lod >= self.min_lod && lod <= self.max_lod
    }

    #[inline]
    pub fn is_elevation(&self) -> bool {
        self.kind == LayerKind::Elevation
    }
}
