use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

use hashbrown::HashSet;
use serde::Deserialize;

use crate::layer::{Layer, LayerKind, LayerUid, SourceParams};

#[derive(Clone, Debug, Deserialize)]
pub struct MapConfig {
    #[serde(default = "d_name")]
    pub name: String,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: d_name(),
            layers: Vec::new(),
        }
    }
}

fn d_name() -> String {
    "map".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub kind: String,
    /// Assigned in declaration order when omitted.
    #[serde(default)]
    pub uid: Option<LayerUid>,
    #[serde(default)]
    pub min_lod: u32,
    #[serde(default = "d_max_lod")]
    pub max_lod: u32,
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_opacity")]
    pub opacity: f32,
    #[serde(flatten)]
    pub source: SourceParams,
}

fn d_max_lod() -> u32 {
    rex_tile::MAX_LOD
}

fn d_true() -> bool {
    true
}

fn d_opacity() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    UnknownLayerKind { layer: String, kind: String },
    LodRange { layer: String, min_lod: u32, max_lod: u32 },
    DuplicateUid(LayerUid),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownLayerKind { layer, kind } => {
                write!(f, "layer {:?}: unknown kind {:?}", layer, kind)
            }
            ConfigError::LodRange {
                layer,
                min_lod,
                max_lod,
            } => write!(
                f,
                "layer {:?}: min_lod {} exceeds max_lod {}",
                layer, min_lod, max_lod
            ),
            ConfigError::DuplicateUid(uid) => write!(f, "duplicate layer uid {}", uid),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl Error for ConfigError {}

impl MapConfig {
    pub fn to_layers(&self) -> Result<Vec<Layer>, ConfigError> {
        let mut seen: HashSet<LayerUid> = HashSet::new();
        let mut next_uid: LayerUid = self
            .layers
            .iter()
            .filter_map(|l| l.uid)
            .max()
            .map_or(1, |m| m + 1);
        let mut out = Vec::with_capacity(self.layers.len());
        for lc in &self.layers {
            let kind = match lc.kind.to_ascii_lowercase().as_str() {
                "elevation" | "heightfield" => LayerKind::Elevation,
                "image" | "imagery" => LayerKind::Image,
                _ => {
                    return Err(ConfigError::UnknownLayerKind {
                        layer: lc.name.clone(),
                        kind: lc.kind.clone(),
                    });
                }
            };
            if lc.min_lod > lc.max_lod {
                return Err(ConfigError::LodRange {
                    layer: lc.name.clone(),
                    min_lod: lc.min_lod,
                    max_lod: lc.max_lod,
                });
            }
            let uid = match lc.uid {
                Some(uid) => uid,
                None => {
                    let uid = next_uid;
                    next_uid += 1;
                    uid
                }
            };
            if !seen.insert(uid) {
                return Err(ConfigError::DuplicateUid(uid));
            }
            out.push(Layer {
                uid,
                name: lc.name.clone(),
                kind,
                min_lod: lc.min_lod,
                max_lod: lc.max_lod.min(rex_tile::MAX_LOD),
                enabled: lc.enabled,
                opacity: lc.opacity.clamp(0.0, 1.0),
                source: lc.source.clone(),
            });
        }
        Ok(out)
    }
}

pub fn load_map_config(path: &Path) -> Result<MapConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    let cfg: MapConfig = toml::from_str(&s)?;
    cfg.to_layers()?;
    Ok(cfg)
}
