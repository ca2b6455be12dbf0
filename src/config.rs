use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use rex_engine::EngineConfig;
use rex_geom::Vec2;
use rex_map::ConfigError;
use rex_runtime::LoaderConfig;
use serde::Deserialize;

/// Run settings for the pager. Every field has a default so an empty file
/// (or no file) is a valid configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct PagerConfig {
    /// Map definition; resolved relative to the config file.
    #[serde(default = "d_map")]
    pub map: PathBuf,
    #[serde(default = "d_frames")]
    pub frames: u64,
    /// Wall-clock budget per frame; 0 runs frames back to back.
    #[serde(default = "d_frame_ms")]
    pub frame_ms: u64,
    #[serde(default)]
    pub loader: LoaderSection,
    #[serde(default)]
    pub view: ViewSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoaderSection {
    #[serde(default = "d_one")]
    pub mandatory_workers: usize,
    #[serde(default)]
    pub background_workers: usize,
    #[serde(default)]
    pub merges_per_frame: usize,
    #[serde(default = "d_true")]
    pub precompile: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ViewSection {
    #[serde(default = "d_view_lod")]
    pub lod: u32,
    /// Tiles kept around the camera tile, in rings.
    #[serde(default = "d_view_radius")]
    pub radius: u32,
    /// Camera start as `[lon, lat]` degrees.
    #[serde(default)]
    pub start: [f64; 2],
    /// Camera motion per frame as `[dlon, dlat]` degrees.
    #[serde(default = "d_velocity")]
    pub velocity: [f64; 2],
    /// Root tiles are loaded once and never canceled.
    #[serde(default = "d_true")]
    pub keep_roots: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EngineSection {
    #[serde(default = "d_tile_size")]
    pub tile_size: usize,
    #[serde(default = "d_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "d_max_samplers")]
    pub max_samplers: usize,
}

fn d_map() -> PathBuf {
    PathBuf::from("map.toml")
}
fn d_frames() -> u64 {
    240
}
fn d_frame_ms() -> u64 {
    16
}
fn d_one() -> usize {
    1
}
fn d_true() -> bool {
    true
}
fn d_view_lod() -> u32 {
    4
}
fn d_view_radius() -> u32 {
    2
}
fn d_velocity() -> [f64; 2] {
    [0.5, 0.0]
}
fn d_tile_size() -> usize {
    17
}
fn d_cache_capacity() -> usize {
    256
}
fn d_max_samplers() -> usize {
    8
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            map: d_map(),
            frames: d_frames(),
            frame_ms: d_frame_ms(),
            loader: LoaderSection::default(),
            view: ViewSection::default(),
            engine: EngineSection::default(),
        }
    }
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            mandatory_workers: d_one(),
            background_workers: 0,
            merges_per_frame: 0,
            precompile: d_true(),
        }
    }
}

impl Default for ViewSection {
    fn default() -> Self {
        Self {
            lod: d_view_lod(),
            radius: d_view_radius(),
            start: [0.0, 0.0],
            velocity: d_velocity(),
            keep_roots: d_true(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            tile_size: d_tile_size(),
            cache_capacity: d_cache_capacity(),
            max_samplers: d_max_samplers(),
        }
    }
}

impl PagerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loader.mandatory_workers == 0 {
            return Err(ConfigError::Invalid("loader.mandatory_workers must be > 0".into()));
        }
        if self.view.lod > rex_tile::MAX_LOD {
            return Err(ConfigError::Invalid(format!(
                "view.lod {} exceeds {}",
                self.view.lod,
                rex_tile::MAX_LOD
            )));
        }
        if self.engine.tile_size < 2 {
            return Err(ConfigError::Invalid("engine.tile_size must be >= 2".into()));
        }
        Ok(())
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            mandatory_workers: self.loader.mandatory_workers,
            background_workers: self.loader.background_workers,
            merges_per_frame: self.loader.merges_per_frame,
            precompile: self.loader.precompile,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            tile_size: self.engine.tile_size,
            cache_capacity: self.engine.cache_capacity,
            max_samplers: self.engine.max_samplers,
        }
    }

    #[inline]
    pub fn camera_start(&self) -> Vec2 {
        Vec2::new(self.view.start[0], self.view.start[1])
    }

    #[inline]
    pub fn camera_velocity(&self) -> Vec2 {
        Vec2::new(self.view.velocity[0], self.view.velocity[1])
    }
}

pub fn load_pager_config(path: &Path) -> Result<PagerConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    let mut cfg: PagerConfig = toml::from_str(&s)?;
    if cfg.map.is_relative() {
        if let Some(dir) = path.parent() {
            cfg.map = dir.join(&cfg.map);
        }
    }
    cfg.validate()?;
    Ok(cfg)
}
