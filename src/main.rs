mod app;
mod compiler;
mod config;
mod event;
mod watcher;

use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use rex_map::{Layer, LayerKind, Map, SourceParams, load_map_config};
use simplelog::{
    ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};

use crate::app::Pager;
use crate::config::{PagerConfig, load_pager_config};
use crate::watcher::MapWatcher;

#[derive(Parser, Debug)]
#[command(name = "rex-pager", about = "Headless terrain tile paging driver")]
struct Args {
    /// Pager settings (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Map definition (TOML); overrides the config's `map`.
    #[arg(long)]
    map: Option<PathBuf>,
    #[arg(long)]
    frames: Option<u64>,
    /// Background worker threads.
    #[arg(long)]
    workers: Option<usize>,
    /// LOD of the tiles kept around the camera.
    #[arg(long)]
    lod: Option<u32>,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Also write the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Toggle the last image layer at this frame.
    #[arg(long)]
    edit_at_frame: Option<u64>,
    /// Reload the map file when it changes.
    #[arg(long, default_value_t = false)]
    watch: bool,
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match log_file {
        None => {
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
                .init();
        }
        Some(path) => {
            let filter: LevelFilter = level
                .parse()
                .map_err(|_| format!("unknown log level {:?}", level))?;
            CombinedLogger::init(vec![
                TermLogger::new(
                    filter,
                    Config::default(),
                    TerminalMode::Mixed,
                    ColorChoice::Auto,
                ),
                WriteLogger::new(filter, Config::default(), File::create(path)?),
            ])?;
        }
    }
    Ok(())
}

/// Used when no map file exists: one terrain layer and one imagery layer.
fn builtin_map() -> Map {
    let terrain = SourceParams {
        seed: 1337,
        amplitude: 3000.0,
        ..SourceParams::default()
    };
    Map::new(
        "builtin",
        vec![
            Layer::new(1, "terrain", LayerKind::Elevation).with_source(terrain.clone()),
            Layer::new(2, "shaded", LayerKind::Image).with_source(terrain),
        ],
    )
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args.log_level, args.log_file.as_deref())?;

    let mut cfg = match &args.config {
        Some(path) => load_pager_config(path)?,
        None => PagerConfig::default(),
    };
    if let Some(map) = args.map {
        cfg.map = map;
    }
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if let Some(workers) = args.workers {
        cfg.loader.background_workers = workers;
    }
    if let Some(lod) = args.lod {
        cfg.view.lod = lod;
    }
    cfg.validate()?;

    let map_exists = cfg.map.exists();
    let map = if map_exists {
        let map_cfg = load_map_config(&cfg.map)?;
        Arc::new(Map::from_config(&map_cfg)?)
    } else {
        log::warn!("map {} not found; using built-in layers", cfg.map.display());
        Arc::new(builtin_map())
    };
    log::info!(
        "map {:?}: {} layers at rev {}",
        map.name(),
        map.layers().layers.len(),
        map.data_model_revision()
    );

    let watcher = if args.watch && map_exists {
        Some(MapWatcher::start(&cfg.map)?)
    } else {
        None
    };

    let mut pager = Pager::new(cfg, map)?.with_edit_at_frame(args.edit_at_frame);
    if let Some(w) = watcher {
        pager = pager.with_watcher(w);
    }
    pager.run();
    Ok(())
}
