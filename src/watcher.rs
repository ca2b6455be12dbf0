use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rex_map::{Map, load_map_config};

/// Watches the map file and reloads its layers into the live map.
pub struct MapWatcher {
    path: PathBuf,
    rx: Receiver<()>,
    _watcher: RecommendedWatcher,
}

impl MapWatcher {
    pub fn start(path: &Path) -> Result<Self, Box<dyn Error>> {
        let (tx, rx) = mpsc::channel::<()>();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    match event.kind {
                        EventKind::Modify(_)
                        | EventKind::Create(_)
                        | EventKind::Remove(_)
                        | EventKind::Any => {
                            let _ = tx.send(());
                        }
                        _ => {}
                    }
                }
            },
        )?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        log::info!("watching map {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            rx,
            _watcher: watcher,
        })
    }

    /// Drains pending change notifications and reloads once if there were
    /// any. Returns the new revision when the layer set changed.
    pub fn poll(&self, map: &Map) -> Option<u64> {
        if self.rx.try_iter().count() == 0 {
            return None;
        }
        reload_map(&self.path, map)
    }
}

/// Re-reads `path` into `map`. A broken file leaves the map untouched.
pub fn reload_map(path: &Path, map: &Map) -> Option<u64> {
    let layers = match load_map_config(path).and_then(|cfg| Ok(cfg.to_layers()?)) {
        Ok(layers) => layers,
        Err(e) => {
            log::warn!("map reload failed ({}); keeping current layers", e);
            return None;
        }
    };
    let before = map.data_model_revision();
    let after = map.set_layers(layers);
    if after == before {
        log::debug!("map file touched; layers unchanged");
        return None;
    }
    log::info!("map reloaded: rev {} -> {}", before, after);
    Some(after)
}
