use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ConfigError, MapConfig};
use crate::layer::{Layer, LayerUid};

/// Consistent point-in-time view of the map's layer list.
#[derive(Clone, Debug)]
pub struct MapLayers {
    pub revision: u64,
    pub layers: Arc<[Layer]>,
}

/// The shared map: source of truth for the layer configuration.
///
/// Every change to the layer set bumps the data-model revision. Readers get
/// layers and revision together under the same lock, so a frame never pairs
/// a new layer list with an old revision.
pub struct Map {
    name: String,
    layers: RwLock<Arc<[Layer]>>,
    revision: AtomicU64,
}

impl Map {
    pub fn new(name: impl Into<String>, layers: Vec<Layer>) -> Self {
        Self {
            name: name.into(),
            layers: RwLock::new(layers.into()),
            revision: AtomicU64::new(1),
        }
    }

    pub fn from_config(cfg: &MapConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(cfg.name.clone(), cfg.to_layers()?))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data_model_revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn layers(&self) -> MapLayers {
        let guard = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        MapLayers {
            revision: self.revision.load(Ordering::Acquire),
            layers: Arc::clone(&*guard),
        }
    }

    pub fn layer(&self, uid: LayerUid) -> Option<Layer> {
        let guard = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        guard.iter().find(|l| l.uid == uid).cloned()
    }

    pub fn next_uid(&self) -> LayerUid {
        let guard = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        guard.iter().map(|l| l.uid + 1).max().unwrap_or(1)
    }

    /// Appends a layer, replacing any layer with the same uid. Returns the new revision.
    pub fn add_layer(&self, layer: Layer) -> u64 {
        self.edit(|layers| {
            layers.retain(|l| l.uid != layer.uid);
            layers.push(layer);
            true
        })
    }

    pub fn remove_layer(&self, uid: LayerUid) -> Option<Layer> {
        let mut removed = None;
        self.edit(|layers| {
            if let Some(pos) = layers.iter().position(|l| l.uid == uid) {
                removed = Some(layers.remove(pos));
                true
            } else {
                false
            }
        });
        removed
    }

    /// Returns false when the uid is unknown or already in that state.
    pub fn set_layer_enabled(&self, uid: LayerUid, enabled: bool) -> bool {
        let mut changed = false;
        self.edit(|layers| {
            if let Some(l) = layers.iter_mut().find(|l| l.uid == uid) {
                changed = l.enabled != enabled;
                l.enabled = enabled;
            }
            changed
        });
        changed
    }

    /// Swaps the whole layer list (config hot reload). An identical list
    /// leaves the revision alone.
    pub fn set_layers(&self, layers: Vec<Layer>) -> u64 {
        self.edit(move |cur| {
            if *cur == layers {
                return false;
            }
            *cur = layers;
            true
        })
    }

    fn edit(&self, f: impl FnOnce(&mut Vec<Layer>) -> bool) -> u64 {
        let mut guard = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Layer> = guard.iter().cloned().collect();
        if !f(&mut next) {
            return self.revision.load(Ordering::Acquire);
        }
        *guard = next.into();
        let rev = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("map {:?} advanced to revision {}", self.name, rev);
        rev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerKind;

    fn demo() -> Map {
        Map::new(
            "demo",
            vec![
                Layer::new(1, "dem", LayerKind::Elevation),
                Layer::new(2, "imagery", LayerKind::Image),
            ],
        )
    }

    #[test]
    fn edits_bump_revision() {
        let map = demo();
        assert_eq!(map.data_model_revision(), 1);
        assert_eq!(map.add_layer(Layer::new(3, "roads", LayerKind::Image)), 2);
        assert!(map.remove_layer(2).is_some());
        assert_eq!(map.data_model_revision(), 3);
        assert_eq!(map.layers().layers.len(), 2);
    }

    #[test]
    fn noop_edits_keep_revision() {
        let map = demo();
        assert!(map.remove_layer(99).is_none());
        assert!(!map.set_layer_enabled(1, true));
        assert_eq!(map.data_model_revision(), 1);
        assert!(map.set_layer_enabled(1, false));
        assert_eq!(map.data_model_revision(), 2);
        assert!(!map.layer(1).unwrap().enabled);
    }

    #[test]
    fn next_uid_skips_existing() {
        assert_eq!(demo().next_uid(), 3);
        assert_eq!(Map::new("empty", Vec::new()).next_uid(), 1);
    }
}
