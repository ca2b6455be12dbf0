use std::sync::{Arc, Weak};

use crate::layer::{Layer, LayerKind, LayerUid};
use crate::map::Map;

/// Thread-confined copy of the map's layers at one revision.
///
/// The frame holds the map weakly: once the map is gone the frame reports
/// invalid and can no longer sync, but its cached layers stay readable.
#[derive(Clone, Debug)]
pub struct MapFrame {
    map: Weak<Map>,
    revision: u64,
    layers: Arc<[Layer]>,
}

impl Default for MapFrame {
    fn default() -> Self {
        Self {
            map: Weak::new(),
            revision: 0,
            layers: Arc::from(Vec::new()),
        }
    }
}

impl MapFrame {
    pub fn new(map: &Arc<Map>) -> Self {
        let mut frame = Self::default();
        frame.set_map(map);
        frame
    }

    /// Rebinds to `map` and syncs immediately.
    pub fn set_map(&mut self, map: &Arc<Map>) {
        self.map = Arc::downgrade(map);
        self.sync();
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.map.strong_count() > 0
    }

    pub fn needs_sync(&self) -> bool {
        match self.map.upgrade() {
            Some(map) => map.data_model_revision() != self.revision,
            None => false,
        }
    }

    /// Copies the map's current layers. Returns false if the map is gone.
    pub fn sync(&mut self) -> bool {
        let Some(map) = self.map.upgrade() else {
            return false;
        };
        let snap = map.layers();
        self.revision = snap.revision;
        self.layers = snap.layers;
        true
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, uid: LayerUid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.uid == uid)
    }

    pub fn layers_of(&self, kind: LayerKind) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(move |l| l.kind == kind)
    }
}
