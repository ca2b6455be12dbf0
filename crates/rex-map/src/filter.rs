use hashbrown::HashSet;

use crate::layer::{Layer, LayerKind, LayerUid};

/// Selects which layers a tile build should fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerFilter {
    image_layers: Option<HashSet<LayerUid>>,
    elevation: bool,
}

impl Default for LayerFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl LayerFilter {
    pub fn all() -> Self {
        Self {
            image_layers: None,
            elevation: true,
        }
    }

    pub fn only(uids: impl IntoIterator<Item = LayerUid>) -> Self {
        Self {
            image_layers: Some(uids.into_iter().collect()),
            elevation: false,
        }
    }

    pub fn with_elevation(mut self, elevation: bool) -> Self {
        self.elevation = elevation;
        self
    }

    #[inline]
    pub fn wants_elevation(&self) -> bool {
        self.elevation
    }

    pub fn accepts(&self, layer: &Layer) -> bool {
        match layer.kind {
            LayerKind::Elevation => self.elevation,
            LayerKind::Image => self
                .image_layers
                .as_ref()
                .is_none_or(|set| set.contains(&layer.uid)),
        }
    }
}
