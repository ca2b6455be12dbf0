use std::sync::Arc;

use hashbrown::HashMap;
use rex_tile::TileKey;

use crate::handle::SafeRef;
use crate::node::TileNode;

/// Render-thread owner of the live tile nodes. Background code only ever
/// sees nodes through [`SafeRef`]s handed out here.
#[derive(Default)]
pub struct Scene {
    nodes: HashMap<TileKey, Arc<TileNode>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node for `key`, creating it if absent.
    pub fn insert(&mut self, key: TileKey) -> Arc<TileNode> {
        Arc::clone(
            self.nodes
                .entry(key)
                .or_insert_with(|| Arc::new(TileNode::new(key))),
        )
    }

    pub fn remove(&mut self, key: &TileKey) -> Option<Arc<TileNode>> {
        let removed = self.nodes.remove(key);
        if removed.is_some() {
            log::debug!("tile {} removed from scene", key);
        }
        removed
    }

    #[inline]
    pub fn get(&self, key: &TileKey) -> Option<&Arc<TileNode>> {
        self.nodes.get(key)
    }

    pub fn safe_ref(&self, key: &TileKey) -> Option<SafeRef<TileNode>> {
        self.nodes.get(key).map(SafeRef::new)
    }

    #[inline]
    pub fn contains(&self, key: &TileKey) -> bool {
        self.nodes.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.nodes.keys().copied()
    }

    pub fn dirty_keys(&self) -> Vec<TileKey> {
        self.nodes
            .values()
            .filter(|n| n.is_dirty())
            .map(|n| n.key())
            .collect()
    }
}
