use std::collections::{BTreeMap, VecDeque};

use rex_tile::TileKey;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MapChangeCause {
    HotReload,
    ScriptedEdit,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    // Camera
    ViewCenterChanged { center: TileKey },

    // Paging
    EnsureTileLoaded { key: TileKey },
    EnsureTileUnloaded { key: TileKey },
    TileMerged { key: TileKey, revision: u64 },

    // Map
    MapChanged { revision: u64, cause: MapChangeCause },
}

pub struct EventEnvelope {
    pub id: u64,
    pub tick: u64,
    pub kind: Event,
}

/// Events bucketed by frame; FIFO within a frame.
pub struct EventQueue {
    by_tick: BTreeMap<u64, VecDeque<EventEnvelope>>,
    pub now: u64,
    next_id: u64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self {
            by_tick: BTreeMap::new(),
            now: 0,
            next_id: 1,
        }
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    pub fn emit_now(&mut self, kind: Event) -> u64 {
        self.emit_at(self.now, kind)
    }

    pub fn emit_at(&mut self, tick: u64, kind: Event) -> u64 {
        let id = self.alloc_id();
        // nothing scheduled in the past is ever popped
        let tick = tick.max(self.now);
        let env = EventEnvelope { id, tick, kind };
        self.by_tick.entry(tick).or_default().push_back(env);
        id
    }

    pub fn pop_ready(&mut self) -> Option<EventEnvelope> {
        self.by_tick.get_mut(&self.now)?.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.by_tick.values().map(VecDeque::len).sum()
    }

    pub fn advance_tick(&mut self) {
        if self.by_tick.get(&self.now).is_some_and(VecDeque::is_empty) {
            self.by_tick.remove(&self.now);
        }
        self.now = self.now.wrapping_add(1);
    }
}
