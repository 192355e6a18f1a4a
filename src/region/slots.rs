//! Mini-region slot allocation with a persisted free list

use serde::{Deserialize, Serialize};

/// Host-provided allocator for brand-new region ids.
pub trait MintRegionId {
    fn mint_id(&mut self) -> u32;
}

/// Tracks released mini-region ids for reuse.
///
/// The free list survives restarts: the host feeds it back in through
/// [`SlotRegistry::load_free_list`] at world load and persists whatever
/// [`SlotRegistry::save_free_list`] hands out at world save. A dirty flag
/// keeps unchanged lists from being rewritten every save cycle.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SlotRegistry {
    free: Vec<u32>,
    #[serde(skip)]
    dirty: bool,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an id from the free list, or mint a new one.
    pub fn allocate(&mut self, minter: &mut impl MintRegionId) -> u32 {
        if let Some(id) = self.free.pop() {
            self.dirty = true;
            log::info!("reused mini-region slot {id}");
            id
        } else {
            let id = minter.mint_id();
            log::info!("allocated new mini-region slot {id}");
            id
        }
    }

    /// Return an id to the pool.
    pub fn release(&mut self, id: u32) {
        self.free.push(id);
        self.dirty = true;
        log::info!("freed mini-region slot {id}");
    }

    /// Install the free list persisted by the host. Clears the dirty flag.
    pub fn load_free_list(&mut self, free: Vec<u32>) {
        self.free = free;
        self.dirty = false;
    }

    /// Hand the free list to the host for persistence.
    ///
    /// Returns `None` when nothing changed since the last save, so callers
    /// can skip the write.
    pub fn save_free_list(&mut self) -> Option<Vec<u32>> {
        if self.dirty {
            self.dirty = false;
            Some(self.free.clone())
        } else {
            None
        }
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
