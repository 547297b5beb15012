//! Zoom-partitioned item storage
//!
//! One slot array per zoom level. Slots are never compacted, so the id of a
//! surviving item stays valid after other items are removed. The populated
//! count of a zoom level is its high-water mark: removed slots below it are
//! empty but still counted, slots above it do not exist.

use tracing::trace;

use super::{Item, ItemId, MAX_INDEX_IN_ZOOM, NBR_ZOOM_LEVELS};

#[derive(Debug, Clone, Default)]
struct ZoomLevel {
    slots: Vec<Option<Item>>,
    /// No empty slot exists below this index
    empty_cursor: usize,
    live: usize,
}

impl ZoomLevel {
    fn first_empty_slot(&mut self) -> Option<usize> {
        while self.empty_cursor < self.slots.len() {
            if self.slots[self.empty_cursor].is_none() {
                return Some(self.empty_cursor);
            }
            self.empty_cursor += 1;
        }
        None
    }
}

/// State of a slot as seen by [`ItemStore::slot_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Occupied,
    /// Below the high-water mark but removed
    Empty,
    /// At or above the high-water mark
    BeyondEnd,
}

/// Array-of-arrays of items, addressed by `(zoom, index)`
#[derive(Debug, Clone)]
pub struct ItemStore {
    zooms: Vec<ZoomLevel>,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            zooms: vec![ZoomLevel::default(); NBR_ZOOM_LEVELS],
        }
    }

    /// Bounds-checked access; `None` for empty slots and indices past the end
    pub fn get_item(&self, zoom: u8, index: u32) -> Option<&Item> {
        self.zooms
            .get(zoom as usize)?
            .slots
            .get(index as usize)?
            .as_ref()
    }

    pub fn get_item_mut(&mut self, zoom: u8, index: u32) -> Option<&mut Item> {
        self.zooms
            .get_mut(zoom as usize)?
            .slots
            .get_mut(index as usize)?
            .as_mut()
    }

    pub fn item_lookup(&self, id: ItemId) -> Option<&Item> {
        self.get_item(id.zoom(), id.index())
    }

    pub fn item_lookup_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.get_item_mut(id.zoom(), id.index())
    }

    /// High-water mark of a zoom level (empty slots included)
    pub fn nbr_items_with_zoom(&self, zoom: u8) -> u32 {
        self.zooms
            .get(zoom as usize)
            .map_or(0, |z| z.slots.len() as u32)
    }

    /// Occupied slots of a zoom level
    pub fn live_items_with_zoom(&self, zoom: u8) -> u32 {
        self.zooms.get(zoom as usize).map_or(0, |z| z.live as u32)
    }

    pub fn total_items(&self) -> usize {
        self.zooms.iter().map(|z| z.live).sum()
    }

    pub fn slot_state(&self, zoom: u8, index: u32) -> SlotState {
        let Some(level) = self.zooms.get(zoom as usize) else {
            return SlotState::BeyondEnd;
        };
        match level.slots.get(index as usize) {
            None => SlotState::BeyondEnd,
            Some(None) => SlotState::Empty,
            Some(Some(_)) => SlotState::Occupied,
        }
    }

    /// Stores `item` in the first empty slot of `zoom` (appending when none)
    /// and returns its new id. `None` when the zoom level is full.
    pub fn add_item(&mut self, zoom: u8, mut item: Item) -> Option<ItemId> {
        let level = self.zooms.get_mut(zoom as usize)?;
        let index = match level.first_empty_slot() {
            Some(i) => i,
            None => {
                if level.slots.len() as u64 > MAX_INDEX_IN_ZOOM as u64 {
                    return None;
                }
                level.slots.push(None);
                level.slots.len() - 1
            }
        };
        let id = ItemId::new(zoom, index as u32);
        item.assign_id(id);
        level.slots[index] = Some(item);
        level.live += 1;
        level.empty_cursor = index + 1;
        trace!(item_id = %id, "item added");
        Some(id)
    }

    /// Places an item at an explicit slot, growing the zoom level with empty
    /// slots as needed. Used when loading a map file.
    pub fn insert_at(&mut self, id: ItemId, mut item: Item) -> Option<Item> {
        let level = &mut self.zooms[id.zoom() as usize];
        let index = id.index() as usize;
        if level.slots.len() <= index {
            level.slots.resize_with(index + 1, || None);
        }
        item.assign_id(id);
        let previous = level.slots[index].replace(item);
        if previous.is_none() {
            level.live += 1;
        }
        level.empty_cursor = 0;
        previous
    }

    /// Grows a zoom level to `len` slots without filling them
    pub fn reserve_slots(&mut self, zoom: u8, len: u32) {
        let level = &mut self.zooms[zoom as usize];
        if level.slots.len() < len as usize {
            level.slots.resize_with(len as usize, || None);
        }
    }

    /// Empties the slot; ids of other items are untouched
    pub fn remove_item(&mut self, id: ItemId) -> Option<Item> {
        let level = self.zooms.get_mut(id.zoom() as usize)?;
        let index = id.index() as usize;
        let removed = level.slots.get_mut(index)?.take()?;
        level.live -= 1;
        level.empty_cursor = level.empty_cursor.min(index);
        trace!(item_id = %id, "item removed");
        Some(removed)
    }

    /// Items of one zoom level in index order
    pub fn items_in_zoom(&self, zoom: u8) -> impl Iterator<Item = &Item> + '_ {
        self.zooms
            .get(zoom as usize)
            .into_iter()
            .flat_map(|z| z.slots.iter().flatten())
    }

    /// All items, zoom by zoom, in index order
    pub fn iter(&self) -> impl Iterator<Item = &Item> + '_ {
        self.zooms.iter().flat_map(|z| z.slots.iter().flatten())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> + '_ {
        self.zooms.iter_mut().flat_map(|z| z.slots.iter_mut().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;

    #[test]
    fn add_fills_first_empty_slot() {
        let mut store = ItemStore::new();
        let a = store.add_item(3, Item::new(ItemType::Park)).unwrap();
        let b = store.add_item(3, Item::new(ItemType::Park)).unwrap();
        let c = store.add_item(3, Item::new(ItemType::Park)).unwrap();
        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));

        store.remove_item(b).unwrap();
        assert_eq!(store.slot_state(3, 1), SlotState::Empty);
        assert_eq!(store.slot_state(3, 3), SlotState::BeyondEnd);
        assert_eq!(store.nbr_items_with_zoom(3), 3);
        assert_eq!(store.live_items_with_zoom(3), 2);

        let d = store.add_item(3, Item::new(ItemType::Water)).unwrap();
        assert_eq!(d, b);
        assert_eq!(store.item_lookup(c).unwrap().id(), c);
        let e = store.add_item(3, Item::new(ItemType::Water)).unwrap();
        assert_eq!(e.index(), 3);
    }

    #[test]
    fn lookups_out_of_range_are_none() {
        let mut store = ItemStore::new();
        store.add_item(0, Item::new(ItemType::Municipal)).unwrap();
        assert!(store.get_item(0, 1).is_none());
        assert!(store.get_item(15, 0).is_none());
        assert!(store.get_item(16, 0).is_none());
    }

    #[test]
    fn lookup_is_idempotent() {
        let mut store = ItemStore::new();
        for zoom in [0u8, 5, 14] {
            store.add_item(zoom, Item::new(ItemType::Building)).unwrap();
        }
        for item in store.iter() {
            let again = store.item_lookup(item.id()).unwrap();
            assert_eq!(again.id(), item.id());
            assert_eq!(store.item_lookup(again.id()).unwrap(), again);
        }
    }

    #[test]
    fn insert_at_grows_with_empty_slots() {
        let mut store = ItemStore::new();
        let id = ItemId::new(7, 4);
        assert!(store.insert_at(id, Item::new(ItemType::Street)).is_none());
        assert_eq!(store.nbr_items_with_zoom(7), 5);
        assert_eq!(store.live_items_with_zoom(7), 1);
        assert_eq!(store.slot_state(7, 2), SlotState::Empty);
        let next = store.add_item(7, Item::new(ItemType::Street)).unwrap();
        assert_eq!(next.index(), 0);
    }
}
