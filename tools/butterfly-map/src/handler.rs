//! Process-wide registry of loaded maps
//!
//! Maps are held behind `Arc` snapshots. Load, reload and unload swap the
//! registry entry; readers that already hold a snapshot keep using it
//! undisturbed. Load/reload/unload of the same map id are serialized by a
//! per-id lock, so a map file is never decoded twice concurrently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use butterfly_common::{Error, Result};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{info, warn};

use crate::config::{ServerConfig, SpatialConfig};
use crate::formats::MapFile;
use crate::graph::CostModel;
use crate::map::MapAggregate;

pub struct MapHandler {
    map_dir: PathBuf,
    spatial: SpatialConfig,
    cost: CostModel,
    maps: RwLock<FxHashMap<u32, Arc<MapAggregate>>>,
    /// One lock per map id, gating load/reload/unload
    locks: Mutex<FxHashMap<u32, Arc<Mutex<()>>>>,
}

impl MapHandler {
    pub fn new(map_dir: impl Into<PathBuf>) -> Self {
        Self {
            map_dir: map_dir.into(),
            spatial: SpatialConfig::default(),
            cost: CostModel::default(),
            maps: RwLock::new(FxHashMap::default()),
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            spatial: config.spatial,
            cost: config.cost.clone(),
            ..Self::new(config.map_dir.clone())
        }
    }

    pub fn map_dir(&self) -> &Path {
        &self.map_dir
    }

    fn lock_for(&self, map_id: u32) -> Arc<Mutex<()>> {
        self.locks.lock().entry(map_id).or_default().clone()
    }

    /// Drops the per-id lock of a map that is not loaded once nobody else
    /// holds it, so failed loads and unloads leave no entry behind
    fn release_lock(&self, map_id: u32, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // the table's handle plus `lock`
        if Arc::strong_count(&lock) == 2 && !self.maps.read().contains_key(&map_id) {
            locks.remove(&map_id);
        }
    }

    fn read_map(&self, map_id: u32) -> Result<MapAggregate> {
        let path = MapFile::path_for(&self.map_dir, map_id);
        let map = MapFile::read(&path).map_err(|e| e.into_map_error(map_id))?;
        if map.map_id() != map_id {
            return Err(Error::corrupt(
                map_id,
                format!("{} holds map {:09}", path.display(), map.map_id()),
            ));
        }
        map.validate()?;
        Ok(map
            .with_spatial_config(self.spatial)
            .with_cost_model(self.cost.clone()))
    }

    /// Loads a map from `{map_dir}/{map_id:09}.mcm`. Already loaded maps are
    /// returned as they are.
    pub fn load(&self, map_id: u32) -> Result<Arc<MapAggregate>> {
        let lock = self.lock_for(map_id);
        let loaded = {
            let _guard = lock.lock();
            self.load_locked(map_id)
        };
        if loaded.is_err() {
            self.release_lock(map_id, lock);
        }
        loaded
    }

    fn load_locked(&self, map_id: u32) -> Result<Arc<MapAggregate>> {
        if let Some(map) = self.maps.read().get(&map_id) {
            return Ok(map.clone());
        }
        let map = Arc::new(self.read_map(map_id)?);
        self.maps.write().insert(map_id, map.clone());
        info!(
            map_id,
            items = map.items().total_items(),
            level = map.level(),
            "map loaded"
        );
        Ok(map)
    }

    /// Re-reads the file and swaps the new map in. On failure the previously
    /// loaded map stays in place.
    pub fn reload(&self, map_id: u32) -> Result<Arc<MapAggregate>> {
        let lock = self.lock_for(map_id);
        let reloaded = {
            let _guard = lock.lock();
            self.read_map(map_id).map(|map| {
                let map = Arc::new(map);
                self.maps.write().insert(map_id, map.clone());
                map
            })
        };
        match reloaded {
            Ok(map) => {
                info!(map_id, "map reloaded");
                Ok(map)
            }
            Err(e) => {
                warn!(map_id, error = %e, "reload failed, keeping loaded map");
                self.release_lock(map_id, lock);
                Err(e)
            }
        }
    }

    pub fn unload(&self, map_id: u32) -> Result<()> {
        let lock = self.lock_for(map_id);
        let removed = {
            let _guard = lock.lock();
            self.maps.write().remove(&map_id)
        };
        self.release_lock(map_id, lock);
        match removed {
            Some(_) => {
                info!(map_id, "map unloaded");
                Ok(())
            }
            None => Err(Error::MapNotFound(map_id)),
        }
    }

    /// Registers an already built map, replacing any map with the same id
    pub fn insert(&self, map: MapAggregate) -> Option<Arc<MapAggregate>> {
        let map_id = map.map_id();
        let lock = self.lock_for(map_id);
        let _guard = lock.lock();
        let previous = self.maps.write().insert(map_id, Arc::new(map));
        info!(map_id, replaced = previous.is_some(), "map registered");
        previous
    }

    /// Snapshot of a loaded map
    pub fn get(&self, map_id: u32) -> Result<Arc<MapAggregate>> {
        self.maps
            .read()
            .get(&map_id)
            .cloned()
            .ok_or(Error::MapNotFound(map_id))
    }

    pub fn is_loaded(&self, map_id: u32) -> bool {
        self.maps.read().contains_key(&map_id)
    }

    pub fn loaded_map_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.maps.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Runs `f` on a snapshot of the map
    pub fn with_map<R>(&self, map_id: u32, f: impl FnOnce(&MapAggregate) -> R) -> Result<R> {
        let map = self.get(map_id)?;
        Ok(f(&map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, ItemType};
    use tempfile::TempDir;

    #[test]
    fn load_unload_cycle() {
        let dir = TempDir::new().unwrap();
        let mut map = MapAggregate::new(42, 0);
        map.add_item(13, Item::new(ItemType::Park)).unwrap();
        MapFile::write(MapFile::path_for(dir.path(), 42), &map).unwrap();

        let handler = MapHandler::new(dir.path());
        assert!(matches!(handler.get(42), Err(Error::MapNotFound(42))));
        let loaded = handler.load(42).unwrap();
        assert_eq!(loaded.items().total_items(), 1);
        assert!(Arc::ptr_eq(&loaded, &handler.load(42).unwrap()));
        assert_eq!(handler.loaded_map_ids(), vec![42]);
        assert_eq!(handler.with_map(42, |m| m.map_id()).unwrap(), 42);

        handler.unload(42).unwrap();
        assert!(!handler.is_loaded(42));
        assert!(matches!(handler.unload(42), Err(Error::MapNotFound(42))));
        // the snapshot outlives the unload
        assert_eq!(loaded.map_id(), 42);
    }

    #[test]
    fn lock_table_does_not_outlive_maps() {
        let dir = TempDir::new().unwrap();
        MapFile::write(MapFile::path_for(dir.path(), 42), &MapAggregate::new(42, 0)).unwrap();
        let handler = MapHandler::new(dir.path());

        handler.load(42).unwrap();
        assert!(handler.locks.lock().contains_key(&42));
        handler.unload(42).unwrap();
        assert!(handler.locks.lock().is_empty());

        for unknown in 100..110 {
            assert!(handler.load(unknown).is_err());
            assert!(handler.reload(unknown).is_err());
        }
        assert!(handler.unload(7).is_err());
        assert!(handler.locks.lock().is_empty());
    }

    #[test]
    fn missing_file_is_map_not_found() {
        let dir = TempDir::new().unwrap();
        let handler = MapHandler::new(dir.path());
        assert!(matches!(handler.load(7), Err(Error::MapNotFound(7))));
    }

    #[test]
    fn reload_swaps_snapshot_and_keeps_old_on_failure() {
        let dir = TempDir::new().unwrap();
        let path = MapFile::path_for(dir.path(), 3);
        MapFile::write(&path, &MapAggregate::new(3, 0)).unwrap();
        let handler = MapHandler::new(dir.path());
        let before = handler.load(3).unwrap();

        let mut bigger = MapAggregate::new(3, 0);
        bigger.add_item(5, Item::new(ItemType::Water)).unwrap();
        MapFile::write(&path, &bigger).unwrap();
        let after = handler.reload(3).unwrap();
        assert_eq!(after.items().total_items(), 1);
        assert_eq!(before.items().total_items(), 0);

        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(handler.reload(3), Err(Error::CorruptMap { .. })));
        assert!(Arc::ptr_eq(&after, &handler.get(3).unwrap()));
    }

    #[test]
    fn file_holding_another_map_is_corrupt() {
        let dir = TempDir::new().unwrap();
        MapFile::write(MapFile::path_for(dir.path(), 8), &MapAggregate::new(9, 0)).unwrap();
        let handler = MapHandler::new(dir.path());
        assert!(matches!(handler.load(8), Err(Error::CorruptMap { map_id: 8, .. })));
    }
}
