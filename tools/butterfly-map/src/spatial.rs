//! Spatial hash index over item geometry
//!
//! A uniform grid keyed by quantized `(lon, lat)` cells. Every item with
//! geometry is registered in each cell its bounding box covers; items covering
//! more than [`MAX_CELLS_PER_ITEM`] cells (country polygons, long ferries) go
//! to an overflow list that every query checks.
//!
//! The index holds item ids only. Queries receive the item store they were
//! built from and the set of allowed item types, so one built index can serve
//! concurrent queries with different filters.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::config::SpatialConfig;
use crate::geo::{BBox, Coord, METERS_PER_DEG, SCALE};
use crate::item::{Item, ItemId, ItemStore, ItemTypeSet};

/// Items spanning more cells than this live in the overflow list
pub const MAX_CELLS_PER_ITEM: i64 = 1024;

/// Grid cell key, `(lon_cell, lat_cell)`
type CellKey = (i32, i32);

#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: i64,
    max_rings: u32,
    cells: FxHashMap<CellKey, Vec<ItemId>>,
    oversized: Vec<ItemId>,
    /// Cell extent of the indexed data, `(min, max)`
    extent: Option<(CellKey, CellKey)>,
    indexed: usize,
}

impl SpatialHash {
    pub fn build(items: &ItemStore, config: &SpatialConfig) -> Self {
        let cell_size = ((config.cell_size_deg * SCALE).round() as i64).max(1);
        let mut index = Self {
            cell_size,
            max_rings: config.max_rings,
            cells: FxHashMap::default(),
            oversized: Vec::new(),
            extent: None,
            indexed: 0,
        };
        for item in items.iter() {
            index.insert(item);
        }
        debug!(
            items = index.indexed,
            cells = index.cells.len(),
            oversized = index.oversized.len(),
            "spatial hash built"
        );
        index
    }

    /// Key function; the axis order is `(lon, lat)`
    fn cell_of(&self, lon: i32, lat: i32) -> CellKey {
        (
            (lon as i64).div_euclid(self.cell_size) as i32,
            (lat as i64).div_euclid(self.cell_size) as i32,
        )
    }

    fn insert(&mut self, item: &Item) {
        let Some(bbox) = item.usable_geometry().and_then(|g| g.bbox()) else {
            return;
        };
        let lo = self.cell_of(bbox.min_lon, bbox.min_lat);
        let hi = self.cell_of(bbox.max_lon, bbox.max_lat);
        self.extent = Some(match self.extent {
            None => (lo, hi),
            Some((min, max)) => (
                (min.0.min(lo.0), min.1.min(lo.1)),
                (max.0.max(hi.0), max.1.max(hi.1)),
            ),
        });
        self.indexed += 1;

        let span = (hi.0 as i64 - lo.0 as i64 + 1) * (hi.1 as i64 - lo.1 as i64 + 1);
        if span > MAX_CELLS_PER_ITEM {
            self.oversized.push(item.id());
            return;
        }
        for x in lo.0..=hi.0 {
            for y in lo.1..=hi.1 {
                self.cells.entry((x, y)).or_default().push(item.id());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.indexed
    }

    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }

    /// Narrowest edge of a cell at this latitude, metres
    fn cell_edge_m(&self, lat: i32) -> f64 {
        let deg = self.cell_size as f64 / SCALE;
        let cos_lat = (lat as f64 / SCALE).to_radians().cos().max(1e-6);
        deg * METERS_PER_DEG * cos_lat
    }

    /// Cells at Chebyshev distance exactly `ring` from `center`
    fn ring_cells(center: CellKey, ring: i32) -> impl Iterator<Item = CellKey> {
        let (cx, cy) = center;
        (-ring..=ring).flat_map(move |dx| {
            (-ring..=ring).filter_map(move |dy| {
                (dx.abs() == ring || dy.abs() == ring).then_some((cx + dx, cy + dy))
            })
        })
    }

    /// True once `ring` reaches beyond every indexed cell
    fn ring_covers_extent(&self, center: CellKey, ring: i32) -> bool {
        let Some((min, max)) = self.extent else {
            return true;
        };
        center.0 - ring <= min.0
            && center.0 + ring >= max.0
            && center.1 - ring <= min.1
            && center.1 + ring >= max.1
    }

    fn consider(
        items: &ItemStore,
        id: ItemId,
        p: Coord,
        types: ItemTypeSet,
        best: &mut Option<(ItemId, f64)>,
    ) {
        let Some(item) = items.item_lookup(id) else {
            return;
        };
        if !types.contains(item.item_type()) {
            return;
        }
        let Some(d2) = item.usable_geometry().and_then(|g| g.squared_distance(p)) else {
            return;
        };
        let better = match *best {
            None => true,
            Some((best_id, best_d2)) => d2 < best_d2 || (d2 == best_d2 && id < best_id),
        };
        if better {
            *best = Some((id, d2));
        }
    }

    /// Closest item of an allowed type and its squared distance in m².
    ///
    /// Searches ring by ring around the query cell. After ring `k` every
    /// unseen item is at least `k` cell edges away, so the search stops as
    /// soon as the best candidate is closer than that. `None` when nothing is
    /// found within `max_rings`.
    pub fn get_closest(&self, items: &ItemStore, p: Coord, types: ItemTypeSet) -> Option<(ItemId, f64)> {
        if types.is_empty() || self.is_empty() || p.is_unknown() {
            return None;
        }
        let mut best = None;
        for &id in &self.oversized {
            Self::consider(items, id, p, types, &mut best);
        }

        let center = self.cell_of(p.lon, p.lat);
        let edge = self.cell_edge_m(p.lat);
        let mut seen = FxHashSet::default();
        for ring in 0..=self.max_rings as i32 {
            for key in Self::ring_cells(center, ring) {
                let Some(ids) = self.cells.get(&key) else {
                    continue;
                };
                for &id in ids {
                    if seen.insert(id) {
                        Self::consider(items, id, p, types, &mut best);
                    }
                }
            }
            if let Some((_, d2)) = best {
                let bound = ring as f64 * edge;
                if d2 <= bound * bound {
                    break;
                }
            }
            if self.ring_covers_extent(center, ring) {
                break;
            }
        }
        best
    }

    /// Every allowed item whose geometry lies within `radius_m` of `p`
    pub fn get_all_within_radius(
        &self,
        items: &ItemStore,
        p: Coord,
        radius_m: f64,
        types: ItemTypeSet,
    ) -> BTreeSet<ItemId> {
        let mut found = BTreeSet::new();
        if types.is_empty() || p.is_unknown() || radius_m < 0.0 {
            return found;
        }
        let r2 = radius_m * radius_m;
        for id in self.candidates(&BBox::around(p, radius_m)) {
            let Some(item) = items.item_lookup(id) else {
                continue;
            };
            if !types.contains(item.item_type()) {
                continue;
            }
            let within = item
                .usable_geometry()
                .and_then(|g| g.squared_distance(p))
                .is_some_and(|d2| d2 <= r2);
            if within {
                found.insert(id);
            }
        }
        found
    }

    /// Every allowed item whose geometry bounding box intersects `bbox`
    pub fn get_all_within_bbox(&self, items: &ItemStore, bbox: &BBox, types: ItemTypeSet) -> BTreeSet<ItemId> {
        let mut found = BTreeSet::new();
        if types.is_empty() {
            return found;
        }
        for id in self.candidates(bbox) {
            let Some(item) = items.item_lookup(id) else {
                continue;
            };
            if !types.contains(item.item_type()) {
                continue;
            }
            let hit = item
                .usable_geometry()
                .and_then(|g| g.bbox())
                .is_some_and(|b| b.intersects(bbox));
            if hit {
                found.insert(id);
            }
        }
        found
    }

    /// Ids registered in the cells covering `bbox`, plus the overflow list
    fn candidates(&self, bbox: &BBox) -> FxHashSet<ItemId> {
        let mut ids: FxHashSet<ItemId> = self.oversized.iter().copied().collect();
        let Some((min, max)) = self.extent else {
            return ids;
        };
        let lo = self.cell_of(bbox.min_lon, bbox.min_lat);
        let hi = self.cell_of(bbox.max_lon, bbox.max_lat);
        let (x0, x1) = (lo.0.max(min.0), hi.0.min(max.0));
        let (y0, y1) = (lo.1.max(min.1), hi.1.min(max.1));
        for x in x0..=x1 {
            for y in y0..=y1 {
                if let Some(cell) = self.cells.get(&(x, y)) {
                    ids.extend(cell.iter().copied());
                }
            }
        }
        ids
    }
}
