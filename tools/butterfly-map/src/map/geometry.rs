//! Offsets and representative coordinates of items
//!
//! An offset is a position along an item's coordinate list scaled to
//! `[0, 65535]`: 0 at the first coordinate, 65535 at the last one.

use ::geo::{Centroid, InteriorPoint, LineString, Polygon};
use tracing::warn;

use super::MapAggregate;
use crate::geo::{self as fxp, Coord, SCALE};
use crate::item::{Geometry, Item, ItemId};

pub const MAX_OFFSET: u16 = u16::MAX;

/// Projection of a point onto an open polyline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineProjection {
    pub offset: u16,
    pub squared_distance: f64,
    /// Index of the first coordinate of the closest segment
    pub segment: usize,
}

/// Projects `p` onto `coords` taken as an open polyline
pub fn project_on_polyline(coords: &[Coord], p: Coord) -> Option<PolylineProjection> {
    match coords {
        [] => None,
        [only] => Some(PolylineProjection {
            offset: 0,
            squared_distance: fxp::squared_distance_m(p, *only),
            segment: 0,
        }),
        _ => {
            let mut best: Option<(usize, f64, f64)> = None;
            for (i, w) in coords.windows(2).enumerate() {
                let (t, d2) = fxp::project_on_segment(p, w[0], w[1]);
                if best.map_or(true, |(_, _, b)| d2 < b) {
                    best = Some((i, t, d2));
                }
            }
            let (segment, t, squared_distance) = best?;
            let total = fxp::polyline_length_m(coords);
            let offset = if total <= f64::EPSILON {
                0
            } else {
                let before = fxp::polyline_length_m(&coords[..=segment]);
                let along = before + t * fxp::distance_m(coords[segment], coords[segment + 1]);
                to_offset(along / total)
            };
            Some(PolylineProjection {
                offset,
                squared_distance,
                segment,
            })
        }
    }
}

/// Fraction in [0, 1] to offset
pub fn to_offset(fraction: f64) -> u16 {
    (fraction.clamp(0.0, 1.0) * MAX_OFFSET as f64).round() as u16
}

pub fn to_fraction(offset: u16) -> f64 {
    offset as f64 / MAX_OFFSET as f64
}

/// Coordinate at `offset` along `coords`
pub fn coordinate_at(coords: &[Coord], offset: u16) -> Option<Coord> {
    let first = *coords.first()?;
    if coords.len() == 1 {
        return Some(first);
    }
    let total = fxp::polyline_length_m(coords);
    if total <= f64::EPSILON {
        return Some(first);
    }
    let target = to_fraction(offset) * total;
    let mut walked = 0.0;
    for w in coords.windows(2) {
        let len = fxp::distance_m(w[0], w[1]);
        if walked + len >= target && len > 0.0 {
            return Some(Coord::lerp(w[0], w[1], (target - walked) / len));
        }
        walked += len;
    }
    coords.last().copied()
}

/// Bearing of the polyline segment starting at coordinate `segment`
pub fn tangent_at(coords: &[Coord], segment: usize) -> Option<f64> {
    let a = *coords.get(segment)?;
    let b = *coords.get(segment + 1)?;
    (a != b).then(|| fxp::bearing_deg(a, b))
}

fn to_geo(c: Coord) -> ::geo::Coord<f64> {
    ::geo::Coord {
        x: c.lon as f64 / SCALE,
        y: c.lat as f64 / SCALE,
    }
}

fn from_geo(p: ::geo::Point<f64>) -> Coord {
    Coord::from_degrees(p.y(), p.x())
}

/// A point of the geometry suitable to stand for the whole item
fn representative_point(geometry: &Geometry) -> Option<Coord> {
    match geometry.coords.len() {
        0 => None,
        1 => Some(geometry.coords[0]),
        _ if geometry.closed && geometry.coords.len() >= 3 => {
            let ring: LineString<f64> = geometry.coords.iter().map(|&c| to_geo(c)).collect();
            let polygon = Polygon::new(ring, vec![]);
            polygon
                .interior_point()
                .or_else(|| polygon.centroid())
                .map(from_geo)
        }
        _ => coordinate_at(&geometry.coords, MAX_OFFSET / 2),
    }
}

impl MapAggregate {
    /// Offset of the closest point of the item's polyline to `p`.
    /// `None` when the item has no usable geometry.
    pub fn get_item_offset(&self, item: &Item, p: Coord) -> Option<u16> {
        let geometry = item.usable_geometry()?;
        project_on_polyline(&geometry.coords, p).map(|proj| proj.offset)
    }

    /// Coordinate at `offset` along the item. POIs without geometry of their
    /// own resolve through the street segment they sit on.
    pub fn get_item_coordinates(&self, id: ItemId, offset: u16) -> Option<Coord> {
        let item = self.item_lookup(id)?;
        if let Some(geometry) = item.usable_geometry() {
            return coordinate_at(&geometry.coords, offset);
        }
        let segment = item.as_poi()?.street_segment?;
        let geometry = self.item_lookup(segment)?.usable_geometry()?;
        coordinate_at(&geometry.coords, offset)
    }

    /// A coordinate standing for the item: the point itself, the middle of a
    /// polyline, an interior point of a polygon, or for a POI without geometry
    /// the position of its offset on the street segment.
    pub fn get_one_good_coordinate(&self, item: &Item) -> Option<Coord> {
        if let Some(c) = item.usable_geometry().and_then(representative_point) {
            return Some(c);
        }
        if let Some(poi) = item.as_poi() {
            let segment = poi.street_segment?;
            return self.get_item_coordinates(segment, poi.offset);
        }
        warn!(map_id = self.map_id(), item_id = %item.id(), "item has no usable coordinate");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;

    fn line() -> Vec<Coord> {
        vec![
            Coord::from_degrees(50.0, 4.0),
            Coord::from_degrees(50.0, 4.001),
            Coord::from_degrees(50.001, 4.001),
        ]
    }

    #[test]
    fn offsets_span_the_polyline() {
        let coords = line();
        assert_eq!(project_on_polyline(&coords, coords[0]).unwrap().offset, 0);
        assert_eq!(project_on_polyline(&coords, coords[2]).unwrap().offset, MAX_OFFSET);
        let mid = project_on_polyline(&coords, coords[1]).unwrap();
        // first leg ~71.5 m, second ~111.3 m
        let expected = 71.5 / (71.5 + 111.3) * 65535.0;
        assert!((mid.offset as f64 - expected).abs() < 200.0, "{mid:?}");
    }

    #[test]
    fn coordinate_at_inverts_offset() {
        let coords = line();
        let p = Coord::from_degrees(50.0005, 4.001);
        let proj = project_on_polyline(&coords, p).unwrap();
        let back = coordinate_at(&coords, proj.offset).unwrap();
        assert!(fxp::distance_m(back, p) < 0.1);
    }

    #[test]
    fn poi_coordinates_follow_street_segment() {
        let mut map = MapAggregate::new(1, 0);
        let seg = map
            .add_item(13, Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(line())))
            .unwrap();
        let mut poi = Item::new(ItemType::PointOfInterest);
        poi.as_poi_mut().unwrap().street_segment = Some(seg);
        poi.as_poi_mut().unwrap().offset = 0;
        let poi = map.add_item(14, poi).unwrap();
        assert_eq!(map.get_item_coordinates(poi, 0), Some(line()[0]));
        let item = map.item_lookup(poi).unwrap();
        assert_eq!(map.get_one_good_coordinate(item), Some(line()[0]));
        assert!(map.get_item_offset(item, line()[1]).is_none());
    }

    #[test]
    fn polygon_representative_point_is_inside() {
        let square = Geometry::polygon(vec![
            Coord::from_degrees(0.0, 0.0),
            Coord::from_degrees(0.0, 0.01),
            Coord::from_degrees(0.01, 0.01),
            Coord::from_degrees(0.01, 0.0),
        ]);
        let c = representative_point(&square).unwrap();
        assert!(square.contains(c), "{c:?}");
    }
}
