//! Fixed-point coordinates and local planar geometry
//!
//! Coordinates are stored as 1e-7 degree integers (the same fixed-point scale
//! the NBG formats use for `lat_fxp`/`lon_fxp`). Distances are metres on a
//! local equirectangular projection, which is accurate well beyond the search
//! radii the query layer works with.

use serde::{Deserialize, Serialize};

/// Fixed-point scale: 1e-7 degrees
pub const SCALE: f64 = 10_000_000.0;

/// Metres per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEG: f64 = 111_319.490_793;

/// A WGS84 position in 1e-7 degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub lat: i32,
    pub lon: i32,
}

impl Coord {
    /// Latitude sentinel meaning "position unknown"
    pub const UNKNOWN: Coord = Coord {
        lat: i32::MAX,
        lon: i32::MAX,
    };

    pub const fn new(lat: i32, lon: i32) -> Self {
        Self { lat, lon }
    }

    pub fn from_degrees(lat: f64, lon: f64) -> Self {
        Self {
            lat: (lat * SCALE).round() as i32,
            lon: (lon * SCALE).round() as i32,
        }
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat as f64 / SCALE
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon as f64 / SCALE
    }

    pub fn is_unknown(&self) -> bool {
        self.lat == i32::MAX
    }

    /// Linear interpolation between two coordinates, `t` in [0, 1]
    pub fn lerp(a: Coord, b: Coord, t: f64) -> Coord {
        let lat = a.lat as f64 + (b.lat as f64 - a.lat as f64) * t;
        let lon = a.lon as f64 + (b.lon as f64 - a.lon as f64) * t;
        Coord {
            lat: lat.round() as i32,
            lon: lon.round() as i32,
        }
    }
}

/// Cosine of a fixed-point latitude, clamped away from zero at the poles
fn lon_scale(lat: i32) -> f64 {
    (lat as f64 / SCALE).to_radians().cos().max(1e-6)
}

/// Planar offset of `p` from `origin` in metres (x east, y north)
pub fn to_local(origin: Coord, p: Coord, cos_lat: f64) -> (f64, f64) {
    let dx = (p.lon as f64 - origin.lon as f64) / SCALE * METERS_PER_DEG * cos_lat;
    let dy = (p.lat as f64 - origin.lat as f64) / SCALE * METERS_PER_DEG;
    (dx, dy)
}

/// Squared distance in square metres
pub fn squared_distance_m(a: Coord, b: Coord) -> f64 {
    let mean_lat = ((a.lat as i64 + b.lat as i64) / 2) as i32;
    let (dx, dy) = to_local(a, b, lon_scale(mean_lat));
    dx * dx + dy * dy
}

pub fn distance_m(a: Coord, b: Coord) -> f64 {
    squared_distance_m(a, b).sqrt()
}

/// Bearing from `a` to `b` in degrees, 0 = north, clockwise, in [0, 360)
pub fn bearing_deg(a: Coord, b: Coord) -> f64 {
    let mean_lat = ((a.lat as i64 + b.lat as i64) / 2) as i32;
    let (dx, dy) = to_local(a, b, lon_scale(mean_lat));
    let deg = dx.atan2(dy).to_degrees();
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

/// Smallest absolute difference between two headings, in [0, 180]
pub fn heading_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Closest point of segment `a`-`b` to `p`.
///
/// Returns the parameter `t` in [0, 1] along the segment and the squared
/// distance in square metres. Computed in a frame centred on `p`.
pub fn project_on_segment(p: Coord, a: Coord, b: Coord) -> (f64, f64) {
    let cos_lat = lon_scale(p.lat);
    let (ax, ay) = to_local(p, a, cos_lat);
    let (bx, by) = to_local(p, b, cos_lat);
    let (sx, sy) = (bx - ax, by - ay);
    let len2 = sx * sx + sy * sy;
    let t = if len2 <= f64::EPSILON {
        0.0
    } else {
        (-(ax * sx + ay * sy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (ax + sx * t, ay + sy * t);
    (t, cx * cx + cy * cy)
}

/// Length of a polyline in metres
pub fn polyline_length_m(coords: &[Coord]) -> f64 {
    coords.windows(2).map(|w| distance_m(w[0], w[1])).sum()
}

/// Axis-aligned bounding box in fixed-point degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub min_lat: i32,
    pub min_lon: i32,
    pub max_lat: i32,
    pub max_lon: i32,
}

impl BBox {
    pub fn from_coords(coords: &[Coord]) -> Option<Self> {
        let first = coords.first()?;
        let mut bbox = BBox {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        for c in &coords[1..] {
            bbox.min_lat = bbox.min_lat.min(c.lat);
            bbox.min_lon = bbox.min_lon.min(c.lon);
            bbox.max_lat = bbox.max_lat.max(c.lat);
            bbox.max_lon = bbox.max_lon.max(c.lon);
        }
        Some(bbox)
    }

    /// Box of half-size `radius_m` around `center`
    pub fn around(center: Coord, radius_m: f64) -> Self {
        let dlat = (radius_m / METERS_PER_DEG * SCALE).ceil() as i64;
        let dlon = (radius_m / (METERS_PER_DEG * lon_scale(center.lat)) * SCALE).ceil() as i64;
        let clamp = |v: i64| v.clamp(i32::MIN as i64, (i32::MAX - 1) as i64) as i32;
        BBox {
            min_lat: clamp(center.lat as i64 - dlat),
            min_lon: clamp(center.lon as i64 - dlon),
            max_lat: clamp(center.lat as i64 + dlat),
            max_lon: clamp(center.lon as i64 + dlon),
        }
    }

    pub fn contains(&self, c: Coord) -> bool {
        c.lat >= self.min_lat && c.lat <= self.max_lat && c.lon >= self.min_lon && c.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_millidegree_of_latitude_is_about_111m() {
        let a = Coord::from_degrees(50.0, 4.0);
        let b = Coord::from_degrees(50.001, 4.0);
        let d = distance_m(a, b);
        assert!((d - 111.3).abs() < 0.5, "got {d}");
    }

    #[test]
    fn bearing_points_clockwise_from_north() {
        let o = Coord::from_degrees(50.0, 4.0);
        let north = Coord::from_degrees(50.001, 4.0);
        let east = Coord::from_degrees(50.0, 4.001);
        assert!(bearing_deg(o, north).abs() < 1e-6);
        assert!((bearing_deg(o, east) - 90.0).abs() < 1e-6);
        assert!((bearing_deg(north, o) - 180.0).abs() < 1e-6);
    }

    #[test]
    fn heading_difference_wraps() {
        assert_eq!(heading_difference(350.0, 10.0), 20.0);
        assert_eq!(heading_difference(10.0, 350.0), 20.0);
        assert_eq!(heading_difference(0.0, 180.0), 180.0);
    }

    #[test]
    fn projection_clamps_to_segment_ends() {
        let a = Coord::from_degrees(50.0, 4.0);
        let b = Coord::from_degrees(50.0, 4.001);
        let before = Coord::from_degrees(50.0, 3.999);
        let (t, _) = project_on_segment(before, a, b);
        assert_eq!(t, 0.0);
        let mid_above = Coord::from_degrees(50.0001, 4.0005);
        let (t, d2) = project_on_segment(mid_above, a, b);
        assert!((t - 0.5).abs() < 1e-3);
        assert!((d2.sqrt() - 11.13).abs() < 0.1);
    }

    #[test]
    fn bbox_around_contains_center() {
        let c = Coord::from_degrees(45.0, 7.0);
        let bbox = BBox::around(c, 100.0);
        assert!(bbox.contains(c));
        assert!(!bbox.contains(Coord::from_degrees(45.01, 7.0)));
    }
}
