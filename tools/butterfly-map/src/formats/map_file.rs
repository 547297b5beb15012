//! `.mcm` map file format - one map aggregate per file
//!
//! Little-endian throughout. Layout:
//! - header (16 bytes): magic, version, flags, map id, level, 3 reserved
//! - string table: count, then `len u32 + utf8` per string
//! - 16 zoom levels: slot count, then per slot a presence byte and an item record
//! - boundary table (only when flag bit 0 is set)
//! - multi-connection table
//! - overview map list and overview id-translation table
//! - footer: CRC-64 of everything above, twice
//!
//! Files are named `{map_id:09}.mcm`.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::BufMut;
use thiserror::Error;
use tracing::debug;

use super::crc::{self, FooterCheck};
use crate::boundary::BoundaryTable;
use crate::geo::Coord;
use crate::graph::{Connection, EntryRestriction, NodeExpansionTable, NodeId, TurnDirection};
use crate::item::{
    Geometry, HouseNumbers, Item, ItemId, ItemKind, ItemType, Name, NameType, NumberingScheme,
    PoiType, MAX_INDEX_IN_ZOOM, NBR_ZOOM_LEVELS,
};
use crate::map::MapAggregate;
use crate::strings::StringTable;

const MAGIC: u32 = 0x4D43_4D31; // "MCM1"
const VERSION: u16 = 1;
const HEADER_LEN: usize = 16;
const FLAG_HAS_BOUNDARY: u16 = 1;
const NO_ITEM: u32 = u32::MAX;

const KIND_PLAIN: u8 = 0;
const KIND_ROUTEABLE: u8 = 1;
const KIND_POI: u8 = 2;
const KIND_INDEX_AREA: u8 = 3;

const GEOMETRY_NONE: u8 = 0;
const GEOMETRY_OPEN: u8 = 1;
const GEOMETRY_CLOSED: u8 = 2;

#[derive(Debug, Error)]
pub enum MapFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),

    #[error("unsupported version {0}")]
    UnsupportedVersion(u16),

    #[error("CRC64 mismatch: computed 0x{computed:016X}, stored 0x{stored:016X}")]
    CrcMismatch { computed: u64, stored: u64 },

    #[error("file truncated while reading {0}")]
    Truncated(&'static str),

    #[error("invalid {what}: {value}")]
    Invalid { what: &'static str, value: u64 },
}

impl MapFileError {
    fn invalid(what: &'static str, value: impl Into<u64>) -> Self {
        MapFileError::Invalid {
            what,
            value: value.into(),
        }
    }

    /// Maps a codec failure to the workspace error for `map_id`: a missing
    /// file is an absent map, anything else a corrupt one
    pub fn into_map_error(self, map_id: u32) -> butterfly_common::Error {
        match self {
            MapFileError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                butterfly_common::Error::MapNotFound(map_id)
            }
            MapFileError::Io(e) => butterfly_common::Error::Io(e),
            other => butterfly_common::Error::corrupt(map_id, other.to_string()),
        }
    }
}

type Result<T> = std::result::Result<T, MapFileError>;

/// Header fields and checksum of a map file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFileSummary {
    pub map_id: u32,
    pub level: u8,
    pub version: u16,
    pub has_boundary: bool,
    pub crc: u64,
    pub size: u64,
}

pub struct MapFile;

impl MapFile {
    pub const EXTENSION: &'static str = "mcm";

    pub fn file_name(map_id: u32) -> String {
        format!("{map_id:09}.{}", Self::EXTENSION)
    }

    pub fn path_for(dir: &Path, map_id: u32) -> PathBuf {
        dir.join(Self::file_name(map_id))
    }

    pub fn write<P: AsRef<Path>>(path: P, map: &MapAggregate) -> Result<()> {
        let data = Self::encode(map);
        fs::write(path.as_ref(), &data)?;
        debug!(
            map_id = map.map_id(),
            bytes = data.len(),
            path = %path.as_ref().display(),
            "map file written"
        );
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<MapAggregate> {
        let data = fs::read(path.as_ref())?;
        Self::decode(&data)
    }

    /// Checks header and CRC without decoding the body
    pub fn verify<P: AsRef<Path>>(path: P) -> Result<MapFileSummary> {
        let data = fs::read(path.as_ref())?;
        let (body, crc) = checked_body(&data)?;
        let header = Header::parse(&mut Reader::new(body))?;
        Ok(MapFileSummary {
            map_id: header.map_id,
            level: header.level,
            version: header.version,
            has_boundary: header.flags & FLAG_HAS_BOUNDARY != 0,
            crc,
            size: data.len() as u64,
        })
    }

    pub fn encode(map: &MapAggregate) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::new();

        let flags = if map.boundary().is_some() { FLAG_HAS_BOUNDARY } else { 0 };
        buf.put_u32_le(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u16_le(flags);
        buf.put_u32_le(map.map_id());
        buf.put_u8(map.level());
        buf.put_bytes(0, 3);

        buf.put_u32_le(map.strings().len() as u32);
        for s in map.strings().iter() {
            buf.put_u32_le(s.len() as u32);
            buf.put_slice(s.as_bytes());
        }

        for zoom in 0..NBR_ZOOM_LEVELS as u8 {
            let slots = map.nbr_items_with_zoom(zoom);
            buf.put_u32_le(slots);
            for index in 0..slots {
                match map.get_item(zoom, index) {
                    Some(item) => {
                        buf.put_u8(1);
                        put_item(&mut buf, item);
                    }
                    None => buf.put_u8(0),
                }
            }
        }

        if let Some(boundary) = map.boundary() {
            buf.put_u32_le(boundary.len() as u32);
            for segment in boundary.iter() {
                buf.put_u32_le(segment.item_id.raw());
                buf.put_u8(segment.adjacent[0] as u8 | (segment.adjacent[1] as u8) << 1);
                for external in &segment.external {
                    buf.put_u32_le(external.len() as u32);
                    for ext in external {
                        buf.put_u32_le(ext.from_map);
                        put_connection(&mut buf, &ext.connection);
                    }
                }
            }
        }

        buf.put_u32_le(map.expansion().len() as u32);
        for (first, last, nodes) in map.expansion().iter() {
            buf.put_u32_le(first.raw());
            buf.put_u32_le(last.raw());
            buf.put_u32_le(nodes.len() as u32);
            for node in nodes {
                buf.put_u32_le(node.raw());
            }
        }

        buf.put_u32_le(map.overview_maps().len() as u32);
        for &(level, map_id) in map.overview_maps() {
            buf.put_u8(level);
            buf.put_u32_le(map_id);
        }

        buf.put_u32_le(map.id_translation().len() as u32);
        for (overview, &(true_map, true_item)) in map.id_translation() {
            buf.put_u32_le(overview.raw());
            buf.put_u32_le(true_map);
            buf.put_u32_le(true_item.raw());
        }

        crc::append_footer(&mut buf);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<MapAggregate> {
        let (body, _) = checked_body(data)?;
        let mut r = Reader::new(body);
        let header = Header::parse(&mut r)?;

        let mut map = if header.flags & FLAG_HAS_BOUNDARY != 0 {
            MapAggregate::new(header.map_id, header.level)
        } else {
            MapAggregate::country(header.map_id, header.level)
        };

        let n_strings = r.u32("string count")?;
        let mut strings = StringTable::new();
        for _ in 0..n_strings {
            let len = r.u32("string length")? as usize;
            let raw = r.bytes(len, "string")?;
            let s = std::str::from_utf8(raw).map_err(|_| MapFileError::invalid("utf8 string", len as u64))?;
            strings.add(s);
        }
        if strings.len() != n_strings as usize {
            return Err(MapFileError::invalid("duplicate strings", n_strings));
        }
        map.set_strings(strings);

        for zoom in 0..NBR_ZOOM_LEVELS as u8 {
            let slots = r.u32("zoom slot count")?;
            // every slot carries at least its presence byte
            if slots as usize > r.remaining() || slots > MAX_INDEX_IN_ZOOM + 1 {
                return Err(MapFileError::invalid("zoom slot count", slots));
            }
            map.reserve_slots(zoom, slots);
            for index in 0..slots {
                if r.u8("slot presence")? == 0 {
                    continue;
                }
                let item = read_item(&mut r)?;
                map.insert_item_at(ItemId::new(zoom, index), item);
            }
        }

        if header.flags & FLAG_HAS_BOUNDARY != 0 {
            let mut boundary = BoundaryTable::new();
            let n_segments = r.u32("boundary count")?;
            for _ in 0..n_segments {
                let item = item_id(r.u32("boundary item")?)?;
                let adjacent = r.u8("boundary adjacency")?;
                for node1 in [false, true] {
                    let node = NodeId::from_item(item, node1);
                    if adjacent & (1 << node1 as u8) != 0 {
                        boundary.mark_adjacent(node);
                    }
                    let n = r.u32("external connection count")?;
                    for _ in 0..n {
                        let from_map = r.u32("external map id")?;
                        let connection = read_connection(&mut r)?;
                        boundary.add_connection(from_map, connection, node);
                    }
                }
            }
            map.set_boundary(Some(boundary));
        }

        let mut expansion = NodeExpansionTable::new();
        let n_multi = r.u32("multi-connection count")?;
        for _ in 0..n_multi {
            let first = NodeId::from_raw(r.u32("multi-connection first")?);
            let last = NodeId::from_raw(r.u32("multi-connection last")?);
            let n = r.u32("multi-connection length")?;
            let nodes = (0..n)
                .map(|_| r.u32("multi-connection node").map(NodeId::from_raw))
                .collect::<Result<Vec<_>>>()?;
            expansion.add(first, last, nodes);
        }
        map.set_expansion(expansion);

        let n_overview = r.u32("overview count")?;
        for _ in 0..n_overview {
            let level = r.u8("overview level")?;
            let map_id = r.u32("overview map id")?;
            map.add_overview_map(level, map_id);
        }

        let n_translation = r.u32("translation count")?;
        for _ in 0..n_translation {
            let overview = item_id(r.u32("overview item")?)?;
            let true_map = r.u32("true map id")?;
            let true_item = item_id(r.u32("true item")?)?;
            map.add_id_translation(overview, true_map, true_item);
        }

        if r.remaining() != 0 {
            return Err(MapFileError::invalid("trailing bytes", r.remaining() as u64));
        }
        Ok(map)
    }
}

fn checked_body(data: &[u8]) -> Result<(&[u8], u64)> {
    match crc::split_footer(data) {
        (body, FooterCheck::Valid(crc)) => Ok((body, crc)),
        (_, FooterCheck::Mismatch { computed, stored }) => {
            Err(MapFileError::CrcMismatch { computed, stored })
        }
        (_, FooterCheck::Missing) => Err(MapFileError::Truncated("footer")),
    }
}

struct Header {
    version: u16,
    flags: u16,
    map_id: u32,
    level: u8,
}

impl Header {
    fn parse(r: &mut Reader<'_>) -> Result<Self> {
        if r.remaining() < HEADER_LEN {
            return Err(MapFileError::Truncated("header"));
        }
        let magic = r.u32("magic")?;
        if magic != MAGIC {
            return Err(MapFileError::BadMagic(magic));
        }
        let version = r.u16("version")?;
        if version != VERSION {
            return Err(MapFileError::UnsupportedVersion(version));
        }
        let flags = r.u16("flags")?;
        let map_id = r.u32("map id")?;
        let level = r.u8("level")?;
        r.bytes(3, "reserved")?;
        Ok(Header {
            version,
            flags,
            map_id,
            level,
        })
    }
}

fn put_connection(buf: &mut Vec<u8>, connection: &Connection) {
    buf.put_u32_le(connection.from.raw());
    buf.put_u8(connection.turn as u8);
    buf.put_u32_le(connection.vehicle_restrictions);
}

fn put_item(buf: &mut Vec<u8>, item: &Item) {
    buf.put_u8(item.item_type() as u8);
    buf.put_u32_le(item.source);

    buf.put_u16_le(item.names.len() as u16);
    for name in &item.names {
        buf.put_u32_le(name.string_index);
        buf.put_u8(name.language);
        buf.put_u8(name.kind as u8);
    }

    buf.put_u16_le(item.groups.len() as u16);
    for group in &item.groups {
        buf.put_u32_le(group.raw());
    }

    match &item.geometry {
        None => buf.put_u8(GEOMETRY_NONE),
        Some(g) => {
            buf.put_u8(if g.closed { GEOMETRY_CLOSED } else { GEOMETRY_OPEN });
            buf.put_u32_le(g.coords.len() as u32);
            for c in &g.coords {
                buf.put_i32_le(c.lat);
                buf.put_i32_le(c.lon);
            }
        }
    }

    match &item.kind {
        ItemKind::Plain => buf.put_u8(KIND_PLAIN),
        ItemKind::Routeable(road) => {
            buf.put_u8(KIND_ROUTEABLE);
            buf.put_u8(road.road_class);
            buf.put_u8(road.speed_limit_kmh);
            buf.put_u16_le(road.flags);
            match &road.house_numbers {
                None => buf.put_u8(0),
                Some(hn) => {
                    buf.put_u8(1);
                    buf.put_u8(hn.scheme as u8);
                    buf.put_u16_le(hn.left_start);
                    buf.put_u16_le(hn.left_end);
                    buf.put_u16_le(hn.right_start);
                    buf.put_u16_le(hn.right_end);
                }
            }
            for node in &road.nodes {
                buf.put_u8(node.entry_restriction as u8);
                buf.put_u32_le(node.connections.len() as u32);
                for connection in &node.connections {
                    put_connection(buf, connection);
                }
            }
        }
        ItemKind::Poi(poi) => {
            buf.put_u8(KIND_POI);
            buf.put_u8(poi.poi_type as u8);
            buf.put_u32_le(poi.street_segment.map_or(NO_ITEM, ItemId::raw));
            buf.put_u16_le(poi.offset);
        }
        ItemKind::IndexArea { order } => {
            buf.put_u8(KIND_INDEX_AREA);
            buf.put_u8(*order);
        }
    }
}

fn item_id(raw: u32) -> Result<ItemId> {
    ItemId::from_raw(raw).ok_or(MapFileError::invalid("item id", raw))
}

fn read_connection(r: &mut Reader<'_>) -> Result<Connection> {
    let from = NodeId::from_raw(r.u32("connection source")?);
    let turn_raw = r.u8("turn direction")?;
    let turn = TurnDirection::from_u8(turn_raw).ok_or(MapFileError::invalid("turn direction", turn_raw))?;
    let vehicle_restrictions = r.u32("vehicle restrictions")?;
    Ok(Connection {
        from,
        turn,
        vehicle_restrictions,
    })
}

fn read_item(r: &mut Reader<'_>) -> Result<Item> {
    let type_raw = r.u8("item type")?;
    let item_type = ItemType::from_u8(type_raw).ok_or(MapFileError::invalid("item type", type_raw))?;
    let mut item = Item::new(item_type).with_source(r.u32("source")?);

    let n_names = r.u16("name count")?;
    for _ in 0..n_names {
        let string_index = r.u32("name string")?;
        let language = r.u8("name language")?;
        let kind_raw = r.u8("name type")?;
        let kind = NameType::from_u8(kind_raw).ok_or(MapFileError::invalid("name type", kind_raw))?;
        item.names.push(Name {
            string_index,
            language,
            kind,
        });
    }

    let n_groups = r.u16("group count")?;
    for _ in 0..n_groups {
        item.groups.push(item_id(r.u32("group id")?)?);
    }

    let geometry_tag = r.u8("geometry tag")?;
    if geometry_tag != GEOMETRY_NONE {
        let n = r.u32("coordinate count")?;
        let mut coords = Vec::with_capacity((n as usize).min(r.remaining() / 8));
        for _ in 0..n {
            let lat = r.i32("latitude")?;
            let lon = r.i32("longitude")?;
            coords.push(Coord::new(lat, lon));
        }
        item.geometry = Some(match geometry_tag {
            GEOMETRY_OPEN => Geometry::polyline(coords),
            GEOMETRY_CLOSED => Geometry::polygon(coords),
            other => return Err(MapFileError::invalid("geometry tag", other)),
        });
    }

    match r.u8("payload tag")? {
        KIND_PLAIN => {}
        KIND_ROUTEABLE => {
            let road = item
                .as_routeable_mut()
                .ok_or(MapFileError::invalid("routeable payload on item type", type_raw))?;
            road.road_class = r.u8("road class")?;
            road.speed_limit_kmh = r.u8("speed limit")?;
            road.flags = r.u16("road flags")?;
            if r.u8("house number presence")? != 0 {
                let scheme_raw = r.u8("numbering scheme")?;
                let scheme = NumberingScheme::from_u8(scheme_raw)
                    .ok_or(MapFileError::invalid("numbering scheme", scheme_raw))?;
                road.house_numbers = Some(HouseNumbers {
                    scheme,
                    left_start: r.u16("left start")?,
                    left_end: r.u16("left end")?,
                    right_start: r.u16("right start")?,
                    right_end: r.u16("right end")?,
                });
            }
            for node in road.nodes.iter_mut() {
                let restriction_raw = r.u8("entry restriction")?;
                node.entry_restriction = EntryRestriction::from_u8(restriction_raw)
                    .ok_or(MapFileError::invalid("entry restriction", restriction_raw))?;
                let n = r.u32("connection count")?;
                for _ in 0..n {
                    node.connections.push(read_connection(r)?);
                }
            }
        }
        KIND_POI => {
            let poi_type_raw = r.u8("poi type")?;
            let poi_type = PoiType::from_u8(poi_type_raw).ok_or(MapFileError::invalid("poi type", poi_type_raw))?;
            let segment = r.u32("poi segment")?;
            let offset = r.u16("poi offset")?;
            let poi = item
                .as_poi_mut()
                .ok_or(MapFileError::invalid("poi payload on item type", type_raw))?;
            poi.poi_type = poi_type;
            poi.street_segment = if segment == NO_ITEM {
                None
            } else {
                Some(item_id(segment)?)
            };
            poi.offset = offset;
        }
        KIND_INDEX_AREA => {
            let order = r.u8("index area order")?;
            item.kind = ItemKind::IndexArea { order };
        }
        other => return Err(MapFileError::invalid("payload tag", other)),
    }
    Ok(item)
}

/// Bounds-checked little-endian reader over the file body
struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> usize {
        self.data.len()
    }

    fn bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(MapFileError::Truncated(what));
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn i32(&mut self, what: &'static str) -> Result<i32> {
        self.array(what).map(i32::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write as IoWrite};
    use tempfile::TempDir;

    fn sample_map() -> MapAggregate {
        let mut map = MapAggregate::new(1234, 0);
        let municipal = map.add_item(2, Item::new(ItemType::Municipal)).unwrap();
        let mut road = Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
            Coord::from_degrees(50.0, 4.0),
            Coord::from_degrees(50.0, 4.001),
        ]));
        road.as_routeable_mut().unwrap().house_numbers = Some(HouseNumbers {
            scheme: NumberingScheme::LeftOdd,
            left_start: 1,
            left_end: 19,
            right_start: 2,
            right_end: 20,
        });
        let a = map.add_item(13, road.clone()).unwrap();
        let b = map.add_item(13, road).unwrap();
        let gone = map.add_item(13, Item::new(ItemType::Building)).unwrap();
        map.remove_item(gone).unwrap();
        map.add_group(a, municipal).unwrap();
        map.add_name(a, 1, NameType::Official, "Rue Haute").unwrap();
        map.add_connection(b.node0(), Connection::new(a.node0(), TurnDirection::FollowRoad))
            .unwrap();
        map.set_entry_restriction(b.node1(), EntryRestriction::NoEntry)
            .unwrap();
        map.add_boundary_connection(77, Connection::new(ItemId::new(13, 9).node0(), TurnDirection::Ahead), a.node1())
            .unwrap();
        map.add_multi_connection(a.node0(), b.node0(), vec![]);
        map.add_overview_map(1, 9000);
        map
    }

    #[test]
    fn test_roundtrip() {
        let dir = TempDir::new().unwrap();
        let map = sample_map();
        let path = MapFile::path_for(dir.path(), map.map_id());
        assert!(path.ends_with("000001234.mcm"));
        MapFile::write(&path, &map).unwrap();
        let loaded = MapFile::read(&path).unwrap();

        assert_eq!(loaded.map_id(), 1234);
        assert_eq!(loaded.nbr_items_with_zoom(13), 3);
        assert_eq!(loaded.items().live_items_with_zoom(13), 2);
        for item in map.items().iter() {
            assert_eq!(loaded.item_lookup(item.id()), Some(item));
        }
        assert_eq!(loaded.strings().get(0), Some("Rue Haute"));
        assert_eq!(loaded.boundary(), map.boundary());
        assert_eq!(loaded.expansion(), map.expansion());
        assert_eq!(loaded.overview_maps(), &[(1, 9000)]);
        loaded.validate().unwrap();
        assert_eq!(MapFile::encode(&loaded), MapFile::encode(&map));
    }

    #[test]
    fn test_crc_detects_body_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(MapFile::file_name(1));
        MapFile::write(&path, &sample_map()).unwrap();
        {
            let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_LEN as u64 + 2)).unwrap();
            file.write_all(&[0xFF]).unwrap();
        }
        let err = MapFile::read(&path).unwrap_err();
        assert!(err.to_string().contains("CRC64 mismatch"), "{err}");
        assert!(MapFile::verify(&path).is_err());
    }

    #[test]
    fn test_oversized_slot_count_is_rejected() {
        let mut buf: Vec<u8> = Vec::new();
        buf.put_u32_le(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u16_le(0);
        buf.put_u32_le(42);
        buf.put_u8(0);
        buf.put_bytes(0, 3);
        buf.put_u32_le(0);
        buf.put_u32_le(u32::MAX);
        crc::append_footer(&mut buf);

        let err = MapFile::decode(&buf).unwrap_err();
        assert!(
            matches!(err, MapFileError::Invalid { what: "zoom slot count", value } if value == u32::MAX as u64),
            "{err}"
        );
        assert!(matches!(
            err.into_map_error(42),
            butterfly_common::Error::CorruptMap { .. }
        ));
    }

    #[test]
    fn test_verify_reads_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("country.mcm");
        let country = MapAggregate::country(5, 3);
        MapFile::write(&path, &country).unwrap();
        let summary = MapFile::verify(&path).unwrap();
        assert_eq!(summary.map_id, 5);
        assert_eq!(summary.level, 3);
        assert!(!summary.has_boundary);
        assert!(MapFile::read(&path).unwrap().boundary().is_none());
    }

    #[test]
    fn test_missing_file_is_map_not_found() {
        let dir = TempDir::new().unwrap();
        let err = MapFile::read(MapFile::path_for(dir.path(), 3)).unwrap_err();
        assert!(matches!(
            err.into_map_error(3),
            butterfly_common::Error::MapNotFound(3)
        ));
    }
}
