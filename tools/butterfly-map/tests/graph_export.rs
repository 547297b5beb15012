//! Graph export stream checks, including maps loaded back from disk

mod common;

use butterfly_map::export::{split_blocks, EXTERNAL_RESTRICTIONS};
use butterfly_map::graph::{Connection, NodeId, TurnDirection};
use butterfly_map::{GraphExport, MapFile, MapHandler};
use tempfile::TempDir;

use common::{town, MapBuilder};

const NODES: usize = 2;
const FORWARD: usize = 3;
const BACKWARD: usize = 4;
const EXTERNAL_NODES: usize = 5;
const EXTERNAL_CONNECTIONS: usize = 6;

#[test]
fn test_export_indices_resolve() {
    let town = town(3);
    let bytes = GraphExport::new(&town.map).to_bytes().unwrap();
    let blocks = split_blocks(&bytes).unwrap();

    let node_count = blocks[NODES].count;
    assert_eq!(node_count, 10);
    let ids: Vec<u32> = blocks[NODES].words().chunks(4).map(|r| r[0]).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "nodes sorted by id");

    let forward = blocks[FORWARD].words();
    assert_eq!(blocks[FORWARD].count, 6);
    for rec in forward.chunks(7) {
        assert!(rec[0] < node_count && rec[1] < node_count);
        // every traversal takes time
        assert!(rec[3] > 0);
    }
    assert!(forward.chunks(7).map(|r| r[0]).collect::<Vec<_>>().windows(2).all(|w| w[0] <= w[1]));

    let backward = blocks[BACKWARD].words();
    assert_eq!(blocks[BACKWARD].count, 6);
    for rec in backward.chunks(3) {
        assert!(rec[0] < node_count && rec[1] < node_count);
        let data = &forward[rec[2] as usize * 7..rec[2] as usize * 7 + 2];
        assert_eq!(data, &[rec[1], rec[0]]);
    }
    assert!(backward.chunks(3).map(|r| r[0]).collect::<Vec<_>>().windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_export_survives_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let town = town(3);
    let expected = GraphExport::new(&town.map).to_bytes().unwrap();
    MapFile::write(MapFile::path_for(dir.path(), 3), &town.map).unwrap();

    let handler = MapHandler::new(dir.path());
    let loaded = handler.load(3).unwrap();
    let first = GraphExport::new(&loaded).to_bytes().unwrap();
    let second = GraphExport::new(&loaded).to_bytes().unwrap();
    assert_eq!(first, second);
    assert_eq!(first, expected);
}

#[test]
fn test_boundary_exclusivity_on_detail_map() {
    let mut b = MapBuilder::new(8, 0);
    let entry = b.segment((50.0, 4.0), (50.0, 4.001));
    let mixed = b.segment((50.0, 4.001), (50.0, 4.002));
    let inner = b.segment((50.0, 4.002), (50.0, 4.003));
    b.connect(inner.node1(), mixed.node1(), TurnDirection::FollowRoad);
    let map = b.map_mut();
    for raw in [0x0000_0010, 0x0000_0011] {
        let foreign = Connection::new(NodeId::from_raw(raw), TurnDirection::FollowRoad);
        assert!(map.add_boundary_connection(9, foreign, entry.node0()).unwrap());
    }
    let foreign = Connection::new(NodeId::from_raw(0x8000_0012), TurnDirection::FollowRoad);
    assert!(map.add_boundary_connection(9, foreign, mixed.node1()).unwrap());
    // a second neighbour cannot claim the same node
    let other = Connection::new(NodeId::from_raw(0x0000_0020), TurnDirection::Ahead);
    assert!(!map.add_boundary_connection(10, other, entry.node0()).unwrap());
    let map = b.build();

    let bytes = GraphExport::new(&map).to_bytes().unwrap();
    let blocks = split_blocks(&bytes).unwrap();
    assert_eq!(blocks[EXTERNAL_NODES].count, 1);
    let node = blocks[EXTERNAL_NODES].words();
    assert_eq!(node[1], entry.node0().raw());
    assert_eq!(node[2], 2);
    assert!(node[0] < blocks[NODES].count);

    let ext = blocks[EXTERNAL_CONNECTIONS].words();
    assert_eq!(blocks[EXTERNAL_CONNECTIONS].count, 2);
    assert_eq!(&ext[..7], &[9, 0x8000_0010, 0, 0, 0, 0, EXTERNAL_RESTRICTIONS]);
    assert_eq!(&ext[7..9], &[9, 0x8000_0011]);
}

#[test]
fn test_overview_hierarchy_block() {
    let mut b = MapBuilder::new(500, 1);
    b.segment((50.0, 4.0), (50.0, 4.1));
    b.map_mut().add_overview_map(2, 600);
    let map = b.build();

    let bytes = GraphExport::new(&map).to_bytes().unwrap();
    let blocks = split_blocks(&bytes).unwrap();
    assert_eq!(blocks.len(), 8);
    assert_eq!(blocks[0].count, 2);
    assert_eq!(blocks[0].words(), vec![1, 500, 2, 600]);
    assert_eq!(blocks[7].count, 0);
}

#[test]
fn test_external_nodes_ascend_across_items() {
    let mut b = MapBuilder::new(8, 0);
    let first = b.segment((50.0, 4.0), (50.0, 4.001));
    let second = b.segment((50.0, 4.001), (50.0, 4.002));
    let map = b.map_mut();
    // node1 of the first item sorts after node0 of the second
    let foreign = Connection::new(NodeId::from_raw(0x0000_0030), TurnDirection::FollowRoad);
    assert!(map.add_boundary_connection(9, foreign, first.node1()).unwrap());
    let foreign = Connection::new(NodeId::from_raw(0x0000_0031), TurnDirection::FollowRoad);
    assert!(map.add_boundary_connection(9, foreign, second.node0()).unwrap());
    let map = b.build();

    let bytes = GraphExport::new(&map).to_bytes().unwrap();
    let blocks = split_blocks(&bytes).unwrap();
    assert_eq!(blocks[EXTERNAL_NODES].count, 2);
    let nodes: Vec<(u32, u32)> = blocks[EXTERNAL_NODES]
        .words()
        .chunks(3)
        .map(|r| (r[0], r[1]))
        .collect();
    assert!(nodes[0].0 < nodes[1].0, "external nodes out of order: {nodes:x?}");
    assert_eq!(nodes[0].1, second.node0().raw());
    assert_eq!(nodes[1].1, first.node1().raw());

    // external connections follow the node order
    let ext = blocks[EXTERNAL_CONNECTIONS].words();
    assert_eq!(&ext[..2], &[9, 0x8000_0031]);
    assert_eq!(&ext[7..9], &[9, 0x8000_0030]);
}
