//! TCP front end of the graph export
//!
//! A client connects, sends the map id as a big-endian `u32` and receives the
//! export stream. Map loading and the export run on blocking threads, the
//! export writing straight to the socket. Unknown maps get no bytes at all; the connection is closed.

use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use super::GraphExport;
use crate::handler::MapHandler;

pub async fn serve(handler: Arc<MapHandler>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind graph export listener on {bind}"))?;
    info!(addr = %listener.local_addr()?, "graph export server listening");
    run(listener, handler).await
}

/// Accept loop over an already bound listener
pub async fn run(listener: TcpListener, handler: Arc<MapHandler>) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("Failed to accept export connection")?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(handler, stream, peer).await {
                warn!(%peer, error = %e, "graph export aborted");
            }
        });
    }
}

async fn handle_connection(handler: Arc<MapHandler>, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
    let map_id = stream
        .read_u32()
        .await
        .context("Failed to read requested map id")?;

    // a first request decodes the map file and may wait on its load lock
    let loaded = tokio::task::spawn_blocking(move || handler.get(map_id).or_else(|_| handler.load(map_id)))
        .await
        .context("Map load task panicked")?;
    let map = match loaded {
        Ok(map) => map,
        Err(e) => {
            // nothing is written; dropping the stream closes the connection
            error!(%peer, map_id, error = %e, "graph export requested for unavailable map");
            return Ok(());
        }
    };

    let socket = stream.into_std()?;
    socket.set_nonblocking(false)?;
    let summary = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut out = BufWriter::new(socket);
        let summary = GraphExport::new(&map).run(&mut out)?;
        out.flush()?;
        Ok(summary)
    })
    .await
    .context("Export task panicked")??;

    info!(%peer, map_id, bytes = summary.bytes, "graph export sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::split_blocks;
    use crate::formats::MapFile;
    use crate::geo::Coord;
    use crate::item::{Geometry, Item, ItemType};
    use crate::map::MapAggregate;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    async fn start(handler: Arc<MapHandler>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run(listener, handler));
        addr
    }

    async fn request(addr: SocketAddr, map_id: u32) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_u32(map_id).await.unwrap();
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await.unwrap();
        bytes
    }

    #[tokio::test]
    async fn streams_export_of_loaded_map() {
        let dir = TempDir::new().unwrap();
        let handler = Arc::new(MapHandler::new(dir.path()));
        let mut map = MapAggregate::new(5, 0);
        map.add_item(
            13,
            Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                Coord::from_degrees(50.0, 4.0),
                Coord::from_degrees(50.0, 4.001),
            ])),
        )
        .unwrap();
        let expected = GraphExport::new(&map).to_bytes().unwrap();
        handler.insert(map);

        let addr = start(handler).await;
        let bytes = request(addr, 5).await;
        assert_eq!(bytes, expected);
        assert_eq!(split_blocks(&bytes).unwrap()[2].count, 2);
    }

    #[tokio::test]
    async fn concurrent_first_requests_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let mut map = MapAggregate::new(6, 0);
        map.add_item(
            13,
            Item::new(ItemType::StreetSegment).with_geometry(Geometry::polyline(vec![
                Coord::from_degrees(50.0, 4.0),
                Coord::from_degrees(50.0, 4.001),
            ])),
        )
        .unwrap();
        let expected = GraphExport::new(&map).to_bytes().unwrap();
        MapFile::write(MapFile::path_for(dir.path(), 6), &map).unwrap();

        let handler = Arc::new(MapHandler::new(dir.path()));
        let addr = start(handler.clone()).await;
        let (first, second) = tokio::join!(request(addr, 6), request(addr, 6));
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(handler.loaded_map_ids(), vec![6]);
    }

    #[tokio::test]
    async fn unknown_map_gets_empty_stream() {
        let dir = TempDir::new().unwrap();
        let addr = start(Arc::new(MapHandler::new(dir.path()))).await;
        assert!(request(addr, 77).await.is_empty());
    }
}
