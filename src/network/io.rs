//! Reading and writing [`RoadGraph`] documents.
//!
//! Paths ending in `.gz` are gzip-compressed on write and decompressed on read.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use super::{NetworkError, RoadGraph};

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Opens `path` for buffered reading, decompressing `.gz` files on the fly.
pub fn open_input(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(path)?);
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Loads a graph and checks that its lanes are attached to existing links.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn read_graph(path: &Path) -> Result<RoadGraph, NetworkError> {
    let graph: RoadGraph = serde_json::from_reader(open_input(path)?)?;
    graph.check_consistency()?;

    info!(
        links = graph.network.links.len(),
        lanes = graph.lanes.lane_count(),
        "Road graph loaded"
    );
    Ok(graph)
}

#[tracing::instrument(skip(path, graph), fields(path = %path.display()))]
pub fn write_graph(path: &Path, graph: &RoadGraph) -> Result<(), NetworkError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = BufWriter::new(File::create(path)?);

    if is_gzip(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        serde_json::to_writer(&mut encoder, graph)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = file;
        serde_json::to_writer_pretty(&mut writer, graph)?;
        writer.flush()?;
    }

    debug!(gzip = is_gzip(path), "Road graph written");
    Ok(())
}
