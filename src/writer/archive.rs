use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::buffer::ChannelEntry;
use crate::writer::layout::archive_entry;

/// Packs a block into one deflated zip archive held in memory.
///
/// Entries are `<pointRel>/<channel>`, channels in map order and samples in
/// buffer order.
pub fn build_archive(
    channels: &BTreeMap<String, ChannelEntry>,
    block_start: i64,
) -> anyhow::Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for (name, entry) in channels {
        for (ts, payload) in entry.samples() {
            zip.start_file(archive_entry(ts - block_start, name), options)?;
            zip.write_all(payload)?;
        }
    }

    Ok(zip.finish()?.into_inner())
}
