use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::Level;

use crate::buffer::ChannelEntry;
use crate::core::{ComponentLogger, LogContext};
use crate::sink::Sink;
use crate::writer::archive::build_archive;
use crate::writer::layout::BlockLayout;

/// A block taken out of the live buffer, owned by the flush path.
#[derive(Debug, Clone)]
pub struct BlockSnapshot {
    pub source_start: i64,
    pub segment_start: Option<i64>,
    pub block_start: i64,
    pub channels: BTreeMap<String, ChannelEntry>,
    /// This block was the last of its segment.
    pub segment_complete: bool,
}

impl BlockSnapshot {
    pub fn layout(&self, base: &str) -> BlockLayout {
        let (segment_rel, block_rel) = match self.segment_start {
            Some(segment) => (Some(segment - self.source_start), self.block_start - segment),
            None => (None, self.block_start - self.source_start),
        };
        BlockLayout::new(base, self.source_start, segment_rel, block_rel)
    }

    pub fn sample_count(&self) -> usize {
        self.channels.values().map(ChannelEntry::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Output units handed to the sink successfully.
    pub units: usize,
    pub failures: usize,
    pub bytes: u64,
    /// The sink became unavailable and the rest of the block was dropped.
    pub aborted: bool,
    pub segment_complete: bool,
}

/// Turns block snapshots into sink writes.
pub struct FlushEngine {
    base: String,
    zip: AtomicBool,
    sink: Arc<dyn Sink>,
}

impl FlushEngine {
    pub fn new(base: &str, zip: bool, sink: Arc<dyn Sink>) -> Self {
        Self {
            base: base.to_string(),
            zip: AtomicBool::new(zip),
            sink,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn zip(&self) -> bool {
        self.zip.load(Ordering::Relaxed)
    }

    pub fn set_zip(&self, zip: bool) {
        self.zip.store(zip, Ordering::Relaxed);
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Writes one block. Failures are logged and counted, never returned.
    pub fn write_block(&self, snapshot: &BlockSnapshot) -> FlushReport {
        let layout = snapshot.layout(&self.base);
        let mut report = FlushReport {
            segment_complete: snapshot.segment_complete,
            ..FlushReport::default()
        };

        if self.zip() {
            self.write_archive(&layout, snapshot, &mut report);
        } else {
            self.write_samples(&layout, snapshot, &mut report);
        }

        if log::log_enabled!(Level::Debug) {
            let ctx = self.block_context(&layout);
            log::debug!(
                "{}",
                ctx.format(
                    Level::Debug,
                    &format!(
                        "{} samples -> {} units, {} bytes, {} failures{}",
                        snapshot.sample_count(),
                        report.units,
                        report.bytes,
                        report.failures,
                        if report.aborted { " (aborted)" } else { "" }
                    )
                )
            );
        }
        report
    }

    /// Log context tagged with the directory of the block being written.
    pub fn block_context(&self, layout: &BlockLayout) -> LogContext {
        self.log_context().with_block(&layout.block_dir())
    }

    fn write_samples(&self, layout: &BlockLayout, snapshot: &BlockSnapshot, report: &mut FlushReport) {
        for (name, entry) in &snapshot.channels {
            for (ts, payload) in entry.samples() {
                let dir = layout.sample_dir(ts - snapshot.block_start);
                if !self.deliver(&dir, name, payload, report) {
                    return;
                }
            }
        }
    }

    fn write_archive(&self, layout: &BlockLayout, snapshot: &BlockSnapshot, report: &mut FlushReport) {
        match build_archive(&snapshot.channels, snapshot.block_start) {
            Ok(bytes) => {
                self.deliver(&layout.parent_dir(), &layout.archive_name(), &bytes, report);
            }
            Err(e) => {
                report.failures += 1;
                self.error(&format!(
                    "building archive {}{} failed: {}",
                    layout.parent_dir(),
                    layout.archive_name(),
                    e
                ));
            }
        }
    }

    /// Returns false once the sink is unavailable for the rest of the block.
    fn deliver(&self, dir: &str, name: &str, bytes: &[u8], report: &mut FlushReport) -> bool {
        match self.sink.write(dir, name, bytes) {
            Ok(()) => {
                report.units += 1;
                report.bytes += bytes.len() as u64;
                true
            }
            Err(e) if e.is_fatal() => {
                report.failures += 1;
                report.aborted = true;
                self.error(&format!("dropping rest of block: {}", e));
                false
            }
            Err(e) => {
                report.failures += 1;
                self.warn(&format!("{}{}: {}", dir, name, e));
                true
            }
        }
    }
}

impl ComponentLogger for FlushEngine {
    fn log_context(&self) -> LogContext {
        LogContext::new("FlushEngine", &self.base)
    }
}
