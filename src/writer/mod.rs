pub mod archive;
pub mod flush;
pub mod layout;
pub mod retention;
pub mod scheduler;

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::{Anchors, BlockBuffer, ChannelEntry, Clock};
use crate::config::WriterConfig;
use crate::core::lock::lock_mutex;
use crate::core::{ComponentLogger, LogContext, TimeUnit, WriterError, WriterResult, format_anchor};
use crate::sink::{FsSink, HttpSink, PooledHttpSink, Sink};

pub use flush::{BlockSnapshot, FlushEngine, FlushReport};
pub use layout::BlockLayout;
pub use retention::{FsSegmentRetention, RetentionPolicy};
pub use scheduler::FlushScheduler;

/// Outcome of [`Writer::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushStatus {
    /// Flushed on the calling thread.
    Written(FlushReport),
    /// Handed to the async worker.
    Scheduled,
    /// A flush was already in flight; the data stays buffered.
    Coalesced,
    /// Nothing was buffered.
    Empty,
}

/// Everything guarded by the single buffer lock.
struct WriterState {
    clock: Clock,
    buffer: BlockBuffer,
    blocks_per_segment: u64,
    blocks_in_segment: u64,
    auto_flush: i64,
}

impl WriterState {
    /// Stamps and buffers one sample. Returns whether an auto flush is due.
    fn buffer_sample(&mut self, channel: &str, payload: &[u8]) -> WriterResult<bool> {
        BlockBuffer::validate(channel, payload)?;
        let ts = self.clock.next_timestamp();
        self.buffer.add(channel, ts, payload)?;
        Ok(self.auto_flush_due(ts))
    }

    fn auto_flush_due(&self, ts: i64) -> bool {
        self.auto_flush > 0
            && self
                .clock
                .anchors()
                .block_start
                .is_some_and(|start| ts - start >= self.auto_flush)
    }

    /// Swaps the open block out and advances the segment counter.
    fn take_block(&mut self) -> Option<BlockSnapshot> {
        if self.buffer.is_empty() {
            return None;
        }

        let anchors = self.clock.anchors();
        let channels = self.buffer.take();
        let block_start = self
            .clock
            .take_block_start()
            .or(anchors.source_start)
            .unwrap_or_default();
        let source_start = anchors.source_start.unwrap_or(block_start);
        let segment_start = if self.clock.segmenting() {
            Some(anchors.segment_start.unwrap_or(source_start))
        } else {
            None
        };

        let mut segment_complete = false;
        if self.blocks_per_segment > 0 {
            self.blocks_in_segment += 1;
            if self.blocks_in_segment >= self.blocks_per_segment {
                self.blocks_in_segment = 0;
                self.clock.end_segment();
                segment_complete = true;
            }
        }

        Some(BlockSnapshot {
            source_start,
            segment_start,
            block_start,
            channels,
            segment_complete,
        })
    }
}

/// State shared between producers and the flush worker.
struct Shared {
    label: String,
    state: Mutex<WriterState>,
    // serializes whole flushes, held across sink I/O
    flush_gate: Mutex<()>,
    engine: FlushEngine,
    retention: Option<Mutex<Box<dyn RetentionPolicy>>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, WriterState> {
        lock_mutex(&self.state, "writer state")
    }

    fn flush_now(&self) -> Option<FlushReport> {
        let _gate = lock_mutex(&self.flush_gate, "flush gate");
        let snapshot = self.lock_state().take_block()?;

        let report = self.engine.write_block(&snapshot);
        if snapshot.segment_complete {
            self.retire_segments(&snapshot);
        }
        Some(report)
    }

    fn retire_segments(&self, snapshot: &BlockSnapshot) {
        let unit = self.lock_state().clock.unit();
        self.debug(&format!(
            "segment complete (source started {})",
            format_anchor(snapshot.source_start, unit)
        ));

        let Some(retention) = &self.retention else {
            return;
        };
        let source_dir = snapshot.layout(self.engine.base()).source_dir();
        match lock_mutex(retention, "retention").run(Path::new(&source_dir)) {
            Ok(0) => {}
            Ok(n) => self.info(&format!("retired {} old segments in {}", n, source_dir)),
            Err(e) => self.warn(&format!("retention in {} failed: {}", source_dir, e)),
        }
    }
}

impl ComponentLogger for Shared {
    fn log_context(&self) -> LogContext {
        LogContext::new("Writer", &self.label)
    }
}

/// Buffers named channels and materializes them as a time-partitioned tree.
///
/// All methods take `&self`; share a writer between producer threads with an
/// `Arc`.
pub struct Writer {
    shared: Arc<Shared>,
    scheduler: Mutex<Option<FlushScheduler>>,
    config: WriterConfig,
    closed: AtomicBool,
}

impl Writer {
    /// Builds the sink named by `config`: HTTP when `remote` is set, the local
    /// filesystem otherwise.
    pub fn new(config: WriterConfig) -> WriterResult<Self> {
        config.validate()?;

        let sink: Arc<dyn Sink> = match &config.remote {
            Some(remote) if remote.pooled => Arc::new(
                PooledHttpSink::from_config(remote)
                    .map_err(|e| WriterError::with_context("start http worker pool", e))?,
            ),
            Some(remote) => Arc::new(HttpSink::from_config(remote)),
            None => {
                if config.delete_existing {
                    let base = Path::new(&config.base_dir);
                    match crate::sink::fs::purge_dir(base) {
                        Ok(()) => log::info!("[writer] cleared {}", base.display()),
                        Err(e) => log::warn!("[writer] could not clear {}: {}", base.display(), e),
                    }
                }
                Arc::new(FsSink::new(config.base_dir.clone()))
            }
        };

        Self::assemble(config, sink)
    }

    /// Uses a caller supplied sink. `delete_existing` is not applied here.
    pub fn with_sink(config: WriterConfig, sink: Arc<dyn Sink>) -> WriterResult<Self> {
        config.validate()?;
        Self::assemble(config, sink)
    }

    fn assemble(config: WriterConfig, sink: Arc<dyn Sink>) -> WriterResult<Self> {
        let retention: Option<Mutex<Box<dyn RetentionPolicy>>> =
            if sink.is_local() && config.segmenting() && config.segments_to_keep > 0 {
                Some(Mutex::new(Box::new(FsSegmentRetention::new(
                    config.segments_to_keep as usize,
                ))))
            } else {
                None
            };

        let state = WriterState {
            clock: Clock::new(config.time_unit, config.segmenting()),
            buffer: BlockBuffer::new(config.pack, config.opaque_suffixes.clone()),
            blocks_per_segment: config.blocks_per_segment,
            blocks_in_segment: 0,
            auto_flush: config.auto_flush,
        };

        let shared = Arc::new(Shared {
            label: config.base_dir.clone(),
            state: Mutex::new(state),
            flush_gate: Mutex::new(()),
            engine: FlushEngine::new(&config.base_dir, config.zip, sink),
            retention,
        });

        let writer = Self {
            shared,
            scheduler: Mutex::new(None),
            config,
            closed: AtomicBool::new(false),
        };
        if writer.config.async_flush {
            writer.set_async(true)?;
        }

        writer.info(&format!(
            "ready: unit={:?} pack={} zip={} blocks/segment={} keep={} async={}",
            writer.config.time_unit,
            writer.config.pack,
            writer.config.zip,
            writer.config.blocks_per_segment,
            writer.config.segments_to_keep,
            writer.config.async_flush
        ));
        Ok(writer)
    }

    fn ensure_open(&self) -> WriterResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WriterError::invalid_state("writer is closed"));
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------

    pub fn add(&self, channel: &str, payload: &[u8]) -> WriterResult<()> {
        self.ensure_open()?;
        let due = self.shared.lock_state().buffer_sample(channel, payload)?;
        if due {
            self.trigger_flush();
        }
        Ok(())
    }

    pub fn add_str(&self, channel: &str, value: &str) -> WriterResult<()> {
        self.add(channel, value.as_bytes())
    }

    pub fn add_f64(&self, channel: &str, value: f64) -> WriterResult<()> {
        self.add_number(channel, value)
    }

    pub fn add_f32(&self, channel: &str, value: f32) -> WriterResult<()> {
        self.add_number(channel, value)
    }

    pub fn add_i64(&self, channel: &str, value: i64) -> WriterResult<()> {
        self.add_number(channel, value)
    }

    pub fn add_i32(&self, channel: &str, value: i32) -> WriterResult<()> {
        self.add_number(channel, value)
    }

    /// Decimal text; packed channels get a `,` terminator per value.
    fn add_number<T: Display>(&self, channel: &str, value: T) -> WriterResult<()> {
        self.ensure_open()?;
        let due = {
            let mut state = self.shared.lock_state();
            let mut text = value.to_string();
            if state.buffer.packs(channel) {
                text.push(',');
            }
            state.buffer_sample(channel, text.as_bytes())?
        };
        if due {
            self.trigger_flush();
        }
        Ok(())
    }

    /// Adds one sample to several channels with a single shared timestamp.
    ///
    /// Nothing is buffered unless every element is valid.
    pub fn add_synchronized(&self, samples: &[(&str, &[u8])]) -> WriterResult<()> {
        self.ensure_open()?;
        if samples.is_empty() {
            return Err(WriterError::invalid_argument("empty synchronized batch"));
        }
        for (channel, payload) in samples {
            BlockBuffer::validate(channel, payload)?;
        }

        let due = {
            let mut state = self.shared.lock_state();
            let ts = state.clock.next_timestamp();
            for (channel, payload) in samples {
                state.buffer.add(channel, ts, payload)?;
            }
            state.auto_flush_due(ts)
        };
        if due {
            self.trigger_flush();
        }
        Ok(())
    }

    /// Parallel-array form of [`Writer::add_synchronized`].
    pub fn add_all(&self, channels: &[&str], payloads: &[&[u8]]) -> WriterResult<()> {
        if channels.len() != payloads.len() {
            return Err(WriterError::invalid_argument(format!(
                "{} channel names but {} payloads",
                channels.len(),
                payloads.len()
            )));
        }
        let samples: Vec<(&str, &[u8])> = channels.iter().copied().zip(payloads.iter().copied()).collect();
        self.add_synchronized(&samples)
    }

    /// Stamps every following `add` with one timestamp until
    /// [`Writer::end_synchronized`].
    pub fn begin_synchronized(&self) -> WriterResult<i64> {
        self.ensure_open()?;
        self.shared
            .lock_state()
            .clock
            .begin_batch()
            .ok_or_else(|| WriterError::invalid_state("synchronized batch already active"))
    }

    pub fn end_synchronized(&self) {
        self.shared.lock_state().clock.end_batch();
    }

    /// Manual time in milliseconds, or [`crate::buffer::AUTO_TIME`] for wall
    /// clock. Negative values are ignored with a warning.
    pub fn set_time(&self, ms: i64) -> bool {
        self.shared.lock_state().clock.set_time(ms)
    }

    /// Packing applies to channels created afterwards, zip to later flushes.
    pub fn set_block_mode(&self, pack: bool, zip: bool) {
        self.shared.lock_state().buffer.set_pack_enabled(pack);
        self.shared.engine.set_zip(zip);
    }

    // ------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------

    pub fn flush(&self) -> WriterResult<FlushStatus> {
        self.ensure_open()?;
        if self.is_empty() {
            if self.config.strict_flush {
                return Err(WriterError::NoDataToFlush);
            }
            return Ok(FlushStatus::Empty);
        }

        if let Some(scheduler) = lock_mutex(&self.scheduler, "scheduler").as_ref() {
            return Ok(if scheduler.request() {
                FlushStatus::Scheduled
            } else {
                FlushStatus::Coalesced
            });
        }

        Ok(match self.shared.flush_now() {
            Some(report) => FlushStatus::Written(report),
            None => FlushStatus::Empty,
        })
    }

    fn trigger_flush(&self) {
        if let Some(scheduler) = lock_mutex(&self.scheduler, "scheduler").as_ref() {
            scheduler.request();
            return;
        }
        if let Some(report) = self.shared.flush_now() {
            self.shared.debug(&format!("auto flush wrote {} units", report.units));
        }
    }

    /// Switches between flushing on the caller's thread and on a worker.
    ///
    /// Leaving async mode drains buffered data through the worker first.
    pub fn set_async(&self, enabled: bool) -> WriterResult<()> {
        let mut guard = lock_mutex(&self.scheduler, "scheduler");
        match (enabled, guard.is_some()) {
            (true, false) => {
                let shared = self.shared.clone();
                let scheduler = FlushScheduler::start(
                    move || {
                        shared.flush_now();
                    },
                    self.config.shutdown_timeout(),
                    self.config.shutdown_poll(),
                )
                .map_err(|e| WriterError::with_context("spawn flush worker", e))?;
                *guard = Some(scheduler);
            }
            (false, true) => {
                if let Some(mut scheduler) = guard.take() {
                    scheduler.shutdown();
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn is_async(&self) -> bool {
        lock_mutex(&self.scheduler, "scheduler").is_some()
    }

    /// Flushes what is left, stops the worker and waits for the sink.
    pub fn close(&self) -> WriterResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let scheduler = lock_mutex(&self.scheduler, "scheduler").take();
        let stopped = match scheduler {
            Some(mut scheduler) => scheduler.shutdown(),
            None => true,
        };
        if stopped {
            self.shared.flush_now();
        } else {
            let left = self.buffered_samples();
            if left > 0 {
                self.warn(&format!(
                    "flush worker timed out, dropping {} buffered samples",
                    left
                ));
            }
        }

        if !self.shared.engine.sink().drain(self.config.shutdown_timeout()) {
            self.warn("sink did not drain before shutdown timeout");
        }
        self.info("closed");
        Ok(())
    }

    // ------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.config.time_unit
    }

    pub fn anchors(&self) -> Anchors {
        self.shared.lock_state().clock.anchors()
    }

    pub fn blocks_in_segment(&self) -> u64 {
        self.shared.lock_state().blocks_in_segment
    }

    /// Copy of the buffered samples of one channel.
    pub fn channel(&self, name: &str) -> Option<ChannelEntry> {
        self.shared.lock_state().buffer.channel(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock_state().buffer.is_empty()
    }

    pub fn buffered_samples(&self) -> usize {
        self.shared.lock_state().buffer.sample_count()
    }
}

impl ComponentLogger for Writer {
    fn log_context(&self) -> LogContext {
        self.shared.log_context()
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
