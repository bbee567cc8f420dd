use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;

use crate::core::lock::{lock_mutex, wait_until};
use crate::core::{SinkError, SinkResult};
use crate::sink::Sink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub dir: String,
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RecordedWrite {
    pub fn path(&self) -> String {
        format!("{}{}", self.dir, self.name)
    }
}

/// Records every write in memory.
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<RecordedWrite>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock_mutex(&self.writes, "memory sink").clone()
    }

    pub fn len(&self) -> usize {
        lock_mutex(&self.writes, "memory sink").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock_mutex(&self.writes, "memory sink").clear();
    }
}

impl Sink for MemorySink {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult {
        lock_mutex(&self.writes, "memory sink").push(RecordedWrite {
            dir: dir.to_string(),
            name: name.to_string(),
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

enum FailMode {
    Names(Vec<String>),
    Unavailable,
}

/// Fails writes for selected names, or every write as unavailable.
pub struct FailingSink {
    mode: FailMode,
    attempts: AtomicUsize,
    inner: MemorySink,
}

impl FailingSink {
    pub fn failing_names(names: &[&str]) -> Self {
        Self {
            mode: FailMode::Names(names.iter().map(|n| n.to_string()).collect()),
            attempts: AtomicUsize::new(0),
            inner: MemorySink::new(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            mode: FailMode::Unavailable,
            attempts: AtomicUsize::new(0),
            inner: MemorySink::new(),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<RecordedWrite> {
        self.inner.writes()
    }
}

impl Sink for FailingSink {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            FailMode::Unavailable => Err(SinkError::unavailable(
                format!("create {}", dir),
                anyhow!("mock sink unavailable"),
            )),
            FailMode::Names(names) if names.iter().any(|n| n == name) => Err(SinkError::write(
                format!("write {}{}", dir, name),
                anyhow!("mock write failure"),
            )),
            FailMode::Names(_) => self.inner.write(dir, name, bytes),
        }
    }
}

/// Holds every write until [`GatedSink::open`] is called.
pub struct GatedSink {
    open: AtomicBool,
    entered: AtomicUsize,
    inner: MemorySink,
}

impl GatedSink {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            entered: AtomicUsize::new(0),
            inner: MemorySink::new(),
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Number of writes that have started, including blocked ones.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn wait_entered(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, Duration::from_millis(1), || self.entered() >= count)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.inner.writes()
    }
}

impl Default for GatedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for GatedSink {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult {
        self.entered.fetch_add(1, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        self.inner.write(dir, name, bytes)
    }
}
