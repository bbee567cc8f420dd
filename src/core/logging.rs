use std::sync::atomic::{AtomicU64, Ordering};

use log::Level;

use super::timestamp::utc_ms_now;

// Process-wide sequence number for correlating log lines
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Prefix attached to every line a writer component logs.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: &'static str,
    pub instance_id: String,
    /// Block directory being flushed, if any.
    pub block: Option<String>,
    pub sequence: u64,
    pub timestamp_ms: i64,
}

impl LogContext {
    pub fn new(component: &'static str, instance_id: &str) -> Self {
        Self {
            component,
            instance_id: instance_id.to_string(),
            block: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ms: utc_ms_now(),
        }
    }

    pub fn with_block(mut self, block: &str) -> Self {
        self.block = Some(block.to_string());
        self
    }

    pub fn format(&self, level: Level, message: &str) -> String {
        match &self.block {
            Some(block) => format!(
                "[{}][seq={:06}][{}:{} block={}] {}",
                level, self.sequence, self.component, self.instance_id, block, message
            ),
            None => format!(
                "[{}][seq={:06}][{}:{}] {}",
                level, self.sequence, self.component, self.instance_id, message
            ),
        }
    }
}

pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    /// Builds the context only when `level` is enabled.
    fn log(&self, level: Level, message: &str) {
        if log::log_enabled!(level) {
            log::log!(level, "{}", self.log_context().format(level, message));
        }
    }

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_increases() {
        let a = LogContext::new("Writer", "a");
        let b = LogContext::new("Writer", "b");
        assert!(b.sequence > a.sequence);
    }

    #[test]
    fn block_tag_in_output() {
        let ctx = LogContext::new("FlushEngine", "data").with_block("data/1000/0/");
        let line = ctx.format(Level::Debug, "wrote 3 units");

        assert!(line.starts_with("[DEBUG][seq="));
        assert!(line.contains("[FlushEngine:data block=data/1000/0/]"));
        assert!(line.ends_with("wrote 3 units"));
    }

    #[test]
    fn untagged_line() {
        let line = LogContext::new("FsSink", "out").format(Level::Warn, "slow disk");
        assert!(line.starts_with("[WARN]"));
        assert!(line.ends_with("[FsSink:out] slow disk"));
    }
}
