use std::time::Duration;

use crate::core::SinkResult;

/// Byte delivery target of the flush engine.
///
/// `dir` uses `/` separators and ends with `/`; `name` is the leaf file name.
/// Implementations are called from the flush thread while producers keep
/// adding, so they must be shareable.
pub trait Sink: Send + Sync {
    fn write(&self, dir: &str, name: &str, bytes: &[u8]) -> SinkResult;

    /// True when `dir` names a local directory that can be listed and pruned.
    fn is_local(&self) -> bool {
        false
    }

    /// Waits for writes accepted but not yet delivered. Returns false on timeout.
    fn drain(&self, _timeout: Duration) -> bool {
        true
    }
}

pub mod fs;
pub mod http;
pub mod pooled;

pub use fs::FsSink;
pub use http::{HttpAuth, HttpSink};
pub use pooled::PooledHttpSink;
