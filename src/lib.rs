// src/lib.rs
pub mod buffer;
pub mod config;
pub mod core;
pub mod sink;
pub mod testing;
pub mod writer;

// Re-export the main types
pub use buffer::{AUTO_TIME, Anchors, ChannelEntry};
pub use config::{RemoteConfig, WriterConfig};
pub use core::{ComponentLogger, LogContext, SinkError, TimeUnit, WriterError, WriterResult};
pub use sink::{FsSink, HttpSink, PooledHttpSink, Sink};
pub use writer::{FlushReport, FlushStatus, Writer};
