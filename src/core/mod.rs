pub mod error;
pub mod lock;
pub mod logging;
pub mod timestamp;

pub use error::{SinkError, SinkResult, WriterError, WriterResult};
pub use logging::{ComponentLogger, LogContext};
pub use timestamp::{TimeUnit, format_anchor, utc_ms_now};
