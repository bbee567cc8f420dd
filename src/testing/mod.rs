//! In-memory sinks for exercising writers without disk or network.

pub mod mocks;

pub use mocks::{FailingSink, GatedSink, MemorySink, RecordedWrite};
