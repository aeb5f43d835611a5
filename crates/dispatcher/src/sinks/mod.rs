//! Sink implementations
//!
//! Contains TracingSink, FileSink, NetworkSink and FanoutSink.

mod fanout;
mod file;
mod log;
mod network;

pub use self::fanout::FanoutSink;
pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::TracingSink;
pub use self::network::{NetworkFormat, NetworkSink, NetworkSinkConfig};
