//! Ready-made [`Sink`](crate::Sink) implementations.

pub mod func;
pub mod io;
pub mod memory;

pub use func::FnSink;
pub use io::AsyncWriteSink;
pub use memory::{MemoryLog, MemorySink};
