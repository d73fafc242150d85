//! Buffered-sink flow control.
//!
//! A [`Writable`] sits between a producer and a [`Sink`]. It keeps writes in
//! order, keeps at most one dispatch in flight, coalesces queued writes into a
//! vectorized dispatch when the sink supports it, tells the producer when to
//! back off, and runs a multi-phase shutdown (finalize, prefinish, finish,
//! destroy, close).
//!
//! ```
//! use flowsink::sinks::MemorySink;
//! use flowsink::{Signal, TickQueue, Writable, WritableConfig};
//!
//! let queue = TickQueue::new();
//! let (sink, log) = MemorySink::new();
//! let w = Writable::new(sink, WritableConfig::default(), queue.clone());
//!
//! w.on(Signal::Finish, || println!("all data flushed"));
//! w.write("hello ").unwrap();
//! w.write("world").unwrap();
//! w.end();
//!
//! queue.run_until_idle();
//! assert_eq!(log.bytes().as_ref(), b"hello world");
//! assert!(w.writable_finished());
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod sinks;
pub mod writable;

pub use config::WritableConfig;
pub use error::{ConfigError, Result, WriteError};
pub use writable::{
    BatchEntry, Chunk, Completion, Encoding, EndCallback, LocalSpawner, Scheduler, Signal, Sink,
    SinkCapabilities, Task, TickQueue, Writable, WriteCallback,
};
