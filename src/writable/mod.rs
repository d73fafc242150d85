//! Writable endpoint: ordered, batched, backpressured writes into a [`Sink`].
//!
//! # Architecture
//!
//! ```text
//!  producer                                               sink
//! +----------+   +-----------+   +----------+   +-------------------+
//! | write()  |-->| admission |-->|  queue   |-->| dispatch engine   |--> write / writev
//! | end()    |   | (hwm)     |   | (corked) |   | (one in flight)   |
//! +----------+   +-----------+   +----------+   +-------------------+
//!      ^                                                  |
//!      |          drain, callbacks                        v
//!      +------------------------------------ completion reconciler
//!
//!  end() --> finalize --> prefinish --> finish --> destroy --> close
//! ```
//!
//! Everything runs on one thread. Work that must not happen on the caller's
//! stack is deferred through a [`Scheduler`]: [`TickQueue`] for deterministic
//! turns, [`LocalSpawner`] inside a tokio `LocalSet`.

mod admit;
mod chunk;
mod cork;
mod destroy;
mod dispatch;
mod endpoint;
mod events;
mod finished;
mod reconcile;
mod scheduler;
mod shutdown;
mod sink;
mod state;

pub use chunk::{Chunk, Encoding};
pub use endpoint::Writable;
pub use events::Signal;
pub use scheduler::{LocalSpawner, Scheduler, Task, TickQueue};
pub use sink::{BatchEntry, Completion, Sink, SinkCapabilities};
pub use state::{EndCallback, WriteCallback};
