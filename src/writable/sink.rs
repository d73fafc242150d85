//! The underlying sink contract consumed by a writable endpoint.

use crate::error::{Result, WriteError};
use crate::writable::chunk::{Chunk, Encoding};
use std::fmt;
use std::rc::Rc;

bitflags::bitflags! {
    /// Optional entry points a sink implements beyond the scalar `write`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SinkCapabilities: u8 {
        const WRITEV = 1 << 0;
        const CONSTRUCT = 1 << 1;
        const FINAL = 1 << 2;
    }
}

/// One request inside a vectorized dispatch.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub chunk: Chunk,
    pub encoding: Encoding,
}

/// Continuation handed to the sink with every call.
///
/// `complete` consumes the handle, so a sink holding a single `Completion` can
/// only resolve it once. Sinks that need to race several resolvers may clone
/// it; the endpoint then reports any second resolution as
/// [`WriteError::MultipleCallback`].
#[derive(Clone)]
pub struct Completion {
    resolve: Rc<dyn Fn(Result<()>)>,
}

impl Completion {
    pub(crate) fn new(resolve: impl Fn(Result<()>) + 'static) -> Self {
        Self {
            resolve: Rc::new(resolve),
        }
    }

    pub fn complete(self, result: Result<()>) {
        (self.resolve)(result)
    }

    pub fn ok(self) {
        self.complete(Ok(()))
    }

    pub fn fail(self, err: WriteError) {
        self.complete(Err(err))
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// The collaborator that actually moves data: a socket, a file, an encoder.
///
/// Every method must resolve its `done` exactly once, either before returning
/// or on a later turn.
pub trait Sink {
    /// Which optional entry points below are live.
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::empty()
    }

    fn write(&mut self, chunk: Chunk, encoding: Encoding, done: Completion);

    /// Vectorized dispatch, only called with [`SinkCapabilities::WRITEV`].
    fn writev(&mut self, entries: Vec<BatchEntry>, done: Completion) {
        let _ = entries;
        done.fail(WriteError::NotImplemented { method: "writev" });
    }

    /// Async setup, only called with [`SinkCapabilities::CONSTRUCT`].
    fn construct(&mut self, done: Completion) {
        done.ok();
    }

    /// Runs once after all data is flushed, only called with
    /// [`SinkCapabilities::FINAL`].
    fn finalize(&mut self, done: Completion) {
        done.ok();
    }

    /// Release resources. Called exactly once per endpoint.
    fn destroy(&mut self, error: Option<WriteError>, done: Completion) {
        done.complete(error.map_or(Ok(()), Err));
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn capabilities(&self) -> SinkCapabilities {
        (**self).capabilities()
    }

    fn write(&mut self, chunk: Chunk, encoding: Encoding, done: Completion) {
        (**self).write(chunk, encoding, done)
    }

    fn writev(&mut self, entries: Vec<BatchEntry>, done: Completion) {
        (**self).writev(entries, done)
    }

    fn construct(&mut self, done: Completion) {
        (**self).construct(done)
    }

    fn finalize(&mut self, done: Completion) {
        (**self).finalize(done)
    }

    fn destroy(&mut self, error: Option<WriteError>, done: Completion) {
        (**self).destroy(error, done)
    }
}
