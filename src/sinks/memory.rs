//! In-memory sink that completes every call synchronously.

use crate::error::WriteError;
use crate::writable::{BatchEntry, Chunk, Completion, Encoding, Sink, SinkCapabilities};
use bytes::{Bytes, BytesMut};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Recorded {
    chunks: Vec<(Chunk, Encoding)>,
    write_calls: usize,
    batch_sizes: Vec<usize>,
    finalized: bool,
    destroyed: bool,
}

/// Shared view of what a [`MemorySink`] received.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    inner: Rc<RefCell<Recorded>>,
}

impl MemoryLog {
    /// Every chunk received, in arrival order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.inner.borrow().chunks.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn encodings(&self) -> Vec<Encoding> {
        self.inner.borrow().chunks.iter().map(|(_, e)| *e).collect()
    }

    /// Concatenation of all byte and text chunks.
    pub fn bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for (chunk, _) in &self.inner.borrow().chunks {
            match chunk {
                Chunk::Bytes(b) => buf.extend_from_slice(b),
                Chunk::Text(s) => buf.extend_from_slice(s.as_bytes()),
                Chunk::Object(_) => {}
            }
        }
        buf.freeze()
    }

    /// Scalar `write` calls.
    pub fn write_calls(&self) -> usize {
        self.inner.borrow().write_calls
    }

    /// Entry count of each `writev` call.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.inner.borrow().batch_sizes.clone()
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.borrow().finalized
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }
}

pub struct MemorySink {
    log: MemoryLog,
    vectored: bool,
}

impl MemorySink {
    pub fn new() -> (Self, MemoryLog) {
        let log = MemoryLog::default();
        (
            Self {
                log: log.clone(),
                vectored: false,
            },
            log,
        )
    }

    /// Also accepts vectorized dispatches.
    pub fn vectored() -> (Self, MemoryLog) {
        let (mut sink, log) = Self::new();
        sink.vectored = true;
        (sink, log)
    }
}

impl Sink for MemorySink {
    fn capabilities(&self) -> SinkCapabilities {
        if self.vectored {
            SinkCapabilities::FINAL | SinkCapabilities::WRITEV
        } else {
            SinkCapabilities::FINAL
        }
    }

    fn write(&mut self, chunk: Chunk, encoding: Encoding, done: Completion) {
        {
            let mut rec = self.log.inner.borrow_mut();
            rec.write_calls += 1;
            rec.chunks.push((chunk, encoding));
        }
        done.ok();
    }

    fn writev(&mut self, entries: Vec<BatchEntry>, done: Completion) {
        {
            let mut rec = self.log.inner.borrow_mut();
            rec.batch_sizes.push(entries.len());
            rec.chunks
                .extend(entries.into_iter().map(|e| (e.chunk, e.encoding)));
        }
        done.ok();
    }

    fn finalize(&mut self, done: Completion) {
        self.log.inner.borrow_mut().finalized = true;
        done.ok();
    }

    fn destroy(&mut self, error: Option<WriteError>, done: Completion) {
        self.log.inner.borrow_mut().destroyed = true;
        done.complete(error.map_or(Ok(()), Err));
    }
}
