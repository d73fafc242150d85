//! Sink assembled from closures.

use crate::error::WriteError;
use crate::writable::{BatchEntry, Chunk, Completion, Encoding, Sink, SinkCapabilities};

type WriteFn = Box<dyn FnMut(Chunk, Encoding, Completion)>;
type WritevFn = Box<dyn FnMut(Vec<BatchEntry>, Completion)>;
type HookFn = Box<dyn FnMut(Completion)>;
type DestroyFn = Box<dyn FnMut(Option<WriteError>, Completion)>;

enum WriteImpl {
    Scalar(WriteFn),
    /// Scalar writes go through `writev` as one-entry batches
    VectorOnly,
}

/// A [`Sink`] whose entry points are closures. Capabilities follow from
/// which closures are supplied.
pub struct FnSink {
    write: WriteImpl,
    writev: Option<WritevFn>,
    construct: Option<HookFn>,
    finalize: Option<HookFn>,
    destroy: Option<DestroyFn>,
}

impl FnSink {
    pub fn new(write: impl FnMut(Chunk, Encoding, Completion) + 'static) -> Self {
        Self {
            write: WriteImpl::Scalar(Box::new(write)),
            writev: None,
            construct: None,
            finalize: None,
            destroy: None,
        }
    }

    /// A sink that only implements the vectorized entry point.
    pub fn vectored(writev: impl FnMut(Vec<BatchEntry>, Completion) + 'static) -> Self {
        Self {
            write: WriteImpl::VectorOnly,
            writev: Some(Box::new(writev)),
            construct: None,
            finalize: None,
            destroy: None,
        }
    }

    pub fn with_writev(
        mut self,
        writev: impl FnMut(Vec<BatchEntry>, Completion) + 'static,
    ) -> Self {
        self.writev = Some(Box::new(writev));
        self
    }

    pub fn with_construct(mut self, construct: impl FnMut(Completion) + 'static) -> Self {
        self.construct = Some(Box::new(construct));
        self
    }

    pub fn with_final(mut self, finalize: impl FnMut(Completion) + 'static) -> Self {
        self.finalize = Some(Box::new(finalize));
        self
    }

    pub fn with_destroy(
        mut self,
        destroy: impl FnMut(Option<WriteError>, Completion) + 'static,
    ) -> Self {
        self.destroy = Some(Box::new(destroy));
        self
    }
}

impl Sink for FnSink {
    fn capabilities(&self) -> SinkCapabilities {
        let mut caps = SinkCapabilities::empty();
        caps.set(SinkCapabilities::WRITEV, self.writev.is_some());
        caps.set(SinkCapabilities::CONSTRUCT, self.construct.is_some());
        caps.set(SinkCapabilities::FINAL, self.finalize.is_some());
        caps
    }

    fn write(&mut self, chunk: Chunk, encoding: Encoding, done: Completion) {
        match (&mut self.write, &mut self.writev) {
            (WriteImpl::Scalar(write), _) => write(chunk, encoding, done),
            (WriteImpl::VectorOnly, Some(writev)) => {
                writev(vec![BatchEntry { chunk, encoding }], done)
            }
            (WriteImpl::VectorOnly, None) => {
                done.fail(WriteError::NotImplemented { method: "write" })
            }
        }
    }

    fn writev(&mut self, entries: Vec<BatchEntry>, done: Completion) {
        match &mut self.writev {
            Some(writev) => writev(entries, done),
            None => done.fail(WriteError::NotImplemented { method: "writev" }),
        }
    }

    fn construct(&mut self, done: Completion) {
        match &mut self.construct {
            Some(construct) => construct(done),
            None => done.ok(),
        }
    }

    fn finalize(&mut self, done: Completion) {
        match &mut self.finalize {
            Some(finalize) => finalize(done),
            None => done.ok(),
        }
    }

    fn destroy(&mut self, error: Option<WriteError>, done: Completion) {
        match &mut self.destroy {
            Some(destroy) => destroy(error, done),
            None => done.complete(error.map_or(Ok(()), Err)),
        }
    }
}
