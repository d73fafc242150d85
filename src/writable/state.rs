//! Bookkeeping for one writable endpoint.
//!
//! Only the engine components mutate this; producers see it through the
//! read-only accessors on [`Writable`](crate::Writable).

use crate::config::WritableConfig;
use crate::error::{Result, WriteError};
use crate::writable::chunk::{Chunk, Encoding};
use tokio::sync::oneshot;

/// Queued dispatched prefix beyond which the queue is physically compacted.
pub(crate) const COMPACTION_THRESHOLD: usize = 256;

/// Caller continuation for a single write.
pub type WriteCallback = Box<dyn FnOnce(Result<()>)>;

/// Caller continuation for `end()` and `destroy()`.
pub type EndCallback = Box<dyn FnOnce(Result<()>)>;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct StateFlags: u32 {
        const OBJECT_MODE = 1 << 0;
        const DECODE_STRINGS = 1 << 1;
        const EMIT_CLOSE = 1 << 2;
        const AUTO_DESTROY = 1 << 3;
        const CONSTRUCTED = 1 << 4;
        /// Inside a call into the sink
        const SYNC = 1 << 5;
        const WRITING = 1 << 6;
        const BUFFER_PROCESSING = 1 << 7;
        const NEED_DRAIN = 1 << 8;
        const ENDING = 1 << 9;
        const ENDED = 1 << 10;
        const FINAL_CALLED = 1 << 11;
        const PREFINISHED = 1 << 12;
        const FINISHED = 1 << 13;
        const ERRORED = 1 << 14;
        const ERROR_EMITTED = 1 << 15;
        const DESTROYED = 1 << 16;
        const CLOSED = 1 << 17;
        const CLOSE_EMITTED = 1 << 18;
    }
}

/// A producer write waiting in the queue.
pub(crate) struct WriteRequest {
    pub chunk: Chunk,
    pub encoding: Encoding,
    pub callback: Option<WriteCallback>,
}

impl WriteRequest {
    pub fn len(&self, object_mode: bool) -> usize {
        if object_mode {
            1
        } else {
            self.chunk.byte_len()
        }
    }
}

/// FIFO of write requests with a logical head.
///
/// Dispatched entries are vacated in place and skipped by `head`; `settle`
/// clears the queue once fully drained or drops a long dispatched prefix.
#[derive(Default)]
pub(crate) struct WriteQueue {
    slots: Vec<Option<WriteRequest>>,
    head: usize,
}

impl WriteQueue {
    pub fn push(&mut self, req: WriteRequest) {
        self.slots.push(Some(req));
    }

    /// Requests not yet dispatched.
    pub fn len(&self) -> usize {
        self.slots.len() - self.head
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take_next(&mut self) -> Option<WriteRequest> {
        let req = self.slots.get_mut(self.head)?.take();
        self.head += 1;
        req
    }

    /// Take every undispatched request and reset.
    pub fn take_all(&mut self) -> Vec<WriteRequest> {
        let head = self.head;
        self.head = 0;
        self.slots.drain(..).skip(head).flatten().collect()
    }

    pub fn settle(&mut self) {
        if self.head == self.slots.len() {
            self.slots.clear();
            self.head = 0;
        } else if self.head > COMPACTION_THRESHOLD {
            self.slots.drain(..self.head);
            self.head = 0;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriteRequest> {
        self.slots[self.head..].iter().flatten()
    }

    #[cfg(test)]
    pub fn head(&self) -> usize {
        self.head
    }
}

/// The one outstanding dispatch.
pub(crate) struct InFlight {
    pub seq: u64,
    pub len: usize,
    pub callback: Option<WriteCallback>,
    /// Caller already answered by destroy; the sink's completion is bookkeeping only
    pub released: bool,
}

/// Completions of synchronous dispatches waiting for the next turn.
#[derive(Default)]
pub(crate) struct AfterWriteBatch {
    pub callbacks: Vec<Option<WriteCallback>>,
}

pub(crate) struct WritableState {
    pub flags: StateFlags,
    pub high_water_mark: usize,
    /// Outstanding size: queued plus in flight
    pub length: usize,
    pub corked: usize,
    pub pending_cb: usize,
    pub default_encoding: Encoding,
    pub queue: WriteQueue,
    pub in_flight: Option<InFlight>,
    pub next_seq: u64,
    pub after_write: Option<AfterWriteBatch>,
    pub error: Option<WriteError>,
    pub on_finished: Vec<EndCallback>,
    /// Outstanding `finished()` futures
    pub finished_waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Destroy requested before construction resolved
    pub pending_destroy: Option<Option<EndCallback>>,
}

impl WritableState {
    pub fn new(config: &WritableConfig, constructed: bool) -> Self {
        let mut flags = StateFlags::empty();
        flags.set(StateFlags::OBJECT_MODE, config.object_mode);
        flags.set(StateFlags::DECODE_STRINGS, config.decode_strings);
        flags.set(StateFlags::EMIT_CLOSE, config.emit_close);
        flags.set(StateFlags::AUTO_DESTROY, config.auto_destroy);
        flags.set(StateFlags::CONSTRUCTED, constructed);

        Self {
            flags,
            high_water_mark: config.effective_high_water_mark(),
            length: 0,
            corked: 0,
            pending_cb: 0,
            default_encoding: config.default_encoding,
            queue: WriteQueue::default(),
            in_flight: None,
            next_seq: 0,
            after_write: None,
            error: None,
            on_finished: Vec::new(),
            finished_waiters: Vec::new(),
            pending_destroy: None,
        }
    }

    #[inline]
    pub fn has(&self, flag: StateFlags) -> bool {
        self.flags.contains(flag)
    }

    #[inline]
    pub fn any(&self, flags: StateFlags) -> bool {
        self.flags.intersects(flags)
    }

    pub fn object_mode(&self) -> bool {
        self.has(StateFlags::OBJECT_MODE)
    }

    /// Record the first error; later ones are dropped.
    pub fn set_errored(&mut self, err: &WriteError) {
        if !self.has(StateFlags::ERRORED) {
            self.error = Some(err.clone());
            self.flags.insert(StateFlags::ERRORED);
        }
    }

    /// Shutdown may proceed: ending, constructed, nothing outstanding, no error.
    pub fn need_finish(&self) -> bool {
        self.has(StateFlags::ENDING | StateFlags::CONSTRUCTED)
            && !self.any(
                StateFlags::DESTROYED
                    | StateFlags::FINISHED
                    | StateFlags::WRITING
                    | StateFlags::ERROR_EMITTED
                    | StateFlags::CLOSE_EMITTED
                    | StateFlags::ERRORED,
            )
            && self.queue.is_empty()
            && self.length == 0
    }

    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn req(n: usize) -> WriteRequest {
        WriteRequest {
            chunk: Chunk::Bytes(Bytes::from(vec![0u8; n])),
            encoding: Encoding::Buffer,
            callback: None,
        }
    }

    #[test]
    fn test_queue_fifo_and_reset() {
        let mut q = WriteQueue::default();
        q.push(req(1));
        q.push(req(2));
        q.push(req(3));
        assert_eq!(q.len(), 3);

        assert_eq!(q.take_next().unwrap().len(false), 1);
        q.settle();
        assert_eq!(q.head(), 1);
        assert_eq!(q.iter().map(|r| r.len(false)).collect::<Vec<_>>(), [2, 3]);

        q.take_next();
        q.take_next();
        q.settle();
        assert_eq!(q.head(), 0);
        assert!(q.is_empty());
    }

    #[test]
    fn test_queue_compacts_long_prefix() {
        let mut q = WriteQueue::default();
        for _ in 0..COMPACTION_THRESHOLD + 10 {
            q.push(req(1));
        }
        for _ in 0..COMPACTION_THRESHOLD {
            q.take_next();
        }
        q.settle();
        // At the threshold the prefix is still skipped, not dropped
        assert_eq!(q.head(), COMPACTION_THRESHOLD);

        q.take_next();
        q.settle();
        assert_eq!(q.head(), 0);
        assert_eq!(q.len(), 9);
    }

    #[test]
    fn test_take_all_skips_dispatched_prefix() {
        let mut q = WriteQueue::default();
        q.push(req(1));
        q.push(req(2));
        q.push(req(3));
        q.take_next();
        let rest = q.take_all();
        assert_eq!(rest.iter().map(|r| r.len(false)).collect::<Vec<_>>(), [2, 3]);
        assert!(q.is_empty());
        assert_eq!(q.head(), 0);
    }

    #[test]
    fn test_need_finish() {
        let mut state = WritableState::new(&WritableConfig::default(), true);
        assert!(!state.need_finish());

        state.flags.insert(StateFlags::ENDING);
        assert!(state.need_finish());

        state.length = 1;
        assert!(!state.need_finish());
        state.length = 0;

        state.set_errored(&WriteError::WriteAfterEnd);
        assert!(!state.need_finish());
    }

    #[test]
    fn test_first_error_wins() {
        let mut state = WritableState::new(&WritableConfig::default(), true);
        state.set_errored(&WriteError::WriteAfterEnd);
        state.set_errored(&WriteError::PrematureClose);
        assert!(matches!(state.error, Some(WriteError::WriteAfterEnd)));
    }
}
