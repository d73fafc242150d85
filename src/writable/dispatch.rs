//! Dispatch engine: hand queued requests to the sink one dispatch at a time,
//! coalescing into a vectorized write when the sink supports it.

use crate::writable::chunk::{Chunk, Encoding};
use crate::writable::endpoint::Writable;
use crate::writable::sink::{BatchEntry, Completion, SinkCapabilities};
use crate::writable::state::{InFlight, StateFlags, WriteCallback, WriteRequest};

pub(crate) enum Payload {
    Single(Chunk, Encoding),
    Batch(Vec<BatchEntry>),
}

impl Writable {
    /// Mark a dispatch in flight and hand it to the sink.
    pub(crate) fn do_write(&self, payload: Payload, len: usize, callback: Option<WriteCallback>) {
        let seq = {
            let mut s = self.state_mut();
            let seq = s.next_seq();
            s.in_flight = Some(InFlight {
                seq,
                len,
                callback,
                released: false,
            });
            s.flags.insert(StateFlags::WRITING);
            seq
        };

        let weak = self.weak();
        let done = Completion::new(move |result| {
            if let Some(w) = Writable::upgrade(&weak) {
                w.on_write(seq, result);
            }
        });

        match payload {
            Payload::Single(chunk, encoding) => {
                tracing::trace!(seq, len, %encoding, "dispatch write");
                self.call_sink(move |sink| sink.write(chunk, encoding, done));
            }
            Payload::Batch(entries) => {
                tracing::trace!(seq, len, count = entries.len(), "dispatch writev");
                self.call_sink(move |sink| sink.writev(entries, done));
            }
        }
    }

    /// Dispatch queued requests while the sink is idle.
    pub(crate) fn clear_buffer(&self) {
        while self.drain_pass() {}
    }

    /// One pass over the queue. Returns true if another pass may make progress.
    fn drain_pass(&self) -> bool {
        let batch = {
            let mut s = self.state_mut();
            if s.any(
                StateFlags::DESTROYED
                    | StateFlags::ERRORED
                    | StateFlags::BUFFER_PROCESSING
                    | StateFlags::WRITING,
            ) || s.corked > 0
                || !s.has(StateFlags::CONSTRUCTED)
                || s.queue.is_empty()
            {
                return false;
            }
            s.flags.insert(StateFlags::BUFFER_PROCESSING);

            if s.queue.len() > 1 && self.inner.caps.contains(SinkCapabilities::WRITEV) {
                let requests = s.queue.take_all();
                // One completion now answers for the whole batch
                s.pending_cb -= requests.len() - 1;
                Some((requests, s.length))
            } else {
                None
            }
        };

        match batch {
            Some((requests, len)) => self.dispatch_batch(requests, len),
            None => self.dispatch_each(),
        }

        let mut s = self.state_mut();
        s.flags.remove(StateFlags::BUFFER_PROCESSING);
        // Requests may have been queued by the sink while the batch was in its hands
        !s.queue.is_empty() && !s.has(StateFlags::WRITING)
    }

    fn dispatch_batch(&self, requests: Vec<WriteRequest>, len: usize) {
        let mut callbacks = Vec::new();
        let mut entries = Vec::with_capacity(requests.len());
        for req in requests {
            if let Some(cb) = req.callback {
                callbacks.push(cb);
            }
            entries.push(BatchEntry {
                chunk: req.chunk,
                encoding: req.encoding,
            });
        }

        let callback: Option<WriteCallback> = if callbacks.is_empty() {
            None
        } else {
            Some(Box::new(move |result| {
                for cb in callbacks {
                    cb(result.clone());
                }
            }))
        };
        self.do_write(Payload::Batch(entries), len, callback);
    }

    fn dispatch_each(&self) {
        loop {
            let next = {
                let mut s = self.state_mut();
                if s.any(StateFlags::WRITING | StateFlags::ERRORED | StateFlags::DESTROYED) {
                    None
                } else {
                    let object_mode = s.object_mode();
                    s.queue.take_next().map(|req| (req.len(object_mode), req))
                }
            };
            let Some((len, req)) = next else {
                break;
            };
            self.do_write(Payload::Single(req.chunk, req.encoding), len, req.callback);
        }
        self.state_mut().queue.settle();
    }
}
