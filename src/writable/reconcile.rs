//! Completion reconciler: account for finished dispatches, release caller
//! callbacks and emit drain.

use crate::error::{Result, WriteError};
use crate::writable::endpoint::Writable;
use crate::writable::events::Signal;
use crate::writable::state::{AfterWriteBatch, StateFlags, WriteCallback};

impl Writable {
    pub(crate) fn on_write(&self, seq: u64, result: Result<()>) {
        let (sync, flight) = {
            let mut s = self.state_mut();
            let flight = match s.in_flight.take() {
                Some(flight) if flight.seq == seq => flight,
                other => {
                    s.in_flight = other;
                    drop(s);
                    tracing::warn!("write completion for dispatch {} resolved more than once", seq);
                    self.error_or_destroy(WriteError::MultipleCallback, false);
                    return;
                }
            };

            s.flags.remove(StateFlags::WRITING);
            s.length -= flight.len;
            if let Err(err) = &result {
                s.set_errored(err);
            }
            (s.has(StateFlags::SYNC), flight)
        };

        if flight.released {
            return;
        }

        match result {
            Err(err) => {
                tracing::debug!(seq, error = %err, sync, "write failed");
                let callback = flight.callback;
                if sync {
                    self.defer(move |w| w.on_write_error(err, callback));
                } else {
                    self.on_write_error(err, callback);
                }
            }
            Ok(()) if sync => self.after_sync_write(flight.callback),
            Ok(()) => {
                self.clear_buffer();
                self.after_write(vec![flight.callback]);
            }
        }
    }

    fn on_write_error(&self, err: WriteError, callback: Option<WriteCallback>) {
        self.state_mut().pending_cb -= 1;
        if let Some(cb) = callback {
            cb(Err(err.clone()));
        }
        self.fail_buffered();
        self.error_or_destroy(err, false);
    }

    /// Synchronous completions are answered together on the next turn.
    fn after_sync_write(&self, callback: Option<WriteCallback>) {
        let ending = {
            let mut s = self.state_mut();
            if let Some(batch) = s.after_write.as_mut() {
                batch.callbacks.push(callback);
                return;
            }

            let owes_drain = s.has(StateFlags::NEED_DRAIN) && s.length == 0;
            if callback.is_some() || owes_drain || s.has(StateFlags::DESTROYED) {
                s.after_write = Some(AfterWriteBatch {
                    callbacks: vec![callback],
                });
                drop(s);
                self.defer(|w| w.flush_after_write());
                return;
            }

            // Nothing to tell anyone
            s.pending_cb -= 1;
            s.has(StateFlags::ENDING)
        };
        if ending {
            self.finish_maybe(true);
        }
    }

    fn flush_after_write(&self) {
        let batch = self.state_mut().after_write.take();
        if let Some(batch) = batch {
            self.after_write(batch.callbacks);
        }
    }

    fn after_write(&self, callbacks: Vec<Option<WriteCallback>>) {
        let drain = {
            let mut s = self.state_mut();
            let drain = s.has(StateFlags::NEED_DRAIN)
                && !s.any(StateFlags::ENDING | StateFlags::DESTROYED | StateFlags::ERRORED)
                && s.length == 0;
            if drain {
                s.flags.remove(StateFlags::NEED_DRAIN);
            }
            drain
        };
        if drain {
            self.emit(Signal::Drain);
        }

        for cb in callbacks {
            self.state_mut().pending_cb -= 1;
            if let Some(cb) = cb {
                cb(Ok(()));
            }
        }

        let (destroyed, ending) = {
            let s = self.state();
            (s.has(StateFlags::DESTROYED), s.has(StateFlags::ENDING))
        };
        if destroyed {
            self.fail_buffered();
        }
        if ending {
            self.finish_maybe(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::WritableConfig;
    use crate::error::WriteError;
    use crate::sinks::FnSink;
    use crate::writable::{Completion, Signal, TickQueue, Writable};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn test_sync_callbacks_deferred_and_batched() {
        let queue = TickQueue::new();
        let sink = FnSink::new(|_chunk, _enc, done| done.ok());
        let w = Writable::new(sink, WritableConfig::default(), queue.clone());
        let hits = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let h = hits.clone();
            w.write_with("x", None, Some(Box::new(move |_| h.set(h.get() + 1))))
                .unwrap();
        }
        assert_eq!(hits.get(), 0);
        assert_eq!(w.pending_callbacks(), 3);
        // One task answers all three
        assert_eq!(queue.pending(), 1);

        queue.run_turn();
        assert_eq!(hits.get(), 3);
        assert_eq!(w.pending_callbacks(), 0);
    }

    #[test]
    fn test_drain_precedes_callbacks() {
        let queue = TickQueue::new();
        let held: Rc<RefCell<Option<Completion>>> = Rc::new(RefCell::new(None));
        let h = held.clone();
        let sink = FnSink::new(move |_chunk, _enc, done| *h.borrow_mut() = Some(done));
        let w = Writable::new(sink, WritableConfig::default().with_high_water_mark(1), queue);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        w.on(Signal::Drain, move || o.borrow_mut().push("drain"));
        let o = order.clone();
        assert!(!w
            .write_with("ab", None, Some(Box::new(move |_| o.borrow_mut().push("cb"))))
            .unwrap());

        let done = held.borrow_mut().take().unwrap();
        done.ok();
        assert_eq!(*order.borrow(), vec!["drain", "cb"]);
    }

    #[test]
    fn test_double_completion_is_reported() {
        let queue = TickQueue::new();
        let held: Rc<RefCell<Vec<Completion>>> = Rc::new(RefCell::new(Vec::new()));
        let h = held.clone();
        let sink = FnSink::new(move |_chunk, _enc, done| h.borrow_mut().push(done));
        let w = Writable::new(
            sink,
            WritableConfig {
                auto_destroy: false,
                ..WritableConfig::default()
            },
            queue,
        );
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = errors.clone();
        w.on_error(move |err| e.borrow_mut().push(err.clone()));

        w.write("x").unwrap();
        let done = held.borrow_mut().remove(0);
        done.clone().ok();
        done.ok();

        assert!(matches!(errors.borrow()[0], WriteError::MultipleCallback));
        assert_eq!(w.writable_length(), 0);
    }

    #[test]
    fn test_async_error_fails_queued_requests() {
        let queue = TickQueue::new();
        let held: Rc<RefCell<Option<Completion>>> = Rc::new(RefCell::new(None));
        let h = held.clone();
        let sink = FnSink::new(move |_chunk, _enc, done| *h.borrow_mut() = Some(done));
        let w = Writable::new(sink, WritableConfig::default(), queue.clone());
        let results = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let r = results.clone();
            w.write_with(
                "x",
                None,
                Some(Box::new(move |res| r.borrow_mut().push((i, res.is_ok())))),
            )
            .unwrap();
        }
        let done = held.borrow_mut().take().unwrap();
        done.fail(WriteError::sink(anyhow::anyhow!("broken pipe")));
        queue.run_until_idle();

        assert_eq!(*results.borrow(), vec![(0, false), (1, false), (2, false)]);
        assert_eq!(w.writable_length(), 0);
        assert_eq!(w.pending_callbacks(), 0);
        assert!(w.destroyed());
    }
}
