//! Destroy and error routing.

use crate::error::{Result, WriteError};
use crate::writable::endpoint::Writable;
use crate::writable::events::Signal;
use crate::writable::sink::Completion;
use crate::writable::state::{EndCallback, StateFlags};
use std::cell::Cell;

impl Writable {
    /// Tear the endpoint down, optionally recording `error`.
    ///
    /// Queued writes fail with the recorded error, or with
    /// [`WriteError::Destroyed`] if there is none. Idempotent.
    pub fn destroy(&self, error: Option<WriteError>) {
        self.destroy_with(error, None);
    }

    /// Like [`destroy`](Self::destroy); `callback` runs once the sink has
    /// released its resources.
    pub fn destroy_with(&self, error: Option<WriteError>, callback: Option<EndCallback>) {
        let (flush, callback) = {
            let mut s = self.state_mut();
            if s.has(StateFlags::DESTROYED) {
                drop(s);
                if let Some(cb) = callback {
                    cb(Ok(()));
                }
                return;
            }

            let flush = !s.queue.is_empty()
                || !s.on_finished.is_empty()
                || s.has(StateFlags::WRITING);
            if let Some(err) = &error {
                s.set_errored(err);
            }
            s.flags.insert(StateFlags::DESTROYED);

            if s.has(StateFlags::CONSTRUCTED) {
                (flush, Some(callback))
            } else {
                // Picked up once construction resolves
                s.pending_destroy = Some(callback);
                (flush, None)
            }
        };

        match &error {
            Some(err) => tracing::debug!(error = %err, "destroying writable"),
            None => tracing::debug!("destroying writable"),
        }

        if flush {
            self.defer(|w| w.fail_buffered());
        }
        if let Some(callback) = callback {
            self.run_destroy(error, callback);
        }
    }

    pub(crate) fn run_destroy(&self, error: Option<WriteError>, callback: Option<EndCallback>) {
        let weak = self.weak();
        let called = Cell::new(false);
        let callback = Cell::new(callback);
        let done = Completion::new(move |result| {
            if called.replace(true) {
                tracing::warn!("destroy completion resolved more than once");
                return;
            }
            if let Some(w) = Writable::upgrade(&weak) {
                w.on_destroyed(result, callback.take());
            }
        });
        self.call_sink(move |sink| sink.destroy(error, done));
    }

    fn on_destroyed(&self, result: Result<()>, callback: Option<EndCallback>) {
        let err = result.err();
        {
            let mut s = self.state_mut();
            if let Some(err) = &err {
                s.set_errored(err);
            }
            s.flags.insert(StateFlags::CLOSED);
        }
        tracing::debug!(ok = err.is_none(), "sink destroyed");

        if let Some(cb) = callback {
            cb(err.clone().map_or(Ok(()), Err));
        }

        match err {
            Some(err) => self.defer(move |w| {
                w.emit_error_once(&err);
                w.emit_close_once();
            }),
            None => self.defer(|w| w.emit_close_once()),
        }
    }

    /// Route an error: destroy with it under auto-destroy, otherwise record it
    /// and emit `error`.
    pub(crate) fn error_or_destroy(&self, err: WriteError, sync: bool) {
        let (destroyed, auto_destroy) = {
            let s = self.state();
            (s.has(StateFlags::DESTROYED), s.has(StateFlags::AUTO_DESTROY))
        };
        if destroyed {
            return;
        }

        if auto_destroy {
            self.destroy(Some(err));
            return;
        }

        self.state_mut().set_errored(&err);
        if sync {
            self.defer(move |w| w.emit_error_once(&err));
        } else {
            self.emit_error_once(&err);
        }
    }

    /// Fail everything still waiting on the sink.
    pub(crate) fn fail_buffered(&self) {
        let (released, requests, error, end_callbacks) = {
            let mut guard = self.state_mut();
            let s = &mut *guard;
            let destroyed = s.has(StateFlags::DESTROYED);

            let mut released = None;
            if s.has(StateFlags::WRITING) {
                if !destroyed {
                    return;
                }
                // The sink may never answer; release its caller now
                if let Some(flight) = s.in_flight.as_mut().filter(|f| !f.released) {
                    flight.released = true;
                    s.pending_cb -= 1;
                    released = flight.callback.take();
                }
            }

            let object_mode = s.object_mode();
            let requests = s.queue.take_all();
            for req in &requests {
                s.length -= req.len(object_mode);
            }
            s.pending_cb -= requests.len();

            (
                released,
                requests,
                s.error.clone(),
                std::mem::take(&mut s.on_finished),
            )
        };

        let write_err = error.clone().unwrap_or(WriteError::Destroyed { op: "write" });
        if let Some(cb) = released {
            cb(Err(write_err.clone()));
        }
        for req in requests {
            if let Some(cb) = req.callback {
                cb(Err(write_err.clone()));
            }
        }

        match error {
            Some(err) => {
                for cb in end_callbacks {
                    cb(Err(err.clone()));
                }
            }
            None if !end_callbacks.is_empty() => {
                tracing::debug!("dropping {} end callbacks after destroy", end_callbacks.len());
            }
            None => {}
        }
    }

    fn emit_error_once(&self, err: &WriteError) {
        {
            let mut s = self.state_mut();
            if s.has(StateFlags::ERROR_EMITTED) {
                return;
            }
            s.flags.insert(StateFlags::ERROR_EMITTED);
        }
        self.settle_finished(Err(err.clone()));
        if !self.inner.listeners.emit_error(err) {
            tracing::warn!("unhandled writable error: {}", err);
        }
    }

    fn emit_close_once(&self) {
        let (emit, outcome) = {
            let mut s = self.state_mut();
            s.flags.insert(StateFlags::CLOSE_EMITTED);
            let outcome = match &s.error {
                Some(err) => Err(err.clone()),
                None => Err(WriteError::PrematureClose),
            };
            (s.has(StateFlags::EMIT_CLOSE), outcome)
        };
        // Waiters still pending here never saw finish; resolved even when
        // the close signal itself is suppressed
        self.settle_finished(outcome);
        if emit {
            self.emit(Signal::Close);
        }
    }
}
