//! Shutdown sequencer: end, finalization, prefinish and finish.

use crate::error::{Result, WriteError};
use crate::writable::chunk::{Chunk, Encoding};
use crate::writable::endpoint::Writable;
use crate::writable::events::Signal;
use crate::writable::sink::{Completion, SinkCapabilities};
use crate::writable::state::{EndCallback, StateFlags};
use std::cell::Cell;

impl Writable {
    /// Signal that no more data will be written.
    pub fn end(&self) {
        // Without a chunk nothing can fail validation
        let _ = self.end_with(None, None, None);
    }

    /// Optionally write a final `chunk`, then end. `callback` resolves with
    /// `Ok` on finish or with the error that prevented it.
    ///
    /// Returns `Err` only if `chunk` fails validation, in which case nothing
    /// else happens.
    pub fn end_with(
        &self,
        chunk: Option<Chunk>,
        encoding: Option<Encoding>,
        callback: Option<EndCallback>,
    ) -> Result<()> {
        let mut err = None;

        if let Some(chunk) = chunk {
            let (chunk, encoding) = self.normalize(chunk, encoding)?;
            if let Err(e) = self.admit(chunk, encoding, None) {
                err = Some(e);
            }
        }

        // end() releases every cork at once
        let corked = self.state().corked > 0;
        if corked {
            self.state_mut().corked = 1;
            self.uncork();
        }

        if err.is_none() {
            let (open, finished, destroyed) = {
                let s = self.state();
                (
                    !s.any(StateFlags::ENDING | StateFlags::ERRORED | StateFlags::DESTROYED),
                    s.has(StateFlags::FINISHED),
                    s.has(StateFlags::DESTROYED),
                )
            };
            if open {
                tracing::debug!("ending writable");
                self.state_mut().flags.insert(StateFlags::ENDING);
                self.finish_maybe(true);
                self.state_mut().flags.insert(StateFlags::ENDED);
            } else if finished {
                err = Some(WriteError::AlreadyFinished { op: "end" });
            } else if destroyed {
                err = Some(WriteError::Destroyed { op: "end" });
            }
        }

        if let Some(cb) = callback {
            let mut s = self.state_mut();
            let outcome = match err.or_else(|| s.error.clone()) {
                Some(e) => Some(Err(e)),
                None if s.has(StateFlags::FINISHED) => Some(Ok(())),
                None => None,
            };
            match outcome {
                Some(result) => {
                    drop(s);
                    self.defer(move |_| cb(result));
                }
                None => s.on_finished.push(cb),
            }
        }
        Ok(())
    }

    /// Move towards finish if shutdown conditions hold. `sync` defers the
    /// finish itself to the next turn.
    pub(crate) fn finish_maybe(&self, sync: bool) {
        if !self.state().need_finish() {
            return;
        }
        self.prefinish();

        let mut s = self.state_mut();
        if s.pending_cb != 0 {
            return;
        }
        if sync {
            s.pending_cb += 1;
            drop(s);
            self.defer(|w| w.finish_if_needed());
        } else if s.need_finish() {
            s.pending_cb += 1;
            drop(s);
            self.finish();
        }
    }

    fn finish_if_needed(&self) {
        let needed = self.state().need_finish();
        if needed {
            self.finish();
        } else {
            self.state_mut().pending_cb -= 1;
        }
    }

    fn prefinish(&self) {
        let has_final = self.inner.caps.contains(SinkCapabilities::FINAL);
        let run_final = {
            let mut s = self.state_mut();
            if s.any(StateFlags::PREFINISHED | StateFlags::FINAL_CALLED) {
                return;
            }
            if has_final && !s.has(StateFlags::DESTROYED) {
                s.flags.insert(StateFlags::FINAL_CALLED);
                s.pending_cb += 1;
                true
            } else {
                s.flags.insert(StateFlags::FINAL_CALLED | StateFlags::PREFINISHED);
                false
            }
        };

        if !run_final {
            tracing::debug!("prefinish");
            self.emit(Signal::Prefinish);
            return;
        }

        let weak = self.weak();
        let called = Cell::new(false);
        let done = Completion::new(move |result| {
            let Some(w) = Writable::upgrade(&weak) else {
                return;
            };
            if called.replace(true) {
                tracing::warn!("final completion resolved more than once");
                w.error_or_destroy(result.err().unwrap_or(WriteError::MultipleCallback), false);
                return;
            }
            w.on_final(result);
        });
        tracing::debug!("finalizing sink");
        self.call_sink(move |sink| sink.finalize(done));
    }

    fn on_final(&self, result: Result<()>) {
        let sync = {
            let mut s = self.state_mut();
            s.pending_cb -= 1;
            s.has(StateFlags::SYNC)
        };

        match result {
            Err(err) => {
                tracing::debug!(error = %err, "finalize failed");
                self.resolve_end_callbacks(Err(err.clone()));
                self.error_or_destroy(err, sync);
            }
            Ok(()) => {
                let needed = {
                    let mut s = self.state_mut();
                    let needed = s.need_finish();
                    if needed {
                        s.flags.insert(StateFlags::PREFINISHED);
                        s.pending_cb += 1;
                    }
                    needed
                };
                if needed {
                    tracing::debug!("prefinish after finalize");
                    self.emit(Signal::Prefinish);
                    self.defer(|w| w.finish_if_needed());
                }
            }
        }
    }

    fn finish(&self) {
        let auto_destroy = {
            let mut s = self.state_mut();
            s.pending_cb -= 1;
            s.flags.insert(StateFlags::FINISHED);
            s.has(StateFlags::AUTO_DESTROY)
        };
        tracing::debug!("writable finished");

        self.resolve_end_callbacks(Ok(()));
        self.settle_finished(Ok(()));
        self.emit(Signal::Finish);

        if auto_destroy {
            self.destroy(None);
        }
    }

    fn resolve_end_callbacks(&self, result: Result<()>) {
        let callbacks = std::mem::take(&mut self.state_mut().on_finished);
        for cb in callbacks {
            cb(result.clone());
        }
    }
}
