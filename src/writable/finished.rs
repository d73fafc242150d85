//! Await the end of an endpoint's life.

use crate::error::{Result, WriteError};
use crate::writable::endpoint::Writable;
use crate::writable::state::StateFlags;
use std::future::Future;
use tokio::sync::oneshot;

impl Writable {
    /// Resolves `Ok` once the endpoint finishes, with the endpoint's error if
    /// it fails, or with [`WriteError::PrematureClose`] if it closes first.
    pub fn finished(&self) -> impl Future<Output = Result<()>> + 'static {
        let (tx, rx) = oneshot::channel();

        let mut s = self.state_mut();
        let settled = if s.has(StateFlags::FINISHED) {
            Some(Ok(()))
        } else if s.has(StateFlags::ERROR_EMITTED) {
            s.error.clone().map(Err)
        } else if s.has(StateFlags::CLOSE_EMITTED) {
            Some(Err(s.error.clone().unwrap_or(WriteError::PrematureClose)))
        } else {
            None
        };
        match settled {
            Some(result) => {
                let _ = tx.send(result);
            }
            None => s.finished_waiters.push(tx),
        }
        drop(s);

        async move { rx.await.unwrap_or(Err(WriteError::PrematureClose)) }
    }

    /// Resolve every outstanding `finished()` future.
    pub(crate) fn settle_finished(&self, result: Result<()>) {
        let waiters = std::mem::take(&mut self.state_mut().finished_waiters);
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }
}
