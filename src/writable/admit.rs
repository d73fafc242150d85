//! Admission: validate a producer write, queue or dispatch it, and report
//! backpressure.

use crate::error::{Result, WriteError};
use crate::writable::chunk::{Chunk, Encoding};
use crate::writable::dispatch::Payload;
use crate::writable::endpoint::Writable;
use crate::writable::state::{StateFlags, WriteCallback, WriteRequest};

impl Writable {
    /// Write `chunk` with the default encoding.
    ///
    /// `Ok(false)` asks the producer to wait for [`Signal::Drain`] before
    /// writing more. `Err` is only returned for chunks that cannot be admitted
    /// at all; lifecycle failures (write after end, after destroy) are reported
    /// through the error signal and yield `Ok(false)`.
    ///
    /// [`Signal::Drain`]: crate::writable::Signal::Drain
    pub fn write(&self, chunk: impl Into<Chunk>) -> Result<bool> {
        self.write_with(chunk, None, None)
    }

    pub fn write_with(
        &self,
        chunk: impl Into<Chunk>,
        encoding: Option<Encoding>,
        callback: Option<WriteCallback>,
    ) -> Result<bool> {
        let (chunk, encoding) = self.normalize(chunk.into(), encoding)?;
        Ok(self.admit(chunk, encoding, callback).unwrap_or(false))
    }

    /// Apply encoding rules and object-mode checks.
    pub(crate) fn normalize(
        &self,
        chunk: Chunk,
        encoding: Option<Encoding>,
    ) -> Result<(Chunk, Encoding)> {
        let (object_mode, decode_strings, default_encoding) = {
            let s = self.state();
            (
                s.object_mode(),
                s.has(StateFlags::DECODE_STRINGS),
                s.default_encoding,
            )
        };

        if object_mode {
            return Ok((chunk, encoding.unwrap_or(default_encoding)));
        }

        match chunk {
            Chunk::Bytes(bytes) => Ok((Chunk::Bytes(bytes), Encoding::Buffer)),
            Chunk::Text(text) => {
                let encoding = encoding.unwrap_or(default_encoding);
                if decode_strings {
                    Ok((Chunk::Bytes(encoding.encode(&text)?), Encoding::Buffer))
                } else {
                    Ok((Chunk::Text(text), encoding))
                }
            }
            Chunk::Object(_) => Err(WriteError::InvalidChunk(
                "object chunks require object mode".to_string(),
            )),
        }
    }

    /// Admit a normalized chunk. `Err` carries the lifecycle error the request
    /// was turned away with; it has already been routed to the callback.
    pub(crate) fn admit(
        &self,
        chunk: Chunk,
        encoding: Encoding,
        callback: Option<WriteCallback>,
    ) -> Result<bool> {
        let (rejection, stored) = {
            let s = self.state();
            let rejection = if s.has(StateFlags::ENDING) {
                Some(WriteError::WriteAfterEnd)
            } else if s.has(StateFlags::DESTROYED) {
                Some(WriteError::Destroyed { op: "write" })
            } else {
                None
            };
            (rejection, s.error.clone())
        };

        if let Some(err) = rejection {
            tracing::debug!(error = %err, "write rejected");
            self.reject(callback, err.clone());
            self.error_or_destroy(err.clone(), true);
            return Err(err);
        }

        // Errored without being destroyed: nothing will ever be dispatched
        if let Some(err) = stored {
            self.reject(callback, err.clone());
            return Err(err);
        }

        self.state_mut().pending_cb += 1;
        Ok(self.write_or_buffer(chunk, encoding, callback))
    }

    fn reject(&self, callback: Option<WriteCallback>, err: WriteError) {
        if let Some(callback) = callback {
            self.defer(move |_| callback(Err(err)));
        }
    }

    fn write_or_buffer(
        &self,
        chunk: Chunk,
        encoding: Encoding,
        callback: Option<WriteCallback>,
    ) -> bool {
        let (len, blocked) = {
            let mut s = self.state_mut();
            let len = if s.object_mode() { 1 } else { chunk.byte_len() };
            s.length += len;
            let blocked = s.any(StateFlags::WRITING | StateFlags::ERRORED)
                || s.corked > 0
                || !s.has(StateFlags::CONSTRUCTED);
            (len, blocked)
        };

        if blocked {
            self.state_mut().queue.push(WriteRequest {
                chunk,
                encoding,
                callback,
            });
        } else {
            self.do_write(Payload::Single(chunk, encoding), len, callback);
            // A synchronous completion leaves any follow-up writes to us
            self.clear_buffer();
        }

        let mut s = self.state_mut();
        let below = s.length < s.high_water_mark || s.length == 0;
        // Once false, keep answering false until drain
        let ret = below && !s.has(StateFlags::NEED_DRAIN);
        if !ret {
            s.flags.insert(StateFlags::NEED_DRAIN);
        }
        ret && !s.any(StateFlags::DESTROYED | StateFlags::ERRORED)
    }
}
