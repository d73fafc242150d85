//! Sink over any tokio [`AsyncWrite`].
//!
//! Each call becomes a task on the current `LocalSet`; the writer sits behind
//! a `tokio::sync::Mutex` so finalization waits for the last write to land.

use crate::error::WriteError;
use crate::writable::{BatchEntry, Chunk, Completion, Encoding, Sink, SinkCapabilities};
use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use std::rc::Rc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

fn to_bytes(chunk: &Chunk, encoding: Encoding) -> Result<Bytes> {
    match chunk {
        Chunk::Bytes(b) => Ok(b.clone()),
        Chunk::Text(s) => Ok(encoding.encode(s)?),
        Chunk::Object(_) => anyhow::bail!("object chunks cannot be written to a byte sink"),
    }
}

pub struct AsyncWriteSink<W> {
    writer: Rc<Mutex<W>>,
}

impl<W> AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Rc::new(Mutex::new(writer)),
        }
    }

    fn spawn(&self, bytes: Bytes, done: Completion) {
        let writer = self.writer.clone();
        tokio::task::spawn_local(async move {
            let mut w = writer.lock().await;
            let result = w
                .write_all(&bytes)
                .await
                .with_context(|| format!("writing {} bytes", bytes.len()));
            done.complete(result.map_err(WriteError::sink));
        });
    }
}

impl<W> Sink for AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + 'static,
{
    fn capabilities(&self) -> SinkCapabilities {
        SinkCapabilities::WRITEV | SinkCapabilities::FINAL
    }

    fn write(&mut self, chunk: Chunk, encoding: Encoding, done: Completion) {
        match to_bytes(&chunk, encoding) {
            Ok(bytes) => self.spawn(bytes, done),
            Err(e) => done.fail(WriteError::sink(e)),
        }
    }

    /// Entries are copied into one buffer and written with a single call.
    fn writev(&mut self, entries: Vec<BatchEntry>, done: Completion) {
        let mut buf = BytesMut::new();
        for entry in &entries {
            match to_bytes(&entry.chunk, entry.encoding) {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(e) => return done.fail(WriteError::sink(e)),
            }
        }
        tracing::trace!("coalesced {} entries into {} bytes", entries.len(), buf.len());
        self.spawn(buf.freeze(), done);
    }

    fn finalize(&mut self, done: Completion) {
        let writer = self.writer.clone();
        tokio::task::spawn_local(async move {
            let mut w = writer.lock().await;
            let result = async {
                w.flush().await.context("flushing writer")?;
                w.shutdown().await.context("shutting down writer")?;
                Ok::<_, anyhow::Error>(())
            }
            .await;
            done.complete(result.map_err(WriteError::sink));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WritableConfig;
    use crate::writable::{LocalSpawner, Writable};
    use tokio::io::AsyncReadExt;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn test_duplex_round_trip() {
        LocalSet::new()
            .run_until(async {
                let (client, mut server) = tokio::io::duplex(64 * 1024);
                let w = Writable::new(
                    AsyncWriteSink::new(client),
                    WritableConfig::default(),
                    LocalSpawner,
                );

                for i in 0..10 {
                    w.write(format!("line {i}\n")).unwrap();
                }
                w.end();
                w.finished().await.unwrap();

                let mut out = String::new();
                server.read_to_string(&mut out).await.unwrap();
                assert_eq!(out.lines().count(), 10);
                assert!(out.starts_with("line 0\nline 1\n"));
            })
            .await;
    }

    #[test]
    fn test_object_chunk_rejected() {
        assert!(to_bytes(&Chunk::object(1u8), Encoding::Buffer).is_err());
        assert_eq!(
            to_bytes(&Chunk::Text("6869".into()), Encoding::Hex).unwrap().as_ref(),
            b"hi"
        );
    }
}
