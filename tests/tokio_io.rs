//! The tokio adapter driving real writers.

use flowsink::sinks::AsyncWriteSink;
use flowsink::{LocalSpawner, Signal, Writable, WritableConfig, WriteError};
use std::cell::Cell;
use std::rc::Rc;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::task::LocalSet;

#[tokio::test]
async fn test_file_sink_writes_everything() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("out.log");

    LocalSet::new()
        .run_until(async {
            let file = tokio::fs::File::create(&path).await.unwrap();
            let w = Writable::new(
                AsyncWriteSink::new(file),
                WritableConfig::default().with_high_water_mark(64),
                LocalSpawner,
            );

            let mut expected = String::new();
            for i in 0..200 {
                let line = format!("record {i:04}\n");
                expected.push_str(&line);
                if !w.write(line).unwrap() {
                    // Wait for the queue to empty before producing more
                    let drained = Rc::new(tokio::sync::Notify::new());
                    let d = drained.clone();
                    w.on(Signal::Drain, move || d.notify_one());
                    drained.notified().await;
                }
            }
            w.end();
            w.finished().await.unwrap();

            let written = tokio::fs::read_to_string(&path).await.unwrap();
            assert_eq!(written, expected);
        })
        .await;
}

#[tokio::test]
async fn test_corked_lines_reach_file_as_one_write() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("batch.txt");

    LocalSet::new()
        .run_until(async {
            let file = tokio::fs::File::create(&path).await.unwrap();
            let w = Writable::new(
                AsyncWriteSink::new(file),
                WritableConfig::default(),
                LocalSpawner,
            );

            w.cork();
            w.write("alpha ").unwrap();
            w.write("beta ").unwrap();
            w.write("gamma").unwrap();
            assert_eq!(w.buffered_request_count(), 3);
            w.end();
            assert_eq!(w.buffered_request_count(), 0);

            w.finished().await.unwrap();
            assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "alpha beta gamma");
        })
        .await;
}

#[tokio::test]
async fn test_closed_reader_surfaces_error() {
    LocalSet::new()
        .run_until(async {
            let (client, server) = tokio::io::duplex(16);
            drop(server);

            let w = Writable::new(
                AsyncWriteSink::new(client),
                WritableConfig::default(),
                LocalSpawner,
            );
            let errors = Rc::new(Cell::new(0));
            let e = errors.clone();
            w.on_error(move |_| e.set(e.get() + 1));

            w.write("nobody is listening").unwrap();
            w.end();
            let err = w.finished().await.unwrap_err();

            assert!(matches!(err, WriteError::Sink(_)));
            assert_eq!(errors.get(), 1);
            assert!(w.destroyed());
        })
        .await;
}

#[tokio::test]
async fn test_duplex_reader_sees_stream_in_order() {
    LocalSet::new()
        .run_until(async {
            let (client, mut server) = tokio::io::duplex(1024);
            let w = Writable::new(
                AsyncWriteSink::new(client),
                WritableConfig::default(),
                LocalSpawner,
            );

            let reader = tokio::task::spawn_local(async move {
                let mut out = Vec::new();
                server.read_to_end(&mut out).await.unwrap();
                out
            });

            for i in 0u8..50 {
                w.write(vec![i; 32]).unwrap();
            }
            w.end();
            w.finished().await.unwrap();

            let out = reader.await.unwrap();
            let expected: Vec<u8> = (0u8..50).flat_map(|i| vec![i; 32]).collect();
            assert_eq!(out, expected);
        })
        .await;
}
