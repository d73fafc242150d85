//! Scripted sink shared by the integration tests.
//!
//! The sink records every call and either completes it on the spot
//! (`Mode::Sync`) or holds the completion until the test releases it
//! (`Mode::Held`).

#![allow(dead_code)]

use flowsink::{BatchEntry, Chunk, Completion, Encoding, Sink, SinkCapabilities, WriteError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sync,
    Held,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(Vec<u8>),
    Writev(Vec<Vec<u8>>),
    Final,
    Destroy(Option<String>),
}

struct Script {
    mode: Mode,
    /// 1-based write number that fails, counting writev calls as one
    fail_on: Option<usize>,
    writes: usize,
    calls: Vec<Call>,
    held: VecDeque<Completion>,
    held_final: Option<Completion>,
    hold_final: bool,
    outstanding: usize,
    max_outstanding: usize,
}

/// Test-side handle to a [`ScriptedSink`].
#[derive(Clone)]
pub struct Control {
    script: Rc<RefCell<Script>>,
}

pub struct ScriptedSink {
    script: Rc<RefCell<Script>>,
    caps: SinkCapabilities,
}

pub fn scripted(mode: Mode, caps: SinkCapabilities) -> (ScriptedSink, Control) {
    let script = Rc::new(RefCell::new(Script {
        mode,
        fail_on: None,
        writes: 0,
        calls: Vec::new(),
        held: VecDeque::new(),
        held_final: None,
        hold_final: false,
        outstanding: 0,
        max_outstanding: 0,
    }));
    (
        ScriptedSink {
            script: script.clone(),
            caps,
        },
        Control { script },
    )
}

pub fn sink_error(msg: &str) -> WriteError {
    WriteError::sink(anyhow::anyhow!("{}", msg))
}

fn bytes_of(chunk: &Chunk) -> Vec<u8> {
    match chunk {
        Chunk::Bytes(b) => b.to_vec(),
        Chunk::Text(s) => s.as_bytes().to_vec(),
        Chunk::Object(_) => b"<object>".to_vec(),
    }
}

impl Control {
    pub fn fail_on_write(&self, n: usize) {
        self.script.borrow_mut().fail_on = Some(n);
    }

    pub fn hold_final(&self) {
        self.script.borrow_mut().hold_final = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.borrow().calls.clone()
    }

    /// Bytes in the order the sink saw them.
    pub fn data(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for call in &self.script.borrow().calls {
            match call {
                Call::Write(b) => out.extend_from_slice(b),
                Call::Writev(entries) => entries.iter().for_each(|b| out.extend_from_slice(b)),
                _ => {}
            }
        }
        out
    }

    pub fn held(&self) -> usize {
        self.script.borrow().held.len()
    }

    pub fn max_outstanding(&self) -> usize {
        self.script.borrow().max_outstanding
    }

    /// Resolve the oldest held write.
    pub fn complete_next(&self, result: Result<(), WriteError>) -> bool {
        let done = {
            let mut s = self.script.borrow_mut();
            let done = s.held.pop_front();
            if done.is_some() {
                s.outstanding -= 1;
            }
            done
        };
        match done {
            Some(done) => {
                done.complete(result);
                true
            }
            None => false,
        }
    }

    pub fn complete_final(&self, result: Result<(), WriteError>) {
        let done = self.script.borrow_mut().held_final.take();
        if let Some(done) = done {
            done.complete(result);
        }
    }
}

impl ScriptedSink {
    fn dispatch(&mut self, call: Call, done: Completion) {
        let (mode, fail) = {
            let mut s = self.script.borrow_mut();
            s.writes += 1;
            s.calls.push(call);
            s.outstanding += 1;
            s.max_outstanding = s.max_outstanding.max(s.outstanding);
            (s.mode, s.fail_on == Some(s.writes))
        };

        match mode {
            Mode::Held if !fail => self.script.borrow_mut().held.push_back(done),
            _ => {
                self.script.borrow_mut().outstanding -= 1;
                if fail {
                    done.fail(sink_error("injected write failure"));
                } else {
                    done.ok();
                }
            }
        }
    }
}

impl Sink for ScriptedSink {
    fn capabilities(&self) -> SinkCapabilities {
        self.caps
    }

    fn write(&mut self, chunk: Chunk, _encoding: Encoding, done: Completion) {
        self.dispatch(Call::Write(bytes_of(&chunk)), done);
    }

    fn writev(&mut self, entries: Vec<BatchEntry>, done: Completion) {
        let chunks = entries.iter().map(|e| bytes_of(&e.chunk)).collect();
        self.dispatch(Call::Writev(chunks), done);
    }

    fn finalize(&mut self, done: Completion) {
        let hold = {
            let mut s = self.script.borrow_mut();
            s.calls.push(Call::Final);
            s.hold_final
        };
        if hold {
            self.script.borrow_mut().held_final = Some(done);
        } else {
            done.ok();
        }
    }

    fn destroy(&mut self, error: Option<WriteError>, done: Completion) {
        self.script
            .borrow_mut()
            .calls
            .push(Call::Destroy(error.as_ref().map(|e| e.to_string())));
        done.complete(error.map_or(Ok(()), Err));
    }
}
