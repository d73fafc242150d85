//! The `Writable` handle: construction, sink access and introspection.

use crate::config::WritableConfig;
use crate::error::{Result, WriteError};
use crate::writable::chunk::{Chunk, Encoding};
use crate::writable::events::{Listeners, Signal};
use crate::writable::scheduler::Scheduler;
use crate::writable::sink::{Completion, Sink, SinkCapabilities};
use crate::writable::state::{StateFlags, WritableState};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

pub(crate) struct Inner {
    state: RefCell<WritableState>,
    sink: RefCell<Box<dyn Sink>>,
    pub(crate) caps: SinkCapabilities,
    pub(crate) listeners: Listeners,
    scheduler: Box<dyn Scheduler>,
}

/// A buffered, backpressured writable endpoint over one [`Sink`].
///
/// Cloning yields another handle to the same endpoint. All activity happens on
/// one thread; work that must happen later goes through the endpoint's
/// [`Scheduler`].
#[derive(Clone)]
pub struct Writable {
    pub(crate) inner: Rc<Inner>,
}

impl Writable {
    pub fn new(
        sink: impl Sink + 'static,
        config: WritableConfig,
        scheduler: impl Scheduler + 'static,
    ) -> Self {
        let caps = sink.capabilities();
        let needs_construct = caps.contains(SinkCapabilities::CONSTRUCT);

        let writable = Self {
            inner: Rc::new(Inner {
                state: RefCell::new(WritableState::new(&config, !needs_construct)),
                sink: RefCell::new(Box::new(sink)),
                caps,
                listeners: Listeners::default(),
                scheduler: Box::new(scheduler),
            }),
        };

        if needs_construct {
            writable.defer(|w| w.start_construct());
        }
        writable
    }

    // =========================================================================
    // Internal plumbing
    // =========================================================================

    pub(crate) fn state(&self) -> Ref<'_, WritableState> {
        self.inner.state.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, WritableState> {
        self.inner.state.borrow_mut()
    }

    pub(crate) fn weak(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Run `f` on a later turn.
    pub(crate) fn defer(&self, f: impl FnOnce(&Writable) + 'static) {
        let this = self.clone();
        self.inner.scheduler.defer(Box::new(move || f(&this)));
    }

    /// Call into the sink with `SYNC` raised, so completions resolved before
    /// the call returns are recognised as synchronous.
    pub(crate) fn call_sink<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn Sink) + 'static,
    {
        let Ok(mut sink) = self.inner.sink.try_borrow_mut() else {
            // The sink re-entered the endpoint from inside one of its own calls
            self.defer(move |w| w.call_sink(f));
            return;
        };
        self.state_mut().flags.insert(StateFlags::SYNC);
        f(&mut **sink);
        self.state_mut().flags.remove(StateFlags::SYNC);
    }

    pub(crate) fn emit(&self, signal: Signal) {
        tracing::trace!(?signal, "emit");
        self.inner.listeners.emit(signal);
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn start_construct(&self) {
        let weak = self.weak();
        let called = Cell::new(false);
        let done = Completion::new(move |result| {
            let Some(w) = Writable::upgrade(&weak) else {
                return;
            };
            if called.replace(true) {
                tracing::warn!("construct completion resolved more than once");
                w.error_or_destroy(result.err().unwrap_or(WriteError::MultipleCallback), false);
                return;
            }
            // Settled on a later turn, so a destroy issued in between is seen
            // before anything is dispatched
            w.defer(move |w| w.on_constructed(result));
        });
        tracing::debug!("constructing sink");
        self.call_sink(move |sink| sink.construct(done));
    }

    fn on_constructed(&self, result: Result<()>) {
        let (pending_destroy, stored, writing, ending) = {
            let mut s = self.state_mut();
            s.flags.insert(StateFlags::CONSTRUCTED);
            (
                s.pending_destroy.take(),
                s.error.clone(),
                s.has(StateFlags::WRITING),
                s.has(StateFlags::ENDING),
            )
        };
        tracing::debug!(ok = result.is_ok(), "sink constructed");

        if let Some(callback) = pending_destroy {
            let error = stored.or(result.err());
            if let Some(err) = &error {
                self.state_mut().set_errored(err);
            }
            self.run_destroy(error, callback);
        } else if let Err(err) = result {
            self.error_or_destroy(err, true);
        } else {
            if !writing {
                self.clear_buffer();
            }
            if ending {
                self.finish_maybe(false);
            }
        }
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn on(&self, signal: Signal, listener: impl Fn() + 'static) {
        self.inner.listeners.add(signal, Rc::new(listener));
    }

    pub fn on_error(&self, listener: impl Fn(&WriteError) + 'static) {
        self.inner.listeners.add_error(Rc::new(listener));
    }

    pub fn listener_count(&self, signal: Signal) -> usize {
        self.inner.listeners.count(signal)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn set_default_encoding(&self, encoding: &str) -> Result<&Self> {
        let encoding: Encoding = encoding.parse()?;
        self.state_mut().default_encoding = encoding;
        Ok(self)
    }

    pub fn default_encoding(&self) -> Encoding {
        self.state().default_encoding
    }

    pub fn writable_length(&self) -> usize {
        self.state().length
    }

    pub fn writable_high_water_mark(&self) -> usize {
        self.state().high_water_mark
    }

    pub fn writable_corked(&self) -> usize {
        self.state().corked
    }

    pub fn writable_object_mode(&self) -> bool {
        self.state().object_mode()
    }

    pub fn writable_need_drain(&self) -> bool {
        let s = self.state();
        s.has(StateFlags::NEED_DRAIN) && !s.any(StateFlags::DESTROYED | StateFlags::ENDING)
    }

    /// `end()` has been called.
    pub fn writable_ended(&self) -> bool {
        self.state().has(StateFlags::ENDING)
    }

    pub fn writable_finished(&self) -> bool {
        self.state().has(StateFlags::FINISHED)
    }

    /// Destroyed or errored before finishing.
    pub fn writable_aborted(&self) -> bool {
        let s = self.state();
        s.any(StateFlags::DESTROYED | StateFlags::ERRORED) && !s.has(StateFlags::FINISHED)
    }

    /// Still accepting writes.
    pub fn is_writable(&self) -> bool {
        !self.state().any(
            StateFlags::ENDING | StateFlags::ENDED | StateFlags::DESTROYED | StateFlags::ERRORED,
        )
    }

    pub fn buffered_request_count(&self) -> usize {
        self.state().queue.len()
    }

    /// Chunks queued behind the in-flight dispatch, in dispatch order.
    pub fn buffered_chunks(&self) -> Vec<Chunk> {
        self.state().queue.iter().map(|r| r.chunk.clone()).collect()
    }

    /// Caller completions not yet invoked.
    pub fn pending_callbacks(&self) -> usize {
        self.state().pending_cb
    }

    pub fn errored(&self) -> Option<WriteError> {
        self.state().error.clone()
    }

    pub fn destroyed(&self) -> bool {
        self.state().has(StateFlags::DESTROYED)
    }

    /// The sink's destroy has resolved.
    pub fn closed(&self) -> bool {
        self.state().has(StateFlags::CLOSED)
    }
}

impl fmt::Debug for Writable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.state();
        f.debug_struct("Writable")
            .field("flags", &s.flags)
            .field("length", &s.length)
            .field("high_water_mark", &s.high_water_mark)
            .field("corked", &s.corked)
            .field("buffered", &s.queue.len())
            .field("pending_cb", &s.pending_cb)
            .finish()
    }
}
