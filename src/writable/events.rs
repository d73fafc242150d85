//! Signal listeners: drain, prefinish, finish, close, error.

use crate::error::WriteError;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Drain,
    Prefinish,
    Finish,
    Close,
}

type Listener = Rc<dyn Fn()>;
type ErrorListener = Rc<dyn Fn(&WriteError)>;

#[derive(Default)]
pub(crate) struct Listeners {
    drain: RefCell<Vec<Listener>>,
    prefinish: RefCell<Vec<Listener>>,
    finish: RefCell<Vec<Listener>>,
    close: RefCell<Vec<Listener>>,
    error: RefCell<Vec<ErrorListener>>,
}

impl Listeners {
    fn slot(&self, signal: Signal) -> &RefCell<Vec<Listener>> {
        match signal {
            Signal::Drain => &self.drain,
            Signal::Prefinish => &self.prefinish,
            Signal::Finish => &self.finish,
            Signal::Close => &self.close,
        }
    }

    pub fn add(&self, signal: Signal, listener: Listener) {
        self.slot(signal).borrow_mut().push(listener);
    }

    pub fn add_error(&self, listener: ErrorListener) {
        self.error.borrow_mut().push(listener);
    }

    /// Listeners may register more listeners; those see the next emission only.
    pub fn emit(&self, signal: Signal) {
        let listeners = self.slot(signal).borrow().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Returns false when nobody was listening.
    pub fn emit_error(&self, err: &WriteError) -> bool {
        let listeners = self.error.borrow().clone();
        for listener in &listeners {
            listener(err);
        }
        !listeners.is_empty()
    }

    pub fn count(&self, signal: Signal) -> usize {
        self.slot(signal).borrow().len()
    }
}
