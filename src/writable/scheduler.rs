//! Cooperative scheduling turns.
//!
//! The engine never blocks. Work that must happen "later" (completions of
//! synchronous dispatches, finish after finalization, error and close signals)
//! is handed to a [`Scheduler`] and runs on a subsequent turn.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

pub trait Scheduler {
    /// Run `task` on a later turn, after the current call stack unwinds.
    fn defer(&self, task: Task);
}

/// Deterministic single-threaded turn queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct TickQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
}

impl TickQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every task queued before this turn started. Tasks deferred while the
    /// turn runs wait for the next turn. Returns the number of tasks run.
    pub fn run_turn(&self) -> usize {
        let due = self.tasks.borrow().len();
        for _ in 0..due {
            // Borrow released before the task runs; tasks defer more work.
            let task = self.tasks.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => return due,
            }
        }
        due
    }

    /// Run turns until no work remains. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_turn();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Scheduler for TickQueue {
    fn defer(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Defers onto the current tokio `LocalSet` via `spawn_local`.
///
/// Panics if used outside a `LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSpawner;

impl Scheduler for LocalSpawner {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}
