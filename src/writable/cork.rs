//! Cork gate: hold writes in the queue so they reach the sink as one batch.

use crate::writable::endpoint::Writable;
use crate::writable::state::StateFlags;

impl Writable {
    /// Nestable; each `cork` needs a matching [`uncork`](Self::uncork).
    pub fn cork(&self) {
        self.state_mut().corked += 1;
    }

    /// Release one cork. Uncorking an uncorked endpoint does nothing.
    pub fn uncork(&self) {
        let (writing, ending) = {
            let mut s = self.state_mut();
            if s.corked == 0 {
                return;
            }
            s.corked -= 1;
            (s.has(StateFlags::WRITING), s.has(StateFlags::ENDING))
        };

        if !writing {
            self.clear_buffer();
        }
        if ending {
            self.finish_maybe(true);
        }
    }
}
