use std::{
    cell::{Cell, RefCell},
    mem::take,
};

use derive_ex::Ex;
use indexmap::IndexMap;
use parse_display::Display;

use crate::Result;

#[cfg(test)]
mod tests;

/// Identity of a deferred flush. One key is delivered at most once per frame.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[display("flush#{0}")]
pub struct FlushKey(pub u64);

pub type FlushTask = Box<dyn FnOnce() -> Result<()>>;

/// Frame-batched deferred delivery.
///
/// `schedule_once` must not run `task` synchronously. A key that is already pending keeps its
/// original task and the new one is dropped. There is no cancellation: tasks check their own
/// state when they run.
pub trait Scheduler {
    fn schedule_once(&self, key: FlushKey, task: FlushTask);
}

/// [`Scheduler`] driven by explicit frame boundaries.
///
/// Call [`run_frame`](Self::run_frame) wherever the host renders a frame (a timer, a render
/// loop, or a test).
#[derive(Ex)]
#[derive_ex(Default)]
#[default(Self::new())]
pub struct FrameScheduler {
    pending: RefCell<IndexMap<FlushKey, FlushTask>>,
    frame: Cell<u64>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            pending: RefCell::new(IndexMap::new()),
            frame: Cell::new(0),
        }
    }

    /// Number of frames run so far.
    pub fn frame(&self) -> u64 {
        self.frame.get()
    }
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
    pub fn is_pending(&self, key: FlushKey) -> bool {
        self.pending.borrow().contains_key(&key)
    }

    /// Runs every task pending at the frame boundary, in scheduling order.
    ///
    /// Tasks scheduled while the frame runs are delivered in the next frame.
    /// All tasks run even if one fails; the first error is returned.
    pub fn run_frame(&self) -> Result<usize> {
        let tasks = take(&mut *self.pending.borrow_mut());
        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        tracing::trace!(frame, tasks = tasks.len(), "run frame");

        let count = tasks.len();
        let mut error = None;
        for (key, task) in tasks {
            if let Err(e) = task() {
                tracing::trace!(%key, error = %e, "flush failed");
                error.get_or_insert(e);
            }
        }
        match error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Runs frames until nothing is pending or `max_frames` frames have run.
    ///
    /// Returns the number of frames run.
    pub fn run_until_idle(&self, max_frames: usize) -> Result<usize> {
        let mut frames = 0;
        while frames < max_frames && self.pending_count() > 0 {
            self.run_frame()?;
            frames += 1;
        }
        Ok(frames)
    }
}

impl Scheduler for FrameScheduler {
    fn schedule_once(&self, key: FlushKey, task: FlushTask) {
        let mut pending = self.pending.borrow_mut();
        if pending.contains_key(&key) {
            return;
        }
        tracing::trace!(%key, "schedule flush");
        pending.insert(key, task);
    }
}
