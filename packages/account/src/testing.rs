//! Deterministic stand-ins for the browser: a manually advanced clock and a
//! surface that records what was mounted. Used by this crate's tests and by
//! hosts that drive the client headlessly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::surface::{Scheduler, Surface, SurfaceError, TimerId};

struct Timer {
    id: TimerId,
    deadline: Duration,
    callback: Box<dyn FnOnce()>,
}

/// A [`Scheduler`] whose clock only moves when told to.
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    timers: RefCell<Vec<Timer>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Move the clock forward, firing due timers in deadline order. Timers
    /// scheduled by a firing callback fire too if they fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let due = {
                let mut timers = self.timers.borrow_mut();
                let next = timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.deadline <= target)
                    .min_by_key(|(_, t)| (t.deadline, t.id))
                    .map(|(i, _)| i);
                next.map(|i| timers.remove(i))
            };
            let Some(timer) = due else {
                break;
            };
            self.now.set(timer.deadline);
            (timer.callback)();
        }
        self.now.set(target);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.timers.borrow_mut().push(Timer {
            id,
            deadline: self.now.get() + delay,
            callback,
        });
        id
    }

    fn cancel(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|t| t.id != id);
    }
}

/// A frame as the [`RecordingSurface`] last saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct MountedFrame {
    pub url: String,
    pub visible: bool,
    /// `(width, height)` from the last resize.
    pub size: Option<(f64, f64)>,
}

#[derive(Debug, Default)]
struct SurfaceLog {
    ready: bool,
    fail_mounts: bool,
    mounted: Option<MountedFrame>,
    mounts: usize,
    unmounts: usize,
}

/// A [`Surface`] that records mounts instead of rendering. Clones share the
/// same log, so keep one and hand another to the channel.
#[derive(Clone, Debug, Default)]
pub struct RecordingSurface {
    log: Rc<RefCell<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new(ready: bool) -> Self {
        let surface = Self::default();
        surface.log.borrow_mut().ready = ready;
        surface
    }

    pub fn set_ready(&self, ready: bool) {
        self.log.borrow_mut().ready = ready;
    }

    /// Make every following mount fail.
    pub fn fail_mounts(&self, fail: bool) {
        self.log.borrow_mut().fail_mounts = fail;
    }

    pub fn mounted(&self) -> Option<MountedFrame> {
        self.log.borrow().mounted.clone()
    }

    pub fn mount_count(&self) -> usize {
        self.log.borrow().mounts
    }

    pub fn unmount_count(&self) -> usize {
        self.log.borrow().unmounts
    }
}

impl Surface for RecordingSurface {
    fn is_ready(&self) -> bool {
        self.log.borrow().ready
    }

    fn mount(&mut self, url: &str, visible: bool) -> Result<(), SurfaceError> {
        let mut log = self.log.borrow_mut();
        if log.fail_mounts {
            return Err(SurfaceError("mount refused".to_string()));
        }
        log.mounts += 1;
        log.mounted = Some(MountedFrame {
            url: url.to_string(),
            visible,
            size: None,
        });
        Ok(())
    }

    fn resize(&mut self, width: f64, height: f64) {
        if let Some(frame) = self.log.borrow_mut().mounted.as_mut() {
            frame.size = Some((width, height));
        }
    }

    fn unmount(&mut self) {
        let mut log = self.log.borrow_mut();
        if log.mounted.take().is_some() {
            log.unmounts += 1;
        }
    }
}
