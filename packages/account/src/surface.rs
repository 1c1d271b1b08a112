//! Seams between the frame channel and its host environment.
//!
//! The channel never touches a DOM or a clock directly. It owns one
//! [`Surface`] (where frames are mounted) and shares one [`Scheduler`] (where
//! its watchdog runs). The browser implementations live in [`crate::web`];
//! deterministic ones for tests and headless hosts in [`crate::testing`].

use std::time::Duration;

use thiserror::Error;

/// The surface could not mount a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SurfaceError(pub String);

/// Where the channel renders the embedded account UI.
pub trait Surface {
    /// Whether the host document can accept a frame yet.
    fn is_ready(&self) -> bool;

    /// Mount a frame pointing at `url`. Invisible frames must not cover the page.
    fn mount(&mut self, url: &str, visible: bool) -> Result<(), SurfaceError>;

    /// Resize the mounted frame to what the surface reported.
    fn resize(&mut self, width: f64, height: f64);

    /// Remove the frame and any container around it. Must tolerate being
    /// called with nothing mounted.
    fn unmount(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// One-shot timers on the host's event loop.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId;

    /// Cancel a timer. Unknown or already-fired ids are ignored.
    fn cancel(&self, id: TimerId);
}

/// Longest delay a browser timer honours. Larger values overflow and fire at once.
pub const MAX_TIMER_MS: u32 = i32::MAX as u32;

/// Delay in whole milliseconds, clamped to [`MAX_TIMER_MS`].
pub fn timer_millis(delay: Duration) -> u32 {
    u32::try_from(delay.as_millis()).map_or(MAX_TIMER_MS, |ms| ms.min(MAX_TIMER_MS))
}
