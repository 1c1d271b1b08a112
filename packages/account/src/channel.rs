//! # Frame channel
//!
//! [`FrameChannel`] owns the single embedded frame the client may show at a
//! time and the origin-checked message protocol spoken with it.
//!
//! ## Serialisation
//!
//! Requests are accepted at any time through [`FrameChannel::open`] and run one
//! at a time, in arrival order. A request waits in the backlog while the
//! document is not ready or while another request holds the frame. Each
//! terminal outcome releases exactly one queued request.
//!
//! ## States
//!
//! ```text
//! Idle ──open──▶ Opening ──iframe.loaded──▶ Loaded
//!                   │                          │
//!                   └──── done / close / watchdog / close() ───▶ Closed ──▶ Idle
//! ```
//!
//! `Opening` and `Loaded` are busy. `Closed` lasts only while the finished
//! request's callback runs; a request opened from inside that callback is
//! queued behind the existing backlog.
//!
//! ## Delivery guarantee
//!
//! Every request's `on_finish` runs exactly once with one [`Outcome`]: the
//! `done` payload, `Closed`, `TimedOut`, or `Failed` if the surface could not
//! mount it. The watchdog is armed when the frame is mounted and disarmed by
//! `iframe.loaded`; once a request has settled, late messages and stale timers
//! for it are ignored.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::protocol::{self, DonePayload, Message};
use crate::surface::{Scheduler, Surface, TimerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Opening,
    Loaded,
    Closed,
}

impl ChannelState {
    pub fn is_busy(self) -> bool {
        matches!(self, ChannelState::Opening | ChannelState::Loaded)
    }
}

/// How a request ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Done(DonePayload),
    /// The user dismissed the frame, or the host closed the channel.
    Closed,
    TimedOut(Duration),
    Failed(String),
}

type LoadedFn = Box<dyn FnOnce()>;
type FinishFn = Box<dyn FnOnce(Outcome)>;

/// A request to show the surface at `path`.
pub struct PendingRequest {
    path: String,
    query: Vec<(String, String)>,
    visible: bool,
    on_loaded: Option<LoadedFn>,
    on_finish: Option<FinishFn>,
}

impl PendingRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            visible: false,
            on_loaded: None,
            on_finish: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn on_loaded(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_loaded = Some(Box::new(f));
        self
    }

    pub fn on_finish(mut self, f: impl FnOnce(Outcome) + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn finish(self, outcome: Outcome) {
        if let Some(f) = self.on_finish {
            f(outcome);
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("path", &self.path)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}

struct Active {
    generation: u64,
    /// Origin the frame was mounted from; its messages are checked against it.
    origin: String,
    timeout: Duration,
    on_loaded: Option<LoadedFn>,
    on_finish: Option<FinishFn>,
    watchdog: Option<TimerId>,
}

impl Active {
    fn finish(self, outcome: Outcome) {
        if let Some(f) = self.on_finish {
            f(outcome);
        }
    }
}

struct Inner {
    origin: String,
    timeout: Duration,
    surface: Box<dyn Surface>,
    scheduler: Rc<dyn Scheduler>,
    state: ChannelState,
    ready: bool,
    backlog: VecDeque<PendingRequest>,
    active: Option<Active>,
    generation: u64,
}

impl Inner {
    /// Drop the frame and hand back the request that owned it.
    fn teardown(&mut self) -> Option<Active> {
        let mut active = self.active.take()?;
        if let Some(timer) = active.watchdog.take() {
            self.scheduler.cancel(timer);
        }
        self.surface.unmount();
        self.state = ChannelState::Closed;
        Some(active)
    }
}

/// Serialised, origin-checked request channel over one embedded frame.
#[derive(Clone)]
pub struct FrameChannel {
    inner: Rc<RefCell<Inner>>,
}

impl FrameChannel {
    pub fn new(
        baseurl: &str,
        timeout: Duration,
        surface: Box<dyn Surface>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Self {
        let ready = surface.is_ready();
        Self {
            inner: Rc::new(RefCell::new(Inner {
                origin: baseurl.trim_end_matches('/').to_string(),
                timeout,
                surface,
                scheduler,
                state: ChannelState::Idle,
                ready,
                backlog: VecDeque::new(),
                active: None,
                generation: 0,
            })),
        }
    }

    pub fn origin(&self) -> String {
        self.inner.borrow().origin.clone()
    }

    /// Whether a message from `origin` may be processed. While a frame is
    /// mounted only its own origin is accepted, even after [`reconfigure`].
    ///
    /// [`reconfigure`]: FrameChannel::reconfigure
    pub fn accepts(&self, origin: &str) -> bool {
        let inner = self.inner.borrow();
        match &inner.active {
            Some(active) => active.origin == origin,
            None => inner.origin == origin,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.borrow().state
    }

    pub fn backlog_len(&self) -> usize {
        self.inner.borrow().backlog.len()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.borrow().ready
    }

    /// Point the channel at another origin and deadline. Applies to requests
    /// mounted from now on; a mounted frame keeps its origin until it finishes.
    pub fn reconfigure(&self, baseurl: &str, timeout: Duration) {
        let mut inner = self.inner.borrow_mut();
        inner.origin = baseurl.trim_end_matches('/').to_string();
        inner.timeout = timeout;
    }

    /// Queue a request; it runs as soon as the frame is free.
    pub fn open(&self, request: PendingRequest) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.backlog.push_back(request);
            trace!(backlog = inner.backlog.len(), "frame request queued");
        }
        self.release_next();
    }

    /// The host document became ready to hold a frame.
    pub fn document_ready(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.ready {
                return;
            }
            inner.ready = true;
        }
        debug!("document ready");
        self.release_next();
    }

    /// Tear down the frame. The active request and everything queued behind it
    /// finish with [`Outcome::Closed`]. Does nothing on an idle channel.
    pub fn close(&self) {
        let (active, queued) = {
            let mut inner = self.inner.borrow_mut();
            let active = inner.teardown();
            let queued: Vec<PendingRequest> = inner.backlog.drain(..).collect();
            if active.is_none() && queued.is_empty() {
                return;
            }
            inner.state = ChannelState::Closed;
            (active, queued)
        };
        debug!(queued = queued.len(), "closing frame channel");
        if let Some(active) = active {
            active.finish(Outcome::Closed);
        }
        for request in queued {
            request.finish(Outcome::Closed);
        }
        self.settled();
    }

    /// Process one message posted to the host window.
    pub fn handle_message(&self, origin: &str, data: &Value) {
        if !self.accepts(origin) {
            trace!("discarding message from foreign origin");
            return;
        }
        let Some(message) = Message::from_value(data) else {
            trace!("ignoring non-protocol message");
            return;
        };
        debug!(code = message.code(), "frame message");
        match message {
            Message::Loaded { height, width } => self.loaded(width, height),
            Message::Close {} => self.finish(Outcome::Closed),
            Message::Done(payload) => self.finish(Outcome::Done(payload)),
        }
    }

    fn loaded(&self, width: f64, height: f64) {
        let on_loaded = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let Some(active) = inner.active.as_mut() else {
                trace!("loaded message without an active frame");
                return;
            };
            if let Some(timer) = active.watchdog.take() {
                inner.scheduler.cancel(timer);
            }
            let on_loaded = active.on_loaded.take();
            inner.surface.resize(width, height);
            inner.state = ChannelState::Loaded;
            on_loaded
        };
        if let Some(f) = on_loaded {
            f();
        }
    }

    fn finish(&self, outcome: Outcome) {
        let active = self.inner.borrow_mut().teardown();
        let Some(active) = active else {
            trace!("terminal message without an active frame");
            return;
        };
        active.finish(outcome);
        self.settled();
    }

    fn expire(&self, generation: u64) {
        let active = {
            let mut inner = self.inner.borrow_mut();
            match inner.active.as_mut() {
                Some(active) if active.generation == generation => {
                    // Already fired; nothing to cancel.
                    active.watchdog = None;
                }
                _ => return,
            }
            inner.teardown()
        };
        let Some(active) = active else {
            return;
        };
        let timeout = active.timeout;
        warn!(timeout_ms = timeout.as_millis() as u64, "frame request timed out");
        active.finish(Outcome::TimedOut(timeout));
        self.settled();
    }

    fn settled(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state == ChannelState::Closed {
                inner.state = ChannelState::Idle;
            }
        }
        self.release_next();
    }

    fn release_next(&self) {
        let next = {
            let mut inner = self.inner.borrow_mut();
            if !inner.ready || inner.state != ChannelState::Idle {
                return;
            }
            match inner.backlog.pop_front() {
                Some(request) => request,
                None => return,
            }
        };
        self.activate(next);
    }

    fn activate(&self, request: PendingRequest) {
        let PendingRequest {
            path,
            query,
            visible,
            on_loaded,
            on_finish,
        } = request;

        let failed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let url = protocol::build_url(&inner.origin, &path, &query);
            debug!(%path, visible, "opening frame");
            match inner.surface.mount(&url, visible) {
                Ok(()) => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let weak = Rc::downgrade(&self.inner);
                    let watchdog = inner.scheduler.schedule(
                        inner.timeout,
                        Box::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                FrameChannel { inner }.expire(generation);
                            }
                        }),
                    );
                    inner.active = Some(Active {
                        generation,
                        origin: inner.origin.clone(),
                        timeout: inner.timeout,
                        on_loaded,
                        on_finish,
                        watchdog: Some(watchdog),
                    });
                    inner.state = ChannelState::Opening;
                    None
                }
                Err(err) => {
                    inner.state = ChannelState::Closed;
                    Some((err, on_finish))
                }
            }
        };

        if let Some((err, on_finish)) = failed {
            warn!(%err, %path, "could not mount frame");
            if let Some(f) = on_finish {
                f(Outcome::Failed(err.to_string()));
            }
            self.settled();
        }
    }
}

impl fmt::Debug for FrameChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("FrameChannel")
            .field("origin", &inner.origin)
            .field("state", &inner.state)
            .field("ready", &inner.ready)
            .field("backlog", &inner.backlog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualScheduler, RecordingSurface};
    use serde_json::json;

    const ORIGIN: &str = "http://localhost";
    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Fixture {
        channel: FrameChannel,
        surface: RecordingSurface,
        scheduler: Rc<ManualScheduler>,
        outcomes: Rc<RefCell<Vec<(String, Outcome)>>>,
    }

    impl Fixture {
        fn new(ready: bool) -> Self {
            let surface = RecordingSurface::new(ready);
            let scheduler = Rc::new(ManualScheduler::new());
            let channel = FrameChannel::new(
                ORIGIN,
                TIMEOUT,
                Box::new(surface.clone()),
                scheduler.clone(),
            );
            Self {
                channel,
                surface,
                scheduler,
                outcomes: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn request(&self, path: &str) -> PendingRequest {
            let outcomes = self.outcomes.clone();
            let name = path.to_string();
            PendingRequest::new(path).on_finish(move |outcome| {
                outcomes.borrow_mut().push((name, outcome));
            })
        }

        fn send(&self, data: Value) {
            self.channel.handle_message(ORIGIN, &data);
        }

        fn finished(&self) -> Vec<String> {
            self.outcomes.borrow().iter().map(|(name, _)| name.clone()).collect()
        }
    }

    #[test]
    fn test_open_mounts_frame_and_arms_watchdog() {
        let f = Fixture::new(true);
        f.channel.open(
            f.request("/form")
                .query("name", "signin")
                .query("app", "dev")
                .visible(true),
        );

        let frame = f.surface.mounted().unwrap();
        assert_eq!(frame.url, "http://localhost/form?name=signin&app=dev");
        assert!(frame.visible);
        assert_eq!(f.channel.state(), ChannelState::Opening);
        assert_eq!(f.scheduler.pending(), 1);
    }

    #[test]
    fn test_invisible_by_default() {
        let f = Fixture::new(true);
        f.channel.open(f.request("session"));
        assert!(!f.surface.mounted().unwrap().visible);
    }

    #[test]
    fn test_loaded_resizes_and_disarms_watchdog() {
        let f = Fixture::new(true);
        let loaded = Rc::new(RefCell::new(0));
        let counter = loaded.clone();
        f.channel
            .open(f.request("/form").on_loaded(move || *counter.borrow_mut() += 1));

        f.send(json!({ "code": "iframe.loaded", "height": 480, "width": 360 }));
        assert_eq!(*loaded.borrow(), 1);
        assert_eq!(f.channel.state(), ChannelState::Loaded);
        assert_eq!(f.surface.mounted().unwrap().size, Some((360.0, 480.0)));
        assert_eq!(f.scheduler.pending(), 0);

        // The user may take as long as they like once the form is up
        f.scheduler.advance(TIMEOUT * 10);
        assert!(f.outcomes.borrow().is_empty());
        assert_eq!(f.channel.state(), ChannelState::Loaded);
    }

    #[test]
    fn test_done_delivers_payload_and_tears_down() {
        let f = Fixture::new(true);
        f.channel.open(f.request("/form"));
        f.send(json!({ "code": "iframe.loaded", "height": 1, "width": 1 }));
        f.send(json!({ "code": "iframe.done", "status": 200 }));

        assert_eq!(
            f.outcomes.borrow().as_slice(),
            &[("/form".to_string(), Outcome::Done(DonePayload::new(200)))]
        );
        assert!(f.surface.mounted().is_none());
        assert_eq!(f.surface.unmount_count(), 1);
        assert_eq!(f.channel.state(), ChannelState::Idle);
    }

    #[test]
    fn test_close_message_reports_closed() {
        let f = Fixture::new(true);
        f.channel.open(f.request("/form"));
        f.send(json!({ "code": "iframe.close" }));

        assert_eq!(f.outcomes.borrow()[0].1, Outcome::Closed);
        assert!(f.surface.mounted().is_none());
        assert_eq!(f.channel.state(), ChannelState::Idle);
    }

    #[test]
    fn test_foreign_origin_is_discarded() {
        let f = Fixture::new(true);
        f.channel.open(f.request("/form"));

        f.channel
            .handle_message("http://evil.example", &json!({ "code": "iframe.done", "status": 200 }));
        f.channel
            .handle_message("http://localhost:8080", &json!({ "code": "iframe.close" }));
        assert!(f.outcomes.borrow().is_empty());
        assert_eq!(f.channel.state(), ChannelState::Opening);
    }

    #[test]
    fn test_unknown_messages_are_ignored() {
        let f = Fixture::new(true);
        f.channel.open(f.request("/form"));
        f.send(json!({ "code": "iframe.resize", "height": 1 }));
        f.send(json!("hello"));
        assert!(f.outcomes.borrow().is_empty());
        assert_eq!(f.channel.state(), ChannelState::Opening);
    }

    #[test]
    fn test_backlog_runs_in_arrival_order() {
        let f = Fixture::new(true);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));
        f.channel.open(f.request("c"));
        assert_eq!(f.channel.backlog_len(), 2);
        assert_eq!(f.surface.mount_count(), 1);

        f.send(json!({ "code": "iframe.done", "status": 200 }));
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/b");
        f.send(json!({ "code": "iframe.close" }));
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/c");
        f.send(json!({ "code": "iframe.done", "status": 200 }));

        assert_eq!(f.finished(), vec!["a", "b", "c"]);
        assert_eq!(f.channel.backlog_len(), 0);
        assert_eq!(f.channel.state(), ChannelState::Idle);
    }

    #[test]
    fn test_waits_for_document_ready() {
        let f = Fixture::new(false);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));
        assert!(f.surface.mounted().is_none());
        assert_eq!(f.channel.state(), ChannelState::Idle);

        f.channel.document_ready();
        // Exactly one request is released
        assert_eq!(f.surface.mount_count(), 1);
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/a");
        assert_eq!(f.channel.backlog_len(), 1);

        // A second ready signal changes nothing
        f.channel.document_ready();
        assert_eq!(f.surface.mount_count(), 1);
    }

    #[test]
    fn test_watchdog_times_out_exactly_once() {
        let f = Fixture::new(true);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));

        f.scheduler.advance(TIMEOUT);
        assert_eq!(
            f.outcomes.borrow().as_slice(),
            &[("a".to_string(), Outcome::TimedOut(TIMEOUT))]
        );
        // Backlog moves on after a timeout
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/b");

        // A late answer belongs to "b" now, never to "a" again
        f.send(json!({ "code": "iframe.done", "status": 200 }));
        assert_eq!(f.finished(), vec!["a", "b"]);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_done_before_deadline_cancels_watchdog() {
        let f = Fixture::new(true);
        f.channel.open(f.request("a"));
        f.scheduler.advance(TIMEOUT / 2);
        f.send(json!({ "code": "iframe.done", "status": 200 }));
        f.scheduler.advance(TIMEOUT);
        assert_eq!(f.outcomes.borrow().len(), 1);
        assert!(matches!(f.outcomes.borrow()[0].1, Outcome::Done(_)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let f = Fixture::new(true);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));

        f.channel.close();
        assert_eq!(f.finished(), vec!["a", "b"]);
        assert!(f.outcomes.borrow().iter().all(|(_, o)| *o == Outcome::Closed));
        assert_eq!(f.surface.unmount_count(), 1);
        assert_eq!(f.channel.state(), ChannelState::Idle);

        f.channel.close();
        assert_eq!(f.outcomes.borrow().len(), 2);
        assert_eq!(f.surface.unmount_count(), 1);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_close_on_idle_channel_is_noop() {
        let f = Fixture::new(true);
        f.channel.close();
        f.channel.close();
        assert_eq!(f.surface.unmount_count(), 0);
        assert_eq!(f.channel.state(), ChannelState::Idle);
    }

    #[test]
    fn test_mount_failure_is_reported() {
        let f = Fixture::new(true);
        f.surface.fail_mounts(true);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));

        let outcomes = f.outcomes.borrow();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].1, Outcome::Failed(_)));
        assert_eq!(f.channel.state(), ChannelState::Idle);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn test_open_from_callback_queues_behind_backlog() {
        let f = Fixture::new(true);
        let reopen = {
            let channel = f.channel.clone();
            let follow_up = f.request("follow-up");
            PendingRequest::new("a").on_finish(move |_| channel.open(follow_up))
        };
        f.channel.open(reopen);
        f.channel.open(f.request("b"));

        f.send(json!({ "code": "iframe.done", "status": 200 }));
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/b");
        f.send(json!({ "code": "iframe.done", "status": 200 }));
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/follow-up");
        f.send(json!({ "code": "iframe.done", "status": 200 }));
        assert_eq!(f.finished(), vec!["b", "follow-up"]);
    }

    #[test]
    fn test_stray_messages_without_active_frame() {
        let f = Fixture::new(true);
        f.send(json!({ "code": "iframe.loaded", "height": 1, "width": 1 }));
        f.send(json!({ "code": "iframe.done", "status": 200 }));
        f.send(json!({ "code": "iframe.close" }));
        assert_eq!(f.channel.state(), ChannelState::Idle);
        assert_eq!(f.surface.unmount_count(), 0);
    }

    #[test]
    fn test_reconfigure_keeps_mounted_frame_origin() {
        let f = Fixture::new(true);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));
        f.send(json!({ "code": "iframe.loaded", "height": 1, "width": 1 }));

        f.channel.reconfigure("https://other.example", TIMEOUT);
        assert!(f.channel.accepts(ORIGIN));
        assert!(!f.channel.accepts("https://other.example"));

        f.send(json!({ "code": "iframe.done", "status": 200 }));
        assert_eq!(f.finished(), vec!["a"]);

        // The next frame is mounted from the new origin
        assert_eq!(f.surface.mounted().unwrap().url, "https://other.example/b");
        assert!(!f.channel.accepts(ORIGIN));
        f.channel
            .handle_message("https://other.example", &json!({ "code": "iframe.close" }));
        assert_eq!(f.finished(), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_done_after_loaded_still_finishes() {
        let f = Fixture::new(true);
        f.channel.open(f.request("a"));
        f.channel.open(f.request("b"));
        f.send(json!({ "code": "iframe.loaded", "height": 1, "width": 1 }));
        f.send(json!({ "code": "iframe.done", "status": "200", "session": null }));

        let outcomes = f.outcomes.borrow();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0].1, Outcome::Done(p) if p.status == 0));
        assert_eq!(f.surface.mounted().unwrap().url, "http://localhost/b");
    }

    #[test]
    fn test_reconfigure_changes_accepted_origin() {
        let f = Fixture::new(true);
        f.channel.reconfigure("https://account.example.com/", TIMEOUT);
        assert!(f.channel.accepts("https://account.example.com"));
        assert!(!f.channel.accepts(ORIGIN));
    }
}
