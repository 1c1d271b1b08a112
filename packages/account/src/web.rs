//! # Browser bindings
//!
//! Glue between [`AccountClient`] and a real document, compiled only for
//! `wasm32` with the `web` feature:
//!
//! - [`IframeSurface`] renders frames as a fixed overlay appended to `<body>`.
//! - [`TimeoutScheduler`] runs watchdogs on `setTimeout` via `gloo-timers`.
//! - [`Bindings`] forwards `message` events to the channel and reports
//!   `DOMContentLoaded`. Dropping it removes both listeners.
//!
//! [`browser_client`] wires all of the above together with
//! `window.localStorage` as session storage.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use gloo_timers::callback::Timeout;
use serde_json::Value;
use store::{LocalStorageStore, SessionStore};
use tracing::{debug, trace, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, HtmlElement, HtmlIFrameElement, MessageEvent, Window};

use crate::channel::FrameChannel;
use crate::client::{AccountClient, Environment};
use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::surface::{timer_millis, Scheduler, Surface, SurfaceError, TimerId};

fn js_error(err: JsValue) -> SurfaceError {
    SurfaceError(format!("{err:?}"))
}

fn set_styles(element: &HtmlElement, styles: &[(&str, &str)]) -> Result<(), SurfaceError> {
    let style = element.style();
    for (name, value) in styles {
        style.set_property(name, value).map_err(js_error)?;
    }
    Ok(())
}

/// Overlay frame living directly under `<body>`.
pub struct IframeSurface {
    document: Document,
    wrapper: Option<HtmlElement>,
    frame: Option<HtmlIFrameElement>,
}

impl IframeSurface {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            wrapper: None,
            frame: None,
        }
    }

    fn create(&self, url: &str, visible: bool) -> Result<(HtmlElement, HtmlIFrameElement), SurfaceError> {
        let body = self
            .document
            .body()
            .ok_or_else(|| SurfaceError("document has no body".into()))?;

        let frame: HtmlIFrameElement = self
            .document
            .create_element("iframe")
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| SurfaceError("created element is not an iframe".into()))?;
        frame.set_src(url);
        set_styles(
            &frame,
            &[
                ("display", if visible { "block" } else { "none" }),
                ("border", "none"),
                ("margin", "45px auto"),
                ("width", "0"),
                ("height", "0"),
            ],
        )?;

        let wrapper: HtmlElement = self
            .document
            .create_element("div")
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| SurfaceError("created element is not an HTML element".into()))?;
        set_styles(
            &wrapper,
            &[
                ("position", "fixed"),
                ("top", "0"),
                ("left", "0"),
                ("width", "100%"),
                ("height", "100%"),
                ("z-index", "1"),
                ("overflow-y", "scroll"),
                ("-webkit-overflow-scrolling", "touch"),
            ],
        )?;
        if visible {
            set_styles(&wrapper, &[("background-color", "rgba(0,0,0,0.5)")])?;
        } else {
            set_styles(&wrapper, &[("pointer-events", "none")])?;
        }

        wrapper.append_child(&frame).map_err(js_error)?;
        body.append_child(&wrapper).map_err(js_error)?;
        Ok((wrapper, frame))
    }
}

impl Surface for IframeSurface {
    fn is_ready(&self) -> bool {
        self.document.ready_state() != "loading" && self.document.body().is_some()
    }

    fn mount(&mut self, url: &str, visible: bool) -> Result<(), SurfaceError> {
        self.unmount();
        let (wrapper, frame) = self.create(url, visible)?;
        self.wrapper = Some(wrapper);
        self.frame = Some(frame);
        Ok(())
    }

    fn resize(&mut self, width: f64, height: f64) {
        let Some(frame) = &self.frame else {
            return;
        };
        let height = format!("{height}px");
        let max_width = format!("{width}px");
        if let Err(err) = set_styles(
            frame,
            &[
                ("height", height.as_str()),
                ("width", "95%"),
                ("max-width", max_width.as_str()),
            ],
        ) {
            warn!(%err, "could not resize frame");
        }
    }

    fn unmount(&mut self) {
        self.frame = None;
        if let Some(wrapper) = self.wrapper.take() {
            wrapper.remove();
        }
    }
}

/// [`Scheduler`] backed by `setTimeout`. Dropping a pending timer cancels it.
#[derive(Default)]
pub struct TimeoutScheduler {
    next_id: Cell<u64>,
    timers: Rc<RefCell<HashMap<u64, Timeout>>>,
}

impl Scheduler for TimeoutScheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let millis = timer_millis(delay);
        let timers = Rc::downgrade(&self.timers);
        let timeout = Timeout::new(millis, move || {
            if let Some(timers) = timers.upgrade() {
                timers.borrow_mut().remove(&id);
            }
            callback();
        });
        self.timers.borrow_mut().insert(id, timeout);
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        // Dropping the handle clears the browser timer.
        let removed = self.timers.borrow_mut().remove(&id.0);
        drop(removed);
    }
}

/// Window and document listeners feeding a [`FrameChannel`].
pub struct Bindings {
    window: Window,
    document: Document,
    on_message: Closure<dyn Fn(MessageEvent)>,
    on_ready: Option<Closure<dyn Fn()>>,
}

impl Bindings {
    pub fn attach(window: Window, channel: FrameChannel) -> Result<Self, AuthError> {
        let document = window
            .document()
            .ok_or_else(|| AuthError::Surface("window has no document".into()))?;

        let on_message = {
            let channel = channel.clone();
            Closure::<dyn Fn(MessageEvent)>::new(move |event: MessageEvent| {
                let origin = event.origin();
                if !channel.accepts(&origin) {
                    trace!(%origin, "ignoring message from foreign origin");
                    return;
                }
                match serde_wasm_bindgen::from_value::<Value>(event.data()) {
                    Ok(data) => channel.handle_message(&origin, &data),
                    Err(err) => trace!(%err, "ignoring undecodable message"),
                }
            })
        };
        window
            .add_event_listener_with_callback("message", on_message.as_ref().unchecked_ref())
            .map_err(|e| AuthError::Surface(js_error(e).0))?;

        let on_ready = if document.ready_state() == "loading" {
            let channel = channel.clone();
            let closure = Closure::<dyn Fn()>::new(move || channel.document_ready());
            document
                .add_event_listener_with_callback(
                    "DOMContentLoaded",
                    closure.as_ref().unchecked_ref(),
                )
                .map_err(|e| AuthError::Surface(js_error(e).0))?;
            Some(closure)
        } else {
            channel.document_ready();
            None
        };

        Ok(Self {
            window,
            document,
            on_message,
            on_ready,
        })
    }
}

impl Drop for Bindings {
    fn drop(&mut self) {
        let _ = self.window.remove_event_listener_with_callback(
            "message",
            self.on_message.as_ref().unchecked_ref(),
        );
        if let Some(on_ready) = &self.on_ready {
            let _ = self.document.remove_event_listener_with_callback(
                "DOMContentLoaded",
                on_ready.as_ref().unchecked_ref(),
            );
        }
        debug!("browser bindings detached");
    }
}

/// Build a client for the current page. Keep the returned [`Bindings`] alive
/// as long as the client is in use.
pub fn browser_client(config: ClientConfig) -> Result<(AccountClient, Bindings), AuthError> {
    let window =
        web_sys::window().ok_or_else(|| AuthError::Surface("no window available".into()))?;
    let document = window
        .document()
        .ok_or_else(|| AuthError::Surface("window has no document".into()))?;

    let storage = match LocalStorageStore::open() {
        Ok(store) => Some(Box::new(store) as Box<dyn SessionStore>),
        Err(err) => {
            warn!(%err, "localStorage unavailable");
            None
        }
    };
    let client = AccountClient::new(
        config,
        Environment {
            surface: Box::new(IframeSurface::new(document)),
            scheduler: Rc::new(TimeoutScheduler::default()),
            storage,
        },
    )?;
    let bindings = Bindings::attach(window, client.channel().clone())?;
    Ok((client, bindings))
}
