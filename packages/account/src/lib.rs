//! # Account client
//!
//! Client-side half of a hosted account service. The account UI (sign-in and
//! sign-up forms, the session probe, password changes) lives on the account
//! server and is shown in an embedded frame; this crate drives that frame and
//! keeps the host's view of the session in sync with it.
//!
//! ## Modules
//!
//! | Module | Feature gate | Purpose |
//! |--------|-------------|---------|
//! | [`config`] | — | [`ClientConfig`] and partial updates, TOML loading |
//! | [`protocol`] | — | Paths, query parameters and the messages the frame posts back |
//! | [`surface`] | — | [`Surface`] and [`Scheduler`] seams to the host environment |
//! | [`channel`] | — | [`FrameChannel`]: one frame at a time, FIFO backlog, watchdog |
//! | [`client`] | — | [`AccountClient`]: session flows, mirror, cache, events |
//! | [`events`] | — | Topic-keyed listeners for `authenticating` / `authenticated` / `unauthenticated` |
//! | [`deferred`] | — | Single-settlement results returned by every remote flow |
//! | [`testing`] | — | Manual clock and recording surface for tests and headless hosts |
//! | [`web`] | `web` (wasm32) | Iframe overlay, `setTimeout` scheduler, window listeners |
//!
//! ## Typical use
//!
//! ```ignore
//! let (client, _bindings) = account::web::browser_client(config)?;
//! client.on(Topic::Authenticated, |event| { /* update the UI */ });
//! match client.sso().await {
//!     Ok(Some(user)) => { /* signed in elsewhere */ }
//!     Ok(None) => { /* show the sign-in button */ }
//!     Err(err) => tracing::warn!(%err),
//! }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod deferred;
pub mod error;
pub mod events;
pub mod protocol;
pub mod surface;
pub mod testing;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub mod web;

pub use channel::{ChannelState, FrameChannel, Outcome, PendingRequest};
pub use client::{AccountClient, Environment};
pub use config::{ClientConfig, ConfigPatch, DEFAULT_TIMEOUT_MS};
pub use deferred::Deferred;
pub use error::{AuthError, ConfigError};
pub use events::{AuthEvent, ListenerId, Topic};
pub use protocol::{DonePayload, Flow};
pub use store::{Session, User};
pub use surface::{Scheduler, Surface, SurfaceError, TimerId};
