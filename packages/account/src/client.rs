//! # Session controller
//!
//! [`AccountClient`] turns frame-channel outcomes into session transitions. It
//! owns the in-memory session mirror, the [`LocalCache`] it is persisted to,
//! the [`EventBus`] hosts subscribe to, and the [`FrameChannel`] every remote
//! flow runs through.
//!
//! ## Operations
//!
//! | Method | Surface | Emits | Resolves with |
//! |--------|---------|-------|---------------|
//! | [`sso`](AccountClient::sso) | invisible session probe | `authenticating`, then `authenticated` / `unauthenticated` | `Some(user)` / `None` |
//! | [`signin`](AccountClient::signin), [`signup`](AccountClient::signup) | visible form | `authenticating`, then `authenticated` | user |
//! | [`signout`](AccountClient::signout) | invisible form with token | `authenticating`, then `unauthenticated` | `()` |
//! | [`change_password`](AccountClient::change_password), [`query_account`](AccountClient::query_account) | visible form | — | payload, or `None` if dismissed |
//! | [`signin_locally`](AccountClient::signin_locally) | — (cache only) | `authenticated` / `unauthenticated` | `Some(user)` / `None` |
//! | [`signout_locally`](AccountClient::signout_locally) | — | `unauthenticated` | `()` |
//!
//! ## Outcomes
//!
//! Remote flows settle exactly once from the channel's outcome:
//!
//! - `done` is interpreted per flow; statuses a flow does not know become
//!   [`AuthError::ServerMisconfigured`].
//! - `close` is [`AuthError::Cancelled`] for the session flows and `Ok(None)`
//!   for the auxiliary forms.
//! - the watchdog becomes [`AuthError::Timeout`].
//!
//! ## Persistence
//!
//! On every transition the mirror is updated first, then the cache, then
//! subscribers are told. A cache failure does not roll the mirror back: the
//! event still fires and the operation rejects with [`AuthError::Storage`], so
//! a host without storage can keep running with an ephemeral session.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use store::{LocalCache, Session, SessionStore, User};
use tracing::{debug, error, warn};

use crate::channel::{FrameChannel, Outcome, PendingRequest};
use crate::config::{ClientConfig, ConfigPatch};
use crate::deferred::{self, Deferred};
use crate::error::AuthError;
use crate::events::{AuthEvent, EventBus, ListenerId, Topic};
use crate::protocol::{
    DonePayload, Flow, SessionField, APP_PARAM, FORM_PATH, NAME_PARAM, SSO_PATH, STATUS_NOT_FOUND,
    STATUS_OK, TOKEN_PARAM, UID_PARAM,
};
use crate::surface::{Scheduler, Surface};

/// What the client needs from its host.
pub struct Environment {
    pub surface: Box<dyn Surface>,
    pub scheduler: Rc<dyn Scheduler>,
    /// `None` when the host cannot persist anything.
    pub storage: Option<Box<dyn SessionStore>>,
}

struct Shared {
    config: RefCell<ClientConfig>,
    session: RefCell<Option<Session>>,
    cache: RefCell<LocalCache>,
    events: EventBus,
    channel: FrameChannel,
}

type Interpret<T> = fn(&Shared, Flow, DonePayload) -> Result<T, AuthError>;
type OnClose<T> = fn(Flow) -> Result<T, AuthError>;

/// Client handle. Clones share the same session and channel.
#[derive(Clone)]
pub struct AccountClient {
    shared: Rc<Shared>,
}

impl PartialEq for AccountClient {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }
}

impl std::fmt::Debug for AccountClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountClient")
            .field("config", &*self.shared.config.borrow())
            .field("authenticated", &self.is_authenticated())
            .field("channel", &self.shared.channel)
            .finish()
    }
}

impl AccountClient {
    /// Build a client. Fails if a required config field is missing.
    pub fn new(mut config: ClientConfig, env: Environment) -> Result<Self, AuthError> {
        config.normalize();
        config.validate()?;

        let cache = LocalCache::new(config.session_key.clone(), env.storage);
        if !cache.is_available() {
            warn!("session storage unavailable; sessions will not survive a reload");
        }
        let channel = FrameChannel::new(
            &config.baseurl,
            config.timeout(),
            env.surface,
            env.scheduler,
        );
        debug!(baseurl = %config.baseurl, app = %config.app_id, "account client created");

        Ok(Self {
            shared: Rc::new(Shared {
                config: RefCell::new(config),
                session: RefCell::new(None),
                cache: RefCell::new(cache),
                events: EventBus::new(),
                channel,
            }),
        })
    }

    // ---- configuration ----

    pub fn config(&self) -> ClientConfig {
        self.shared.config.borrow().clone()
    }

    pub fn app_id(&self) -> String {
        self.shared.config.borrow().app_id.clone()
    }

    /// Update the configuration. The channel and cache follow the new origin,
    /// deadline and key.
    pub fn set(&self, patch: ConfigPatch) -> Result<&Self, AuthError> {
        let mut config = self.config();
        config.apply(patch)?;
        self.shared
            .cache
            .borrow_mut()
            .set_key(config.session_key.clone());
        self.shared
            .channel
            .reconfigure(&config.baseurl, config.timeout());
        *self.shared.config.borrow_mut() = config;
        Ok(self)
    }

    // ---- session mirror ----

    pub fn session(&self) -> Option<Session> {
        self.shared.session.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.shared.session.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.shared.session.borrow().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.session.borrow().is_some()
    }

    /// The frame channel, for wiring inbound messages and readiness.
    pub fn channel(&self) -> &FrameChannel {
        &self.shared.channel
    }

    // ---- events ----

    pub fn on(&self, topic: Topic, handler: impl Fn(&AuthEvent) + 'static) -> ListenerId {
        self.shared.events.on(topic, handler)
    }

    /// Remove one listener, or all listeners of `topic` when `listener` is `None`.
    pub fn off(&self, topic: Topic, listener: Option<ListenerId>) -> &Self {
        self.shared.events.off(topic, listener);
        self
    }

    pub fn emit(&self, event: &AuthEvent) -> &Self {
        self.shared.events.emit(event);
        self
    }

    // ---- remote flows ----

    /// Probe the account surface for an existing session without showing it.
    pub fn sso(&self) -> Deferred<Option<User>> {
        self.emit(&AuthEvent::Authenticating);
        let request = PendingRequest::new(SSO_PATH).query(APP_PARAM, self.app_id());
        self.exchange(Flow::Sso, request, Shared::sso_outcome, cancelled)
    }

    pub fn signup(&self) -> Deferred<User> {
        self.emit(&AuthEvent::Authenticating);
        let request = self.form(Flow::Signup).visible(true);
        self.exchange(Flow::Signup, request, Shared::signin_outcome, cancelled)
    }

    pub fn signin(&self) -> Deferred<User> {
        self.emit(&AuthEvent::Authenticating);
        let request = self.form(Flow::Signin).visible(true);
        self.exchange(Flow::Signin, request, Shared::signin_outcome, cancelled)
    }

    pub fn signout(&self) -> Deferred<()> {
        self.emit(&AuthEvent::Authenticating);
        let mut request = self.form(Flow::Signout);
        if let Some(token) = self.token() {
            request = request.query(TOKEN_PARAM, token);
        }
        self.exchange(Flow::Signout, request, Shared::signout_outcome, cancelled)
    }

    /// Show the change-password form. Requires a current session.
    pub fn change_password(&self) -> Deferred<Option<DonePayload>> {
        let Some(token) = self.token() else {
            return Deferred::rejected(AuthError::NotSignedIn(Flow::ChangePassword));
        };
        let request = self
            .form(Flow::ChangePassword)
            .query(TOKEN_PARAM, token)
            .visible(true);
        self.exchange(Flow::ChangePassword, request, Shared::form_outcome, dismissed)
    }

    /// Show the account card for `uid`.
    pub fn query_account(&self, uid: &str) -> Deferred<Option<DonePayload>> {
        let request = self
            .form(Flow::QueryAccount)
            .query(UID_PARAM, uid)
            .visible(true);
        self.exchange(Flow::QueryAccount, request, Shared::form_outcome, dismissed)
    }

    /// Dismiss the surface. Pending flows settle as if the user closed it.
    pub fn close(&self) {
        self.shared.channel.close();
    }

    // ---- local flows ----

    /// Restore the session from the cache without a round trip.
    pub fn signin_locally(&self) -> Result<Option<User>, AuthError> {
        let cached = self.shared.cache.borrow().read()?;
        match cached {
            Some(session) => {
                let user = session.user.clone();
                *self.shared.session.borrow_mut() = Some(session);
                self.emit(&AuthEvent::Authenticated(user.clone()));
                Ok(Some(user))
            }
            None => {
                *self.shared.session.borrow_mut() = None;
                self.emit(&AuthEvent::Unauthenticated);
                Ok(None)
            }
        }
    }

    /// Forget the session locally. The mirror is always cleared and
    /// `unauthenticated` always fires; a failure to clear storage is returned.
    pub fn signout_locally(&self) -> Result<(), AuthError> {
        self.shared.unauthenticate()
    }

    fn form(&self, flow: Flow) -> PendingRequest {
        let mut request = PendingRequest::new(FORM_PATH);
        if let Some(name) = flow.form_name() {
            request = request.query(NAME_PARAM, name);
        }
        request.query(APP_PARAM, self.app_id())
    }

    fn exchange<T: 'static>(
        &self,
        flow: Flow,
        request: PendingRequest,
        interpret: Interpret<T>,
        on_close: OnClose<T>,
    ) -> Deferred<T> {
        let (resolver, deferred) = deferred::pair();
        let shared: Weak<Shared> = Rc::downgrade(&self.shared);
        let request = request.on_finish(move |outcome| {
            // Client gone: dropping the resolver reports `Dropped`.
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let result = match outcome {
                Outcome::Done(payload) => interpret(&shared, flow, payload),
                Outcome::Closed => on_close(flow),
                Outcome::TimedOut(after) => Err(AuthError::Timeout(after)),
                Outcome::Failed(reason) => Err(AuthError::Surface(reason)),
            };
            match &result {
                Ok(_) => debug!(%flow, "flow completed"),
                Err(err) if err.is_cancelled() => debug!(%flow, "flow cancelled"),
                Err(err @ AuthError::ServerMisconfigured { .. }) => error!(%flow, %err),
                Err(err) => warn!(%flow, %err, "flow failed"),
            }
            resolver.settle(result);
        });
        self.shared.channel.open(request);
        deferred
    }
}

fn cancelled<T>(flow: Flow) -> Result<T, AuthError> {
    Err(AuthError::Cancelled(flow))
}

fn dismissed<T>(_: Flow) -> Result<Option<T>, AuthError> {
    Ok(None)
}

fn misconfigured(flow: Flow, payload: &DonePayload) -> AuthError {
    AuthError::ServerMisconfigured {
        flow,
        status: payload.status,
    }
}

impl Shared {
    fn sso_outcome(&self, flow: Flow, payload: DonePayload) -> Result<Option<User>, AuthError> {
        match payload.status {
            STATUS_OK => match payload.session() {
                SessionField::Present(session) => self.authenticate(session).map(Some),
                SessionField::Absent => self.unauthenticate().map(|()| None),
                SessionField::Malformed => Err(misconfigured(flow, &payload)),
            },
            STATUS_NOT_FOUND => self.unauthenticate().map(|()| None),
            _ => Err(misconfigured(flow, &payload)),
        }
    }

    fn signin_outcome(&self, flow: Flow, payload: DonePayload) -> Result<User, AuthError> {
        match (payload.status, payload.session()) {
            (STATUS_OK, SessionField::Present(session)) => self.authenticate(session),
            _ => Err(misconfigured(flow, &payload)),
        }
    }

    fn signout_outcome(&self, flow: Flow, payload: DonePayload) -> Result<(), AuthError> {
        if payload.status == STATUS_OK {
            self.unauthenticate()
        } else {
            Err(AuthError::Rejected { flow, payload })
        }
    }

    fn form_outcome(
        &self,
        _flow: Flow,
        payload: DonePayload,
    ) -> Result<Option<DonePayload>, AuthError> {
        Ok(Some(payload))
    }

    fn authenticate(&self, session: Session) -> Result<User, AuthError> {
        let user = session.user.clone();
        let persisted = self.cache.borrow().write(&session);
        *self.session.borrow_mut() = Some(session);
        self.events.emit(&AuthEvent::Authenticated(user.clone()));
        persisted?;
        Ok(user)
    }

    fn unauthenticate(&self) -> Result<(), AuthError> {
        *self.session.borrow_mut() = None;
        let cleared = self.cache.borrow().clear();
        self.events.emit(&AuthEvent::Unauthenticated);
        cleared?;
        Ok(())
    }
}
