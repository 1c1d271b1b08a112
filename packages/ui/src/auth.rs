//! Account context and hooks for the UI.

use account::{AccountClient, AuthError, AuthEvent, ListenerId, Topic, User};
use dioxus::prelude::*;

/// What the UI knows about the account session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccountState {
    pub user: Option<User>,
    /// A flow is in progress.
    pub authenticating: bool,
    /// Last failure worth showing. Cancellations are not recorded.
    pub last_error: Option<String>,
}

impl AccountState {
    fn apply(&mut self, event: &AuthEvent) {
        match event {
            AuthEvent::Authenticating => {
                self.authenticating = true;
                self.last_error = None;
            }
            AuthEvent::Authenticated(user) => {
                self.user = Some(user.clone());
                self.authenticating = false;
            }
            AuthEvent::Unauthenticated => {
                self.user = None;
                self.authenticating = false;
            }
        }
    }

    fn fail(&mut self, err: &AuthError) {
        self.authenticating = false;
        if !err.is_cancelled() {
            self.last_error = Some(err.to_string());
        }
    }
}

/// Get the current account state.
/// Returns a signal that updates on every session transition.
pub fn use_account() -> Signal<AccountState> {
    use_context::<Signal<AccountState>>()
}

/// The client provided by the nearest [`AccountProvider`].
pub fn use_account_client() -> AccountClient {
    use_context::<AccountClient>()
}

/// Build a client for the current page and keep its window listeners alive
/// for the lifetime of the calling component.
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub fn use_browser_account(config: account::ClientConfig) -> Result<AccountClient, String> {
    let bound = use_hook(move || {
        account::web::browser_client(config)
            .map(std::rc::Rc::new)
            .map_err(|e| e.to_string())
    });
    bound.map(|bound| bound.0.clone())
}

/// Provider component that mirrors the client's session into a signal.
/// Wrap your app with this component; it probes for an existing session on mount.
#[component]
pub fn AccountProvider(client: AccountClient, children: Element) -> Element {
    let mut state = use_signal(AccountState::default);

    let listeners: Vec<(Topic, ListenerId)> = use_hook(|| {
        [Topic::Authenticating, Topic::Authenticated, Topic::Unauthenticated]
            .into_iter()
            .map(|topic| {
                let id = client.on(topic, move |event| {
                    let mut state = state;
                    state.write().apply(event);
                });
                (topic, id)
            })
            .collect()
    });

    {
        let client = client.clone();
        use_drop(move || {
            for (topic, id) in listeners {
                client.off(topic, Some(id));
            }
        });
    }

    // Probe for an existing session on mount
    let probe = client.clone();
    let _ = use_resource(move || {
        let client = probe.clone();
        async move {
            match client.sso().await {
                Ok(_) => {}
                Err(err) => {
                    if !err.is_cancelled() {
                        tracing::warn!("Session probe failed: {}", err);
                    }
                    state.write().fail(&err);
                }
            }
        }
    });

    use_context_provider(|| client.clone());
    use_context_provider(|| state);

    rsx! {
        {children}
    }
}

/// Which form a [`FlowButton`] opens.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Form {
    Signin,
    Signup,
    Signout,
}

#[component]
fn FlowButton(form: Form, label: String, class: String) -> Element {
    let client = use_account_client();
    let mut state = use_account();

    let onclick = move |_| {
        let client = client.clone();
        async move {
            let result = match form {
                Form::Signin => client.signin().await.map(|_| ()),
                Form::Signup => client.signup().await.map(|_| ()),
                Form::Signout => client.signout().await,
            };
            if let Err(err) = result {
                if !err.is_cancelled() {
                    tracing::error!("Account flow failed: {}", err);
                }
                state.write().fail(&err);
            }
        }
    };

    rsx! {
        button {
            class: "{class}",
            disabled: state().authenticating,
            onclick: onclick,
            "{label}"
        }
    }
}

/// Button that opens the sign-in form.
#[component]
pub fn SigninButton(
    #[props(default = "Sign in".to_string())] label: String,
    #[props(default = "".to_string())] class: String,
) -> Element {
    rsx! { FlowButton { form: Form::Signin, label, class } }
}

/// Button that opens the sign-up form.
#[component]
pub fn SignupButton(
    #[props(default = "Sign up".to_string())] label: String,
    #[props(default = "".to_string())] class: String,
) -> Element {
    rsx! { FlowButton { form: Form::Signup, label, class } }
}

/// Button to sign the current user out everywhere.
#[component]
pub fn SignoutButton(
    #[props(default = "Sign out".to_string())] label: String,
    #[props(default = "".to_string())] class: String,
) -> Element {
    rsx! { FlowButton { form: Form::Signout, label, class } }
}
