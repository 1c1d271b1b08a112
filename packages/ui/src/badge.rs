//! Account status badge for headers and toolbars.

use account::User;
use dioxus::prelude::*;

use crate::auth::use_account;
use crate::Icon;
use crate::icons::{FaCircleNotch, FaUser, FaUserSlash};

/// Best human-readable name for a user record.
///
/// Prefers `profile.fullName`, then `email`, then a plain string user.
pub fn display_name(user: &User) -> Option<String> {
    if let Some(name) = user.pointer("/profile/fullName").and_then(|v| v.as_str()) {
        return Some(name.to_string());
    }
    if let Some(email) = user.get("email").and_then(|v| v.as_str()) {
        return Some(email.to_string());
    }
    user.as_str().map(str::to_string)
}

/// A small icon plus name that shows the current session.
///
/// - **Authenticating**: spinner
/// - **Signed in**: user icon and display name
/// - **Signed out**: slashed-user icon
#[component]
pub fn AccountBadge() -> Element {
    let account = use_account();
    let state = account();

    if state.authenticating {
        return rsx! {
            span {
                class: "account-badge account-badge--pending",
                title: "Checking session",
                Icon { icon: FaCircleNotch, width: 14, height: 14 }
            }
        };
    }

    match &state.user {
        Some(user) => {
            let name = display_name(user).unwrap_or_else(|| "Signed in".to_string());
            rsx! {
                span {
                    class: "account-badge account-badge--signed-in",
                    title: "{name}",
                    Icon { icon: FaUser, width: 14, height: 14 }
                    span { class: "account-badge__name", "{name}" }
                }
            }
        }
        None => rsx! {
            span {
                class: "account-badge account-badge--anonymous",
                title: "Not signed in",
                Icon { icon: FaUserSlash, width: 14, height: 14 }
            }
        },
    }
}
