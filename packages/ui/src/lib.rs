//! This crate contains the shared account UI for hosts built with Dioxus.

pub use dioxus_free_icons::Icon;
pub mod icons {
    pub use dioxus_free_icons::icons::fa_solid_icons::*;
}

mod auth;
pub use auth::{
    use_account, use_account_client, AccountProvider, AccountState, SigninButton, SignoutButton,
    SignupButton,
};
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use auth::use_browser_account;

mod badge;
pub use badge::{display_name, AccountBadge};
