//! # Session model
//!
//! [`Session`] is the proof of authentication handed back by the remote
//! account surface: an opaque `user` record plus an opaque `token`. It is
//! owned by the session controller and mirrored into the [`crate::LocalCache`]
//! as a JSON blob, so its serialised shape is part of the persisted format:
//!
//! ```json
//! {"user": <any JSON value>, "token": "<string>"}
//! ```
//!
//! Field order is stable (`user` then `token`), which keeps the cached blob
//! byte-identical across writes of the same session.

use serde::{Deserialize, Serialize};

/// Opaque user record as reported by the account surface.
pub type User = serde_json::Value;

/// An authenticated session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub token: String,
}

impl Session {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }

    /// A session counts only when both halves are present.
    pub fn is_complete(&self) -> bool {
        !self.user.is_null() && !self.token.is_empty()
    }

    /// Parse a session out of an arbitrary JSON value.
    ///
    /// Returns `None` when the value does not have the `{user, token}` shape
    /// or when either half is empty.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        let session: Session = serde_json::from_value(value.clone()).ok()?;
        session.is_complete().then_some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_user_and_token() {
        assert!(Session::from_value(&json!({ "user": "tester", "token": "t" })).is_some());
        assert!(Session::from_value(&json!({ "user": "tester" })).is_none());
        assert!(Session::from_value(&json!({ "token": "t" })).is_none());
        assert!(Session::from_value(&json!({ "user": null, "token": "t" })).is_none());
        assert!(Session::from_value(&json!({ "user": "tester", "token": "" })).is_none());
        assert!(Session::from_value(&json!("tester")).is_none());
    }

    #[test]
    fn test_serialised_shape() {
        let session = Session::new(json!({ "profile": { "fullName": "Tester" } }), "tok");
        let json = serde_json::to_string(&session).unwrap();
        assert_eq!(json, r#"{"user":{"profile":{"fullName":"Tester"}},"token":"tok"}"#);
    }
}
