//! # Wire protocol with the account surface
//!
//! The host talks to the surface in two directions:
//!
//! - **host → surface** by navigation: the frame is pointed at
//!   `<baseurl>/<path>?<query>`, built by [`build_url`].
//! - **surface → host** by structured messages keyed by `code`:
//!
//! | `code` | Payload | Parsed as |
//! |--------|---------|-----------|
//! | `iframe.loaded` | `{height, width}` | [`Message::Loaded`] |
//! | `iframe.close` | `{}` | [`Message::Close`] |
//! | `iframe.done` | `{status, session?, ...}` | [`Message::Done`] with a [`DonePayload`] |
//!
//! Anything else (other codes, non-objects) is not part of the protocol and is
//! ignored by the channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use store::Session;

/// Session probe, opened invisibly by `sso`.
pub const SSO_PATH: &str = "/session";
/// Parameterised form path; the form is chosen by [`NAME_PARAM`].
pub const FORM_PATH: &str = "/form";

pub const NAME_PARAM: &str = "name";
pub const APP_PARAM: &str = "app";
pub const TOKEN_PARAM: &str = "t";
pub const UID_PARAM: &str = "u";

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_FOUND: u16 = 404;
/// Stand-in for a missing or non-numeric status. No flow accepts it.
pub const STATUS_UNRECOGNIZED: u16 = 0;

/// The account flows the client can start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flow {
    Sso,
    Signup,
    Signin,
    Signout,
    ChangePassword,
    QueryAccount,
}

impl Flow {
    /// Value of the `name` query parameter for form flows.
    pub fn form_name(self) -> Option<&'static str> {
        match self {
            Flow::Sso => None,
            Flow::Signup => Some("signup"),
            Flow::Signin => Some("signin"),
            Flow::Signout => Some("signout"),
            Flow::ChangePassword => Some("changepassword"),
            Flow::QueryAccount => Some("query"),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flow::Sso => "sso",
            Flow::Signup => "signup",
            Flow::Signin => "signin",
            Flow::Signout => "signout",
            Flow::ChangePassword => "change password",
            Flow::QueryAccount => "account query",
        };
        f.write_str(name)
    }
}

/// A message posted by the surface.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Loaded { height: f64, width: f64 },
    Close {},
    Done(DonePayload),
}

impl Message {
    /// Parse an inbound message. `None` for anything outside the protocol.
    ///
    /// Only `code` decides whether a message belongs to the protocol. The rest
    /// is read leniently so a terminal message is never lost to a bad field.
    pub fn from_value(data: &Value) -> Option<Self> {
        let fields = data.as_object()?;
        match fields.get("code")?.as_str()? {
            "iframe.loaded" => Some(Message::Loaded {
                height: number(fields, "height"),
                width: number(fields, "width"),
            }),
            "iframe.close" => Some(Message::Close {}),
            "iframe.done" => Some(Message::Done(DonePayload::from_fields(fields))),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Message::Loaded { .. } => "iframe.loaded",
            Message::Close {} => "iframe.close",
            Message::Done(_) => "iframe.done",
        }
    }
}

fn number(fields: &Map<String, Value>, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or_default()
}

/// Terminal outcome of a flow as reported by the surface.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DonePayload {
    /// [`STATUS_UNRECOGNIZED`] when the surface sent no usable status.
    #[serde(default)]
    pub status: u16,
    /// `None` for both an absent and an explicitly `null` session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<Value>,
    /// Everything else the surface sent along, including a `status` that was
    /// not a valid code.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// How the `session` field of a [`DonePayload`] reads.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionField {
    Absent,
    Present(Session),
    Malformed,
}

impl DonePayload {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let mut extra = fields.clone();
        extra.remove("code");
        let status = match extra.remove("status") {
            Some(raw) => match raw.as_u64().and_then(|n| u16::try_from(n).ok()) {
                Some(status) => status,
                None => {
                    extra.insert("status".to_string(), raw);
                    STATUS_UNRECOGNIZED
                }
            },
            None => STATUS_UNRECOGNIZED,
        };
        let session = extra.remove("session").filter(|v| !v.is_null());
        Self {
            status,
            session,
            extra,
        }
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> SessionField {
        match &self.session {
            None => SessionField::Absent,
            Some(value) => match Session::from_value(value) {
                Some(session) => SessionField::Present(session),
                None => SessionField::Malformed,
            },
        }
    }
}

/// Build `<origin>/<path>?k=v&...`, trimming stray slashes from `path` and
/// percent-encoding the query.
pub fn build_url(origin: &str, path: &str, query: &[(String, String)]) -> String {
    let mut path = path.trim_matches('/').to_string();
    while path.contains("//") {
        path = path.replace("//", "/");
    }
    let mut url = format!("{origin}/{path}");
    for (i, (key, value)) in query.iter().enumerate() {
        url.push(if i == 0 { '?' } else { '&' });
        url.push_str(&urlencoding::encode(key));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_loaded() {
        let message = Message::from_value(&json!({ "code": "iframe.loaded", "height": 420, "width": 380.5 }));
        assert_eq!(
            message,
            Some(Message::Loaded {
                height: 420.0,
                width: 380.5
            })
        );
    }

    #[test]
    fn test_parse_close_ignores_extra_fields() {
        let message = Message::from_value(&json!({ "code": "iframe.close", "reason": "x" }));
        assert_eq!(message, Some(Message::Close {}));
    }

    #[test]
    fn test_parse_done_keeps_extra_fields() {
        let message = Message::from_value(&json!({
            "code": "iframe.done",
            "status": 401,
            "error": "bad password"
        }))
        .unwrap();
        let Message::Done(payload) = message else {
            panic!("expected done");
        };
        assert_eq!(payload.status, 401);
        assert_eq!(payload.session, None);
        assert_eq!(payload.extra.get("error"), Some(&json!("bad password")));
        assert!(!payload.extra.contains_key("code"));
    }

    #[test]
    fn test_done_with_unusable_status_is_kept() {
        for status in [json!("200"), Value::Null, json!(-1), json!(70000), json!(200.5)] {
            let message = Message::from_value(&json!({
                "code": "iframe.done",
                "status": status.clone(),
                "session": null
            }));
            let Some(Message::Done(payload)) = message else {
                panic!("done with status {status} was dropped");
            };
            assert_eq!(payload.status, STATUS_UNRECOGNIZED);
            assert_eq!(payload.session, None);
            if !status.is_null() {
                assert_eq!(payload.extra.get("status"), Some(&status));
            }
        }

        let Some(Message::Done(payload)) = Message::from_value(&json!({ "code": "iframe.done" }))
        else {
            panic!("expected done");
        };
        assert_eq!(payload.status, STATUS_UNRECOGNIZED);
    }

    #[test]
    fn test_loaded_with_bad_dimensions() {
        let message = Message::from_value(&json!({ "code": "iframe.loaded", "height": "tall" }));
        assert_eq!(
            message,
            Some(Message::Loaded {
                height: 0.0,
                width: 0.0
            })
        );
    }

    #[test]
    fn test_non_protocol_messages() {
        assert_eq!(Message::from_value(&json!({ "code": "other" })), None);
        assert_eq!(Message::from_value(&json!({ "status": 200 })), None);
        assert_eq!(Message::from_value(&json!("iframe.done")), None);
        assert_eq!(Message::from_value(&json!({ "code": 7 })), None);
    }

    #[test]
    fn test_session_field() {
        let payload = |session: Value| {
            let Some(Message::Done(p)) = Message::from_value(&json!({
                "code": "iframe.done",
                "status": 200,
                "session": session
            })) else {
                panic!("expected done");
            };
            p
        };
        assert_eq!(payload(Value::Null).session(), SessionField::Absent);
        assert_eq!(DonePayload::new(200).session(), SessionField::Absent);
        assert_eq!(
            payload(json!({ "user": "tester", "token": "t" })).session(),
            SessionField::Present(Session::new(json!("tester"), "t"))
        );
        assert_eq!(payload(json!({ "user": "tester" })).session(), SessionField::Malformed);
    }

    #[test]
    fn test_build_url() {
        let query = vec![
            ("name".to_string(), "signin".to_string()),
            ("app".to_string(), "dev".to_string()),
        ];
        assert_eq!(
            build_url("http://localhost:3100", "/form/", &query),
            "http://localhost:3100/form?name=signin&app=dev"
        );
        assert_eq!(
            build_url("http://localhost:3100", "//a//b/", &[]),
            "http://localhost:3100/a/b"
        );
        let query = vec![("t".to_string(), "a b&c".to_string())];
        assert_eq!(build_url("https://a.com", "x", &query), "https://a.com/x?t=a%20b%26c");
    }
}
