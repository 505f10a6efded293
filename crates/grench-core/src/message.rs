//! Protocol records exchanged with the evaluation server.

use std::collections::BTreeMap;

use serde::Serialize;

/// A single protocol value.
///
/// Byte strings are carried as text; the server speaks UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl Value {
    /// Borrow the value as text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the value as a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// A protocol record: a dictionary of named fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Message(BTreeMap<String, Value>);

impl Message {
    /// Create an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a text field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Iterate over fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Render as compact JSON for diagnostics.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unprintable message: {e}>"))
    }
}

impl From<BTreeMap<String, Value>> for Message {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self(fields)
    }
}

impl From<Message> for BTreeMap<String, Value> {
    fn from(message: Message) -> Self {
        message.0
    }
}

/// An operation request.
///
/// `op` and `id` are always present; everything else is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    op: String,
    id: String,
    fields: Message,
}

impl Request {
    /// Create a request for an arbitrary operation.
    #[must_use]
    pub fn new(op: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            id: id.into(),
            fields: Message::new(),
        }
    }

    /// `clone` handshake establishing a new session.
    #[must_use]
    pub fn clone_session(id: impl Into<String>) -> Self {
        Self::new("clone", id)
    }

    /// Evaluate `code`.
    #[must_use]
    pub fn eval(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new("eval", id).field("code", code.into())
    }

    /// Deliver text to the evaluation's standard input.
    #[must_use]
    pub fn stdin(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new("stdin", id).field("stdin", text.into())
    }

    /// Ask the server to interrupt the evaluation tagged `interrupt_id`.
    #[must_use]
    pub fn interrupt(id: impl Into<String>, interrupt_id: impl Into<String>) -> Self {
        Self::new("interrupt", id).field("interrupt-id", interrupt_id.into())
    }

    /// Attach the session id.
    #[must_use]
    pub fn session(self, session: impl Into<String>) -> Self {
        self.field("session", session.into())
    }

    /// Attach an extra field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key, value);
        self
    }

    #[must_use]
    pub fn op(&self) -> &str {
        &self.op
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up a field other than `op`/`id`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get_str(key)
    }

    /// Flatten into a wire message.
    #[must_use]
    pub fn into_message(self) -> Message {
        let mut message = self.fields;
        message.insert("op", self.op);
        message.insert("id", self.id);
        message
    }
}

/// Classification of a `status` reply by its first code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusKind {
    Done,
    EvalError,
    NeedInput,
    Interrupted,
    Unknown(String),
}

impl StatusKind {
    fn from_code(code: &str) -> Self {
        match code {
            "done" => Self::Done,
            "eval-error" => Self::EvalError,
            "need-input" => Self::NeedInput,
            "interrupted" => Self::Interrupted,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A reply from the server, classified once at the channel boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Carries a non-empty `status` list.
    Status {
        id: Option<String>,
        kind: StatusKind,
        codes: Vec<String>,
    },
    /// Answer to `clone`.
    NewSession { id: Option<String>, session: String },
    /// An evaluation result.
    Value {
        id: Option<String>,
        value: String,
        ns: Option<String>,
    },
    /// Incremental stdout/stderr text.
    Output {
        id: Option<String>,
        out: Option<String>,
        err: Option<String>,
    },
    /// Anything else; kept whole for diagnostics.
    Unrecognized(Message),
}

impl Response {
    /// Classify a raw message.
    #[must_use]
    pub fn from_message(message: Message) -> Self {
        let id = message.get_str("id").map(str::to_string);

        let codes: Vec<String> = message
            .get("status")
            .and_then(Value::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        // A clone reply carries its `done` status alongside the new session.
        if let Some(session) = message.get_str("new-session") {
            return Self::NewSession {
                id,
                session: session.to_string(),
            };
        }

        if let Some(first) = codes.first() {
            return Self::Status {
                id,
                kind: StatusKind::from_code(first),
                codes,
            };
        }

        if let Some(value) = message.get_str("value") {
            return Self::Value {
                id,
                value: value.to_string(),
                ns: message.get_str("ns").map(str::to_string),
            };
        }

        let out = message.get_str("out").map(str::to_string);
        let err = message.get_str("err").map(str::to_string);
        if out.is_some() || err.is_some() {
            return Self::Output { id, out, err };
        }

        Self::Unrecognized(message)
    }

    /// The request id this reply answers, if any.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Status { id, .. }
            | Self::NewSession { id, .. }
            | Self::Value { id, .. }
            | Self::Output { id, .. } => id.as_deref(),
            Self::Unrecognized(message) => message.get_str("id"),
        }
    }
}

impl From<Message> for Response {
    fn from(message: Message) -> Self {
        Self::from_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(codes: &[&str]) -> Value {
        Value::List(codes.iter().map(|c| Value::from(*c)).collect())
    }

    #[test]
    fn test_request_flattens_op_and_id() {
        let message = Request::eval("main", "(+ 1 2)")
            .session("abc")
            .field("ns", "user")
            .into_message();

        assert_eq!(message.get_str("op"), Some("eval"));
        assert_eq!(message.get_str("id"), Some("main"));
        assert_eq!(message.get_str("code"), Some("(+ 1 2)"));
        assert_eq!(message.get_str("session"), Some("abc"));
        assert_eq!(message.get_str("ns"), Some("user"));
    }

    #[test]
    fn test_status_takes_precedence_over_value() {
        let message = Message::new()
            .with("id", "main")
            .with("value", "3")
            .with("status", status(&["done"]));

        match Response::from_message(message) {
            Response::Status { id, kind, .. } => {
                assert_eq!(id.as_deref(), Some("main"));
                assert_eq!(kind, StatusKind::Done);
            }
            other => panic!("Wrong response type: {other:?}"),
        }
    }

    #[test]
    fn test_clone_reply_with_status_is_new_session() {
        let message = Message::new()
            .with("id", "c1")
            .with("new-session", "abc")
            .with("session", "tmp")
            .with("status", status(&["done"]));

        assert_eq!(
            Response::from_message(message),
            Response::NewSession {
                id: Some("c1".into()),
                session: "abc".into(),
            }
        );
    }

    #[test]
    fn test_status_classified_by_first_code() {
        let message = Message::new().with("status", status(&["eval-error", "done"]));
        assert!(matches!(
            Response::from_message(message),
            Response::Status {
                kind: StatusKind::EvalError,
                ..
            }
        ));

        let message = Message::new().with("status", status(&["weird"]));
        assert!(matches!(
            Response::from_message(message),
            Response::Status { kind: StatusKind::Unknown(code), .. } if code == "weird"
        ));
    }

    #[test]
    fn test_value_and_output_shapes() {
        let value = Response::from_message(
            Message::new()
                .with("id", "main")
                .with("value", "nil")
                .with("ns", "user"),
        );
        assert_eq!(
            value,
            Response::Value {
                id: Some("main".into()),
                value: "nil".into(),
                ns: Some("user".into()),
            }
        );

        let output = Response::from_message(Message::new().with("err", "oops\n"));
        assert_eq!(
            output,
            Response::Output {
                id: None,
                out: None,
                err: Some("oops\n".into()),
            }
        );
    }

    #[test]
    fn test_empty_status_is_unrecognized() {
        let message = Message::new()
            .with("status", Value::List(Vec::new()))
            .with("changed-namespaces", Value::Dict(BTreeMap::new()));
        assert!(matches!(
            Response::from_message(message),
            Response::Unrecognized(_)
        ));
    }

    #[test]
    fn test_message_json_rendering() {
        let message = Message::new()
            .with("id", "main")
            .with("status", status(&["done"]));
        assert_eq!(message.to_json(), r#"{"id":"main","status":["done"]}"#);
    }
}
