//! Registry event classification.

use serde_json::Value;
use std::fmt;

/// Top-level fields that may name the event type, in lookup order.
const EVENT_TYPE_FIELDS: [&str; 3] = ["type", "event_type", "event_type_lite"];

/// The two event classes the service reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An image became available.
    Push,
    /// An image or repository was removed.
    Delete,
}

impl EventKind {
    /// Classify a decoded event body.
    ///
    /// DELETE when the event type contains "delete" (any case) or the
    /// `operation` field equals "DELETE" (any case). Everything else,
    /// including bodies that are not JSON objects, is a PUSH.
    pub fn classify(payload: &Value) -> Self {
        let event_type = EVENT_TYPE_FIELDS
            .iter()
            .filter_map(|field| payload.get(field).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let operation_delete = payload
            .get("operation")
            .and_then(Value::as_str)
            .is_some_and(|op| op.eq_ignore_ascii_case("delete"));

        if event_type.contains("delete") || operation_delete {
            Self::Delete
        } else {
            Self::Push
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
