//! Frame — the universal message type for Rollcall.
//!
//! ARCHITECTURE
//! ============
//! Every exchange between a client and the relay is a Frame. Clients send
//! request frames over WebSocket, the server dispatches by syscall prefix,
//! and responses flow back as item/done/error frames scoped to one school.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>`, never nested.
//! - Responses correlate to requests via `parent_id`.
//! - The WS handler routes on the syscall prefix ("school:", "record:",
//!   "user:", "ai:") and never inspects `data`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Frame data key for error messages.
pub const FRAME_MESSAGE: &str = "message";

/// Frame data key for grepable error codes.
pub const FRAME_CODE: &str = "code";

/// Frame data key for the retryable flag on error frames.
pub const FRAME_RETRYABLE: &str = "retryable";

/// Frame data key for the tombstone marker on record deletions.
pub const FRAME_DELETED: &str = "_deleted";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload. Alias to reduce noise in signatures.
pub type Data = HashMap<String, serde_json::Value>;

/// Lifecycle position of a frame in a request/response stream.
///
/// Every exchange is `request → item* → done` or `request → error`.
/// In-flight requests cannot be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Request,
    Item,
    Done,
    Error,
}

impl Status {
    /// Terminal statuses end a response stream.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Done | Status::Error)
    }
}

/// The universal message type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub ts: i64,
    /// Normalized school namespace this frame belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_code: Option<String>,
    pub from: Option<String>,
    pub syscall: String,
    pub status: Status,
    pub data: Data,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error frames.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Create a request frame. Entry point for every syscall.
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            school_code: None,
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    /// Create an item response carrying one result.
    #[must_use]
    pub fn item(&self, data: Data) -> Self {
        self.reply(Status::Item, data)
    }

    /// Create a done response. Terminal, carries no data.
    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Data::new())
    }

    /// Create a done response carrying a result payload. Terminal.
    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Create an error response from a plain string. Terminal.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(message.into()));
        self.reply(Status::Error, data)
    }

    /// Create a structured error response from a typed error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert(FRAME_CODE.into(), serde_json::Value::String(err.error_code().to_string()));
        data.insert(FRAME_MESSAGE.into(), serde_json::Value::String(err.to_string()));
        data.insert(FRAME_RETRYABLE.into(), serde_json::Value::Bool(err.retryable()));
        self.reply(Status::Error, data)
    }

    /// Build a reply frame. Inherits `parent_id`, `school_code`, and `syscall`.
    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            school_code: self.school_code.clone(),
            from: None,
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Frame {
    #[must_use]
    pub fn with_school(mut self, school_code: impl Into<String>) -> Self {
        self.school_code = Some(school_code.into());
        self
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ROUTING
// =============================================================================

impl Frame {
    /// Extract the syscall prefix (everything before the first ':').
    #[must_use]
    pub fn prefix(&self) -> &str {
        let Some((prefix, _)) = self.syscall.split_once(':') else {
            return &self.syscall;
        };
        prefix
    }

    /// Extract the syscall operation (everything after the first ':').
    #[must_use]
    pub fn op(&self) -> &str {
        self.syscall.split_once(':').map_or("", |(_, op)| op)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_sets_fields() {
        let frame = Frame::request("record:save", Data::new());
        assert_eq!(frame.syscall, "record:save");
        assert_eq!(frame.status, Status::Request);
        assert!(frame.parent_id.is_none());
        assert!(frame.school_code.is_none());
        assert!(frame.ts > 0);
    }

    #[test]
    fn reply_inherits_context() {
        let req = Frame::request("record:save", Data::new()).with_school("north-hill");
        let item = req.item(Data::new());

        assert_eq!(item.parent_id, Some(req.id));
        assert_eq!(item.school_code.as_deref(), Some("north-hill"));
        assert_eq!(item.syscall, "record:save");
        assert_eq!(item.status, Status::Item);
    }

    #[test]
    fn done_is_terminal() {
        assert!(Status::Done.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(!Status::Request.is_terminal());
        assert!(!Status::Item.is_terminal());
    }

    #[test]
    fn prefix_and_op_extraction() {
        let frame = Frame::request("school:join", Data::new());
        assert_eq!(frame.prefix(), "school");
        assert_eq!(frame.op(), "join");

        let frame = Frame::request("noseparator", Data::new());
        assert_eq!(frame.prefix(), "noseparator");
        assert_eq!(frame.op(), "");
    }

    #[test]
    fn json_round_trip() {
        let original = Frame::request("user:find", Data::new())
            .with_school("default")
            .with_from("supervisor-1")
            .with_data("email", "amina@example.com");

        let json = serde_json::to_string(&original).expect("serialize");
        let restored: Frame = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.id, original.id);
        assert_eq!(restored.school_code.as_deref(), Some("default"));
        assert_eq!(restored.syscall, "user:find");
        assert_eq!(restored.from.as_deref(), Some("supervisor-1"));
        assert_eq!(restored.data.get("email").and_then(|v| v.as_str()), Some("amina@example.com"));
    }

    #[test]
    fn error_from_typed() {
        #[derive(Debug, thiserror::Error)]
        #[error("school not joined")]
        struct NotJoined;

        impl ErrorCode for NotJoined {
            fn error_code(&self) -> &'static str {
                "E_NOT_JOINED"
            }
        }

        let req = Frame::request("record:save", Data::new());
        let err = req.error_from(&NotJoined);

        assert_eq!(err.status, Status::Error);
        assert_eq!(err.data.get("code").and_then(|v| v.as_str()), Some("E_NOT_JOINED"));
        assert_eq!(err.data.get("message").and_then(|v| v.as_str()), Some("school not joined"));
        assert_eq!(
            err.data
                .get("retryable")
                .and_then(serde_json::Value::as_bool),
            Some(false)
        );
    }

    #[test]
    fn done_with_carries_payload() {
        let req = Frame::request("school:join", Data::new()).with_school("default");
        let done = req.done_with(Data::from([("records".to_string(), serde_json::json!([]))]));

        assert_eq!(done.status, Status::Done);
        assert_eq!(done.parent_id, Some(req.id));
        assert!(done.data.contains_key("records"));
    }
}
