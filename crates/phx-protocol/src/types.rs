//! Core protocol types for the channels wire format.
//!
//! Every message on the wire is a [`Frame`]: an event name, the topic it
//! belongs to, an opaque payload and an optional [`Ref`] that ties a reply
//! back to the request that caused it.
//!
//! ```json
//! { "event": "phx_join", "topic": "room:lobby", "ref": 1, "payload": {} }
//! ```
//!
//! The protocol layer only ever looks inside a payload for one thing: the
//! `{status, response}` envelope carried by `phx_reply` frames ([`Reply`]).
//! Everything else passes through untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// An opaque structured payload.
///
/// Payloads are kept as generic structured values so that the session
/// layer never has to know their shape.
pub type Payload = Value;

// ---------------------------------------------------------------------------
// Ref
// ---------------------------------------------------------------------------

/// Correlates a reply frame with the request frame that produced it.
///
/// `#[serde(transparent)]` keeps `Ref(3)` on the wire as a plain `3`.
/// Deserialization is hand-written because servers echo back whatever the
/// sender used, and some clients send refs as strings (`"3"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ref(pub u64);

impl Ref {
    /// Returns the underlying integer.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Ref {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawRef {
            Number(u64),
            Text(String),
        }

        match RawRef::deserialize(deserializer)? {
            RawRef::Number(n) => Ok(Ref(n)),
            RawRef::Text(text) => text.parse().map(Ref).map_err(|_| {
                serde::de::Error::custom(format!("invalid ref {text:?}"))
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ChannelEvent: reserved event names
// ---------------------------------------------------------------------------

/// Event names reserved by the channels protocol.
///
/// Any other event string is an application event and is never
/// interpreted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelEvent {
    /// `phx_join`: ask to join a topic.
    Join,
    /// `phx_leave`: ask to leave a topic.
    Leave,
    /// `phx_close`: the server closed the channel.
    Close,
    /// `phx_error`: the channel crashed on the server.
    Error,
    /// `phx_reply`: a reply to an earlier frame, matched by ref.
    Reply,
}

impl ChannelEvent {
    /// All reserved events.
    pub const ALL: [ChannelEvent; 5] = [
        Self::Join,
        Self::Leave,
        Self::Close,
        Self::Error,
        Self::Reply,
    ];

    /// The wire name of this event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Join => "phx_join",
            Self::Leave => "phx_leave",
            Self::Close => "phx_close",
            Self::Error => "phx_error",
            Self::Reply => "phx_reply",
        }
    }

    /// Looks up a reserved event by its wire name.
    pub fn parse(event: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == event)
    }

    /// Returns `true` if `event` is one of the reserved names.
    pub fn is_reserved(event: &str) -> bool {
        Self::parse(event).is_some()
    }
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One protocol-level message.
///
/// Fields are private so a frame cannot change after it is built; use the
/// accessors to read it. The field order below is the field order on the
/// wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    event: String,
    topic: String,
    #[serde(rename = "ref", default)]
    reference: Option<Ref>,
    #[serde(default)]
    payload: Payload,
}

impl Frame {
    /// Builds a frame for `event` on `topic`.
    pub fn new(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Payload,
        reference: Option<Ref>,
    ) -> Self {
        Self {
            event: event.into(),
            topic: topic.into(),
            reference,
            payload,
        }
    }

    /// Builds a `phx_reply` frame answering `reference` on `topic`.
    pub fn reply(
        topic: impl Into<String>,
        reference: Option<Ref>,
        reply: Reply,
    ) -> Self {
        Self::new(
            topic,
            ChannelEvent::Reply.as_str(),
            reply.into_payload(),
            reference,
        )
    }

    /// The event name.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// The topic this frame belongs to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The payload, uninterpreted.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The correlation ref, absent on server-initiated pushes.
    pub fn reference(&self) -> Option<Ref> {
        self.reference
    }

    /// The reserved event this frame carries, if any.
    pub fn channel_event(&self) -> Option<ChannelEvent> {
        ChannelEvent::parse(&self.event)
    }

    /// Returns `true` for `phx_reply` frames.
    pub fn is_reply(&self) -> bool {
        self.event == ChannelEvent::Reply.as_str()
    }

    /// Consumes the frame and returns its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

// ---------------------------------------------------------------------------
// Reply envelope
// ---------------------------------------------------------------------------

/// Status field of a reply envelope.
///
/// `#[serde(other)]` maps any status we don't know to `Other`, so a server
/// inventing new statuses can't break decoding; such replies simply count
/// as "not ok".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// The request succeeded.
    Ok,
    /// The request was rejected.
    Error,
    /// Any other status string.
    #[serde(other)]
    Other,
}

impl ReplyStatus {
    /// The wire name of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            other => Err(ProtocolError::InvalidMessage(format!(
                "unknown reply status {other:?}"
            ))),
        }
    }
}

/// The `{status, response}` payload of a `phx_reply` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Whether the request succeeded.
    pub status: ReplyStatus,
    /// What the server answered. `null` if the server sent nothing.
    #[serde(default)]
    pub response: Payload,
}

impl Reply {
    /// A successful reply carrying `response`.
    pub fn ok(response: Payload) -> Self {
        Self {
            status: ReplyStatus::Ok,
            response,
        }
    }

    /// A rejection carrying `response`.
    pub fn error(response: Payload) -> Self {
        Self {
            status: ReplyStatus::Error,
            response,
        }
    }

    /// Returns `true` only for status `"ok"`.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Reads the reply envelope out of a `phx_reply` payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the payload has no
    /// usable `status` field.
    pub fn from_payload(payload: Payload) -> Result<Self, ProtocolError> {
        serde_json::from_value(payload).map_err(|e| {
            ProtocolError::InvalidMessage(format!("malformed reply payload: {e}"))
        })
    }

    /// Turns the reply back into a payload value.
    pub fn into_payload(self) -> Payload {
        serde_json::json!({
            "status": self.status.as_str(),
            "response": self.response,
        })
    }
}
