//! Association identity and the message unit carried through an association.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key selecting which association an endpoint attaches to.
///
/// Process-scoped and supplied by configuration, never generated. The range
/// matches the `sctp-association-id` element property (0..=65535).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociationId(u16);

impl AssociationId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl From<u16> for AssociationId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for AssociationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SCTP stream used when the sender does not pick one.
pub const DEFAULT_STREAM_ID: u16 = 0;
/// Payload protocol identifier 0 means "unspecified".
pub const DEFAULT_PPID: u32 = 0;

/// What a producer hands over before the association stamps it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub stream_id: u16,
    pub ppid: u32,
    pub payload: Bytes,
}

impl OutgoingMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id: DEFAULT_STREAM_ID,
            ppid: DEFAULT_PPID,
            payload: payload.into(),
        }
    }

    pub fn on_stream(stream_id: u16, ppid: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            ppid,
            payload: payload.into(),
        }
    }
}

/// A delivered message.
///
/// `sequence` is monotonic per association and restarts at 0 for every fresh
/// association. `stream_sequence` counts independently per `stream_id`.
/// `arrival` is a registry-wide logical tick used to order ties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub sequence: u64,
    pub stream_id: u16,
    pub stream_sequence: u16,
    pub ppid: u32,
    pub arrival: u64,
    pub payload: Bytes,
}

impl Message {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
