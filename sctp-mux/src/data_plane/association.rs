//! One logical association: FIFO inbound queue, state machine and wakeups.

use crate::data_plane::message::{AssociationId, Message, OutgoingMessage};
use crate::error::{MuxError, Result};
use crate::observability::events;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

const COMPONENT: &str = "association";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociationState {
    Idle,
    Active,
    Closing,
    Closed,
}

impl AssociationState {
    pub fn is_terminating(self) -> bool {
        matches!(self, AssociationState::Closing | AssociationState::Closed)
    }
}

impl fmt::Display for AssociationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssociationState::Idle => "idle",
            AssociationState::Active => "active",
            AssociationState::Closing => "closing",
            AssociationState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of a non-blocking dequeue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dequeued {
    Message(Message),
    /// Nothing queued yet; not an error.
    Empty,
    /// Torn down and fully drained.
    Closed,
}

/// What the producer learns from a successful enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Enqueued {
    pub sequence: u64,
    pub backlog: usize,
    /// Backlog reached the high watermark; the producer should slow down.
    pub congested: bool,
}

struct AssociationInner {
    state: AssociationState,
    next_sequence: u64,
    stream_sequences: HashMap<u16, u16>,
    queue: VecDeque<Message>,
}

pub struct Association {
    id: AssociationId,
    high_watermark: usize,
    clock: Arc<AtomicU64>,
    inner: Mutex<AssociationInner>,
    data_ready: Notify,
}

pub type AssociationHandle = Arc<Association>;

impl Association {
    pub(crate) fn new(id: AssociationId, high_watermark: usize, clock: Arc<AtomicU64>) -> Self {
        Self {
            id,
            high_watermark,
            clock,
            inner: Mutex::new(AssociationInner {
                state: AssociationState::Idle,
                next_sequence: 0,
                stream_sequences: HashMap::new(),
                queue: VecDeque::new(),
            }),
            data_ready: Notify::new(),
        }
    }

    pub fn id(&self) -> AssociationId {
        self.id
    }

    pub fn state(&self) -> AssociationState {
        self.lock().state
    }

    pub fn backlog(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    // A panic while holding the lock cannot leave the queue half-updated:
    // every mutation is a single push/pop/clear.
    fn lock(&self) -> MutexGuard<'_, AssociationInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, outgoing: OutgoingMessage) -> Result<Enqueued> {
        let enqueued = {
            let mut inner = self.lock();
            if inner.state.is_terminating() {
                warn!(
                    component = COMPONENT,
                    association_id = %self.id,
                    state = %inner.state,
                    bytes = outgoing.payload.len(),
                    "dropping message sent to torn-down association"
                );
                return Err(MuxError::Closed(self.id));
            }
            if inner.state == AssociationState::Idle {
                inner.state = AssociationState::Active;
            }

            let sequence = inner.next_sequence;
            inner.next_sequence += 1;

            let stream_sequence = {
                let counter = inner.stream_sequences.entry(outgoing.stream_id).or_insert(0);
                let current = *counter;
                *counter = counter.wrapping_add(1);
                current
            };

            inner.queue.push_back(Message {
                sequence,
                stream_id: outgoing.stream_id,
                stream_sequence,
                ppid: outgoing.ppid,
                arrival: self.clock.fetch_add(1, Ordering::Relaxed),
                payload: outgoing.payload,
            });

            let backlog = inner.queue.len();
            Enqueued {
                sequence,
                backlog,
                congested: backlog >= self.high_watermark,
            }
        };

        trace!(
            component = COMPONENT,
            association_id = %self.id,
            sequence = enqueued.sequence,
            backlog = enqueued.backlog,
            "enqueued message"
        );
        self.data_ready.notify_waiters();
        Ok(enqueued)
    }

    pub fn dequeue(&self) -> Dequeued {
        let mut inner = self.lock();
        if inner.state == AssociationState::Idle {
            inner.state = AssociationState::Active;
        }
        match inner.queue.pop_front() {
            Some(message) => Dequeued::Message(message),
            None if inner.state.is_terminating() => Dequeued::Closed,
            None => Dequeued::Empty,
        }
    }

    /// Future completing on the next enqueue or close.
    ///
    /// Callers must `enable` it before checking the queue so a wakeup sent
    /// between the check and the await is not lost.
    pub(crate) fn data_ready(&self) -> Notified<'_> {
        self.data_ready.notified()
    }

    /// Closing then Closed, discarding whatever is still queued.
    ///
    /// Returns the number of discarded messages. Idempotent once Closed.
    pub(crate) fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.lock();
            if inner.state == AssociationState::Closed {
                return 0;
            }
            inner.state = AssociationState::Closing;
            let discarded = inner.queue.len();
            inner.queue.clear();
            inner.stream_sequences.clear();
            inner.state = AssociationState::Closed;
            discarded
        };

        debug!(
            event = events::ASSOCIATION_CLOSE,
            component = COMPONENT,
            association_id = %self.id,
            discarded,
            "association closed"
        );
        self.data_ready.notify_waiters();
        discarded
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("backlog", &self.backlog())
            .finish_non_exhaustive()
    }
}
