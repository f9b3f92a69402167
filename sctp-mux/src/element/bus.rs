//! Message bus elements and pipelines post state changes and errors to.

use crate::element::ElementState;
use crate::error::MuxError;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusMessage {
    StateChanged {
        source: String,
        old: ElementState,
        new: ElementState,
        /// Final target when this step is part of a longer walk.
        pending: Option<ElementState>,
    },
    Error {
        source: String,
        error: MuxError,
    },
    Eos {
        source: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BusMessageKind {
    StateChanged,
    Error,
    Eos,
}

impl BusMessage {
    pub fn kind(&self) -> BusMessageKind {
        match self {
            BusMessage::StateChanged { .. } => BusMessageKind::StateChanged,
            BusMessage::Error { .. } => BusMessageKind::Error,
            BusMessage::Eos { .. } => BusMessageKind::Eos,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            BusMessage::StateChanged { source, .. }
            | BusMessage::Error { source, .. }
            | BusMessage::Eos { source } => source,
        }
    }
}

pub struct Bus {
    sender: UnboundedSender<BusMessage>,
    receiver: Mutex<UnboundedReceiver<BusMessage>>,
}

impl Bus {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    pub fn post(&self, message: BusMessage) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.sender.send(message);
    }

    /// First queued message whose kind is in `filter`, waiting up to
    /// `timeout` (`None` waits indefinitely). Messages that do not match are
    /// dropped.
    pub async fn timed_pop_filtered(
        &self,
        timeout: Option<Duration>,
        filter: &[BusMessageKind],
    ) -> Option<BusMessage> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut receiver = self.receiver.lock().await;

        loop {
            let next = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, receiver.recv())
                    .await
                    .ok()?,
                None => receiver.recv().await,
            };
            let message = next?;
            if filter.contains(&message.kind()) {
                return Some(message);
            }
        }
    }

    pub async fn timed_pop(&self, timeout: Option<Duration>) -> Option<BusMessage> {
        self.timed_pop_filtered(
            timeout,
            &[
                BusMessageKind::StateChanged,
                BusMessageKind::Error,
                BusMessageKind::Eos,
            ],
        )
        .await
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Bus, BusMessage, BusMessageKind};
    use crate::element::ElementState;
    use std::time::Duration;

    fn eos(source: &str) -> BusMessage {
        BusMessage::Eos {
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn filtered_pop_skips_non_matching_messages() {
        let bus = Bus::new();
        bus.post(eos("a"));
        bus.post(BusMessage::StateChanged {
            source: "b".to_string(),
            old: ElementState::Null,
            new: ElementState::Ready,
            pending: None,
        });

        let message = bus
            .timed_pop_filtered(
                Some(Duration::from_millis(100)),
                &[BusMessageKind::StateChanged, BusMessageKind::Error],
            )
            .await
            .expect("state change");

        assert_eq!(message.kind(), BusMessageKind::StateChanged);
        assert_eq!(message.source(), "b");
        assert!(bus.timed_pop(Some(Duration::from_millis(10))).await.is_none());
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_bus() {
        let bus = Bus::new();
        assert!(bus.timed_pop(Some(Duration::from_millis(10))).await.is_none());
    }
}
