//! Association lifecycle notifications for monitoring and tests.

use crate::data_plane::message::AssociationId;
use tokio::sync::broadcast::{self, Receiver, Sender};

pub(crate) const LIFECYCLE_EVENT_CAPACITY: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationEvent {
    Created { id: AssociationId },
    Bound { id: AssociationId, references: usize },
    Released { id: AssociationId, references: usize },
    Closed { id: AssociationId, discarded: usize },
}

impl AssociationEvent {
    pub fn id(&self) -> AssociationId {
        match self {
            AssociationEvent::Created { id }
            | AssociationEvent::Bound { id, .. }
            | AssociationEvent::Released { id, .. }
            | AssociationEvent::Closed { id, .. } => *id,
        }
    }
}

pub(crate) struct LifecycleEvents {
    sender: Sender<AssociationEvent>,
}

impl LifecycleEvents {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(LIFECYCLE_EVENT_CAPACITY);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> Receiver<AssociationEvent> {
        self.sender.subscribe()
    }

    // No subscribers is the common case and not worth reporting.
    pub(crate) fn publish(&self, event: AssociationEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{AssociationEvent, LifecycleEvents};
    use crate::data_plane::message::AssociationId;

    #[tokio::test]
    async fn subscribers_see_events_published_after_subscribing() {
        let events = LifecycleEvents::new();
        events.publish(AssociationEvent::Created {
            id: AssociationId::new(9),
        });

        let mut receiver = events.subscribe();
        events.publish(AssociationEvent::Closed {
            id: AssociationId::new(3),
            discarded: 0,
        });

        let event = receiver.recv().await.expect("event");
        assert_eq!(event.id(), AssociationId::new(3));
    }
}
