//! Encoder-side endpoint feeding byte messages into an association.

use crate::config::EndpointConfig;
use crate::control_plane::association_registry::AssociationRegistry;
use crate::data_plane::association::Enqueued;
use crate::data_plane::endpoint::{EndpointBinding, EndpointLifecycle, EndpointRole};
use crate::data_plane::message::{AssociationId, OutgoingMessage};
use crate::error::Result;
use crate::observability::events;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const COMPONENT: &str = "producer";

/// Outcome of a send, used by callers to throttle.
pub type SendReport = Enqueued;

pub struct ProducerEndpoint {
    binding: EndpointBinding,
}

impl ProducerEndpoint {
    pub fn new(registry: Arc<AssociationRegistry>, config: EndpointConfig) -> Self {
        Self {
            binding: EndpointBinding::new(EndpointRole::Producer, registry, config),
        }
    }

    /// `new` followed by `bind`.
    pub async fn connect(
        registry: Arc<AssociationRegistry>,
        config: EndpointConfig,
    ) -> Result<Self> {
        let producer = Self::new(registry, config);
        producer.bind().await?;
        Ok(producer)
    }

    pub fn association_id(&self) -> AssociationId {
        self.binding.association_id()
    }

    pub fn lifecycle(&self) -> EndpointLifecycle {
        self.binding.lifecycle()
    }

    pub async fn bind(&self) -> Result<()> {
        self.binding.bind().await.map(|_| ())
    }

    pub async fn release(&self) -> Result<()> {
        self.binding.release().await.map(|_| ())
    }

    pub fn send(&self, payload: impl Into<Bytes>) -> Result<SendReport> {
        self.send_message(OutgoingMessage::new(payload))
    }

    pub fn send_on_stream(
        &self,
        stream_id: u16,
        ppid: u32,
        payload: impl Into<Bytes>,
    ) -> Result<SendReport> {
        self.send_message(OutgoingMessage::on_stream(stream_id, ppid, payload))
    }

    fn send_message(&self, outgoing: OutgoingMessage) -> Result<SendReport> {
        let association = self.binding.association()?;
        let stream_id = outgoing.stream_id;

        match association.enqueue(outgoing) {
            Ok(report) => {
                trace!(
                    event = events::PRODUCER_SEND,
                    component = COMPONENT,
                    association_id = %association.id(),
                    stream_id,
                    sequence = report.sequence,
                    backlog = report.backlog,
                    "sent message"
                );
                if report.congested {
                    debug!(
                        event = events::PRODUCER_CONGESTED,
                        component = COMPONENT,
                        association_id = %association.id(),
                        backlog = report.backlog,
                        high_watermark = association.high_watermark(),
                        "association backlog at high watermark"
                    );
                }
                Ok(report)
            }
            Err(err) => {
                warn!(
                    event = events::PRODUCER_SEND_CLOSED,
                    component = COMPONENT,
                    association_id = %association.id(),
                    err = %err,
                    "send rejected"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProducerEndpoint;
    use crate::config::{EndpointConfig, MuxConfig};
    use crate::control_plane::association_registry::AssociationRegistry;
    use crate::data_plane::endpoint::EndpointLifecycle;
    use crate::data_plane::message::AssociationId;
    use crate::error::MuxError;
    use std::sync::Arc;

    fn registry() -> Arc<AssociationRegistry> {
        Arc::new(AssociationRegistry::new(MuxConfig::default()).expect("valid config"))
    }

    #[tokio::test]
    async fn send_before_bind_is_invalid_state() {
        let producer = ProducerEndpoint::new(registry(), EndpointConfig::new(1));

        assert_eq!(producer.lifecycle(), EndpointLifecycle::Unbound);
        assert!(matches!(
            producer.send("early"),
            Err(MuxError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn send_after_peer_closed_association_is_closed() {
        let registry = registry();
        let producer = ProducerEndpoint::connect(registry.clone(), EndpointConfig::new(1))
            .await
            .expect("connect");
        let association = registry
            .lookup(AssociationId::new(1))
            .await
            .expect("bound association");

        // Simulates teardown racing an in-flight sender.
        association.close();

        assert_eq!(
            producer.send("late").err(),
            Some(MuxError::Closed(AssociationId::new(1)))
        );
        producer.release().await.expect("release");
    }

    #[tokio::test]
    async fn release_twice_is_a_no_op() {
        let registry = registry();
        let producer = ProducerEndpoint::connect(registry.clone(), EndpointConfig::new(6))
            .await
            .expect("connect");

        producer.release().await.expect("first release");
        producer.release().await.expect("second release");

        assert_eq!(producer.lifecycle(), EndpointLifecycle::Released);
        assert!(registry.is_empty().await);
        assert!(matches!(producer.bind().await, Err(MuxError::InvalidState(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_binds_on_one_endpoint_take_one_reference() {
        let registry = registry();
        let producer = ProducerEndpoint::new(registry.clone(), EndpointConfig::new(9));

        let (first, second) = tokio::join!(producer.bind(), producer.bind());
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|outcome| matches!(outcome, Err(MuxError::InvalidState(_)))));

        assert_eq!(producer.lifecycle(), EndpointLifecycle::Bound);
        assert_eq!(registry.references(AssociationId::new(9)).await, Some(1));

        producer.release().await.expect("release");
        assert!(registry.is_empty().await);
    }
}
