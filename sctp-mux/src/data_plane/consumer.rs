//! Decoder-side endpoint pulling messages out of an association.

use crate::config::EndpointConfig;
use crate::control_plane::association_registry::AssociationRegistry;
use crate::data_plane::association::{AssociationHandle, Dequeued};
use crate::data_plane::endpoint::{EndpointBinding, EndpointLifecycle, EndpointRole};
use crate::data_plane::message::{AssociationId, Message};
use crate::error::{MuxError, Result};
use crate::observability::events;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const COMPONENT: &str = "consumer";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Received {
    Message(Message),
    /// The association closed and everything before the close was delivered.
    /// Reported once; later calls fail with [`MuxError::Closed`].
    EndOfStream,
}

pub struct ConsumerEndpoint {
    binding: EndpointBinding,
    eos_delivered: AtomicBool,
}

impl ConsumerEndpoint {
    pub fn new(registry: Arc<AssociationRegistry>, config: EndpointConfig) -> Self {
        Self {
            binding: EndpointBinding::new(EndpointRole::Consumer, registry, config),
            eos_delivered: AtomicBool::new(false),
        }
    }

    /// `new` followed by `bind`.
    pub async fn connect(
        registry: Arc<AssociationRegistry>,
        config: EndpointConfig,
    ) -> Result<Self> {
        let consumer = Self::new(registry, config);
        consumer.bind().await?;
        Ok(consumer)
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

    /// `release` that also reports whether it closed the association.
    pub(crate) async fn release_reporting_close(&self) -> Result<bool> {
        self.binding.release().await
    }

    /// Records that end-of-stream has been handed on by someone other than
    /// `receive`. Returns `false` if it was already reported.
    pub(crate) fn mark_end_of_stream(&self) -> bool {
        !self.eos_delivered.swap(true, Ordering::AcqRel)
    }

    /// Next message in send order, waiting up to `timeout` for one to
    /// arrive. `None` waits indefinitely.
    ///
    /// On timeout nothing is consumed: a message enqueued afterwards stays
    /// queued for the next call.
    pub async fn receive(&self, timeout: Option<Duration>) -> Result<Received> {
        let association = self.binding.association()?;

        if self.eos_delivered.load(Ordering::Acquire) {
            return Err(MuxError::Closed(association.id()));
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait_for_message(&association)).await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    trace!(
                        event = events::CONSUMER_TIMEOUT,
                        component = COMPONENT,
                        association_id = %association.id(),
                        timeout = ?limit,
                        "no data before timeout"
                    );
                    return Err(MuxError::Timeout(limit));
                }
            },
            None => wait_for_message(&association).await,
        };

        match outcome {
            Some(message) => {
                trace!(
                    event = events::CONSUMER_RECEIVE,
                    component = COMPONENT,
                    association_id = %association.id(),
                    sequence = message.sequence,
                    bytes = message.len(),
                    "received message"
                );
                Ok(Received::Message(message))
            }
            None => {
                if self.eos_delivered.swap(true, Ordering::AcqRel) {
                    return Err(MuxError::Closed(association.id()));
                }
                debug!(
                    event = events::CONSUMER_EOS,
                    component = COMPONENT,
                    association_id = %association.id(),
                    "end of stream"
                );
                Ok(Received::EndOfStream)
            }
        }
    }

    /// Non-waiting variant of [`ConsumerEndpoint::receive`]; `Ok(None)` means
    /// nothing is queued right now.
    pub fn try_receive(&self) -> Result<Option<Received>> {
        let association = self.binding.association()?;

        if self.eos_delivered.load(Ordering::Acquire) {
            return Err(MuxError::Closed(association.id()));
        }

        match association.dequeue() {
            Dequeued::Message(message) => Ok(Some(Received::Message(message))),
            Dequeued::Empty => Ok(None),
            Dequeued::Closed => {
                if self.eos_delivered.swap(true, Ordering::AcqRel) {
                    return Err(MuxError::Closed(association.id()));
                }
                Ok(Some(Received::EndOfStream))
            }
        }
    }
}

/// `None` once the association is closed and drained.
async fn wait_for_message(association: &AssociationHandle) -> Option<Message> {
    loop {
        let notified = association.data_ready();
        tokio::pin!(notified);
        notified.as_mut().enable();

        match association.dequeue() {
            Dequeued::Message(message) => return Some(message),
            Dequeued::Closed => return None,
            Dequeued::Empty => notified.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsumerEndpoint, Received};
    use crate::config::{EndpointConfig, MuxConfig};
    use crate::control_plane::association_registry::AssociationRegistry;
    use crate::data_plane::message::AssociationId;
    use crate::data_plane::producer::ProducerEndpoint;
    use crate::error::MuxError;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> Arc<AssociationRegistry> {
        Arc::new(AssociationRegistry::new(MuxConfig::default()).expect("valid config"))
    }

    #[tokio::test]
    async fn receive_wakes_when_producer_sends() {
        let registry = registry();
        let consumer = Arc::new(
            ConsumerEndpoint::connect(registry.clone(), EndpointConfig::new(1))
                .await
                .expect("consumer"),
        );
        let producer = ProducerEndpoint::connect(registry, EndpointConfig::new(1))
            .await
            .expect("producer");

        let waiter = {
            let consumer = consumer.clone();
            tokio::spawn(async move { consumer.receive(Some(Duration::from_secs(5))).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.send("wake").expect("send");

        match waiter.await.expect("join").expect("receive") {
            Received::Message(message) => assert_eq!(&message.payload[..], b"wake"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn end_of_stream_is_reported_once() {
        let registry = registry();
        let consumer = ConsumerEndpoint::connect(registry.clone(), EndpointConfig::new(2))
            .await
            .expect("consumer");
        let association = registry
            .lookup(AssociationId::new(2))
            .await
            .expect("association");

        association.close();

        assert_eq!(
            consumer.receive(Some(Duration::from_millis(50))).await,
            Ok(Received::EndOfStream)
        );
        assert_eq!(
            consumer.receive(Some(Duration::from_millis(50))).await,
            Err(MuxError::Closed(AssociationId::new(2)))
        );
        consumer.release().await.expect("release");
    }

    #[tokio::test]
    async fn try_receive_reports_empty_as_none() {
        let consumer = ConsumerEndpoint::connect(registry(), EndpointConfig::new(3))
            .await
            .expect("consumer");

        assert_eq!(consumer.try_receive(), Ok(None));
        consumer.release().await.expect("release");
    }
}
