//! `sctpenc`: accepts buffers and feeds them into an association.

use crate::config::EndpointConfig;
use crate::control_plane::association_registry::AssociationRegistry;
use crate::data_plane::endpoint::EndpointRole;
use crate::data_plane::message::AssociationId;
use crate::data_plane::producer::{ProducerEndpoint, SendReport};
use crate::element::{default_name, Element, ElementCore, ElementState, StateTransition};
use crate::error::{MuxError, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use std::any::Any;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

pub const SCTP_ENC_FACTORY: &str = "sctpenc";

static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub struct SctpEnc {
    core: ElementCore,
    registry: Arc<AssociationRegistry>,
    config: Mutex<EndpointConfig>,
    producer: ArcSwapOption<ProducerEndpoint>,
}

impl SctpEnc {
    pub fn new(registry: Arc<AssociationRegistry>) -> Self {
        Self::with_name(default_name(SCTP_ENC_FACTORY, &INSTANCE_COUNTER), registry)
    }

    pub fn with_name(name: impl Into<String>, registry: Arc<AssociationRegistry>) -> Self {
        Self {
            core: ElementCore::new(name, SCTP_ENC_FACTORY),
            registry,
            config: Mutex::new(EndpointConfig::default()),
            producer: ArcSwapOption::empty(),
        }
    }

    /// The `sctp-association-id` property.
    pub fn association_id(&self) -> AssociationId {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .association_id
    }

    /// Only allowed while the element is in `Null`.
    pub fn set_association_id(&self, id: u16) -> Result<()> {
        let state = self.current_state();
        if state != ElementState::Null {
            return Err(MuxError::InvalidState(format!(
                "{}: sctp-association-id can only change in NULL, element is {state}",
                self.core.name()
            )));
        }
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .association_id = id.into();
        Ok(())
    }

    /// Pushes one buffer into the association. The element must be at least
    /// `Paused`.
    pub fn chain(&self, buffer: impl Into<Bytes>) -> Result<SendReport> {
        self.producer_for_dataflow()?.send(buffer)
    }

    pub fn chain_on_stream(
        &self,
        stream_id: u16,
        ppid: u32,
        buffer: impl Into<Bytes>,
    ) -> Result<SendReport> {
        self.producer_for_dataflow()?
            .send_on_stream(stream_id, ppid, buffer)
    }

    fn producer_for_dataflow(&self) -> Result<Arc<ProducerEndpoint>> {
        let state = self.current_state();
        if state < ElementState::Paused {
            return Err(MuxError::InvalidState(format!(
                "{}: cannot push buffers in {state}",
                self.core.name()
            )));
        }
        self.producer.load_full().ok_or_else(|| {
            MuxError::InvalidState(format!("{}: no producer bound", self.core.name()))
        })
    }
}

#[async_trait]
impl Element for SctpEnc {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn role(&self) -> Option<EndpointRole> {
        Some(EndpointRole::Producer)
    }

    async fn change_state(&self, transition: StateTransition) -> Result<()> {
        match transition {
            StateTransition::NullToReady => {
                let config = *self.config.lock().unwrap_or_else(PoisonError::into_inner);
                let producer = ProducerEndpoint::connect(self.registry.clone(), config).await?;
                debug!(
                    element = self.core.name(),
                    association_id = %config.association_id,
                    "producer bound"
                );
                self.producer.store(Some(Arc::new(producer)));
            }
            StateTransition::ReadyToNull => {
                if let Some(producer) = self.producer.swap(None) {
                    producer.release().await?;
                }
            }
            StateTransition::ReadyToPaused
            | StateTransition::PausedToPlaying
            | StateTransition::PlayingToPaused
            | StateTransition::PausedToReady => {}
        }
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::SctpEnc;
    use crate::config::MuxConfig;
    use crate::control_plane::association_registry::AssociationRegistry;
    use crate::data_plane::message::AssociationId;
    use crate::element::{Element, ElementState};
    use crate::error::MuxError;
    use std::sync::Arc;

    fn registry() -> Arc<AssociationRegistry> {
        Arc::new(AssociationRegistry::new(MuxConfig::default()).expect("valid config"))
    }

    #[tokio::test]
    async fn ready_binds_and_null_releases() {
        let registry = registry();
        let enc = SctpEnc::new(registry.clone());
        enc.set_association_id(4).expect("set id");

        enc.set_state(ElementState::Ready).await.expect("ready");
        assert_eq!(registry.references(AssociationId::new(4)).await, Some(1));

        enc.set_state(ElementState::Null).await.expect("null");
        assert!(registry.lookup(AssociationId::new(4)).await.is_none());
    }

    #[tokio::test]
    async fn association_id_is_frozen_while_active() {
        let enc = SctpEnc::new(registry());
        enc.set_state(ElementState::Ready).await.expect("ready");

        assert!(matches!(
            enc.set_association_id(9),
            Err(MuxError::InvalidState(_))
        ));
        assert_eq!(enc.association_id(), AssociationId::new(0));

        enc.set_state(ElementState::Null).await.expect("null");
    }

    #[tokio::test]
    async fn chain_requires_paused() {
        let enc = SctpEnc::new(registry());
        enc.set_state(ElementState::Ready).await.expect("ready");
        assert!(matches!(enc.chain("early"), Err(MuxError::InvalidState(_))));

        enc.set_state(ElementState::Paused).await.expect("paused");
        let report = enc.chain("ok").expect("chain");
        assert_eq!(report.sequence, 0);

        enc.set_state(ElementState::Null).await.expect("null");
    }

    #[test]
    fn default_names_carry_factory_prefix() {
        let enc = SctpEnc::new(registry());
        assert!(enc.name().starts_with("sctpenc"));
    }
}
