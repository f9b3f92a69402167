//! `sctpdec`: receives association data and emits it downstream.

use crate::config::EndpointConfig;
use crate::control_plane::association_registry::AssociationRegistry;
use crate::data_plane::consumer::{ConsumerEndpoint, Received};
use crate::data_plane::endpoint::EndpointRole;
use crate::data_plane::message::AssociationId;
use crate::element::bus::BusMessage;
use crate::element::sink::{BufferSink, SinkSlot};
use crate::element::source_loop::{PendingBuffer, SourceLoop};
use crate::element::{default_name, Element, ElementCore, ElementState, StateTransition};
use crate::error::{MuxError, Result};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

pub const SCTP_DEC_FACTORY: &str = "sctpdec";

static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub struct SctpDec {
    core: ElementCore,
    registry: Arc<AssociationRegistry>,
    config: Mutex<EndpointConfig>,
    consumer: ArcSwapOption<ConsumerEndpoint>,
    sink: ArcSwapOption<SinkSlot>,
    pending: Arc<PendingBuffer>,
    source_loop: tokio::sync::Mutex<Option<SourceLoop>>,
}

impl SctpDec {
    pub fn new(registry: Arc<AssociationRegistry>) -> Self {
        Self::with_name(default_name(SCTP_DEC_FACTORY, &INSTANCE_COUNTER), registry)
    }

    pub fn with_name(name: impl Into<String>, registry: Arc<AssociationRegistry>) -> Self {
        Self {
            core: ElementCore::new(name, SCTP_DEC_FACTORY),
            registry,
            config: Mutex::new(EndpointConfig::default()),
            consumer: ArcSwapOption::empty(),
            sink: ArcSwapOption::empty(),
            pending: Arc::new(PendingBuffer::default()),
            source_loop: tokio::sync::Mutex::new(None),
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

    /// Where buffers go once the element is `Playing`. Takes effect on the
    /// next PAUSED → PLAYING step.
    pub fn connect_sink(&self, sink: Arc<dyn BufferSink>) {
        self.sink.store(Some(Arc::new(SinkSlot(sink))));
    }

    /// Pulls one buffer directly, for callers that do not connect a sink.
    /// Competes with the source loop when one is running.
    pub async fn pull(&self, timeout: Option<Duration>) -> Result<Received> {
        let consumer = self.consumer.load_full().ok_or_else(|| {
            MuxError::InvalidState(format!("{}: no consumer bound", self.core.name()))
        })?;
        if let Some(message) = self.pending.take() {
            return Ok(Received::Message(message));
        }
        consumer.receive(timeout).await
    }

    async fn start_source_loop(&self) -> Result<()> {
        let Some(sink) = self.sink.load_full() else {
            debug!(
                element = self.core.name(),
                "no downstream sink connected, buffers stay queued"
            );
            return Ok(());
        };
        let consumer = self.consumer.load_full().ok_or_else(|| {
            MuxError::InvalidState(format!("{}: no consumer bound", self.core.name()))
        })?;

        let source_loop = SourceLoop::start(
            self.core.name(),
            consumer,
            sink.0.clone(),
            self.pending.clone(),
            self.registry.config().source_poll_interval(),
            self.core.bus(),
        )?;
        *self.source_loop.lock().await = Some(source_loop);
        Ok(())
    }

    async fn stop_source_loop(&self) {
        if let Some(source_loop) = self.source_loop.lock().await.take() {
            source_loop.stop().await;
        }
    }

    /// Releases the consumer. When that release closes the association,
    /// nothing else can reach the stream, so end-of-stream goes downstream
    /// and onto the bus here.
    async fn release_consumer(&self) -> Result<()> {
        self.stop_source_loop().await;
        let Some(consumer) = self.consumer.swap(None) else {
            return Ok(());
        };
        if let Some(dropped) = self.pending.take() {
            debug!(
                element = self.core.name(),
                sequence = dropped.sequence,
                "dropping buffer held across pause"
            );
        }

        let closed = consumer.release_reporting_close().await?;
        if closed && consumer.mark_end_of_stream() {
            if let Some(sink) = self.sink.load_full() {
                sink.0.on_eos().await;
            }
            self.core.post(BusMessage::Eos {
                source: self.core.name().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Element for SctpDec {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    fn role(&self) -> Option<EndpointRole> {
        Some(EndpointRole::Consumer)
    }

    async fn change_state(&self, transition: StateTransition) -> Result<()> {
        match transition {
            StateTransition::NullToReady => {
                let config = *self.config.lock().unwrap_or_else(PoisonError::into_inner);
                let consumer = ConsumerEndpoint::connect(self.registry.clone(), config).await?;
                debug!(
                    element = self.core.name(),
                    association_id = %config.association_id,
                    "consumer bound"
                );
                self.consumer.store(Some(Arc::new(consumer)));
            }
            StateTransition::PausedToPlaying => self.start_source_loop().await?,
            StateTransition::PlayingToPaused => self.stop_source_loop().await,
            StateTransition::ReadyToNull => self.release_consumer().await?,
            StateTransition::ReadyToPaused | StateTransition::PausedToReady => {}
        }
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::SctpDec;
    use crate::config::{EndpointConfig, MuxConfig};
    use crate::control_plane::association_registry::AssociationRegistry;
    use crate::data_plane::consumer::Received;
    use crate::data_plane::producer::ProducerEndpoint;
    use crate::element::sink::{ChannelSink, SinkEvent};
    use crate::element::{Element, ElementState};
    use std::sync::Arc;
    use std::time::Duration;

    fn registry() -> Arc<AssociationRegistry> {
        Arc::new(
            AssociationRegistry::new(MuxConfig {
                source_poll_interval_ms: 10,
                ..Default::default()
            })
            .expect("valid config"),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn playing_pushes_buffers_to_connected_sink() {
        let registry = registry();
        let dec = SctpDec::new(registry.clone());
        dec.set_association_id(3).expect("set id");
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        dec.connect_sink(Arc::new(ChannelSink::new(tx)));

        dec.set_state(ElementState::Playing).await.expect("playing");
        let producer = ProducerEndpoint::connect(registry.clone(), EndpointConfig::new(3))
            .await
            .expect("producer");
        producer.send("hello").expect("send");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("buffer in time")
            .expect("channel open");
        match event {
            SinkEvent::Buffer(message) => assert_eq!(&message.payload[..], b"hello"),
            other => panic!("expected buffer, got {other:?}"),
        }

        dec.set_state(ElementState::Null).await.expect("null");
        producer.release().await.expect("release");
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn pull_without_sink_reads_queued_buffers() {
        let registry = registry();
        let dec = SctpDec::new(registry.clone());
        dec.set_association_id(8).expect("set id");
        dec.set_state(ElementState::Playing).await.expect("playing");

        let producer = ProducerEndpoint::connect(registry, EndpointConfig::new(8))
            .await
            .expect("producer");
        producer.send("queued").expect("send");

        match dec.pull(Some(Duration::from_secs(1))).await.expect("pull") {
            Received::Message(message) => assert_eq!(&message.payload[..], b"queued"),
            other => panic!("expected message, got {other:?}"),
        }

        producer.release().await.expect("release");
        dec.set_state(ElementState::Null).await.expect("null");
    }
}
