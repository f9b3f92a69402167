//! Downstream hand-off for buffers a decoder pulls out of its association.

use crate::data_plane::message::Message;
use async_trait::async_trait;
use tokio::sync::mpsc::Sender;
use tracing::debug;

#[async_trait]
pub trait BufferSink: Send + Sync {
    /// May be cancelled when the decoder leaves PLAYING. A cancelled call
    /// must not have kept the buffer: the decoder pushes it again on resume.
    async fn on_buffer(&self, buffer: Message);

    async fn on_eos(&self) {}
}

/// Event forwarded by [`ChannelSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Buffer(Message),
    Eos,
}

/// Forwards everything into a bounded channel; a full channel applies
/// backpressure to the decoder's source loop.
pub struct ChannelSink {
    sender: Sender<SinkEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<SinkEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl BufferSink for ChannelSink {
    async fn on_buffer(&self, buffer: Message) {
        if self.sender.send(SinkEvent::Buffer(buffer)).await.is_err() {
            debug!("ChannelSink: receiver gone, dropping buffer");
        }
    }

    async fn on_eos(&self) {
        let _ = self.sender.send(SinkEvent::Eos).await;
    }
}

// arc-swap needs a sized pointee.
pub(crate) struct SinkSlot(pub(crate) std::sync::Arc<dyn BufferSink>);
