//! Decoder source loop: pulls from the consumer endpoint and pushes downstream.

use crate::data_plane::consumer::{ConsumerEndpoint, Received};
use crate::data_plane::message::Message;
use crate::element::bus::{Bus, BusMessage};
use crate::element::sink::BufferSink;
use crate::error::{MuxError, Result};
use crate::observability::events;
use crate::runtime::worker_runtime::spawn_worker_loop;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

const COMPONENT: &str = "source_loop";

/// Buffer dequeued but not yet accepted by the sink when the loop was
/// stopped. The next loop pushes it before pulling anything new.
#[derive(Default)]
pub(crate) struct PendingBuffer(Mutex<Option<Message>>);

impl PendingBuffer {
    pub(crate) fn take(&self) -> Option<Message> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn put_back(&self, message: Message) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(message);
    }
}

pub(crate) struct SourceLoop {
    id: String,
    stop: watch::Sender<bool>,
    done: oneshot::Receiver<()>,
}

impl SourceLoop {
    pub(crate) fn start(
        element: &str,
        consumer: Arc<ConsumerEndpoint>,
        sink: Arc<dyn BufferSink>,
        pending: Arc<PendingBuffer>,
        poll_interval: Duration,
        bus: Option<Arc<Bus>>,
    ) -> Result<Self> {
        let id = Uuid::new_v4().hyphenated().to_string();
        let (stop, stop_rx) = watch::channel(false);

        let loop_id = id.clone();
        let element_name = element.to_string();
        let done = spawn_worker_loop(format!("{element}-src"), move || {
            run(
                loop_id,
                element_name,
                consumer,
                sink,
                pending,
                poll_interval,
                bus,
                stop_rx,
            )
        })
        .map_err(|err| MuxError::Runtime(format!("unable to start source loop: {err}")))?;

        info!(
            event = events::SOURCE_LOOP_START,
            component = COMPONENT,
            element,
            loop_id = %id,
            "source loop started"
        );
        Ok(Self { id, stop, done })
    }

    /// Signals the loop and waits until it has returned.
    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.done.await;
        debug!(
            event = events::SOURCE_LOOP_STOP,
            component = COMPONENT,
            loop_id = %self.id,
            "source loop stopped"
        );
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    id: String,
    element: String,
    consumer: Arc<ConsumerEndpoint>,
    sink: Arc<dyn BufferSink>,
    pending: Arc<PendingBuffer>,
    poll_interval: Duration,
    bus: Option<Arc<Bus>>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        let message = match pending.take() {
            Some(message) => message,
            None => {
                // Dequeue is synchronous, so abandoning `receive` for a stop
                // request never loses a message.
                let received = tokio::select! {
                    _ = stop.changed() => break,
                    received = consumer.receive(Some(poll_interval)) => received,
                };

                match received {
                    Ok(Received::Message(message)) => message,
                    Ok(Received::EndOfStream) => {
                        sink.on_eos().await;
                        if let Some(bus) = &bus {
                            bus.post(BusMessage::Eos {
                                source: element.clone(),
                            });
                        }
                        break;
                    }
                    Err(MuxError::Timeout(_)) => continue,
                    Err(err) => {
                        warn!(
                            component = COMPONENT,
                            loop_id = %id,
                            err = %err,
                            "source loop ending on error"
                        );
                        break;
                    }
                }
            }
        };

        trace!(
            event = events::SOURCE_PUSH,
            component = COMPONENT,
            loop_id = %id,
            sequence = message.sequence,
            "pushing buffer downstream"
        );
        // A stalled sink must not keep the loop from stopping; the buffer it
        // has not accepted goes back to `pending`.
        let in_flight = message.clone();
        tokio::select! {
            _ = stop.changed() => {
                pending.put_back(in_flight);
                break;
            }
            _ = sink.on_buffer(message) => {}
        }
    }
}
