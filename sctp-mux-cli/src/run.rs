/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Drives a pipeline of encoder/decoder pairs and tallies what arrived.

use crate::config::{AssociationRun, RunConfig};
use anyhow::Context;
use sctp_mux::{
    AssociationRegistry, BusMessage, ChannelSink, Element, ElementState, Pipeline, SctpDec,
    SctpEnc, SinkEvent,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, Receiver};
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

const PIPELINE_NAME: &str = "sctp-mux-cli";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssociationSummary {
    pub id: u16,
    pub sent: usize,
    pub delivered: usize,
    /// Buffers whose payload did not match the next expected one.
    pub out_of_order: usize,
    pub congested_sends: usize,
}

impl AssociationSummary {
    pub fn is_complete(&self) -> bool {
        self.delivered == self.sent && self.out_of_order == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    pub associations: Vec<AssociationSummary>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.associations.iter().all(AssociationSummary::is_complete)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for association in &self.associations {
            writeln!(
                f,
                "association {:>5}: sent {:>6} delivered {:>6} out-of-order {:>4} congested {:>4}",
                association.id,
                association.sent,
                association.delivered,
                association.out_of_order,
                association.congested_sends
            )?;
        }
        write!(
            f,
            "{} in {} ms",
            if self.is_complete() {
                "complete"
            } else {
                "LOSS"
            },
            self.elapsed_ms
        )
    }
}

struct Lane {
    run: AssociationRun,
    enc: Arc<SctpEnc>,
    events: Receiver<SinkEvent>,
}

fn payload(id: u16, n: usize) -> Vec<u8> {
    format!("{id}:{n}").into_bytes()
}

pub async fn run(config: &RunConfig) -> anyhow::Result<RunSummary> {
    let registry = Arc::new(
        AssociationRegistry::new(config.mux.clone()).context("unable to create registry")?,
    );
    let pipeline = Pipeline::new(PIPELINE_NAME, registry.clone());

    let mut lanes = Vec::with_capacity(config.associations.len());
    for association in &config.associations {
        let enc = Arc::new(SctpEnc::with_name(
            format!("sctpenc{}", association.id),
            registry.clone(),
        ));
        let dec = Arc::new(SctpDec::with_name(
            format!("sctpdec{}", association.id),
            registry.clone(),
        ));
        enc.set_association_id(association.id)?;
        dec.set_association_id(association.id)?;

        let (tx, events) = mpsc::channel(association.messages.clamp(1, 1024));
        dec.connect_sink(Arc::new(ChannelSink::new(tx)));

        pipeline.add(enc.clone())?;
        pipeline.add(dec)?;
        lanes.push(Lane {
            run: association.clone(),
            enc,
            events,
        });
    }

    let started = Instant::now();
    pipeline
        .set_state(ElementState::Playing)
        .await
        .context("pipeline failed to reach PLAYING")?;
    info!(
        "{PIPELINE_NAME}: playing with {} association pairs",
        lanes.len()
    );

    let result = exchange(&mut lanes, config).await;
    // Decoders hand end-of-stream to their sinks on teardown; nobody reads
    // the channels any more.
    drop(lanes);

    if let Err(err) = pipeline.set_state(ElementState::Null).await {
        warn!("{PIPELINE_NAME}: teardown failed: {err}");
    }
    report_bus_errors(&pipeline).await;
    if !pipeline.registry().is_empty().await {
        warn!("{PIPELINE_NAME}: associations still bound after teardown");
    }

    let associations = result?;
    Ok(RunSummary {
        associations,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

async fn report_bus_errors(pipeline: &Pipeline) {
    let bus = pipeline.bus();
    while let Some(message) = bus.timed_pop(Some(Duration::ZERO)).await {
        if let BusMessage::Error { source, error } = &message {
            warn!("{PIPELINE_NAME}: {source} reported {error}");
        }
    }
}

async fn exchange(
    lanes: &mut [Lane],
    config: &RunConfig,
) -> anyhow::Result<Vec<AssociationSummary>> {
    let mut summaries = Vec::with_capacity(lanes.len());
    for lane in lanes.iter() {
        let mut congested_sends = 0;
        for n in 0..lane.run.messages {
            let report = lane
                .enc
                .chain_on_stream(lane.run.stream_id, lane.run.ppid, payload(lane.run.id, n))
                .with_context(|| format!("send {n} on association {} failed", lane.run.id))?;
            if report.congested {
                congested_sends += 1;
            }
        }
        summaries.push(AssociationSummary {
            id: lane.run.id,
            sent: lane.run.messages,
            delivered: 0,
            out_of_order: 0,
            congested_sends,
        });
    }

    let deadline = tokio::time::Instant::now() + config.delivery_timeout();
    for (lane, summary) in lanes.iter_mut().zip(summaries.iter_mut()) {
        while summary.delivered + summary.out_of_order < summary.sent {
            match timeout_at(deadline, lane.events.recv()).await {
                Ok(Some(SinkEvent::Buffer(buffer))) => {
                    let expected = payload(lane.run.id, summary.delivered + summary.out_of_order);
                    if buffer.payload[..] == expected[..] {
                        summary.delivered += 1;
                    } else {
                        summary.out_of_order += 1;
                    }
                }
                Ok(Some(SinkEvent::Eos)) | Ok(None) => {
                    warn!(
                        "{PIPELINE_NAME}: association {} ended early",
                        lane.run.id
                    );
                    break;
                }
                Err(_) => {
                    warn!(
                        "{PIPELINE_NAME}: association {} timed out with {} of {} delivered",
                        lane.run.id, summary.delivered, summary.sent
                    );
                    break;
                }
            }
        }
        debug!(
            "{PIPELINE_NAME}: association {} delivered {}/{}",
            lane.run.id, summary.delivered, summary.sent
        );
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::run;
    use crate::config::{AssociationRun, RunConfig};
    use sctp_mux::MuxConfig;

    fn config(associations: Vec<AssociationRun>) -> RunConfig {
        RunConfig {
            mux: MuxConfig {
                source_poll_interval_ms: 10,
                ..Default::default()
            },
            delivery_timeout_ms: 5_000,
            associations,
        }
    }

    fn pair(id: u16, messages: usize) -> AssociationRun {
        AssociationRun {
            id,
            messages,
            stream_id: 0,
            ppid: 0,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn every_pair_delivers_everything() {
        let summary = run(&config(vec![pair(1, 20), pair(2, 5)]))
            .await
            .expect("run");

        assert!(summary.is_complete());
        assert_eq!(summary.associations.len(), 2);
        assert_eq!(summary.associations[0].delivered, 20);
        assert_eq!(summary.associations[1].delivered, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pair_without_messages_is_complete() {
        let summary = run(&config(vec![pair(3, 0)])).await.expect("run");
        assert!(summary.is_complete());
        assert_eq!(summary.associations[0].sent, 0);
    }

    #[test]
    fn summary_serializes_with_kebab_case_keys() {
        let summary = super::RunSummary {
            associations: vec![super::AssociationSummary {
                id: 1,
                sent: 2,
                delivered: 2,
                out_of_order: 0,
                congested_sends: 0,
            }],
            elapsed_ms: 3,
        };
        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["elapsed-ms"], 3);
        assert_eq!(json["associations"][0]["out-of-order"], 0);
        assert!(summary.to_string().starts_with("association     1"));
    }
}
