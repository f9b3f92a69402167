/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
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

//! # sctp-mux
//!
//! `sctp-mux` multiplexes in-process SCTP-style associations. Each association
//! is identified by an [`AssociationId`] and carries an ordered, reliable,
//! message-oriented stream from a [`ProducerEndpoint`] to a
//! [`ConsumerEndpoint`]. Any number of associations may be live at once and
//! never observe each other's traffic.
//!
//! Typical usage goes through the `sctpenc`/`sctpdec` element pair
//! ([`SctpEnc`], [`SctpDec`]) inside a [`Pipeline`], mirroring how the
//! encoder/decoder elements are wired in a media pipeline.
//!
//! ## Encoder/decoder pair
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sctp_mux::{
//!     AssociationRegistry, ChannelSink, Element, ElementState, MuxConfig, Pipeline, SctpDec,
//!     SctpEnc, SinkEvent,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Arc::new(AssociationRegistry::new(MuxConfig::default()).unwrap());
//! let pipeline = Pipeline::new("quick-start", registry.clone());
//!
//! let enc = Arc::new(SctpEnc::with_name("sctpenc", registry.clone()));
//! let dec = Arc::new(SctpDec::with_name("sctpdec", registry.clone()));
//! enc.set_association_id(1).unwrap();
//! dec.set_association_id(1).unwrap();
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(16);
//! dec.connect_sink(Arc::new(ChannelSink::new(tx)));
//!
//! pipeline.add(enc.clone()).unwrap();
//! pipeline.add(dec.clone()).unwrap();
//! pipeline.set_state(ElementState::Playing).await.unwrap();
//!
//! enc.chain("hello").unwrap();
//! match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap() {
//!     Some(SinkEvent::Buffer(buffer)) => assert_eq!(&buffer.payload[..], b"hello"),
//!     other => panic!("unexpected {other:?}"),
//! }
//!
//! pipeline.set_state(ElementState::Null).await.unwrap();
//! assert!(registry.is_empty().await);
//! # });
//! ```
//!
//! ## Error contract
//!
//! - `ResourceExhausted`: the registry is at `max-associations`; binding fails
//!   and the element does not leave NULL.
//! - `NotFound`: releasing an id nothing is bound to.
//! - `Closed`: the association was torn down; producers must stop sending.
//! - `Timeout`: a consumer wait expired; nothing was consumed.
//!
//! ## Internal architecture map
//!
//! - Control plane: association table, refcounted bind/release, lifecycle events
//! - Data plane: association queue/state machine and producer/consumer endpoints
//! - Element: `sctpenc`/`sctpdec`, bus and pipeline lifecycle
//! - Runtime: worker thread/runtime boundaries for decoder source loops
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not unconditionally initialize a global
//! subscriber. Binaries and tests are responsible for one-time
//! `tracing_subscriber` initialization at process boundaries.

mod config;
pub use config::{EndpointConfig, MuxConfig};

mod control_plane;
pub use control_plane::association_registry::AssociationRegistry;
pub use control_plane::lifecycle_events::AssociationEvent;

mod data_plane;
pub use data_plane::association::{
    Association, AssociationHandle, AssociationState, Dequeued, Enqueued,
};
pub use data_plane::consumer::{ConsumerEndpoint, Received};
pub use data_plane::endpoint::{EndpointLifecycle, EndpointRole};
pub use data_plane::message::{AssociationId, Message, OutgoingMessage};
pub use data_plane::producer::{ProducerEndpoint, SendReport};

mod element;
pub use element::bus::{Bus, BusMessage, BusMessageKind};
pub use element::pipeline::Pipeline;
pub use element::sctp_dec::{SctpDec, SCTP_DEC_FACTORY};
pub use element::sctp_enc::{SctpEnc, SCTP_ENC_FACTORY};
pub use element::sink::{BufferSink, ChannelSink, SinkEvent};
pub use element::{Element, ElementCore, ElementState, StateTransition};

mod error;
pub use error::{MuxError, Result};

#[doc(hidden)]
pub mod observability;
mod runtime;
