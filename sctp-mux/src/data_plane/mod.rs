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

//! Data-plane layer.
//!
//! Owns the per-association message queue and the producer/consumer
//! endpoints on either side of it. Each association has its own lock, so
//! traffic on one id never waits on another.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sctp_mux::{
//!     AssociationRegistry, ConsumerEndpoint, EndpointConfig, MuxConfig, ProducerEndpoint, Received,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Arc::new(AssociationRegistry::new(MuxConfig::default()).unwrap());
//! let producer = ProducerEndpoint::connect(registry.clone(), EndpointConfig::new(1))
//!     .await
//!     .unwrap();
//! let consumer = ConsumerEndpoint::connect(registry.clone(), EndpointConfig::new(1))
//!     .await
//!     .unwrap();
//!
//! producer.send("first").unwrap();
//! producer.send("second").unwrap();
//!
//! for expected in ["first", "second"] {
//!     match consumer.receive(Some(Duration::from_secs(1))).await.unwrap() {
//!         Received::Message(message) => assert_eq!(&message.payload[..], expected.as_bytes()),
//!         Received::EndOfStream => unreachable!(),
//!     }
//! }
//!
//! producer.release().await.unwrap();
//! consumer.release().await.unwrap();
//! # });
//! ```

pub(crate) mod association;
pub(crate) mod consumer;
pub(crate) mod endpoint;
pub(crate) mod message;
pub(crate) mod producer;
