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

//! Control-plane layer.
//!
//! Owns the association table and its refcounted create/destroy semantics.
//! Binding an id that is already live shares the association; releasing the
//! last reference closes it and removes it from the table.
//!
//! ```
//! use std::sync::Arc;
//! use sctp_mux::{AssociationId, AssociationRegistry, MuxConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = AssociationRegistry::new(MuxConfig::default()).unwrap();
//! let id = AssociationId::new(1);
//!
//! let encoder_side = registry.bind(id).await.unwrap();
//! let decoder_side = registry.bind(id).await.unwrap();
//! assert!(Arc::ptr_eq(&encoder_side, &decoder_side));
//! assert_eq!(registry.lookup(id).await.unwrap().id(), id);
//!
//! registry.release(id).await.unwrap();
//! registry.release(id).await.unwrap();
//! assert!(registry.lookup(id).await.is_none());
//! assert!(registry.release(id).await.is_err());
//! # });
//! ```

pub(crate) mod association_registry;
pub(crate) mod lifecycle_events;
