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

//! Element layer.
//!
//! Wraps producer/consumer endpoints in pipeline elements with a
//! NULL → READY → PAUSED → PLAYING lifecycle. Entering READY binds the
//! element's association, leaving it releases the binding, and every
//! completed step is posted to the element's bus.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sctp_mux::{
//!     AssociationRegistry, BusMessageKind, Element, ElementState, MuxConfig, Pipeline, SctpDec,
//!     SctpEnc,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Arc::new(AssociationRegistry::new(MuxConfig::default()).unwrap());
//! let pipeline = Pipeline::new("doc", registry.clone());
//!
//! let enc = Arc::new(SctpEnc::with_name("sctpenc", registry.clone()));
//! let dec = Arc::new(SctpDec::with_name("sctpdec", registry.clone()));
//! enc.set_association_id(1).unwrap();
//! dec.set_association_id(1).unwrap();
//! pipeline.add(enc.clone()).unwrap();
//! pipeline.add(dec.clone()).unwrap();
//!
//! pipeline.set_state(ElementState::Playing).await.unwrap();
//! let message = pipeline
//!     .bus()
//!     .timed_pop_filtered(None, &[BusMessageKind::Error, BusMessageKind::StateChanged])
//!     .await
//!     .unwrap();
//! assert_eq!(message.kind(), BusMessageKind::StateChanged);
//! assert_eq!(enc.association_id().get(), 1);
//!
//! pipeline.set_state(ElementState::Null).await.unwrap();
//! # });
//! ```

pub mod bus;
pub mod pipeline;
pub mod sctp_dec;
pub mod sctp_enc;
pub mod sink;
pub(crate) mod source_loop;

use crate::data_plane::endpoint::EndpointRole;
use crate::element::bus::{Bus, BusMessage};
use crate::error::Result;
use crate::observability::events;
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementState::Null => "NULL",
            ElementState::Ready => "READY",
            ElementState::Paused => "PAUSED",
            ElementState::Playing => "PLAYING",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StateTransition {
    NullToReady,
    ReadyToPaused,
    PausedToPlaying,
    PlayingToPaused,
    PausedToReady,
    ReadyToNull,
}

impl StateTransition {
    /// Single step from `current` toward `target`, `None` once there.
    pub fn next(current: ElementState, target: ElementState) -> Option<Self> {
        use ElementState::*;
        if current < target {
            Some(match current {
                Null => StateTransition::NullToReady,
                Ready => StateTransition::ReadyToPaused,
                Paused | Playing => StateTransition::PausedToPlaying,
            })
        } else if current > target {
            Some(match current {
                Playing => StateTransition::PlayingToPaused,
                Paused => StateTransition::PausedToReady,
                Ready | Null => StateTransition::ReadyToNull,
            })
        } else {
            None
        }
    }

    pub fn current(self) -> ElementState {
        match self {
            StateTransition::NullToReady => ElementState::Null,
            StateTransition::ReadyToPaused | StateTransition::ReadyToNull => ElementState::Ready,
            StateTransition::PausedToPlaying | StateTransition::PausedToReady => {
                ElementState::Paused
            }
            StateTransition::PlayingToPaused => ElementState::Playing,
        }
    }

    pub fn next_state(self) -> ElementState {
        match self {
            StateTransition::NullToReady | StateTransition::PausedToReady => ElementState::Ready,
            StateTransition::ReadyToPaused | StateTransition::PlayingToPaused => {
                ElementState::Paused
            }
            StateTransition::PausedToPlaying => ElementState::Playing,
            StateTransition::ReadyToNull => ElementState::Null,
        }
    }

    pub fn is_upward(self) -> bool {
        self.next_state() > self.current()
    }
}

/// State, name and bus slot every element carries.
pub struct ElementCore {
    name: String,
    factory_name: &'static str,
    state: Mutex<ElementState>,
    bus: ArcSwapOption<Bus>,
    transition_lock: tokio::sync::Mutex<()>,
}

impl ElementCore {
    pub fn new(name: impl Into<String>, factory_name: &'static str) -> Self {
        Self {
            name: name.into(),
            factory_name,
            state: Mutex::new(ElementState::Null),
            bus: ArcSwapOption::empty(),
            transition_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn factory_name(&self) -> &'static str {
        self.factory_name
    }

    pub fn state(&self) -> ElementState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_state(&self, state: ElementState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn bus(&self) -> Option<Arc<Bus>> {
        self.bus.load_full()
    }

    pub fn attach_bus(&self, bus: Arc<Bus>) {
        self.bus.store(Some(bus));
    }

    /// No-op while the element is not attached to a bus.
    pub fn post(&self, message: BusMessage) {
        if let Some(bus) = &*self.bus.load() {
            bus.post(message);
        }
    }
}

#[async_trait]
pub trait Element: Send + Sync {
    fn core(&self) -> &ElementCore;

    /// Which side of an association the element drives, if any.
    fn role(&self) -> Option<EndpointRole> {
        None
    }

    /// Work for one lifecycle step. The state is only advanced when this
    /// returns `Ok`.
    async fn change_state(&self, transition: StateTransition) -> Result<()>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn current_state(&self) -> ElementState {
        self.core().state()
    }

    /// Walks one adjacent state at a time toward `target`, posting a
    /// `StateChanged` per completed step. On failure an `Error` is posted and
    /// the element stays in the last state it reached.
    async fn set_state(&self, target: ElementState) -> Result<()> {
        let core = self.core();
        let _serialized = core.transition_lock.lock().await;

        while let Some(transition) = StateTransition::next(core.state(), target) {
            if let Err(err) = self.change_state(transition).await {
                error!(
                    event = events::ELEMENT_STATE_CHANGE_FAILED,
                    element = core.name(),
                    ?transition,
                    err = %err,
                    "state change failed"
                );
                core.post(BusMessage::Error {
                    source: core.name().to_string(),
                    error: err.clone(),
                });
                return Err(err);
            }

            let new = transition.next_state();
            core.store_state(new);
            debug!(
                event = events::ELEMENT_STATE_CHANGE,
                element = core.name(),
                factory = core.factory_name(),
                old = %transition.current(),
                new = %new,
                "state changed"
            );
            core.post(BusMessage::StateChanged {
                source: core.name().to_string(),
                old: transition.current(),
                new,
                pending: (new != target).then_some(target),
            });
        }

        Ok(())
    }
}

/// `<factory><n>` with a per-factory counter, e.g. `sctpenc0`.
pub(crate) fn default_name(factory_name: &str, counter: &AtomicUsize) -> String {
    format!("{factory_name}{}", counter.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::{ElementState, StateTransition};

    #[test]
    fn next_walks_one_step_at_a_time() {
        assert_eq!(
            StateTransition::next(ElementState::Null, ElementState::Playing),
            Some(StateTransition::NullToReady)
        );
        assert_eq!(
            StateTransition::next(ElementState::Paused, ElementState::Playing),
            Some(StateTransition::PausedToPlaying)
        );
        assert_eq!(
            StateTransition::next(ElementState::Playing, ElementState::Null),
            Some(StateTransition::PlayingToPaused)
        );
        assert_eq!(
            StateTransition::next(ElementState::Ready, ElementState::Ready),
            None
        );
    }

    #[test]
    fn transitions_report_their_endpoints() {
        assert_eq!(StateTransition::ReadyToNull.current(), ElementState::Ready);
        assert_eq!(StateTransition::ReadyToNull.next_state(), ElementState::Null);
        assert!(StateTransition::ReadyToPaused.is_upward());
        assert!(!StateTransition::PausedToReady.is_upward());
    }
}
