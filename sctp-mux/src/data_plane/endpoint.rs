//! Binding bookkeeping shared by producer and consumer endpoints.

use crate::config::EndpointConfig;
use crate::control_plane::association_registry::AssociationRegistry;
use crate::data_plane::association::AssociationHandle;
use crate::data_plane::message::AssociationId;
use crate::error::{MuxError, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Producer,
    Consumer,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointRole::Producer => f.write_str("producer"),
            EndpointRole::Consumer => f.write_str("consumer"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EndpointLifecycle {
    Unbound,
    /// A bind is waiting on the registry.
    Binding,
    Bound,
    Released,
}

struct BindingState {
    lifecycle: EndpointLifecycle,
    association: Option<AssociationHandle>,
}

pub(crate) struct EndpointBinding {
    role: EndpointRole,
    config: EndpointConfig,
    registry: Arc<AssociationRegistry>,
    state: Mutex<BindingState>,
}

impl EndpointBinding {
    pub(crate) fn new(
        role: EndpointRole,
        registry: Arc<AssociationRegistry>,
        config: EndpointConfig,
    ) -> Self {
        Self {
            role,
            config,
            registry,
            state: Mutex::new(BindingState {
                lifecycle: EndpointLifecycle::Unbound,
                association: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn association_id(&self) -> AssociationId {
        self.config.association_id
    }

    pub(crate) fn lifecycle(&self) -> EndpointLifecycle {
        self.lock().lifecycle
    }

    pub(crate) async fn bind(&self) -> Result<AssociationHandle> {
        {
            let mut state = self.lock();
            if state.lifecycle != EndpointLifecycle::Unbound {
                return Err(MuxError::InvalidState(format!(
                    "{} endpoint for association {} is already {:?}",
                    self.role, self.config.association_id, state.lifecycle
                )));
            }
            state.lifecycle = EndpointLifecycle::Binding;
        }

        let association = match self.registry.bind(self.config.association_id).await {
            Ok(association) => association,
            Err(err) => {
                self.lock().lifecycle = EndpointLifecycle::Unbound;
                return Err(err);
            }
        };

        let mut state = self.lock();
        state.lifecycle = EndpointLifecycle::Bound;
        state.association = Some(association.clone());
        debug!(
            role = %self.role,
            association_id = %self.config.association_id,
            "endpoint bound"
        );
        Ok(association)
    }

    /// Gives the held reference back to the registry. A second call is a
    /// no-op. Returns whether this release closed the association.
    ///
    /// Fails with `Closed` when the association was already torn down
    /// underneath the endpoint; a newer association bound under the same id
    /// is not touched.
    pub(crate) async fn release(&self) -> Result<bool> {
        let released = {
            let mut state = self.lock();
            match state.lifecycle {
                EndpointLifecycle::Bound => {
                    state.lifecycle = EndpointLifecycle::Released;
                    state.association.take()
                }
                EndpointLifecycle::Binding => {
                    return Err(MuxError::InvalidState(format!(
                        "{} endpoint for association {} is still binding",
                        self.role, self.config.association_id
                    )));
                }
                EndpointLifecycle::Unbound | EndpointLifecycle::Released => None,
            }
        };

        let Some(association) = released else {
            return Ok(false);
        };

        debug!(
            role = %self.role,
            association_id = %self.config.association_id,
            "endpoint released"
        );
        self.registry.release_association(&association).await
    }

    pub(crate) fn association(&self) -> Result<AssociationHandle> {
        let state = self.lock();
        match (&state.association, state.lifecycle) {
            (Some(association), EndpointLifecycle::Bound) => Ok(association.clone()),
            (_, lifecycle) => Err(MuxError::InvalidState(format!(
                "{} endpoint for association {} is {lifecycle:?}",
                self.role, self.config.association_id
            ))),
        }
    }
}

impl Drop for EndpointBinding {
    fn drop(&mut self) {
        if self.lock().lifecycle == EndpointLifecycle::Bound {
            warn!(
                role = %self.role,
                association_id = %self.config.association_id,
                "endpoint dropped while still bound; association reference leaked"
            );
        }
    }
}
