//! Refcounted association table.

use crate::config::MuxConfig;
use crate::control_plane::lifecycle_events::{AssociationEvent, LifecycleEvents};
use crate::data_plane::association::{Association, AssociationHandle};
use crate::data_plane::message::AssociationId;
use crate::error::{MuxError, Result};
use crate::observability::events;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ASSOCIATION_REGISTRY_TAG: &str = "AssociationRegistry:";
const ASSOCIATION_REGISTRY_FN_BIND_TAG: &str = "bind:";
const ASSOCIATION_REGISTRY_FN_RELEASE_TAG: &str = "release:";

type AssociationsContainer = Mutex<HashMap<AssociationId, (usize, AssociationHandle)>>;

/// Single arbiter of which associations exist.
///
/// Every bind, release and lookup goes through one table lock, so operations
/// on the same id are serialized and teardown of an association completes
/// before a racing `bind` for that id can run. Queue traffic never touches
/// this lock.
pub struct AssociationRegistry {
    config: MuxConfig,
    clock: Arc<AtomicU64>,
    associations: AssociationsContainer,
    lifecycle: LifecycleEvents,
}

impl AssociationRegistry {
    pub fn new(config: MuxConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "{ASSOCIATION_REGISTRY_TAG} created with max_associations: {}, high_watermark: {}",
            config.max_associations, config.high_watermark
        );

        Ok(Self {
            config,
            clock: Arc::new(AtomicU64::new(0)),
            associations: Mutex::new(HashMap::new()),
            lifecycle: LifecycleEvents::new(),
        })
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub async fn bind(&self, id: AssociationId) -> Result<AssociationHandle> {
        let mut associations = self.associations.lock().await;

        if let Some((active, association)) = associations.get_mut(&id) {
            *active += 1;
            let references = *active;
            debug!(
                event = events::ASSOCIATION_BIND,
                association_id = %id,
                references,
                "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_BIND_TAG} reusing association"
            );
            self.lifecycle
                .publish(AssociationEvent::Bound { id, references });
            return Ok(association.clone());
        }

        if associations.len() >= self.config.max_associations {
            warn!(
                event = events::ASSOCIATION_BIND_REJECTED,
                association_id = %id,
                limit = self.config.max_associations,
                "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_BIND_TAG} association table full"
            );
            return Err(MuxError::ResourceExhausted {
                limit: self.config.max_associations,
            });
        }

        let association = Arc::new(Association::new(
            id,
            self.config.high_watermark,
            self.clock.clone(),
        ));
        associations.insert(id, (1, association.clone()));

        info!(
            event = events::ASSOCIATION_CREATE,
            association_id = %id,
            live = associations.len(),
            "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_BIND_TAG} created association"
        );
        self.lifecycle.publish(AssociationEvent::Created { id });
        self.lifecycle
            .publish(AssociationEvent::Bound { id, references: 1 });

        Ok(association)
    }

    pub async fn release(&self, id: AssociationId) -> Result<()> {
        let mut associations = self.associations.lock().await;
        self.release_locked(&mut associations, id).map(|_| ())
    }

    /// Releases the reference `association` stands for. A handle whose
    /// association was already torn down gets `Closed` and leaves a newer
    /// association under the same id untouched.
    ///
    /// Returns whether this release closed the association.
    pub(crate) async fn release_association(
        &self,
        association: &AssociationHandle,
    ) -> Result<bool> {
        let id = association.id();
        let mut associations = self.associations.lock().await;

        let current = matches!(
            associations.get(&id),
            Some((_, live)) if Arc::ptr_eq(live, association)
        );
        if !current {
            warn!(
                event = events::ASSOCIATION_RELEASE_STALE,
                association_id = %id,
                "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_RELEASE_TAG} handle refers to a torn-down association"
            );
            return Err(MuxError::Closed(id));
        }

        self.release_locked(&mut associations, id)
    }

    fn release_locked(
        &self,
        associations: &mut HashMap<AssociationId, (usize, AssociationHandle)>,
        id: AssociationId,
    ) -> Result<bool> {
        let active_num = {
            let Some((active, _)) = associations.get_mut(&id) else {
                warn!(
                    event = events::ASSOCIATION_RELEASE_UNKNOWN,
                    association_id = %id,
                    "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_RELEASE_TAG} no such association"
                );
                return Err(MuxError::NotFound(id));
            };
            *active -= 1;
            *active
        };

        debug!(
            event = events::ASSOCIATION_RELEASE,
            association_id = %id,
            references = active_num,
            "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_RELEASE_TAG} released reference"
        );
        self.lifecycle.publish(AssociationEvent::Released {
            id,
            references: active_num,
        });

        if active_num > 0 {
            return Ok(false);
        }

        if let Some((_, association)) = associations.remove(&id) {
            let discarded = association.close();
            if discarded > 0 {
                warn!(
                    association_id = %id,
                    discarded,
                    "{ASSOCIATION_REGISTRY_TAG}{ASSOCIATION_REGISTRY_FN_RELEASE_TAG} discarded undelivered messages"
                );
            }
            self.lifecycle
                .publish(AssociationEvent::Closed { id, discarded });
        }
        Ok(true)
    }

    pub async fn lookup(&self, id: AssociationId) -> Option<AssociationHandle> {
        self.associations
            .lock()
            .await
            .get(&id)
            .map(|(_, association)| association.clone())
    }

    /// Number of endpoints currently holding `id`.
    pub async fn references(&self, id: AssociationId) -> Option<usize> {
        self.associations
            .lock()
            .await
            .get(&id)
            .map(|(active, _)| *active)
    }

    pub async fn len(&self) -> usize {
        self.associations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.associations.lock().await.is_empty()
    }

    pub fn subscribe(&self) -> Receiver<AssociationEvent> {
        self.lifecycle.subscribe()
    }
}
