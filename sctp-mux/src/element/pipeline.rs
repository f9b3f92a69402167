//! Pipeline: a named bin owning a bus and driving its children's lifecycle.

use crate::control_plane::association_registry::AssociationRegistry;
use crate::data_plane::endpoint::EndpointRole;
use crate::element::bus::Bus;
use crate::element::{Element, ElementCore, StateTransition};
use crate::error::{MuxError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

const PIPELINE_TAG: &str = "Pipeline:";
const PIPELINE_FN_CHANGE_STATE_TAG: &str = "change_state:";

pub const PIPELINE_FACTORY: &str = "pipeline";

pub struct Pipeline {
    core: ElementCore,
    bus: Arc<Bus>,
    registry: Arc<AssociationRegistry>,
    children: Mutex<Vec<Arc<dyn Element>>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, registry: Arc<AssociationRegistry>) -> Self {
        let bus = Arc::new(Bus::new());
        let core = ElementCore::new(name, PIPELINE_FACTORY);
        core.attach_bus(bus.clone());
        Self {
            core,
            bus,
            registry,
            children: Mutex::new(Vec::new()),
        }
    }

    pub fn bus(&self) -> Arc<Bus> {
        self.bus.clone()
    }

    pub fn registry(&self) -> &Arc<AssociationRegistry> {
        &self.registry
    }

    fn children(&self) -> MutexGuard<'_, Vec<Arc<dyn Element>>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `element` and routes its bus messages to this pipeline's bus.
    /// Names must be unique within the pipeline.
    pub fn add(&self, element: Arc<dyn Element>) -> Result<()> {
        let mut children = self.children();
        if children.iter().any(|child| child.name() == element.name()) {
            return Err(MuxError::InvalidState(format!(
                "{}: an element named {} is already present",
                self.core.name(),
                element.name()
            )));
        }
        element.core().attach_bus(self.bus.clone());
        children.push(element);
        Ok(())
    }

    pub fn add_many<I>(&self, elements: I) -> Result<()>
    where
        I: IntoIterator<Item = Arc<dyn Element>>,
    {
        for element in elements {
            self.add(element)?;
        }
        Ok(())
    }

    pub fn element(&self, name: &str) -> Option<Arc<dyn Element>> {
        self.children()
            .iter()
            .find(|child| child.name() == name)
            .cloned()
    }

    /// Typed lookup, e.g. `pipeline.by_name::<SctpEnc>("sctpenc")`.
    pub fn by_name<E: Element + 'static>(&self, name: &str) -> Option<Arc<E>> {
        self.element(name)?.into_any().downcast::<E>().ok()
    }

    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    /// Downstream (consumer) elements activate before upstream ones, and
    /// deactivate after them.
    fn ordered_children(&self, transition: StateTransition) -> Vec<Arc<dyn Element>> {
        let mut children = self.children().clone();
        let rank = |element: &Arc<dyn Element>| match element.role() {
            Some(EndpointRole::Consumer) => 0,
            None => 1,
            Some(EndpointRole::Producer) => 2,
        };
        children.sort_by_key(rank);
        if !transition.is_upward() {
            children.reverse();
        }
        children
    }
}

#[async_trait]
impl Element for Pipeline {
    fn core(&self) -> &ElementCore {
        &self.core
    }

    async fn change_state(&self, transition: StateTransition) -> Result<()> {
        let children = self.ordered_children(transition);
        let target = transition.next_state();

        if transition.is_upward() {
            for (position, child) in children.iter().enumerate() {
                if let Err(err) = child.set_state(target).await {
                    warn!(
                        "{PIPELINE_TAG}{PIPELINE_FN_CHANGE_STATE_TAG} {} failed {transition:?}, rolling back {} elements",
                        child.name(),
                        position
                    );
                    for activated in children[..position].iter().rev() {
                        if let Err(rollback_err) = activated.set_state(transition.current()).await
                        {
                            warn!(
                                "{PIPELINE_TAG}{PIPELINE_FN_CHANGE_STATE_TAG} rollback of {} failed: {rollback_err}",
                                activated.name()
                            );
                        }
                    }
                    return Err(err);
                }
            }
        } else if transition == StateTransition::ReadyToNull {
            // Release order decides which side closes a shared association:
            // producers go first so the decoder sees end-of-stream.
            let mut first_err = None;
            for child in &children {
                if let Err(err) = child.set_state(target).await {
                    first_err.get_or_insert(err);
                }
            }
            if let Some(err) = first_err {
                return Err(err);
            }
        } else {
            let results = join_all(children.iter().map(|child| child.set_state(target))).await;
            if let Some(err) = results.into_iter().find_map(|result| result.err()) {
                return Err(err);
            }
        }

        debug!(
            "{PIPELINE_TAG}{PIPELINE_FN_CHANGE_STATE_TAG} {} completed {transition:?} for {} elements",
            self.core.name(),
            children.len()
        );
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Pipeline;
    use crate::config::MuxConfig;
    use crate::control_plane::association_registry::AssociationRegistry;
    use crate::data_plane::message::AssociationId;
    use crate::element::bus::{BusMessage, BusMessageKind};
    use crate::element::sctp_dec::SctpDec;
    use crate::element::sctp_enc::SctpEnc;
    use crate::element::{Element, ElementState};
    use crate::error::MuxError;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry(max_associations: usize) -> Arc<AssociationRegistry> {
        Arc::new(
            AssociationRegistry::new(MuxConfig {
                max_associations,
                ..Default::default()
            })
            .expect("valid config"),
        )
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let registry = registry(4);
        let pipeline = Pipeline::new("dup", registry.clone());

        pipeline
            .add(Arc::new(SctpEnc::with_name("enc", registry.clone())))
            .expect("first add");
        assert!(matches!(
            pipeline.add(Arc::new(SctpEnc::with_name("enc", registry))),
            Err(MuxError::InvalidState(_))
        ));
        assert_eq!(pipeline.len(), 1);
    }

    #[tokio::test]
    async fn by_name_downcasts_to_concrete_element() {
        let registry = registry(4);
        let pipeline = Pipeline::new("lookup", registry.clone());
        pipeline
            .add(Arc::new(SctpDec::with_name("dec", registry)))
            .expect("add");

        assert!(pipeline.by_name::<SctpDec>("dec").is_some());
        assert!(pipeline.by_name::<SctpEnc>("dec").is_none());
        assert!(pipeline.by_name::<SctpDec>("missing").is_none());
    }

    #[tokio::test]
    async fn failed_activation_rolls_back_and_reports_error() {
        // Room for one association only: the second pair cannot bind.
        let registry = registry(1);
        let pipeline = Pipeline::new("rollback", registry.clone());

        let dec1 = Arc::new(SctpDec::with_name("dec1", registry.clone()));
        let dec2 = Arc::new(SctpDec::with_name("dec2", registry.clone()));
        dec1.set_association_id(1).expect("set id");
        dec2.set_association_id(2).expect("set id");
        pipeline.add(dec1.clone()).expect("add");
        pipeline.add(dec2.clone()).expect("add");

        let result = pipeline.set_state(ElementState::Playing).await;

        assert_eq!(result, Err(MuxError::ResourceExhausted { limit: 1 }));
        assert_eq!(pipeline.current_state(), ElementState::Null);
        assert_eq!(dec1.current_state(), ElementState::Null);
        assert_eq!(dec2.current_state(), ElementState::Null);
        assert!(registry.lookup(AssociationId::new(1)).await.is_none());

        let error = pipeline
            .bus()
            .timed_pop_filtered(Some(Duration::from_secs(1)), &[BusMessageKind::Error])
            .await
            .expect("error message");
        assert!(matches!(error, BusMessage::Error { .. }));
    }
}
