//! Live federation executions of one broker

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::error::{FederationError, Result};
use crate::federation::{DEFAULT_MAX_FEDERATES, DEFAULT_MAX_OBJECTS, Federation};
use crate::handle_allocator::HandleAllocator;
use crate::handles::{FederateHandle, FederationHandle};
use crate::mom::MomMirror;
use crate::object_model::ObjectModel;
use crate::persistence::SnapshotStore;
use crate::response::Responses;

/// Default upper bound of the federation handle domain
pub const DEFAULT_MAX_FEDERATIONS: u32 = 256;

/// Builds the management mirror of a new federation from its federate handle
pub type MomFactory = Box<dyn FnOnce(FederateHandle) -> Box<dyn MomMirror> + Send>;

/// Every federation execution the broker currently runs
pub struct FederationsList {
    federations: BTreeMap<FederationHandle, Federation>,
    handles: HandleAllocator<FederationHandle>,
    store: Arc<dyn SnapshotStore>,
    max_federates: u32,
    max_objects: u32,
}

impl std::fmt::Debug for FederationsList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationsList")
            .field("federations", &self.federations)
            .finish()
    }
}

impl FederationsList {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        debug!("FederationsList::new: called");
        Self {
            federations: BTreeMap::new(),
            handles: HandleAllocator::new(DEFAULT_MAX_FEDERATIONS),
            store,
            max_federates: DEFAULT_MAX_FEDERATES,
            max_objects: DEFAULT_MAX_OBJECTS,
        }
    }

    /// Bound the handle domains of this list and of every federation it creates
    pub fn with_limits(mut self, max_federations: u32, max_federates: u32, max_objects: u32) -> Self {
        self.handles = HandleAllocator::new(max_federations);
        self.max_federates = max_federates;
        self.max_objects = max_objects;
        self
    }

    pub fn create_federation(
        &mut self,
        name: &str,
        fom_id: &str,
        object_model: Box<dyn ObjectModel>,
        mom: Option<MomFactory>,
    ) -> Result<FederationHandle> {
        debug!(%name, %fom_id, mom = mom.is_some(), "FederationsList::create_federation: called");
        if name.is_empty() {
            return Err(FederationError::internal("Federation name must not be empty"));
        }
        if self.handle_of(name).is_ok() {
            return Err(FederationError::FederationExecutionAlreadyExists(name.to_string()));
        }

        let handle = self.handles.provide()?;
        let span = info_span!("federation", handle = %handle, name = %name);
        let federation = Federation::new(handle, name, fom_id, object_model, self.store.clone())
            .map(|f| f.with_span(span).with_limits(self.max_federates, self.max_objects));
        let mut federation = match federation {
            Ok(federation) => federation,
            Err(e) => {
                self.handles.free(handle)?;
                return Err(e);
            }
        };

        if let Some(build) = mom
            && let Err(e) = federation.enable_mom(build)
        {
            self.handles.free(handle)?;
            return Err(e);
        }

        self.federations.insert(handle, federation);
        info!(federation = %handle, %name, "Federation created");
        Ok(handle)
    }

    /// Destroy an empty federation
    pub fn destroy_federation(&mut self, handle: FederationHandle) -> Result<()> {
        debug!(federation = %handle, "FederationsList::destroy_federation: called");
        self.get(handle)?.ensure_empty()?;
        self.federations.remove(&handle);
        self.handles.free(handle)?;
        info!(federation = %handle, "Federation destroyed");
        Ok(())
    }

    pub fn get(&self, handle: FederationHandle) -> Result<&Federation> {
        self.federations.get(&handle).ok_or_else(|| unknown(handle))
    }

    pub fn get_mut(&mut self, handle: FederationHandle) -> Result<&mut Federation> {
        self.federations.get_mut(&handle).ok_or_else(|| unknown(handle))
    }

    pub fn handle_of(&self, name: &str) -> Result<FederationHandle> {
        self.federations
            .values()
            .find(|f| f.name() == name)
            .map(Federation::handle)
            .ok_or_else(|| FederationError::FederationExecutionDoesNotExist(name.to_string()))
    }

    /// Forced removal of a federate after its link broke
    pub fn kill_federate(&mut self, federation: FederationHandle, federate: FederateHandle) -> Responses {
        debug!(%federation, %federate, "FederationsList::kill_federate: called");
        match self.federations.get_mut(&federation) {
            Some(f) => f.kill(federate),
            None => {
                warn!(%federation, %federate, "Kill requested for unknown federation");
                Responses::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.federations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.federations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Federation> {
        self.federations.values()
    }
}

fn unknown(handle: FederationHandle) -> FederationError {
    FederationError::FederationExecutionDoesNotExist(format!("Federation handle <{}>", handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::handles::{AttributeHandle, ObjectClassHandle};
    use crate::object_model::InMemoryObjectModel;
    use crate::persistence::MemorySnapshotStore;

    struct QuietMom(FederateHandle);

    impl MomMirror for QuietMom {
        fn handle(&self) -> FederateHandle {
            self.0
        }
    }

    fn list() -> FederationsList {
        FederationsList::new(Arc::new(MemorySnapshotStore::new()))
    }

    fn model() -> Box<dyn ObjectModel> {
        Box::new(InMemoryObjectModel::new().with_object_class(ObjectClassHandle(1), &[AttributeHandle(1)]))
    }

    #[test]
    fn test_create_and_lookup() {
        let mut list = list();
        let a = list.create_federation("Aircraft", "a.fed", model(), None).unwrap();
        let b = list.create_federation("Ships", "s.fed", model(), None).unwrap();
        assert_ne!(a, b);
        assert_eq!(list.len(), 2);
        assert_eq!(list.handle_of("Ships").unwrap(), b);
        assert_eq!(list.get(a).unwrap().fom_id(), "a.fed");
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let mut list = list();
        list.create_federation("Aircraft", "a.fed", model(), None).unwrap();
        let err = list.create_federation("Aircraft", "a.fed", model(), None).unwrap_err();
        assert!(matches!(err, FederationError::FederationExecutionAlreadyExists(_)));
        assert!(list.create_federation("", "a.fed", model(), None).is_err());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_destroy_requires_empty() {
        let mut list = list();
        let handle = list.create_federation("Aircraft", "a.fed", model(), None).unwrap();
        let (federate, _) = list.get_mut(handle).unwrap().add("alpha").unwrap();

        let err = list.destroy_federation(handle).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolPrecondition);

        list.get_mut(handle).unwrap().remove(federate).unwrap();
        list.destroy_federation(handle).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.get(handle).unwrap_err().kind(), ErrorKind::NotExecutionMember);
    }

    #[test]
    fn test_mom_is_enabled_at_creation() {
        let mut list = list();
        let mom: MomFactory = Box::new(|h| Box::new(QuietMom(h)));
        let handle = list.create_federation("Aircraft", "a.fed", model(), Some(mom)).unwrap();
        let federation = list.get(handle).unwrap();
        assert!(federation.is_mom_enabled());
        assert_eq!(federation.federate_count(), 0);
    }

    #[test]
    fn test_kill_federate_in_unknown_federation() {
        let mut list = list();
        assert!(list.kill_federate(FederationHandle(3), FederateHandle(1)).is_empty());
    }

    #[test]
    fn test_limits_apply_to_new_federations() {
        let mut list = list().with_limits(1, 1, 1);
        let handle = list.create_federation("Aircraft", "a.fed", model(), None).unwrap();
        assert!(list.create_federation("Ships", "s.fed", model(), None).is_err());

        let federation = list.get_mut(handle).unwrap();
        federation.add("alpha").unwrap();
        assert!(federation.add("beta").is_err());
    }
}
