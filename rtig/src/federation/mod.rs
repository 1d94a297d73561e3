//! Federation execution coordinator
//!
//! One [`Federation`] is the broker's authoritative model of one running
//! execution. Every operation validates first, then mutates, then returns the
//! messages to send as [`Responses`]. Nothing here performs network I/O.
//!
//! The protocols live in submodules that each add an `impl Federation` block:
//! membership, time management, synchronization points, save/restore and the
//! object-model facing operations.

mod membership;
mod objects;
mod save;
mod sync;
mod time;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{Span, debug, info, info_span};

use crate::clock::ClockSet;
use crate::error::{FederationError, Result};
use crate::federate::Federate;
use crate::handle_allocator::HandleAllocator;
use crate::handles::{FederateHandle, FederationHandle, FederationTime, ObjectHandle};
use crate::message::{Message, Payload};
use crate::mom::MomMirror;
use crate::object_model::{Notice, ObjectModel};
use crate::persistence::SnapshotStore;
use crate::response::{Response, Responses};

/// Default upper bound of the federate handle domain
pub const DEFAULT_MAX_FEDERATES: u32 = 1024;

/// Default upper bound of the object handle domain
pub const DEFAULT_MAX_OBJECTS: u32 = 1 << 20;

/// Coordinator state for one federation execution
pub struct Federation {
    handle: FederationHandle,
    name: String,
    fom_id: String,
    span: Span,

    federates: BTreeMap<FederateHandle, Federate>,
    federate_handles: HandleAllocator<FederateHandle>,
    object_handles: HandleAllocator<ObjectHandle>,

    /// Pending synchronization label and its tag
    sync_labels: BTreeMap<String, String>,
    clocks: ClockSet,
    min_nerx: FederationTime,

    object_model: Box<dyn ObjectModel>,
    mom: Option<Box<dyn MomMirror>>,
    store: Arc<dyn SnapshotStore>,
    auto_provide: bool,

    saving: bool,
    save_label: String,
    save_status: bool,
    restoring: bool,
    restore_label: String,
    restore_status: bool,
}

impl std::fmt::Debug for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("federates", &self.federates.len())
            .field("sync_labels", &self.sync_labels)
            .field("saving", &self.saving)
            .field("restoring", &self.restoring)
            .finish()
    }
}

impl Federation {
    /// Create a federation around an already loaded object model
    pub fn new(
        handle: FederationHandle,
        name: impl Into<String>,
        fom_id: impl Into<String>,
        object_model: Box<dyn ObjectModel>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let name = name.into();
        let fom_id = fom_id.into();
        debug!(%handle, %name, %fom_id, "Federation::new: called");
        if handle.0 == 0 {
            return Err(FederationError::internal("Federation handle must not be zero"));
        }
        if name.is_empty() {
            return Err(FederationError::internal("Federation name must not be empty"));
        }

        let span = info_span!("federation", handle = %handle, name = %name);
        Ok(Self {
            handle,
            name,
            fom_id,
            span,
            federates: BTreeMap::new(),
            federate_handles: HandleAllocator::new(DEFAULT_MAX_FEDERATES),
            object_handles: HandleAllocator::new(DEFAULT_MAX_OBJECTS),
            sync_labels: BTreeMap::new(),
            clocks: ClockSet::new(),
            min_nerx: FederationTime::ZERO,
            object_model,
            mom: None,
            store,
            auto_provide: false,
            saving: false,
            save_label: String::new(),
            save_status: true,
            restoring: false,
            restore_label: String::new(),
            restore_status: true,
        })
    }

    /// Replace the logging span entered by every operation
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Bound the federate and object handle domains
    pub fn with_limits(mut self, max_federates: u32, max_objects: u32) -> Self {
        debug!(%max_federates, %max_objects, "Federation::with_limits: called");
        self.federate_handles = HandleAllocator::new(max_federates);
        self.object_handles = HandleAllocator::new(max_objects);
        self
    }

    /// Attach a management mirror under a freshly allocated federate handle
    pub fn enable_mom<F>(&mut self, build: F) -> Result<FederateHandle>
    where
        F: FnOnce(FederateHandle) -> Box<dyn MomMirror>,
    {
        let _span = self.span.clone().entered();
        debug!("Federation::enable_mom: called");
        if self.mom.is_some() {
            return Err(FederationError::internal("MOM already enabled"));
        }
        let handle = self.federate_handles.provide()?;
        self.mom = Some(build(handle));
        info!(mom = %handle, "MOM enabled");
        Ok(handle)
    }

    pub fn handle(&self) -> FederationHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fom_id(&self) -> &str {
        &self.fom_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Joined federates, not counting the MOM
    pub fn federate_count(&self) -> usize {
        self.federates.len()
    }

    pub fn regulator_count(&self) -> usize {
        self.clocks.len()
    }

    pub fn federate_handles(&self) -> Vec<FederateHandle> {
        self.federates.keys().copied().collect()
    }

    pub fn is_mom_enabled(&self) -> bool {
        self.mom.is_some()
    }

    pub fn mom_handle(&self) -> Option<FederateHandle> {
        self.mom.as_ref().map(|m| m.handle())
    }

    pub fn is_auto_provide_active(&self) -> bool {
        self.auto_provide
    }

    pub fn set_auto_provide(&mut self, enabled: bool) {
        let _span = self.span.clone().entered();
        debug!(%enabled, "Federation::set_auto_provide: called");
        self.auto_provide = enabled;
        self.notify_mom(|mom| mom.auto_provide_changed(enabled));
    }

    /// Ok when nobody is joined, otherwise lists who still is
    pub fn ensure_empty(&self) -> Result<()> {
        if self.federates.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = self.federates.values().map(Federate::name).collect();
        Err(FederationError::FederatesCurrentlyJoined(format!(
            "< {} >",
            names.join(" ")
        )))
    }

    pub fn federate(&self, handle: FederateHandle) -> Result<&Federate> {
        self.federates
            .get(&handle)
            .ok_or_else(|| FederationError::not_member(format!("Federate Handle <{}> not found.", handle)))
    }

    pub fn federate_by_name(&self, name: &str) -> Result<&Federate> {
        self.federates
            .values()
            .find(|f| f.name() == name)
            .ok_or_else(|| FederationError::not_member(format!("Federate <{}> not found.", name)))
    }

    fn federate_mut(&mut self, handle: FederateHandle) -> Result<&mut Federate> {
        self.federates
            .get_mut(&handle)
            .ok_or_else(|| FederationError::not_member(format!("Federate Handle <{}> not found.", handle)))
    }

    pub fn set_class_relevance_advisory_switch(&mut self, federate: FederateHandle, enabled: bool) -> Result<()> {
        let _span = self.span.clone().entered();
        debug!(%federate, %enabled, "Federation::set_class_relevance_advisory_switch: called");
        self.federate_mut(federate)?.set_class_relevance_advisory(enabled);
        Ok(())
    }

    /// Object model description for a joining federate
    pub fn serialized_fom(&self) -> serde_json::Value {
        self.object_model.serialized_fom()
    }

    pub fn object_model(&self) -> &dyn ObjectModel {
        self.object_model.as_ref()
    }

    fn message(&self, federate: FederateHandle, payload: Payload) -> Message {
        Message::new(self.handle, federate, payload)
    }

    /// Broadcast to every joined federate, optionally skipping one
    fn respond_to_all(&self, except: Option<FederateHandle>, federate: FederateHandle, payload: Payload) -> Response {
        Response::to_all_except(self.federates.keys().copied(), except, self.message(federate, payload))
    }

    fn respond_to(&self, recipient: FederateHandle, federate: FederateHandle, payload: Payload) -> Response {
        Response::to(recipient, self.message(federate, payload))
    }

    fn notify_mom(&mut self, notify: impl FnOnce(&mut dyn MomMirror)) {
        if let Some(mom) = self.mom.as_mut() {
            notify(mom.as_mut());
        }
    }

    /// Stamp object-model notices with this federation and serve the MOM in-process
    fn relay(&mut self, notices: Vec<Notice>) -> Responses {
        let mom_handle = self.mom_handle();
        let mut responses = Responses::new();
        for notice in notices {
            let mut recipients = notice.recipients;
            if let Some(mom) = mom_handle
                && recipients.contains(&mom)
            {
                recipients.retain(|h| *h != mom);
                responses.extend(self.feed_mom(notice.federate, &notice.payload));
            }
            if recipients.is_empty() {
                continue;
            }
            responses.push(Response::new(recipients, self.message(notice.federate, notice.payload)));
        }
        responses
    }

    /// Hand a payload addressed to the MOM to the mirror itself
    fn feed_mom(&mut self, from: FederateHandle, payload: &Payload) -> Responses {
        let Some(mom) = self.mom.as_mut() else {
            return Responses::new();
        };
        match payload {
            Payload::ReceiveInteraction {
                class,
                parameters,
                values,
                ..
            } => mom.process_interaction(from, *class, parameters, values),
            Payload::ProvideAttributeValueUpdate { object, attributes } => {
                mom.provide_attribute_value_update(*object, attributes)
            }
            other => {
                debug!(kind = ?other.message_type(), "Federation::feed_mom: ignored");
                Responses::new()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::handles::{AttributeHandle, InteractionClassHandle, ObjectClassHandle, ParameterHandle, SpaceHandle};
    use crate::object_model::InMemoryObjectModel;
    use crate::persistence::MemorySnapshotStore;

    pub const CLASS: ObjectClassHandle = ObjectClassHandle(1);
    pub const ATTR_A: AttributeHandle = AttributeHandle(1);
    pub const ATTR_B: AttributeHandle = AttributeHandle(2);
    pub const INTERACTION: InteractionClassHandle = InteractionClassHandle(1);
    pub const PARAM: ParameterHandle = ParameterHandle(1);
    pub const SPACE: SpaceHandle = SpaceHandle(1);

    pub fn object_model() -> Box<InMemoryObjectModel> {
        Box::new(
            InMemoryObjectModel::new()
                .with_object_class(CLASS, &[ATTR_A, ATTR_B])
                .with_interaction_class(INTERACTION, &[PARAM])
                .with_space(SPACE, 1),
        )
    }

    pub fn federation_with_store(store: Arc<dyn SnapshotStore>) -> Federation {
        Federation::new(FederationHandle(1), "Aircraft", "test.fed", object_model(), store).unwrap()
    }

    pub fn federation() -> Federation {
        federation_with_store(Arc::new(MemorySnapshotStore::new()))
    }

    /// Federation with the named federates joined, in order
    pub fn joined(names: &[&str]) -> (Federation, Vec<FederateHandle>) {
        let mut fed = federation();
        let handles = names.iter().map(|n| fed.add(n).unwrap().0).collect();
        (fed, handles)
    }

    pub fn kinds(responses: &Responses) -> Vec<crate::message::MessageType> {
        responses.iter().map(|r| r.message.message_type()).collect()
    }

    /// MOM that records what it was told
    #[derive(Default)]
    pub struct MomLog {
        pub events: Vec<String>,
    }

    pub struct RecordingMom {
        pub handle: FederateHandle,
        pub log: Arc<Mutex<MomLog>>,
    }

    impl RecordingMom {
        fn record(&self, event: String) {
            if let Ok(mut log) = self.log.lock() {
                log.events.push(event);
            }
        }
    }

    impl MomMirror for RecordingMom {
        fn handle(&self) -> FederateHandle {
            self.handle
        }

        fn federate_joined(&mut self, federate: FederateHandle, name: &str) {
            self.record(format!("joined {} {}", federate, name));
        }

        fn federate_resigned(&mut self, federate: FederateHandle) {
            self.record(format!("resigned {}", federate));
        }

        fn time_regulation_changed(&mut self, federate: FederateHandle, enabled: bool, _time: FederationTime) {
            self.record(format!("regulating {} {}", federate, enabled));
        }

        fn time_constrained_changed(&mut self, federate: FederateHandle, enabled: bool) {
            self.record(format!("constrained {} {}", federate, enabled));
        }

        fn save_changed(&mut self, in_progress: bool, label: &str) {
            self.record(format!("save {} {}", in_progress, label));
        }

        fn auto_provide_changed(&mut self, enabled: bool) {
            self.record(format!("auto-provide {}", enabled));
        }

        fn interaction_sent(&mut self, federate: FederateHandle, class: InteractionClassHandle) {
            self.record(format!("interaction {} {}", federate, class));
        }

        fn process_interaction(
            &mut self,
            from: FederateHandle,
            class: InteractionClassHandle,
            _parameters: &[ParameterHandle],
            _values: &[crate::handles::AttributeValue],
        ) -> Responses {
            self.record(format!("process {} {}", from, class));
            Responses::new()
        }

        fn provide_attribute_value_update(&mut self, object: ObjectHandle, _attributes: &[AttributeHandle]) -> Responses {
            self.record(format!("provide {}", object));
            Responses::new()
        }
    }

    pub fn with_mom(fed: &mut Federation) -> (FederateHandle, Arc<Mutex<MomLog>>) {
        let log = Arc::new(Mutex::new(MomLog::default()));
        let shared = log.clone();
        let handle = fed
            .enable_mom(move |handle| Box::new(RecordingMom { handle, log: shared }))
            .unwrap();
        (handle, log)
    }

    pub fn mom_events(log: &Arc<Mutex<MomLog>>) -> Vec<String> {
        log.lock().unwrap().events.clone()
    }
}
