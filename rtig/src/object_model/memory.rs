//! In-memory object model
//!
//! Flat class table (no inheritance), instances in an arena keyed by handle,
//! and every cross reference held as a handle. Used by tests and by callers
//! that do not load a FOM.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;
use tracing::debug;

use super::{Extent, Notice, ObjectModel, ObjectModelError, ObjectModelResult};
use crate::handles::{
    AttributeHandle, AttributeValue, FederateHandle, FederationTime, InteractionClassHandle,
    ObjectClassHandle, ObjectHandle, ParameterHandle, RegionHandle, SpaceHandle,
};
use crate::message::Payload;

#[derive(Debug, Default)]
struct ClassAttribute {
    publishers: BTreeSet<FederateHandle>,
    /// Subscriber and the region it subscribed with, if any
    subscribers: BTreeMap<FederateHandle, Option<RegionHandle>>,
}

#[derive(Debug, Default)]
struct ObjectClass {
    attributes: BTreeMap<AttributeHandle, ClassAttribute>,
    instances: BTreeSet<ObjectHandle>,
}

impl ObjectClass {
    fn subscribers(&self) -> BTreeSet<FederateHandle> {
        self.attributes
            .values()
            .flat_map(|a| a.subscribers.keys().copied())
            .collect()
    }

    fn is_publisher(&self, federate: FederateHandle) -> bool {
        self.attributes.values().any(|a| a.publishers.contains(&federate))
    }

    fn is_subscriber(&self, federate: FederateHandle) -> bool {
        self.attributes
            .values()
            .any(|a| a.subscribers.contains_key(&federate))
    }
}

#[derive(Debug, Default)]
struct InteractionClass {
    parameters: BTreeSet<ParameterHandle>,
    publishers: BTreeSet<FederateHandle>,
    subscribers: BTreeMap<FederateHandle, Option<RegionHandle>>,
}

#[derive(Debug, Default)]
struct InstanceAttribute {
    owner: FederateHandle,
    divesting: bool,
    /// Federates waiting for the owner to release, first come first served
    acquirers: Vec<FederateHandle>,
    region: Option<RegionHandle>,
}

#[derive(Debug)]
struct Instance {
    class: ObjectClassHandle,
    name: String,
    /// Holder of the delete privilege
    owner: FederateHandle,
    attributes: BTreeMap<AttributeHandle, InstanceAttribute>,
}

#[derive(Debug)]
struct Region {
    owner: FederateHandle,
    space: SpaceHandle,
    extents: Vec<Extent>,
}

/// Reference [`ObjectModel`] implementation
#[derive(Debug, Default)]
pub struct InMemoryObjectModel {
    classes: BTreeMap<ObjectClassHandle, ObjectClass>,
    interactions: BTreeMap<InteractionClassHandle, InteractionClass>,
    /// Routing space and its number of dimensions
    spaces: BTreeMap<SpaceHandle, usize>,
    objects: BTreeMap<ObjectHandle, Instance>,
    names: BTreeMap<String, ObjectHandle>,
    reservations: BTreeMap<String, FederateHandle>,
    regions: BTreeMap<RegionHandle, Region>,
    last_region: u32,
}

/// Group attributes per federate, preserving the request order inside a group
fn push_grouped(
    groups: &mut BTreeMap<FederateHandle, Vec<AttributeHandle>>,
    federate: FederateHandle,
    attribute: AttributeHandle,
) {
    groups.entry(federate).or_default().push(attribute);
}

impl InMemoryObjectModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an object class with its attributes
    pub fn with_object_class(mut self, class: ObjectClassHandle, attributes: &[AttributeHandle]) -> Self {
        debug!(%class, ?attributes, "InMemoryObjectModel::with_object_class: called");
        let oc = self.classes.entry(class).or_default();
        for attribute in attributes {
            oc.attributes.entry(*attribute).or_default();
        }
        self
    }

    /// Declare an interaction class with its parameters
    pub fn with_interaction_class(mut self, class: InteractionClassHandle, parameters: &[ParameterHandle]) -> Self {
        debug!(%class, ?parameters, "InMemoryObjectModel::with_interaction_class: called");
        let ic = self.interactions.entry(class).or_default();
        ic.parameters.extend(parameters.iter().copied());
        self
    }

    /// Declare a routing space
    pub fn with_space(mut self, space: SpaceHandle, dimensions: usize) -> Self {
        debug!(%space, %dimensions, "InMemoryObjectModel::with_space: called");
        self.spaces.insert(space, dimensions);
        self
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_name(&self, object: ObjectHandle) -> Option<&str> {
        self.objects.get(&object).map(|o| o.name.as_str())
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn class(&self, class: ObjectClassHandle) -> ObjectModelResult<&ObjectClass> {
        self.classes
            .get(&class)
            .ok_or(ObjectModelError::ObjectClassNotDefined(class))
    }

    fn instance(&self, object: ObjectHandle) -> ObjectModelResult<&Instance> {
        self.objects
            .get(&object)
            .ok_or(ObjectModelError::ObjectNotKnown(object))
    }

    fn instance_attribute(
        &self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> ObjectModelResult<&InstanceAttribute> {
        let inst = self.instance(object)?;
        inst.attributes
            .get(&attribute)
            .ok_or(ObjectModelError::AttributeNotDefined {
                class: inst.class,
                attribute,
            })
    }

    fn instance_attribute_mut(
        &mut self,
        object: ObjectHandle,
        attribute: AttributeHandle,
    ) -> ObjectModelResult<&mut InstanceAttribute> {
        let inst = self
            .objects
            .get_mut(&object)
            .ok_or(ObjectModelError::ObjectNotKnown(object))?;
        let class = inst.class;
        inst.attributes
            .get_mut(&attribute)
            .ok_or(ObjectModelError::AttributeNotDefined { class, attribute })
    }

    fn check_region(&self, region: Option<RegionHandle>) -> ObjectModelResult<()> {
        match region {
            Some(r) if !self.regions.contains_key(&r) => Err(ObjectModelError::RegionNotKnown(r)),
            _ => Ok(()),
        }
    }

    fn check_extents(&self, space: SpaceHandle, extents: &[Extent]) -> ObjectModelResult<()> {
        let dimensions = *self
            .spaces
            .get(&space)
            .ok_or(ObjectModelError::SpaceNotDefined(space))?;
        for extent in extents {
            if extent.len() != dimensions {
                return Err(ObjectModelError::InvalidExtents(format!(
                    "space {} has {} dimensions, extent has {}",
                    space,
                    dimensions,
                    extent.len()
                )));
            }
            if extent.iter().any(|r| r.lower > r.upper) {
                return Err(ObjectModelError::InvalidExtents(
                    "lower bound above upper bound".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn owned_region(&self, federate: FederateHandle, region: RegionHandle) -> ObjectModelResult<&Region> {
        self.regions
            .get(&region)
            .filter(|r| r.owner == federate)
            .ok_or(ObjectModelError::RegionNotKnown(region))
    }

    /// Whether two regions share a space and at least one overlapping extent
    fn regions_overlap(&self, a: RegionHandle, b: RegionHandle) -> bool {
        let (Some(ra), Some(rb)) = (self.regions.get(&a), self.regions.get(&b)) else {
            return false;
        };
        ra.space == rb.space
            && ra.extents.iter().any(|ea| {
                rb.extents
                    .iter()
                    .any(|eb| ea.iter().zip(eb.iter()).all(|(x, y)| x.overlaps(y)))
            })
    }

    /// An absent region is the whole space
    fn sees(&self, subscription: Option<RegionHandle>, update: Option<RegionHandle>) -> bool {
        match (subscription, update) {
            (Some(s), Some(u)) => self.regions_overlap(s, u),
            _ => true,
        }
    }

    fn is_attribute_publisher(
        &self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    ) -> bool {
        self.classes
            .get(&class)
            .and_then(|oc| oc.attributes.get(&attribute))
            .is_some_and(|a| a.publishers.contains(&federate))
    }

    fn check_owned(
        &self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<()> {
        for attribute in attributes {
            if self.instance_attribute(object, *attribute)?.owner != federate {
                return Err(ObjectModelError::AttributeNotOwned {
                    object,
                    attribute: *attribute,
                });
            }
        }
        Ok(())
    }

    /// Acquirer-side validation shared by both acquisition flavors
    fn check_acquirable(
        &self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<()> {
        let class = self.instance(object)?.class;
        for attribute in attributes {
            let attr = self.instance_attribute(object, *attribute)?;
            if attr.owner == federate {
                return Err(ObjectModelError::AttributeAlreadyOwned {
                    object,
                    attribute: *attribute,
                });
            }
            if !self.is_attribute_publisher(federate, class, *attribute) {
                return Err(ObjectModelError::AttributeNotPublished {
                    object,
                    attribute: *attribute,
                });
            }
        }
        Ok(())
    }

    /// Hand each attribute with a waiting acquirer to the first one in line
    fn transfer_to_acquirers(
        &mut self,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<BTreeMap<FederateHandle, Vec<AttributeHandle>>> {
        let mut acquired = BTreeMap::new();
        for attribute in attributes {
            let attr = self.instance_attribute_mut(object, *attribute)?;
            if attr.acquirers.is_empty() {
                continue;
            }
            let new_owner = attr.acquirers.remove(0);
            attr.owner = new_owner;
            attr.divesting = false;
            push_grouped(&mut acquired, new_owner, *attribute);
        }
        Ok(acquired)
    }

    /// Remove an instance and tell its class subscribers
    fn remove_instance(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        date: Option<FederationTime>,
        tag: &str,
    ) -> Option<Notice> {
        let inst = self.objects.remove(&object)?;
        self.names.remove(&inst.name);
        let oc = self.classes.get_mut(&inst.class)?;
        oc.instances.remove(&object);

        let recipients: Vec<_> = oc.subscribers().into_iter().filter(|h| *h != federate).collect();
        if recipients.is_empty() {
            return None;
        }
        Some(Notice::new(
            recipients,
            federate,
            Payload::RemoveObject {
                object,
                date,
                tag: tag.to_string(),
            },
        ))
    }
}

fn acquisition_notices(
    object: ObjectHandle,
    source: FederateHandle,
    acquired: BTreeMap<FederateHandle, Vec<AttributeHandle>>,
) -> impl Iterator<Item = Notice> {
    acquired.into_iter().map(move |(owner, attributes)| {
        Notice::to(
            owner,
            source,
            Payload::AttributeOwnershipAcquisitionNotification { object, attributes },
        )
    })
}

impl ObjectModel for InMemoryObjectModel {
    fn publish_object_class(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
        publish: bool,
    ) -> ObjectModelResult<()> {
        debug!(%federate, %class, ?attributes, %publish, "InMemoryObjectModel::publish_object_class: called");
        let oc = self
            .classes
            .get_mut(&class)
            .ok_or(ObjectModelError::ObjectClassNotDefined(class))?;

        if publish {
            if let Some(attribute) = attributes.iter().find(|a| !oc.attributes.contains_key(a)) {
                return Err(ObjectModelError::AttributeNotDefined {
                    class,
                    attribute: *attribute,
                });
            }
            for (handle, attr) in oc.attributes.iter_mut() {
                if attributes.contains(handle) {
                    attr.publishers.insert(federate);
                } else {
                    attr.publishers.remove(&federate);
                }
            }
        } else {
            if !oc.is_publisher(federate) {
                return Err(ObjectModelError::ObjectClassNotPublished(class));
            }
            for attr in oc.attributes.values_mut() {
                attr.publishers.remove(&federate);
            }
        }
        Ok(())
    }

    fn subscribe_object_class(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        attributes: &[AttributeHandle],
        subscribe: bool,
        region: Option<RegionHandle>,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %class, ?attributes, %subscribe, ?region, "InMemoryObjectModel::subscribe_object_class: called");
        self.check_region(region)?;
        let oc = self
            .classes
            .get_mut(&class)
            .ok_or(ObjectModelError::ObjectClassNotDefined(class))?;

        if !subscribe {
            if !oc.is_subscriber(federate) {
                return Err(ObjectModelError::ObjectClassNotSubscribed(class));
            }
            for attr in oc.attributes.values_mut() {
                attr.subscribers.remove(&federate);
            }
            return Ok(Vec::new());
        }

        if let Some(attribute) = attributes.iter().find(|a| !oc.attributes.contains_key(a)) {
            return Err(ObjectModelError::AttributeNotDefined {
                class,
                attribute: *attribute,
            });
        }

        let was_subscriber = oc.is_subscriber(federate);
        for (handle, attr) in oc.attributes.iter_mut() {
            if attributes.contains(handle) {
                attr.subscribers.insert(federate, region);
            } else {
                attr.subscribers.remove(&federate);
            }
        }

        if was_subscriber || attributes.is_empty() {
            return Ok(Vec::new());
        }

        // First subscription: the federate discovers what already exists
        let notices = oc
            .instances
            .iter()
            .filter_map(|object| self.objects.get(object).map(|inst| (*object, inst)))
            .filter(|(_, inst)| inst.owner != federate)
            .map(|(object, inst)| {
                Notice::to(
                    federate,
                    inst.owner,
                    Payload::DiscoverObject {
                        object,
                        class,
                        name: inst.name.clone(),
                    },
                )
            })
            .collect();
        Ok(notices)
    }

    fn class_publishers(&self, class: ObjectClassHandle) -> ObjectModelResult<BTreeSet<FederateHandle>> {
        let oc = self.class(class)?;
        Ok(oc
            .attributes
            .values()
            .flat_map(|a| a.publishers.iter().copied())
            .collect())
    }

    fn publish_interaction_class(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        publish: bool,
    ) -> ObjectModelResult<()> {
        debug!(%federate, %class, %publish, "InMemoryObjectModel::publish_interaction_class: called");
        let ic = self
            .interactions
            .get_mut(&class)
            .ok_or(ObjectModelError::InteractionClassNotDefined(class))?;
        if publish {
            ic.publishers.insert(federate);
        } else if !ic.publishers.remove(&federate) {
            return Err(ObjectModelError::InteractionClassNotPublished(class));
        }
        Ok(())
    }

    fn subscribe_interaction_class(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        subscribe: bool,
        region: Option<RegionHandle>,
    ) -> ObjectModelResult<()> {
        debug!(%federate, %class, %subscribe, ?region, "InMemoryObjectModel::subscribe_interaction_class: called");
        self.check_region(region)?;
        let ic = self
            .interactions
            .get_mut(&class)
            .ok_or(ObjectModelError::InteractionClassNotDefined(class))?;
        if subscribe {
            ic.subscribers.insert(federate, region);
        } else if ic.subscribers.remove(&federate).is_none() {
            return Err(ObjectModelError::InteractionClassNotSubscribed(class));
        }
        Ok(())
    }

    fn is_interaction_subscriber(&self, federate: FederateHandle, class: InteractionClassHandle) -> bool {
        self.interactions
            .get(&class)
            .is_some_and(|ic| ic.subscribers.contains_key(&federate))
    }

    fn reserve_object_instance_name(&mut self, federate: FederateHandle, name: &str) -> ObjectModelResult<bool> {
        debug!(%federate, %name, "InMemoryObjectModel::reserve_object_instance_name: called");
        if name.is_empty()
            || name.starts_with("HLA")
            || self.names.contains_key(name)
            || self.reservations.contains_key(name)
        {
            return Ok(false);
        }
        self.reservations.insert(name.to_string(), federate);
        Ok(true)
    }

    fn register_object(
        &mut self,
        federate: FederateHandle,
        class: ObjectClassHandle,
        object: ObjectHandle,
        name: &str,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %class, %object, %name, "InMemoryObjectModel::register_object: called");
        let oc = self.class(class)?;
        if !oc.is_publisher(federate) {
            return Err(ObjectModelError::ObjectClassNotPublished(class));
        }
        if self.objects.contains_key(&object) || self.names.contains_key(name) {
            return Err(ObjectModelError::ObjectAlreadyRegistered(name.to_string()));
        }
        if self.reservations.get(name).is_some_and(|holder| *holder != federate) {
            return Err(ObjectModelError::ObjectAlreadyRegistered(name.to_string()));
        }

        let attributes = oc
            .attributes
            .iter()
            .map(|(handle, attr)| {
                let owner = if attr.publishers.contains(&federate) {
                    federate
                } else {
                    FederateHandle::ANONYMOUS
                };
                (
                    *handle,
                    InstanceAttribute {
                        owner,
                        ..Default::default()
                    },
                )
            })
            .collect();
        let recipients: Vec<_> = oc.subscribers().into_iter().filter(|h| *h != federate).collect();

        self.reservations.remove(name);
        self.names.insert(name.to_string(), object);
        self.objects.insert(
            object,
            Instance {
                class,
                name: name.to_string(),
                owner: federate,
                attributes,
            },
        );
        if let Some(oc) = self.classes.get_mut(&class) {
            oc.instances.insert(object);
        }

        if recipients.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Notice::new(
            recipients,
            federate,
            Payload::DiscoverObject {
                object,
                class,
                name: name.to_string(),
            },
        )])
    }

    fn delete_object(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        date: Option<FederationTime>,
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, "InMemoryObjectModel::delete_object: called");
        if self.instance(object)?.owner != federate {
            return Err(ObjectModelError::DeletePrivilegeNotHeld(object));
        }
        Ok(self.remove_instance(federate, object, date, tag).into_iter().collect())
    }

    fn object_class_of(&self, object: ObjectHandle) -> ObjectModelResult<ObjectClassHandle> {
        Ok(self.instance(object)?.class)
    }

    fn class_instances(&self, class: ObjectClassHandle) -> ObjectModelResult<Vec<ObjectHandle>> {
        Ok(self.class(class)?.instances.iter().copied().collect())
    }

    fn attribute_owner(&self, object: ObjectHandle, attribute: AttributeHandle) -> ObjectModelResult<FederateHandle> {
        Ok(self.instance_attribute(object, attribute)?.owner)
    }

    fn object_owner(&self, object: ObjectHandle) -> ObjectModelResult<FederateHandle> {
        Ok(self.instance(object)?.owner)
    }

    fn update_attribute_values(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        values: &[AttributeValue],
        date: Option<FederationTime>,
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::update_attribute_values: called");
        if attributes.len() != values.len() {
            return Err(ObjectModelError::ValueCountMismatch {
                expected: attributes.len(),
                found: values.len(),
            });
        }
        self.check_owned(federate, object, attributes)?;

        let inst = self.instance(object)?;
        let oc = self.class(inst.class)?;

        // Each subscriber reflects only the attributes it subscribed to and can see
        let mut reflections: BTreeMap<FederateHandle, (Vec<AttributeHandle>, Vec<AttributeValue>)> =
            BTreeMap::new();
        for (attribute, value) in attributes.iter().zip(values) {
            let Some(class_attr) = oc.attributes.get(attribute) else {
                continue;
            };
            let update_region = inst.attributes.get(attribute).and_then(|a| a.region);
            for (subscriber, region) in &class_attr.subscribers {
                if *subscriber == federate || !self.sees(*region, update_region) {
                    continue;
                }
                let entry = reflections.entry(*subscriber).or_default();
                entry.0.push(*attribute);
                entry.1.push(value.clone());
            }
        }

        Ok(reflections
            .into_iter()
            .map(|(subscriber, (attributes, values))| {
                Notice::to(
                    subscriber,
                    federate,
                    Payload::ReflectAttributeValues {
                        object,
                        attributes,
                        values,
                        date,
                        tag: tag.to_string(),
                    },
                )
            })
            .collect())
    }

    fn send_interaction(
        &mut self,
        federate: FederateHandle,
        class: InteractionClassHandle,
        parameters: &[ParameterHandle],
        values: &[AttributeValue],
        date: Option<FederationTime>,
        region: Option<RegionHandle>,
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %class, ?parameters, ?region, "InMemoryObjectModel::send_interaction: called");
        self.check_region(region)?;
        let ic = self
            .interactions
            .get(&class)
            .ok_or(ObjectModelError::InteractionClassNotDefined(class))?;
        if !ic.publishers.contains(&federate) {
            return Err(ObjectModelError::InteractionClassNotPublished(class));
        }
        if let Some(parameter) = parameters.iter().find(|p| !ic.parameters.contains(p)) {
            return Err(ObjectModelError::InteractionParameterNotDefined {
                class,
                parameter: *parameter,
            });
        }
        if parameters.len() != values.len() {
            return Err(ObjectModelError::ValueCountMismatch {
                expected: parameters.len(),
                found: values.len(),
            });
        }

        let recipients: Vec<_> = ic
            .subscribers
            .iter()
            .filter(|(subscriber, sub_region)| **subscriber != federate && self.sees(**sub_region, region))
            .map(|(subscriber, _)| *subscriber)
            .collect();
        if recipients.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Notice::new(
            recipients,
            federate,
            Payload::ReceiveInteraction {
                class,
                parameters: parameters.to_vec(),
                values: values.to_vec(),
                date,
                region,
                tag: tag.to_string(),
            },
        )])
    }

    fn negotiated_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::negotiated_divestiture: called");
        self.check_owned(federate, object, attributes)?;
        let class = self.instance(object)?.class;

        let acquired = self.transfer_to_acquirers(object, attributes)?;
        let divested: Vec<_> = acquired.values().flatten().copied().collect();
        let mut pending = Vec::new();
        for attribute in attributes.iter().filter(|a| !divested.contains(a)) {
            self.instance_attribute_mut(object, *attribute)?.divesting = true;
            pending.push(*attribute);
        }

        let mut notices: Vec<_> = acquisition_notices(object, federate, acquired).collect();
        if !divested.is_empty() {
            notices.push(Notice::to(
                federate,
                federate,
                Payload::AttributeOwnershipDivestitureNotification {
                    object,
                    attributes: divested,
                },
            ));
        }
        if !pending.is_empty() {
            let candidates: BTreeSet<_> = pending
                .iter()
                .filter_map(|a| self.classes.get(&class).and_then(|oc| oc.attributes.get(a)))
                .flat_map(|a| a.publishers.iter().copied())
                .filter(|h| *h != federate)
                .collect();
            if !candidates.is_empty() {
                notices.push(Notice::new(
                    candidates.into_iter().collect(),
                    federate,
                    Payload::RequestAttributeOwnershipAssumption {
                        object,
                        attributes: pending,
                        tag: tag.to_string(),
                    },
                ));
            }
        }
        Ok(notices)
    }

    fn acquire_if_available(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::acquire_if_available: called");
        self.check_acquirable(federate, object, attributes)?;

        let mut acquired = Vec::new();
        let mut unavailable = Vec::new();
        let mut divested = BTreeMap::new();
        for attribute in attributes {
            let attr = self.instance_attribute_mut(object, *attribute)?;
            if attr.owner == FederateHandle::ANONYMOUS || attr.divesting {
                if attr.owner.0 != 0 {
                    push_grouped(&mut divested, attr.owner, *attribute);
                }
                attr.owner = federate;
                attr.divesting = false;
                attr.acquirers.retain(|h| *h != federate);
                acquired.push(*attribute);
            } else {
                unavailable.push(*attribute);
            }
        }

        let mut notices = Vec::new();
        if !acquired.is_empty() {
            notices.push(Notice::to(
                federate,
                federate,
                Payload::AttributeOwnershipAcquisitionNotification {
                    object,
                    attributes: acquired,
                },
            ));
        }
        for (previous, attributes) in divested {
            notices.push(Notice::to(
                previous,
                federate,
                Payload::AttributeOwnershipDivestitureNotification { object, attributes },
            ));
        }
        if !unavailable.is_empty() {
            notices.push(Notice::to(
                federate,
                federate,
                Payload::AttributeOwnershipUnavailable {
                    object,
                    attributes: unavailable,
                },
            ));
        }
        Ok(notices)
    }

    fn unconditional_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::unconditional_divestiture: called");
        self.check_owned(federate, object, attributes)?;

        let acquired = self.transfer_to_acquirers(object, attributes)?;
        for attribute in attributes {
            let attr = self.instance_attribute_mut(object, *attribute)?;
            if attr.owner == federate {
                attr.owner = FederateHandle::ANONYMOUS;
                attr.divesting = false;
            }
        }
        Ok(acquisition_notices(object, federate, acquired).collect())
    }

    fn acquire(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
        tag: &str,
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::acquire: called");
        self.check_acquirable(federate, object, attributes)?;

        let mut acquired = Vec::new();
        let mut divested = BTreeMap::new();
        let mut release_requests = BTreeMap::new();
        for attribute in attributes {
            let attr = self.instance_attribute_mut(object, *attribute)?;
            if attr.owner == FederateHandle::ANONYMOUS || attr.divesting {
                if attr.owner.0 != 0 {
                    push_grouped(&mut divested, attr.owner, *attribute);
                }
                attr.owner = federate;
                attr.divesting = false;
                attr.acquirers.retain(|h| *h != federate);
                acquired.push(*attribute);
            } else {
                if !attr.acquirers.contains(&federate) {
                    attr.acquirers.push(federate);
                }
                push_grouped(&mut release_requests, attr.owner, *attribute);
            }
        }

        let mut notices = Vec::new();
        if !acquired.is_empty() {
            notices.push(Notice::to(
                federate,
                federate,
                Payload::AttributeOwnershipAcquisitionNotification {
                    object,
                    attributes: acquired,
                },
            ));
        }
        for (previous, attributes) in divested {
            notices.push(Notice::to(
                previous,
                federate,
                Payload::AttributeOwnershipDivestitureNotification { object, attributes },
            ));
        }
        for (owner, attributes) in release_requests {
            notices.push(Notice::to(
                owner,
                federate,
                Payload::RequestAttributeOwnershipRelease {
                    object,
                    attributes,
                    tag: tag.to_string(),
                },
            ));
        }
        Ok(notices)
    }

    fn cancel_divestiture(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<()> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::cancel_divestiture: called");
        self.check_owned(federate, object, attributes)?;
        for attribute in attributes {
            if !self.instance_attribute(object, *attribute)?.divesting {
                return Err(ObjectModelError::AttributeDivestitureWasNotRequested {
                    object,
                    attribute: *attribute,
                });
            }
        }
        for attribute in attributes {
            self.instance_attribute_mut(object, *attribute)?.divesting = false;
        }
        Ok(())
    }

    fn release_response(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<(Vec<AttributeHandle>, Vec<Notice>)> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::release_response: called");
        self.check_owned(federate, object, attributes)?;

        let acquired = self.transfer_to_acquirers(object, attributes)?;
        let released = attributes
            .iter()
            .filter(|a| acquired.values().any(|v| v.contains(a)))
            .copied()
            .collect();
        Ok((released, acquisition_notices(object, federate, acquired).collect()))
    }

    fn cancel_acquisition(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<Vec<Notice>> {
        debug!(%federate, %object, ?attributes, "InMemoryObjectModel::cancel_acquisition: called");
        for attribute in attributes {
            if !self.instance_attribute(object, *attribute)?.acquirers.contains(&federate) {
                return Err(ObjectModelError::AttributeAcquisitionWasNotRequested {
                    object,
                    attribute: *attribute,
                });
            }
        }
        for attribute in attributes {
            self.instance_attribute_mut(object, *attribute)?
                .acquirers
                .retain(|h| *h != federate);
        }
        Ok(vec![Notice::to(
            federate,
            federate,
            Payload::ConfirmAttributeOwnershipAcquisitionCancellation {
                object,
                attributes: attributes.to_vec(),
            },
        )])
    }

    fn is_owner(&self, federate: FederateHandle, object: ObjectHandle, attribute: AttributeHandle) -> ObjectModelResult<bool> {
        Ok(self.instance_attribute(object, attribute)?.owner == federate)
    }

    fn create_region(&mut self, federate: FederateHandle, space: SpaceHandle, extents: Vec<Extent>) -> ObjectModelResult<RegionHandle> {
        debug!(%federate, %space, extents = extents.len(), "InMemoryObjectModel::create_region: called");
        self.check_extents(space, &extents)?;
        self.last_region += 1;
        let handle = RegionHandle(self.last_region);
        self.regions.insert(
            handle,
            Region {
                owner: federate,
                space,
                extents,
            },
        );
        Ok(handle)
    }

    fn modify_region(&mut self, federate: FederateHandle, region: RegionHandle, extents: Vec<Extent>) -> ObjectModelResult<()> {
        debug!(%federate, %region, "InMemoryObjectModel::modify_region: called");
        let space = self.owned_region(federate, region)?.space;
        self.check_extents(space, &extents)?;
        if let Some(r) = self.regions.get_mut(&region) {
            r.extents = extents;
        }
        Ok(())
    }

    fn delete_region(&mut self, federate: FederateHandle, region: RegionHandle) -> ObjectModelResult<()> {
        debug!(%federate, %region, "InMemoryObjectModel::delete_region: called");
        self.owned_region(federate, region)?;

        let associated = self
            .objects
            .values()
            .flat_map(|o| o.attributes.values())
            .any(|a| a.region == Some(region));
        let subscribed = self
            .classes
            .values()
            .flat_map(|c| c.attributes.values())
            .flat_map(|a| a.subscribers.values())
            .chain(self.interactions.values().flat_map(|i| i.subscribers.values()))
            .any(|r| *r == Some(region));
        if associated || subscribed {
            return Err(ObjectModelError::RegionInUse(region));
        }

        self.regions.remove(&region);
        Ok(())
    }

    fn associate_region(
        &mut self,
        federate: FederateHandle,
        object: ObjectHandle,
        region: RegionHandle,
        attributes: &[AttributeHandle],
    ) -> ObjectModelResult<()> {
        debug!(%federate, %object, %region, ?attributes, "InMemoryObjectModel::associate_region: called");
        self.check_region(Some(region))?;
        self.check_owned(federate, object, attributes)?;
        for attribute in attributes {
            self.instance_attribute_mut(object, *attribute)?.region = Some(region);
        }
        Ok(())
    }

    fn unassociate_region(&mut self, federate: FederateHandle, object: ObjectHandle, region: RegionHandle) -> ObjectModelResult<()> {
        debug!(%federate, %object, %region, "InMemoryObjectModel::unassociate_region: called");
        self.check_region(Some(region))?;
        let inst = self
            .objects
            .get_mut(&object)
            .ok_or(ObjectModelError::ObjectNotKnown(object))?;
        for attr in inst.attributes.values_mut() {
            if attr.region == Some(region) {
                attr.region = None;
            }
        }
        Ok(())
    }

    fn kill_federate(&mut self, federate: FederateHandle) -> ObjectModelResult<(Vec<ObjectHandle>, Vec<Notice>)> {
        debug!(%federate, "InMemoryObjectModel::kill_federate: called");
        for oc in self.classes.values_mut() {
            for attr in oc.attributes.values_mut() {
                attr.publishers.remove(&federate);
                attr.subscribers.remove(&federate);
            }
        }
        for ic in self.interactions.values_mut() {
            ic.publishers.remove(&federate);
            ic.subscribers.remove(&federate);
        }
        self.reservations.retain(|_, holder| *holder != federate);

        let doomed: Vec<ObjectHandle> = self
            .objects
            .iter()
            .filter(|(_, inst)| inst.owner == federate)
            .map(|(handle, _)| *handle)
            .collect();
        let notices = doomed
            .iter()
            .filter_map(|object| self.remove_instance(federate, *object, None, ""))
            .collect();

        for inst in self.objects.values_mut() {
            for attr in inst.attributes.values_mut() {
                attr.acquirers.retain(|h| *h != federate);
                if attr.owner == federate {
                    attr.owner = FederateHandle::ANONYMOUS;
                    attr.divesting = false;
                }
            }
        }

        let regions: Vec<_> = self
            .regions
            .iter()
            .filter(|(_, r)| r.owner == federate)
            .map(|(h, _)| *h)
            .collect();
        for region in regions {
            self.regions.remove(&region);
            for attr in self.objects.values_mut().flat_map(|o| o.attributes.values_mut()) {
                if attr.region == Some(region) {
                    attr.region = None;
                }
            }
        }

        Ok((doomed, notices))
    }

    fn serialized_fom(&self) -> serde_json::Value {
        let object_classes: Vec<_> = self
            .classes
            .iter()
            .map(|(handle, oc)| {
                json!({
                    "handle": handle,
                    "attributes": oc.attributes.keys().collect::<Vec<_>>(),
                })
            })
            .collect();
        let interaction_classes: Vec<_> = self
            .interactions
            .iter()
            .map(|(handle, ic)| {
                json!({
                    "handle": handle,
                    "parameters": ic.parameters.iter().collect::<Vec<_>>(),
                })
            })
            .collect();
        let spaces: Vec<_> = self
            .spaces
            .iter()
            .map(|(handle, dimensions)| json!({ "handle": handle, "dimensions": dimensions }))
            .collect();
        json!({
            "object-classes": object_classes,
            "interaction-classes": interaction_classes,
            "routing-spaces": spaces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_model::Range;

    const CLASS: ObjectClassHandle = ObjectClassHandle(1);
    const ATTR_A: AttributeHandle = AttributeHandle(1);
    const ATTR_B: AttributeHandle = AttributeHandle(2);
    const F1: FederateHandle = FederateHandle(1);
    const F2: FederateHandle = FederateHandle(2);
    const F3: FederateHandle = FederateHandle(3);

    fn model() -> InMemoryObjectModel {
        InMemoryObjectModel::new()
            .with_object_class(CLASS, &[ATTR_A, ATTR_B])
            .with_interaction_class(InteractionClassHandle(1), &[ParameterHandle(1)])
            .with_space(SpaceHandle(1), 2)
    }

    fn registered(model: &mut InMemoryObjectModel) -> ObjectHandle {
        model.publish_object_class(F1, CLASS, &[ATTR_A, ATTR_B], true).unwrap();
        model.register_object(F1, CLASS, ObjectHandle(1), "tank").unwrap();
        ObjectHandle(1)
    }

    #[test]
    fn test_publish_replaces_attribute_set() {
        let mut model = model();
        model.publish_object_class(F1, CLASS, &[ATTR_A, ATTR_B], true).unwrap();
        model.publish_object_class(F1, CLASS, &[ATTR_B], true).unwrap();
        assert!(!model.is_attribute_publisher(F1, CLASS, ATTR_A));
        assert!(model.is_attribute_publisher(F1, CLASS, ATTR_B));

        model.publish_object_class(F1, CLASS, &[], false).unwrap();
        assert!(model.class_publishers(CLASS).unwrap().is_empty());
        assert_eq!(
            model.publish_object_class(F1, CLASS, &[], false),
            Err(ObjectModelError::ObjectClassNotPublished(CLASS))
        );
    }

    #[test]
    fn test_publish_unknown_attribute() {
        let mut model = model();
        let err = model
            .publish_object_class(F1, CLASS, &[AttributeHandle(9)], true)
            .unwrap_err();
        assert!(matches!(err, ObjectModelError::AttributeNotDefined { .. }));
    }

    #[test]
    fn test_register_requires_publication_and_unique_name() {
        let mut model = model();
        assert_eq!(
            model.register_object(F1, CLASS, ObjectHandle(1), "tank"),
            Err(ObjectModelError::ObjectClassNotPublished(CLASS))
        );
        let object = registered(&mut model);
        assert_eq!(model.object_name(object), Some("tank"));
        assert!(model.register_object(F1, CLASS, ObjectHandle(2), "tank").is_err());
        assert_eq!(model.attribute_owner(object, ATTR_A).unwrap(), F1);
    }

    #[test]
    fn test_register_discovered_by_subscribers() {
        let mut model = model();
        model.subscribe_object_class(F2, CLASS, &[ATTR_A], true, None).unwrap();
        model.publish_object_class(F1, CLASS, &[ATTR_A], true).unwrap();

        let notices = model.register_object(F1, CLASS, ObjectHandle(5), "jeep").unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipients, vec![F2]);
        assert!(matches!(notices[0].payload, Payload::DiscoverObject { object: ObjectHandle(5), .. }));
    }

    #[test]
    fn test_late_subscriber_discovers_existing_instances() {
        let mut model = model();
        let object = registered(&mut model);
        let notices = model.subscribe_object_class(F2, CLASS, &[ATTR_A], true, None).unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipients, vec![F2]);
        assert!(matches!(notices[0].payload, Payload::DiscoverObject { object: o, .. } if o == object));
    }

    #[test]
    fn test_reserved_name_belongs_to_reserver() {
        let mut model = model();
        assert!(model.reserve_object_instance_name(F2, "bravo").unwrap());
        assert!(!model.reserve_object_instance_name(F1, "bravo").unwrap());
        assert!(!model.reserve_object_instance_name(F1, "HLAobject").unwrap());

        model.publish_object_class(F1, CLASS, &[ATTR_A], true).unwrap();
        assert!(model.register_object(F1, CLASS, ObjectHandle(1), "bravo").is_err());
    }

    #[test]
    fn test_update_reflects_to_subscribers_only() {
        let mut model = model();
        let object = registered(&mut model);
        model.subscribe_object_class(F2, CLASS, &[ATTR_B], true, None).unwrap();

        let notices = model
            .update_attribute_values(F1, object, &[ATTR_A, ATTR_B], &[vec![1], vec![2]], None, "")
            .unwrap();
        assert_eq!(notices.len(), 1);
        match &notices[0].payload {
            Payload::ReflectAttributeValues { attributes, values, .. } => {
                assert_eq!(attributes, &vec![ATTR_B]);
                assert_eq!(values, &vec![vec![2]]);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let err = model
            .update_attribute_values(F2, object, &[ATTR_A], &[vec![1]], None, "")
            .unwrap_err();
        assert!(matches!(err, ObjectModelError::AttributeNotOwned { .. }));
    }

    #[test]
    fn test_delete_requires_privilege() {
        let mut model = model();
        let object = registered(&mut model);
        assert_eq!(
            model.delete_object(F2, object, None, ""),
            Err(ObjectModelError::DeletePrivilegeNotHeld(object))
        );
        model.delete_object(F1, object, None, "").unwrap();
        assert_eq!(model.object_count(), 0);
        assert!(model.class_instances(CLASS).unwrap().is_empty());
    }

    #[test]
    fn test_acquire_requests_release_from_owner() {
        let mut model = model();
        let object = registered(&mut model);
        model.publish_object_class(F2, CLASS, &[ATTR_A], true).unwrap();

        let notices = model.acquire(F2, object, &[ATTR_A], "please").unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipients, vec![F1]);
        assert!(matches!(notices[0].payload, Payload::RequestAttributeOwnershipRelease { .. }));

        let (released, notices) = model.release_response(F1, object, &[ATTR_A]).unwrap();
        assert_eq!(released, vec![ATTR_A]);
        assert_eq!(notices[0].recipients, vec![F2]);
        assert!(model.is_owner(F2, object, ATTR_A).unwrap());
    }

    #[test]
    fn test_negotiated_divestiture_then_acquire_if_available() {
        let mut model = model();
        let object = registered(&mut model);
        model.publish_object_class(F2, CLASS, &[ATTR_A], true).unwrap();
        model.publish_object_class(F3, CLASS, &[ATTR_A], true).unwrap();

        let notices = model.negotiated_divestiture(F1, object, &[ATTR_A], "take it").unwrap();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipients, vec![F2, F3]);

        let notices = model.acquire_if_available(F2, object, &[ATTR_A]).unwrap();
        assert!(model.is_owner(F2, object, ATTR_A).unwrap());
        assert!(notices.iter().any(|n| n.recipients == vec![F1]
            && matches!(n.payload, Payload::AttributeOwnershipDivestitureNotification { .. })));

        let notices = model.acquire_if_available(F3, object, &[ATTR_A]).unwrap();
        assert!(matches!(notices[0].payload, Payload::AttributeOwnershipUnavailable { .. }));
    }

    #[test]
    fn test_cancel_divestiture_and_acquisition() {
        let mut model = model();
        let object = registered(&mut model);
        assert!(model.cancel_divestiture(F1, object, &[ATTR_A]).is_err());
        model.negotiated_divestiture(F1, object, &[ATTR_A], "").unwrap();
        model.cancel_divestiture(F1, object, &[ATTR_A]).unwrap();

        model.publish_object_class(F2, CLASS, &[ATTR_A], true).unwrap();
        assert!(model.cancel_acquisition(F2, object, &[ATTR_A]).is_err());
        model.acquire(F2, object, &[ATTR_A], "").unwrap();
        let notices = model.cancel_acquisition(F2, object, &[ATTR_A]).unwrap();
        assert!(matches!(
            notices[0].payload,
            Payload::ConfirmAttributeOwnershipAcquisitionCancellation { .. }
        ));
    }

    #[test]
    fn test_unconditional_divestiture_leaves_attribute_unowned() {
        let mut model = model();
        let object = registered(&mut model);
        let notices = model.unconditional_divestiture(F1, object, &[ATTR_B]).unwrap();
        assert!(notices.is_empty());
        assert_eq!(model.attribute_owner(object, ATTR_B).unwrap(), FederateHandle::ANONYMOUS);
    }

    #[test]
    fn test_region_lifecycle() {
        let mut model = model();
        let extent = vec![Range::new(0, 10), Range::new(0, 10)];
        assert!(model.create_region(F1, SpaceHandle(1), vec![vec![Range::new(0, 1)]]).is_err());
        let region = model.create_region(F1, SpaceHandle(1), vec![extent.clone()]).unwrap();

        assert!(model.modify_region(F2, region, vec![extent.clone()]).is_err());
        model.modify_region(F1, region, vec![extent]).unwrap();

        let object = registered(&mut model);
        model.associate_region(F1, object, region, &[ATTR_A]).unwrap();
        assert_eq!(model.delete_region(F1, region), Err(ObjectModelError::RegionInUse(region)));

        model.unassociate_region(F1, object, region).unwrap();
        model.delete_region(F1, region).unwrap();
        assert_eq!(model.region_count(), 0);
    }

    #[test]
    fn test_interaction_region_filtering() {
        let mut model = model();
        let ic = InteractionClassHandle(1);
        let near = model
            .create_region(F2, SpaceHandle(1), vec![vec![Range::new(0, 5), Range::new(0, 5)]])
            .unwrap();
        let far = model
            .create_region(F1, SpaceHandle(1), vec![vec![Range::new(50, 60), Range::new(50, 60)]])
            .unwrap();
        model.publish_interaction_class(F1, ic, true).unwrap();
        model.subscribe_interaction_class(F2, ic, true, Some(near)).unwrap();
        model.subscribe_interaction_class(F3, ic, true, None).unwrap();

        let notices = model
            .send_interaction(F1, ic, &[ParameterHandle(1)], &[vec![7]], None, Some(far), "")
            .unwrap();
        assert_eq!(notices[0].recipients, vec![F3]);
    }

    #[test]
    fn test_kill_federate_purges_references() {
        let mut model = model();
        let object = registered(&mut model);
        model.subscribe_object_class(F2, CLASS, &[ATTR_A], true, None).unwrap();

        let (removed, notices) = model.kill_federate(F1).unwrap();
        assert_eq!(removed, vec![object]);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipients, vec![F2]);
        assert!(model.class_publishers(CLASS).unwrap().is_empty());

        // Nothing left to purge
        let (removed, notices) = model.kill_federate(F1).unwrap();
        assert!(removed.is_empty() && notices.is_empty());
    }

    #[test]
    fn test_serialized_fom_lists_classes() {
        let fom = model().serialized_fom();
        assert_eq!(fom["object-classes"][0]["handle"], 1);
        assert_eq!(fom["routing-spaces"][0]["dimensions"], 2);
    }
}
