//! Main Broker task implementation

use std::sync::Arc;

use eyre::Result;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::config::BrokerConfig;
use super::handle::BrokerClient;
use super::messages::{Answer, BrokerMetrics, BrokerRequest, FederateRequest, Joined};
use crate::config::Config;
use crate::error::FederationError;
use crate::federation::Federation;
use crate::federations::FederationsList;
use crate::handles::{FederateHandle, FederationHandle};
use crate::message::{Message, Payload};
use crate::object_model::ObjectModel;
use crate::persistence::{JsonSnapshotStore, SnapshotStore};
use crate::response::{Response, Responses};
use crate::transport::{ChannelTransport, DeliveryError, Transport, dispatch};

/// The Broker runs every federation execution and drives it one request at a time
pub struct Broker {
    config: BrokerConfig,
    tx: mpsc::Sender<BrokerRequest>,
    rx: mpsc::Receiver<BrokerRequest>,
    federations: FederationsList,
    transport: ChannelTransport,
    metrics: BrokerMetrics,
}

impl Broker {
    /// Create a new Broker persisting snapshots to `store`
    pub fn new(config: BrokerConfig, store: Arc<dyn SnapshotStore>) -> Self {
        debug!(?config, "Broker::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self {
            config,
            tx,
            rx,
            federations: FederationsList::new(store),
            transport: ChannelTransport::new(),
            metrics: BrokerMetrics::default(),
        }
    }

    /// Create a Broker from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        debug!("Broker::from_config: called");
        let store = Arc::new(JsonSnapshotStore::new(config.storage.save_dir.clone()));
        let handles = &config.handles;
        let mut broker = Self::new(config.broker.clone(), store);
        broker.federations = broker
            .federations
            .with_limits(handles.max_federations, handles.max_federates, handles.max_objects);
        broker
    }

    /// Get a sender for creating clients
    pub fn sender(&self) -> mpsc::Sender<BrokerRequest> {
        self.tx.clone()
    }

    /// Client for creating, joining and destroying federations
    pub fn client(&self) -> BrokerClient {
        BrokerClient::new(self.tx.clone(), self.config.federate_channel_buffer)
    }

    /// Request shutdown of the Broker
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(BrokerRequest::Shutdown)
            .await
            .map_err(|_| eyre::eyre!("Broker channel closed"))?;

        Ok(())
    }

    /// Run the Broker event loop
    pub async fn run(mut self) {
        info!("Broker started");

        while let Some(req) = self.rx.recv().await {
            self.metrics.requests += 1;

            match req {
                BrokerRequest::CreateFederation {
                    name,
                    fom_id,
                    object_model,
                    reply_tx,
                } => {
                    let result = self.create_federation(&name, &fom_id, object_model);
                    self.reply(reply_tx, result);
                }

                BrokerRequest::DestroyFederation { name, reply_tx } => {
                    let result = self.destroy_federation(&name);
                    self.reply(reply_tx, result);
                }

                BrokerRequest::Join {
                    federation,
                    federate,
                    link,
                    reply_tx,
                } => {
                    let result = self.join(&federation, &federate, link);
                    self.reply(reply_tx, result);
                }

                BrokerRequest::Resign {
                    federation,
                    federate,
                    reply_tx,
                } => {
                    let result = self.resign(federation, federate);
                    self.reply(reply_tx, result);
                }

                BrokerRequest::Disconnect { federation, federate } => {
                    self.disconnect(federation, federate);
                }

                BrokerRequest::Federate {
                    federation,
                    federate,
                    request,
                    reply_tx,
                } => {
                    let result = self
                        .federations
                        .get_mut(federation)
                        .and_then(|fed| serve(fed, federate, request));
                    let result = result.map(|(answer, responses)| {
                        self.deliver(federation, responses);
                        answer
                    });
                    self.reply(reply_tx, result);
                }

                BrokerRequest::GetMetrics { reply_tx } => {
                    self.metrics.federations = self.federations.len();
                    self.metrics.links = self.transport.len();
                    let _ = reply_tx.send(self.metrics.clone());
                }

                BrokerRequest::Shutdown => {
                    info!("Broker shutting down");
                    break;
                }
            }
        }

        info!("Broker stopped");
    }

    fn reply<T>(&mut self, reply_tx: oneshot::Sender<Result<T, FederationError>>, result: Result<T, FederationError>) {
        if let Err(e) = &result {
            debug!(error = %e, "Broker::reply: request rejected");
            self.metrics.rejected += 1;
        }
        if reply_tx.send(result).is_err() {
            debug!("Broker::reply: requester went away");
        }
    }

    fn create_federation(
        &mut self,
        name: &str,
        fom_id: &str,
        object_model: Box<dyn ObjectModel>,
    ) -> Result<FederationHandle, FederationError> {
        debug!(%name, %fom_id, "Broker::create_federation: called");
        self.federations.create_federation(name, fom_id, object_model, None)
    }

    fn destroy_federation(&mut self, name: &str) -> Result<(), FederationError> {
        debug!(%name, "Broker::destroy_federation: called");
        let handle = self.federations.handle_of(name)?;
        self.federations.destroy_federation(handle)?;
        self.transport.unregister_federation(handle);
        Ok(())
    }

    fn join(&mut self, federation: &str, federate: &str, link: mpsc::Sender<Message>) -> Result<Joined, FederationError> {
        debug!(%federation, %federate, "Broker::join: called");
        let handle = self.federations.handle_of(federation)?;
        let fed = self.federations.get_mut(handle)?;
        let (federate_handle, responses) = fed.add(federate)?;
        let fom = fed.serialized_fom();

        self.transport.register(handle, federate_handle, link);
        self.deliver(handle, responses);
        Ok(Joined {
            federation: handle,
            federate: federate_handle,
            fom,
        })
    }

    fn resign(&mut self, federation: FederationHandle, federate: FederateHandle) -> Result<(), FederationError> {
        debug!(%federation, %federate, "Broker::resign: called");
        let fed = self.federations.get_mut(federation)?;
        let mut responses = Responses::new();
        if fed.federate(federate)?.is_regulator() {
            responses.extend(fed.remove_regulator(federate)?);
        }
        let (farewell, departures) = fed.remove(federate)?;
        responses.extend(departures);
        responses.extend(fed.complete_orphaned_synchronizations());
        responses.extend(fed.settle_save_and_restore());

        if let Err(e) = self.transport.deliver(federate, &farewell) {
            debug!(%federate, error = %e, "Broker::resign: farewell not delivered");
        }
        self.transport.unregister(federation, federate);
        self.deliver(federation, responses);
        Ok(())
    }

    fn disconnect(&mut self, federation: FederationHandle, federate: FederateHandle) {
        debug!(%federation, %federate, "Broker::disconnect: called");
        if !self.transport.unregister(federation, federate) {
            debug!(%federation, %federate, "Broker::disconnect: no link registered");
        }
        self.kill(federation, federate);
    }

    fn kill(&mut self, federation: FederationHandle, federate: FederateHandle) {
        warn!(%federation, %federate, "Killing federate");
        self.metrics.killed += 1;
        let responses = self.federations.kill_federate(federation, federate);
        self.deliver(federation, responses);
    }

    /// Hand responses to the links in order
    ///
    /// A federate whose link turns out closed is killed, and whatever its
    /// removal produces is delivered in turn.
    fn deliver(&mut self, federation: FederationHandle, responses: Responses) {
        let mut pending = responses;
        while !pending.is_empty() {
            let report = dispatch(&pending, &self.transport);
            self.metrics.delivered += report.delivered as u64;
            self.metrics.delivery_failures += report.failed() as u64;

            let mut broken: Vec<FederateHandle> = report
                .failures
                .iter()
                .filter(|(_, e)| matches!(e, DeliveryError::ChannelClosed(_)))
                .map(|(h, _)| *h)
                .collect();
            broken.sort();
            broken.dedup();

            pending = Responses::new();
            for federate in broken {
                if self.transport.unregister(federation, federate) {
                    warn!(%federation, %federate, "Federate link closed");
                    self.metrics.killed += 1;
                    pending.extend(self.federations.kill_federate(federation, federate));
                }
            }
        }
    }
}

/// Run one federate request against its federation
///
/// Returns the direct answer and the traffic the request caused.
fn serve(fed: &mut Federation, federate: FederateHandle, request: FederateRequest) -> crate::error::Result<(Answer, Responses)> {
    debug!(federation = %fed.handle(), %federate, ?request, "serve: called");
    let done = |responses: Responses| (Answer::Done, responses);

    let result = match request {
        FederateRequest::EnableTimeRegulation { time } => done(fed.add_regulator(federate, time)?),
        FederateRequest::DisableTimeRegulation => done(fed.remove_regulator(federate)?),
        FederateRequest::SetTimeConstrained { enabled, time } => done(fed.set_constrained(federate, enabled, time)?),
        FederateRequest::MessageNull { time } => done(fed.update_regulator(federate, time, false)?),
        FederateRequest::MessageNullPrime { time } => {
            if fed.update_last_nerx_for_federate(federate, time)? {
                let bound = fed.min_nerx();
                done(fed.update_regulator(federate, bound, true)?)
            } else {
                done(Responses::new())
            }
        }
        FederateRequest::QueryLbts => {
            fed.federate(federate)?;
            (Answer::Lbts(fed.lbts()), Responses::new())
        }

        FederateRequest::RegisterSynchronizationPoint { label, tag, subset } => {
            fed.register_synchronization(federate, &label, &tag, subset.as_deref())?;
            let confirm = Message::new(
                fed.handle(),
                federate,
                Payload::ConfirmSynchronizationPointRegistration { label: label.clone() },
            );
            let mut responses = vec![Response::to(federate, confirm)];
            responses.extend(fed.broadcast_synchronization(federate, &label, &tag, subset.as_deref())?);
            done(responses)
        }
        FederateRequest::SynchronizationPointAchieved { label } => {
            done(fed.unregister_synchronization(federate, &label)?)
        }

        FederateRequest::RequestFederationSave { label, time } => {
            done(fed.request_federation_save(federate, &label, time)?)
        }
        FederateRequest::FederateSaveBegun => {
            fed.federate_save_begun(federate)?;
            done(Responses::new())
        }
        FederateRequest::FederateSaveStatus { ok } => done(fed.federate_save_status(federate, ok)?),
        FederateRequest::RequestFederationRestore { label } => {
            done(fed.request_federation_restore(federate, &label)?)
        }
        FederateRequest::FederateRestoreStatus { ok } => done(fed.federate_restore_status(federate, ok)?),

        FederateRequest::PublishObjectClass {
            class,
            attributes,
            publish,
        } => done(fed.publish_object(federate, class, &attributes, publish)?),
        FederateRequest::SubscribeObjectClass {
            class,
            attributes,
            subscribe,
        } => done(fed.subscribe_object(federate, class, &attributes, subscribe)?),
        FederateRequest::PublishInteractionClass { class, publish } => {
            done(fed.publish_interaction(federate, class, publish)?)
        }
        FederateRequest::SubscribeInteractionClass { class, subscribe } => {
            done(fed.subscribe_interaction(federate, class, subscribe)?)
        }
        FederateRequest::SetClassRelevanceAdvisorySwitch { enabled } => {
            fed.set_class_relevance_advisory_switch(federate, enabled)?;
            done(Responses::new())
        }
        FederateRequest::SetAutoProvide { enabled } => {
            fed.check(federate)?;
            fed.set_auto_provide(enabled);
            done(Responses::new())
        }

        FederateRequest::ReserveObjectInstanceName { name } => done(fed.reserve_object_instance_name(federate, &name)?),
        FederateRequest::RegisterObject { class, name } => {
            let (object, responses) = fed.register_object(federate, class, &name)?;
            (Answer::Object(object), responses)
        }
        FederateRequest::RegisterObjectWithRegion {
            class,
            name,
            region,
            attributes,
        } => {
            let (object, responses) = fed.register_object_with_region(federate, class, &name, region, &attributes)?;
            (Answer::Object(object), responses)
        }
        FederateRequest::DeleteObject { object, time, tag } => done(fed.delete_object(federate, object, time, &tag)?),
        FederateRequest::UpdateAttributeValues {
            object,
            attributes,
            values,
            time,
            tag,
        } => done(fed.update_attribute_values(federate, object, &attributes, &values, time, &tag)?),
        FederateRequest::SendInteraction {
            class,
            parameters,
            values,
            time,
            region,
            tag,
        } => done(fed.broadcast_interaction(federate, class, &parameters, &values, time, region, &tag)?),
        FederateRequest::RequestObjectAttributeValueUpdate { object, attributes } => {
            let (owner, responses) = fed.request_object_owner(federate, object, &attributes)?;
            (Answer::Owner(owner), responses)
        }
        FederateRequest::RequestClassAttributeValueUpdate { class, attributes } => {
            done(fed.request_class_attribute_value_update(federate, class, &attributes)?)
        }

        FederateRequest::IsAttributeOwnedByFederate { object, attribute } => {
            (Answer::Owned(fed.is_owner(federate, object, attribute)?), Responses::new())
        }
        FederateRequest::QueryAttributeOwnership { object, attribute } => {
            done(fed.query_attribute_ownership(federate, object, attribute)?)
        }
        FederateRequest::NegotiatedAttributeOwnershipDivestiture { object, attributes, tag } => {
            done(fed.negotiate_divestiture(federate, object, &attributes, &tag)?)
        }
        FederateRequest::AttributeOwnershipAcquisitionIfAvailable { object, attributes } => {
            done(fed.acquire_if_available(federate, object, &attributes)?)
        }
        FederateRequest::UnconditionalAttributeOwnershipDivestiture { object, attributes } => {
            done(fed.divest(federate, object, &attributes)?)
        }
        FederateRequest::AttributeOwnershipAcquisition { object, attributes, tag } => {
            done(fed.acquire(federate, object, &attributes, &tag)?)
        }
        FederateRequest::CancelNegotiatedAttributeOwnershipDivestiture { object, attributes } => {
            fed.cancel_divestiture(federate, object, &attributes)?;
            done(Responses::new())
        }
        FederateRequest::AttributeOwnershipReleaseResponse { object, attributes } => {
            let (released, responses) = fed.respond_release(federate, object, &attributes)?;
            (Answer::Released(released), responses)
        }
        FederateRequest::CancelAttributeOwnershipAcquisition { object, attributes } => {
            done(fed.cancel_acquisition(federate, object, &attributes)?)
        }

        FederateRequest::CreateRegion { space, extents } => {
            (Answer::Region(fed.create_region(federate, space, extents)?), Responses::new())
        }
        FederateRequest::ModifyRegion { region, extents } => {
            fed.modify_region(federate, region, extents)?;
            done(Responses::new())
        }
        FederateRequest::DeleteRegion { region } => {
            fed.delete_region(federate, region)?;
            done(Responses::new())
        }
        FederateRequest::AssociateRegion {
            object,
            region,
            attributes,
        } => {
            fed.associate_region(federate, object, region, &attributes)?;
            done(Responses::new())
        }
        FederateRequest::UnassociateRegion { object, region } => {
            fed.unassociate_region(federate, object, region)?;
            done(Responses::new())
        }
        FederateRequest::SubscribeAttributesWithRegion {
            class,
            region,
            attributes,
        } => done(fed.subscribe_attributes_with_region(federate, class, region, &attributes)?),
        FederateRequest::UnsubscribeAttributesWithRegion { class, region } => {
            fed.unsubscribe_attributes_with_region(federate, class, region)?;
            done(Responses::new())
        }
        FederateRequest::SubscribeInteractionWithRegion { class, region } => {
            fed.subscribe_interaction_with_region(federate, class, region)?;
            done(Responses::new())
        }
        FederateRequest::UnsubscribeInteractionWithRegion { class, region } => {
            fed.unsubscribe_interaction_with_region(federate, class, region)?;
            done(Responses::new())
        }
    };
    Ok(result)
}
