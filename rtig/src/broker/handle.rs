//! Client interfaces to the Broker task

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{Answer, BrokerError, BrokerMetrics, BrokerRequest, BrokerResult, FederateRequest, Joined};
use crate::handles::{AttributeHandle, AttributeValue, FederateHandle, FederationHandle, FederationTime, ObjectClassHandle, ObjectHandle};
use crate::message::Message;
use crate::object_model::ObjectModel;

/// Sends a request and waits for its oneshot reply
async fn call<T>(
    tx: &mpsc::Sender<BrokerRequest>,
    build: impl FnOnce(oneshot::Sender<T>) -> BrokerRequest,
) -> BrokerResult<T> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(build(reply_tx)).await.map_err(|_| BrokerError::ChannelClosed)?;
    reply_rx.await.map_err(|_| BrokerError::NoReply)
}

/// Cloneable handle for federation lifecycle requests
#[derive(Clone, Debug)]
pub struct BrokerClient {
    tx: mpsc::Sender<BrokerRequest>,
    federate_channel_buffer: usize,
}

impl BrokerClient {
    pub(crate) fn new(tx: mpsc::Sender<BrokerRequest>, federate_channel_buffer: usize) -> Self {
        debug!(%federate_channel_buffer, "BrokerClient::new: called");
        Self {
            tx,
            federate_channel_buffer,
        }
    }

    pub async fn create_federation(
        &self,
        name: &str,
        fom_id: &str,
        object_model: Box<dyn ObjectModel>,
    ) -> BrokerResult<FederationHandle> {
        debug!(%name, %fom_id, "BrokerClient::create_federation: called");
        Ok(call(&self.tx, |reply_tx| BrokerRequest::CreateFederation {
            name: name.to_string(),
            fom_id: fom_id.to_string(),
            object_model,
            reply_tx,
        })
        .await??)
    }

    pub async fn destroy_federation(&self, name: &str) -> BrokerResult<()> {
        debug!(%name, "BrokerClient::destroy_federation: called");
        Ok(call(&self.tx, |reply_tx| BrokerRequest::DestroyFederation {
            name: name.to_string(),
            reply_tx,
        })
        .await??)
    }

    /// Join `federate` to `federation`, opening its outbound link
    pub async fn join(&self, federation: &str, federate: &str) -> BrokerResult<BrokerHandle> {
        debug!(%federation, %federate, "BrokerClient::join: called");
        let (link, rx) = mpsc::channel(self.federate_channel_buffer);
        let joined = call(&self.tx, |reply_tx| BrokerRequest::Join {
            federation: federation.to_string(),
            federate: federate.to_string(),
            link,
            reply_tx,
        })
        .await??;
        Ok(BrokerHandle::new(self.tx.clone(), rx, joined))
    }

    pub async fn metrics(&self) -> BrokerResult<BrokerMetrics> {
        call(&self.tx, |reply_tx| BrokerRequest::GetMetrics { reply_tx }).await
    }

    pub async fn shutdown(&self) -> BrokerResult<()> {
        debug!("BrokerClient::shutdown: called");
        self.tx
            .send(BrokerRequest::Shutdown)
            .await
            .map_err(|_| BrokerError::ChannelClosed)
    }
}

/// Handle of one joined federate
///
/// Requests go to the broker; everything the federation sends this federate
/// arrives on [`BrokerHandle::recv`].
#[derive(Debug)]
pub struct BrokerHandle {
    tx: mpsc::Sender<BrokerRequest>,
    rx: mpsc::Receiver<Message>,
    joined: Joined,
}

impl BrokerHandle {
    fn new(tx: mpsc::Sender<BrokerRequest>, rx: mpsc::Receiver<Message>, joined: Joined) -> Self {
        debug!(federation = %joined.federation, federate = %joined.federate, "BrokerHandle::new: called");
        Self { tx, rx, joined }
    }

    pub fn federation(&self) -> FederationHandle {
        self.joined.federation
    }

    pub fn federate(&self) -> FederateHandle {
        self.joined.federate
    }

    /// Object model description received at join
    pub fn fom(&self) -> &serde_json::Value {
        &self.joined.fom
    }

    /// Next message addressed to this federate, `None` once the link is closed
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    pub async fn request(&self, request: FederateRequest) -> BrokerResult<Answer> {
        debug!(federate = %self.joined.federate, ?request, "BrokerHandle::request: called");
        let (federation, federate) = (self.joined.federation, self.joined.federate);
        Ok(call(&self.tx, |reply_tx| BrokerRequest::Federate {
            federation,
            federate,
            request,
            reply_tx,
        })
        .await??)
    }

    pub async fn enable_time_regulation(&self, time: FederationTime) -> BrokerResult<()> {
        self.request(FederateRequest::EnableTimeRegulation { time }).await?;
        Ok(())
    }

    pub async fn enable_time_constrained(&self, time: FederationTime) -> BrokerResult<()> {
        self.request(FederateRequest::SetTimeConstrained { enabled: true, time })
            .await?;
        Ok(())
    }

    pub async fn time_advance(&self, time: FederationTime) -> BrokerResult<()> {
        self.request(FederateRequest::MessageNull { time }).await?;
        Ok(())
    }

    pub async fn query_lbts(&self) -> BrokerResult<Option<FederationTime>> {
        match self.request(FederateRequest::QueryLbts).await? {
            Answer::Lbts(lbts) => Ok(lbts),
            other => Err(unexpected(other)),
        }
    }

    pub async fn register_synchronization_point(&self, label: &str, tag: &str) -> BrokerResult<()> {
        self.request(FederateRequest::RegisterSynchronizationPoint {
            label: label.to_string(),
            tag: tag.to_string(),
            subset: None,
        })
        .await?;
        Ok(())
    }

    pub async fn synchronization_point_achieved(&self, label: &str) -> BrokerResult<()> {
        self.request(FederateRequest::SynchronizationPointAchieved {
            label: label.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn register_object(&self, class: ObjectClassHandle, name: &str) -> BrokerResult<ObjectHandle> {
        match self
            .request(FederateRequest::RegisterObject {
                class,
                name: name.to_string(),
            })
            .await?
        {
            Answer::Object(object) => Ok(object),
            other => Err(unexpected(other)),
        }
    }

    pub async fn update_attribute_values(
        &self,
        object: ObjectHandle,
        attributes: Vec<AttributeHandle>,
        values: Vec<AttributeValue>,
        tag: &str,
    ) -> BrokerResult<()> {
        self.request(FederateRequest::UpdateAttributeValues {
            object,
            attributes,
            values,
            time: None,
            tag: tag.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Orderly resignation; the link closes afterwards
    pub async fn resign(self) -> BrokerResult<()> {
        debug!(federate = %self.joined.federate, "BrokerHandle::resign: called");
        let (federation, federate) = (self.joined.federation, self.joined.federate);
        Ok(call(&self.tx, |reply_tx| BrokerRequest::Resign {
            federation,
            federate,
            reply_tx,
        })
        .await??)
    }

    /// Report a broken link; the broker kills the federate
    pub async fn disconnect(self) -> BrokerResult<()> {
        debug!(federate = %self.joined.federate, "BrokerHandle::disconnect: called");
        self.tx
            .send(BrokerRequest::Disconnect {
                federation: self.joined.federation,
                federate: self.joined.federate,
            })
            .await
            .map_err(|_| BrokerError::ChannelClosed)
    }
}

fn unexpected(answer: Answer) -> BrokerError {
    BrokerError::Federation(crate::error::FederationError::internal(format!(
        "Unexpected answer {:?}",
        answer
    )))
}
