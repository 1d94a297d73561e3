//! Integration tests for the federation coordinator and the broker

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use rtig::broker::{Broker, BrokerConfig, FederateRequest};
use rtig::error::ErrorKind;
use rtig::federation::Federation;
use rtig::handles::{AttributeHandle, FederateHandle, FederationHandle, FederationTime, ObjectClassHandle};
use rtig::message::{MessageType, Payload};
use rtig::object_model::InMemoryObjectModel;
use rtig::persistence::{JsonSnapshotStore, MemorySnapshotStore, SnapshotStore};
use rtig::response::Responses;

const CLASS: ObjectClassHandle = ObjectClassHandle(1);
const ATTR: AttributeHandle = AttributeHandle(1);

fn model() -> Box<InMemoryObjectModel> {
    Box::new(InMemoryObjectModel::new().with_object_class(CLASS, &[ATTR]))
}

fn federation_with_store(store: Arc<dyn SnapshotStore>) -> Federation {
    Federation::new(FederationHandle(1), "Aircraft", "aircraft.fed", model(), store).unwrap()
}

fn federation() -> Federation {
    federation_with_store(Arc::new(MemorySnapshotStore::new()))
}

fn join_all(fed: &mut Federation, names: &[&str]) -> Vec<FederateHandle> {
    names.iter().map(|n| fed.add(n).unwrap().0).collect()
}

fn kinds(responses: &Responses) -> Vec<MessageType> {
    responses.iter().map(|r| r.message.message_type()).collect()
}

proptest! {
    #[test]
    fn test_live_handles_match_joined_federates(ops in prop::collection::vec((any::<bool>(), 0usize..6), 1..40)) {
        let names = ["a", "b", "c", "d", "e", "f"];
        let mut fed = federation();
        let mut live: BTreeMap<&str, FederateHandle> = BTreeMap::new();

        for (join, idx) in ops {
            let name = names[idx];
            if join {
                match fed.add(name) {
                    Ok((handle, _)) => {
                        prop_assert!(!live.contains_key(name));
                        prop_assert!(!live.values().any(|h| *h == handle));
                        live.insert(name, handle);
                    }
                    Err(e) => {
                        prop_assert!(live.contains_key(name));
                        prop_assert_eq!(e.kind(), ErrorKind::AlreadyExecutionMember);
                    }
                }
            } else if let Some(handle) = live.remove(name) {
                fed.remove(handle).unwrap();
            } else {
                prop_assert!(fed.federate_by_name(name).is_err());
            }

            let expected: BTreeSet<FederateHandle> = live.values().copied().collect();
            let actual: BTreeSet<FederateHandle> = fed.federate_handles().into_iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}

#[test]
fn test_joiner_catches_up_on_pending_barrier() {
    let mut fed = federation();
    let h = join_all(&mut fed, &["a", "b"]);
    fed.register_synchronization(h[0], "sync1", "tag", None).unwrap();

    let (c, responses) = fed.add("c").unwrap();
    assert_eq!(kinds(&responses), vec![MessageType::AnnounceSynchronizationPoint]);
    assert_eq!(responses[0].recipients, vec![c]);
    assert!(fed.federate(c).unwrap().is_synchronizing_to("sync1"));

    // Barrier now waits on the joiner too
    fed.unregister_synchronization(h[0], "sync1").unwrap();
    assert!(fed.unregister_synchronization(h[1], "sync1").unwrap().is_empty());
    let responses = fed.unregister_synchronization(c, "sync1").unwrap();
    assert_eq!(kinds(&responses), vec![MessageType::FederationSynchronized]);
}

#[test]
fn test_regulators_scenario() {
    let mut fed = federation();
    let h = join_all(&mut fed, &["A", "B"]);
    fed.add_regulator(h[0], FederationTime(10.0)).unwrap();
    fed.add_regulator(h[1], FederationTime(15.0)).unwrap();

    let (c, responses) = fed.add("C").unwrap();
    assert_eq!(kinds(&responses), vec![MessageType::MessageNull, MessageType::MessageNull]);
    let nulls: Vec<(FederateHandle, Payload)> = responses
        .iter()
        .map(|r| {
            assert_eq!(r.recipients, vec![c]);
            (r.message.federate, r.message.payload.clone())
        })
        .collect();
    assert_eq!(
        nulls,
        vec![
            (h[0], Payload::MessageNull { date: FederationTime(10.0) }),
            (h[1], Payload::MessageNull { date: FederationTime(15.0) }),
        ]
    );

    let responses = fed.remove_regulator(h[0]).unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].recipients, vec![h[1], c]);
    assert_eq!(responses[0].message.federate, h[0]);
    assert!(matches!(
        responses[0].message.payload,
        Payload::SetTimeRegulating { regulating: false, .. }
    ));
    assert_eq!(fed.lbts(), Some(FederationTime(15.0)));
}

#[test]
fn test_synchronization_scenario() {
    let mut fed = federation();
    let h = join_all(&mut fed, &["A", "B"]);
    fed.register_synchronization(h[0], "sync1", "tag", None).unwrap();

    let err = fed.register_synchronization(h[1], "sync1", "other", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolPrecondition);
    assert!(fed.federate(h[0]).unwrap().is_synchronizing_to("sync1"));
    assert!(fed.federate(h[1]).unwrap().is_synchronizing_to("sync1"));

    assert!(fed.unregister_synchronization(h[1], "sync1").unwrap().is_empty());
    let responses = fed.unregister_synchronization(h[0], "sync1").unwrap();
    assert_eq!(kinds(&responses), vec![MessageType::FederationSynchronized]);
    assert_eq!(responses[0].recipients, h);
    assert!(!fed.is_synchronizing());
}

#[test]
fn test_nerx_needs_two_users() {
    let mut fed = federation();
    let h = join_all(&mut fed, &["A", "B"]);
    fed.add_regulator(h[0], FederationTime(10.0)).unwrap();
    fed.add_regulator(h[1], FederationTime(20.0)).unwrap();

    assert!(!fed.update_last_nerx_for_federate(h[0], FederationTime(50.0)).unwrap());
    assert_eq!(fed.compute_min_nerx(), FederationTime::ZERO);

    assert!(fed.update_last_nerx_for_federate(h[1], FederationTime(60.0)).unwrap());
    assert_eq!(fed.min_nerx(), FederationTime(50.0));
    assert!(!fed.federate(h[0]).unwrap().is_using_nerx());
    assert!(!fed.federate(h[1]).unwrap().is_using_nerx());
}

#[test]
fn test_one_failed_save_spoils_the_round_only() {
    let store = Arc::new(MemorySnapshotStore::new());
    let mut fed = federation_with_store(store.clone());
    let h = join_all(&mut fed, &["A", "B", "C"]);

    fed.request_federation_save(h[0], "s1", None).unwrap();
    assert!(fed.federate_save_status(h[0], true).unwrap().is_empty());
    assert!(fed.federate_save_status(h[1], false).unwrap().is_empty());
    let responses = fed.federate_save_status(h[2], true).unwrap();
    assert_eq!(kinds(&responses), vec![MessageType::FederationNotSaved]);
    assert!(store.is_empty());
    assert!(!fed.is_saving());

    fed.request_federation_save(h[1], "s2", None).unwrap();
    for handle in &h[..2] {
        fed.federate_save_status(*handle, true).unwrap();
    }
    let responses = fed.federate_save_status(h[2], true).unwrap();
    assert_eq!(kinds(&responses), vec![MessageType::FederationSaved]);
    assert_eq!(responses[0].recipients, h);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_kill_regulating_constrained_federate() {
    let mut fed = federation();
    let h = join_all(&mut fed, &["A", "B"]);
    fed.add_regulator(h[0], FederationTime(3.0)).unwrap();
    fed.set_constrained(h[0], true, FederationTime(3.0)).unwrap();

    let responses = fed.kill(h[0]);
    assert_eq!(kinds(&responses), vec![MessageType::SetTimeRegulating]);
    assert_eq!(responses[0].recipients, vec![h[1]]);

    let err = fed.check(h[0]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotExecutionMember);
    assert_eq!(fed.lbts(), None);

    // Second kill has nothing left to do
    assert!(fed.kill(h[0]).is_empty());
}

#[tokio::test]
async fn test_broker_save_and_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonSnapshotStore::new(dir.path()));
    let broker = Broker::new(BrokerConfig::default(), store.clone());
    let client = broker.client();
    let task = tokio::spawn(broker.run());

    client.create_federation("Aircraft", "aircraft.fed", model()).await.unwrap();
    let mut alpha = client.join("Aircraft", "alpha").await.unwrap();
    let mut beta = client.join("Aircraft", "beta").await.unwrap();
    alpha.enable_time_regulation(FederationTime(2.0)).await.unwrap();

    alpha
        .request(FederateRequest::RequestFederationSave {
            label: "s1".to_string(),
            time: None,
        })
        .await
        .unwrap();
    for handle in [&alpha, &beta] {
        handle.request(FederateRequest::FederateSaveBegun).await.unwrap();
        handle.request(FederateRequest::FederateSaveStatus { ok: true }).await.unwrap();
    }
    assert!(store.snapshot_path("Aircraft", "s1").exists());

    alpha
        .request(FederateRequest::RequestFederationRestore { label: "s1".to_string() })
        .await
        .unwrap();
    for handle in [&alpha, &beta] {
        handle
            .request(FederateRequest::FederateRestoreStatus { ok: true })
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    while let Some(message) = alpha.try_recv() {
        seen.push(message.message_type());
    }
    assert_eq!(
        seen,
        vec![
            MessageType::TimeRegulationEnabled,
            MessageType::InitiateFederateSave,
            MessageType::FederationSaved,
            MessageType::RequestFederationRestoreSucceeded,
            MessageType::FederationRestoreBegun,
            MessageType::InitiateFederateRestore,
            MessageType::FederationRestored,
        ]
    );
    assert_eq!(beta.recv().await.unwrap().message_type(), MessageType::SetTimeRegulating);

    // Unknown label fails to the requester only
    alpha
        .request(FederateRequest::RequestFederationRestore { label: "nope".to_string() })
        .await
        .unwrap();
    assert_eq!(
        alpha.recv().await.unwrap().message_type(),
        MessageType::RequestFederationRestoreFailed
    );

    client.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_broker_object_updates_reach_subscribers() {
    let broker = Broker::new(BrokerConfig::default(), Arc::new(MemorySnapshotStore::new()));
    let client = broker.client();
    let task = tokio::spawn(broker.run());

    client.create_federation("Aircraft", "aircraft.fed", model()).await.unwrap();
    let alpha = client.join("Aircraft", "alpha").await.unwrap();
    let mut beta = client.join("Aircraft", "beta").await.unwrap();

    alpha
        .request(FederateRequest::PublishObjectClass {
            class: CLASS,
            attributes: vec![ATTR],
            publish: true,
        })
        .await
        .unwrap();
    beta.request(FederateRequest::SubscribeObjectClass {
        class: CLASS,
        attributes: vec![ATTR],
        subscribe: true,
    })
    .await
    .unwrap();
    while beta.try_recv().is_some() {}

    let object = alpha.register_object(CLASS, "plane-1").await.unwrap();
    assert_eq!(beta.recv().await.unwrap().message_type(), MessageType::DiscoverObject);

    alpha
        .update_attribute_values(object, vec![ATTR], vec![b"42".to_vec()], "")
        .await
        .unwrap();
    let reflect = beta.recv().await.unwrap();
    assert_eq!(reflect.message_type(), MessageType::ReflectAttributeValues);
    assert_eq!(reflect.federate, alpha.federate());

    client.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_broker_resign_removes_owned_objects_for_subscribers() {
    let broker = Broker::new(BrokerConfig::default(), Arc::new(MemorySnapshotStore::new()));
    let client = broker.client();
    let task = tokio::spawn(broker.run());

    client.create_federation("Aircraft", "aircraft.fed", model()).await.unwrap();
    let alpha = client.join("Aircraft", "alpha").await.unwrap();
    let mut beta = client.join("Aircraft", "beta").await.unwrap();

    alpha
        .request(FederateRequest::PublishObjectClass {
            class: CLASS,
            attributes: vec![ATTR],
            publish: true,
        })
        .await
        .unwrap();
    beta.request(FederateRequest::SubscribeObjectClass {
        class: CLASS,
        attributes: vec![ATTR],
        subscribe: true,
    })
    .await
    .unwrap();
    while beta.try_recv().is_some() {}

    let object = alpha.register_object(CLASS, "plane-1").await.unwrap();
    assert_eq!(beta.recv().await.unwrap().message_type(), MessageType::DiscoverObject);

    let leaver = alpha.federate();
    alpha.resign().await.unwrap();

    let removal = beta.recv().await.unwrap();
    assert_eq!(removal.federate, leaver);
    assert!(matches!(
        removal.payload,
        Payload::RemoveObject { object: removed, .. } if removed == object
    ));

    client.shutdown().await.unwrap();
    task.await.unwrap();
}
