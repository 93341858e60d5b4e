//! A host acts as both the server and a client, other peers join it through a relay
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec;

use networked::prelude::*;

use crate::protocol::turret;
use crate::stepper::ClientServerStepper;

const HOST: u64 = 76561190000000001;
const GUEST: u64 = 76561190000000002;

/// Client 0 is the host's own client, client 1 the guest
fn host_server() -> ClientServerStepper {
    let relay = LocalRelay::new();
    let host: Arc<dyn P2pNetworking> = Arc::new(relay.join(HOST).unwrap());
    let guest: Arc<dyn P2pNetworking> = Arc::new(relay.join(GUEST).unwrap());
    let config = P2pConfig::default();

    let mut stepper = ClientServerStepper::new(Box::new(P2pServerBackend::new(
        host.clone(),
        config.clone(),
    )));
    stepper.add_client(Box::new(P2pClientBackend::new(host, HOST, config.clone())));
    stepper.add_client(Box::new(P2pClientBackend::new(guest, HOST, config)));
    stepper.init();
    stepper
}

#[test_log::test]
fn test_host_and_guest_connect() {
    let stepper = host_server();
    assert_eq!(
        stepper.server.peers(),
        vec![PeerId::P2p(HOST), PeerId::P2p(GUEST)]
    );
    assert_eq!(stepper.server_events.len(), 2);
}

#[test_log::test]
fn test_host_client_spawn_reaches_guest() {
    let mut stepper = host_server();
    let log = stepper.client_logs[0].clone();
    let key = stepper.client_mut(0).spawn(turret(&log), None).unwrap();
    stepper.frame_step(2);
    let network_id = stepper.client(0).get(key).unwrap().network_id();
    assert!(network_id.is_registered());
    assert_eq!(stepper.server().owner(network_id), Some(PeerId::P2p(HOST)));

    stepper
        .client_mut(0)
        .get_mut(key)
        .unwrap()
        .set("ammo", 4i32)
        .unwrap();
    stepper.frame_step(2);
    let guest = stepper.client(1).find_by_id(network_id);
    assert_eq!(guest.value::<i32>("ammo"), Some(&4));
    assert!(!guest.has_authority());
}

#[test_log::test]
fn test_guest_disconnect() {
    let mut stepper = host_server();
    let log = stepper.client_logs[1].clone();
    let key = stepper.client_mut(1).spawn(turret(&log), None).unwrap();
    stepper.frame_step(2);
    let network_id = stepper.client(1).get(key).unwrap().network_id();

    stepper.disconnect_client();
    assert_eq!(
        stepper.server_events.last(),
        Some(&SessionEvent::Disconnected(PeerId::P2p(GUEST)))
    );
    assert_eq!(stepper.server.peers(), vec![PeerId::P2p(HOST)]);
    // the host keeps the guest's object, now owned by the server
    assert_eq!(stepper.server().owner(network_id), Some(PeerId::Server));
    assert!(stepper.client(0).try_find_by_id(network_id).is_some());
}
