//! Same scenarios over real sockets
use alloc::string::{String, ToString};

use networked::prelude::*;

use crate::protocol::turret;
use crate::stepper::ClientServerStepper;

#[test_log::test]
fn test_tcp_replication() {
    let mut stepper = ClientServerStepper::tcp(2);
    assert_eq!(
        stepper.server.peers(),
        alloc::vec![PeerId::Socket(1), PeerId::Socket(2)]
    );

    let log = stepper.server_log.clone();
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    stepper
        .server_mut()
        .get_mut(key)
        .unwrap()
        .set("name", "over tcp".to_string())
        .unwrap();
    let network_id = stepper.server().get(key).unwrap().network_id();
    let replicated = stepper.step_until(500, |stepper| {
        (0..2).all(|client| {
            stepper
                .client(client)
                .try_find_by_id(network_id)
                .and_then(|object| object.value::<String>("name"))
                .is_some_and(|name| name == "over tcp")
        })
    });
    assert!(replicated);

    // client writes travel back once the authority is transferred
    stepper
        .server_mut()
        .transfer_authority(network_id, PeerId::Socket(1))
        .unwrap();
    assert!(stepper.step_until(500, |stepper| {
        stepper.client(0).find_by_id(network_id).has_authority()
    }));
    let client_key = stepper.client_key(0, network_id).unwrap();
    stepper
        .client_mut(0)
        .get_mut(client_key)
        .unwrap()
        .set("ammo", 12i32)
        .unwrap();
    assert!(stepper.step_until(500, |stepper| {
        stepper.client(1).find_by_id(network_id).value::<i32>("ammo") == Some(&12)
    }));
    assert_eq!(
        stepper.server().find_by_id(network_id).value::<i32>("ammo"),
        Some(&12)
    );
}

#[test_log::test]
fn test_tcp_disconnect() {
    let mut stepper = ClientServerStepper::tcp(2);
    stepper.disconnect_client();
    assert!(stepper.step_until(500, |stepper| {
        stepper.server.peers() == alloc::vec![PeerId::Socket(1)]
    }));
    assert!(
        stepper
            .server_events
            .contains(&SessionEvent::Disconnected(PeerId::Socket(2)))
    );
}
