use networked::prelude::*;

use crate::protocol::{SHIELD, turret};
use crate::stepper::ClientServerStepper;

#[test_log::test]
fn test_transfer_authority() {
    let mut stepper = ClientServerStepper::with_clients(2);
    let log = stepper.server_log.clone();
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let network_id = stepper.server().get(key).unwrap().network_id();
    stepper.frame_step(2);

    stepper
        .server_mut()
        .transfer_authority(network_id, PeerId::Local(1))
        .unwrap();
    assert!(!stepper.server().get(key).unwrap().has_authority());
    assert!(log.contains("turret lose"));
    stepper.frame_step(2);

    assert!(stepper.client(0).find_by_id(network_id).has_authority());
    assert!(!stepper.client(1).find_by_id(network_id).has_authority());
    assert!(stepper.client_logs[0].contains("turret gain"));
    assert!(stepper.client_logs[0].contains("shield authority=true"));

    // only the new owner can write
    assert!(matches!(
        stepper
            .server_mut()
            .get_mut(key)
            .unwrap()
            .set("ammo", 1i32),
        Err(ReplicationError::NotAuthority(_))
    ));
    let client_key = stepper.client_key(1, network_id).unwrap();
    assert!(
        stepper
            .client_mut(1)
            .get_mut(client_key)
            .unwrap()
            .set("ammo", 2i32)
            .is_err()
    );
    let client_key = stepper.client_key(0, network_id).unwrap();
    let object = stepper.client_mut(0).get_mut(client_key).unwrap();
    object.set("ammo", 3i32).unwrap();
    object.set_extension(SHIELD, "charge", 40u16).unwrap();
    stepper.frame_step(2);

    let server = stepper.server().find_by_id(network_id);
    assert_eq!(server.value::<i32>("ammo"), Some(&3));
    assert_eq!(server.extension_value::<u16>(SHIELD, "charge"), Some(&40));
    let other = stepper.client(1).find_by_id(network_id);
    assert_eq!(other.value::<i32>("ammo"), Some(&3));
    assert_eq!(other.extension_value::<u16>(SHIELD, "charge"), Some(&40));

    // and back to the server
    stepper
        .server_mut()
        .transfer_authority(network_id, PeerId::Server)
        .unwrap();
    stepper.frame_step(2);
    assert!(stepper.server().get(key).unwrap().has_authority());
    assert!(!stepper.client(0).find_by_id(network_id).has_authority());
    assert!(stepper.client_logs[0].contains("turret lose"));
}

#[test_log::test]
fn test_authority_returns_to_server_on_disconnect() {
    let mut stepper = ClientServerStepper::with_clients(2);
    // the last client is the one that gets disconnected
    let log = stepper.client_logs[1].clone();
    let key = stepper.client_mut(1).spawn(turret(&log), None).unwrap();
    stepper.frame_step(2);
    let network_id = stepper.client(1).get(key).unwrap().network_id();
    assert_eq!(stepper.server().owner(network_id), Some(PeerId::Local(2)));

    stepper.disconnect_client();
    assert_eq!(
        stepper.server_events.last(),
        Some(&SessionEvent::Disconnected(PeerId::Local(2)))
    );
    assert_eq!(stepper.server().owner(network_id), Some(PeerId::Server));
    assert!(stepper.server_log.contains("turret gain"));

    // the object survives its owner and the server keeps replicating it
    let server_key = stepper.server().key_of(network_id).unwrap();
    stepper
        .server_mut()
        .get_mut(server_key)
        .unwrap()
        .set("ammo", 9i32)
        .unwrap();
    stepper.frame_step(2);
    assert_eq!(
        stepper.client(0).find_by_id(network_id).value::<i32>("ammo"),
        Some(&9)
    );
}

#[test_log::test]
fn test_transfer_is_server_only() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let network_id = stepper.server().get(key).unwrap().network_id();
    stepper.frame_step(2);
    let result = stepper
        .client_mut(0)
        .transfer_authority(network_id, PeerId::Local(1));
    assert!(matches!(result, Err(ReplicationError::ServerOnly(_))));
    assert!(result.unwrap_err().is_fatal());
}
