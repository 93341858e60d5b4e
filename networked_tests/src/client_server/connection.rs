use alloc::vec;

use networked::prelude::*;

use crate::protocol::turret;
use crate::stepper::ClientServerStepper;

#[test_log::test]
fn test_connection_events() {
    let mut stepper = ClientServerStepper::with_clients(2);
    assert_eq!(
        stepper.server_events,
        vec![
            SessionEvent::Connected(PeerId::Local(1)),
            SessionEvent::Connected(PeerId::Local(2)),
        ]
    );
    assert_eq!(stepper.server.peers(), vec![PeerId::Local(1), PeerId::Local(2)]);

    stepper.disconnect_client();
    assert_eq!(
        stepper.server_events.last(),
        Some(&SessionEvent::Disconnected(PeerId::Local(2)))
    );
    assert_eq!(stepper.server.peers(), vec![PeerId::Local(1)]);
}

#[test_log::test]
fn test_client_resets_when_server_stops() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    stepper.server_mut().spawn(turret(&log), None).unwrap();
    stepper.frame_step(2);
    assert_eq!(stepper.client(0).len(), 1);

    stepper.server.stop();
    assert!(stepper.server.peers().is_empty());
    assert!(matches!(
        stepper.clients[0].tick(0.01),
        Err(SessionError::Transport(TransportError::Closed))
    ));
    assert!(!stepper.clients[0].is_connected());
    // the objects of the lost session are forgotten, without being deleted
    assert_eq!(stepper.client(0).len(), 0);
    assert!(stepper.client_logs[0].contains("turret forget deleting=false"));
}

#[test_log::test]
fn test_local_objects_are_not_replicated() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.client_logs[0].clone();
    let key = stepper
        .client_mut(0)
        .spawn(turret(&log).client_side(), None)
        .unwrap();
    stepper.frame_step(3);
    assert_eq!(stepper.server().len(), 0);
    assert!(!stepper.client(0).get(key).unwrap().state().is_registered());
    // deleted synchronously, without a round trip
    stepper.client_mut(0).delete(key, None).unwrap();
    assert!(stepper.client(0).get(key).is_none());
}
