//! Check various replication scenarios between a server and its clients
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use approx::assert_relative_eq;
use bevy_math::Vec3;
use networked::prelude::*;

use crate::protocol::{SHIELD, turret};
use crate::stepper::ClientServerStepper;

#[test_log::test]
fn test_server_spawn() {
    let mut stepper = ClientServerStepper::with_clients(2);
    let log = stepper.server_log.clone();
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let object = stepper.server_mut().get_mut(key).unwrap();
    object.set("ammo", 5i32).unwrap();
    object.set("name", "alpha".to_string()).unwrap();
    object.set_extension(SHIELD, "charge", 300u16).unwrap();
    let network_id = object.network_id();
    assert!(network_id.is_registered());

    stepper.frame_step(2);

    for client in 0..2 {
        let object = stepper
            .client(client)
            .try_find_by_id(network_id)
            .expect("object was not replicated");
        assert!(!object.has_authority());
        assert_eq!(object.value::<i32>("ammo"), Some(&5));
        assert_eq!(object.value::<String>("name"), Some(&"alpha".to_string()));
        assert_eq!(object.extension_value::<u16>(SHIELD, "charge"), Some(&300));
        let log = &stepper.client_logs[client];
        assert!(log.contains("turret create"));
        assert!(log.contains(&alloc::format!("turret register {}", network_id.0)));
        assert_eq!(log.count("ammo=5"), 1);
    }
}

#[test_log::test]
fn test_client_spawn() {
    let mut stepper = ClientServerStepper::with_clients(2);
    let log = stepper.client_logs[0].clone();
    let key = stepper.client_mut(0).spawn(turret(&log), None).unwrap();
    let placeholder = stepper.client(0).get(key).unwrap().network_id();
    assert!(!placeholder.is_registered());

    // request on the first frame, id assigned on the second
    stepper.frame_step(2);
    let network_id = stepper.client(0).get(key).unwrap().network_id();
    assert!(network_id.is_registered());
    assert_eq!(stepper.server().owner(network_id), Some(PeerId::Local(1)));
    assert!(stepper.client(1).try_find_by_id(network_id).is_some());
    assert!(log.contains(&alloc::format!("turret register {}", network_id.0)));

    // the owner's writes reach the server and the other clients
    stepper
        .client_mut(0)
        .get_mut(key)
        .unwrap()
        .set("ammo", 7i32)
        .unwrap();
    stepper.frame_step(2);
    assert_eq!(
        stepper.server().find_by_id(network_id).value::<i32>("ammo"),
        Some(&7)
    );
    assert_eq!(
        stepper.client(1).find_by_id(network_id).value::<i32>("ammo"),
        Some(&7)
    );
    assert_eq!(stepper.server_log.count("ammo=7"), 1);
    assert_eq!(stepper.client_logs[1].count("ammo=7"), 1);
}

#[test_log::test]
fn test_new_client_receives_snapshot() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let object = stepper.server_mut().get_mut(key).unwrap();
    object.set("name", "beacon".to_string()).unwrap();
    object.set_extension(SHIELD, "raised", true).unwrap();
    let network_id = object.network_id();
    stepper.frame_step(2);

    let client = stepper.new_client();
    stepper.wait_for_connection();
    stepper.frame_step(1);
    let object = stepper.client(client).find_by_id(network_id);
    assert_eq!(object.value::<String>("name"), Some(&"beacon".to_string()));
    assert_eq!(object.extension_value::<bool>(SHIELD, "raised"), Some(&true));
    // the snapshot replaces the creation, the object exists once
    assert_eq!(stepper.client(client).len(), 1);
    assert_eq!(stepper.client_logs[client].count("turret create"), 1);
}

#[test_log::test]
fn test_position_is_smoothed() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    let key = stepper
        .server_mut()
        .spawn(turret(&log).at(Vec3::new(0.0, 2.0, 0.0)), None)
        .unwrap();
    let network_id = stepper.server().get(key).unwrap().network_id();
    stepper.frame_step(2);
    // the first value is not animated
    assert_eq!(
        stepper.client(0).find_by_id(network_id).position(),
        Vec3::new(0.0, 2.0, 0.0)
    );

    stepper
        .server_mut()
        .get_mut(key)
        .unwrap()
        .set_position(Vec3::new(10.0, 2.0, 0.0))
        .unwrap();
    stepper.frame_step(1);
    let x = stepper.client(0).find_by_id(network_id).position().x;
    assert!(x > 0.0 && x < 10.0, "position jumped to {x}");

    stepper.frame_step(100);
    let position = stepper.client(0).find_by_id(network_id).position();
    assert_relative_eq!(position.x, 10.0, epsilon = 1e-3);
    assert_relative_eq!(position.y, 2.0);
    // the authority is never smoothed
    assert_eq!(
        stepper.server().get(key).unwrap().position(),
        Vec3::new(10.0, 2.0, 0.0)
    );
}

#[test_log::test]
fn test_server_delete() {
    let mut stepper = ClientServerStepper::with_clients(2);
    let log = stepper.server_log.clone();
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let network_id = stepper.server().get(key).unwrap().network_id();
    stepper.frame_step(2);

    stepper.server_mut().delete(key, None).unwrap();
    assert!(stepper.server().is_recently_forgotten(network_id));
    stepper.frame_step(2);
    for client in 0..2 {
        assert!(stepper.client(client).try_find_by_id(network_id).is_none());
        assert!(stepper.client(client).is_recently_forgotten(network_id));
        let events = stepper.client_logs[client].events();
        assert!(events.contains(&"shield forget deleting=true".to_string()));
        assert!(events.contains(&"turret forget deleting=true".to_string()));
    }

    // the id is only reused once it left the grace window
    let reused = stepper.server_mut().spawn(turret(&log), None).unwrap();
    assert_ne!(stepper.server().get(reused).unwrap().network_id(), network_id);
    stepper.advance_time(Duration::from_secs(6));
    stepper.frame_step(1);
    assert!(!stepper.server().is_recently_forgotten(network_id));
    assert!(!stepper.client(0).is_recently_forgotten(network_id));
    let key = stepper.server_mut().spawn(turret(&log), None).unwrap();
    assert_eq!(stepper.server().get(key).unwrap().network_id(), network_id);
}

#[test_log::test]
fn test_client_delete_is_confirmed() {
    let mut stepper = ClientServerStepper::with_clients(2);
    let log = stepper.client_logs[0].clone();
    let key = stepper.client_mut(0).spawn(turret(&log), None).unwrap();
    stepper.frame_step(2);
    let network_id = stepper.client(0).get(key).unwrap().network_id();
    assert!(stepper.client(1).try_find_by_id(network_id).is_some());

    let confirmed = Arc::new(AtomicBool::new(false));
    let flag = confirmed.clone();
    stepper
        .client_mut(0)
        .delete(
            key,
            Some(Box::new(move |_: NetworkId| {
                flag.store(true, Ordering::Relaxed);
            })),
        )
        .unwrap();
    // forgotten locally right away, confirmed later
    assert!(stepper.client(0).get(key).is_none());
    assert_eq!(stepper.client(0).pending_delete_confirmations(), 1);
    assert!(!confirmed.load(Ordering::Relaxed));

    stepper.frame_step(2);
    assert!(confirmed.load(Ordering::Relaxed));
    assert_eq!(stepper.client(0).pending_delete_confirmations(), 0);
    assert!(stepper.server().try_find_by_id(network_id).is_none());
    assert!(stepper.client(1).try_find_by_id(network_id).is_none());
}

#[test_log::test]
fn test_delete_before_registration() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.client_logs[0].clone();
    let key = stepper.client_mut(0).spawn(turret(&log), None).unwrap();
    let confirmed = Arc::new(AtomicBool::new(false));
    let flag = confirmed.clone();
    stepper
        .client_mut(0)
        .delete(
            key,
            Some(Box::new(move |_: NetworkId| {
                flag.store(true, Ordering::Relaxed);
            })),
        )
        .unwrap();
    // hidden, but kept until it is registered
    assert!(!stepper.client(0).get(key).unwrap().state().is_active());

    stepper.frame_step(4);
    assert!(stepper.client(0).get(key).is_none());
    assert!(confirmed.load(Ordering::Relaxed));
    assert_eq!(stepper.server().len(), 0);
    let events = log.events();
    let register = events.iter().position(|e| e.starts_with("turret register"));
    let forget = events
        .iter()
        .position(|e| e == "turret forget deleting=true");
    assert!(register.unwrap() < forget.unwrap());
}
