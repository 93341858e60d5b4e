//! Parent/child relationships of replicated objects
use alloc::string::ToString;

use networked::prelude::*;

use crate::protocol::{drone, turret};
use crate::stepper::ClientServerStepper;

#[test_log::test]
fn test_child_create_waits_for_parent() {
    let mut stepper = ClientServerStepper::with_clients(2);
    let log = stepper.client_logs[0].clone();
    let parent = stepper.client_mut(0).spawn(turret(&log), None).unwrap();
    let child = stepper
        .client_mut(0)
        .spawn(drone(&log), Some(parent))
        .unwrap();

    // the parent is created on the first frame, the child once the parent has its id
    stepper.frame_step(1);
    assert_eq!(stepper.server().len(), 1);
    stepper.frame_step(2);
    assert_eq!(stepper.server().len(), 2);
    stepper.frame_step(1);

    let parent_id = stepper.client(0).get(parent).unwrap().network_id();
    let child_id = stepper.client(0).get(child).unwrap().network_id();
    assert!(parent_id.is_registered());
    assert!(child_id.is_registered());

    let server_parent = stepper.server().key_of(parent_id).unwrap();
    assert_eq!(
        stepper.server().find_by_id(child_id).state().parent(),
        Some(server_parent)
    );
    let other_parent = stepper.client_key(1, parent_id).unwrap();
    let other = stepper.client(1).find_by_id(child_id);
    assert_eq!(other.state().parent(), Some(other_parent));
    assert_eq!(other.value::<u8>("battery"), Some(&100));
    assert!(stepper.client_logs[1].contains("turret child added"));
}

#[test_log::test]
fn test_delete_cascades_to_children() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    let parent = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let child = stepper
        .server_mut()
        .spawn(drone(&log), Some(parent))
        .unwrap();
    let child_id = stepper.server().get(child).unwrap().network_id();
    stepper.frame_step(2);
    assert_eq!(stepper.client(0).len(), 2);
    stepper.client_logs[0].clear();

    stepper.server_mut().delete(parent, None).unwrap();
    assert_eq!(stepper.server().len(), 0);
    stepper.frame_step(2);
    assert_eq!(stepper.client(0).len(), 0);
    assert!(stepper.client(0).is_recently_forgotten(child_id));

    // parents are forgotten before their children
    let events = stepper.client_logs[0].events();
    let parent_forget = events
        .iter()
        .position(|e| e == "turret forget deleting=true")
        .unwrap();
    let child_forget = events
        .iter()
        .position(|e| e == "drone forget deleting=true")
        .unwrap();
    assert!(parent_forget < child_forget);
}

#[test_log::test]
fn test_forgetting_a_child_notifies_the_parent() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    let parent = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let parent_id = stepper.server().get(parent).unwrap().network_id();
    let child = stepper
        .server_mut()
        .spawn(drone(&log), Some(parent))
        .unwrap();
    stepper.frame_step(2);

    stepper.server_mut().forget(child, false).unwrap();
    stepper.frame_step(2);
    let events = stepper.client_logs[0].events();
    assert!(events.contains(&"drone forget deleting=false".to_string()));
    assert!(events.contains(&"turret child removed".to_string()));
    assert!(
        stepper
            .client(0)
            .find_by_id(parent_id)
            .state()
            .children()
            .is_empty()
    );
}

#[test_log::test]
fn test_unload_keeps_persistent_objects() {
    let mut stepper = ClientServerStepper::single();
    let log = stepper.server_log.clone();
    let kept = stepper
        .server_mut()
        .spawn(turret(&log).persistent(true), None)
        .unwrap();
    let unloaded = stepper.server_mut().spawn(turret(&log), None).unwrap();
    let kept_id = stepper.server().get(kept).unwrap().network_id();
    let unloaded_id = stepper.server().get(unloaded).unwrap().network_id();
    stepper.frame_step(2);
    // persistence is replicated with the creation
    assert!(stepper.client(0).find_by_id(kept_id).state().persistent());

    assert!(!stepper.server_mut().unload(kept).unwrap());
    assert!(stepper.server_mut().unload(unloaded).unwrap());
    stepper.frame_step(2);
    assert!(stepper.client(0).try_find_by_id(kept_id).is_some());
    assert!(stepper.client(0).try_find_by_id(unloaded_id).is_none());
    assert_eq!(
        stepper.client_logs[0].count("turret forget deleting=false"),
        1
    );
}
