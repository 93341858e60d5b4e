//! Object types shared by every participant of the tests
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use networked_core::id::ObjectKey;
use networked_replication::prelude::*;
use parking_lot::Mutex;

pub const TURRET: &str = "turret";
pub const DRONE: &str = "drone";
pub const SHIELD: &str = "shield";

/// Hooks and change callbacks of one participant, in the order they ran
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.lock().iter().any(|e| e == event)
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Root object with an int, a string and a float variable
pub struct Turret {
    log: EventLog,
}

impl Turret {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl NetworkedBehaviour for Turret {
    fn prefab(&self) -> &'static str {
        TURRET
    }

    fn declare_variables(&mut self, variables: &mut VariableDeclarations) {
        let log = self.log.clone();
        variables
            .add(
                "ammo",
                Networked::new(0i32)
                    .with_notify(ChangeNotify::OnChange)
                    .on_change(move |ammo| log.push(format!("ammo={ammo}"))),
            )
            .add("name", Networked::new(String::new()))
            .add("heat", Networked::new(0.0f32));
    }

    fn on_create(&mut self, _: &mut NetworkState) {
        self.log.push("turret create");
    }

    fn on_first_register(&mut self, state: &mut NetworkState) {
        self.log
            .push(format!("turret register {}", state.network_id().0));
    }

    fn on_gain_authority(&mut self, _: &mut NetworkState) {
        self.log.push("turret gain");
    }

    fn on_lose_authority(&mut self, _: &mut NetworkState) {
        self.log.push("turret lose");
    }

    fn on_forget(&mut self, _: &mut NetworkState, deleting: bool) {
        self.log.push(format!("turret forget deleting={deleting}"));
    }

    fn on_networked_child_added(&mut self, _: &mut NetworkState, _: ObjectKey) {
        self.log.push("turret child added");
    }

    fn on_networked_child_removed(&mut self, _: &mut NetworkState, _: ObjectKey) {
        self.log.push("turret child removed");
    }
}

/// Object spawned as a child of a turret
pub struct Drone {
    log: EventLog,
}

impl Drone {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl NetworkedBehaviour for Drone {
    fn prefab(&self) -> &'static str {
        DRONE
    }

    fn declare_variables(&mut self, variables: &mut VariableDeclarations) {
        variables.add("battery", Networked::new(100u8));
    }

    fn on_first_register(&mut self, state: &mut NetworkState) {
        self.log.push(format!("drone register {}", state.network_id().0));
    }

    fn on_forget(&mut self, _: &mut NetworkState, deleting: bool) {
        self.log.push(format!("drone forget deleting={deleting}"));
    }
}

/// Extender adding a shield to a turret
pub struct Shield {
    log: EventLog,
}

impl Shield {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl Extender for Shield {
    fn type_tag(&self) -> &'static str {
        SHIELD
    }

    fn init_networked_variables(&mut self, variables: &mut VariableDeclarations) {
        variables
            .add("charge", Networked::new(0u16))
            .add("raised", Networked::new(false));
    }

    fn on_forget(&mut self, _: &NetworkState, deleting: bool) {
        self.log.push(format!("shield forget deleting={deleting}"));
    }

    fn on_authority_change(&mut self, _: &NetworkState, has_authority: bool) {
        self.log.push(format!("shield authority={has_authority}"));
    }
}

pub fn turret(log: &EventLog) -> ObjectBuilder {
    ObjectBuilder::new(Turret::new(log.clone())).extend(Shield::new(log.clone()))
}

pub fn drone(log: &EventLog) -> ObjectBuilder {
    ObjectBuilder::new(Drone::new(log.clone()))
}

/// Register the prefabs of the tests, with hooks recording into `log`
pub fn register_prefabs(context: &mut ReplicationContext, log: &EventLog) {
    let turret_log = log.clone();
    context.register_prefab(TURRET.to_string(), move || turret(&turret_log));
    let drone_log = log.clone();
    context.register_prefab(DRONE.to_string(), move || drone(&drone_log));
}
