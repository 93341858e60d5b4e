//! Replication of networked objects
//!
//! A [`NetworkedObject`](object::NetworkedObject) carries an ordered set of
//! [networked variables](variable::NetworkedVariable). The participant that has authority over
//! the object writes them; every other participant applies the updates. The
//! [`ReplicationContext`](registry::ReplicationContext) of each participant maps network ids to
//! objects and produces the [`ReplicationMessage`](message::ReplicationMessage)s that keep them in sync.
extern crate alloc;

use bevy_ecs::prelude::SystemSet;

pub mod allocator;
pub mod authority;
pub mod config;
pub mod error;
pub mod extension;
pub mod layout;
pub mod message;
pub mod object;
pub mod plugin;
pub mod prefab;
pub mod registry;
pub mod variable;

pub mod prelude {
    pub use crate::ReplicationSystems;
    pub use crate::config::ReplicationConfig;
    pub use crate::error::ReplicationError;
    pub use crate::extension::Extender;
    pub use crate::layout::{Scope, VariableDeclarations};
    pub use crate::message::{Outgoing, ReplicationMessage, SendTarget};
    pub use crate::object::{NetworkState, NetworkedBehaviour, NetworkedObject, ObjectBuilder};
    pub use crate::plugin::ReplicationPlugin;
    pub use crate::registry::{DeleteCallback, ReplicationContext, Role};
    pub use crate::variable::{ChangeNotify, Networked, NetworkedVariable, Smoothed};
}

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum ReplicationSystems {
    /// Advance the networked objects and queue their updates
    Tick,
}
