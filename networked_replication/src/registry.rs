//! The object registry of a session
//!
//! A [`ReplicationContext`] holds every networked object of one participant, the map from network
//! id to object, the ids that were recently forgotten and the pending delete confirmations.
//! It turns local operations (spawn, write, delete) into [`ReplicationMessage`]s queued for the
//! session layer, and applies the messages received from the other participants.
//!
//! Remote input never makes the context panic: unexpected messages are logged and dropped,
//! since they can legitimately happen around creation and deletion races.
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use bevy_ecs::prelude::Resource;
use bevy_platform::collections::HashMap;
use bytes::Bytes;
use networked_core::id::{NetworkId, ObjectKey, PeerId};
use networked_core::time::Instant;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::allocator::NetworkIdAllocator;
use crate::authority::AuthorityBroker;
use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, Result};
use crate::message::{Outgoing, ReplicationMessage, SendTarget};
use crate::object::{NetworkedObject, ObjectBuilder};
use crate::prefab::PrefabRegistry;

/// Which side of the session the context lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Issues the network ids and brokers the authority
    Server,
    Client,
}

/// Invoked once the deletion of an object is confirmed
pub type DeleteCallback = Box<dyn FnOnce(NetworkId) + Send + Sync>;

#[derive(Resource)]
pub struct ReplicationContext {
    role: Role,
    config: ReplicationConfig,
    next_key: u64,
    arena: HashMap<ObjectKey, NetworkedObject>,
    /// live registered objects
    objects: HashMap<NetworkId, ObjectKey>,
    /// ids forgotten less than `client_timeout` ago
    recently_forgotten: HashMap<NetworkId, Instant>,
    /// deletes waiting for a confirmation from the server
    delete_callbacks: HashMap<NetworkId, DeleteCallback>,
    /// client objects waiting for their id
    placeholders: HashMap<NetworkId, ObjectKey>,
    next_placeholder: i32,
    /// deletes requested before the object was registered
    deferred_deletes: HashMap<ObjectKey, Option<DeleteCallback>>,
    /// children whose creation waits for the registration of their parent
    deferred_creates: HashMap<ObjectKey, Vec<ObjectKey>>,
    allocator: NetworkIdAllocator,
    authority: AuthorityBroker,
    prefabs: PrefabRegistry,
    outgoing: Vec<Outgoing>,
}

impl ReplicationContext {
    pub fn new(role: Role, config: ReplicationConfig) -> Self {
        Self {
            role,
            config,
            next_key: 1,
            arena: HashMap::default(),
            objects: HashMap::default(),
            recently_forgotten: HashMap::default(),
            delete_callbacks: HashMap::default(),
            placeholders: HashMap::default(),
            next_placeholder: -1,
            deferred_deletes: HashMap::default(),
            deferred_creates: HashMap::default(),
            allocator: NetworkIdAllocator::default(),
            authority: AuthorityBroker::default(),
            prefabs: PrefabRegistry::default(),
            outgoing: Vec::new(),
        }
    }

    pub fn server(config: ReplicationConfig) -> Self {
        Self::new(Role::Server, config)
    }

    pub fn client(config: ReplicationConfig) -> Self {
        Self::new(Role::Client, config)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Register the constructor used when a creation message names `name`
    pub fn register_prefab(
        &mut self,
        name: impl Into<alloc::string::String>,
        factory: impl Fn() -> ObjectBuilder + Send + Sync + 'static,
    ) {
        self.prefabs.register(name, factory);
    }

    /// Number of objects on this participant, registered or not
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn get(&self, key: ObjectKey) -> Option<&NetworkedObject> {
        self.arena.get(&key)
    }

    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut NetworkedObject> {
        self.arena.get_mut(&key)
    }

    pub fn key_of(&self, network_id: NetworkId) -> Option<ObjectKey> {
        self.objects.get(&network_id).copied()
    }

    /// Object registered under `network_id`.
    ///
    /// Panics if there is none: use this only where absence is a programming error.
    pub fn find_by_id(&self, network_id: NetworkId) -> &NetworkedObject {
        match self.key_of(network_id).and_then(|key| self.arena.get(&key)) {
            Some(object) => object,
            None => panic!("no live object with network id {network_id}"),
        }
    }

    /// Object registered under `network_id`, if any.
    ///
    /// Logs a warning if the id was not recently forgotten either, which points to a desync.
    pub fn try_find_by_id(&self, network_id: NetworkId) -> Option<&NetworkedObject> {
        let object = self.key_of(network_id).and_then(|key| self.arena.get(&key));
        if object.is_none() {
            self.report_missing(network_id);
        }
        object
    }

    pub fn try_find_by_id_mut(&mut self, network_id: NetworkId) -> Option<&mut NetworkedObject> {
        let Some(key) = self.key_of(network_id) else {
            self.report_missing(network_id);
            return None;
        };
        self.arena.get_mut(&key)
    }

    fn report_missing(&self, network_id: NetworkId) {
        if self.config.warn_on_missing_id && !self.recently_forgotten.contains_key(&network_id) {
            warn!(
                ?network_id,
                "object is neither live nor recently forgotten on this participant"
            );
        }
    }

    pub fn is_recently_forgotten(&self, network_id: NetworkId) -> bool {
        self.recently_forgotten.contains_key(&network_id)
    }

    /// Registered ids, in increasing order
    pub fn registered_ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.objects.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Recently forgotten ids, in increasing order
    pub fn recently_forgotten_ids(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.recently_forgotten.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn pending_delete_confirmations(&self) -> usize {
        self.delete_callbacks.len()
    }

    /// Peer that has authority over `network_id`, as tracked by the server
    pub fn owner(&self, network_id: NetworkId) -> Option<PeerId> {
        self.authority.owner(network_id)
    }

    /// Messages queued since the last call
    pub fn drain_outgoing(&mut self) -> Vec<Outgoing> {
        core::mem::take(&mut self.outgoing)
    }

    fn send(&mut self, target: SendTarget, message: ReplicationMessage) {
        trace!(?target, kind = message.kind(), "queue replication message");
        self.outgoing.push(Outgoing { target, message });
    }

    /// Where updates written by this participant go
    fn update_target(&self) -> SendTarget {
        match self.role {
            Role::Server => SendTarget::All,
            Role::Client => SendTarget::Only(PeerId::Server),
        }
    }

    fn insert_object(
        &mut self,
        builder: ObjectBuilder,
        parent: Option<ObjectKey>,
        has_authority: bool,
        snapshot: Option<&[u8]>,
    ) -> Result<ObjectKey> {
        if let Some(parent) = parent {
            if !self.arena.contains_key(&parent) {
                return Err(ReplicationError::UnknownObjectKey(parent));
            }
        }
        let key = ObjectKey(self.next_key);
        let mut object = NetworkedObject::new(key, builder, has_authority);
        object.init_network_variables(self.config.position_lerp_speed);
        if let Some(snapshot) = snapshot {
            object.apply_snapshot(snapshot)?;
        }
        self.next_key += 1;
        object.set_parent(parent);
        self.arena.insert(key, object);
        if let Some(parent) = parent.and_then(|parent| self.arena.get_mut(&parent)) {
            parent.add_child(key);
        }
        if let Some(object) = self.arena.get_mut(&key) {
            object.on_create();
        }
        Ok(key)
    }

    /// Spawn an object created by this participant, which gets authority over it.
    ///
    /// On the server the object is registered right away and its creation is broadcast.
    /// On a client it gets a placeholder id and its creation is requested from the server, once
    /// its parent (if any) is registered. Client-side objects are never replicated.
    pub fn spawn(&mut self, builder: ObjectBuilder, parent: Option<ObjectKey>) -> Result<ObjectKey> {
        let client_side = builder.is_client_side();
        let prefab = builder.prefab();
        if client_side {
            let key = self.insert_object(builder, parent, true, None)?;
            debug!(%key, prefab, "spawned client-side object");
            return Ok(key);
        }
        match self.role {
            Role::Server => {
                let network_id = self.allocator.allocate().ok_or(ReplicationError::IdsExhausted)?;
                let key = match self.insert_object(builder, parent, true, None) {
                    Ok(key) => key,
                    Err(e) => {
                        self.allocator.recycle(network_id);
                        return Err(e);
                    }
                };
                self.authority.set_owner(network_id, PeerId::Server);
                self.try_set_network_id(key, network_id)?;
                let message = self.create_message(key)?;
                if let Some(object) = self.arena.get_mut(&key) {
                    object.clear_dirty();
                }
                self.send(SendTarget::All, message);
                debug!(%key, ?network_id, prefab, "spawned object");
                Ok(key)
            }
            Role::Client => {
                let key = self.insert_object(builder, parent, true, None)?;
                let placeholder = NetworkId(self.next_placeholder);
                self.next_placeholder = self.next_placeholder.checked_sub(1).unwrap_or(-1);
                self.try_set_network_id(key, placeholder)?;
                let waiting_parent = parent.filter(|parent| {
                    self.arena.get(parent).is_some_and(|parent| {
                        !parent.state().is_client_side() && !parent.state().is_registered()
                    })
                });
                match waiting_parent {
                    Some(parent) => {
                        debug!(%key, %parent, "create request deferred until the parent is registered");
                        match self.deferred_creates.get_mut(&parent) {
                            Some(children) => children.push(key),
                            None => {
                                self.deferred_creates.insert(parent, vec![key]);
                            }
                        }
                    }
                    None => self.send_create_request(key),
                }
                debug!(%key, ?placeholder, prefab, "spawned object");
                Ok(key)
            }
        }
    }

    fn create_message(&self, key: ObjectKey) -> Result<ReplicationMessage> {
        let object = self
            .arena
            .get(&key)
            .ok_or(ReplicationError::UnknownObjectKey(key))?;
        let parent = object
            .state()
            .parent()
            .and_then(|parent| self.arena.get(&parent))
            .map(|parent| parent.network_id())
            .filter(|id| id.is_registered());
        Ok(ReplicationMessage::Create {
            network_id: object.network_id(),
            prefab: object.prefab().into(),
            parent,
            persistent: object.state().persistent(),
            snapshot: object.serialize_networked_variables()?,
        })
    }

    fn send_create_request(&mut self, key: ObjectKey) {
        match self.create_message(key) {
            Ok(message) => {
                if let Some(object) = self.arena.get_mut(&key) {
                    object.clear_dirty();
                }
                self.send(SendTarget::Only(PeerId::Server), message);
            }
            Err(e) => error!(%key, "could not build create request: {e}"),
        }
    }

    /// Bind `network_id` to the object `key`.
    ///
    /// The first positive id fires the object's first-registration hook, then any delete or child
    /// creation that was waiting for it. Binding an id that belongs to another live object
    /// fails and leaves the registry untouched, as does binding a client-side object or giving a
    /// registered object another id.
    pub fn try_set_network_id(&mut self, key: ObjectKey, network_id: NetworkId) -> Result<()> {
        if let Some(existing) = self.objects.get(&network_id).copied() {
            if existing == key {
                return Ok(());
            }
            error!(?network_id, %existing, new = %key, "network id is already bound to a live object");
            return Err(ReplicationError::DuplicateNetworkId {
                network_id,
                existing,
                new: key,
            });
        }
        let object = self
            .arena
            .get_mut(&key)
            .ok_or(ReplicationError::UnknownObjectKey(key))?;
        if object.state().is_client_side() {
            error!(%key, ?network_id, "client-side objects are never bound to a network id");
            return Err(ReplicationError::ClientSideObject(key));
        }
        let previous = object.network_id();
        // a registered object keeps its id until it is forgotten
        if previous.is_registered() {
            error!(%key, ?previous, ?network_id, "object is already registered");
            return Err(ReplicationError::Rebind {
                key,
                current: previous,
                requested: network_id,
            });
        }
        self.placeholders.remove(&previous);
        let first = object.assign_network_id(network_id);
        if network_id.is_registered() {
            self.objects.insert(network_id, key);
            self.recently_forgotten.remove(&network_id);
            trace!(%key, ?network_id, "registered object");
            if first {
                self.on_first_registration(key);
            }
        } else {
            self.placeholders.insert(network_id, key);
        }
        Ok(())
    }

    /// Same as [`ReplicationContext::try_set_network_id`], but a failure is fatal
    pub fn set_network_id(&mut self, key: ObjectKey, network_id: NetworkId) {
        if let Err(e) = self.try_set_network_id(key, network_id) {
            panic!("could not set the network id of {key}: {e}");
        }
    }

    fn on_first_registration(&mut self, key: ObjectKey) {
        if let Some(callback) = self.deferred_deletes.remove(&key) {
            debug!(%key, "running deferred delete");
            self.delete_registered(key, callback);
            return;
        }
        if let Some(children) = self.deferred_creates.remove(&key) {
            for child in children {
                if self.arena.contains_key(&child) {
                    self.send_create_request(child);
                }
            }
        }
    }

    /// Delete an object.
    ///
    /// Client-side objects are torn down immediately and `on_confirmed` runs synchronously.
    /// Replicated objects are hidden right away. If the object has no id yet, the delete runs once it
    /// is registered. Otherwise the object is forgotten locally and, on a client, the server is
    /// asked to delete it; `on_confirmed` then runs when the server confirms.
    pub fn delete(&mut self, key: ObjectKey, on_confirmed: Option<DeleteCallback>) -> Result<()> {
        let Some(object) = self.arena.get_mut(&key) else {
            warn!(%key, "delete of an unknown object");
            return Err(ReplicationError::UnknownObjectKey(key));
        };
        if object.state().is_client_side() {
            self.forget_objects(key, true);
            if let Some(callback) = on_confirmed {
                callback(NetworkId::NONE);
            }
            return Ok(());
        }
        object.deactivate();
        if !object.state().is_registered() {
            if self.deferred_deletes.contains_key(&key) {
                debug!(%key, "delete already queued");
            } else {
                debug!(%key, "delete deferred until the object is registered");
                self.deferred_deletes.insert(key, on_confirmed);
            }
            return Ok(());
        }
        self.delete_registered(key, on_confirmed);
        Ok(())
    }

    fn delete_registered(&mut self, key: ObjectKey, on_confirmed: Option<DeleteCallback>) {
        let Some(network_id) = self.arena.get(&key).map(|object| object.network_id()) else {
            return;
        };
        match self.role {
            Role::Client => {
                let ack = on_confirmed.is_some();
                if let Some(callback) = on_confirmed {
                    self.delete_callbacks.insert(network_id, callback);
                }
                self.send(
                    SendTarget::Only(PeerId::Server),
                    ReplicationMessage::DeleteRequest { network_id, ack },
                );
                self.forget_objects(key, true);
            }
            Role::Server => {
                self.forget_objects(key, true);
                self.send(
                    SendTarget::All,
                    ReplicationMessage::Forget {
                        network_id,
                        deleting: true,
                    },
                );
                if let Some(callback) = on_confirmed {
                    callback(network_id);
                }
            }
        }
    }

    /// Remove an object and its descendants from this participant.
    ///
    /// `deleting` is false when the object only went out of range. On the server the other
    /// participants are told to forget it as well.
    pub fn forget(&mut self, key: ObjectKey, deleting: bool) -> Result<()> {
        let network_id = self
            .arena
            .get(&key)
            .map(|object| object.network_id())
            .ok_or(ReplicationError::UnknownObjectKey(key))?;
        self.forget_objects(key, deleting);
        if self.role == Role::Server && network_id.is_registered() {
            self.send(
                SendTarget::All,
                ReplicationMessage::Forget {
                    network_id,
                    deleting,
                },
            );
        }
        Ok(())
    }

    /// Forget an object that went out of range. Persistent objects are kept.
    ///
    /// Returns true if the object was forgotten.
    pub fn unload(&mut self, key: ObjectKey) -> Result<bool> {
        let object = self
            .arena
            .get(&key)
            .ok_or(ReplicationError::UnknownObjectKey(key))?;
        if object.state().persistent() {
            trace!(%key, "persistent object is not unloaded");
            return Ok(false);
        }
        self.forget(key, false)?;
        Ok(true)
    }

    /// Remove `root` and its descendants, top-down. Returns the registered ids that were forgotten.
    fn forget_objects(&mut self, root: ObjectKey, deleting: bool) -> Vec<NetworkId> {
        let Some(parent) = self.arena.get(&root).map(|object| object.state().parent()) else {
            return Vec::new();
        };
        if let Some(parent) = parent.and_then(|parent| self.arena.get_mut(&parent)) {
            parent.remove_child(root);
        }

        let mut order = vec![root];
        let mut i = 0;
        while i < order.len() {
            if let Some(object) = self.arena.get(&order[i]) {
                order.extend(object.state().children().iter().copied());
            }
            i += 1;
        }

        let now = Instant::now();
        let mut forgotten = Vec::new();
        for key in order {
            let Some(mut object) = self.arena.remove(&key) else {
                continue;
            };
            let network_id = object.network_id();
            if network_id.is_registered() {
                self.objects.remove(&network_id);
                self.recently_forgotten.insert(network_id, now);
                self.authority.remove(network_id);
                forgotten.push(network_id);
            } else {
                self.placeholders.remove(&network_id);
            }
            self.deferred_creates.remove(&key);
            if let Some(Some(callback)) = self.deferred_deletes.remove(&key) {
                if deleting {
                    callback(network_id);
                } else {
                    debug!(%key, "dropping deferred delete of an unloaded object");
                }
            }
            object.run_forget_hooks(deleting);
            debug!(%key, ?network_id, deleting, "forgot object");
        }
        forgotten
    }

    pub fn gain_authority(&mut self, key: ObjectKey) -> Result<()> {
        self.arena
            .get_mut(&key)
            .ok_or(ReplicationError::UnknownObjectKey(key))?
            .gain_authority();
        Ok(())
    }

    pub fn lose_authority(&mut self, key: ObjectKey) -> Result<()> {
        self.arena
            .get_mut(&key)
            .ok_or(ReplicationError::UnknownObjectKey(key))?
            .lose_authority();
        Ok(())
    }

    /// Give the authority over `network_id` to `peer`
    pub fn transfer_authority(&mut self, network_id: NetworkId, peer: PeerId) -> Result<()> {
        if self.role != Role::Server {
            return Err(ReplicationError::ServerOnly("transfer_authority"));
        }
        let key = self
            .key_of(network_id)
            .ok_or(ReplicationError::UnknownObject(network_id))?;
        let previous = self.authority.set_owner(network_id, peer);
        if previous == Some(peer) {
            return Ok(());
        }
        match previous {
            Some(PeerId::Server) => {
                if let Some(object) = self.arena.get_mut(&key) {
                    object.lose_authority();
                }
            }
            Some(previous) => self.send(
                SendTarget::Only(previous),
                ReplicationMessage::Authority {
                    network_id,
                    granted: false,
                },
            ),
            None => {}
        }
        match peer {
            PeerId::Server => {
                if let Some(object) = self.arena.get_mut(&key) {
                    object.gain_authority();
                }
            }
            peer => self.send(
                SendTarget::Only(peer),
                ReplicationMessage::Authority {
                    network_id,
                    granted: true,
                },
            ),
        }
        info!(?network_id, ?previous, new = ?peer, "transferred authority");
        Ok(())
    }

    /// The objects owned by `peer` go back to the server
    pub fn on_peer_disconnected(&mut self, peer: PeerId) {
        if self.role != Role::Server {
            return;
        }
        let owned = self.authority.owned_by(peer);
        for network_id in owned.iter() {
            self.authority.set_owner(*network_id, PeerId::Server);
            if let Some(object) = self
                .key_of(*network_id)
                .and_then(|key| self.arena.get_mut(&key))
            {
                object.gain_authority();
            }
        }
        info!(?peer, objects = owned.len(), "peer disconnected, authority returned to the server");
    }

    /// Run one network tick: advance every registered object, then queue the variables
    /// written by the authority since the last tick.
    pub fn network_update(&mut self, delta: f32) {
        // snapshot the keys so that hooks cannot disturb the iteration
        let mut keys: Vec<ObjectKey> = self
            .arena
            .iter()
            .filter(|(_, object)| {
                object.state().is_registered() && !object.state().is_client_side()
            })
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        let target = self.update_target();
        for key in keys {
            let Some(object) = self.arena.get_mut(&key) else {
                continue;
            };
            object.network_update(delta);
            if !object.has_authority() {
                continue;
            }
            let network_id = object.network_id();
            match object.take_dirty_updates() {
                Ok(updates) => {
                    for (index, payload) in updates {
                        self.outgoing.push(Outgoing {
                            target,
                            message: ReplicationMessage::VariableUpdate {
                                network_id,
                                index,
                                payload,
                            },
                        });
                    }
                }
                Err(e) => error!(?network_id, "could not serialize variable update: {e}"),
            }
        }
    }

    /// Evict the ids that were forgotten more than `client_timeout` ago.
    ///
    /// On the server the evicted ids become available again. Returns the number of evicted ids.
    pub fn sweep_recently_forgotten(&mut self) -> usize {
        let now = Instant::now();
        let timeout = self.config.client_timeout;
        let mut evicted = Vec::new();
        self.recently_forgotten.retain(|network_id, forgotten_at| {
            let keep = now.duration_since(*forgotten_at) <= timeout;
            if !keep {
                evicted.push(*network_id);
            }
            keep
        });
        evicted.sort();
        if self.role == Role::Server {
            for network_id in evicted.iter() {
                self.allocator.recycle(*network_id);
            }
        }
        if !evicted.is_empty() {
            trace!(?evicted, "evicted recently forgotten ids");
        }
        evicted.len()
    }

    /// Creation messages for every registered object, parents first.
    ///
    /// Sent to a client that just connected.
    pub fn snapshot_messages(&self) -> Vec<ReplicationMessage> {
        let mut keys: Vec<ObjectKey> = self.objects.values().copied().collect();
        // parents are always created before their children
        keys.sort();
        keys.into_iter()
            .filter_map(|key| match self.create_message(key) {
                Ok(message) => Some(message),
                Err(e) => {
                    error!(%key, "could not snapshot object: {e}");
                    None
                }
            })
            .collect()
    }

    /// Apply a message received from `from`.
    ///
    /// Errors are logged here; they never leave the context in an inconsistent state.
    pub fn receive(&mut self, from: PeerId, message: ReplicationMessage) -> Result<()> {
        let kind = message.kind();
        trace!(?from, kind, "received replication message");
        let result = self.handle(from, message);
        if let Err(e) = &result {
            match e {
                ReplicationError::UnknownObject(_) if !self.config.warn_on_missing_id => {
                    debug!(?from, kind, "dropped replication message: {e}")
                }
                _ => warn!(?from, kind, "dropped replication message: {e}"),
            }
        }
        result
    }

    fn handle(&mut self, from: PeerId, message: ReplicationMessage) -> Result<()> {
        match (self.role, message) {
            (
                Role::Server,
                ReplicationMessage::Create {
                    network_id,
                    prefab,
                    parent,
                    persistent,
                    snapshot,
                },
            ) => self.receive_create_request(from, network_id, prefab, parent, persistent, snapshot),
            (
                Role::Client,
                ReplicationMessage::Create {
                    network_id,
                    prefab,
                    parent,
                    persistent,
                    snapshot,
                },
            ) => self.receive_create(network_id, &prefab, parent, persistent, &snapshot),
            (
                Role::Client,
                ReplicationMessage::AssignId {
                    placeholder,
                    network_id,
                },
            ) => {
                let key = self
                    .placeholders
                    .get(&placeholder)
                    .copied()
                    .ok_or(ReplicationError::UnknownPlaceholder(placeholder))?;
                self.try_set_network_id(key, network_id)
            }
            (
                _,
                ReplicationMessage::VariableUpdate {
                    network_id,
                    index,
                    payload,
                },
            ) => self.receive_variable_update(from, network_id, index, payload),
            (Role::Server, ReplicationMessage::DeleteRequest { network_id, ack }) => {
                let result = match self.key_of(network_id) {
                    Some(key) => {
                        self.forget_objects(key, true);
                        self.send(
                            SendTarget::AllExcept(from),
                            ReplicationMessage::Forget {
                                network_id,
                                deleting: true,
                            },
                        );
                        Ok(())
                    }
                    None if self.recently_forgotten.contains_key(&network_id) => {
                        debug!(?network_id, "delete request for an object that is already gone");
                        Ok(())
                    }
                    None => Err(ReplicationError::UnknownObject(network_id)),
                };
                // the requester already forgot the object, it only waits for the confirmation
                if ack {
                    self.send(
                        SendTarget::Only(from),
                        ReplicationMessage::DeleteConfirmed { network_id },
                    );
                }
                result
            }
            (Role::Client, ReplicationMessage::DeleteConfirmed { network_id }) => {
                let callback = self
                    .delete_callbacks
                    .remove(&network_id)
                    .ok_or(ReplicationError::UnknownDeleteConfirmation(network_id))?;
                callback(network_id);
                Ok(())
            }
            (
                Role::Client,
                ReplicationMessage::Forget {
                    network_id,
                    deleting,
                },
            ) => {
                match self.key_of(network_id) {
                    Some(key) => {
                        self.forget_objects(key, deleting);
                    }
                    None if self.recently_forgotten.contains_key(&network_id) => {}
                    None => return Err(ReplicationError::UnknownObject(network_id)),
                }
                Ok(())
            }
            (
                Role::Client,
                ReplicationMessage::Authority {
                    network_id,
                    granted,
                },
            ) => {
                let Some(key) = self.key_of(network_id) else {
                    if self.recently_forgotten.contains_key(&network_id) {
                        return Ok(());
                    }
                    return Err(ReplicationError::UnknownObject(network_id));
                };
                if granted {
                    self.gain_authority(key)
                } else {
                    self.lose_authority(key)
                }
            }
            (_, message) => Err(ReplicationError::UnexpectedMessage {
                from,
                kind: message.kind(),
            }),
        }
    }

    /// A client asks for the creation of an object it spawned
    fn receive_create_request(
        &mut self,
        from: PeerId,
        placeholder: NetworkId,
        prefab: alloc::string::String,
        parent: Option<NetworkId>,
        persistent: bool,
        snapshot: Bytes,
    ) -> Result<()> {
        if placeholder.is_registered() {
            return Err(ReplicationError::UnexpectedMessage {
                from,
                kind: "create with a registered id",
            });
        }
        let parent_key = match parent {
            Some(parent) => Some(
                self.key_of(parent)
                    .ok_or(ReplicationError::UnknownObject(parent))?,
            ),
            None => None,
        };
        let builder = self
            .prefabs
            .instantiate(&prefab)
            .ok_or_else(|| ReplicationError::UnknownPrefab(prefab.clone()))?
            .persistent(persistent);
        let network_id = self.allocator.allocate().ok_or(ReplicationError::IdsExhausted)?;
        let key = match self.insert_object(builder, parent_key, false, Some(&snapshot)) {
            Ok(key) => key,
            Err(e) => {
                self.allocator.recycle(network_id);
                return Err(e);
            }
        };
        self.authority.set_owner(network_id, from);
        self.try_set_network_id(key, network_id)?;
        debug!(?from, ?placeholder, ?network_id, %key, "created object requested by a client");
        self.send(
            SendTarget::Only(from),
            ReplicationMessage::AssignId {
                placeholder,
                network_id,
            },
        );
        self.send(
            SendTarget::AllExcept(from),
            ReplicationMessage::Create {
                network_id,
                prefab,
                parent,
                persistent,
                snapshot,
            },
        );
        Ok(())
    }

    /// The server announces an object
    fn receive_create(
        &mut self,
        network_id: NetworkId,
        prefab: &str,
        parent: Option<NetworkId>,
        persistent: bool,
        snapshot: &[u8],
    ) -> Result<()> {
        if !network_id.is_registered() {
            return Err(ReplicationError::UnexpectedMessage {
                from: PeerId::Server,
                kind: "create with a placeholder id",
            });
        }
        if self.objects.contains_key(&network_id) {
            return Err(ReplicationError::AlreadyRegistered(network_id));
        }
        let parent_key = match parent {
            Some(parent) => Some(
                self.key_of(parent)
                    .ok_or(ReplicationError::UnknownObject(parent))?,
            ),
            None => None,
        };
        let builder = self
            .prefabs
            .instantiate(prefab)
            .ok_or_else(|| ReplicationError::UnknownPrefab(prefab.into()))?
            .persistent(persistent);
        let key = self.insert_object(builder, parent_key, false, Some(snapshot))?;
        self.try_set_network_id(key, network_id)?;
        debug!(?network_id, %key, prefab, "created remote object");
        Ok(())
    }

    fn receive_variable_update(
        &mut self,
        from: PeerId,
        network_id: NetworkId,
        index: u16,
        payload: Bytes,
    ) -> Result<()> {
        let Some(key) = self.key_of(network_id) else {
            if self.recently_forgotten.contains_key(&network_id) {
                trace!(?network_id, index, "update for a recently forgotten object");
                return Ok(());
            }
            return Err(ReplicationError::UnknownObject(network_id));
        };
        if self.role == Role::Server {
            let owner = self.authority.owner(network_id);
            if owner != Some(from) {
                return Err(ReplicationError::NotOwner {
                    network_id,
                    peer: from,
                    owner,
                });
            }
        }
        let object = self
            .arena
            .get_mut(&key)
            .ok_or(ReplicationError::UnknownObjectKey(key))?;
        if object.has_authority() {
            debug!(?network_id, index, "ignoring update for an object this participant has authority over");
            return Ok(());
        }
        let mut offset = 0;
        object.variable_update(usize::from(index), &payload, &mut offset, payload.len())?;
        if self.role == Role::Server {
            self.send(
                SendTarget::AllExcept(from),
                ReplicationMessage::VariableUpdate {
                    network_id,
                    index,
                    payload,
                },
            );
        }
        Ok(())
    }

    /// Tear down every object and pending operation, for example after a disconnection
    pub fn reset(&mut self) {
        let mut roots: Vec<ObjectKey> = self
            .arena
            .iter()
            .filter(|(_, object)| object.state().parent().is_none())
            .map(|(key, _)| *key)
            .collect();
        roots.sort();
        for root in roots {
            self.forget_objects(root, false);
        }
        if !self.delete_callbacks.is_empty() {
            warn!(
                pending = self.delete_callbacks.len(),
                "dropping delete confirmations that will never arrive"
            );
        }
        self.arena.clear();
        self.objects.clear();
        self.recently_forgotten.clear();
        self.delete_callbacks.clear();
        self.placeholders.clear();
        self.next_placeholder = -1;
        self.deferred_deletes.clear();
        self.deferred_creates.clear();
        self.allocator.reset();
        self.authority.clear();
        self.outgoing.clear();
        info!(role = ?self.role, "replication context reset");
    }
}
