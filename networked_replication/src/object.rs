//! Networked objects
//!
//! A [`NetworkedObject`] is the unit of replication: it owns a set of networked variables
//! (three reserved position slots followed by its own and its extenders' variables), carries a
//! network id and an authority flag, and has a parent/children relationship with other objects.
//!
//! Game logic is plugged in through a [`NetworkedBehaviour`], whose hooks are invoked by the object
//! and by the [`ReplicationContext`](crate::registry::ReplicationContext) during its lifecycle:
//! - `on_create` once the variables are initialized (and the creation snapshot applied, for remote objects)
//! - `on_first_register` exactly once, when the object receives its positive network id
//! - `on_network_update` every tick, after the position smoothing
//! - `on_gain_authority` / `on_lose_authority` when the authority flag flips
//! - `on_deactivate` when the object is hidden pending its deletion
//! - `on_forget` when the object leaves the registry
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;

use bevy_math::Vec3;
use bytes::Bytes;
use networked_core::id::{NetworkId, ObjectKey};
use networked_serde::{Reader, SerializationError, Writer};
use tracing::{error, trace};

use crate::error::{ReplicationError, Result};
use crate::extension::Extender;
use crate::layout::{Scope, VariableDeclarations, VariableSet};
use crate::variable::VariableValue;

/// Game-specific behaviour of a networked object
#[allow(unused_variables)]
pub trait NetworkedBehaviour: Any + Send + Sync {
    /// Name of the prefab used to instantiate this object on remote participants
    fn prefab(&self) -> &'static str;

    /// Declare the object's own variables. Called once per object.
    fn declare_variables(&mut self, variables: &mut VariableDeclarations) {}

    fn on_create(&mut self, state: &mut NetworkState) {}

    fn on_first_register(&mut self, state: &mut NetworkState) {}

    fn on_network_update(&mut self, state: &mut NetworkState, delta: f32) {}

    fn on_gain_authority(&mut self, state: &mut NetworkState) {}

    fn on_lose_authority(&mut self, state: &mut NetworkState) {}

    fn on_deactivate(&mut self, state: &mut NetworkState) {}

    /// `deleting` is false if the object only went out of range
    fn on_forget(&mut self, state: &mut NetworkState, deleting: bool) {}

    fn on_networked_child_added(&mut self, state: &mut NetworkState, child: ObjectKey) {}

    fn on_networked_child_removed(&mut self, state: &mut NetworkState, child: ObjectKey) {}
}

/// Everything needed to construct a [`NetworkedObject`]
pub struct ObjectBuilder {
    behaviour: Box<dyn NetworkedBehaviour>,
    extenders: Vec<Box<dyn Extender>>,
    client_side: bool,
    persistent: bool,
    position: Option<Vec3>,
}

impl ObjectBuilder {
    pub fn new(behaviour: impl NetworkedBehaviour) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            extenders: Vec::new(),
            client_side: false,
            persistent: false,
            position: None,
        }
    }

    /// The object is purely local: it is never given an id nor replicated
    pub fn client_side(mut self) -> Self {
        self.client_side = true;
        self
    }

    /// The object survives range-based unloading
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Attach an extender. Panics if an extender with the same type tag is already attached.
    pub fn extend(mut self, extender: impl Extender) -> Self {
        let tag = extender.type_tag();
        if self.extenders.iter().any(|e| e.type_tag() == tag) {
            panic!(
                "extender {tag:?} attached twice to a {:?}",
                self.behaviour.prefab()
            );
        }
        self.extenders.push(Box::new(extender));
        self.extenders.sort_by_key(|e| e.type_tag());
        self
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn prefab(&self) -> &'static str {
        self.behaviour.prefab()
    }

    pub fn is_client_side(&self) -> bool {
        self.client_side
    }
}

/// Replication state of an object, visible to the behaviour hooks
pub struct NetworkState {
    key: ObjectKey,
    network_id: NetworkId,
    has_authority: bool,
    is_client_side: bool,
    persistent: bool,
    active: bool,
    registered_once: bool,
    parent: Option<ObjectKey>,
    children: Vec<ObjectKey>,
    variables: VariableSet,
    local_position: Vec3,
}

impl NetworkState {
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn is_registered(&self) -> bool {
        self.network_id.is_registered()
    }

    pub fn has_authority(&self) -> bool {
        self.has_authority
    }

    pub fn is_client_side(&self) -> bool {
        self.is_client_side
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    /// False once the object has been hidden by a delete
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn parent(&self) -> Option<ObjectKey> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectKey] {
        &self.children
    }

    pub fn variables(&self) -> &VariableSet {
        &self.variables
    }

    /// Direct access to the variables.
    ///
    /// Writing a variable without authority is a contract violation: the value would be
    /// overwritten by the next update and never replicated. Prefer [`NetworkState::set`].
    pub fn variables_mut(&mut self) -> &mut VariableSet {
        &mut self.variables
    }

    /// Smoothed position of the object
    pub fn position(&self) -> Vec3 {
        self.variables.position().unwrap_or(self.local_position)
    }

    pub fn set_position(&mut self, position: Vec3) -> Result<()> {
        self.check_authority()?;
        if self.is_client_side {
            self.local_position = position;
        } else {
            self.variables.set_position(position);
        }
        Ok(())
    }

    /// Value of one of the object's own variables
    pub fn value<T: VariableValue>(&self, name: &str) -> Option<&T> {
        self.variables.get(Scope::Own, name)
    }

    /// Value of a variable contributed by the extender `tag`
    pub fn extension_value<T: VariableValue>(&self, tag: &'static str, name: &str) -> Option<&T> {
        self.variables.get(Scope::Extension(tag), name)
    }

    /// Authoritative write of one of the object's own variables
    pub fn set<T: VariableValue>(&mut self, name: &'static str, value: T) -> Result<()> {
        self.write(Scope::Own, name, value)
    }

    pub fn set_extension<T: VariableValue>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        value: T,
    ) -> Result<()> {
        self.write(Scope::Extension(tag), name, value)
    }

    fn write<T: VariableValue>(&mut self, scope: Scope, name: &'static str, value: T) -> Result<()> {
        self.check_authority()?;
        if !self.variables.set(scope, name, value) {
            return Err(ReplicationError::UnknownVariable { name });
        }
        Ok(())
    }

    fn check_authority(&self) -> Result<()> {
        if !self.has_authority {
            error!(
                key = %self.key,
                network_id = ?self.network_id,
                "write to a networked variable without authority"
            );
            return Err(ReplicationError::NotAuthority(self.key));
        }
        Ok(())
    }
}

pub struct NetworkedObject {
    state: NetworkState,
    behaviour: Box<dyn NetworkedBehaviour>,
    extenders: Vec<Box<dyn Extender>>,
    variables_initialized: bool,
    initial_position: Option<Vec3>,
}

impl NetworkedObject {
    pub fn new(key: ObjectKey, builder: ObjectBuilder, has_authority: bool) -> Self {
        Self {
            state: NetworkState {
                key,
                network_id: NetworkId::NONE,
                has_authority,
                is_client_side: builder.client_side,
                persistent: builder.persistent,
                active: true,
                registered_once: false,
                parent: None,
                children: Vec::new(),
                variables: VariableSet::default(),
                local_position: builder.position.unwrap_or(Vec3::ZERO),
            },
            behaviour: builder.behaviour,
            extenders: builder.extenders,
            variables_initialized: false,
            initial_position: builder.position,
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.state.key
    }

    pub fn network_id(&self) -> NetworkId {
        self.state.network_id
    }

    pub fn has_authority(&self) -> bool {
        self.state.has_authority
    }

    pub fn prefab(&self) -> &'static str {
        self.behaviour.prefab()
    }

    pub fn state(&self) -> &NetworkState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut NetworkState {
        &mut self.state
    }

    pub fn behaviour<B: NetworkedBehaviour>(&self) -> Option<&B> {
        let behaviour: &dyn Any = &*self.behaviour;
        behaviour.downcast_ref::<B>()
    }

    pub fn behaviour_mut<B: NetworkedBehaviour>(&mut self) -> Option<&mut B> {
        let behaviour: &mut dyn Any = &mut *self.behaviour;
        behaviour.downcast_mut::<B>()
    }

    pub fn extender<E: Extender>(&self) -> Option<&E> {
        self.extenders.iter().find_map(|extender| {
            let extender: &dyn Any = &**extender;
            extender.downcast_ref::<E>()
        })
    }

    /// Build the variable slots of the object and bind them.
    ///
    /// Runs once per object; client-side objects have no variables.
    pub fn init_network_variables(&mut self, lerp_speed: f32) {
        if self.state.is_client_side || self.variables_initialized {
            return;
        }
        let mut own = VariableDeclarations::default();
        self.behaviour.declare_variables(&mut own);
        let extensions = self
            .extenders
            .iter_mut()
            .map(|extender| {
                let mut declarations = VariableDeclarations::default();
                extender.init_networked_variables(&mut declarations);
                (extender.type_tag(), declarations)
            })
            .collect();
        self.state.variables = VariableSet::build(self.state.key, own, extensions, lerp_speed);
        if let Some(position) = self.initial_position.take() {
            self.state.variables.set_position(position);
        }
        self.variables_initialized = true;
    }

    /// Advance the smoothed variables, then run the behaviour's per-tick hook
    pub fn network_update(&mut self, delta: f32) {
        self.state
            .variables
            .smooth(delta, self.state.has_authority);
        self.behaviour.on_network_update(&mut self.state, delta);
    }

    /// Full-state snapshot: for each slot in order, `[i32 LE payload length][payload]`
    pub fn serialize_networked_variables(&self) -> core::result::Result<Bytes, SerializationError> {
        let mut writer = Writer::default();
        for (_, variable) in self.state.variables.iter() {
            let position = writer.len();
            writer.write_i32(0)?;
            variable.serialize(&mut writer)?;
            let length = writer.len() - position - 4;
            let length = i32::try_from(length)
                .map_err(|_| SerializationError::InvalidLength(length as i64))?;
            writer.patch_i32(position, length);
        }
        Ok(writer.to_bytes())
    }

    /// Apply the `length` bytes at `offset` in `buffer` to the variable at `index`.
    ///
    /// The offset is moved past the payload even if the payload could not be applied, so that the
    /// rest of the buffer stays readable. Errors are logged here and leave every variable untouched.
    pub fn variable_update(
        &mut self,
        index: usize,
        buffer: &[u8],
        offset: &mut usize,
        length: usize,
    ) -> Result<()> {
        let network_id = self.state.network_id;
        let have = buffer.len().saturating_sub(*offset);
        if length > have {
            error!(?network_id, index, length, have, "variable update exceeds the buffer");
            return Err(SerializationError::BufferTooShort { need: length, have }.into());
        }
        let payload = &buffer[*offset..*offset + length];
        *offset += length;

        let slots = self.state.variables.len();
        let Some(variable) = self.state.variables.slot_mut(index) else {
            error!(
                ?network_id,
                index,
                slots,
                prefab = self.behaviour.prefab(),
                "variable update for an unknown slot, participants disagree on the variable layout"
            );
            return Err(ReplicationError::UnknownVariableIndex {
                network_id,
                index,
                slots,
            });
        };
        let kind = variable.kind();
        let mut reader = Reader::from(payload);
        if let Err(e) = variable.deserialize(&mut reader, length) {
            error!(?network_id, index, kind, ?e, "malformed variable update");
            return Err(e.into());
        }
        trace!(?network_id, index, kind, "applied variable update");
        Ok(())
    }

    /// Apply a snapshot produced by [`NetworkedObject::serialize_networked_variables`]
    pub fn apply_snapshot(&mut self, snapshot: &[u8]) -> Result<()> {
        let mut offset = 0;
        let mut index = 0;
        while offset < snapshot.len() {
            let length = networked_serde::decode::<i32>(snapshot, &mut offset)?;
            let length = usize::try_from(length)
                .map_err(|_| SerializationError::InvalidLength(length as i64))?;
            if length > snapshot.len() - offset {
                return Err(SerializationError::BufferTooShort {
                    need: length,
                    have: snapshot.len() - offset,
                }
                .into());
            }
            // a single bad slot does not prevent the others from being applied
            let _ = self.variable_update(index, snapshot, &mut offset, length);
            index += 1;
        }
        Ok(())
    }

    pub fn gain_authority(&mut self) {
        if self.state.has_authority {
            return;
        }
        self.state.has_authority = true;
        // the local value becomes the one that is replicated
        self.state.variables.smooth(0.0, true);
        for extender in self.extenders.iter_mut() {
            extender.on_authority_change(&self.state, true);
        }
        self.behaviour.on_gain_authority(&mut self.state);
    }

    pub fn lose_authority(&mut self) {
        if !self.state.has_authority {
            return;
        }
        self.state.has_authority = false;
        for extender in self.extenders.iter_mut() {
            extender.on_authority_change(&self.state, false);
        }
        self.behaviour.on_lose_authority(&mut self.state);
    }

    pub fn value<T: VariableValue>(&self, name: &str) -> Option<&T> {
        self.state.value(name)
    }

    pub fn extension_value<T: VariableValue>(&self, tag: &'static str, name: &str) -> Option<&T> {
        self.state.extension_value(tag, name)
    }

    /// Authoritative write. Fails with [`ReplicationError::NotAuthority`] without authority.
    pub fn set<T: VariableValue>(&mut self, name: &'static str, value: T) -> Result<()> {
        self.state.set(name, value)
    }

    pub fn set_extension<T: VariableValue>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        value: T,
    ) -> Result<()> {
        self.state.set_extension(tag, name, value)
    }

    pub fn position(&self) -> Vec3 {
        self.state.position()
    }

    pub fn set_position(&mut self, position: Vec3) -> Result<()> {
        self.state.set_position(position)
    }

    /// Serialize the variables written since the last call, as `(slot index, payload)`
    pub(crate) fn take_dirty_updates(
        &mut self,
    ) -> core::result::Result<Vec<(u16, Bytes)>, SerializationError> {
        let mut updates = Vec::new();
        for index in 0..self.state.variables.len() {
            let Some(variable) = self.state.variables.slot_mut(index) else {
                continue;
            };
            if !variable.is_dirty() {
                continue;
            }
            let mut writer = Writer::default();
            variable.serialize(&mut writer)?;
            variable.clear_dirty();
            let index =
                u16::try_from(index).map_err(|_| SerializationError::InvalidLength(index as i64))?;
            updates.push((index, writer.to_bytes()));
        }
        Ok(updates)
    }

    /// The current values were sent in full, nothing is pending
    pub(crate) fn clear_dirty(&mut self) {
        self.state.variables.clear_dirty();
    }

    pub(crate) fn on_create(&mut self) {
        self.behaviour.on_create(&mut self.state);
    }

    /// Set the id field. Returns true if this is the first registration of the object.
    pub(crate) fn assign_network_id(&mut self, network_id: NetworkId) -> bool {
        self.state.network_id = network_id;
        if network_id.is_registered() && !self.state.registered_once {
            self.state.registered_once = true;
            self.behaviour.on_first_register(&mut self.state);
            return true;
        }
        false
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ObjectKey>) {
        self.state.parent = parent;
    }

    pub(crate) fn add_child(&mut self, child: ObjectKey) {
        self.state.children.push(child);
        self.behaviour.on_networked_child_added(&mut self.state, child);
    }

    pub(crate) fn remove_child(&mut self, child: ObjectKey) {
        self.state.children.retain(|c| *c != child);
        self.behaviour
            .on_networked_child_removed(&mut self.state, child);
    }

    /// Hide the object while its deletion is pending
    pub(crate) fn deactivate(&mut self) {
        if !self.state.active {
            return;
        }
        self.state.active = false;
        self.behaviour.on_deactivate(&mut self.state);
    }

    pub(crate) fn run_forget_hooks(&mut self, deleting: bool) {
        for extender in self.extenders.iter_mut() {
            extender.on_forget(&self.state, deleting);
        }
        self.behaviour.on_forget(&mut self.state, deleting);
        self.state.active = false;
    }
}
