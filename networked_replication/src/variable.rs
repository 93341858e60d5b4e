//! Networked variables: single replicated fields of a [`NetworkedObject`](crate::object::NetworkedObject)
//!
//! A variable knows how to write its value and how to read it back from an update. It is bound
//! once to its owning object and to its slot index; the index is how updates address it on the wire.
use alloc::boxed::Box;
use core::any::Any;
use core::fmt::Debug;

use networked_core::id::ObjectKey;
use networked_serde::{Reader, SerializationError, ToBytes, Writer};
use tracing::trace;

/// Values that can be stored in a [`Networked`] variable
pub trait VariableValue: ToBytes + Clone + PartialEq + Debug + Send + Sync + 'static {}

impl<T: ToBytes + Clone + PartialEq + Debug + Send + Sync + 'static> VariableValue for T {}

/// Owner and slot index of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableBinding {
    pub owner: ObjectKey,
    pub index: usize,
}

/// When the change callback of a variable is invoked on receipt of an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeNotify {
    /// Every received update invokes the callback, even if the value did not change.
    ///
    /// Receiving the value can be meaningful in itself (trigger-like variables).
    #[default]
    OnReceive,
    /// Only invoke the callback if the decoded value differs from the current one
    OnChange,
}

pub type ChangeCallback<T> = Box<dyn FnMut(&T) + Send + Sync>;

/// A single replicated field
pub trait NetworkedVariable: Any + Send + Sync {
    /// Write the current value
    fn serialize(&self, writer: &mut Writer) -> Result<(), SerializationError>;

    /// Read a new value that was encoded in exactly `length` bytes.
    ///
    /// If the payload is malformed, or does not span exactly `length` bytes, the current value is kept.
    fn deserialize(&mut self, reader: &mut Reader, length: usize) -> Result<(), SerializationError>;

    /// Bind the variable to its owner. Panics if the variable is already bound.
    fn set_owner_and_index(&mut self, owner: ObjectKey, index: usize);

    fn binding(&self) -> Option<VariableBinding>;

    /// True once the variable holds a value that was either received or written by the authority
    fn initialized(&self) -> bool;

    /// True if the value was written locally since the last update was sent
    fn is_dirty(&self) -> bool;

    fn clear_dirty(&mut self);

    /// Advance the local presentation of the value by `delta` seconds
    fn smooth(&mut self, _delta: f32, _has_authority: bool) {}

    /// Name of the value type, for logs
    fn kind(&self) -> &'static str;
}

/// A replicated value of type `T`
pub struct Networked<T: VariableValue> {
    value: T,
    initialized: bool,
    dirty: bool,
    binding: Option<VariableBinding>,
    notify: ChangeNotify,
    on_change: Option<ChangeCallback<T>>,
}

impl<T: VariableValue + Default> Default for Networked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: VariableValue> Debug for Networked<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Networked")
            .field("value", &self.value)
            .field("initialized", &self.initialized)
            .field("dirty", &self.dirty)
            .field("binding", &self.binding)
            .field("notify", &self.notify)
            .finish()
    }
}

impl<T: VariableValue> Networked<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            initialized: false,
            dirty: false,
            binding: None,
            notify: ChangeNotify::default(),
            on_change: None,
        }
    }

    pub fn with_notify(mut self, notify: ChangeNotify) -> Self {
        self.notify = notify;
        self
    }

    /// Callback invoked with the new value when an update is received,
    /// or when the authority writes a different value
    pub fn on_change(mut self, callback: impl FnMut(&T) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn notify(&self) -> ChangeNotify {
        self.notify
    }

    /// Write a new value locally; it will be included in the next outgoing update.
    ///
    /// Only the participant that has authority over the owning object may call this.
    /// [`NetworkedObject::set`](crate::object::NetworkedObject::set) enforces it.
    pub fn set(&mut self, value: T) {
        let changed = self.value != value;
        self.value = value;
        self.initialized = true;
        self.dirty = true;
        if changed {
            if let Some(callback) = self.on_change.as_mut() {
                callback(&self.value);
            }
        }
    }
}

impl<T: VariableValue> NetworkedVariable for Networked<T> {
    fn serialize(&self, writer: &mut Writer) -> Result<(), SerializationError> {
        self.value.to_bytes(writer)
    }

    fn deserialize(&mut self, reader: &mut Reader, length: usize) -> Result<(), SerializationError> {
        let start = reader.position();
        let value = T::from_bytes(reader)?;
        let consumed = reader.position() - start;
        if consumed != length {
            return Err(SerializationError::LengthMismatch {
                expected: length,
                consumed,
            });
        }
        let changed = self.value != value;
        self.value = value;
        self.initialized = true;
        trace!(binding = ?self.binding, value = ?self.value, "received variable");
        if changed || self.notify == ChangeNotify::OnReceive {
            if let Some(callback) = self.on_change.as_mut() {
                callback(&self.value);
            }
        }
        Ok(())
    }

    fn set_owner_and_index(&mut self, owner: ObjectKey, index: usize) {
        if let Some(binding) = self.binding {
            panic!(
                "variable already bound to {} at index {}",
                binding.owner, binding.index
            );
        }
        self.binding = Some(VariableBinding { owner, index });
    }

    fn binding(&self) -> Option<VariableBinding> {
        self.binding
    }

    fn initialized(&self) -> bool {
        self.initialized
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn kind(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}

/// A replicated float with a smoothed local view.
///
/// The raw value changes in discrete steps when updates arrive; the view moves
/// continuously towards it every tick. Used for the position slots.
#[derive(Debug)]
pub struct Smoothed {
    raw: Networked<f32>,
    view: f32,
    speed: f32,
}

impl Smoothed {
    pub fn new(value: f32, speed: f32) -> Self {
        Self {
            raw: Networked::new(value),
            view: value,
            speed,
        }
    }

    /// Last authoritative value
    pub fn get(&self) -> &f32 {
        self.raw.get()
    }

    /// Smoothed value, to use for presentation
    pub fn view(&self) -> f32 {
        self.view
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Authoritative write; the view follows immediately
    pub fn set(&mut self, value: f32) {
        self.raw.set(value);
        self.view = value;
    }
}

impl NetworkedVariable for Smoothed {
    fn serialize(&self, writer: &mut Writer) -> Result<(), SerializationError> {
        self.raw.serialize(writer)
    }

    fn deserialize(&mut self, reader: &mut Reader, length: usize) -> Result<(), SerializationError> {
        let first = !self.raw.initialized();
        self.raw.deserialize(reader, length)?;
        // do not animate into the starting position
        if first {
            self.view = *self.raw.get();
        }
        Ok(())
    }

    fn set_owner_and_index(&mut self, owner: ObjectKey, index: usize) {
        self.raw.set_owner_and_index(owner, index);
    }

    fn binding(&self) -> Option<VariableBinding> {
        self.raw.binding()
    }

    fn initialized(&self) -> bool {
        self.raw.initialized()
    }

    fn is_dirty(&self) -> bool {
        self.raw.is_dirty()
    }

    fn clear_dirty(&mut self) {
        self.raw.clear_dirty();
    }

    fn smooth(&mut self, delta: f32, has_authority: bool) {
        let target = *self.raw.get();
        if has_authority || !target.is_finite() || !self.view.is_finite() {
            self.view = target;
            return;
        }
        let t = (self.speed * delta).clamp(0.0, 1.0);
        self.view += (target - self.view) * t;
    }

    fn kind(&self) -> &'static str {
        "smoothed f32"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::{String, ToString};
    use alloc::sync::Arc;
    use approx::assert_relative_eq;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use networked_serde::encode;
    use test_log::test;

    fn receive<V: NetworkedVariable>(variable: &mut V, bytes: &[u8]) -> Result<(), SerializationError> {
        let mut reader = Reader::from(bytes);
        variable.deserialize(&mut reader, bytes.len())
    }

    #[test]
    fn test_receive_sets_initialized() {
        let mut variable = Networked::new(0i32);
        assert!(!variable.initialized());
        receive(&mut variable, &encode(&12i32).unwrap()).unwrap();
        assert!(variable.initialized());
        assert_eq!(*variable.get(), 12);
        assert!(!variable.is_dirty());
    }

    #[test]
    fn test_on_receive_fires_for_identical_values() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut variable = Networked::new(String::new()).on_change(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let bytes = encode(&"ring".to_string()).unwrap();
        receive(&mut variable, &bytes).unwrap();
        receive(&mut variable, &bytes).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_on_change_skips_identical_values() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut variable = Networked::new(0i32)
            .with_notify(ChangeNotify::OnChange)
            .on_change(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        let bytes = encode(&3i32).unwrap();
        receive(&mut variable, &bytes).unwrap();
        receive(&mut variable, &bytes).unwrap();
        receive(&mut variable, &encode(&4i32).unwrap()).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_length_mismatch_keeps_value() {
        let mut variable = Networked::new(1i32);
        let mut bytes = encode(&9i32).unwrap().to_vec();
        bytes.push(0);
        assert_eq!(
            receive(&mut variable, &bytes),
            Err(SerializationError::LengthMismatch {
                expected: 5,
                consumed: 4
            })
        );
        assert_eq!(*variable.get(), 1);
        assert!(!variable.initialized());
    }

    #[test]
    fn test_local_write_marks_dirty() {
        let mut variable = Networked::new(false);
        variable.set(true);
        assert!(variable.is_dirty());
        assert!(variable.initialized());
        variable.clear_dirty();
        assert!(!variable.is_dirty());
    }

    #[test]
    #[should_panic]
    fn test_bind_twice() {
        let mut variable = Networked::new(0u8);
        variable.set_owner_and_index(ObjectKey(1), 0);
        variable.set_owner_and_index(ObjectKey(1), 3);
    }

    #[test]
    fn test_smoothed_snaps_on_first_receive() {
        let mut position = Smoothed::new(0.0, 5.0);
        receive(&mut position, &encode(&10.0f32).unwrap()).unwrap();
        assert_eq!(position.view(), 10.0);

        receive(&mut position, &encode(&20.0f32).unwrap()).unwrap();
        assert_eq!(position.view(), 10.0);
        position.smooth(0.1, false);
        assert_relative_eq!(position.view(), 15.0);
        // large steps clamp to the target instead of overshooting
        position.smooth(1.0, false);
        assert_relative_eq!(position.view(), 20.0);
    }

    #[test]
    fn test_smoothed_with_authority_follows_raw() {
        let mut position = Smoothed::new(0.0, 1.0);
        receive(&mut position, &encode(&1.0f32).unwrap()).unwrap();
        receive(&mut position, &encode(&50.0f32).unwrap()).unwrap();
        position.smooth(0.01, true);
        assert_eq!(position.view(), 50.0);
    }
}
