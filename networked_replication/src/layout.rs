//! Deterministic slot layout of the variables of an object
//!
//! Slot indices are the only addressing used on the wire, so every participant must compute the
//! same layout for the same object type:
//! - slots `0, 1, 2` are the reserved `x`, `y`, `z` position variables
//! - then the variables declared by the object itself, sorted by name
//! - then, for each extender sorted by type tag, the variables it declares sorted by name
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;

use bevy_math::Vec3;
use networked_core::id::ObjectKey;

use crate::variable::{Networked, NetworkedVariable, Smoothed, VariableValue};

/// Names of the reserved position slots
pub const POSITION_SLOTS: [&str; 3] = ["x", "y", "z"];

/// Which part of the object declared a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Reserved,
    Own,
    /// Declared by the extender with this type tag
    Extension(&'static str),
}

/// Variables declared by an object or an extender, before their slots are assigned
#[derive(Default)]
pub struct VariableDeclarations {
    entries: Vec<(&'static str, Box<dyn NetworkedVariable>)>,
}

impl VariableDeclarations {
    pub fn add(&mut self, name: &'static str, variable: impl NetworkedVariable) -> &mut Self {
        self.entries.push((name, Box::new(variable)));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_sorted(mut self, scope: Scope) -> Vec<(&'static str, Box<dyn NetworkedVariable>)> {
        self.entries.sort_by(|a, b| a.0.cmp(b.0));
        for pair in self.entries.windows(2) {
            if pair[0].0 == pair[1].0 {
                panic!("variable {:?} declared twice in {:?}", pair[0].0, scope);
            }
        }
        self.entries
    }
}

struct Slot {
    scope: Scope,
    name: &'static str,
    variable: Box<dyn NetworkedVariable>,
}

/// The ordered variable slots of one object
#[derive(Default)]
pub struct VariableSet {
    slots: Vec<Slot>,
}

impl VariableSet {
    /// Assign slots to the declared variables and bind each of them to `owner`.
    ///
    /// Panics if a name is declared twice in the same scope, or if two extenders share a type tag.
    pub fn build(
        owner: ObjectKey,
        own: VariableDeclarations,
        mut extensions: Vec<(&'static str, VariableDeclarations)>,
        lerp_speed: f32,
    ) -> Self {
        extensions.sort_by(|a, b| a.0.cmp(b.0));
        for pair in extensions.windows(2) {
            if pair[0].0 == pair[1].0 {
                panic!("extender {:?} attached twice to {}", pair[0].0, owner);
            }
        }

        let mut slots = Vec::with_capacity(
            3 + own.len() + extensions.iter().map(|(_, d)| d.len()).sum::<usize>(),
        );
        for name in POSITION_SLOTS {
            slots.push(Slot {
                scope: Scope::Reserved,
                name,
                variable: Box::new(Smoothed::new(0.0, lerp_speed)),
            });
        }
        for (name, variable) in own.into_sorted(Scope::Own) {
            slots.push(Slot {
                scope: Scope::Own,
                name,
                variable,
            });
        }
        for (tag, declarations) in extensions {
            let scope = Scope::Extension(tag);
            for (name, variable) in declarations.into_sorted(scope) {
                slots.push(Slot {
                    scope,
                    name,
                    variable,
                });
            }
        }
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.variable.set_owner_and_index(owner, index);
        }
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn index_of(&self, scope: Scope, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.scope == scope && slot.name == name)
    }

    pub fn slot(&self, index: usize) -> Option<&dyn NetworkedVariable> {
        self.slots.get(index).map(|slot| slot.variable.as_ref())
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut (dyn NetworkedVariable + 'static)> {
        self.slots.get_mut(index).map(|slot| slot.variable.as_mut())
    }

    /// Concrete variable stored at `index`
    pub fn networked<V: NetworkedVariable>(&self, index: usize) -> Option<&V> {
        let variable: &dyn Any = &*self.slots.get(index)?.variable;
        variable.downcast_ref::<V>()
    }

    pub fn networked_mut<V: NetworkedVariable>(&mut self, index: usize) -> Option<&mut V> {
        let variable: &mut dyn Any = &mut *self.slots.get_mut(index)?.variable;
        variable.downcast_mut::<V>()
    }

    /// Current value of the variable `name` declared in `scope`
    pub fn get<T: VariableValue>(&self, scope: Scope, name: &str) -> Option<&T> {
        let index = self.index_of(scope, name)?;
        let variable: &dyn Any = &*self.slots[index].variable;
        if let Some(networked) = variable.downcast_ref::<Networked<T>>() {
            return Some(networked.get());
        }
        let smoothed = variable.downcast_ref::<Smoothed>()?;
        let value: &dyn Any = smoothed.get();
        value.downcast_ref::<T>()
    }

    /// Write the variable `name` declared in `scope`. Returns false if there is no such
    /// variable of type `T`.
    pub(crate) fn set<T: VariableValue>(&mut self, scope: Scope, name: &str, value: T) -> bool {
        let Some(index) = self.index_of(scope, name) else {
            return false;
        };
        let variable: &mut dyn Any = &mut *self.slots[index].variable;
        if let Some(networked) = variable.downcast_mut::<Networked<T>>() {
            networked.set(value);
            return true;
        }
        let value: &dyn Any = &value;
        match (variable.downcast_mut::<Smoothed>(), value.downcast_ref::<f32>()) {
            (Some(smoothed), Some(value)) => {
                smoothed.set(*value);
                true
            }
            _ => false,
        }
    }

    /// Smoothed position, or `None` if the object has no variables
    pub fn position(&self) -> Option<Vec3> {
        let x = self.networked::<Smoothed>(0)?.view();
        let y = self.networked::<Smoothed>(1)?.view();
        let z = self.networked::<Smoothed>(2)?.view();
        Some(Vec3::new(x, y, z))
    }

    /// Last position written by the authority
    pub fn authoritative_position(&self) -> Option<Vec3> {
        let x = *self.networked::<Smoothed>(0)?.get();
        let y = *self.networked::<Smoothed>(1)?.get();
        let z = *self.networked::<Smoothed>(2)?.get();
        Some(Vec3::new(x, y, z))
    }

    pub(crate) fn set_position(&mut self, position: Vec3) -> bool {
        for (index, value) in position.to_array().into_iter().enumerate() {
            match self.networked_mut::<Smoothed>(index) {
                Some(smoothed) => smoothed.set(value),
                None => return false,
            }
        }
        true
    }

    pub(crate) fn smooth(&mut self, delta: f32, has_authority: bool) {
        for slot in self.slots.iter_mut() {
            slot.variable.smooth(delta, has_authority);
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.variable.clear_dirty();
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &dyn NetworkedVariable)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (index, slot.variable.as_ref()))
    }

    /// The ordered `(scope, name)` list of the slots.
    ///
    /// Two participants interoperate only if their signatures for an object type are equal.
    pub fn layout_signature(&self) -> Vec<(Scope, &'static str)> {
        self.slots.iter().map(|slot| (slot.scope, slot.name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use alloc::vec;
    use test_log::test;

    fn depot_variables() -> VariableDeclarations {
        let mut declarations = VariableDeclarations::default();
        declarations
            .add("stock", Networked::new(0i32))
            .add("label", Networked::new(String::new()))
            .add("fill", Networked::new(0.0f32));
        declarations
    }

    fn lamp_variables() -> VariableDeclarations {
        let mut declarations = VariableDeclarations::default();
        declarations.add("lit", Networked::new(false));
        declarations
    }

    fn armor_variables() -> VariableDeclarations {
        let mut declarations = VariableDeclarations::default();
        declarations
            .add("durability", Networked::new(0i32))
            .add("broken", Networked::new(false));
        declarations
    }

    #[test]
    fn test_slot_order() {
        let set = VariableSet::build(
            ObjectKey(1),
            depot_variables(),
            vec![("lamp", lamp_variables()), ("armor", armor_variables())],
            1.0,
        );
        assert_eq!(
            set.layout_signature(),
            vec![
                (Scope::Reserved, "x"),
                (Scope::Reserved, "y"),
                (Scope::Reserved, "z"),
                (Scope::Own, "fill"),
                (Scope::Own, "label"),
                (Scope::Own, "stock"),
                (Scope::Extension("armor"), "broken"),
                (Scope::Extension("armor"), "durability"),
                (Scope::Extension("lamp"), "lit"),
            ]
        );
        for (index, variable) in set.iter() {
            assert_eq!(variable.binding().unwrap().index, index);
            assert_eq!(variable.binding().unwrap().owner, ObjectKey(1));
        }
    }

    #[test]
    fn test_layout_is_deterministic() {
        // declaration order and extender order do not matter
        let mut reversed = VariableDeclarations::default();
        reversed
            .add("fill", Networked::new(0.0f32))
            .add("stock", Networked::new(0i32))
            .add("label", Networked::new(String::new()));
        let a = VariableSet::build(
            ObjectKey(1),
            depot_variables(),
            vec![("lamp", lamp_variables()), ("armor", armor_variables())],
            1.0,
        );
        let b = VariableSet::build(
            ObjectKey(2),
            reversed,
            vec![("armor", armor_variables()), ("lamp", lamp_variables())],
            1.0,
        );
        assert_eq!(a.layout_signature(), b.layout_signature());
    }

    #[test]
    #[should_panic]
    fn test_duplicate_extender_panics() {
        VariableSet::build(
            ObjectKey(1),
            VariableDeclarations::default(),
            vec![("lamp", lamp_variables()), ("lamp", lamp_variables())],
            1.0,
        );
    }

    #[test]
    #[should_panic]
    fn test_duplicate_name_panics() {
        let mut declarations = VariableDeclarations::default();
        declarations
            .add("stock", Networked::new(0i32))
            .add("stock", Networked::new(1i32));
        VariableSet::build(ObjectKey(1), declarations, vec![], 1.0);
    }

    #[test]
    fn test_typed_access() {
        let mut set = VariableSet::build(ObjectKey(1), depot_variables(), vec![], 1.0);
        assert!(set.set(Scope::Own, "stock", 40i32));
        assert_eq!(set.get::<i32>(Scope::Own, "stock"), Some(&40));
        // wrong type
        assert!(!set.set(Scope::Own, "stock", 40u8));
        assert_eq!(set.get::<f32>(Scope::Own, "stock"), None);
        // position slots are reachable as plain floats
        assert!(set.set(Scope::Reserved, "y", 2.5f32));
        assert_eq!(set.get::<f32>(Scope::Reserved, "y"), Some(&2.5));
        assert_eq!(set.position(), Some(Vec3::new(0.0, 2.5, 0.0)));
    }
}
