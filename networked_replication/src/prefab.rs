//! Maps prefab names to object constructors, so that creation messages can instantiate the
//! right object type on the receiving side
use alloc::boxed::Box;
use alloc::string::String;

use bevy_platform::collections::HashMap;

use crate::object::ObjectBuilder;

pub type PrefabFactory = Box<dyn Fn() -> ObjectBuilder + Send + Sync>;

#[derive(Default)]
pub struct PrefabRegistry {
    factories: HashMap<String, PrefabFactory>,
}

impl PrefabRegistry {
    /// Register a prefab. Panics if the name is already registered.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> ObjectBuilder + Send + Sync + 'static,
    ) {
        let name = name.into();
        if self.factories.contains_key(&name) {
            panic!("Prefab {name:?} already registered");
        }
        self.factories.insert(name, Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn instantiate(&self, name: &str) -> Option<ObjectBuilder> {
        self.factories.get(name).map(|factory| factory())
    }
}
