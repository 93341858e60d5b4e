//! Extenders contribute networked variables to the object they are attached to.
//!
//! An extender is not an object itself: it shares the identity, the authority and the lifecycle
//! of its owner. Its variables are appended after the owner's own variables, ordered by the
//! extender's type tag. At most one extender per type tag can be attached to an object.
use core::any::Any;

use crate::layout::VariableDeclarations;
use crate::object::NetworkState;

pub trait Extender: Any + Send + Sync {
    /// Stable key used to order and deduplicate the extenders of an object
    fn type_tag(&self) -> &'static str;

    /// Declare the variables added to the owner. Called once, when the owner initializes its variables.
    fn init_networked_variables(&mut self, variables: &mut VariableDeclarations);

    /// The owner is being forgotten. `deleting` is false if the owner only went out of range.
    fn on_forget(&mut self, _state: &NetworkState, _deleting: bool) {}

    fn on_authority_change(&mut self, _state: &NetworkState, _has_authority: bool) {}
}
