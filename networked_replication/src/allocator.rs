//! Issues the network ids on the server
use alloc::collections::VecDeque;

use networked_core::id::NetworkId;
use tracing::trace;

/// Hands out positive network ids.
///
/// Fresh ids are increasing. An id only comes back through [`NetworkIdAllocator::recycle`],
/// which the registry calls once the id has left its recently-forgotten window: at that point no
/// in-flight message can still reference the previous object.
#[derive(Debug)]
pub struct NetworkIdAllocator {
    /// `None` once `i32::MAX` has been handed out
    next: Option<i32>,
    free: VecDeque<NetworkId>,
}

impl Default for NetworkIdAllocator {
    fn default() -> Self {
        Self {
            next: Some(1),
            free: VecDeque::new(),
        }
    }
}

impl NetworkIdAllocator {
    /// Returns `None` once every positive id is in use
    pub fn allocate(&mut self) -> Option<NetworkId> {
        if let Some(id) = self.free.pop_front() {
            trace!(?id, "reusing network id");
            return Some(id);
        }
        let id = self.next?;
        self.next = id.checked_add(1);
        Some(NetworkId(id))
    }

    pub fn recycle(&mut self, id: NetworkId) {
        if id.is_registered() {
            self.free.push_back(id);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
