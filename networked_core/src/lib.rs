//! Identity types shared by every networked crate

pub mod id;
pub mod time;

pub mod prelude {
    pub use crate::id::{NetworkId, ObjectKey, PeerId};
}
