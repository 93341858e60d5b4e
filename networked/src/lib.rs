/*! # Networked

Replication of networked objects between a server and its clients.

- [`networked_replication`] holds the objects, their variables and the
  [`ReplicationContext`](networked_replication::registry::ReplicationContext) of each participant
- [`networked_transport`] (and [`networked_p2p`] with the `p2p` feature) carry the bytes
- this crate glues them together: a [`ClientSession`](session::ClientSession) or a
  [`ServerSession`](session::ServerSession) frames the replication messages over the transport
  and drives the context every tick
*/
extern crate alloc;

pub mod connection;
pub mod error;
pub mod session;

pub use networked_core;
#[cfg(feature = "p2p")]
pub use networked_p2p;
pub use networked_replication;
pub use networked_serde;
pub use networked_transport;

pub mod prelude {
    pub use networked_core::id::{NetworkId, ObjectKey, PeerId};
    pub use networked_replication::prelude::*;
    pub use networked_transport::prelude::*;

    #[cfg(feature = "p2p")]
    pub use networked_p2p::prelude::*;

    pub use crate::connection::Connection;
    pub use crate::error::SessionError;
    pub use crate::session::{ClientSession, ServerSession, SessionConfig, SessionEvent};
}
