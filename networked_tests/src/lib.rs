/*! # Networked tests

End-to-end tests of the replication sessions, run over the in-process, TCP and P2P transports.
*/
extern crate alloc;

#[cfg(test)]
#[cfg(feature = "test_utils")]
mod client_server;
pub mod protocol;
pub mod stepper;

#[cfg(test)]
#[cfg(feature = "test_utils")]
mod host_server;
