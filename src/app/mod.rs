//! Application boundary: the port traits every task is generic over.
//!
//! The gateway's domain logic lives in [`crate::adv`], [`crate::ingest`],
//! [`crate::relay`] and [`crate::supervisor`]; all interaction with
//! hardware and network stacks goes through the traits in [`ports`].

pub mod ports;
