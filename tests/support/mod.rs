//! Helpers shared by the integration tests.

pub mod socket_guard;
