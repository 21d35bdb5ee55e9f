//! Navigation-facing logic: the router collaborator contract and the guards
//! that redirect based on session state.

pub mod guard;
pub mod navigator;
