//! Types shared by the relay and the player: station descriptors, relay wire
//! bodies, the error taxonomy, configuration and persisted client state.

pub mod config;
pub mod error;
pub mod platform;
pub mod presets;
pub mod protocol;
pub mod state;
