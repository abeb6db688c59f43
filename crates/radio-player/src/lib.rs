pub mod audio;
pub mod capture;
pub mod core;
pub mod directory;
pub mod relay_client;
pub mod session;
pub mod tunable;
pub mod tuning;

pub use crate::core::{PlayerCommand, PlayerCore, PlayerEvent, PlayerSnapshot, SourceMode};
