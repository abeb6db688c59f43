//! Server-side relay for the commercial radio network: the IP-bound auth
//! handshake, master-playlist resolution, and byte pass-through to the
//! origin, all sharing one outbound HTTP client.

pub mod auth;
pub mod http;
pub mod playlist;
pub mod proxy;
