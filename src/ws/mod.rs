//! WebSocket transport: wire protocol, connection handles and sessions

pub mod connection;
pub mod handler;
pub mod protocol;
pub mod session;
