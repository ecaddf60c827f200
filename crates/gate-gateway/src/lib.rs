//! # gate-gateway
//!
//! WebSocket-to-RPC gateway. The connection manager terminates client sockets and
//! the session broker authenticates them, relays their requests to backend services
//! and delivers backend pushes back to the right connection.

pub mod backend;
pub mod broker;
pub mod connection;
pub mod protocol;
pub mod server;

pub use broker::SessionBroker;
pub use connection::ConnectionManager;
pub use server::{run, Gateway, RunningGateway};
