//! Connection management
//!
//! Owns live client connections, their reply pipes, and the liveness sweep.

mod connection;
mod event;
mod manager;
mod pipe;

pub use connection::{Connection, Outbound};
pub use event::{ConnectionEvent, EventHandler, GateEvent};
pub use manager::{ConnectionManager, SweepReport};
pub use pipe::{Pipe, PipeError};
