//! Backend RPC connector
//!
//! Outbound calls from the gateway to named backend services, and inbound
//! routes that backend services call on the gateway.

mod connector;
mod inbound;
mod jsonrpc;

pub use connector::{BackendConnector, BackendError};
pub use inbound::{inbound_router, InboundRoute, InboundRoutes};
pub use jsonrpc::{JsonRpcConnector, RpcRequest, RpcResponse};
