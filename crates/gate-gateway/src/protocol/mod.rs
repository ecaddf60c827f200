//! Gateway protocol definitions
//!
//! Defines the JSON-RPC style wire envelopes, error codes, method names and
//! connection identifiers shared by the connection manager and the broker.

mod channel;
mod error_codes;
mod messages;
mod method;

pub use channel::ChannelId;
pub use error_codes::{ErrorCode, RpcError};
pub use messages::{parse_frame, IncomingRequest, MessageId, OutgoingMessage, ParsedFrame, NOTIFY_ID};
pub use method::{MethodName, MethodNameError};
