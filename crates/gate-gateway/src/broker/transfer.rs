//! `transfer` inbound route: backend pushes to clients

use super::SessionBroker;
use crate::backend::InboundRoute;
use crate::protocol::{ChannelId, ErrorCode, OutgoingMessage, RpcError};
use async_trait::async_trait;
use gate_common::metrics::PUSH_TOTAL;
use serde::Deserialize;
use serde_json::Value;

/// Route name backends call to push to a client
pub const TRANSFER_ROUTE: &str = "transfer";

/// Push addressed to one connection, or to every connection of an identity
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferParams {
    #[serde(default)]
    channel_id: Option<ChannelId>,
    #[serde(default)]
    user: Option<String>,
    method: String,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl TransferParams {
    fn into_message(self) -> OutgoingMessage {
        match self.error {
            Some(error) => OutgoingMessage::push_error(self.method, error),
            None => OutgoingMessage::push_result(self.method, self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Delivers backend pushes through the target connection's pipe
pub struct TransferRoute {
    broker: SessionBroker,
}

impl TransferRoute {
    #[must_use]
    pub fn new(broker: SessionBroker) -> Self {
        Self { broker }
    }

    fn targets(&self, params: &TransferParams) -> Result<Vec<ChannelId>, RpcError> {
        match (params.channel_id, params.user.as_deref()) {
            (Some(channel_id), _) => Ok(vec![channel_id]),
            (None, Some(user)) => Ok(self.broker.channels_of(user)),
            (None, None) => Err(RpcError::new(
                ErrorCode::InvalidParams,
                "`channelId` or `user` is required",
            )),
        }
    }
}

#[async_trait]
impl InboundRoute for TransferRoute {
    async fn handle(&self, params: Value) -> Result<Value, RpcError> {
        let params: TransferParams = serde_json::from_value(params)
            .map_err(|e| RpcError::new(ErrorCode::InvalidParams, e.to_string()))?;

        let pipes: Vec<_> = self
            .targets(&params)?
            .into_iter()
            .filter_map(|channel_id| self.broker.pipe(channel_id))
            .collect();

        if pipes.is_empty() {
            metrics::counter!(PUSH_TOTAL, "outcome" => "not_found").increment(1);
            tracing::debug!(
                channel_id = ?params.channel_id,
                user = ?params.user,
                method = %params.method,
                "Push target not found"
            );
            return Err(ErrorCode::TargetNotFound.into());
        }

        let message = params.into_message();
        let mut delivered = 0usize;

        for pipe in &pipes {
            match pipe.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(channel_id = %pipe.channel_id(), error = %e, "Push delivery failed");
                }
            }
        }

        if delivered == 0 {
            metrics::counter!(PUSH_TOTAL, "outcome" => "failed").increment(1);
            return Err(ErrorCode::NotifyFailed.into());
        }

        metrics::counter!(PUSH_TOTAL, "outcome" => "delivered").increment(1);
        Ok(Value::String("Ok".to_string()))
    }
}
