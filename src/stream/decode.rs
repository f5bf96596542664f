use thiserror::Error;

use crate::models::order::Order;

#[derive(Debug, Error)]
#[error("malformed order payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Parse one inbound wire message into an [`Order`]. A failure here never
/// tears down the stream: the caller logs, drops the message and moves on.
pub fn decode_order(raw: &str) -> Result<Order, DecodeError> {
    Ok(serde_json::from_str(raw)?)
}
