//! Serialization for the real-time event stream.
//!
//! The backend sends one JSON object per socket text frame. Decode
//! failures are recoverable: the caller drops the frame and keeps
//! reading, so a malformed event never wedges the stream.

use crate::event::StreamEvent;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Encodes a [`StreamEvent`] into a JSON string frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_frame(event: &StreamEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`StreamEvent`] from a JSON string frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame is not a valid event.
pub fn decode_frame(frame: &str) -> Result<StreamEvent, CodecError> {
    serde_json::from_str(frame).map_err(|e| CodecError::Serialization(e.to_string()))
}
