//! Protocol decoding errors.

/// Errors decoding protocol messages.
///
/// Kept distinct from storage and service errors so the transport layer can
/// answer with a client error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unrecognized check-in message type: {0:?}")]
    UnrecognizedMessageType(String),
    #[error("invalid check-in message")]
    InvalidCheckin(#[source] plist::Error),
    #[error("invalid command: {0}")]
    InvalidCommand(String),
    #[error("invalid command result: {0}")]
    InvalidCommandResult(String),
}
