//! Error types for the chat client.
//!
//! This module defines error types for codec-level failures, line and tag
//! parsing failures, transport failures, channel registry inconsistencies,
//! and configuration mistakes.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Codec-level protocol errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound line carried an embedded line break.
    #[error("illegal line break in outbound line: {0:?}")]
    IllegalLineBreak(String),
}

/// Errors encountered when parsing a line into an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Line was empty.
    #[error("empty message")]
    EmptyMessage,

    /// The line did not fit the line grammar.
    #[error("malformed line at position {position}: {context}")]
    Malformed {
        /// Byte position where parsing failed.
        position: usize,
        /// What was being parsed.
        context: &'static str,
    },

    /// The tag block could not be decoded.
    #[error("invalid tag block: {0}")]
    InvalidTags(#[from] TagParseError),
}

/// Errors encountered when decoding a tag block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagParseError {
    /// A `key=value` pair had no `=`.
    #[error("malformed tag pair: {0:?}")]
    MissingDelimiter(String),

    /// A pair had an empty key.
    #[error("empty tag key in pair: {0:?}")]
    EmptyKey(String),
}

/// Transport-level failures. All of these are recovered by reconnecting.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// The host name could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,
        /// The resolver error.
        #[source]
        source: std::io::Error,
    },

    /// Resolution succeeded but yielded no addresses.
    #[error("no addresses found for {0}")]
    NoAddress(String),

    /// The socket could not be connected.
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    /// An operation did not finish in time.
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// The connection was reset or a read/write failed.
    #[error("connection reset: {0}")]
    Reset(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    Closed,

    /// No liveness probe was seen within the timeout window.
    #[error("no PING received for {0:?}")]
    Stale(std::time::Duration),

    /// The server asked us to reconnect.
    #[error("server requested reconnect")]
    ReconnectRequested,
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => Self::Reset(e),
            other => Self::Reset(std::io::Error::new(std::io::ErrorKind::InvalidData, other)),
        }
    }
}

/// Channel registry inconsistencies. These are warnings, never fatal:
/// local and server state can legitimately race.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// The channel is not in the registry.
    #[error("unknown channel #{0}")]
    UnknownChannel(String),

    /// The member is not listed in the channel.
    #[error("{member} is not a member of #{channel}")]
    UnknownMember {
        /// Channel name without sigil.
        channel: String,
        /// Member identity.
        member: String,
    },
}

/// Caller mistakes. These are fatal.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// A connection was opened while another one is still live.
    #[error("connection already open (state: {0})")]
    AlreadyOpen(crate::state::ConnectionState),

    /// Failed to read a configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a configuration file.
    #[cfg(feature = "serde")]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors returned by client handle calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The background task has stopped.
    #[error("client is stopped")]
    Stopped,

    /// The request would produce an invalid line.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
