//! Error types shared across clusterlink.
//!
//! The errors are split by the layer that produces them: decoding and encoding of wire messages,
//! frame-level I/O, the connection, the direct reply sender, and the cluster configuration
//! request path. Each layer wraps the layer beneath it so the original cause is always reachable
//! through [`std::error::Error::source`].

use std::{error, io, time::Duration};

use crate::{member::MemberId, wire::Version};

/// A dyn boxed error.
pub type BoxError = Box<dyn error::Error + Send + Sync + 'static>;

/// Error returned when bytes received from a peer cannot be decoded into a message.
///
/// Decoding never yields a partially populated message; any of these errors means the whole
/// message was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes were available than the message kind requires.
    #[error("truncated message: needed {needed} bytes but only {available} available")]
    Truncated {
        /// Number of bytes the decoder needed at the point it stopped.
        needed: usize,
        /// Number of bytes that were left.
        available: usize,
    },
    /// The version ordinal is not known to this build.
    #[error("unknown protocol version ordinal {0}")]
    UnknownVersion(u16),
    /// The message was written with a different version than the one negotiated for the
    /// connection.
    #[error("message written with protocol version {found} but {expected} was negotiated")]
    VersionMismatch {
        /// The negotiated version.
        expected: Version,
        /// The version found in the message.
        found: Version,
    },
    /// The kind discriminator is not known to this build.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    /// An enum tag inside a message body is not valid.
    #[error("invalid {field} tag {tag}")]
    InvalidTag {
        /// The field containing the tag.
        field: &'static str,
        /// The tag value read.
        tag: u8,
    },
    /// A string field did not contain valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    /// A serialized body could not be deserialized.
    #[error("malformed message body: {0}")]
    Body(String),
    /// Bytes remained after the message was fully decoded.
    #[error("{0} unexpected trailing bytes after message")]
    TrailingBytes(usize),
}

/// Error returned when a message cannot be encoded.
///
/// Encoding failures indicate a defect in the message being sent, and retrying the same message
/// reproduces the same failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A value inside the message could not be serialized.
    #[error("failed to serialize message: {0}")]
    Serialize(String),
    /// A variable length field exceeds what the protocol version can represent.
    #[error("{field} is {len} bytes which exceeds the {max} byte limit of protocol {version}")]
    FieldTooLong {
        /// The offending field.
        field: &'static str,
        /// The field's length in bytes.
        len: usize,
        /// The largest length representable.
        max: usize,
        /// The version the message was being encoded for.
        version: Version,
    },
}

/// Error returned when reading a length-prefixed frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended before a frame header was read.
    #[error("stream closed")]
    Closed,
    /// The frame announced a length above the configured maximum.
    #[error("frame too large: {len} > {max}")]
    TooLarge {
        /// The announced length.
        len: usize,
        /// The configured maximum.
        max: usize,
    },
    /// Reading from the stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Error returned by [`Connection`](crate::connection::Connection) operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection has been closed.
    #[error("connection to {0} is closed")]
    Closed(MemberId),
    /// The buffer pool has been shut down.
    #[error("buffer pool is closed")]
    PoolClosed,
    /// Another write on the connection did not finish in time.
    #[error("connection to {member} is still busy writing after {timeout:?}")]
    WriterBusy {
        /// The member the connection leads to.
        member: MemberId,
        /// How long the writer waited.
        timeout: Duration,
    },
    /// No pooled buffer became available in time.
    #[error("no write buffer became available within {0:?}")]
    PoolExhausted(Duration),
    /// The remote member could not be reached over this channel.
    #[error("member {member} is unreachable")]
    Unreachable {
        /// The member that could not be reached.
        member: MemberId,
        /// The underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The encoded message is larger than the connection accepts.
    #[error("message too large: {len} bytes (max: {max})")]
    MessageTooLarge {
        /// The encoded length.
        len: usize,
        /// The configured maximum.
        max: usize,
    },
    /// Any other I/O failure.
    #[error("connection i/o error: {0}")]
    Io(#[from] io::Error),
}

/// A fatal error returned by [`DirectReplySender::send`](crate::reply::DirectReplySender::send).
///
/// A reply which could not be delivered because its recipient is unreachable is *not* an error;
/// it is reported in the returned set of members instead.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    /// The owning distribution manager is shutting down, no I/O was attempted.
    #[error("reply aborted because cancellation is in progress: {0}")]
    Cancelled(String),
    /// The reply could not be serialized. Retrying will fail the same way.
    #[error("reply could not be serialized")]
    Serialization(#[source] CodecError),
    /// An unexpected fault occurred while transmitting the reply.
    #[error("failed to send reply to {recipient}")]
    Io {
        /// The member the reply was addressed to.
        recipient: MemberId,
        /// The underlying failure.
        #[source]
        source: ConnectionError,
    },
}

/// Error returned to the requester of a cluster configuration.
///
/// Both variants are fatal for the request. A service which is still starting is not an error
/// and is reported as `Ok(None)` by
/// [`ConfigurationOutcome::into_result`](crate::cluster_config::ConfigurationOutcome::into_result).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClusterConfigError {
    /// The cluster configuration service is not enabled on the remote member.
    #[error("{0}")]
    NotEnabled(String),
    /// The request reached the remote member but failed there.
    #[error("cluster configuration request failed on the remote member: {0}")]
    Remote(String),
}

/// Error returned by the request dispatch helpers in [`dispatch`](crate::dispatch).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A frame could not be read.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// A frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A request could not be encoded.
    #[error(transparent)]
    Encode(#[from] CodecError),
    /// A request could not be written.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    /// The reply could not be sent.
    #[error(transparent)]
    Reply(#[from] ReplyError),
    /// A message of the wrong kind arrived.
    #[error("expected a {expected} message but received {received}")]
    UnexpectedMessage {
        /// The kind that was expected.
        expected: &'static str,
        /// The kind that arrived.
        received: &'static str,
    },
    /// The response does not belong to the request that was sent.
    #[error("response for processor {received} does not match request {expected}")]
    ProcessorMismatch {
        /// Processor id of the request.
        expected: u32,
        /// Processor id found in the response.
        received: u32,
    },
    /// The peer did not complete the version handshake in time.
    #[error("version handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
}
