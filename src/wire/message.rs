use std::collections::BTreeSet;

use bytes::{BufMut, BytesMut};

use super::{put_bytes, put_len, put_str, Decode, Encode, Reader, Version};
use crate::{
    cluster_config::{ConfigurationOutcome, ConfigurationSnapshot},
    error::{CodecError, DecodeError},
};

const OUTCOME_READY: u8 = 0;
const OUTCOME_NOT_READY: u8 = 1;
const OUTCOME_FATAL: u8 = 2;
const OUTCOME_FAILED: u8 = 3;

/// Discriminator of a [`WireMessage`], written right after the version ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Opens the version handshake
    VersionRequest = 0,
    /// Answers the version handshake
    VersionResponse = 1,
    /// Asks for the configuration of a set of groups
    ConfigurationRequest = 2,
    /// Carries the outcome of a configuration request
    ConfigurationResponse = 3,
    /// Plain acknowledgement, optionally carrying a fault
    Reply = 4,
}

impl MessageKind {
    /// Human readable name of the kind.
    pub const fn name(self) -> &'static str {
        match self {
            MessageKind::VersionRequest => "VersionRequest",
            MessageKind::VersionResponse => "VersionResponse",
            MessageKind::ConfigurationRequest => "ConfigurationRequest",
            MessageKind::ConfigurationResponse => "ConfigurationResponse",
            MessageKind::Reply => "Reply",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::VersionRequest),
            1 => Ok(MessageKind::VersionResponse),
            2 => Ok(MessageKind::ConfigurationRequest),
            3 => Ok(MessageKind::ConfigurationResponse),
            4 => Ok(MessageKind::Reply),
            _ => Err(DecodeError::UnknownKind(value)),
        }
    }
}

/// The control messages exchanged between members.
///
/// Layout:
///
/// ```text
/// version: u16 | kind: u8 | body
/// ```
///
/// Length prefixes inside the body are `u16` under [`Version::V1`] and `u32` under
/// [`Version::V2`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    /// Opens the version handshake with the newest version the sender speaks.
    VersionRequest {
        /// Ordinal of the sender's newest version.
        sender_ordinal: u16,
    },
    /// The version both peers use from now on.
    VersionResponse {
        /// The negotiated ordinal.
        ordinal: u16,
    },
    /// Asks for the configuration of `groups`.
    ConfigurationRequest {
        /// Correlates the response with the waiting requester.
        processor_id: u32,
        /// Names of the requested groups.
        groups: BTreeSet<String>,
    },
    /// The outcome of a configuration request.
    ConfigurationResponse {
        /// Processor id of the request.
        processor_id: u32,
        /// What the handler produced.
        outcome: ConfigurationOutcome,
    },
    /// Acknowledges a request, optionally with the fault that occurred processing it.
    Reply {
        /// Processor id of the request.
        processor_id: u32,
        /// Description of the fault, if any.
        fault: Option<String>,
    },
}

impl WireMessage {
    /// The message's kind discriminator.
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::VersionRequest { .. } => MessageKind::VersionRequest,
            WireMessage::VersionResponse { .. } => MessageKind::VersionResponse,
            WireMessage::ConfigurationRequest { .. } => MessageKind::ConfigurationRequest,
            WireMessage::ConfigurationResponse { .. } => MessageKind::ConfigurationResponse,
            WireMessage::Reply { .. } => MessageKind::Reply,
        }
    }

    /// Decodes a message written with any version known to this build, returning that version.
    pub fn decode_any(bytes: &[u8]) -> Result<(Version, WireMessage), DecodeError> {
        let mut reader = Reader::new(bytes);
        let version = Version::from_ordinal(reader.u16()?)?;
        let message = Self::decode_body(&mut reader, version)?;
        reader.finish()?;
        Ok((version, message))
    }

    fn decode_body(reader: &mut Reader<'_>, version: Version) -> Result<Self, DecodeError> {
        let message = match MessageKind::try_from(reader.u8()?)? {
            MessageKind::VersionRequest => WireMessage::VersionRequest {
                sender_ordinal: reader.u16()?,
            },
            MessageKind::VersionResponse => WireMessage::VersionResponse {
                ordinal: reader.u16()?,
            },
            MessageKind::ConfigurationRequest => {
                let processor_id = reader.u32()?;
                let count = reader.field_len(version)?;
                let mut groups = BTreeSet::new();
                for _ in 0..count {
                    groups.insert(reader.string(version)?);
                }
                WireMessage::ConfigurationRequest {
                    processor_id,
                    groups,
                }
            }
            MessageKind::ConfigurationResponse => {
                let processor_id = reader.u32()?;
                let outcome = match reader.u8()? {
                    OUTCOME_READY => ConfigurationOutcome::Ready(
                        ConfigurationSnapshot::from_msgpack(reader.bytes(version)?)?,
                    ),
                    OUTCOME_NOT_READY => ConfigurationOutcome::NotReady,
                    OUTCOME_FATAL => ConfigurationOutcome::Fatal(reader.string(version)?),
                    OUTCOME_FAILED => ConfigurationOutcome::Failed(reader.string(version)?),
                    tag => {
                        return Err(DecodeError::InvalidTag {
                            field: "configuration outcome",
                            tag,
                        })
                    }
                };
                WireMessage::ConfigurationResponse {
                    processor_id,
                    outcome,
                }
            }
            MessageKind::Reply => {
                let processor_id = reader.u32()?;
                let fault = match reader.u8()? {
                    0 => None,
                    1 => Some(reader.string(version)?),
                    tag => {
                        return Err(DecodeError::InvalidTag {
                            field: "reply fault",
                            tag,
                        })
                    }
                };
                WireMessage::Reply {
                    processor_id,
                    fault,
                }
            }
        };
        Ok(message)
    }
}

impl Encode for WireMessage {
    fn encode(&self, version: Version, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u16(version.ordinal());
        buf.put_u8(self.kind() as u8);
        match self {
            WireMessage::VersionRequest { sender_ordinal } => buf.put_u16(*sender_ordinal),
            WireMessage::VersionResponse { ordinal } => buf.put_u16(*ordinal),
            WireMessage::ConfigurationRequest {
                processor_id,
                groups,
            } => {
                buf.put_u32(*processor_id);
                put_len(buf, "group count", groups.len(), version)?;
                for group in groups {
                    put_str(buf, "group name", group, version)?;
                }
            }
            WireMessage::ConfigurationResponse {
                processor_id,
                outcome,
            } => {
                buf.put_u32(*processor_id);
                match outcome {
                    ConfigurationOutcome::Ready(snapshot) => {
                        buf.put_u8(OUTCOME_READY);
                        put_bytes(buf, "snapshot", &snapshot.to_msgpack()?, version)?;
                    }
                    ConfigurationOutcome::NotReady => buf.put_u8(OUTCOME_NOT_READY),
                    ConfigurationOutcome::Fatal(reason) => {
                        buf.put_u8(OUTCOME_FATAL);
                        put_str(buf, "fatal reason", reason, version)?;
                    }
                    ConfigurationOutcome::Failed(fault) => {
                        buf.put_u8(OUTCOME_FAILED);
                        put_str(buf, "fault", fault, version)?;
                    }
                }
            }
            WireMessage::Reply {
                processor_id,
                fault,
            } => {
                buf.put_u32(*processor_id);
                match fault {
                    Some(fault) => {
                        buf.put_u8(1);
                        put_str(buf, "fault", fault, version)?;
                    }
                    None => buf.put_u8(0),
                }
            }
        }
        Ok(())
    }
}

impl Decode for WireMessage {
    fn decode(bytes: &[u8], version: Version) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);
        let found = Version::from_ordinal(reader.u16()?)?;
        if found != version {
            return Err(DecodeError::VersionMismatch {
                expected: version,
                found,
            });
        }
        let message = Self::decode_body(&mut reader, version)?;
        reader.finish()?;
        Ok(message)
    }
}
