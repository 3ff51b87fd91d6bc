//! Glue between frames arriving on a connection and the handlers that answer them.
//!
//! The accepting side runs [`serve`] over the reading half of a connection. Every cluster
//! configuration request is answered through a [`DirectReplySender`] bound to that connection.
//! [`request_configuration`] is the requesting side of the same exchange.
//!
//! Before any of this, both ends agree on a protocol version with [`initiate_handshake`] and
//! [`accept_handshake`]. Handshake messages are always encoded with [`Version::OLDEST`] so that
//! every build can read them.

use std::{
    collections::{BTreeSet, HashSet},
    time::Duration,
};

use futures::{pin_mut, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, warn};

use crate::{
    cluster_config::ConfigurationOutcome,
    connection::Connection,
    context::ClusterContext,
    error::{DispatchError, FrameError},
    member::MemberId,
    reply::DirectReplySender,
    wire::{self, framing, negotiate, Decode, Encode, Version, WireMessage},
};

/// Largest handshake frame accepted.
const HANDSHAKE_MAX_SIZE: usize = 64;

/// How long a peer gets to complete its side of the handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Decodes a cluster configuration request from `frame` and answers it over `conn`.
///
/// Returns the members the response could not be delivered to.
#[instrument(level = "debug", skip_all, fields(requester = %conn.remote()))]
pub async fn serve_configuration_request<W>(
    ctx: &ClusterContext,
    conn: &Connection<W>,
    frame: &[u8],
) -> Result<HashSet<MemberId>, DispatchError>
where
    W: AsyncWrite + Unpin + Send,
{
    match WireMessage::decode(frame, conn.version())? {
        WireMessage::ConfigurationRequest {
            processor_id,
            groups,
        } => answer_configuration_request(ctx, conn, processor_id, &groups).await,
        other => Err(DispatchError::UnexpectedMessage {
            expected: "ConfigurationRequest",
            received: other.kind().name(),
        }),
    }
}

/// Answers requests arriving on `reader` until the peer closes the channel or becomes
/// unreachable.
///
/// Messages which are not requests are logged and skipped.
#[instrument(level = "debug", skip_all, fields(remote = %conn.remote()))]
pub async fn serve<R, W>(
    ctx: &ClusterContext,
    conn: &Connection<W>,
    reader: R,
) -> Result<(), DispatchError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let frames = framing::frames(reader, conn.max_message_size());
    pin_mut!(frames);

    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let message = match WireMessage::decode(&frame, conn.version()) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                continue;
            }
        };
        match message {
            WireMessage::ConfigurationRequest {
                processor_id,
                groups,
            } => {
                let unreachable =
                    answer_configuration_request(ctx, conn, processor_id, &groups).await?;
                if !unreachable.is_empty() {
                    debug!("requester is gone, no longer serving");
                    return Ok(());
                }
            }
            other => {
                warn!(kind = other.kind().name(), "ignoring unexpected message");
            }
        }
    }

    debug!("peer closed the connection");
    Ok(())
}

async fn answer_configuration_request<W>(
    ctx: &ClusterContext,
    conn: &Connection<W>,
    processor_id: u32,
    groups: &BTreeSet<String>,
) -> Result<HashSet<MemberId>, DispatchError>
where
    W: AsyncWrite + Unpin + Send,
{
    let outcome = ctx.configuration_handler().handle(groups);
    let response = WireMessage::ConfigurationResponse {
        processor_id,
        outcome,
    };
    let mut sender = DirectReplySender::new(conn);
    Ok(sender.send(&response).await?)
}

/// Asks the member on the other end of `conn` for the configuration of `groups` and waits for
/// the response on `reader`.
#[instrument(level = "debug", skip(conn, reader, groups), fields(remote = %conn.remote()))]
pub async fn request_configuration<R, W>(
    conn: &Connection<W>,
    reader: &mut R,
    processor_id: u32,
    groups: BTreeSet<String>,
) -> Result<ConfigurationOutcome, DispatchError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let request = WireMessage::ConfigurationRequest {
        processor_id,
        groups,
    };
    let mut writer = conn.acquire_writer().await?;
    request.encode(writer.version(), writer.buffer_mut())?;
    writer.flush().await?;

    let frame = framing::read_frame(reader, conn.max_message_size()).await?;
    match WireMessage::decode(&frame, conn.version())? {
        WireMessage::ConfigurationResponse {
            processor_id: received,
            outcome,
        } => {
            if received != processor_id {
                return Err(DispatchError::ProcessorMismatch {
                    expected: processor_id,
                    received,
                });
            }
            Ok(outcome)
        }
        other => Err(DispatchError::UnexpectedMessage {
            expected: "ConfigurationResponse",
            received: other.kind().name(),
        }),
    }
}

/// Opens the version handshake on a freshly dialed stream and returns the version both sides
/// use from now on.
#[instrument(level = "debug", skip(stream))]
pub async fn initiate_handshake<S>(stream: &mut S, local: Version) -> Result<Version, DispatchError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = WireMessage::VersionRequest {
        sender_ordinal: local.ordinal(),
    };
    send_handshake_message(stream, &request).await?;

    match read_handshake_message(stream).await? {
        WireMessage::VersionResponse { ordinal } => {
            let version = negotiate(local, ordinal)?;
            debug!(%version, "version negotiated");
            Ok(version)
        }
        other => Err(DispatchError::UnexpectedMessage {
            expected: "VersionResponse",
            received: other.kind().name(),
        }),
    }
}

/// Answers the version handshake on a freshly accepted stream and returns the version both
/// sides use from now on.
#[instrument(level = "debug", skip(stream))]
pub async fn accept_handshake<S>(stream: &mut S, local: Version) -> Result<Version, DispatchError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let sender_ordinal = match read_handshake_message(stream).await? {
        WireMessage::VersionRequest { sender_ordinal } => sender_ordinal,
        other => {
            return Err(DispatchError::UnexpectedMessage {
                expected: "VersionRequest",
                received: other.kind().name(),
            })
        }
    };
    let version = negotiate(local, sender_ordinal)?;
    let response = WireMessage::VersionResponse {
        ordinal: version.ordinal(),
    };
    send_handshake_message(stream, &response).await?;
    debug!(%version, "version negotiated");
    Ok(version)
}

async fn send_handshake_message<W>(
    writer: &mut W,
    message: &WireMessage,
) -> Result<(), DispatchError>
where
    W: AsyncWrite + Unpin,
{
    let payload = wire::encode_to_vec(message, Version::OLDEST)?;
    framing::write_frame(writer, &payload)
        .await
        .map_err(FrameError::from)?;
    Ok(())
}

async fn read_handshake_message<R>(reader: &mut R) -> Result<WireMessage, DispatchError>
where
    R: AsyncRead + Unpin,
{
    let frame = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        framing::read_frame(reader, HANDSHAKE_MAX_SIZE),
    )
    .await
    .map_err(|_| DispatchError::HandshakeTimeout(HANDSHAKE_TIMEOUT))??;
    Ok(WireMessage::decode(&frame, Version::OLDEST)?)
}
