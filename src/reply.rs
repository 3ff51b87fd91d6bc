//! One-shot replies sent straight back over the connection a request arrived on.
//!
//! A [`DirectReplySender`] is bound to the [`Connection`] of the member that asked. It does not
//! consult the cluster view or route through any other member, so the only member a reply can
//! fail to reach is the one on the other end of that connection.
//!
//! Delivery failure is data: [`send`](DirectReplySender::send) returns the set of members the
//! reply could not reach, which is either empty or exactly the recipient. Faults that retrying
//! cannot fix, like a reply that fails to serialize, are returned as a [`ReplyError`].
//!
//! ```no_run
//! # use clusterlink::{connection::Connection, reply::DirectReplySender, wire::WireMessage};
//! # use tokio::io::AsyncWrite;
//! # async fn answer<W>(conn: &Connection<W>) -> Result<(), clusterlink::error::ReplyError>
//! # where
//! #     W: AsyncWrite + Unpin + Send,
//! # {
//! let mut sender = DirectReplySender::new(conn);
//! let unreachable = sender
//!     .send(&WireMessage::Reply { processor_id: 7, fault: None })
//!     .await?;
//! if !unreachable.is_empty() {
//!     tracing::warn!("requester left before the reply could be sent");
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use tokio::io::AsyncWrite;
use tracing::{debug, error, instrument, trace};

use crate::{
    connection::Connection,
    error::{CodecError, ConnectionError, ReplyError},
    member::MemberId,
    wire::Encode,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendState {
    Fresh,
    Sent,
}

/// Sends a single reply directly to the member on the other end of a connection.
///
/// A sender can deliver at most one reply. Calling [`send`](Self::send) again after a successful
/// send is a bug in the caller and panics. A send that found the recipient unreachable leaves the
/// sender fresh, so the caller may retry.
#[derive(Debug)]
pub struct DirectReplySender<'a, W> {
    connection: &'a Connection<W>,
    state: SendState,
    reported_failure: bool,
}

impl<'a, W> DirectReplySender<'a, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a sender replying over `connection`.
    pub fn new(connection: &'a Connection<W>) -> Self {
        DirectReplySender {
            connection,
            state: SendState::Fresh,
            reported_failure: false,
        }
    }

    /// The member the reply is addressed to.
    pub fn recipient(&self) -> MemberId {
        self.connection.remote()
    }

    /// Returns `true` once a reply has been sent.
    pub fn is_sent(&self) -> bool {
        self.state == SendState::Sent
    }

    /// Returns `true` if an earlier attempt found the recipient unreachable.
    pub fn has_reported_failure(&self) -> bool {
        self.reported_failure
    }

    /// Encodes `message` with the connection's negotiated version and writes it as one frame.
    ///
    /// Returns the members the reply could not be delivered to: empty on success, or the
    /// recipient alone if it was unreachable.
    ///
    /// # Errors
    ///
    /// - [`ReplyError::Cancelled`] if the distribution manager is shutting down. No I/O happens.
    /// - [`ReplyError::Serialization`] if `message` cannot be encoded.
    /// - [`ReplyError::Io`] for any other transmission fault, with the cause preserved.
    ///
    /// # Panics
    ///
    /// Panics if a reply was already sent through this sender.
    #[instrument(level = "debug", skip_all, fields(recipient = %self.connection.remote()))]
    pub async fn send<M>(&mut self, message: &M) -> Result<HashSet<MemberId>, ReplyError>
    where
        M: Encode + ?Sized,
    {
        assert!(
            self.state == SendState::Fresh,
            "reply to {} was already sent",
            self.connection.remote()
        );

        if let Some(reason) = self.connection.cancel_reason() {
            debug!(%reason, "not sending reply, cancellation in progress");
            return Err(ReplyError::Cancelled(reason));
        }

        let recipient = self.connection.remote();
        let result = async {
            let mut writer = self.connection.acquire_writer().await?;
            let version = writer.version();
            message
                .encode(version, writer.buffer_mut())
                .map_err(SendFailure::Encode)?;
            writer.flush().await?;
            Ok::<_, SendFailure>(())
        }
        .await;

        match result {
            Ok(()) => {
                trace!("reply sent");
                self.state = SendState::Sent;
                Ok(HashSet::new())
            }
            Err(SendFailure::Connection(ConnectionError::Unreachable { member, source }))
                if member == recipient =>
            {
                debug!(error = %source, "recipient is unreachable");
                self.reported_failure = true;
                Ok(HashSet::from([member]))
            }
            Err(SendFailure::Connection(ConnectionError::Closed(member))) if member == recipient => {
                debug!("connection to recipient is closed");
                self.reported_failure = true;
                Ok(HashSet::from([member]))
            }
            Err(SendFailure::Encode(err)) => {
                error!(error = %err, "failed to serialize reply");
                Err(ReplyError::Serialization(err))
            }
            Err(SendFailure::Connection(err)) => {
                error!(error = %err, "failed to send reply");
                Err(ReplyError::Io {
                    recipient,
                    source: err,
                })
            }
        }
    }
}

enum SendFailure {
    Encode(CodecError),
    Connection(ConnectionError),
}

impl From<ConnectionError> for SendFailure {
    fn from(err: ConnectionError) -> Self {
        SendFailure::Connection(err)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    };

    use bytes::BytesMut;

    use super::*;
    use crate::{
        config::Config,
        connection::{BufferPool, CancelSignal},
        error::FrameError,
        wire::{framing::read_frame, Version, WireMessage},
    };

    fn member() -> MemberId {
        MemberId::new("10.0.0.7:10334".parse().unwrap(), 3)
    }

    fn connection<W>(writer: W) -> (Connection<W>, Arc<BufferPool>, Arc<CancelSignal>)
    where
        W: AsyncWrite + Unpin + Send,
    {
        let config = Config::default().with_buffer_pool_size(2);
        let pool = Arc::new(BufferPool::new(2, 64, 1024));
        let cancel = Arc::new(CancelSignal::new());
        let conn = Connection::new(
            member(),
            Version::V1,
            writer,
            pool.clone(),
            cancel.clone(),
            &config,
        );
        (conn, pool, cancel)
    }

    struct Unserializable;

    impl Encode for Unserializable {
        fn encode(&self, _version: Version, buf: &mut BytesMut) -> Result<(), CodecError> {
            buf.extend_from_slice(b"partial");
            Err(CodecError::Serialize("value refuses to serialize".into()))
        }
    }

    struct FailingWriter(io::ErrorKind);

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(self.0, "injected")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    const ACK: WireMessage = WireMessage::Reply {
        processor_id: 11,
        fault: None,
    };

    #[tokio::test]
    async fn reply_is_written_with_negotiated_version() {
        let (client, mut server) = tokio::io::duplex(256);
        let (conn, _, _) = connection(client);
        let mut sender = DirectReplySender::new(&conn);

        assert!(sender.send(&ACK).await.unwrap().is_empty());
        assert!(sender.is_sent());

        let frame = read_frame(&mut server, 1024).await.unwrap();
        let (version, message) = WireMessage::decode_any(&frame).unwrap();
        assert_eq!(version, Version::V1);
        assert_eq!(message, ACK);
    }

    #[tokio::test]
    #[should_panic(expected = "already sent")]
    async fn second_send_panics() {
        let (client, _server) = tokio::io::duplex(256);
        let (conn, _, _) = connection(client);
        let mut sender = DirectReplySender::new(&conn);
        sender.send(&ACK).await.unwrap();
        let _ = sender.send(&ACK).await;
    }

    #[tokio::test]
    async fn unreachable_recipient_is_returned_and_retry_is_allowed() {
        let (conn, pool, _) = connection(FailingWriter(io::ErrorKind::ConnectionReset));
        let mut sender = DirectReplySender::new(&conn);

        let unreachable = sender.send(&ACK).await.unwrap();
        assert_eq!(unreachable, HashSet::from([member()]));
        assert!(!sender.is_sent());
        assert!(sender.has_reported_failure());
        assert_eq!(pool.available(), 2);

        let unreachable = sender.send(&ACK).await.unwrap();
        assert_eq!(unreachable, HashSet::from([member()]));
    }

    #[tokio::test]
    async fn cancelled_connection_does_no_io() {
        let (client, mut server) = tokio::io::duplex(256);
        let (conn, pool, cancel) = connection(client);
        cancel.cancel("distribution manager is closing");
        let mut sender = DirectReplySender::new(&conn);

        let err = sender.send(&ACK).await.unwrap_err();
        assert!(
            matches!(err, ReplyError::Cancelled(ref reason) if reason.contains("closing")),
            "{err:?}"
        );
        assert!(!sender.is_sent());
        assert_eq!(pool.available(), 2);

        drop(conn);
        assert!(matches!(
            read_frame(&mut server, 1024).await,
            Err(FrameError::Closed)
        ));
    }

    #[tokio::test]
    async fn serialization_fault_is_fatal_and_writes_nothing() {
        let (client, mut server) = tokio::io::duplex(256);
        let (conn, pool, _) = connection(client);
        let mut sender = DirectReplySender::new(&conn);

        let err = sender.send(&Unserializable).await.unwrap_err();
        assert!(matches!(
            err,
            ReplyError::Serialization(CodecError::Serialize(_))
        ));
        assert!(!sender.is_sent());
        assert_eq!(pool.available(), 2);

        drop(conn);
        assert!(matches!(
            read_frame(&mut server, 1024).await,
            Err(FrameError::Closed)
        ));
    }

    #[tokio::test]
    async fn other_io_faults_keep_their_cause() {
        let (conn, pool, _) = connection(FailingWriter(io::ErrorKind::PermissionDenied));
        let mut sender = DirectReplySender::new(&conn);

        let err = sender.send(&ACK).await.unwrap_err();
        match err {
            ReplyError::Io {
                recipient,
                source: ConnectionError::Io(cause),
            } => {
                assert_eq!(recipient, member());
                assert_eq!(cause.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected io error, got {other:?}"),
        }
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn closed_connection_reports_recipient() {
        let (client, _server) = tokio::io::duplex(256);
        let (conn, _, _) = connection(client);
        conn.close().await.unwrap();
        let mut sender = DirectReplySender::new(&conn);
        assert_eq!(
            sender.send(&ACK).await.unwrap(),
            HashSet::from([member()])
        );
    }
}
