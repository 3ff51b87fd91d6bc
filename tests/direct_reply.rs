use std::{
    collections::HashSet,
    io,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::Duration,
};

use bytes::BytesMut;
use clusterlink::{
    error::{CodecError, ReplyError},
    wire::{framing, Encode},
    ClusterContext, Config, DirectReplySender, MemberId, Version, WireMessage,
};
use tokio::io::AsyncWrite;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("clusterlink=trace")
        .with_test_writer()
        .try_init();
}

fn context() -> Arc<ClusterContext> {
    ClusterContext::new(
        MemberId::generate("127.0.0.1:10334".parse().unwrap()),
        Config::default()
            .with_buffer_pool_size(1)
            .with_writer_acquire_timeout(Duration::from_millis(50)),
    )
}

fn requester() -> MemberId {
    MemberId::generate("10.1.1.9:40404".parse().unwrap())
}

fn ack(processor_id: u32) -> WireMessage {
    WireMessage::Reply {
        processor_id,
        fault: None,
    }
}

/// A socket whose peer has gone away. Counts the writes attempted on it.
#[derive(Default)]
struct ResetSocket {
    writes: Arc<AtomicUsize>,
}

impl AsyncWrite for ResetSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct BrokenPayload;

impl Encode for BrokenPayload {
    fn encode(&self, _version: Version, _buf: &mut BytesMut) -> Result<(), CodecError> {
        Err(CodecError::Serialize("payload holds a closed file handle".into()))
    }
}

#[tokio::test]
async fn reply_reaches_the_requester() {
    init_tracing();
    let ctx = context();
    let (client, mut server) = tokio::io::duplex(1024);
    let conn = ctx.connection(requester(), Version::V2, client);
    let mut sender = DirectReplySender::new(&conn);
    assert_eq!(sender.recipient(), conn.remote());

    let unreachable = sender.send(&ack(21)).await.unwrap();
    assert!(unreachable.is_empty());
    assert!(sender.is_sent());

    let frame = framing::read_frame(&mut server, 1024).await.unwrap();
    assert_eq!(&frame[..2], &Version::V2.ordinal().to_be_bytes());
    assert_eq!(
        WireMessage::decode_any(&frame).unwrap(),
        (Version::V2, ack(21))
    );
}

#[tokio::test]
#[should_panic(expected = "already sent")]
async fn sending_twice_is_a_bug() {
    let ctx = context();
    let (client, _server) = tokio::io::duplex(1024);
    let conn = ctx.connection(requester(), Version::V1, client);
    let mut sender = DirectReplySender::new(&conn);

    sender.send(&ack(1)).await.unwrap();
    let _ = sender.send(&ack(1)).await;
}

#[tokio::test]
async fn unreachable_requester_is_reported_as_data() {
    init_tracing();
    let ctx = context();
    let socket = ResetSocket::default();
    let writes = socket.writes.clone();
    let recipient = requester();
    let conn = ctx.connection(recipient, Version::CURRENT, socket);
    let mut sender = DirectReplySender::new(&conn);

    let unreachable = sender.send(&ack(5)).await.unwrap();
    assert_eq!(unreachable, HashSet::from([recipient]));
    assert!(!sender.is_sent());
    assert!(sender.has_reported_failure());
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    // The only buffer of the pool came back, so a retry can take it again.
    assert_eq!(ctx.buffer_pool().available(), 1);
    let unreachable = sender.send(&ack(5)).await.unwrap();
    assert_eq!(unreachable, HashSet::from([recipient]));
    assert_eq!(writes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_cancels_without_io() {
    init_tracing();
    let ctx = context();
    let socket = ResetSocket::default();
    let writes = socket.writes.clone();
    let conn = ctx.connection(requester(), Version::CURRENT, socket);

    ctx.shutdown("cache is closing");
    let mut sender = DirectReplySender::new(&conn);
    match sender.send(&ack(2)).await {
        Err(ReplyError::Cancelled(reason)) => assert_eq!(reason, "cache is closing"),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(writes.load(Ordering::SeqCst), 0);
    assert!(!sender.is_sent());
}

#[tokio::test]
async fn serialization_failure_is_fatal_and_releases_the_buffer() {
    init_tracing();
    let ctx = context();
    let socket = ResetSocket::default();
    let writes = socket.writes.clone();
    let conn = ctx.connection(requester(), Version::CURRENT, socket);
    let mut sender = DirectReplySender::new(&conn);

    let err = sender.send(&BrokenPayload).await.unwrap_err();
    assert!(matches!(
        err,
        ReplyError::Serialization(CodecError::Serialize(ref msg)) if msg.contains("file handle")
    ));
    assert_eq!(writes.load(Ordering::SeqCst), 0);
    assert_eq!(ctx.buffer_pool().available(), 1);
}

#[tokio::test]
async fn busy_pool_is_a_transmission_fault() {
    init_tracing();
    let ctx = context();
    let (client, _server) = tokio::io::duplex(1024);
    let conn = ctx.connection(requester(), Version::CURRENT, client);

    let _held = ctx
        .buffer_pool()
        .acquire(Duration::from_secs(1))
        .await
        .unwrap();
    let mut sender = DirectReplySender::new(&conn);
    let err = sender.send(&ack(3)).await.unwrap_err();
    assert!(matches!(err, ReplyError::Io { recipient, .. } if recipient == conn.remote()));
}

#[test]
fn reply_can_be_sent_from_blocking_code() {
    let ctx = context();
    let (client, mut server) = tokio::io::duplex(1024);
    let conn = ctx.connection(requester(), Version::V1, client);

    tokio_test::block_on(async {
        let mut sender = DirectReplySender::new(&conn);
        assert!(sender.send(&ack(8)).await.unwrap().is_empty());
        let frame = framing::read_frame(&mut server, 1024).await.unwrap();
        assert_eq!(
            WireMessage::decode_any(&frame).unwrap(),
            (Version::V1, ack(8))
        );
    });
}

#[tokio::test]
async fn stalled_requester_does_not_block_replies_to_others() {
    init_tracing();
    let ctx = ClusterContext::new(
        MemberId::generate("127.0.0.1:10334".parse().unwrap()),
        Config::default()
            .with_buffer_pool_size(2)
            .with_writer_acquire_timeout(Duration::from_millis(100)),
    );

    // This requester never reads, so its channel fills up after the first few bytes.
    let (stalled_io, _stalled_peer) = tokio::io::duplex(8);
    let stalled = Arc::new(ctx.connection(requester(), Version::CURRENT, stalled_io));
    let pending: Vec<_> = (0..2)
        .map(|i| {
            let stalled = stalled.clone();
            tokio::spawn(async move { DirectReplySender::new(&*stalled).send(&ack(i)).await })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (healthy_io, mut healthy_peer) = tokio::io::duplex(1024);
    let healthy = ctx.connection(requester(), Version::CURRENT, healthy_io);
    let mut sender = DirectReplySender::new(&healthy);
    assert!(sender.send(&ack(99)).await.unwrap().is_empty());

    let frame = framing::read_frame(&mut healthy_peer, 1024).await.unwrap();
    assert_eq!(
        WireMessage::decode_any(&frame).unwrap(),
        (Version::CURRENT, ack(99))
    );

    for reply in pending {
        reply.abort();
    }
}
