//! Length-prefixed framing of encoded messages on a byte stream.
//!
//! Each frame is a big-endian `u32` payload length followed by the payload.

use std::io;

use bytes::BytesMut;
use futures::{stream, Stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Size of the frame length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Builds the length prefix for a payload of `payload_len` bytes.
pub fn frame_header(payload_len: usize) -> [u8; LENGTH_PREFIX_LEN] {
    debug_assert!(payload_len <= u32::MAX as usize);
    (payload_len as u32).to_be_bytes()
}

/// Writes one frame and flushes the writer.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame_header(payload.len())).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one frame.
///
/// Returns [`FrameError::Closed`] if the stream ends before a length prefix, and
/// [`FrameError::TooLarge`] without reading the payload if the announced length exceeds
/// `max_len`.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<BytesMut, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Err(FrameError::Closed),
        Err(err) => return Err(FrameError::Io(err)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(FrameError::TooLarge { len, max: max_len });
    }
    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Reads frames until the stream closes.
///
/// The stream ends after the peer closes the connection between frames. Any other error is
/// yielded once and ends the stream.
pub fn frames<R>(reader: R, max_len: usize) -> impl Stream<Item = Result<BytesMut, FrameError>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(Some(reader), move |reader| async move {
        let mut reader = reader?;
        match read_frame(&mut reader, max_len).await {
            Ok(frame) => Some((Ok(frame), Some(reader))),
            Err(FrameError::Closed) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
}
