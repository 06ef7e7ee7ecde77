//! Framing: length-prefix (4 bytes LE) + bincode payload.

use std::io::{self, Read};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::Message;

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a message into a single frame: 4 bytes LE length + bincode payload.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(msg).map_err(FrameEncodeError::Encode)?;
    let len = checked_len(payload.len())?;
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Length prefix for a payload of `len` bytes, checked against the limit before narrowing.
fn checked_len(len: usize) -> Result<u32, FrameEncodeError> {
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameEncodeError::TooLarge);
    }
    Ok(len as u32)
}

/// Error encoding a message into a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the message and the number of bytes consumed.
/// Call with partial buffer; returns error if not enough bytes (caller should try again after more data).
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = frame_len(&bytes[..LEN_SIZE])?;
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let msg: Message =
        bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len]).map_err(FrameDecodeError::Decode)?;
    Ok((msg, LEN_SIZE + len))
}

/// Error decoding a frame (need more bytes, too large, bincode failure, or the socket).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<FrameEncodeError> for io::Error {
    fn from(e: FrameEncodeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, e)
    }
}

impl From<FrameDecodeError> for io::Error {
    fn from(e: FrameDecodeError) -> Self {
        match e {
            FrameDecodeError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

fn frame_len(header: &[u8]) -> Result<usize, FrameDecodeError> {
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if len > MAX_FRAME_LEN {
        return Err(FrameDecodeError::TooLarge);
    }
    Ok(len as usize)
}

/// Read exactly one frame from a blocking reader. Never consumes bytes past the frame.
pub fn read_frame<R: Read>(r: &mut R) -> Result<Message, FrameDecodeError> {
    let mut buf = vec![0u8; LEN_SIZE];
    r.read_exact(&mut buf)?;
    let len = frame_len(&buf)?;
    buf.resize(LEN_SIZE + len, 0);
    r.read_exact(&mut buf[LEN_SIZE..])?;
    decode_frame(&buf).map(|(msg, _)| msg)
}

/// Async counterpart of [`read_frame`].
pub async fn read_frame_async<R: AsyncRead + Unpin>(r: &mut R) -> Result<Message, FrameDecodeError> {
    let mut buf = vec![0u8; LEN_SIZE];
    r.read_exact(&mut buf).await?;
    let len = frame_len(&buf)?;
    buf.resize(LEN_SIZE + len, 0);
    r.read_exact(&mut buf[LEN_SIZE..]).await?;
    decode_frame(&buf).map(|(msg, _)| msg)
}

pub async fn write_frame_async<W: AsyncWrite + Unpin>(w: &mut W, msg: &Message) -> io::Result<()> {
    let frame = encode_frame(msg)?;
    w.write_all(&frame).await?;
    w.flush().await
}
