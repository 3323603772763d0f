//! Length-prefixed framing and the per-stream protocol negotiation.
//!
//! A frame is a 4-byte big-endian length followed by that many payload bytes, written and
//! read with `tokio_util`'s `LengthDelimitedCodec`. RPC values go through the codec, which may
//! buffer past the frame it returns, so a stream carries at most one value per direction.
//! Negotiation answers are read exactly instead, since the RPC value follows them directly.

use crate::ProtocolId;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use std::io;

/// Upper bound on a single frame.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Answer of the accepting side when it does not speak the requested protocol.
pub const PROTOCOL_REJECTED: &[u8] = b"na";

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().max_frame_length(MAX_FRAME_LEN).new_codec()
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut frames = FramedWrite::new(writer, codec());
    frames.send(Bytes::copy_from_slice(payload)).await
}

/// Reads one frame without consuming anything after it.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Encodes `value` once and writes it as a single frame.
pub async fn write_rpc<W, T>(writer: &mut W, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: Serialize + ?Sized,
{
    let payload =
        bincode::serialize(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut frames = FramedWrite::new(writer, codec());
    frames.send(Bytes::from(payload)).await
}

/// Reads the value a stream carries and decodes it into a `T`.
pub async fn read_rpc<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin + ?Sized,
    T: DeserializeOwned,
{
    let mut frames = FramedRead::new(reader, codec());
    let payload = frames.next().await.ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "stream closed before a value arrived")
    })??;
    bincode::deserialize(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Proposes `protocol` on a freshly opened stream and waits for the remote to accept it.
pub async fn select_protocol<S>(stream: &mut S, protocol: &ProtocolId) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    write_frame(stream, protocol.as_bytes()).await?;
    let answer = read_frame(stream).await?;
    if answer == protocol.as_bytes() {
        Ok(())
    } else if answer == PROTOCOL_REJECTED {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("protocol {} not supported by peer", protocol),
        ))
    } else {
        Err(io::Error::new(io::ErrorKind::InvalidData, "unexpected protocol negotiation answer"))
    }
}

/// Reads the protocol proposed by the opener of an inbound stream.
pub async fn read_proposal<S>(stream: &mut S) -> io::Result<ProtocolId>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let proposal = read_frame(stream).await?;
    let name = String::from_utf8(proposal)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "protocol id is not utf-8"))?;
    Ok(ProtocolId::new(name))
}

/// Answers a proposal: echo it back when accepted, `na` otherwise.
pub async fn answer_proposal<S>(stream: &mut S, protocol: &ProtocolId, accept: bool) -> io::Result<()>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    if accept {
        write_frame(stream, protocol.as_bytes()).await
    } else {
        write_frame(stream, PROTOCOL_REJECTED).await
    }
}
