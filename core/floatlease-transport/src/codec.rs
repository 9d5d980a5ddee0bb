//! Length-prefixed JSON framing for lease messages.

use crate::protocol::MAX_FRAME_SIZE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads one length-prefixed JSON frame.
pub async fn read_frame<T, R>(io: &mut R) -> io::Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    io.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes"),
        ));
    }

    let mut buf = vec![0u8; len];
    io.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("JSON decode error: {e}"))
    })
}

/// Writes one length-prefixed JSON frame and flushes.
pub async fn write_frame<T, W>(io: &mut W, message: &T) -> io::Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let data = serde_json::to_vec(message).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("JSON encode error: {e}"))
    })?;

    if data.len() > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", data.len()),
        ));
    }

    let len_bytes = (data.len() as u32).to_be_bytes();
    io.write_all(&len_bytes).await?;
    io.write_all(&data).await?;
    io.flush().await?;

    Ok(())
}
