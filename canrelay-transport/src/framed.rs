//! Fixed-size frame I/O over byte streams
//!
//! Used for client connections and for the TCP hardware half-channels.
//! There is no length prefix and no delimiter: a frame is simply the
//! next [`FRAME_SIZE`] bytes on the stream.

use std::io;

use canrelay_core::{Frame, FRAME_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

/// Outcome of reading one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete frame
    Frame(Frame),

    /// The stream ended before a full frame arrived
    ///
    /// `received` is how many bytes of the partial frame were seen; they
    /// are discarded.
    Closed { received: usize },
}

/// Read exactly one frame
///
/// Accumulates bytes until a whole frame is available. End of stream, or
/// a reset/aborted connection, before that point yields
/// [`Incoming::Closed`] and never a short frame. Other I/O errors
/// propagate.
pub async fn read_frame<R>(reader: &mut R) -> Result<Incoming>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; FRAME_SIZE];
    let mut filled = 0;

    while filled < FRAME_SIZE {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => return Ok(Incoming::Closed { received: filled }),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if is_disconnect(&e) => {
                trace!("Stream dropped after {} bytes: {}", filled, e);
                return Ok(Incoming::Closed { received: filled });
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }

    Ok(Incoming::Frame(Frame::new(buf)))
}

/// Write one frame in full and flush
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
