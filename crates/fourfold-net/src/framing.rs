//! Length-prefixed frames over a byte stream.
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! Each frame carries exactly one JSON-encoded message. The length excludes
//! the prefix itself. A stream that ends cleanly between frames is a normal
//! close; one that ends inside a frame is [`FrameError::Truncated`].
//! An oversized frame is read past and reported as
//! [`FrameError::PayloadTooLarge`], so the next frame can still be read.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a frame payload. Game messages are far smaller.
pub const DEFAULT_MAX_PAYLOAD: u32 = 64 * 1024;

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Errors raised while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared or supplied payload exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u32, max: u32 },

    /// The peer closed the stream part-way through a frame.
    #[error("stream ended inside a frame")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads whole frames from an async byte source.
pub struct FrameReader<R> {
    inner: R,
    max_payload_size: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, config: &FrameConfig) -> Self {
        Self {
            inner,
            max_payload_size: config.max_payload_size,
        }
    }

    /// Read the next frame payload. `Ok(None)` means the peer closed the
    /// stream on a frame boundary.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            let n = self.inner.read(&mut prefix[filled..]).await?;
            if n == 0 {
                return if filled == 0 {
                    Ok(None)
                } else {
                    Err(FrameError::Truncated)
                };
            }
            filled += n;
        }

        let size = u32::from_le_bytes(prefix);
        if size > self.max_payload_size {
            let mut rest = (&mut self.inner).take(u64::from(size));
            let skipped = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await?;
            if skipped < u64::from(size) {
                return Err(FrameError::Truncated);
            }
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }

        let mut payload = vec![0u8; size as usize];
        self.inner
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::Truncated,
                _ => FrameError::Io(e),
            })?;
        Ok(Some(payload))
    }
}

/// Writes whole frames to an async byte sink, flushing after each.
pub struct FrameWriter<W> {
    inner: W,
    max_payload_size: u32,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, config: &FrameConfig) -> Self {
        Self {
            inner,
            max_payload_size: config.max_payload_size,
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        if size > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }
        self.inner.write_all(&size.to_le_bytes()).await?;
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the underlying stream.
    pub async fn close(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
