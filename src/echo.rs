//! Echo handler.
//!
//! Every byte read from a connection is written back to the same connection,
//! unchanged and in order, until the peer closes its write side or an I/O
//! operation fails:
//!
//! ```text
//! OPEN --(read n > 0, write n)--> OPEN
//! OPEN --(read 0 | I/O error)--> CLOSED
//! ```
//!
//! There is no framing, size limit, or idle timeout. A peer that neither
//! sends nor closes keeps its connection open indefinitely.

use bytes::BytesMut;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Echo `stream` onto itself until end-of-stream.
///
/// Returns the number of bytes echoed. On end-of-stream the write side is
/// shut down so the peer sees the close. Any read or write error ends the
/// loop and is returned as-is.
pub async fn echo<S>(stream: &mut S, buffer_size: usize) -> io::Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(buffer_size);
    let mut echoed: u64 = 0;

    loop {
        buffer.clear();

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            trace!("Connection closed by client");
            break;
        }

        trace!(bytes = n, "Echoing chunk");
        stream.write_all(&buffer[..n]).await?;
        echoed += n as u64;
    }

    stream.shutdown().await?;
    Ok(echoed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_echo_ping() {
        let mut stream = Builder::new().read(b"ping").write(b"ping").build();

        let echoed = echo(&mut stream, 1024).await.unwrap();
        assert_eq!(echoed, 4);
    }

    #[tokio::test]
    async fn test_echo_preserves_order_across_reads() {
        let mut stream = Builder::new()
            .read(b"hello ")
            .write(b"hello ")
            .read(b"world")
            .write(b"world")
            .read(b"\x00\xff\r\n")
            .write(b"\x00\xff\r\n")
            .build();

        let echoed = echo(&mut stream, 1024).await.unwrap();
        assert_eq!(echoed, 15);
    }

    #[tokio::test]
    async fn test_immediate_eof() {
        let mut stream = Builder::new().build();

        let echoed = echo(&mut stream, 1024).await.unwrap();
        assert_eq!(echoed, 0);
    }

    #[tokio::test]
    async fn test_read_error_ends_loop() {
        let mut stream = Builder::new()
            .read(b"abc")
            .write(b"abc")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = echo(&mut stream, 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_write_error_ends_loop() {
        let mut stream = Builder::new()
            .read(b"abc")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"))
            .build();

        let err = echo(&mut stream, 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
