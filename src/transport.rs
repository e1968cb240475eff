//! Byte channel the driver talks over.
//!
//! Opening and configuring the physical link (serial port, baud rate, BRC
//! keep-alive pulses) happens outside this crate; anything that is
//! `AsyncRead + AsyncWrite` can carry the Open Interface, including a
//! `tokio::io::DuplexStream` wired to the [`crate::sim`] simulator.

use crate::command::Command;
use crate::error::OiError;
use bytes::Bytes;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{Instant, timeout};
use tracing::{debug, trace};

/// A duplex byte channel to the device.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Runs `fut` under the optional deadline.
async fn with_deadline<F, R>(deadline: Option<Duration>, fut: F) -> Result<R, OiError>
where
    F: Future<Output = io::Result<R>>,
{
    match deadline {
        Some(limit) => Ok(timeout(limit, fut).await??),
        None => Ok(fut.await?),
    }
}

/// Writes the full command and flushes it.
pub(crate) async fn write_command<T: Transport>(
    io: &mut T,
    command: &Command,
    deadline: Option<Duration>,
) -> Result<(), OiError> {
    let bytes = command.to_bytes();
    debug!(command = %command.opcode(), bytes = hex::encode(&bytes), "OI write");
    with_deadline(deadline, async {
        io.write_all(&bytes).await?;
        io.flush().await
    })
    .await
}

/// One read call. `Ok(0)` means the channel has closed.
pub(crate) async fn read_some<T: Transport>(
    io: &mut T,
    buf: &mut [u8],
    deadline: Option<Duration>,
) -> Result<usize, OiError> {
    let n = with_deadline(deadline, io.read(buf)).await?;
    trace!(bytes = hex::encode(&buf[..n]), "OI read");
    Ok(n)
}

/// Reads exactly the `len` payload bytes of packet `id`, across as many short
/// reads as the transport needs.
pub(crate) async fn read_payload<T: Transport>(
    io: &mut T,
    id: u8,
    len: usize,
    deadline: Option<Duration>,
) -> Result<Bytes, OiError> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        let n = read_some(io, &mut buf[filled..], deadline).await?;
        if n == 0 {
            return Err(OiError::IncompletePacket {
                id,
                expected: len,
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(Bytes::from(buf))
}

/// Discards input until the channel has been quiet for `quiet`, it closes,
/// or `limit` has passed. Returns the number of bytes thrown away.
pub(crate) async fn drain_input<T: Transport>(io: &mut T, quiet: Duration, limit: Duration) -> usize {
    let give_up = Instant::now() + limit;
    let mut scratch = [0u8; 64];
    let mut discarded = 0;
    while Instant::now() < give_up {
        match timeout(quiet, io.read(&mut scratch)).await {
            Ok(Ok(n)) if n > 0 => discarded += n,
            _ => break,
        }
    }
    discarded
}

/// Read errors the stream worker retries instead of giving up on.
pub(crate) fn is_transient(err: &OiError) -> bool {
    match err {
        OiError::Timeout(_) => true,
        OiError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn read_payload_accumulates_short_reads() {
        let (mut driver, mut device) = duplex(64);
        let writer = tokio::spawn(async move {
            device.write_all(&[1]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            device.write_all(&[2, 3]).await.unwrap();
            device
        });
        let payload = read_payload(&mut driver, 100, 3, Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(&payload[..], &[1, 2, 3]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn read_payload_reports_incomplete_on_close() {
        let (mut driver, mut device) = duplex(64);
        device.write_all(&[9]).await.unwrap();
        drop(device);
        match read_payload(&mut driver, 19, 2, None).await {
            Err(OiError::IncompletePacket { id, expected, actual }) => {
                assert_eq!((id, expected, actual), (19, 2, 1));
            }
            other => panic!("expected IncompletePacket, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_times_out_on_silent_device() {
        let (mut driver, _device) = duplex(64);
        let err = read_payload(&mut driver, 7, 1, Some(Duration::from_millis(20))).await.unwrap_err();
        assert!(matches!(err, OiError::Timeout(_)));
        assert!(is_transient(&err));
    }

    #[tokio::test]
    async fn drain_discards_pending_bytes() {
        let (mut driver, mut device) = duplex(64);
        device.write_all(&[1, 2, 3, 4]).await.unwrap();
        let n = drain_input(&mut driver, Duration::from_millis(10), Duration::from_millis(200)).await;
        assert_eq!(n, 4);
    }

    #[test]
    fn transient_classification() {
        assert!(is_transient(&OiError::Io(io::ErrorKind::Interrupted.into())));
        assert!(!is_transient(&OiError::Io(io::ErrorKind::BrokenPipe.into())));
        assert!(!is_transient(&OiError::UnknownSensorId(1)));
    }
}
