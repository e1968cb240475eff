//! Common test utilities and shared imports

// Shared across test files; not every item is used in each one
#![allow(dead_code)]

#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use roomba_oi::{DriverConfig, OiError, ProtocolError, Roomba};
#[allow(unused_imports)]
pub use std::time::Duration;

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// The reference stream frame: packet 29 = [2, 25], packet 13 = [0].
pub const FRAME: [u8; 8] = [19, 5, 29, 2, 25, 13, 0, 182];

/// One scripted outcome of a transport read.
#[derive(Debug, Clone)]
pub enum Step {
    /// Bytes handed out across as many reads as the caller's buffer needs.
    Data(Vec<u8>),
    Error(io::ErrorKind),
    /// End of input; every later read also returns it.
    Eof,
}

#[derive(Default)]
struct Inner {
    reads: VecDeque<Step>,
    written: Vec<u8>,
    write_error: Option<io::ErrorKind>,
    waker: Option<Waker>,
}

/// Scripted transport. Reads replay the queued steps and then stay pending
/// (a silent device); writes are recorded.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let mock = Self::default();
        mock.inner.lock().unwrap().reads.extend(steps);
        mock
    }

    pub fn push(&self, step: Step) {
        let mut inner = self.inner.lock().unwrap();
        inner.reads.push_back(step);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.inner.lock().unwrap().write_error = Some(kind);
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }
}

impl AsyncRead for MockTransport {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.reads.front_mut() {
            None => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Some(Step::Data(data)) => {
                let n = data.len().min(buf.remaining());
                buf.put_slice(&data[..n]);
                data.drain(..n);
                if data.is_empty() {
                    inner.reads.pop_front();
                }
                Poll::Ready(Ok(()))
            }
            Some(Step::Error(kind)) => {
                let kind = *kind;
                inner.reads.pop_front();
                Poll::Ready(Err(kind.into()))
            }
            Some(Step::Eof) => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(kind) = inner.write_error {
            return Poll::Ready(Err(kind.into()));
        }
        inner.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Driver config with a short read deadline so silent-device paths finish fast.
pub fn fast_config() -> DriverConfig {
    DriverConfig::default().with_read_timeout(Some(Duration::from_millis(50)))
}

/// A driver over `mock` plus a handle for inspecting what it wrote.
pub fn driver(steps: impl IntoIterator<Item = Step>) -> (Roomba<MockTransport>, MockTransport) {
    let mock = MockTransport::new(steps);
    (Roomba::with_config(mock.clone(), fast_config()), mock)
}

/// Polls `cond` until it holds or two seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
