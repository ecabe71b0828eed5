use std::io::{self, Write};
use std::pin::Pin;
use std::sync::{Arc, PoisonError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::warn;
use tracing_subscriber::fmt::MakeWriter;

/*
    @@@
    @SharedWriter;
    . One blocking writer handle shared by the OutputSink and the tracing subscriber.
    . Every chunk and every status line is written and flushed under the same lock,
      so a status line can only land between two relayed chunks, never inside one.
*/
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<std::sync::Mutex<Box<dyn Write + Send>>>,
}

impl SharedWriter {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(std::sync::Mutex::new(Box::new(writer))),
        }
    }

    pub fn write_chunk(&self, bytes: &[u8]) -> io::Result<()> {
        let mut out = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(bytes)?;
        out.flush()
    }
}

/// Buffers one formatted event and hands it to the shared writer on drop.
pub struct SharedLine {
    shared: SharedWriter,
    buf: Vec<u8>,
}

impl Write for SharedLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SharedLine {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let _ = self.shared.write_chunk(&self.buf);
        }
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedLine;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLine {
            shared: self.clone(),
            buf: Vec::new(),
        }
    }
}

enum Destination {
    Async(Pin<Box<dyn AsyncWrite + Send>>),
    Shared(SharedWriter),
}

/*
    @@@
    @OutputSink;
    . Shared handle on the launcher's standard output, cloned into the stderr pump and the tailer.
    . A slow consumer only makes `write` wait; it never fails the caller.
    . Broken pipes and EAGAIN are dropped silently, anything else goes to the tracing side channel.
*/
#[derive(Clone)]
pub struct OutputSink {
    dest: Arc<Mutex<Destination>>,
}

impl OutputSink {
    /// Writes through the same handle the tracing subscriber prints status lines to.
    pub fn shared(writer: SharedWriter) -> Self {
        Self {
            dest: Arc::new(Mutex::new(Destination::Shared(writer))),
        }
    }

    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self {
            dest: Arc::new(Mutex::new(Destination::Async(Box::pin(writer)))),
        }
    }

    pub async fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let mut dest = self.dest.lock().await;
        let result = match &mut *dest {
            Destination::Async(writer) => match writer.write_all(bytes).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            },
            // a full pipe parks a blocking thread, not the event loop
            Destination::Shared(shared) => {
                let shared = shared.clone();
                let chunk = bytes.to_vec();
                tokio::task::spawn_blocking(move || shared.write_chunk(&chunk))
                    .await
                    .unwrap_or_else(|e| Err(io::Error::other(e)))
            }
        };

        if let Err(err) = result {
            // never written back through the sink itself
            if !is_expected_pipe_error(&err) {
                warn!(error = %err, "stdout write failed (ignored)");
            }
        }
    }
}

/// Consumer went away or is momentarily full.
pub fn is_expected_pipe_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
pub(crate) mod capture {
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;

    /// In-memory stdout stand-in.
    #[derive(Clone, Default)]
    pub struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        pub fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.bytes()).into_owned()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AsyncWrite for Capture {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Slow consumer: the first write parks with `Pending`, later ones take a few bytes at a time.
    pub struct Trickle {
        out: Capture,
        stalled: bool,
    }

    impl Trickle {
        pub fn new(out: Capture) -> Self {
            Self { out, stalled: false }
        }
    }

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if !self.stalled {
                self.stalled = true;
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
            let n = buf.len().min(3);
            self.out.0.lock().unwrap().extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Writer that fails every call with the given error kind.
    pub struct Failing(pub io::ErrorKind);

    impl AsyncWrite for Failing {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(self.0)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
