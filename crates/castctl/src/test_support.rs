//! Helpers shared by unit and integration tests.
//!
//! Compiled into the library so the tests under `tests/` can use them too.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory log sink.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuf {
    type Writer = SharedBuf;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `fut` with a thread-local subscriber and returns its output together
/// with everything it logged at `debug` and above, one event per line.
///
/// Only valid on a current-thread runtime, which is what `#[tokio::test]`
/// uses by default.
pub async fn capture_logs<F: Future>(fut: F) -> (F::Output, String) {
    let buf = SharedBuf::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buf.clone())
        .with_ansi(false)
        .with_max_level(Level::DEBUG)
        .without_time()
        .finish();

    let guard = tracing::subscriber::set_default(subscriber);
    let output = fut.await;
    drop(guard);
    (output, buf.contents())
}
