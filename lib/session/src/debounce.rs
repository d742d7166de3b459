//! Trailing-edge debounce primitive.
//!
//! Values pushed into a [`Debouncer`] are forwarded to its output receiver
//! only once the input has been quiet for the configured window. Each push
//! restarts the window, and only the latest value survives. Intermediate
//! values are dropped, not queued.

use std::time::Duration;
use tokio::sync::mpsc;

/// Input handle of a debounced event stream.
///
/// Dropping every clone closes the stream: a value still waiting for its
/// window is flushed, then the output receiver yields `None`.
#[derive(Debug)]
pub struct Debouncer<T> {
    input: mpsc::UnboundedSender<T>,
    window: Duration,
}

impl<T> Clone for Debouncer<T> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            window: self.window,
        }
    }
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawns the debounce task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(window: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (input, raw) = mpsc::unbounded_channel();
        let (settled, output) = mpsc::unbounded_channel();
        tokio::spawn(run(window, raw, settled));
        (Self { input, window }, output)
    }

    /// Pushes a raw value. Returns `false` if the output side is gone.
    pub fn push(&self, value: T) -> bool {
        self.input.send(value).is_ok()
    }

    /// Returns the coalescing window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

async fn run<T>(
    window: Duration,
    mut raw: mpsc::UnboundedReceiver<T>,
    settled: mpsc::UnboundedSender<T>,
) {
    while let Some(first) = raw.recv().await {
        let mut latest = first;
        let mut coalesced = 0_usize;
        let closed = loop {
            match tokio::time::timeout(window, raw.recv()).await {
                Ok(Some(next)) => {
                    latest = next;
                    coalesced += 1;
                }
                Ok(None) => break true,
                Err(_elapsed) => break false,
            }
        };

        if coalesced > 0 {
            tracing::trace!(coalesced, "debounced burst");
        }
        if settled.send(latest).is_err() || closed {
            return;
        }
    }
}
