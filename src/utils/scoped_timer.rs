use tokio::time::Instant;
use tracing::trace;

/// Traces how long a store call took when dropped
pub(crate) struct ScopedTimer {
    start: Instant,
    name: &'static str,
}

impl ScopedTimer {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    pub(crate) fn elapsed_micros(&self) -> u128 {
        self.start.elapsed().as_micros()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        trace!(
            target: "timing",
            operation = self.name,
            elapsed_us = self.elapsed_micros(),
            "[TIMING] {} finished",
            self.name
        );
    }
}
