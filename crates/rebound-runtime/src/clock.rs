//! Tokio-aware clock.

use rebound_core::Clock;
use std::time::Instant;

/// Reads tokio's clock, so a paused test runtime also freezes circuit
/// timing. Outside a runtime this is the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(clock.now() - start >= Duration::from_secs(45));
    }
}
