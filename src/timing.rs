//! Wall-clock timing of scan phases.

use std::time::{Duration, Instant};
use tracing::info;

/// Measures one phase of a scan (`walk`, `finalize`).
#[derive(Debug)]
pub struct PhaseTimer {
    phase: &'static str,
    started: Instant,
}

impl PhaseTimer {
    pub fn start(phase: &'static str) -> Self {
        Self {
            phase,
            started: Instant::now(),
        }
    }

    /// Log the phase duration at info level and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        info!(phase = self.phase, elapsed_ms = elapsed.as_millis() as u64, "phase done");
        elapsed
    }
}
