//! In this module, we implement the monitoring logic for a capture.
//! This counts what the sample source did to us (overflows, empty reads, stalls)
//! so a truncated capture can be explained after the fact.

use std::time::{Duration, Instant};

use tracing::info;

#[derive(Clone, Debug)]
pub struct CaptureStats {
    /// Receive calls that delivered at least one sample
    pub blocks: usize,
    /// Samples kept in the capture buffer
    pub samples: usize,
    /// Samples delivered past the end of the buffer and dropped
    pub excess: usize,
    pub overflows: usize,
    pub empty_reads: usize,
    /// Longest run of consecutive empty reads
    pub longest_stall: usize,
    start: Instant,
    elapsed: Option<Duration>,
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self {
            blocks: 0,
            samples: 0,
            excess: 0,
            overflows: 0,
            empty_reads: 0,
            longest_stall: 0,
            start: Instant::now(),
            elapsed: None,
        }
    }
}

impl CaptureStats {
    pub fn record_block(&mut self, kept: usize, received: usize) {
        self.blocks += 1;
        self.samples += kept;
        self.excess += received - kept;
    }

    pub fn record_empty(&mut self, consecutive: usize) {
        self.empty_reads += 1;
        self.longest_stall = self.longest_stall.max(consecutive);
    }

    pub fn record_overflow(&mut self) {
        self.overflows += 1;
    }

    pub fn finish(&mut self) {
        self.elapsed = Some(self.start.elapsed());
    }

    /// Wall time of the capture, or time so far if it hasn't finished
    pub fn elapsed(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.start.elapsed())
    }

    /// Achieved sample rate over the whole capture
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.samples as f64 / secs
        } else {
            0.0
        }
    }

    pub fn log(&self) {
        info!(
            blocks = self.blocks,
            samples = self.samples,
            excess = self.excess,
            overflows = self.overflows,
            empty_reads = self.empty_reads,
            longest_stall = self.longest_stall,
            "Capture took {:.3}s ({:.3} Msps)",
            self.elapsed().as_secs_f64(),
            self.throughput() / 1e6
        );
    }
}
