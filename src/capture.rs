//! This module contains all the capture logic

// The capture loop does one thing: pull blocks from the radio into a fixed
// length buffer until it's full. Overflows upstream are survivable, a stream
// that goes quiet for too long or reports a hard error ends the capture early
// and we hand back whatever prefix we managed to get.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, error, info, warn};

use crate::{
    complex::ComplexFloat,
    error::{Error, Result},
    monitoring::CaptureStats,
    source::{SampleSource, StreamCode, StreamMetadata},
};

/// How many empty reads in a row we tolerate before giving up
pub const STALL_LIMIT: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Buffer filled to the requested length
    Complete,
    /// The source stopped delivering without reporting an error
    AbortedTimeout,
    /// The source reported an unrecoverable error
    AbortedError(String),
    /// The user asked us to stop
    Cancelled,
}

impl CaptureOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, CaptureOutcome::Complete)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Capturing,
    /// Last block came with an overflow flag, we keep going
    OverflowContinue,
    /// Number of consecutive empty reads so far
    Stalling(usize),
    Done,
    Aborted(CaptureOutcome),
}

impl CaptureState {
    /// Transition on the result of one receive call. `full` is whether the
    /// buffer reached its target length after this block was stored.
    pub fn advance(
        self,
        received: usize,
        meta: &StreamMetadata,
        full: bool,
        stall_limit: usize,
    ) -> CaptureState {
        if meta.code == StreamCode::Fatal {
            return CaptureState::Aborted(CaptureOutcome::AbortedError(meta.to_string()));
        }
        if received == 0 {
            let consecutive = match self {
                CaptureState::Stalling(n) => n + 1,
                _ => 1,
            };
            return if consecutive > stall_limit {
                CaptureState::Aborted(CaptureOutcome::AbortedTimeout)
            } else {
                CaptureState::Stalling(consecutive)
            };
        }
        if full {
            CaptureState::Done
        } else if meta.code == StreamCode::Overflow {
            CaptureState::OverflowContinue
        } else {
            CaptureState::Capturing
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, CaptureState::Done | CaptureState::Aborted(_))
    }
}

/// The assembled buffer and how we got it
#[derive(Debug)]
pub struct Capture {
    pub samples: Vec<ComplexFloat>,
    pub outcome: CaptureOutcome,
    pub stats: CaptureStats,
}

#[derive(Clone, Debug)]
pub struct Assembler {
    stall_limit: usize,
    cancel: Arc<AtomicBool>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(STALL_LIMIT)
    }
}

impl Assembler {
    pub fn new(stall_limit: usize) -> Self {
        Self {
            stall_limit,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that aborts the capture when set. Checked between receive calls.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start `source` streaming and collect up to `target_len` samples from it
    pub fn assemble<S>(&self, source: &mut S, target_len: usize) -> Result<Capture>
    where
        S: SampleSource + ?Sized,
    {
        if target_len == 0 {
            return Err(Error::InvalidInput {
                name: "capture length",
                value: 0.0,
            });
        }
        let mut scratch = vec![ComplexFloat::default(); source.max_block_len().max(1)];
        let mut samples = Vec::with_capacity(target_len);
        let mut stats = CaptureStats::default();
        let mut state = CaptureState::Capturing;

        info!("Capturing {} samples", target_len);
        source.start(target_len)?;

        while !state.is_finished() {
            if self.cancel.load(Ordering::Relaxed) {
                state = CaptureState::Aborted(CaptureOutcome::Cancelled);
                break;
            }
            let (received, meta) = source.receive(&mut scratch);
            let received = received.min(scratch.len());
            match meta.code {
                StreamCode::Overflow => {
                    stats.record_overflow();
                    warn!("{}", meta);
                }
                StreamCode::Fatal => error!("{}", meta),
                _ => (),
            }
            if meta.code != StreamCode::Fatal && received > 0 {
                let kept = received.min(target_len - samples.len());
                samples.extend_from_slice(&scratch[..kept]);
                stats.record_block(kept, received);
            }
            if received == 0 && meta.code != StreamCode::Fatal {
                let consecutive = match &state {
                    CaptureState::Stalling(n) => n + 1,
                    _ => 1,
                };
                stats.record_empty(consecutive);
                debug!("Empty read ({} in a row)", consecutive);
            }
            state = state.advance(received, &meta, samples.len() == target_len, self.stall_limit);
        }
        stats.finish();

        let outcome = match state {
            CaptureState::Aborted(outcome) => outcome,
            _ => CaptureOutcome::Complete,
        };
        match &outcome {
            CaptureOutcome::Complete => info!("Capture complete. Acquired {} samples", samples.len()),
            CaptureOutcome::AbortedTimeout => warn!(
                "Timeout waiting for samples, keeping {} of {}",
                samples.len(),
                target_len
            ),
            CaptureOutcome::AbortedError(detail) => error!(
                "Capture aborted ({}), keeping {} of {} samples",
                detail,
                samples.len(),
                target_len
            ),
            CaptureOutcome::Cancelled => warn!("Capture cancelled after {} samples", samples.len()),
        }
        stats.log();

        Ok(Capture {
            samples,
            outcome,
            stats,
        })
    }
}

/// Assemble with the default stall limit and no cancellation
pub fn assemble<S>(source: &mut S, target_len: usize) -> Result<Capture>
where
    S: SampleSource + ?Sized,
{
    Assembler::default().assemble(source, target_len)
}
