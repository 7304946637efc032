//! The boundary between the pipeline and the radio hardware.
//!
//! A [`SampleSource`] delivers blocks of samples after being told how many to
//! stream. Each block is tagged with a [`StreamMetadata`] describing how the
//! receive call went. A [`Radio`] is additionally tunable.

use std::fmt;

use crate::{complex::ComplexFloat, error::Result};

/// Outcome of a single receive call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamCode {
    Ok,
    /// Samples were dropped upstream of this block, the block itself is still good
    Overflow,
    /// Nothing arrived within the per-call timeout
    Timeout,
    /// Any other device error, the stream is unusable
    Fatal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamMetadata {
    pub code: StreamCode,
    pub detail: String,
}

impl StreamMetadata {
    pub fn ok() -> Self {
        Self {
            code: StreamCode::Ok,
            detail: String::new(),
        }
    }

    pub fn new(code: StreamCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StreamMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{:?}", self.code)
        } else {
            write!(f, "{:?}: {}", self.code, self.detail)
        }
    }
}

pub trait SampleSource {
    /// Largest number of samples a single `receive` can deliver
    fn max_block_len(&self) -> usize;

    /// Command the source to stream `target` samples, starting now
    fn start(&mut self, target: usize) -> Result<()>;

    /// Block until the next chunk of samples arrives (or the call times out),
    /// writing them to the front of `scratch`.
    fn receive(&mut self, scratch: &mut [ComplexFloat]) -> (usize, StreamMetadata);
}

/// RF front end settings for a single run
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tuning {
    pub center_freq: f64,
    pub sample_rate: f64,
    pub bandwidth: f64,
    pub gain: f64,
}

/// A tunable sample source
pub trait Radio: SampleSource {
    fn configure(&mut self, tuning: &Tuning) -> Result<()>;
}
