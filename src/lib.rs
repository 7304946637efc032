//! Capture a burst of complex baseband from a radio and turn it into a
//! Kaiser-windowed spectrogram.
//!
//! The pipeline runs strictly in order: [`capture`] pulls a fixed number of
//! samples out of a [`source::SampleSource`], [`dc_block`] strips the DC
//! offset, and [`f_engine`] frames and FFTs the result. [`experiment::run`]
//! strings the stages together for one run and [`exfil`] hands the result off
//! to a renderer.

pub mod capture;
pub mod complex;
pub mod dc_block;
pub mod error;
pub mod exfil;
pub mod experiment;
pub mod f_engine;
pub mod monitoring;
pub mod sim;
pub mod source;

pub use error::{Error, Result};
