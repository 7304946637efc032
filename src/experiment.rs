//! One run: tune, capture, clean up, analyse

use std::{
    sync::{atomic::AtomicBool, Arc},
    thread,
    time::Duration,
};

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    capture::{Assembler, CaptureOutcome, STALL_LIMIT},
    dc_block::{remove_dc, DEFAULT_ALPHA},
    error::{Error, Result},
    exfil::{magnitude_envelope, SpectrogramReport, ENVELOPE_DECIMATION},
    f_engine::{compute_spectrogram_with, WindowKind, WindowSpec},
    source::{Radio, Tuning},
};

/// A capture must be longer than this to be worth analysing
pub const MIN_CAPTURE: usize = 2000;

/// Session-wide settings, read only while a run is in progress
#[derive(Clone, Debug)]
pub struct ExperimentConfig {
    pub attenuation_db: f64,
    pub resolution_hz: f64,
    pub window: WindowKind,
    pub gain: f64,
    /// Time to let the front end settle after retuning
    pub settle: Duration,
    /// Captures of this many samples or fewer are skipped
    pub min_capture: usize,
    pub stall_limit: usize,
    pub alpha: f32,
    pub cancel: Arc<AtomicBool>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            attenuation_db: 74.0,
            resolution_hz: 25000.0,
            window: WindowKind::Kaiser,
            gain: 30.0,
            settle: Duration::from_secs(1),
            min_capture: MIN_CAPTURE,
            stall_limit: STALL_LIMIT,
            alpha: DEFAULT_ALPHA,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        positive("target attenuation", self.attenuation_db)?;
        positive("target resolution", self.resolution_hz)?;
        if !self.gain.is_finite() {
            return Err(Error::InvalidInput {
                name: "gain",
                value: self.gain,
            });
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::InvalidInput {
                name: "DC blocker alpha",
                value: self.alpha as f64,
            });
        }
        Ok(())
    }
}

/// What to look at in a single run
#[derive(Clone, Debug, PartialEq)]
pub struct RunParams {
    pub center_freq: f64,
    /// Also the sample rate
    pub bandwidth: f64,
    /// Capture length in seconds
    pub dwell: f64,
    pub label: String,
}

impl RunParams {
    /// Build from the units the prompt uses (GHz, MHz, s)
    pub fn from_prompt(center_ghz: f64, bandwidth_mhz: f64, dwell: f64) -> Self {
        Self {
            center_freq: center_ghz * 1e9,
            bandwidth: bandwidth_mhz * 1e6,
            dwell,
            label: format!("{}GHz_BW{}M", center_ghz, bandwidth_mhz),
        }
    }

    pub fn validate(&self) -> Result<()> {
        positive("center frequency", self.center_freq)?;
        positive("bandwidth", self.bandwidth)?;
        positive("dwell time", self.dwell)?;
        Ok(())
    }

    pub fn target_len(&self) -> usize {
        (self.dwell * self.bandwidth).ceil() as usize
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput { name, value })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Too little came back from the radio to bother
    InsufficientCapture {
        samples: usize,
        outcome: CaptureOutcome,
    },
    /// Enough to filter, but shorter than one FFT frame
    InsufficientData { samples: usize, n_fft: usize },
    Cancelled,
}

#[derive(Debug)]
pub enum RunOutcome {
    Analysed(Box<SpectrogramReport>),
    Skipped(SkipReason),
}

/// Tune the radio and run the full pipeline once.
///
/// Bad parameters and a radio that can't be configured come back as `Err`.
/// Everything that only spoils this one run comes back as `Skipped`.
pub fn run<R>(radio: &mut R, params: &RunParams, config: &ExperimentConfig) -> Result<RunOutcome>
where
    R: Radio + ?Sized,
{
    params.validate()?;
    config.validate()?;
    // Targets the engine can't honour are rejected before the radio is touched
    WindowSpec::derive_with(
        config.window,
        config.attenuation_db,
        config.resolution_hz,
        params.bandwidth,
    )?;
    info!("Starting run: {}", params.label);

    radio.configure(&Tuning {
        center_freq: params.center_freq,
        sample_rate: params.bandwidth,
        bandwidth: params.bandwidth,
        gain: config.gain,
    })?;
    if !config.settle.is_zero() {
        thread::sleep(config.settle);
    }

    let captured_at = Utc::now();
    let capture = Assembler::new(config.stall_limit)
        .with_cancel(config.cancel.clone())
        .assemble(radio, params.target_len())?;

    if capture.outcome == CaptureOutcome::Cancelled {
        return Ok(RunOutcome::Skipped(SkipReason::Cancelled));
    }
    if capture.samples.len() <= config.min_capture {
        warn!(
            "Not enough data captured ({} samples, need more than {})",
            capture.samples.len(),
            config.min_capture
        );
        return Ok(RunOutcome::Skipped(SkipReason::InsufficientCapture {
            samples: capture.samples.len(),
            outcome: capture.outcome,
        }));
    }
    if !capture.outcome.is_complete() {
        warn!(
            "Analysing partial capture of {} samples",
            capture.samples.len()
        );
    }

    let clean = remove_dc(&capture.samples, config.alpha)?;
    drop(capture.samples);
    let (matrix, window) = match compute_spectrogram_with(
        config.window,
        &clean,
        params.bandwidth,
        params.center_freq,
        config.attenuation_db,
        config.resolution_hz,
    ) {
        Ok(result) => result,
        Err(Error::InsufficientData { samples, n_fft }) => {
            return Ok(RunOutcome::Skipped(SkipReason::InsufficientData {
                samples,
                n_fft,
            }))
        }
        Err(e) => return Err(e),
    };

    Ok(RunOutcome::Analysed(Box::new(SpectrogramReport {
        label: params.label.clone(),
        captured_at,
        capture_outcome: capture.outcome,
        window,
        envelope: magnitude_envelope(&clean, params.bandwidth, ENVELOPE_DECIMATION),
        matrix,
    })))
}
