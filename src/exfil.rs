//! This module is responsible for handing finished spectrograms to whatever draws them

use chrono::{DateTime, Utc};
use tracing::info;

use crate::{
    capture::CaptureOutcome,
    complex::ComplexFloat,
    error::{Error, Result},
    f_engine::{SpectrogramMatrix, WindowSpec},
};

/// Decimation of the time domain magnitude trace
pub const ENVELOPE_DECIMATION: usize = 100;

/// Everything a renderer needs to draw one run
#[derive(Clone, Debug)]
pub struct SpectrogramReport {
    pub label: String,
    pub captured_at: DateTime<Utc>,
    pub capture_outcome: CaptureOutcome,
    pub window: WindowSpec,
    pub matrix: SpectrogramMatrix,
    /// (seconds, |x|) pairs of the filtered signal, decimated
    pub envelope: Vec<(f64, f32)>,
}

impl SpectrogramReport {
    pub fn title(&self) -> String {
        format!(
            "Spectrogram | {}\n{:?} (beta {:.2}) | Res: {} kHz",
            self.label,
            self.window.kind,
            self.window.beta,
            self.window.resolution_hz / 1e3
        )
    }
}

/// Keep every `decimation`th sample's magnitude, tagged with its time
pub fn magnitude_envelope(
    samples: &[ComplexFloat],
    sample_rate: f64,
    decimation: usize,
) -> Vec<(f64, f32)> {
    let decimation = decimation.max(1);
    samples
        .iter()
        .step_by(decimation)
        .enumerate()
        .map(|(i, s)| ((i * decimation) as f64 / sample_rate, s.norm()))
        .collect()
}

pub trait Render {
    fn render(&mut self, report: &SpectrogramReport) -> Result<()>;
}

/// Summarizes a spectrogram in the log instead of drawing it
#[derive(Default, Debug)]
pub struct LogRenderer {
    pub rendered: usize,
}

/// Frames looked at when estimating the noise floor
pub const NOISE_FLOOR_FRAMES: usize = 64;

impl LogRenderer {
    /// Median power over a spread of frames, a decent noise floor estimate
    fn noise_floor(matrix: &SpectrogramMatrix) -> f32 {
        let stride = (matrix.n_frames / NOISE_FLOOR_FRAMES).max(1);
        let mut values: Vec<f32> = matrix
            .columns()
            .step_by(stride)
            .take(NOISE_FLOOR_FRAMES)
            .flatten()
            .copied()
            .collect();
        let mid = values.len() / 2;
        let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        *median
    }
}

impl Render for LogRenderer {
    fn render(&mut self, report: &SpectrogramReport) -> Result<()> {
        let m = &report.matrix;
        let (row, col, peak_db) = m.peak();
        if !peak_db.is_finite() {
            return Err(Error::Render(format!(
                "{} has no finite power values",
                report.label
            )));
        }
        let (f_lo, f_hi) = m.freq_extent();
        let (_, t_hi) = m.time_extent();
        info!("{}", report.title().replace('\n', " | "));
        info!(
            "{} bins x {} frames, {:.3}-{:.3} MHz, 0-{:.3} s, captured {}",
            m.n_fft,
            m.n_frames,
            f_lo / 1e6,
            f_hi / 1e6,
            t_hi,
            report.captured_at.format("%Y-%m-%d %H:%M:%S")
        );
        info!(
            "Peak {:.1} dB at {:.6} MHz, t = {:.4} s; noise floor {:.1} dB",
            peak_db,
            m.frequency_of(row) / 1e6,
            m.time_of(col),
            Self::noise_floor(m)
        );
        if let Some(max) = report
            .envelope
            .iter()
            .map(|&(_, v)| v)
            .max_by(|a, b| a.total_cmp(b))
        {
            info!(
                "Time domain: {} points, max magnitude {:.4}",
                report.envelope.len(),
                max
            );
        }
        self.rendered += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::f_engine::stft;

    #[test]
    fn test_envelope() {
        let samples: Vec<ComplexFloat> = (0..250)
            .map(|i| ComplexFloat::new(i as f32, 0.0))
            .collect();
        let env = magnitude_envelope(&samples, 1000.0, ENVELOPE_DECIMATION);
        assert_eq!(env, vec![(0.0, 0.0), (0.1, 100.0), (0.2, 200.0)]);
    }

    fn report(samples: &[ComplexFloat], spec: WindowSpec) -> SpectrogramReport {
        SpectrogramReport {
            label: "0.915GHz_BW1M".to_owned(),
            captured_at: Utc::now(),
            capture_outcome: CaptureOutcome::Complete,
            window: spec,
            envelope: magnitude_envelope(samples, 1e6, ENVELOPE_DECIMATION),
            matrix: stft(samples, &spec, 1e6, 915e6).unwrap(),
        }
    }

    #[test]
    fn test_log_renderer() {
        let spec = WindowSpec::derive(50.0, 1e4, 1e6).unwrap();
        let samples = vec![ComplexFloat::new(1.0, 0.0); spec.n_fft * 2];
        let report = report(&samples, spec);
        let mut renderer = LogRenderer::default();
        renderer.render(&report).unwrap();
        assert_eq!(renderer.rendered, 1);
        assert!(report.title().contains("Kaiser"));
        assert!(report.title().contains("Res: 10 kHz"));
        assert!(LogRenderer::noise_floor(&report.matrix) < report.matrix.peak().2);
    }

    #[test]
    fn test_non_finite_spectrogram_is_a_render_error() {
        let spec = WindowSpec::derive(50.0, 1e4, 1e6).unwrap();
        let samples = vec![ComplexFloat::new(f32::NAN, 0.0); spec.n_fft];
        let mut renderer = LogRenderer::default();
        assert!(matches!(
            renderer.render(&report(&samples, spec)),
            Err(Error::Render(_))
        ));
        assert_eq!(renderer.rendered, 0);
    }

    #[test]
    fn test_noise_floor_over_many_frames() {
        let spec = WindowSpec::derive(50.0, 1e5, 1e6).unwrap();
        let samples: Vec<ComplexFloat> = (0..spec.hop * 300)
            .map(|i| ComplexFloat::new(1.0 + (i % 7) as f32 * 1e-3, 0.0))
            .collect();
        let report = report(&samples, spec);
        assert!(report.matrix.n_frames > 4 * NOISE_FLOOR_FRAMES);
        let floor = LogRenderer::noise_floor(&report.matrix);
        assert!(floor.is_finite());
        assert!(floor < report.matrix.peak().2);
    }
}
