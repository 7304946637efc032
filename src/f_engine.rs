//! The F-engine: turn a block of complex baseband into a spectrogram.
//!
//! To create the stream of spectra, we
//! * derive a window (Kaiser by default) from the sidelobe attenuation and resolution targets
//! * slice the signal into 50% overlapping frames
//! * multiply each frame with the window
//! * FFT, shift so DC sits in the middle, and convert to dB

use std::f64::consts::PI;

use rustfft::{num_complex::Complex, FftPlanner};
use tracing::{debug, error, info};

use crate::{
    complex::ComplexFloat,
    error::{Error, Result},
};

/// Added to every magnitude before taking the log so empty bins stay finite
pub const MAGNITUDE_FLOOR: f32 = 1e-12;

/// Kaiser shape parameter for a sidelobe attenuation of `attenuation_db`
pub fn kaiser_beta(attenuation_db: f64) -> f64 {
    let a = attenuation_db;
    if a > 60.0 {
        0.12438 * (a + 6.3)
    } else if a > 13.26 {
        0.76609 * (a - 13.26).powf(0.4) + 0.09834 * (a - 13.26)
    } else {
        0.0
    }
}

/// Longest FFT we are willing to plan
pub const MAX_FFT_LEN: usize = 1 << 24;

/// Beyond this the Kaiser window can't be evaluated in f64 (and f32 samples
/// don't have the dynamic range anyway)
pub const MAX_ATTENUATION_DB: f64 = 300.0;

/// Window shape applied to each frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WindowKind {
    /// Sized and shaped from the attenuation target
    #[default]
    Kaiser,
    Hann,
    Hamming,
    Rectangular,
}

impl WindowKind {
    /// `len` coefficients with shape parameter `beta` (only used by Kaiser)
    pub fn coefficients(self, len: usize, beta: f64) -> Vec<f64> {
        match self {
            WindowKind::Kaiser => kaiser_window(len, beta),
            WindowKind::Hann => cosine_sum_window(len, &[0.5, -0.5]),
            WindowKind::Hamming => cosine_sum_window(len, &[0.54, -0.46]),
            WindowKind::Rectangular => vec![1.0; len],
        }
    }
}

/// Periodic (DFT-even) generalized cosine window
fn cosine_sum_window(len: usize, coeffs: &[f64]) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let scale = 2.0 * PI / len as f64;
    (0..len)
        .map(|n| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * (scale * (k * n) as f64).cos())
                .sum()
        })
        .collect()
}

fn resolution_error(resolution_hz: f64) -> Error {
    Error::InvalidInput {
        name: "target resolution",
        value: resolution_hz,
    }
}

/// FFT length needed for a Kaiser main lobe `resolution_hz` wide, rounded up to even
pub fn fft_len(attenuation_db: f64, resolution_hz: f64, sample_rate: f64) -> Result<usize> {
    let delta = 2.0 * PI * resolution_hz / sample_rate;
    let raw = 24.0 * PI * (attenuation_db + 12.0) / (155.0 * delta) + 1.0;
    if !raw.is_finite() || raw.ceil() > MAX_FFT_LEN as f64 {
        return Err(resolution_error(resolution_hz));
    }
    let mut n_fft = raw.ceil() as usize;
    if n_fft % 2 != 0 {
        n_fft += 1;
    }
    Ok(n_fft.max(2))
}

/// FFT length for the fixed-shape windows: one bin per `resolution_hz`
pub fn plain_fft_len(resolution_hz: f64, sample_rate: f64) -> Result<usize> {
    let raw = (sample_rate / resolution_hz).trunc();
    if !raw.is_finite() || raw < 2.0 || raw > MAX_FFT_LEN as f64 {
        return Err(resolution_error(resolution_hz));
    }
    Ok(raw as usize)
}

/// Window parameters derived from the analyst's quality targets
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowSpec {
    pub kind: WindowKind,
    pub attenuation_db: f64,
    pub resolution_hz: f64,
    pub beta: f64,
    pub n_fft: usize,
    pub hop: usize,
}

impl WindowSpec {
    /// Kaiser window sized for the targets
    pub fn derive(attenuation_db: f64, resolution_hz: f64, sample_rate: f64) -> Result<Self> {
        Self::derive_with(WindowKind::Kaiser, attenuation_db, resolution_hz, sample_rate)
    }

    pub fn derive_with(
        kind: WindowKind,
        attenuation_db: f64,
        resolution_hz: f64,
        sample_rate: f64,
    ) -> Result<Self> {
        if !(attenuation_db.is_finite() && attenuation_db <= MAX_ATTENUATION_DB) {
            return Err(Error::InvalidInput {
                name: "target attenuation",
                value: attenuation_db,
            });
        }
        let (beta, n_fft) = match kind {
            WindowKind::Kaiser => (
                kaiser_beta(attenuation_db),
                fft_len(attenuation_db, resolution_hz, sample_rate)?,
            ),
            _ => (0.0, plain_fft_len(resolution_hz, sample_rate)?),
        };
        Ok(Self {
            kind,
            attenuation_db,
            resolution_hz,
            beta,
            n_fft,
            hop: n_fft / 2,
        })
    }

    pub fn window(&self) -> Vec<f64> {
        self.kind.coefficients(self.n_fft, self.beta)
    }

    /// Number of whole frames that fit in `n_samples`
    pub fn frame_count(&self, n_samples: usize) -> usize {
        if n_samples < self.n_fft {
            0
        } else {
            (n_samples - self.n_fft) / self.hop + 1
        }
    }
}

/// Zeroth order modified Bessel function of the first kind, by power series
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    let mut k = 1.0;
    loop {
        term *= (half / k) * (half / k);
        sum += term;
        if !sum.is_finite() || term < sum * 1e-16 {
            return sum;
        }
        k += 1.0;
    }
}

/// Symmetric Kaiser window of `len` points. `beta = 0` is rectangular.
pub fn kaiser_window(len: usize, beta: f64) -> Vec<f64> {
    if len <= 1 {
        return vec![1.0; len];
    }
    let denom = bessel_i0(beta);
    let span = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let ratio = 2.0 * n as f64 / span - 1.0;
            bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / denom
        })
        .collect()
}

/// Power in dB, `n_fft` rows (frequency) by `n_frames` columns (time).
/// Stored one frame after the other.
#[derive(Clone, Debug)]
pub struct SpectrogramMatrix {
    pub n_fft: usize,
    pub n_frames: usize,
    pub hop: usize,
    pub n_samples: usize,
    pub sample_rate: f64,
    pub center_freq: f64,
    data: Vec<f32>,
}

impl SpectrogramMatrix {
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[col * self.n_fft + row]
    }

    /// One frame's spectrum, most negative frequency first
    pub fn column(&self, col: usize) -> &[f32] {
        &self.data[col * self.n_fft..(col + 1) * self.n_fft]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.n_fft)
    }

    pub fn frequency_of(&self, row: usize) -> f64 {
        self.center_freq - self.sample_rate / 2.0 + row as f64 * self.sample_rate / self.n_fft as f64
    }

    pub fn time_of(&self, col: usize) -> f64 {
        (col * self.hop) as f64 / self.sample_rate
    }

    pub fn freq_extent(&self) -> (f64, f64) {
        (
            self.center_freq - self.sample_rate / 2.0,
            self.center_freq + self.sample_rate / 2.0,
        )
    }

    pub fn time_extent(&self) -> (f64, f64) {
        (0.0, self.n_samples as f64 / self.sample_rate)
    }

    /// Strongest cell as (row, col, dB)
    pub fn peak(&self) -> (usize, usize, f32) {
        self.data
            .iter()
            .enumerate()
            .fold((0, 0, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.2 {
                    (i % self.n_fft, i / self.n_fft, v)
                } else {
                    best
                }
            })
    }
}

/// Framed STFT of `signal` with an already derived window
pub fn stft(
    signal: &[ComplexFloat],
    spec: &WindowSpec,
    sample_rate: f64,
    center_freq: f64,
) -> Result<SpectrogramMatrix> {
    let n_fft = spec.n_fft;
    let n_frames = spec.frame_count(signal.len());
    if n_frames == 0 {
        error!("Data too short for analysis");
        return Err(Error::InsufficientData {
            samples: signal.len(),
            n_fft,
        });
    }
    debug!("{} frames of {} points, hop {}", n_frames, n_fft, spec.hop);

    let window: Vec<f32> = spec.window().into_iter().map(|w| w as f32).collect();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
    let mut frame = vec![Complex::default(); n_fft];
    let mut data = Vec::with_capacity(n_fft * n_frames);

    for i in 0..n_frames {
        let start = i * spec.hop;
        for ((f, s), w) in frame
            .iter_mut()
            .zip(&signal[start..start + n_fft])
            .zip(&window)
        {
            *f = *s * *w;
        }
        fft.process_with_scratch(&mut frame, &mut scratch);
        // fftshift
        frame.rotate_right(n_fft / 2);
        data.extend(
            frame
                .iter()
                .map(|x| 20.0 * (x.norm() + MAGNITUDE_FLOOR).log10()),
        );
    }

    Ok(SpectrogramMatrix {
        n_fft,
        n_frames,
        hop: spec.hop,
        n_samples: signal.len(),
        sample_rate,
        center_freq,
        data,
    })
}

/// Derive a Kaiser window from the targets and compute the spectrogram
pub fn compute_spectrogram(
    signal: &[ComplexFloat],
    sample_rate: f64,
    center_freq: f64,
    attenuation_db: f64,
    resolution_hz: f64,
) -> Result<(SpectrogramMatrix, WindowSpec)> {
    compute_spectrogram_with(
        WindowKind::Kaiser,
        signal,
        sample_rate,
        center_freq,
        attenuation_db,
        resolution_hz,
    )
}

pub fn compute_spectrogram_with(
    kind: WindowKind,
    signal: &[ComplexFloat],
    sample_rate: f64,
    center_freq: f64,
    attenuation_db: f64,
    resolution_hz: f64,
) -> Result<(SpectrogramMatrix, WindowSpec)> {
    info!("Computing STFT with {:?} window", kind);
    let spec = WindowSpec::derive_with(kind, attenuation_db, resolution_hz, sample_rate)?;
    info!(
        "Attenuation: {}dB | Beta: {:.2} | FFT size: {} | Target resolution: {} kHz",
        attenuation_db,
        spec.beta,
        spec.n_fft,
        resolution_hz / 1e3
    );
    let matrix = stft(signal, &spec, sample_rate, center_freq)?;
    Ok((matrix, spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beta_regions() {
        assert_eq!(kaiser_beta(13.26), 0.0);
        assert_eq!(kaiser_beta(5.0), 0.0);
        assert!((kaiser_beta(40.0) - 5.481577).abs() < 1e-5);
        assert!((kaiser_beta(74.0) - 9.987714).abs() < 1e-5);
        // Affine above 60 dB
        let slope_a = kaiser_beta(80.0) - kaiser_beta(70.0);
        let slope_b = kaiser_beta(110.0) - kaiser_beta(100.0);
        assert!((slope_a - slope_b).abs() < 1e-9);
        assert!(slope_a > 0.0);
    }

    #[test]
    fn test_fft_len_reference_point() {
        // 20 Msps, 25 kHz, 74 dB: raw length 5327.45
        let spec = WindowSpec::derive(74.0, 25e3, 20e6).unwrap();
        assert_eq!(spec.n_fft, 5328);
        assert_eq!(spec.hop, 2664);
        // 1 Msps, 1 kHz, 40 dB: raw length 4026.8 rounds to 4027, bumped to even
        assert_eq!(fft_len(40.0, 1e3, 1e6).unwrap(), 4028);
    }

    #[test]
    fn test_fft_len_even_and_positive() {
        let fs = 1e6;
        for &a in &[1.0, 13.26, 30.0, 60.0, 61.0, 120.0] {
            for &r in &[1.0, 10.0, 333.3, 1e3, 7e4, 2.5e5, fs / 2.0] {
                let n = fft_len(a, r, fs).unwrap();
                assert_eq!(n % 2, 0);
                assert!(n >= 2);
            }
        }
    }

    #[test]
    fn test_kaiser_window() {
        let w = kaiser_window(8, 5.0);
        let expected = [0.036710892, 0.270694418, 0.651738235, 0.955247316];
        for (i, e) in expected.iter().enumerate() {
            assert!((w[i] - e).abs() < 1e-8);
            assert!((w[7 - i] - e).abs() < 1e-8);
        }
        assert!(kaiser_window(16, 0.0).iter().all(|&x| (x - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_frame_count() {
        let spec = WindowSpec::derive(40.0, 1e3, 1e6).unwrap();
        assert_eq!(spec.frame_count(spec.n_fft - 1), 0);
        assert_eq!(spec.frame_count(spec.n_fft), 1);
        assert_eq!(spec.frame_count(spec.n_fft + spec.hop - 1), 1);
        assert_eq!(spec.frame_count(spec.n_fft + spec.hop), 2);
    }

    #[test]
    fn test_too_short() {
        let signal = vec![ComplexFloat::default(); 100];
        let err = compute_spectrogram(&signal, 1e6, 0.0, 40.0, 1e3).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientData {
                samples: 100,
                n_fft: 4028
            }
        ));
    }

    #[test]
    fn test_constant_lands_in_center_bin() {
        let signal = vec![ComplexFloat::new(0.3, 0.1); 20_000];
        let (m, spec) = compute_spectrogram(&signal, 1e6, 100e6, 40.0, 1e3).unwrap();
        assert_eq!(m.n_frames, spec.frame_count(20_000));
        for col in 0..m.n_frames {
            let column = m.column(col);
            let argmax = column
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .unwrap()
                .0;
            assert_eq!(argmax, m.n_fft / 2);
        }
        assert_eq!(m.frequency_of(m.n_fft / 2), 100e6);
    }

    #[test]
    fn test_tone_lands_in_its_bin() {
        let fs = 1e6;
        let spec = WindowSpec::derive(60.0, 2e3, fs).unwrap();
        // Put the tone exactly on a bin
        let bin = 100;
        let f = bin as f64 * fs / spec.n_fft as f64;
        let signal: Vec<ComplexFloat> = (0..spec.n_fft * 3)
            .map(|n| {
                let phase = 2.0 * PI * f * n as f64 / fs;
                ComplexFloat::new(phase.cos() as f32, phase.sin() as f32)
            })
            .collect();
        let m = stft(&signal, &spec, fs, 0.0).unwrap();
        let (row, _, _) = m.peak();
        assert_eq!(row, m.n_fft / 2 + bin);
        assert!((m.frequency_of(row) - f).abs() < 1e-6);
    }

    #[test]
    fn test_zeros_hit_the_floor() {
        let spec = WindowSpec::derive(74.0, 25e3, 20e6).unwrap();
        let signal = vec![ComplexFloat::default(); spec.n_fft * 4];
        let m = stft(&signal, &spec, 20e6, 2.44e9).unwrap();
        assert_eq!(m.n_frames, 7);
        assert!(m.columns().flatten().all(|&v| (v + 240.0).abs() < 1e-3));
        assert_eq!(m.freq_extent(), (2.43e9, 2.45e9));
        assert_eq!(m.time_of(2), 2.0 * 2664.0 / 20e6);
    }
    #[test]
    fn test_extreme_resolution_rejected() {
        assert!(matches!(
            fft_len(74.0, 1e-300, 20e6),
            Err(Error::InvalidInput {
                name: "target resolution",
                ..
            })
        ));
        assert!(WindowSpec::derive(74.0, 1e-3, 20e6).is_err());
        assert!(WindowSpec::derive(1e12, 25e3, 20e6).is_err());
        assert!(WindowSpec::derive_with(WindowKind::Hann, 74.0, 1e-300, 20e6).is_err());
        // Coarser than half the sample rate leaves less than two bins
        assert!(WindowSpec::derive_with(WindowKind::Hann, 74.0, 6e5, 1e6).is_err());
    }

    #[test]
    fn test_plain_window_derivation() {
        let spec = WindowSpec::derive_with(WindowKind::Hann, 74.0, 1e3, 1e6).unwrap();
        assert_eq!(spec.n_fft, 1000);
        assert_eq!(spec.hop, 500);
        assert_eq!(spec.beta, 0.0);
        // Truncated, not rounded up to even
        let spec = WindowSpec::derive_with(WindowKind::Rectangular, 74.0, 3e3, 1e6).unwrap();
        assert_eq!(spec.n_fft, 333);
        assert_eq!(spec.hop, 166);
        let kaiser = WindowSpec::derive(74.0, 1e3, 1e6).unwrap();
        assert_eq!(kaiser.kind, WindowKind::Kaiser);
        assert!(kaiser.n_fft > 1000);
    }

    #[test]
    fn test_cosine_windows() {
        let hann = WindowKind::Hann.coefficients(4, 0.0);
        let hamming = WindowKind::Hamming.coefficients(4, 0.0);
        for (w, e) in hann.iter().zip([0.0, 0.5, 1.0, 0.5]) {
            assert!((w - e).abs() < 1e-12);
        }
        for (w, e) in hamming.iter().zip([0.08, 0.54, 1.0, 0.54]) {
            assert!((w - e).abs() < 1e-12);
        }
        assert_eq!(WindowKind::Rectangular.coefficients(3, 9.0), vec![1.0; 3]);
    }

    #[test]
    fn test_hann_constant_lands_in_center_bin() {
        let signal = vec![ComplexFloat::new(0.3, 0.1); 5_000];
        let (m, spec) =
            compute_spectrogram_with(WindowKind::Hann, &signal, 1e6, 0.0, 74.0, 1e3).unwrap();
        assert_eq!(spec.n_fft, 1000);
        assert_eq!(m.n_frames, 9);
        assert_eq!(m.peak().0, 500);
    }
}
