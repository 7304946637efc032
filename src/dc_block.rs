//! Single pole DC blocker, `y[n] = x[n] - x[n-1] + alpha * y[n-1]`

use tracing::info;

use crate::{
    complex::ComplexFloat,
    error::{Error, Result},
};

pub const DEFAULT_ALPHA: f32 = 0.995;

/// Number of leading output samples thrown away while the filter settles
pub const TRANSIENT_LEN: usize = 1000;

/// Filter history, fresh for every call
#[derive(Clone, Copy, Debug)]
pub struct FilterState {
    alpha: f32,
    prev_in: ComplexFloat,
    prev_out: ComplexFloat,
}

impl FilterState {
    /// `alpha` must be in (0, 1)
    pub fn new(alpha: f32) -> Result<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(Error::InvalidInput {
                name: "DC blocker alpha",
                value: alpha as f64,
            });
        }
        Ok(Self {
            alpha,
            prev_in: ComplexFloat::default(),
            prev_out: ComplexFloat::default(),
        })
    }

    #[inline]
    pub fn step(&mut self, x: ComplexFloat) -> ComplexFloat {
        let y = x - self.prev_in + self.prev_out * self.alpha;
        self.prev_in = x;
        self.prev_out = y;
        y
    }
}

/// Filter `samples` and drop the settling transient (only when there is more
/// than a transient's worth of output)
pub fn remove_dc(samples: &[ComplexFloat], alpha: f32) -> Result<Vec<ComplexFloat>> {
    let mut state = FilterState::new(alpha)?;
    info!("Applying DC offset removal (alpha = {})", alpha);
    let skip = if samples.len() > TRANSIENT_LEN {
        TRANSIENT_LEN
    } else {
        0
    };
    Ok(samples
        .iter()
        .map(|&x| state.step(x))
        .skip(skip)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_decays() {
        let c = ComplexFloat::new(0.5, -0.25);
        let input = vec![c; 3000];
        let output = remove_dc(&input, DEFAULT_ALPHA).unwrap();
        assert_eq!(output.len(), 2000);
        // Constant input: y[n] = c * alpha^n
        for (i, y) in output.iter().enumerate().step_by(97) {
            let expected = c.norm() * DEFAULT_ALPHA.powi((i + TRANSIENT_LEN) as i32);
            assert!((y.norm() - expected).abs() < 1e-4, "{} vs {}", y.norm(), expected);
        }
        assert!(output.last().unwrap().norm() < output[0].norm());
    }

    #[test]
    fn test_short_input_kept_whole() {
        let input = vec![ComplexFloat::new(1.0, 0.0); TRANSIENT_LEN];
        let output = remove_dc(&input, DEFAULT_ALPHA).unwrap();
        assert_eq!(output.len(), TRANSIENT_LEN);
        assert_eq!(output[0], ComplexFloat::new(1.0, 0.0));
    }

    #[test]
    fn test_difference_passes_step() {
        let mut state = FilterState::new(0.5).unwrap();
        assert_eq!(state.step(ComplexFloat::new(0.0, 0.0)).re, 0.0);
        assert_eq!(state.step(ComplexFloat::new(1.0, 0.0)).re, 1.0);
        assert_eq!(state.step(ComplexFloat::new(1.0, 0.0)).re, 0.5);
        assert_eq!(state.step(ComplexFloat::new(1.0, 0.0)).re, 0.25);
    }

    #[test]
    fn test_empty() {
        assert!(remove_dc(&[], DEFAULT_ALPHA).unwrap().is_empty());
    }

    #[test]
    fn test_alpha_out_of_range() {
        let input = [ComplexFloat::default(); 4];
        for alpha in [0.0, 1.0, -0.5, 1.5, f32::NAN] {
            assert!(matches!(
                remove_dc(&input, alpha),
                Err(Error::InvalidInput {
                    name: "DC blocker alpha",
                    ..
                })
            ));
        }
    }
}
