use num_complex::Complex;

/// Host-side sample format handed to the analysis stages
pub type ComplexFloat = Complex<f32>;

/// The type of raw sample data on the wire from the radio
pub type ComplexShort = Complex<i16>;

/// Full scale of a signed 16 bit sample
const SC16_SCALE: f32 = 32768.0;

/// Convert a raw `sc16` sample into a normalized `fc32` sample
pub fn sc16_to_fc32(sample: ComplexShort) -> ComplexFloat {
    Complex::new(sample.re as f32 / SC16_SCALE, sample.im as f32 / SC16_SCALE)
}

/// Quantize a normalized sample to `sc16`, saturating outside of [-1, 1)
pub fn fc32_to_sc16(sample: ComplexFloat) -> ComplexShort {
    let quantize = |x: f32| (x * SC16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    Complex::new(quantize(sample.re), quantize(sample.im))
}

/// Unpack a block of wire samples into the front of `output`, returning how many were written
pub fn unpack(input: &[ComplexShort], output: &mut [ComplexFloat]) -> usize {
    let n = input.len().min(output.len());
    for (o, i) in output.iter_mut().zip(input) {
        *o = sc16_to_fc32(*i);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale() {
        let s = sc16_to_fc32(Complex::new(i16::MIN, 16384));
        assert_eq!(s.re, -1.0);
        assert_eq!(s.im, 0.5);
    }

    #[test]
    fn test_quantize_saturates() {
        let s = fc32_to_sc16(Complex::new(2.0, -2.0));
        assert_eq!(s, Complex::new(i16::MAX, i16::MIN));
    }

    #[test]
    fn test_unpack_short_output() {
        let input = [Complex::new(16384i16, 0); 4];
        let mut output = [ComplexFloat::default(); 3];
        assert_eq!(unpack(&input, &mut output), 3);
        assert!(output.iter().all(|s| s.re == 0.5));
    }
}
