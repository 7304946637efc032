//! Argument parsing for running from the command line

use clap::{Parser, ValueEnum};
use iq_slurper::f_engine::WindowKind;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Center frequency in GHz. Runs are read from stdin when omitted
    #[clap(short = 'f', long, value_parser = positive_float)]
    pub center_freq: Option<f64>,
    /// Bandwidth (and sample rate) in MHz
    #[clap(short, long, default_value_t = 20.0, value_parser = positive_float)]
    pub bandwidth: f64,
    /// Dwell time in seconds
    #[clap(short, long, default_value_t = 1.0, value_parser = positive_float)]
    pub dwell: f64,
    /// Receive gain in dB
    #[clap(short, long, default_value_t = 30.0)]
    pub gain: f64,
    /// Target sidelobe attenuation in dB
    #[clap(short, long, default_value_t = 74.0, value_parser = positive_float)]
    pub attenuation: f64,
    /// Target frequency resolution in Hz
    #[clap(short, long, default_value_t = 25000.0, value_parser = positive_float)]
    pub resolution: f64,
    /// Window applied to each frame. Only kaiser is sized from the attenuation target
    #[clap(short, long, value_enum, default_value = "kaiser")]
    pub window: Window,
    /// Seconds to wait after retuning before capturing
    #[clap(long, default_value_t = 1.0)]
    pub settle: f64,
    /// Ring buffer capacity (blocks)
    #[clap(short, long, default_value_t = 256)]
    pub capacity: usize,
    /// Offset of the simulated tone from the center frequency in kHz
    #[clap(long, default_value_t = 1000.0)]
    pub tone_offset: f64,
    /// Peak amplitude of the simulated noise (full scale is 1.0)
    #[clap(long, default_value_t = 0.01)]
    pub noise: f32,
    /// Pace the simulated radio to the sample rate, dropping samples when we fall behind
    #[clap(long)]
    pub realtime: bool,
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    Kaiser,
    Hann,
    Hamming,
    Rect,
}

impl From<Window> for WindowKind {
    fn from(w: Window) -> Self {
        match w {
            Window::Kaiser => WindowKind::Kaiser,
            Window::Hann => WindowKind::Hann,
            Window::Hamming => WindowKind::Hamming,
            Window::Rect => WindowKind::Rectangular,
        }
    }
}

/// Match verbosity filter with tracing subscriber log levels
pub fn convert_filter(filter: log::LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match filter {
        log::LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        log::LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        log::LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        log::LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        log::LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        log::LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}

fn positive_float(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(v) => Err(format!("{} is not a positive number", v)),
        Err(_) => Err("Invalid number".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_float() {
        assert_eq!(positive_float("2.44"), Ok(2.44));
        assert!(positive_float("0").is_err());
        assert!(positive_float("-3").is_err());
        assert!(positive_float("inf").is_err());
        assert!(positive_float("ghz").is_err());
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["iq_slurper"]);
        assert_eq!(args.center_freq, None);
        assert_eq!(args.bandwidth, 20.0);
        assert_eq!(args.attenuation, 74.0);
        assert_eq!(args.resolution, 25000.0);
        assert_eq!(args.window, Window::Kaiser);
        assert_eq!(args.noise, 0.01);
    }

    #[test]
    fn test_window_and_noise() {
        let args = Args::parse_from(["iq_slurper", "--window", "hamming", "--noise", "0"]);
        assert_eq!(WindowKind::from(args.window), WindowKind::Hamming);
        assert_eq!(args.noise, 0.0);
        assert!(Args::try_parse_from(["iq_slurper", "--window", "blackman"]).is_err());
    }
}
