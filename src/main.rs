use std::{
    io::{self, BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::Parser;
use iq_slurper::{
    exfil::{LogRenderer, Render},
    experiment::{run, ExperimentConfig, RunOutcome, RunParams},
    sim::SimulatedRadio,
    source::{Radio, Tuning},
    Error,
};
use tracing::{error, info, warn};

mod args;
use args::{convert_filter, Args};

// Where the radio sits until the first run retunes it
const INITIAL_CENTER_FREQ: f64 = 2440e6;
const INITIAL_RATE: f64 = 20e6;

fn experiment<R: Radio, D: Render>(
    radio: &mut R,
    renderer: &mut D,
    params: &RunParams,
    config: &ExperimentConfig,
) -> anyhow::Result<()> {
    match run(radio, params, config) {
        Ok(RunOutcome::Analysed(report)) => renderer.render(&report)?,
        Ok(RunOutcome::Skipped(reason)) => warn!("Run {} skipped: {:?}", params.label, reason),
        // Bad numbers only cost us this run
        Err(e @ Error::InvalidInput { .. }) => error!("{}", e),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Parse `center_ghz [bandwidth_mhz] [dwell_s]`. `Ok(None)` means quit.
fn parse_line(line: &str, args: &Args) -> Result<Option<RunParams>, String> {
    let mut fields = line.split_whitespace().map(|s| {
        s.parse::<f64>()
            .map_err(|_| "Invalid input. Please enter numbers.".to_string())
    });
    let center = match fields.next() {
        Some(v) => v?,
        None => return Err("Enter a center frequency".to_string()),
    };
    if center == 0.0 {
        return Ok(None);
    }
    let bandwidth = fields.next().transpose()?.unwrap_or(args.bandwidth);
    let dwell = fields.next().transpose()?.unwrap_or(args.dwell);
    Ok(Some(RunParams::from_prompt(center, bandwidth, dwell)))
}

fn interactive<R: Radio, D: Render>(
    radio: &mut R,
    renderer: &mut D,
    args: &Args,
    config: &ExperimentConfig,
) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if config.cancel.load(Ordering::Relaxed) {
            info!("User stopped the session");
            return Ok(());
        }
        print!(
            "\n--- NEW EXPERIMENT ---\nCenter GHz [Bandwidth MHz = {}] [Dwell s = {}], 0 to exit: ",
            args.bandwidth, args.dwell
        );
        io::stdout().flush()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => return Ok(()),
        };
        match parse_line(&line, args) {
            Ok(Some(params)) => experiment(radio, renderer, &params, config)?,
            Ok(None) => return Ok(()),
            Err(msg) => warn!("{}", msg),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(convert_filter(args.verbose.log_level_filter()))
        .init();

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || handler_flag.store(true, Ordering::Relaxed))?;

    let config = ExperimentConfig {
        attenuation_db: args.attenuation,
        resolution_hz: args.resolution,
        window: args.window.into(),
        gain: args.gain,
        settle: Duration::from_secs_f64(args.settle.max(0.0)),
        cancel,
        ..Default::default()
    };
    config.validate()?;

    info!("Connecting to simulated radio");
    let mut radio = SimulatedRadio::new(args.capacity)
        .with_tone(args.tone_offset * 1e3, 0.25)
        .with_noise(args.noise)
        .realtime(args.realtime);
    radio.configure(&Tuning {
        center_freq: INITIAL_CENTER_FREQ,
        sample_rate: INITIAL_RATE,
        bandwidth: INITIAL_RATE,
        gain: args.gain,
    })?;
    let mut renderer = LogRenderer::default();

    info!(
        "Spectrogram analyzer (target attenuation: {} dB, target resolution: {} kHz)",
        config.attenuation_db,
        config.resolution_hz / 1e3
    );

    match args.center_freq {
        Some(center) => {
            let params = RunParams::from_prompt(center, args.bandwidth, args.dwell);
            experiment(&mut radio, &mut renderer, &params, &config)
        }
        None => interactive(&mut radio, &mut renderer, &args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let args = Args::parse_from(["iq_slurper", "-b", "10", "-d", "0.5"]);
        let p = parse_line("2.4", &args).unwrap().unwrap();
        assert_eq!(p.bandwidth, 10e6);
        assert_eq!(p.dwell, 0.5);
        let p = parse_line(" 0.915 5 2 ", &args).unwrap().unwrap();
        assert_eq!(p.label, "0.915GHz_BW5M");
        assert_eq!(p.dwell, 2.0);
        assert_eq!(parse_line("0", &args), Ok(None));
        assert!(parse_line("abc", &args).is_err());
        assert!(parse_line("2.4 x", &args).is_err());
        assert!(parse_line("", &args).is_err());
    }
}
