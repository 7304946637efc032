//! A pretend radio for running the pipeline without hardware.
//!
//! A producer thread synthesizes a tone on top of a DC offset and noise,
//! quantizes it to `sc16` like a real front end would, and pushes it block by
//! block through an rtrb ring buffer. In realtime mode the producer is paced to
//! the sample rate and drops blocks when the ring is full, flagging the next
//! block it manages to deliver as an overflow.

use std::{
    f64::consts::PI,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use rand::Rng;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use crate::{
    complex::{fc32_to_sc16, unpack, ComplexFloat, ComplexShort},
    error::{Error, Result},
    source::{Radio, SampleSource, StreamCode, StreamMetadata, Tuning},
};

/// Samples per block, the payload of a jumbo frame of sc16
pub const BLOCK_LEN: usize = 2000;

struct Block {
    samples: Vec<ComplexShort>,
    overflow: bool,
}

struct Stream {
    consumer: Consumer<Block>,
    // Dropping this tells the producer to quit
    stop: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Sample producer panicked");
            }
        }
    }
}

/// What the producer thread should synthesize
#[derive(Clone, Copy, Debug)]
struct Waveform {
    sample_rate: f64,
    tone_offset: f64,
    tone_amplitude: f32,
    dc_offset: ComplexFloat,
    noise: f32,
}

pub struct SimulatedRadio {
    waveform: Waveform,
    capacity: usize,
    realtime: bool,
    recv_timeout: Duration,
    tuning: Option<Tuning>,
    stream: Option<Stream>,
}

impl SimulatedRadio {
    /// `capacity` is the ring buffer depth in blocks
    pub fn new(capacity: usize) -> Self {
        Self {
            waveform: Waveform {
                sample_rate: 1.0,
                tone_offset: 1e6,
                tone_amplitude: 0.25,
                dc_offset: ComplexFloat::new(0.05, -0.03),
                noise: 0.01,
            },
            capacity: capacity.max(1),
            realtime: false,
            recv_timeout: Duration::from_millis(100),
            tuning: None,
            stream: None,
        }
    }

    /// Tone `offset` Hz away from the center frequency
    pub fn with_tone(mut self, offset: f64, amplitude: f32) -> Self {
        self.waveform.tone_offset = offset;
        self.waveform.tone_amplitude = amplitude;
        self
    }

    pub fn with_dc_offset(mut self, dc: ComplexFloat) -> Self {
        self.waveform.dc_offset = dc;
        self
    }

    pub fn with_noise(mut self, amplitude: f32) -> Self {
        self.waveform.noise = amplitude;
        self
    }

    /// Pace the producer to the sample rate and drop blocks when we fall behind
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    fn stop_stream(&mut self) {
        if self.stream.take().is_some() {
            debug!("Stopped previous stream");
        }
    }
}

impl SampleSource for SimulatedRadio {
    fn max_block_len(&self) -> usize {
        BLOCK_LEN
    }

    fn start(&mut self, target: usize) -> Result<()> {
        let tuning = self
            .tuning
            .ok_or_else(|| Error::Connection("stream started before tuning".to_owned()))?;
        self.stop_stream();
        let (producer, consumer) = RingBuffer::new(self.capacity);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let waveform = Waveform {
            sample_rate: tuning.sample_rate,
            ..self.waveform
        };
        let realtime = self.realtime;
        let worker = thread::Builder::new()
            .name("sim-producer".to_owned())
            .spawn(move || produce(producer, stop_rx, waveform, target, realtime))
            .map_err(|e| Error::Connection(format!("could not start producer: {}", e)))?;
        self.stream = Some(Stream {
            consumer,
            stop: Some(stop_tx),
            worker: Some(worker),
        });
        Ok(())
    }

    fn receive(&mut self, scratch: &mut [ComplexFloat]) -> (usize, StreamMetadata) {
        let stream = match self.stream.as_mut() {
            Some(s) => s,
            None => return (0, StreamMetadata::new(StreamCode::Fatal, "stream not started")),
        };
        let deadline = Instant::now() + self.recv_timeout;
        loop {
            // Checked before popping so a final block isn't mistaken for the end
            let finished = stream.consumer.is_abandoned();
            if let Ok(block) = stream.consumer.pop() {
                let n = unpack(&block.samples, scratch);
                let meta = if block.overflow {
                    StreamMetadata::new(StreamCode::Overflow, "samples dropped before this block")
                } else {
                    StreamMetadata::ok()
                };
                return (n, meta);
            }
            if finished {
                return (0, StreamMetadata::new(StreamCode::Timeout, "stream finished"));
            }
            if Instant::now() >= deadline {
                return (0, StreamMetadata::new(StreamCode::Timeout, "no samples"));
            }
            thread::sleep(Duration::from_micros(50));
        }
    }
}

impl Radio for SimulatedRadio {
    fn configure(&mut self, tuning: &Tuning) -> Result<()> {
        let valid = [tuning.center_freq, tuning.sample_rate, tuning.bandwidth]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0);
        if !valid || !tuning.gain.is_finite() {
            return Err(Error::Connection(format!("rejected tuning {:?}", tuning)));
        }
        self.stop_stream();
        info!(
            "Configuring radio: {:.3} MHz, rate {:.3} Msps, gain {} dB",
            tuning.center_freq / 1e6,
            tuning.sample_rate / 1e6,
            tuning.gain
        );
        self.tuning = Some(*tuning);
        Ok(())
    }
}

fn stopped(stop: &Receiver<()>) -> bool {
    !matches!(stop.try_recv(), Err(TryRecvError::Empty))
}

fn produce(
    mut producer: Producer<Block>,
    stop: Receiver<()>,
    wf: Waveform,
    target: usize,
    realtime: bool,
) {
    let mut rng = rand::thread_rng();
    let started = Instant::now();
    let step = 2.0 * PI * wf.tone_offset / wf.sample_rate;
    let mut n = 0usize;
    let mut dropped = false;
    while n < target && !stopped(&stop) {
        let len = BLOCK_LEN.min(target - n);
        let samples = (n..n + len)
            .map(|k| {
                let phase = step * k as f64;
                let tone = ComplexFloat::new(phase.cos() as f32, phase.sin() as f32)
                    * wf.tone_amplitude;
                let noise = ComplexFloat::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
                    * wf.noise;
                fc32_to_sc16(tone + wf.dc_offset + noise)
            })
            .collect();
        n += len;
        let block = Block {
            samples,
            overflow: dropped,
        };
        if realtime {
            let due = started + Duration::from_secs_f64(n as f64 / wf.sample_rate);
            if let Some(wait) = due.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            dropped = producer.push(block).is_err();
        } else {
            while producer.is_full() {
                if stopped(&stop) {
                    return;
                }
                thread::yield_now();
            }
            dropped = producer.push(block).is_err();
        }
    }
}
