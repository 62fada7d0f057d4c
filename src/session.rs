//! Audio session: opens the cpal streams for one operating mode, wires them to the ring
//! buffer, pipeline, monitor and capture, and blocks until the shared stop flag is set.
//!
//! ```text
//! passthrough:  input ─► capture? ─► pipeline ─► monitor ─► ring ─► output
//! record:       input ─► capture ─► monitor
//! playback:     file ─► pipeline ─► monitor ─► output
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use thiserror::Error;

use crate::callbacks::{PassthroughInput, PassthroughOutput, PlaybackOutput, RecordInput};
use crate::device::{find_device, Direction};
use crate::monitor::{Capture, MonitorSender};
use crate::pipeline::Pipeline;
use crate::ring_buffer::RingBuffer;
use crate::shutdown::StopFlag;
use crate::wav;

/// Frames per device callback.
pub const BLOCK_SIZE: u32 = 1024;

/// Ring buffer capacity in blocks.
pub const RING_BLOCKS: usize = 8;

/// How often the controlling thread checks for the end of the session.
pub const SESSION_POLL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No default {0} device")]
    NoDefaultDevice(Direction),

    #[error("No {direction} device at index {index}")]
    DeviceNotFound { direction: Direction, index: usize },

    #[error("Failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Failed to get device config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(SampleFormat),

    #[error("Playback mode needs a WAV path")]
    MissingWavPath,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Operating mode, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Mode {
    /// Input device → effects → output device.
    #[default]
    Passthrough,
    /// Input device → capture, no output.
    Record,
    /// WAV file → effects → output device.
    Playback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: Mode,
    /// Input device index (None = host default).
    pub input_device: Option<usize>,
    /// Output device index (None = host default).
    pub output_device: Option<usize>,
    pub sample_rate: u32,
    pub input_channels: u16,
    pub output_channels: u16,
    pub block_size: u32,
    /// Source file for playback mode.
    pub wav_path: Option<PathBuf>,
    /// Keep raw input blocks in passthrough mode. Record mode always captures.
    pub capture: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            input_device: None,
            output_device: None,
            sample_rate: 48_000,
            input_channels: 2,
            output_channels: 2,
            block_size: BLOCK_SIZE,
            wav_path: None,
            capture: false,
        }
    }
}

impl SessionConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_devices(mut self, input: Option<usize>, output: Option<usize>) -> Self {
        self.input_device = input;
        self.output_device = output;
        self
    }

    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_channels(mut self, input: u16, output: u16) -> Self {
        self.input_channels = input.max(1);
        self.output_channels = output.max(1);
        self
    }

    pub fn with_wav_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wav_path = Some(path.into());
        self
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    /// Channel count of the blocks that go through the pipeline.
    pub fn processing_channels(&self) -> usize {
        match self.mode {
            Mode::Passthrough | Mode::Record => self.input_channels as usize,
            Mode::Playback => self.output_channels as usize,
        }
    }

    /// Whether the session keeps raw input blocks for saving.
    pub fn captures(&self) -> bool {
        match self.mode {
            Mode::Record => true,
            Mode::Passthrough => self.capture,
            Mode::Playback => false,
        }
    }
}

/// One run of the engine in a single mode.
pub struct AudioSession {
    config: SessionConfig,
    pipeline: Arc<Pipeline>,
    monitor: MonitorSender,
    capture: Capture,
}

impl AudioSession {
    pub fn new(config: SessionConfig, monitor: MonitorSender) -> Self {
        let pipeline = Arc::new(Pipeline::new(config.processing_channels()));
        let capture = Capture::new(config.input_channels as usize);
        AudioSession {
            config,
            pipeline,
            monitor,
            capture,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The pipeline the audio callbacks run. Hand this to the control listener.
    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::clone(&self.pipeline)
    }

    /// Raw input captured so far.
    pub fn capture(&self) -> &Capture {
        &self.capture
    }

    /// Opens the streams for the configured mode and blocks until `stop` is set (or, in
    /// playback, until the file is exhausted). Streams are closed before returning.
    ///
    /// A playback file that cannot be decoded is logged and ends the session without opening
    /// a stream; device and stream setup failures are returned.
    pub fn run(&self, stop: &StopFlag) -> SessionResult<()> {
        log::info!(
            "Starting {:?} session: {} Hz, {} in / {} out channels, {} frame blocks",
            self.config.mode,
            self.config.sample_rate,
            self.config.input_channels,
            self.config.output_channels,
            self.config.block_size
        );
        match self.config.mode {
            Mode::Passthrough => self.run_passthrough(stop),
            Mode::Record => self.run_record(stop),
            Mode::Playback => self.run_playback(stop),
        }
    }

    fn run_passthrough(&self, stop: &StopFlag) -> SessionResult<()> {
        let cfg = &self.config;
        let host = cpal::default_host();
        let input_device = find_device(&host, Direction::Input, cfg.input_device)?;
        let output_device = find_device(&host, Direction::Output, cfg.output_device)?;

        let block = cfg.block_size as usize;
        let ring = Arc::new(RingBuffer::new(
            block * RING_BLOCKS,
            cfg.input_channels as usize,
        ));
        let capture = cfg.captures().then(|| self.capture.clone());

        let mut input = PassthroughInput::new(
            Arc::clone(&ring),
            self.pipeline(),
            self.monitor.clone(),
            capture,
            stop.clone(),
            block,
        );
        let mut output =
            PassthroughOutput::new(ring, cfg.output_channels as usize, stop.clone(), block);

        let input_stream = open_input(
            &input_device,
            &stream_config(cfg.input_channels, cfg.sample_rate, cfg.block_size),
            move |data| input.on_block(data),
        )?;
        let output_stream = open_output(
            &output_device,
            &stream_config(cfg.output_channels, cfg.sample_rate, cfg.block_size),
            move |out| output.on_block(out),
        )?;
        input_stream.play()?;
        output_stream.play()?;

        wait_until(stop, || false);
        Ok(())
    }

    fn run_record(&self, stop: &StopFlag) -> SessionResult<()> {
        let cfg = &self.config;
        let host = cpal::default_host();
        let input_device = find_device(&host, Direction::Input, cfg.input_device)?;

        let mut input = RecordInput::new(self.capture.clone(), self.monitor.clone(), stop.clone());
        let input_stream = open_input(
            &input_device,
            &stream_config(cfg.input_channels, cfg.sample_rate, cfg.block_size),
            move |data| input.on_block(data),
        )?;
        input_stream.play()?;

        wait_until(stop, || false);
        Ok(())
    }

    fn run_playback(&self, stop: &StopFlag) -> SessionResult<()> {
        let cfg = &self.config;
        let path = cfg.wav_path.as_ref().ok_or(SessionError::MissingWavPath)?;
        let decoded = match wav::read_wav(path) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::error!("Playback error: {}: {}", path.display(), e);
                return Ok(());
            }
        };
        let source = decoded.samples.with_channels(cfg.output_channels as usize);

        let host = cpal::default_host();
        let output_device = find_device(&host, Direction::Output, cfg.output_device)?;

        let mut output =
            PlaybackOutput::new(source, self.pipeline(), self.monitor.clone(), stop.clone());
        let progress = output.progress();
        let total = output.total_frames();

        // The file's own rate, not the configured device rate.
        let output_stream = open_output(
            &output_device,
            &stream_config(cfg.output_channels, decoded.sample_rate, cfg.block_size),
            move |out| output.on_block(out),
        )?;
        output_stream.play()?;

        wait_until(stop, || progress.position() >= total);
        Ok(())
    }
}

fn stream_config(channels: u16, sample_rate: u32, block_size: u32) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(block_size),
    }
}

/// Sleeps in [`SESSION_POLL`] steps until `stop` is set or `done` returns true.
fn wait_until(stop: &StopFlag, done: impl Fn() -> bool) {
    while !stop.is_stopped() && !done() {
        thread::sleep(SESSION_POLL);
    }
}

/// Builds an input stream in the device's native sample format, converting to f32 before
/// `on_block` sees the data.
fn open_input<F>(device: &Device, config: &StreamConfig, on_block: F) -> SessionResult<Stream>
where
    F: FnMut(&[f32]) + Send + 'static,
{
    let format = device.default_input_config()?.sample_format();
    match format {
        SampleFormat::F32 => build_input::<f32, F>(device, config, on_block),
        SampleFormat::I16 => build_input::<i16, F>(device, config, on_block),
        SampleFormat::U16 => build_input::<u16, F>(device, config, on_block),
        other => Err(SessionError::UnsupportedFormat(other)),
    }
}

fn build_input<T, F>(device: &Device, config: &StreamConfig, mut on_block: F) -> SessionResult<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
    F: FnMut(&[f32]) + Send + 'static,
{
    let mut converted: Vec<f32> =
        Vec::with_capacity(config.channels as usize * BLOCK_SIZE as usize);
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            converted.clear();
            converted.extend(data.iter().map(|&s| s.to_sample::<f32>()));
            on_block(&converted);
        },
        |err| log::warn!("Input stream status: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Builds an output stream in the device's native sample format; `on_block` always fills
/// an f32 buffer.
fn open_output<F>(device: &Device, config: &StreamConfig, on_block: F) -> SessionResult<Stream>
where
    F: FnMut(&mut [f32]) + Send + 'static,
{
    let format = device.default_output_config()?.sample_format();
    match format {
        SampleFormat::F32 => build_output::<f32, F>(device, config, on_block),
        SampleFormat::I16 => build_output::<i16, F>(device, config, on_block),
        SampleFormat::U16 => build_output::<u16, F>(device, config, on_block),
        other => Err(SessionError::UnsupportedFormat(other)),
    }
}

fn build_output<T, F>(device: &Device, config: &StreamConfig, mut on_block: F) -> SessionResult<Stream>
where
    T: SizedSample + FromSample<f32>,
    F: FnMut(&mut [f32]) + Send + 'static,
{
    let mut rendered: Vec<f32> = Vec::with_capacity(config.channels as usize * BLOCK_SIZE as usize);
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            rendered.resize(data.len(), 0.0);
            on_block(&mut rendered);
            for (dst, &src) in data.iter_mut().zip(rendered.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| log::warn!("Output stream status: {}", err),
        None,
    )?;
    Ok(stream)
}
