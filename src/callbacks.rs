//! Per-mode audio callback state. Each type owns what its device callback needs and exposes
//! one `on_block` method; the session wraps these in cpal closures. Keeping them free of cpal
//! makes every mode testable without audio hardware.
//!
//! Every `on_block` checks the stop flag first. Output callbacks write silence once stopped
//! so the device never plays stale memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio_block::AudioBlock;
use crate::monitor::{Capture, MonitorSender};
use crate::pipeline::Pipeline;
use crate::ring_buffer::RingBuffer;
use crate::shutdown::StopFlag;

/// Passthrough input: capture (optional) → pipeline → monitor → ring buffer.
pub struct PassthroughInput {
    ring: Arc<RingBuffer>,
    pipeline: Arc<Pipeline>,
    monitor: MonitorSender,
    capture: Option<Capture>,
    stop: StopFlag,
    scratch: Vec<f32>,
}

impl PassthroughInput {
    pub fn new(
        ring: Arc<RingBuffer>,
        pipeline: Arc<Pipeline>,
        monitor: MonitorSender,
        capture: Option<Capture>,
        stop: StopFlag,
        block_size: usize,
    ) -> Self {
        let scratch = Vec::with_capacity(block_size * ring.channels());
        PassthroughInput {
            ring,
            pipeline,
            monitor,
            capture,
            stop,
            scratch,
        }
    }

    /// Handles one captured block (interleaved at the ring's channel count).
    pub fn on_block(&mut self, data: &[f32]) {
        if self.stop.is_stopped() {
            return;
        }
        let channels = self.ring.channels();
        if let Some(capture) = &self.capture {
            capture.push(data);
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(data);
        self.pipeline.process(&mut self.scratch, channels);
        self.monitor.publish(&self.scratch, channels);
        self.ring.write(&self.scratch);
    }
}

/// Passthrough output: ring buffer → device, mapping input channels onto output channels.
pub struct PassthroughOutput {
    ring: Arc<RingBuffer>,
    out_channels: usize,
    stop: StopFlag,
    scratch: Vec<f32>,
}

impl PassthroughOutput {
    pub fn new(ring: Arc<RingBuffer>, out_channels: usize, stop: StopFlag, block_size: usize) -> Self {
        let scratch = Vec::with_capacity(block_size * ring.channels());
        PassthroughOutput {
            ring,
            out_channels: out_channels.max(1),
            stop,
            scratch,
        }
    }

    /// Fills one output block (interleaved at `out_channels`). Output channels beyond the
    /// input count are silent; input channels beyond the output count are dropped.
    pub fn on_block(&mut self, out: &mut [f32]) {
        if self.stop.is_stopped() {
            out.fill(0.0);
            return;
        }
        let in_ch = self.ring.channels();
        let out_ch = self.out_channels;
        let frames = out.len() / out_ch;

        self.scratch.resize(frames * in_ch, 0.0);
        self.ring.read_into(&mut self.scratch);

        let shared = in_ch.min(out_ch);
        for (dst, src) in out
            .chunks_exact_mut(out_ch)
            .zip(self.scratch.chunks_exact(in_ch))
        {
            dst[..shared].copy_from_slice(&src[..shared]);
            dst[shared..].fill(0.0);
        }
    }
}

/// Record-only input: every raw block is captured and its mono copy published.
pub struct RecordInput {
    capture: Capture,
    monitor: MonitorSender,
    stop: StopFlag,
}

impl RecordInput {
    pub fn new(capture: Capture, monitor: MonitorSender, stop: StopFlag) -> Self {
        RecordInput {
            capture,
            monitor,
            stop,
        }
    }

    pub fn on_block(&mut self, data: &[f32]) {
        if self.stop.is_stopped() {
            return;
        }
        self.capture.push(data);
        self.monitor.publish(data, self.capture.channels());
    }
}

/// Frames of the playback source handed to the device so far. Shared with the session so
/// its poll loop can tell when the file is exhausted.
#[derive(Clone, Debug, Default)]
pub struct PlaybackProgress {
    position: Arc<AtomicUsize>,
}

impl PlaybackProgress {
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    fn set(&self, position: usize) {
        self.position.store(position, Ordering::Release);
    }
}

/// Playback output: streams a decoded source through the pipeline in block-sized chunks.
/// The final partial chunk is zero-padded and sets the stop flag.
pub struct PlaybackOutput {
    source: AudioBlock,
    pipeline: Arc<Pipeline>,
    monitor: MonitorSender,
    stop: StopFlag,
    progress: PlaybackProgress,
}

impl PlaybackOutput {
    /// `source` must already be adapted to the output channel count.
    pub fn new(
        source: AudioBlock,
        pipeline: Arc<Pipeline>,
        monitor: MonitorSender,
        stop: StopFlag,
    ) -> Self {
        PlaybackOutput {
            source,
            pipeline,
            monitor,
            stop,
            progress: PlaybackProgress::default(),
        }
    }

    pub fn progress(&self) -> PlaybackProgress {
        self.progress.clone()
    }

    pub fn total_frames(&self) -> usize {
        self.source.frames()
    }

    pub fn on_block(&mut self, out: &mut [f32]) {
        if self.stop.is_stopped() {
            out.fill(0.0);
            return;
        }
        let ch = self.source.channels();
        let frames = out.len() / ch;
        let start = self.progress.position();
        let end = (start + frames).min(self.source.frames());
        let len = end - start;

        out[..len * ch].copy_from_slice(&self.source.as_slice()[start * ch..end * ch]);
        out[len * ch..].fill(0.0);
        self.pipeline.process(out, ch);
        self.monitor.publish(&out[..len * ch], ch);
        self.progress.set(end);

        if len < frames {
            log::debug!("playback finished after {} frames", end);
            self.stop.stop();
        }
    }
}
