//! Outbound audio taps: the mono monitor feed for a visualizer and the capture accumulator
//! for recordings. Neither ever blocks the audio thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::audio_block::{downmix_mono, AudioBlock};

/// Blocks the monitor feed holds before new ones are dropped. At 1024-frame blocks and
/// 48 kHz this is a little over five seconds of audio.
pub const MONITOR_CAPACITY: usize = 256;

/// Audio-thread side of the monitor feed.
#[derive(Clone)]
pub struct MonitorSender {
    inner: Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
}

impl MonitorSender {
    /// Publishes the mono downmix of `samples` (interleaved, `channels` wide). If the consumer
    /// has fallen behind or gone away the block is dropped and counted.
    pub fn publish(&self, samples: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        match self.inner.try_send(downmix_mono(samples, channels)) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Blocks dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side of the monitor feed, one mono `Vec<f32>` per processed block.
pub struct MonitorReceiver {
    inner: Receiver<Vec<f32>>,
}

impl MonitorReceiver {
    pub fn try_recv(&self) -> Option<Vec<f32>> {
        self.inner.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<f32>> {
        self.inner.recv_timeout(timeout).ok()
    }

    /// Everything queued right now, oldest first.
    pub fn drain(&self) -> Vec<Vec<f32>> {
        self.inner.try_iter().collect()
    }
}

/// Creates a monitor feed holding at most `capacity` blocks.
pub fn monitor_channel(capacity: usize) -> (MonitorSender, MonitorReceiver) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    (
        MonitorSender {
            inner: tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        MonitorReceiver { inner: rx },
    )
}

/// Append-only, ordered list of raw captured blocks. Clones share the same list; the
/// recording side pushes from the audio thread, the session takes the blocks at shutdown.
#[derive(Clone)]
pub struct Capture {
    channels: usize,
    tx: Sender<AudioBlock>,
    rx: Receiver<AudioBlock>,
}

impl Capture {
    pub fn new(channels: usize) -> Self {
        let (tx, rx) = channel::unbounded();
        Capture {
            channels: channels.max(1),
            tx,
            rx,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Appends a copy of `samples` (interleaved, `channels` wide).
    pub fn push(&self, samples: &[f32]) {
        let block = AudioBlock::from_interleaved(samples.to_vec(), self.channels);
        // The receiver lives in `self`, so this cannot disconnect.
        let _ = self.tx.send(block);
    }

    /// Removes and returns every block captured so far, in capture order.
    pub fn take_blocks(&self) -> Vec<AudioBlock> {
        self.rx.try_iter().collect()
    }

    /// Removes every block captured so far and joins them into one block.
    pub fn take_concatenated(&self) -> AudioBlock {
        let mut all = AudioBlock::silence(0, self.channels);
        for block in self.rx.try_iter() {
            all.append(&block);
        }
        all
    }
}
