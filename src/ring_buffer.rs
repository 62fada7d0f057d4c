//! Fixed-capacity circular store of interleaved audio frames, shared between the input
//! callback (writer) and the output callback (reader).
//!
//! Writes never block and never fail: when the writer outruns the reader the oldest unread
//! frames are overwritten and the read cursor is pushed forward. Reads always return the
//! requested number of frames, padding with silence past what has been written.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio_block::AudioBlock;

struct Inner {
    /// `capacity * channels` samples, interleaved.
    storage: Box<[f32]>,
    /// Next frame to write.
    write_index: usize,
    /// Next frame to read.
    read_index: usize,
    /// Unread frames. Never exceeds capacity.
    filled: usize,
}

/// Ring buffer of audio frames. One thread writes, another reads; the lock is held only for
/// the memory copy.
pub struct RingBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
    channels: usize,
}

impl RingBuffer {
    /// Creates a ring buffer holding `capacity` frames of `channels` samples. Both must be > 0.
    /// This is the only allocation the buffer ever makes.
    pub fn new(capacity: usize, channels: usize) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(channels > 0, "channels must be > 0");
        RingBuffer {
            inner: Mutex::new(Inner {
                storage: vec![0.0f32; capacity * channels].into_boxed_slice(),
                write_index: 0,
                read_index: 0,
                filled: 0,
            }),
            capacity,
            channels,
        }
    }

    /// Capacity in frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames written but not yet read.
    pub fn filled(&self) -> usize {
        self.lock().filled
    }

    /// Writes every whole frame of the interleaved `data`. If `data` holds more frames than
    /// the buffer can keep, only the newest `capacity` frames survive.
    pub fn write(&self, data: &[f32]) {
        let ch = self.channels;
        let cap = self.capacity;
        let frames = data.len() / ch;
        let skip = frames.saturating_sub(cap);
        let data = &data[skip * ch..frames * ch];
        let n = frames - skip;
        if n == 0 {
            return;
        }

        let mut inner = self.lock();
        let head = cap - inner.write_index;
        let w = inner.write_index * ch;
        if n <= head {
            inner.storage[w..w + n * ch].copy_from_slice(data);
        } else {
            let (first, rest) = data.split_at(head * ch);
            inner.storage[w..].copy_from_slice(first);
            inner.storage[..rest.len()].copy_from_slice(rest);
        }
        inner.write_index = (inner.write_index + n) % cap;

        // Overwrite: the oldest unread frames are gone, move the reader past them.
        if inner.filled + n > cap {
            let overrun = inner.filled + n - cap;
            inner.read_index = (inner.read_index + overrun) % cap;
        }
        inner.filled = (inner.filled + n).min(cap);
    }

    /// Fills `out` (interleaved, `channels` wide) with the oldest unread frames, zero-filling
    /// whatever the buffer cannot supply. Does not allocate.
    pub fn read_into(&self, out: &mut [f32]) {
        let ch = self.channels;
        let cap = self.capacity;
        let n = out.len() / ch;

        let mut inner = self.lock();
        let to_read = n.min(inner.filled);
        let head = cap - inner.read_index;
        let r = inner.read_index * ch;
        if to_read <= head {
            out[..to_read * ch].copy_from_slice(&inner.storage[r..r + to_read * ch]);
        } else {
            let wrapped = to_read - head;
            out[..head * ch].copy_from_slice(&inner.storage[r..]);
            out[head * ch..to_read * ch].copy_from_slice(&inner.storage[..wrapped * ch]);
        }
        inner.read_index = (inner.read_index + to_read) % cap;
        inner.filled -= to_read;
        drop(inner);

        for s in out[to_read * ch..].iter_mut() {
            *s = 0.0;
        }
    }

    /// Reads exactly `n` frames as a new block. Frames past what was written are silence.
    pub fn read(&self, n: usize) -> AudioBlock {
        let mut block = AudioBlock::silence(n, self.channels);
        self.read_into(block.as_mut_slice());
        block
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
