//! Interleaved multichannel audio block. Frame-major, channel-minor: sample `c` of
//! frame `f` lives at `f * channels + c`, which is the layout cpal hands to callbacks.

/// Owned block of f32 samples with a fixed channel count and a variable frame count.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBlock {
    channels: usize,
    samples: Vec<f32>,
}

impl AudioBlock {
    /// Creates a silent block of `frames` x `channels`. `channels` must be > 0.
    pub fn silence(frames: usize, channels: usize) -> Self {
        assert!(channels > 0, "channels must be > 0");
        AudioBlock {
            channels,
            samples: vec![0.0; frames * channels],
        }
    }

    /// Wraps interleaved samples. Trailing samples that do not fill a whole frame are dropped.
    pub fn from_interleaved(samples: Vec<f32>, channels: usize) -> Self {
        assert!(channels > 0, "channels must be > 0");
        let mut samples = samples;
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        AudioBlock { channels, samples }
    }

    /// Builds a block from per-frame rows. Every row must have `channels` samples.
    pub fn from_frames(frames: &[&[f32]], channels: usize) -> Self {
        let mut block = AudioBlock::silence(frames.len(), channels);
        for (dst, src) in block.samples.chunks_exact_mut(channels).zip(frames) {
            dst.copy_from_slice(src);
        }
        block
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Sample at (`frame`, `channel`).
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channels + channel]
    }

    /// Samples of one frame, one per channel.
    pub fn frame(&self, frame: usize) -> &[f32] {
        let start = frame * self.channels;
        &self.samples[start..start + self.channels]
    }

    /// Appends all frames of `other`. Channel counts must match.
    pub fn append(&mut self, other: &AudioBlock) {
        debug_assert_eq!(self.channels, other.channels, "channel count mismatch");
        self.samples.extend_from_slice(&other.samples);
    }

    /// Copy with `channels` channels: extra channels are dropped, missing ones are silent.
    pub fn with_channels(&self, channels: usize) -> AudioBlock {
        if channels == self.channels {
            return self.clone();
        }
        let mut out = AudioBlock::silence(self.frames(), channels);
        let n = channels.min(self.channels);
        for (dst, src) in out
            .samples
            .chunks_exact_mut(channels)
            .zip(self.samples.chunks_exact(self.channels))
        {
            dst[..n].copy_from_slice(&src[..n]);
        }
        out
    }
}

/// Mean of all channels per frame of an interleaved slice.
pub fn downmix_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Largest absolute value in `samples`.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Divides `samples` by `max(1.0, peak)`. Signals that already fit in [-1, 1] are left untouched.
pub fn normalize_peak(samples: &mut [f32]) {
    let divisor = peak(samples).max(1.0);
    if divisor > 1.0 {
        for s in samples.iter_mut() {
            *s /= divisor;
        }
    }
}
