//! Multi-tap feedback comb filter reverb.
//!
//! Each tap is a feedback comb filter (<https://en.wikipedia.org/wiki/Comb_filter#Feedback_form>)
//! with its own delay line per channel. Tap `i` is `floor(delay_samples * (1 + 0.15 * i))`
//! samples long, so no two taps ring at the same period. The wet signal is the average of all
//! taps, which keeps the level steady as the tap count changes.

use serde::{Deserialize, Serialize};

use crate::audio_block::normalize_peak;
use crate::effect::Effect;

/// Relative length increase between consecutive taps.
const TAP_SPREAD: f64 = 0.15;

/// Most taps a reverb will build.
pub const MAX_TAPS: u32 = 25;

/// Longest base delay a reverb will build, one second at 44.1 kHz.
pub const MAX_DELAY_SAMPLES: u32 = 44_100;

/// Parameters carried by a reverb control message.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReverbSettings {
    pub enabled: bool,
    /// Feedback coefficient in [0, 1].
    pub decay: f32,
    /// Length of the shortest tap, in samples.
    pub delay_samples: u32,
    /// Dry/wet mix in [0, 1].
    pub wet_level: f32,
    pub taps: u32,
    pub allow_clipping: bool,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            decay: 0.0,
            delay_samples: 1,
            wet_level: 0.0,
            taps: 1,
            allow_clipping: true,
        }
    }
}

/// Delay line lengths for `taps` taps starting at `delay_samples`. Truncates toward zero.
pub fn tap_lengths(delay_samples: usize, taps: usize) -> Vec<usize> {
    (0..taps)
        .map(|i| ((delay_samples as f64 * (1.0 + TAP_SPREAD * i as f64)) as usize).max(1))
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reverb {
    decay: f32,
    wet_level: f32,
    taps: usize,
    delay_samples: usize,
    channels: usize,
    allow_clipping: bool,
    tap_lengths: Vec<usize>,
    /// `lines[channel][tap]` is that tap's circular delay line for that channel.
    lines: Vec<Vec<Vec<f32>>>,
    /// `positions[channel][tap]` is the next read/write index into the matching line.
    positions: Vec<Vec<usize>>,
}

impl Reverb {
    /// Creates a reverb with silent delay lines.
    pub fn new(settings: &ReverbSettings, channels: usize) -> Self {
        let mut reverb = Self::with_params(settings, channels);
        reverb.lines = (0..reverb.channels)
            .map(|_| reverb.tap_lengths.iter().map(|&len| vec![0.0; len]).collect())
            .collect();
        reverb.positions = vec![vec![0; reverb.taps]; reverb.channels];
        reverb
    }

    /// Creates a reverb from new settings, carrying over `previous`'s delay lines and indices
    /// when the tap count, base delay and channel count are unchanged. Only decay, wet level
    /// and clipping change in that case, so the tail keeps ringing without a click. Any
    /// topology change starts from silence.
    pub fn from_previous(settings: &ReverbSettings, channels: usize, previous: &Reverb) -> Self {
        let mut reverb = Self::with_params(settings, channels);
        if reverb.taps == previous.taps
            && reverb.delay_samples == previous.delay_samples
            && reverb.channels == previous.channels
        {
            reverb.tap_lengths = previous.tap_lengths.clone();
            reverb.lines = previous.lines.clone();
            reverb.positions = previous.positions.clone();
            reverb
        } else {
            log::debug!(
                "reverb topology changed ({} taps / {} samples -> {} taps / {} samples), resetting tail",
                previous.taps,
                previous.delay_samples,
                reverb.taps,
                reverb.delay_samples
            );
            Self::new(settings, channels)
        }
    }

    fn with_params(settings: &ReverbSettings, channels: usize) -> Self {
        if settings.taps > MAX_TAPS || settings.delay_samples > MAX_DELAY_SAMPLES {
            log::warn!(
                "reverb settings out of range ({} taps / {} samples), clamping to {} / {}",
                settings.taps,
                settings.delay_samples,
                MAX_TAPS,
                MAX_DELAY_SAMPLES
            );
        }
        let taps = settings.taps.clamp(1, MAX_TAPS) as usize;
        let delay_samples = settings.delay_samples.clamp(1, MAX_DELAY_SAMPLES) as usize;
        Reverb {
            decay: settings.decay.clamp(0.0, 1.0),
            wet_level: settings.wet_level.clamp(0.0, 1.0),
            taps,
            delay_samples,
            channels: channels.max(1),
            allow_clipping: settings.allow_clipping,
            tap_lengths: tap_lengths(delay_samples, taps),
            lines: Vec::new(),
            positions: Vec::new(),
        }
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn wet_level(&self) -> f32 {
        self.wet_level
    }

    pub fn taps(&self) -> usize {
        self.taps
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn allow_clipping(&self) -> bool {
        self.allow_clipping
    }

    pub fn tap_lengths(&self) -> &[usize] {
        &self.tap_lengths
    }

    pub fn delay_lines(&self) -> &[Vec<Vec<f32>>] {
        &self.lines
    }

    pub fn positions(&self) -> &[Vec<usize>] {
        &self.positions
    }
}

impl Effect for Reverb {
    fn process(&mut self, samples: &mut [f32], channels: usize) {
        let active = channels.min(self.channels);
        let dry_gain = 1.0 - self.wet_level;
        let norm = 1.0 / self.taps as f32;

        for frame in samples.chunks_exact_mut(channels) {
            for ch in 0..active {
                let dry = frame[ch];
                let mut wet_sum = 0.0f32;
                let lines = &mut self.lines[ch];
                let positions = &mut self.positions[ch];
                for (line, pos) in lines.iter_mut().zip(positions.iter_mut()) {
                    let wet = line[*pos];
                    line[*pos] = dry + self.decay * wet;
                    *pos = (*pos + 1) % line.len();
                    wet_sum += wet;
                }
                frame[ch] = dry_gain * dry + self.wet_level * (wet_sum * norm);
            }
        }

        if !self.allow_clipping {
            normalize_peak(samples);
        }
    }

    /// Silences every delay line and rewinds the indices. Parameters are kept.
    fn reset(&mut self) {
        for line in self.lines.iter_mut().flatten() {
            line.fill(0.0);
        }
        for pos in self.positions.iter_mut().flatten() {
            *pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{tap_lengths, Reverb, ReverbSettings, MAX_DELAY_SAMPLES, MAX_TAPS};
    use crate::audio_block::{peak, AudioBlock};
    use crate::effect::Effect;
    use approx::assert_relative_eq;

    fn settings(decay: f32, delay_samples: u32, wet_level: f32, taps: u32) -> ReverbSettings {
        ReverbSettings {
            enabled: true,
            decay,
            delay_samples,
            wet_level,
            taps,
            allow_clipping: true,
        }
    }

    fn noise(frames: usize, channels: usize) -> AudioBlock {
        let mut state = 0x1234_5678u32;
        let samples = (0..frames * channels)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect();
        AudioBlock::from_interleaved(samples, channels)
    }

    #[test]
    /// Test that tap lengths are dithered upward from the base delay and truncated.
    fn test_tap_lengths_are_dithered() {
        assert_eq!(tap_lengths(100, 4), vec![100, 114, 130, 145]);
        assert_eq!(tap_lengths(7, 3), vec![7, 8, 9]);
    }

    #[test]
    /// Test that wet level and decay are clamped to [0, 1] on construction.
    fn test_parameters_are_clamped() {
        let reverb = Reverb::new(&settings(1.5, 10, -0.2, 2), 2);
        assert_eq!(reverb.decay(), 1.0);
        assert_eq!(reverb.wet_level(), 0.0);
    }

    #[test]
    /// Test that zero taps and zero delay are raised to one.
    fn test_degenerate_topology_is_raised_to_one() {
        let reverb = Reverb::new(&settings(0.5, 0, 0.5, 0), 1);
        assert_eq!(reverb.taps(), 1);
        assert_eq!(reverb.tap_lengths(), &[1]);
    }

    #[test]
    /// Test that huge tap counts and delays are capped so a reverb is never unboundedly large.
    fn test_oversized_topology_is_capped() {
        let reverb = Reverb::new(&settings(0.5, u32::MAX, 0.5, u32::MAX), 2);
        assert_eq!(reverb.taps(), MAX_TAPS as usize);
        assert_eq!(reverb.delay_samples(), MAX_DELAY_SAMPLES as usize);
        let longest = reverb.delay_lines()[0].iter().map(Vec::len).max();
        assert_eq!(longest, Some(tap_lengths(44_100, 25)[24]));
    }

    #[test]
    /// Test that a single tap with no feedback echoes an impulse exactly `delay_samples` later.
    fn test_single_tap_impulse_reappears_after_delay() {
        let mut reverb = Reverb::new(&settings(0.0, 100, 1.0, 1), 1);

        let mut first = AudioBlock::silence(64, 1);
        first.as_mut_slice()[0] = 1.0;
        reverb.process(first.as_mut_slice(), 1);
        assert!(first.as_slice().iter().all(|&x| x == 0.0));

        let mut second = AudioBlock::silence(64, 1);
        reverb.process(second.as_mut_slice(), 1);
        for (i, &x) in second.as_slice().iter().enumerate() {
            let expected = if i == 100 - 64 { 1.0 } else { 0.0 };
            assert_eq!(x, expected, "frame {}", i + 64);
        }
    }

    #[test]
    /// Test that feedback produces a decaying train of echoes.
    fn test_feedback_repeats_with_decay() {
        let mut reverb = Reverb::new(&settings(0.5, 10, 1.0, 1), 1);
        let mut block = AudioBlock::silence(40, 1);
        block.as_mut_slice()[0] = 1.0;
        reverb.process(block.as_mut_slice(), 1);
        assert_eq!(block.sample(10, 0), 1.0);
        assert_eq!(block.sample(20, 0), 0.5);
        assert_eq!(block.sample(30, 0), 0.25);
    }

    #[test]
    /// Test that the wet signal is the average over taps, not the sum.
    fn test_wet_signal_is_tap_average() {
        let mut reverb = Reverb::new(&settings(0.0, 20, 1.0, 2), 1);
        let mut block = AudioBlock::silence(32, 1);
        block.as_mut_slice()[0] = 1.0;
        reverb.process(block.as_mut_slice(), 1);
        // Taps are 20 and 23 samples long; each echoes the impulse once at half level.
        assert_eq!(block.sample(20, 0), 0.5);
        assert_eq!(block.sample(23, 0), 0.5);
    }

    #[test]
    /// Test that the dry/wet mix is linear in wet level.
    fn test_dry_wet_mix() {
        let mut reverb = Reverb::new(&settings(0.0, 1000, 0.25, 3), 2);
        let mut block = AudioBlock::from_interleaved(vec![0.8; 16], 2);
        reverb.process(block.as_mut_slice(), 2);
        // Delay lines are still silent, so only the dry share is heard.
        for &x in block.as_slice() {
            assert_relative_eq!(x, 0.6, epsilon = 1e-6);
        }
    }

    #[test]
    /// Test that changing only decay and wet level carries the delay lines over bit for bit.
    fn test_continuity_when_topology_unchanged() {
        let mut a = Reverb::new(&settings(0.6, 37, 0.4, 3), 2);
        let mut block = noise(200, 2);
        a.process(block.as_mut_slice(), 2);

        let b = Reverb::from_previous(&settings(0.2, 37, 0.9, 3), 2, &a);
        assert_eq!(b.delay_lines(), a.delay_lines());
        assert_eq!(b.positions(), a.positions());
        assert_eq!(b.decay(), 0.2);
        assert_eq!(b.wet_level(), 0.9);
    }

    #[test]
    /// Test that continued processing after a glitch-free update matches an unbroken run.
    fn test_continuity_matches_unbroken_processing() {
        let mut a = Reverb::new(&settings(0.5, 50, 0.5, 2), 1);
        let mut reference = a.clone();
        let mut warmup = noise(128, 1);
        a.process(warmup.clone().as_mut_slice(), 1);
        reference.process(warmup.as_mut_slice(), 1);

        let mut b = Reverb::from_previous(&settings(0.5, 50, 0.5, 2), 1, &a);
        let mut x = noise(64, 1);
        let mut y = x.clone();
        b.process(x.as_mut_slice(), 1);
        reference.process(y.as_mut_slice(), 1);
        assert_eq!(x, y);
    }

    #[test]
    /// Test that changing the tap count resets the delay lines.
    fn test_topology_change_resets_tail() {
        let mut a = Reverb::new(&settings(0.6, 37, 0.4, 3), 1);
        let mut block = noise(200, 1);
        a.process(block.as_mut_slice(), 1);

        let b = Reverb::from_previous(&settings(0.6, 37, 0.4, 4), 1, &a);
        assert_eq!(b.tap_lengths().len(), 4);
        assert!(b.delay_lines().iter().flatten().flatten().all(|&x| x == 0.0));
        assert!(b.positions().iter().flatten().all(|&p| p == 0));

        let c = Reverb::from_previous(&settings(0.6, 37, 0.4, 3), 2, &a);
        assert!(c.delay_lines().iter().flatten().flatten().all(|&x| x == 0.0));
    }

    #[test]
    /// Test that the clip guard keeps a resonating output within unity.
    fn test_clip_guard_limits_peak() {
        let mut s = settings(1.0, 4, 1.0, 1);
        s.allow_clipping = false;
        let mut reverb = Reverb::new(&s, 1);
        for _ in 0..4 {
            let mut block = AudioBlock::from_interleaved(vec![0.9; 32], 1);
            reverb.process(block.as_mut_slice(), 1);
            assert!(peak(block.as_slice()) <= 1.0);
        }
    }

    #[test]
    /// Test that reset silences the tail but keeps the parameters.
    fn test_reset_silences_tail() {
        let mut reverb = Reverb::new(&settings(0.7, 16, 0.5, 2), 1);
        let mut block = noise(64, 1);
        reverb.process(block.as_mut_slice(), 1);
        reverb.reset();
        assert!(reverb.delay_lines().iter().flatten().flatten().all(|&x| x == 0.0));
        assert_eq!(reverb.decay(), 0.7);
    }
}
