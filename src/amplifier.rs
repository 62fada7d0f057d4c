//! Gain stage with an optional peak-normalizing clip guard.

use serde::{Deserialize, Serialize};

use crate::audio_block::normalize_peak;
use crate::effect::Effect;

/// Parameters carried by an amplifier control message.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmplifierSettings {
    /// Linear gain (> 0).
    pub scale: f32,
    pub enabled: bool,
    pub allow_clipping: bool,
}

impl Default for AmplifierSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            enabled: true,
            allow_clipping: true,
        }
    }
}

/// Multiplies every sample by `scale`. With clipping disallowed the result is divided by
/// `max(1.0, peak)`, so loud blocks are pulled back to unity and quiet ones are left alone.
#[derive(Clone, Debug, PartialEq)]
pub struct Amplifier {
    scale: f32,
    enabled: bool,
    allow_clipping: bool,
}

impl Amplifier {
    pub fn new(scale: f32, allow_clipping: bool) -> Self {
        Self {
            scale,
            enabled: true,
            allow_clipping,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn allow_clipping(&self) -> bool {
        self.allow_clipping
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_allow_clipping(&mut self, allow_clipping: bool) {
        self.allow_clipping = allow_clipping;
    }

    /// Applies every field of `settings` in place.
    pub fn configure(&mut self, settings: &AmplifierSettings) {
        self.set_scale(settings.scale);
        self.set_enabled(settings.enabled);
        self.set_allow_clipping(settings.allow_clipping);
    }

    pub fn settings(&self) -> AmplifierSettings {
        AmplifierSettings {
            scale: self.scale,
            enabled: self.enabled,
            allow_clipping: self.allow_clipping,
        }
    }
}

impl Default for Amplifier {
    fn default() -> Self {
        Self::new(1.0, true)
    }
}

impl Effect for Amplifier {
    fn process(&mut self, samples: &mut [f32], _channels: usize) {
        for sample in samples.iter_mut() {
            *sample *= self.scale;
        }
        if !self.allow_clipping {
            normalize_peak(samples);
        }
    }

    fn reset(&mut self) {
        self.scale = 1.0;
        self.enabled = true;
        self.allow_clipping = true;
    }
}

#[cfg(test)]
mod tests {
    use super::{Amplifier, AmplifierSettings};
    use crate::audio_block::{peak, AudioBlock};
    use crate::effect::Effect;

    #[test]
    /// Test that the amplifier scales every sample.
    fn test_amplifier_scales_output() {
        let mut amplifier = Amplifier::new(0.5, true);
        let mut block = AudioBlock::from_interleaved(vec![1.0; 128], 1);
        amplifier.process(block.as_mut_slice(), 1);
        assert!(block.as_slice().iter().all(|&x| x == 0.5));
    }

    #[test]
    /// Test that unity gain preserves the input.
    fn test_amplifier_unity_preserves_input() {
        let mut amplifier = Amplifier::default();
        let input: Vec<f32> = (0..64).map(|i| (i as f32 / 64.0) - 0.5).collect();
        let mut block = AudioBlock::from_interleaved(input.clone(), 2);
        amplifier.process(block.as_mut_slice(), 2);
        assert_eq!(block.as_slice(), input.as_slice());
    }

    #[test]
    /// Test that clipping allowed lets the output exceed unity.
    fn test_clipping_allowed_exceeds_unity() {
        let mut amplifier = Amplifier::new(4.0, true);
        let mut block = AudioBlock::from_interleaved(vec![0.5, -0.25], 1);
        amplifier.process(block.as_mut_slice(), 1);
        assert_eq!(block.as_slice(), &[2.0, -1.0]);
    }

    #[test]
    /// Test that the clip guard brings a peak of 2.0 down to exactly 1.0.
    fn test_clip_guard_normalizes_loud_peak() {
        let mut amplifier = Amplifier::new(2.0, false);
        let mut block = AudioBlock::from_interleaved(vec![0.5, -1.0, 0.25, 0.0], 2);
        amplifier.process(block.as_mut_slice(), 2);
        assert_eq!(peak(block.as_slice()), 1.0);
        assert_eq!(block.as_slice(), &[0.5, -1.0, 0.25, 0.0]);
    }

    #[test]
    /// Test that the clip guard never boosts a quiet signal.
    fn test_clip_guard_leaves_quiet_signal_unchanged() {
        let mut amplifier = Amplifier::new(1.0, false);
        let mut block = AudioBlock::from_interleaved(vec![0.1, -0.3, 0.2], 1);
        amplifier.process(block.as_mut_slice(), 1);
        assert_eq!(block.as_slice(), &[0.1, -0.3, 0.2]);
    }

    #[test]
    /// Test that reset restores unity gain, enabled, and clipping allowed.
    fn test_reset_restores_defaults() {
        let mut amplifier = Amplifier::new(3.0, false);
        amplifier.set_enabled(false);
        amplifier.reset();
        assert_eq!(amplifier.settings(), AmplifierSettings::default());
    }

    #[test]
    fn test_configure_applies_all_fields() {
        let mut amplifier = Amplifier::default();
        let settings = AmplifierSettings {
            scale: 0.75,
            enabled: false,
            allow_clipping: false,
        };
        amplifier.configure(&settings);
        assert_eq!(amplifier.settings(), settings);
    }
}
