//! Effect interface. Every plugin in the processing chain implements this trait.

/// In-place block transform. Implementations run on the audio thread: no allocation, no locks,
/// no I/O.
pub trait Effect {
    /// Transforms `samples` (interleaved, `channels` wide) in place.
    fn process(&mut self, samples: &mut [f32], channels: usize);

    /// Returns the effect to its idle state. Stateful effects drop whatever they are holding
    /// (a reverb silences its tail and keeps its parameters); stateless ones restore their
    /// default parameters.
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::Effect;
    use crate::amplifier::Amplifier;
    use crate::audio_block::AudioBlock;
    use crate::reverb::{Reverb, ReverbSettings};

    #[test]
    /// Test that plugins can be chained through trait objects.
    fn test_effects_chain_as_trait_objects() {
        let mut amplifier = Amplifier::default();
        amplifier.set_scale(0.5);
        let mut chain: Vec<Box<dyn Effect>> = vec![
            Box::new(Reverb::new(&ReverbSettings::default(), 2)),
            Box::new(amplifier),
        ];

        let mut block = AudioBlock::from_interleaved(vec![0.5; 8], 2);
        for effect in chain.iter_mut() {
            effect.process(block.as_mut_slice(), 2);
        }
        // Default reverb is fully dry, so only the amplifier is audible.
        assert!(block.as_slice().iter().all(|&x| x == 0.25));
    }

    #[test]
    /// Test that the block is the same length after processing.
    fn test_effect_respects_block_length() {
        let mut block = AudioBlock::silence(128, 1);
        Amplifier::default().process(block.as_mut_slice(), 1);
        assert_eq!(block.frames(), 128);
    }
}
