//! Processing pipeline shared by the audio callbacks and the control listener.
//!
//! The pipeline runs reverb then amplifier, each only when enabled, so gain staging happens
//! after the wet/dry mix. Every read and write goes through one mutex; the audio thread holds
//! it only while the two effects run, the listener only while it applies a message.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::amplifier::{Amplifier, AmplifierSettings};
use crate::audio_block::AudioBlock;
use crate::control::{ControlMessage, ControlReceiver};
use crate::effect::Effect;
use crate::reverb::{Reverb, ReverbSettings};
use crate::shutdown::StopFlag;

/// How long the listener waits on the bus before re-checking the stop flag.
pub const LISTENER_POLL: Duration = Duration::from_millis(10);

struct Chain {
    reverb: Reverb,
    amplifier: Amplifier,
    do_reverb: bool,
    do_amplification: bool,
}

/// Copy of the pipeline's current configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSnapshot {
    pub do_reverb: bool,
    pub do_amplification: bool,
    pub amplifier: AmplifierSettings,
    pub reverb: ReverbSettings,
}

pub struct Pipeline {
    chain: Mutex<Chain>,
    channels: usize,
}

impl Pipeline {
    /// Creates a pipeline for `channels`-wide blocks with both effects disabled.
    pub fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        Pipeline {
            chain: Mutex::new(Chain {
                reverb: Reverb::new(&ReverbSettings::default(), channels),
                amplifier: Amplifier::default(),
                do_reverb: false,
                do_amplification: false,
            }),
            channels,
        }
    }

    /// Channel count the reverb's delay lines are built for.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Runs the enabled effects over `samples` (interleaved, `channels` wide) in place.
    pub fn process(&self, samples: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let mut chain = self.lock();
        if chain.do_reverb {
            chain.reverb.process(samples, channels);
        }
        if chain.do_amplification {
            chain.amplifier.process(samples, channels);
        }
    }

    pub fn process_block(&self, block: &mut AudioBlock) {
        let channels = block.channels();
        self.process(block.as_mut_slice(), channels);
    }

    /// Applies one control message.
    ///
    /// Reverb settings replace the reverb instance, carrying the delay lines over when the
    /// topology is unchanged. Amplifier settings are applied in place.
    pub fn apply_message(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::ReverbSettings(settings) => {
                let mut chain = self.lock();
                let reverb = Reverb::from_previous(&settings, self.channels, &chain.reverb);
                chain.reverb = reverb;
                chain.do_reverb = settings.enabled;
                log::debug!("reverb settings applied: {:?}", settings);
            }
            ControlMessage::AmplifierSettings(settings) => {
                let mut chain = self.lock();
                chain.amplifier.configure(&settings);
                chain.do_amplification = settings.enabled;
                log::debug!("amplifier settings applied: {:?}", settings);
            }
        }
    }

    /// Applies every message already queued on `rx`. Returns how many were applied.
    pub fn drain_pending(&self, rx: &ControlReceiver) -> usize {
        let mut applied = 0;
        while let Some(msg) = rx.try_recv() {
            self.apply_message(msg);
            applied += 1;
        }
        applied
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let chain = self.lock();
        PipelineSnapshot {
            do_reverb: chain.do_reverb,
            do_amplification: chain.do_amplification,
            amplifier: AmplifierSettings {
                enabled: chain.do_amplification,
                ..chain.amplifier.settings()
            },
            reverb: ReverbSettings {
                enabled: chain.do_reverb,
                decay: chain.reverb.decay(),
                delay_samples: chain.reverb.delay_samples() as u32,
                wet_level: chain.reverb.wet_level(),
                taps: chain.reverb.taps() as u32,
                allow_clipping: chain.reverb.allow_clipping(),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spawns the control listener: polls `rx` every [`LISTENER_POLL`] and applies each message
/// to `pipeline` until `stop` is set. The bus is never waited on while the lock is held.
pub fn spawn_listener(
    rx: ControlReceiver,
    pipeline: Arc<Pipeline>,
    stop: StopFlag,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("control-listener".into())
        .spawn(move || {
            log::debug!("control listener started");
            while !stop.is_stopped() {
                if let Some(msg) = rx.recv_timeout(LISTENER_POLL) {
                    pipeline.apply_message(msg);
                }
            }
            log::debug!("control listener stopped");
        })
}
