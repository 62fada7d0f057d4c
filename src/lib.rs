//! reverbrt library root. Real-time audio engine: device streams feed a ring buffer and a
//! reverb → amplifier pipeline whose settings change live over a control bus. The binary in
//! `main.rs` drives one [`session::AudioSession`] from the command line.

pub mod amplifier;
pub mod audio_block;
pub mod callbacks;
pub mod control;
pub mod device;
pub mod effect;
pub mod monitor;
pub mod pipeline;
pub mod reverb;
pub mod ring_buffer;
pub mod session;
pub mod shutdown;
pub mod wav;

pub use amplifier::{Amplifier, AmplifierSettings};
pub use audio_block::AudioBlock;
pub use control::{control_channel, ControlMessage, ControlReceiver, ControlSender};
pub use effect::Effect;
pub use monitor::{monitor_channel, Capture, MonitorReceiver, MonitorSender};
pub use pipeline::{spawn_listener, Pipeline};
pub use reverb::{Reverb, ReverbSettings};
pub use ring_buffer::RingBuffer;
pub use session::{AudioSession, Mode, SessionConfig, SessionError, SessionResult};
pub use shutdown::StopFlag;
