//! Control bus: typed settings messages from a control thread (or another process) to the
//! processing pipeline.
//!
//! In-process producers hold a [`ControlSender`]. Producers in another process write one JSON
//! object per line to a pipe or socket; [`ControlSender::forward_json_lines`] decodes them onto
//! the same bus. Messages from one sender arrive in the order they were sent.

use std::io::BufRead;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amplifier::AmplifierSettings;
use crate::reverb::ReverbSettings;

/// Instruction from a control producer to the pipeline.
///
/// On the wire: `{"type":"amplifier_settings","scale":2.0,"enabled":true,"allow_clipping":true}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Enable/disable reverb and set its parameters.
    ReverbSettings(ReverbSettings),
    /// Enable/disable the amplifier and set its parameters.
    AmplifierSettings(AmplifierSettings),
}

impl ControlMessage {
    /// Encodes as a single line of JSON (no trailing newline).
    pub fn to_json(&self) -> Result<String, ControlError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes one JSON object. Unknown `type` tags are rejected.
    pub fn from_json(line: &str) -> Result<Self, ControlError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Malformed control message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Control stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Control bus receiver has been dropped")]
    Disconnected,
}

/// Producer side of the control bus. Cheap to clone; any number of producers may send.
#[derive(Clone)]
pub struct ControlSender {
    inner: Sender<ControlMessage>,
}

impl ControlSender {
    /// Enqueues a message. Never blocks; fails only once the receiver is gone.
    pub fn send(&self, msg: ControlMessage) -> Result<(), ControlError> {
        self.inner.send(msg).map_err(|_| ControlError::Disconnected)
    }

    /// Reads newline-delimited JSON messages from `reader` until EOF and forwards each one.
    /// Blank lines are skipped; lines that do not decode are logged and skipped so a newer
    /// producer cannot take the bus down. Returns the number of messages forwarded.
    pub fn forward_json_lines<R: BufRead>(&self, reader: R) -> Result<usize, ControlError> {
        let mut forwarded = 0;
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match ControlMessage::from_json(line) {
                Ok(msg) => {
                    self.send(msg)?;
                    forwarded += 1;
                }
                Err(e) => log::warn!("Ignoring control message: {}", e),
            }
        }
        Ok(forwarded)
    }
}

/// Consumer side of the control bus. Only the listener thread should hold this.
pub struct ControlReceiver {
    inner: Receiver<ControlMessage>,
}

impl ControlReceiver {
    /// Waits up to `timeout` for the next message. `None` on timeout or once every sender
    /// has been dropped and the queue is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ControlMessage> {
        match self.inner.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                // Keep the listener's cadence even with no producers left.
                std::thread::sleep(timeout);
                None
            }
        }
    }

    /// Returns the next message if one is already queued.
    pub fn try_recv(&self) -> Option<ControlMessage> {
        match self.inner.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Creates an unbounded control bus.
pub fn control_channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = channel::unbounded();
    (ControlSender { inner: tx }, ControlReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::{control_channel, ControlError, ControlMessage};
    use crate::amplifier::AmplifierSettings;
    use crate::reverb::ReverbSettings;
    use std::io::Cursor;
    use std::time::Duration;

    fn amp(scale: f32) -> ControlMessage {
        ControlMessage::AmplifierSettings(AmplifierSettings {
            scale,
            enabled: true,
            allow_clipping: true,
        })
    }

    #[test]
    /// Test that messages are small, fixed-size values.
    fn test_control_message_is_small() {
        assert!(std::mem::size_of::<ControlMessage>() <= 32, "ControlMessage must be small");
    }

    #[test]
    fn test_control_channel_send_recv() {
        let (sender, receiver) = control_channel();
        sender.send(amp(0.5)).unwrap();
        assert_eq!(receiver.try_recv(), Some(amp(0.5)));
        assert_eq!(receiver.try_recv(), None);
    }

    #[test]
    /// Test that the values are received in the order they were sent.
    fn test_fifo_order() {
        let (sender, receiver) = control_channel();
        for scale in [1.0, 2.0, 3.0] {
            sender.send(amp(scale)).unwrap();
        }
        assert_eq!(receiver.len(), 3);
        assert_eq!(receiver.try_recv(), Some(amp(1.0)));
        assert_eq!(receiver.try_recv(), Some(amp(2.0)));
        assert_eq!(receiver.try_recv(), Some(amp(3.0)));
    }

    #[test]
    /// Test that recv_timeout returns None on an idle bus.
    fn test_recv_timeout_on_empty_bus() {
        let (_sender, receiver) = control_channel();
        assert_eq!(receiver.recv_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    /// Test that sending after the receiver is dropped reports a disconnect.
    fn test_send_after_receiver_dropped() {
        let (sender, receiver) = control_channel();
        drop(receiver);
        assert!(matches!(sender.send(amp(1.0)), Err(ControlError::Disconnected)));
    }

    #[test]
    /// Test that both message kinds survive the JSON wire format with exact field values.
    fn test_json_round_trip_is_exact() {
        let reverb = ControlMessage::ReverbSettings(ReverbSettings {
            enabled: true,
            decay: 0.1 + 0.2,
            delay_samples: 4410,
            wet_level: 1.0 / 3.0,
            taps: 6,
            allow_clipping: false,
        });
        let line = reverb.to_json().unwrap();
        assert!(line.contains("\"type\":\"reverb_settings\""));
        assert_eq!(ControlMessage::from_json(&line).unwrap(), reverb);

        let amplifier = amp(0.123_456_79);
        let line = amplifier.to_json().unwrap();
        assert_eq!(ControlMessage::from_json(&line).unwrap(), amplifier);
    }

    #[test]
    /// Test that an unknown message kind is rejected by the decoder.
    fn test_unknown_kind_is_rejected() {
        let err = ControlMessage::from_json(r#"{"type":"chorus_settings","depth":0.5}"#);
        assert!(matches!(err, Err(ControlError::Decode(_))));
    }

    #[test]
    /// Test that the line forwarder skips junk and keeps order.
    fn test_forward_json_lines_skips_malformed() {
        let (sender, receiver) = control_channel();
        let input = format!(
            "{}\n\nnot json\n{{\"type\":\"unknown\"}}\n{}\n",
            amp(2.0).to_json().unwrap(),
            amp(0.5).to_json().unwrap()
        );
        let forwarded = sender.forward_json_lines(Cursor::new(input)).unwrap();
        assert_eq!(forwarded, 2);
        assert_eq!(receiver.try_recv(), Some(amp(2.0)));
        assert_eq!(receiver.try_recv(), Some(amp(0.5)));
        assert!(receiver.is_empty());
    }
}
